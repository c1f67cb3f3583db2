//! Deterministic textual IR dump (§4.6).
//!
//! Grounded on the teacher's `IRPrinter` (`src/middle/ir_printer.rs`):
//! same `print_module`/`print_function`/`print_block`/`print_instruction`
//! shape, writing into a single `String` buffer with `writeln!`. Adapted
//! to this crate's closed IR (§3) and its pre-existing `Display` impls
//! for `IrType`/`Operand`/`BinOp`/`UnOp`, so most of the teacher's
//! hand-rolled `type_str`/`value_str` collapse into `{ty}`/`{value}`.
//! Output is meant to be read by a person or diffed in a test, not
//! parsed back in — there is no corresponding reader.

use std::fmt::Write;

use crate::ir::{Block, Function, IrInst, Module, Phi, Terminator};

/// Prints every function in `module`, in declaration order.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    writeln!(out, "; module {}", module.name).unwrap();
    for ty in &module.types {
        writeln!(out, "; type {} = {}", ty.name, ty.ty).unwrap();
    }
    for ext in &module.externs {
        let params: Vec<String> = ext.params.iter().map(|p| p.to_string()).collect();
        writeln!(out, "extern fn {}({}):{}", ext.name, params.join(","), ext.ret).unwrap();
    }
    for glob in &module.globals {
        writeln!(out, "global {}: {}", glob.name, glob.ty).unwrap();
    }
    writeln!(out).unwrap();
    for func in &module.functions {
        print_function(&mut out, func);
        writeln!(out).unwrap();
    }
    out
}

fn print_function(out: &mut String, func: &Function) {
    write!(out, "fn {}(", func.name).unwrap();
    for (i, (name, ty)) in func.params.iter().enumerate() {
        if i > 0 {
            write!(out, ", ").unwrap();
        }
        write!(out, "{name}: {ty}").unwrap();
    }
    writeln!(out, "): {} {{", func.return_type).unwrap();

    for block in &func.blocks {
        print_block(out, block);
    }

    writeln!(out, "}}").unwrap();
}

fn print_block(out: &mut String, block: &Block) {
    writeln!(out, "  {}:", block.label).unwrap();

    for phi in &block.phis {
        write!(out, "    ").unwrap();
        print_phi(out, phi);
        writeln!(out).unwrap();
    }

    for inst in &block.instructions {
        write!(out, "    ").unwrap();
        print_instruction(out, inst);
        writeln!(out).unwrap();
    }

    write!(out, "    ").unwrap();
    print_terminator(out, &block.terminator);
    writeln!(out).unwrap();
}

fn print_phi(out: &mut String, phi: &Phi) {
    write!(out, "{} = phi {} ", phi.dest, phi.ty).unwrap();
    for (i, (value, from)) in phi.incoming.iter().enumerate() {
        if i > 0 {
            write!(out, ", ").unwrap();
        }
        write!(out, "[{value}, {from}]").unwrap();
    }
}

fn print_instruction(out: &mut String, inst: &IrInst) {
    match inst {
        IrInst::StackAlloc { dest, ty } => write!(out, "{dest} = alloca {ty}").unwrap(),
        IrInst::Load { dest, ptr, ty } => write!(out, "{dest} = load {ty}, {ptr}").unwrap(),
        IrInst::Store { ptr, value } => write!(out, "store {value}, {ptr}").unwrap(),
        IrInst::FieldPtr { dest, base, field, ty } => write!(out, "{dest} = field_ptr {base}, {field:?}: {ty}").unwrap(),
        IrInst::IndexPtr { dest, base, index, ty } => write!(out, "{dest} = index_ptr {base}, {index}: {ty}").unwrap(),

        IrInst::BinOp { dest, op, lhs, rhs, ty } => write!(out, "{dest} = {op} {lhs}, {rhs}: {ty}").unwrap(),
        IrInst::UnOp { dest, op, value, ty } => write!(out, "{dest} = {op} {value}: {ty}").unwrap(),

        IrInst::ConstInt { dest, ty, value } => write!(out, "{dest} = const {ty} {value}").unwrap(),
        IrInst::ConstFloat { dest, ty, value } => write!(out, "{dest} = const {ty} {value}").unwrap(),
        IrInst::ConstBool { dest, value } => write!(out, "{dest} = const bool {value}").unwrap(),
        IrInst::ConstString { dest, value } => write!(out, "{dest} = const string {value:?}").unwrap(),
        IrInst::ConstNull { dest, ty } => write!(out, "{dest} = const {ty} null").unwrap(),

        IrInst::Call { dest, func, args, ty } => {
            write!(out, "{dest} = call {func}({}): {ty}", join_operands(args)).unwrap()
        }
        IrInst::CallVoid { func, args } => write!(out, "call {func}({})", join_operands(args)).unwrap(),
        IrInst::CallExtern { dest, func, args, ty } => {
            write!(out, "{dest} = call_extern {func}({}): {ty}", join_operands(args)).unwrap()
        }
        IrInst::CallExternVoid { func, args } => write!(out, "call_extern {func}({})", join_operands(args)).unwrap(),
        IrInst::CallThrows { dest, func, args, out_ptr, err_ptr, success_type, error_types } => {
            let errs: Vec<String> = error_types.iter().map(|t| t.to_string()).collect();
            write!(
                out,
                "{dest} = call_throws {func}({}) out={out_ptr} err={err_ptr} : {success_type} throws [{}]",
                join_operands(args),
                errs.join(",")
            )
            .unwrap()
        }

        IrInst::Cast { dest, value, target_ty } => write!(out, "{dest} = cast {value} to {target_ty}").unwrap(),
        IrInst::SizeOf { dest, ty } => write!(out, "{dest} = sizeof {ty}").unwrap(),

        IrInst::BoundsCheck { index, length } => write!(out, "bounds_check {index}, {length}").unwrap(),
        IrInst::NullCheck { ptr } => write!(out, "null_check {ptr}").unwrap(),
        IrInst::AssertCheck { cond, message } => write!(out, "assert {cond}, {message:?}").unwrap(),
        IrInst::RequireCheck { cond, message } => write!(out, "require {cond}, {message:?}").unwrap(),
        IrInst::OverflowCheck { op, lhs, rhs, ty } => {
            let op_str = format!("{op:?}").to_lowercase();
            match rhs {
                Some(rhs) => write!(out, "overflow_check {op_str} {lhs}, {rhs}: {ty}").unwrap(),
                None => write!(out, "overflow_check {op_str} {lhs}: {ty}").unwrap(),
            }
        }

        IrInst::Destroy { value, struct_name } => write!(out, "destroy {value}: {struct_name}").unwrap(),
        IrInst::OnCopy { value, struct_name } => write!(out, "oncopy {value}: {struct_name}").unwrap(),
        IrInst::Move { dest, source, ty } => write!(out, "{dest} = move {source}: {ty}").unwrap(),
    }
}

fn print_terminator(out: &mut String, term: &Terminator) {
    match term {
        Terminator::Ret { value: Some(v) } => write!(out, "ret {v}").unwrap(),
        Terminator::Ret { value: None } => write!(out, "ret").unwrap(),
        Terminator::RetVoid => write!(out, "ret void").unwrap(),
        Terminator::Jump { target } => write!(out, "jump {target}").unwrap(),
        Terminator::Br { cond, then_block, else_block } => write!(out, "br {cond}, {then_block}, {else_block}").unwrap(),
        Terminator::Switch { value, cases, default } => {
            let cases_str: Vec<String> = cases.iter().map(|(v, b)| format!("{v}: {b}")).collect();
            write!(out, "switch {value} [{}] default {default}", cases_str.join(", ")).unwrap()
        }
        Terminator::Unreachable => write!(out, "unreachable").unwrap(),
    }
}

fn join_operands(args: &[crate::ir::Operand]) -> String {
    args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, IrType, Operand};

    #[test]
    fn prints_empty_void_function() {
        let mut f = Function::new("main", vec![], IrType::Void);
        let mut b = Block::new(BlockId(0), "entry".to_string());
        b.terminator = Terminator::RetVoid;
        f.blocks.push(b);
        let module = Module { name: "m".into(), functions: vec![f], ..Default::default() };

        let out = print_module(&module);
        assert!(out.contains("fn main(): void {"));
        assert!(out.contains("entry:"));
        assert!(out.contains("ret void"));
    }

    #[test]
    fn prints_binop_and_return() {
        let mut f = Function::new("add", vec![("a".into(), IrType::i32()), ("b".into(), IrType::i32())], IrType::i32());
        let dest = f.fresh_var();
        let mut b = Block::new(BlockId(0), "entry".to_string());
        b.instructions.push(IrInst::BinOp {
            dest,
            op: crate::ir::BinOp::Add,
            lhs: Operand::Var(crate::ir::VarId(0)),
            rhs: Operand::Var(crate::ir::VarId(1)),
            ty: IrType::i32(),
        });
        b.terminator = Terminator::Ret { value: Some(Operand::Var(dest)) };
        f.blocks.push(b);
        let module = Module { name: "m".into(), functions: vec![f], ..Default::default() };

        let out = print_module(&module);
        assert!(out.contains("= add v0, v1: i32"));
        assert!(out.contains("ret v2"));
    }

    #[test]
    fn prints_phi_with_incoming_edges() {
        let mut f = Function::new("f", vec![], IrType::i32());
        let dest = f.fresh_var();
        let one = f.fresh_var();
        let two = f.fresh_var();
        let mut b = Block::new(BlockId(2), "merge".to_string());
        b.phis.push(Phi { dest, ty: IrType::i32(), incoming: vec![(Operand::Var(one), BlockId(0)), (Operand::Var(two), BlockId(1))] });
        b.terminator = Terminator::Ret { value: Some(Operand::Var(dest)) };
        f.blocks.push(b);
        let module = Module { name: "m".into(), functions: vec![f], ..Default::default() };

        let out = print_module(&module);
        assert!(out.contains("phi i32 [v1, bb0], [v2, bb1]"));
    }
}
