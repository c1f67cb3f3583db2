//! φ-node elimination via parallel-copy sequencing at predecessor block
//! ends (§4.5).
//!
//! Shaped like [`crate::mem2reg`]: a single fixed pass over every
//! function, run once between mem2reg and the (out of scope) emitter.
//! Unlike mem2reg this is new machinery with no teacher counterpart —
//! the teacher's optimizer never produces SSA form, so there is nothing
//! in it to de-SSA.

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, Function, IrInst, IrType, Operand, VarId};
use crate::utils::Result;

/// Runs de-SSA over every function in place and returns the rewritten
/// module. Takes the module by value per the ownership model (§5).
pub fn run(mut module: crate::ir::Module) -> Result<crate::ir::Module> {
    for func in &mut module.functions {
        deconstruct_function(func);
    }
    Ok(module)
}

fn deconstruct_function(func: &mut Function) {
    let copies_by_pred = collect_parallel_copies(func);
    if copies_by_pred.is_empty() {
        clear_phis(func);
        return;
    }

    for (pred, copies) in copies_by_pred {
        let sequenced = sequence_parallel_copies(copies, func);
        if let Some(block) = func.block_mut(pred) {
            for (dest, src, ty) in sequenced {
                block.instructions.push(IrInst::Cast { dest, value: src, target_ty: ty });
            }
        }
    }

    clear_phis(func);
}

/// Groups every φ's incoming edges by predecessor: each predecessor `p`
/// accumulates one `(dest, src, type)` copy per φ in each successor of
/// `p` for which `p` is an incoming edge.
fn collect_parallel_copies(func: &Function) -> HashMap<BlockId, Vec<(VarId, Operand, IrType)>> {
    let mut by_pred: HashMap<BlockId, Vec<(VarId, Operand, IrType)>> = HashMap::new();
    for block in &func.blocks {
        for phi in &block.phis {
            for (value, from) in &phi.incoming {
                by_pred.entry(*from).or_default().push((phi.dest, value.clone(), phi.ty.clone()));
            }
        }
    }
    by_pred
}

/// Resolves one predecessor's parallel-copy set into a safe sequential
/// order (§4.5 step 2). A source is *interfering* if it is also some
/// copy's destination in the same set — such a source's pre-copy value
/// would otherwise be clobbered before every reader has seen it (the
/// lost-copy problem). Every interfering source gets a fresh temporary
/// saved before any real destination is written; this subsumes swap
/// cycles without a separate case (§9 design notes).
fn sequence_parallel_copies(
    copies: Vec<(VarId, Operand, IrType)>,
    func: &mut Function,
) -> Vec<(VarId, Operand, IrType)> {
    let copies: Vec<_> = copies.into_iter().filter(|(dest, src, _)| *src != Operand::Var(*dest)).collect();
    if copies.is_empty() {
        return copies;
    }

    let dest_set: HashSet<VarId> = copies.iter().map(|(dest, _, _)| *dest).collect();

    let mut temp_for: HashMap<VarId, VarId> = HashMap::new();
    for (_, src, _) in &copies {
        if let Operand::Var(sv) = src {
            if dest_set.contains(sv) {
                temp_for.entry(*sv).or_insert_with(|| func.fresh_var());
            }
        }
    }

    let mut saved_srcs: Vec<VarId> = temp_for.keys().copied().collect();
    saved_srcs.sort();

    let mut result = Vec::with_capacity(copies.len() + saved_srcs.len());
    for src in saved_srcs {
        let temp = temp_for[&src];
        let ty = copies.iter().find(|(dest, _, _)| *dest == src).map(|(_, _, t)| t.clone()).expect("interfering src is a dest in this set");
        result.push((temp, Operand::Var(src), ty));
    }

    for (dest, src, ty) in copies {
        let rewritten = match &src {
            Operand::Var(sv) => temp_for.get(sv).map(|t| Operand::Var(*t)).unwrap_or(src),
            _ => src,
        };
        result.push((dest, rewritten, ty));
    }

    result
}

fn clear_phis(func: &mut Function) {
    for block in &mut func.blocks {
        block.phis.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Block, IrType, Phi, Terminator};

    fn mk_block(id: u32, term: Terminator) -> Block {
        let mut b = Block::new(BlockId(id), format!("bb{id}"));
        b.terminator = term;
        b
    }

    /// entry -> (then | else) -> merge, merge carries one φ (spec e2e
    /// scenario 2). Each branch should get a same-type `cast` copy
    /// appended before its jump, and the merge block loses its φ.
    #[test]
    fn diamond_phi_becomes_branch_end_copies() {
        let mut f = Function::new("f", vec![], IrType::i32());
        let merged = f.fresh_var();
        let one = f.fresh_var();
        let two = f.fresh_var();
        let cond = f.fresh_var();

        let mut entry = mk_block(0, Terminator::Br { cond: Operand::Var(cond), then_block: BlockId(1), else_block: BlockId(2) });
        entry.instructions.push(IrInst::ConstBool { dest: cond, value: true });
        f.blocks.push(entry);

        f.blocks.push(mk_block(1, Terminator::Jump { target: BlockId(3) }));
        f.blocks.push(mk_block(2, Terminator::Jump { target: BlockId(3) }));

        let mut merge = mk_block(3, Terminator::Ret { value: Some(Operand::Var(merged)) });
        merge.phis.push(Phi { dest: merged, ty: IrType::i32(), incoming: vec![(Operand::Var(one), BlockId(1)), (Operand::Var(two), BlockId(2))] });
        f.blocks.push(merge);

        let module = crate::ir::Module { name: "m".into(), functions: vec![f], ..Default::default() };
        let module = run(module).unwrap();
        let f = &module.functions[0];

        assert!(f.block(BlockId(3)).unwrap().phis.is_empty());
        let then_copy = f.block(BlockId(1)).unwrap().instructions.last().cloned().unwrap();
        assert!(matches!(then_copy, IrInst::Cast { dest, value: Operand::Var(src), .. } if dest == merged && src == one));
        let else_copy = f.block(BlockId(2)).unwrap().instructions.last().cloned().unwrap();
        assert!(matches!(else_copy, IrInst::Cast { dest, value: Operand::Var(src), .. } if dest == merged && src == two));
    }

    /// A loop header with two φs whose sources are each other's
    /// destinations on the back edge (spec e2e scenario 3's shape,
    /// worst-cased into a true swap) must not lose either value: the
    /// back-edge predecessor gets two temp-saves before the real copies.
    #[test]
    fn swap_cycle_uses_temporaries() {
        let mut f = Function::new("f", vec![], IrType::Void);
        let a = f.fresh_var();
        let b = f.fresh_var();

        let mut header = mk_block(0, Terminator::RetVoid);
        header.phis.push(Phi { dest: a, ty: IrType::i32(), incoming: vec![(Operand::Var(b), BlockId(1))] });
        header.phis.push(Phi { dest: b, ty: IrType::i32(), incoming: vec![(Operand::Var(a), BlockId(1))] });
        f.blocks.push(header);
        f.blocks.push(mk_block(1, Terminator::Jump { target: BlockId(0) }));

        let module = crate::ir::Module { name: "m".into(), functions: vec![f], ..Default::default() };
        let module = run(module).unwrap();
        let f = &module.functions[0];

        let latch = f.block(BlockId(1)).unwrap();
        // two temp saves (reading the pre-swap a and b) followed by the
        // two real copies reading those temps back.
        assert_eq!(latch.instructions.len(), 4);
        let temps: Vec<VarId> = latch.instructions[..2]
            .iter()
            .map(|i| match i {
                IrInst::Cast { dest, .. } => *dest,
                _ => panic!("expected cast"),
            })
            .collect();
        assert!(temps[0] != temps[1]);
        for inst in &latch.instructions[2..] {
            match inst {
                IrInst::Cast { dest, value: Operand::Var(src), .. } => {
                    assert!(*dest == a || *dest == b);
                    assert!(temps.contains(src));
                }
                _ => panic!("expected cast reading a temp"),
            }
        }
    }

    #[test]
    fn self_copy_is_skipped() {
        let mut f = Function::new("f", vec![], IrType::Void);
        let x = f.fresh_var();
        let mut header = mk_block(0, Terminator::RetVoid);
        header.phis.push(Phi { dest: x, ty: IrType::i32(), incoming: vec![(Operand::Var(x), BlockId(1))] });
        f.blocks.push(header);
        f.blocks.push(mk_block(1, Terminator::Jump { target: BlockId(0) }));

        let module = crate::ir::Module { name: "m".into(), functions: vec![f], ..Default::default() };
        let module = run(module).unwrap();
        assert!(module.functions[0].block(BlockId(1)).unwrap().instructions.is_empty());
    }

    #[test]
    fn no_phis_is_a_no_op() {
        let mut f = Function::new("f", vec![], IrType::Void);
        f.blocks.push(mk_block(0, Terminator::RetVoid));
        let module = crate::ir::Module { name: "m".into(), functions: vec![f], ..Default::default() };
        let before = module.clone();
        let after = run(module).unwrap();
        assert_eq!(before, after);
    }
}
