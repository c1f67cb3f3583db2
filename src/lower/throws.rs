//! The throws/catch protocol (§4.1.6).

use crate::ast::{self, CatchMode};
use crate::checker::ThrowsInfo;
use crate::ir::{IrInst, IrType, Operand, Terminator, VarId};
use crate::utils::Result;

use super::{struct_name_of, Lowerer};

impl Lowerer<'_> {
    /// The current function's `__out` parameter.
    pub(super) fn out_ptr_operand(&self) -> Operand {
        let params = &self.builder.func.params;
        let idx = params.len() - 2;
        Operand::Var(VarId(idx as u32))
    }

    pub(super) fn err_ptr_operand(&self) -> Operand {
        let params = &self.builder.func.params;
        let idx = params.len() - 1;
        Operand::Var(VarId(idx as u32))
    }

    /// The trailing `__out` parameter of a non-throws function whose
    /// struct/array-valued return was rewritten to the out-param
    /// convention (§9 struct-return resolution): unlike the throws
    /// protocol's pair, this function has only the one synthetic param.
    pub(super) fn value_out_ptr_operand(&self) -> Operand {
        let params = &self.builder.func.params;
        let idx = params.len() - 1;
        Operand::Var(VarId(idx as u32))
    }

    pub(super) fn lower_throw(&mut self, error: &ast::Expr) -> Result<()> {
        let info = self
            .current_throws
            .clone()
            .ok_or_else(|| self.bug("lower::throw", "throw outside a throws function"))?;

        let error_ty = self.check.type_of(error.id).cloned();
        let struct_name = error_ty.as_ref().and_then(struct_name_of).map(str::to_string);
        let tag = struct_name
            .as_deref()
            .and_then(|n| info.tag_of(n))
            .ok_or_else(|| self.bug("lower::throw", "thrown type is not in this function's throws list"))?;

        let has_fields = error_ty
            .as_ref()
            .and_then(|t| match t {
                IrType::Struct(s) => Some(!s.fields.is_empty()),
                _ => None,
            })
            .unwrap_or(false);

        if has_fields {
            let value = self.lower_expr(error)?;
            let err_ptr = self.err_ptr_operand();
            let cast_dest = self.builder.fresh_var();
            let target_ty = error_ty.clone().unwrap_or(IrType::Void);
            self.builder.emit(IrInst::Cast { dest: cast_dest, value: err_ptr, target_ty: IrType::ptr(target_ty) });
            self.builder.emit(IrInst::Store { ptr: Operand::Var(cast_dest), value });
        } else {
            self.lower_expr(error)?;
        }

        self.emit_return_destroys(None);
        self.builder.set_terminator(Terminator::Ret { value: Some(Operand::ConstInt(tag)) });
        Ok(())
    }

    /// Lowers `callee() catch <mode>` (§4.1.6), returning the resulting
    /// value operand (or `None` for a void success type under `panic`/
    /// `rethrow`, matching the call's own void-ness).
    pub(super) fn lower_catch(&mut self, call: &ast::Expr, mode: &CatchMode) -> Result<Operand> {
        let (func_name, args) = match &call.kind {
            ast::ExprKind::Call { func, args } => (self.resolve_callee_name(call.id, func)?, args.clone()),
            _ => return Err(self.bug("lower::catch", "catch applied to a non-call expression")),
        };

        let info = self
            .check
            .throws_info(&func_name)
            .cloned()
            .ok_or_else(|| self.bug("lower::catch", format!("`{func_name}` is not a throws function")))?;

        let arg_vals = args.iter().map(|a| self.lower_expr(a)).collect::<Result<Vec<_>>>()?;

        let out_alloca = self.builder.fresh_var();
        let out_ty = if matches!(info.original_return, IrType::Void) {
            IrType::Int { bits: crate::ir::IntBits::B8, signed: false }
        } else {
            info.original_return.clone()
        };
        self.builder.emit(IrInst::StackAlloc { dest: out_alloca, ty: out_ty.clone() });

        let tag = self.builder.fresh_var();

        match mode {
            CatchMode::Panic => {
                let err_alloca = self.builder.fresh_var();
                self.builder.emit(IrInst::StackAlloc { dest: err_alloca, ty: IrType::Void });
                self.builder.emit(IrInst::CallThrows {
                    dest: tag,
                    func: func_name.clone(),
                    args: arg_vals,
                    out_ptr: Operand::Var(out_alloca),
                    err_ptr: Operand::Var(err_alloca),
                    success_type: out_ty.clone(),
                    error_types: info.errors.clone(),
                });

                let ok_block = self.builder.fresh_block_id("catch.ok");
                let panic_block = self.builder.fresh_block_id("catch.panic");
                let cond = self.builder.fresh_var();
                self.builder.emit(IrInst::BinOp {
                    dest: cond,
                    op: crate::ir::BinOp::Neq,
                    lhs: Operand::Var(tag),
                    rhs: Operand::ConstInt(0),
                    ty: IrType::Bool,
                });
                self.builder.set_terminator(Terminator::Br { cond: Operand::Var(cond), then_block: panic_block, else_block: ok_block });
                self.builder.seal_current_block();

                self.builder.start_block(panic_block);
                self.builder.emit(IrInst::CallExternVoid {
                    func: "kei_panic".to_string(),
                    args: vec![Operand::ConstString(format!("unhandled throw from `{func_name}`"))],
                });
                self.builder.set_terminator(Terminator::Unreachable);
                self.builder.seal_current_block();

                self.builder.start_block(ok_block);
                if matches!(info.original_return, IrType::Void) {
                    Ok(Operand::ConstNull)
                } else {
                    let loaded = self.builder.fresh_var();
                    self.builder.emit(IrInst::Load { dest: loaded, ptr: Operand::Var(out_alloca), ty: info.original_return.clone() });
                    Ok(Operand::Var(loaded))
                }
            }
            CatchMode::Rethrow => {
                let caller_info = self
                    .current_throws
                    .clone()
                    .ok_or_else(|| self.bug("lower::catch", "catch throw used outside a throws function"))?;
                let err_ptr = self.err_ptr_operand();
                self.builder.emit(IrInst::CallThrows {
                    dest: tag,
                    func: func_name.clone(),
                    args: arg_vals,
                    out_ptr: Operand::Var(out_alloca),
                    err_ptr,
                    success_type: out_ty.clone(),
                    error_types: info.errors.clone(),
                });

                let ok_block = self.builder.fresh_block_id("catch.ok");
                let rethrow_block = self.builder.fresh_block_id("catch.rethrow");
                let cond = self.builder.fresh_var();
                self.builder.emit(IrInst::BinOp {
                    dest: cond,
                    op: crate::ir::BinOp::Neq,
                    lhs: Operand::Var(tag),
                    rhs: Operand::ConstInt(0),
                    ty: IrType::Bool,
                });
                self.builder.set_terminator(Terminator::Br { cond: Operand::Var(cond), then_block: rethrow_block, else_block: ok_block });
                self.builder.seal_current_block();

                self.builder.start_block(rethrow_block);
                if same_error_ordering(&info, &caller_info) {
                    self.emit_return_destroys(None);
                    self.builder.set_terminator(Terminator::Ret { value: Some(Operand::Var(tag)) });
                } else {
                    let cases = info
                        .errors
                        .iter()
                        .enumerate()
                        .filter_map(|(i, e)| struct_name_of(e).and_then(|n| caller_info.tag_of(n)).map(|caller_tag| (i as i64 + 1, caller_tag)))
                        .collect::<Vec<_>>();
                    self.lower_remap_switch(tag, cases)?;
                }
                self.builder.seal_current_block();

                self.builder.start_block(ok_block);
                if matches!(info.original_return, IrType::Void) {
                    Ok(Operand::ConstNull)
                } else {
                    let loaded = self.builder.fresh_var();
                    self.builder.emit(IrInst::Load { dest: loaded, ptr: Operand::Var(out_alloca), ty: info.original_return.clone() });
                    Ok(Operand::Var(loaded))
                }
            }
            CatchMode::Clauses(clauses) => {
                // `err_alloca`'s declared type is `void`, matching the
                // `panic` arm above: this lowering has no size oracle for
                // error structs (that's the emitter's layout concern), so
                // it cannot itself pick out the true "largest" error to
                // size a concrete slot for. Every clause below still casts
                // this same address to its own `ptr<Ek>` before reading.
                let err_alloca = self.builder.fresh_var();
                self.builder.emit(IrInst::StackAlloc { dest: err_alloca, ty: IrType::Void });
                self.builder.emit(IrInst::CallThrows {
                    dest: tag,
                    func: func_name.clone(),
                    args: arg_vals,
                    out_ptr: Operand::Var(out_alloca),
                    err_ptr: Operand::Var(err_alloca),
                    success_type: out_ty.clone(),
                    error_types: info.errors.clone(),
                });

                let result_ty = self.check.type_of(call.id).cloned().unwrap_or(info.original_return.clone());
                let result_slot = self.builder.fresh_var();
                self.builder.emit(IrInst::StackAlloc { dest: result_slot, ty: result_ty.clone() });

                let end_block = self.builder.fresh_block_id("catch.end");
                let ok_block = self.builder.fresh_block_id("catch.ok");

                let mut case_blocks = Vec::new();
                for clause in clauses {
                    let tag_val = info.tag_of(&clause.error.name);
                    let block = self.builder.fresh_block_id("catch.clause");
                    if let Some(t) = tag_val {
                        case_blocks.push((t, block));
                    }
                }

                self.builder.set_terminator(Terminator::Switch { value: Operand::Var(tag), cases: case_blocks.clone(), default: ok_block });
                self.builder.seal_current_block();

                for (clause, (_, block)) in clauses.iter().zip(case_blocks.iter()) {
                    self.builder.start_block(*block);
                    if let Some(binding) = &clause.binding {
                        let err_ty = info
                            .errors
                            .iter()
                            .find(|e| struct_name_of(e) == Some(clause.error.name.as_str()))
                            .cloned()
                            .unwrap_or(IrType::Void);
                        let cast_dest = self.builder.fresh_var();
                        self.builder.emit(IrInst::Cast { dest: cast_dest, value: Operand::Var(err_alloca), target_ty: IrType::ptr(err_ty) });
                        self.const_locals.insert(binding.name.clone(), Operand::Var(cast_dest));
                    }
                    let clause_val = self.lower_scoped_block(&clause.body)?;
                    if !self.builder.has_terminator() {
                        if let Some(v) = clause_val {
                            self.builder.emit(IrInst::Store { ptr: Operand::Var(result_slot), value: v });
                        }
                        self.builder.set_terminator(Terminator::Jump { target: end_block });
                    }
                    self.builder.seal_current_block();
                }

                self.builder.start_block(ok_block);
                if !matches!(info.original_return, IrType::Void) {
                    let loaded = self.builder.fresh_var();
                    self.builder.emit(IrInst::Load { dest: loaded, ptr: Operand::Var(out_alloca), ty: info.original_return.clone() });
                    self.builder.emit(IrInst::Store { ptr: Operand::Var(result_slot), value: Operand::Var(loaded) });
                }
                self.builder.set_terminator(Terminator::Jump { target: end_block });
                self.builder.seal_current_block();

                self.builder.start_block(end_block);
                let final_val = self.builder.fresh_var();
                self.builder.emit(IrInst::Load { dest: final_val, ptr: Operand::Var(result_slot), ty: result_ty });
                Ok(Operand::Var(final_val))
            }
        }
    }

    /// `switch` that remaps a callee's error tag to the caller's own tag
    /// space before re-returning it (§4.1.6, non-matching ordering case).
    fn lower_remap_switch(&mut self, tag: VarId, cases: Vec<(i64, i64)>) -> Result<()> {
        let default_block = self.builder.fresh_block_id("rethrow.default");
        let mut case_blocks = Vec::new();
        for (callee_tag, _) in &cases {
            case_blocks.push((*callee_tag, self.builder.fresh_block_id("rethrow.case")));
        }
        self.builder.set_terminator(Terminator::Switch {
            value: Operand::Var(tag),
            cases: case_blocks.clone(),
            default: default_block,
        });
        self.builder.seal_current_block();

        for ((_, caller_tag), (_, block)) in cases.iter().zip(case_blocks.iter()) {
            self.builder.start_block(*block);
            self.emit_return_destroys(None);
            self.builder.set_terminator(Terminator::Ret { value: Some(Operand::ConstInt(*caller_tag)) });
            self.builder.seal_current_block();
        }

        self.builder.start_block(default_block);
        self.builder.set_terminator(Terminator::Unreachable);
        Ok(())
    }
}

fn same_error_ordering(callee: &ThrowsInfo, caller: &ThrowsInfo) -> bool {
    callee.errors.len() == caller.errors.len()
        && callee
            .errors
            .iter()
            .zip(caller.errors.iter())
            .all(|(a, b)| struct_name_of(a) == struct_name_of(b))
}
