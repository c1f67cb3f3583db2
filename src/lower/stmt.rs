//! Statement lowering (§4.1.4).

use crate::ast::{self, Stmt};
use crate::ir::{IrInst, Operand, Terminator};
use crate::utils::Result;

use super::{struct_name_of, Lowerer};

impl Lowerer<'_> {
    pub(super) fn lower_block(&mut self, block: &ast::Block) -> Result<()> {
        for stmt in &block.stmts {
            if self.builder.has_terminator() {
                // Checker-verified dead code after a terminating statement
                // (e.g. statements following an unconditional `return`
                // inside the same block); nothing left to lower into.
                break;
            }
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    /// Lowers a nested `{ ... }` block expression as its own lifecycle
    /// scope and returns the value of its trailing expression, if any.
    pub(super) fn lower_scoped_block(&mut self, block: &ast::Block) -> Result<Option<Operand>> {
        self.push_scope();
        let mut trailing = None;
        for (i, stmt) in block.stmts.iter().enumerate() {
            if self.builder.has_terminator() {
                break;
            }
            let is_last = i + 1 == block.stmts.len();
            if is_last {
                if let Stmt::Expr(e) = stmt {
                    trailing = Some(self.lower_expr(e)?);
                    continue;
                }
            }
            self.lower_stmt(stmt)?;
        }
        if !self.builder.has_terminator() {
            self.pop_scope();
        } else {
            self.scopes.pop();
        }
        Ok(trailing)
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Let { name, value, .. } => self.lower_let(&name.name, value),
            Stmt::Const { name, value, .. } => {
                let v = self.lower_expr(value)?;
                self.const_locals.insert(name.name.clone(), v);
                Ok(())
            }
            Stmt::Expr(e) => {
                self.lower_expr(e)?;
                Ok(())
            }
            Stmt::Return { value, .. } => self.lower_return(value.as_ref()),
            Stmt::Throw { error, .. } => self.lower_throw(error),
            Stmt::Break { .. } => self.lower_break(),
            Stmt::Continue { .. } => self.lower_continue(),
            Stmt::Assert { cond, message, .. } => {
                let c = self.lower_expr(cond)?;
                self.builder.emit(IrInst::AssertCheck { cond: c, message: message.clone() });
                Ok(())
            }
            Stmt::Require { cond, message, .. } => {
                let c = self.lower_expr(cond)?;
                self.builder.emit(IrInst::RequireCheck { cond: c, message: message.clone() });
                Ok(())
            }
            Stmt::Empty { .. } => Ok(()),
        }
    }

    fn lower_let(&mut self, name: &str, value: &ast::Expr) -> Result<()> {
        let ty = self
            .check
            .type_of(value.id)
            .cloned()
            .ok_or_else(|| self.bug("lower::let", format!("no resolved type for let `{name}`")))?;

        let slot = self.builder.fresh_var();
        self.builder.emit(IrInst::StackAlloc { dest: slot, ty: ty.clone() });

        let val = self.lower_expr(value)?;

        let is_move = matches!(value.kind, ast::ExprKind::Move { .. });
        if let Some(struct_name) = struct_name_of(&ty) {
            let hooks = self.check.lifecycle_of(struct_name);
            if hooks.has_oncopy && !is_move {
                self.builder.emit(IrInst::OnCopy { value: val.clone(), struct_name: struct_name.to_string() });
            }
        }

        self.builder.emit(IrInst::Store { ptr: Operand::Var(slot), value: val });
        self.locals.insert(name.to_string(), slot);
        self.const_locals.remove(name);

        if let Some(struct_name) = struct_name_of(&ty) {
            let hooks = self.check.lifecycle_of(struct_name);
            if hooks.has_destroy {
                self.track_lifecycle(name, slot, struct_name);
            }
        }
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&ast::Expr>) -> Result<()> {
        let skip_name = value.and_then(|e| match &e.kind {
            ast::ExprKind::Ident(id) => Some(id.name.clone()),
            _ => None,
        });

        if let Some(info) = self.current_throws.clone() {
            if let Some(e) = value {
                let v = self.lower_expr(e)?;
                let out_ptr = self.out_ptr_operand();
                self.builder.emit(IrInst::Store { ptr: out_ptr, value: v });
            }
            self.emit_return_destroys(skip_name.as_deref());
            self.builder.set_terminator(Terminator::Ret { value: Some(Operand::ConstInt(0)) });
            return Ok(());
        }

        match value {
            Some(e) if self.return_via_out => {
                let v = self.lower_expr(e)?;
                let out_ptr = self.value_out_ptr_operand();
                self.builder.emit(IrInst::Store { ptr: out_ptr, value: v });
                self.emit_return_destroys(skip_name.as_deref());
                self.builder.set_terminator(Terminator::RetVoid);
            }
            Some(e) => {
                let v = self.lower_expr(e)?;
                self.emit_return_destroys(skip_name.as_deref());
                self.builder.set_terminator(Terminator::Ret { value: Some(v) });
            }
            None => {
                self.emit_return_destroys(None);
                self.builder.set_terminator(Terminator::RetVoid);
            }
        }
        Ok(())
    }

    fn lower_break(&mut self) -> Result<()> {
        let Some(target) = self.loop_stack.last() else {
            // Checker has already rejected `break` outside a loop;
            // nothing well-defined to terminate with.
            return Ok(());
        };
        let (break_block, depth) = (target.break_block, target.scope_depth);
        self.emit_loop_exit_destroys(depth);
        self.builder.set_terminator(Terminator::Jump { target: break_block });
        Ok(())
    }

    fn lower_continue(&mut self) -> Result<()> {
        let Some(target) = self.loop_stack.last() else {
            return Ok(());
        };
        let (continue_block, depth) = (target.continue_block, target.scope_depth);
        self.emit_loop_exit_destroys(depth);
        self.builder.set_terminator(Terminator::Jump { target: continue_block });
        Ok(())
    }
}
