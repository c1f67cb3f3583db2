//! Lifecycle-hook insertion: `destroy`/`oncopy` scope bookkeeping (§4.1.7).

use crate::ir::{IrInst, Operand, VarId};

use super::builder::ScopeEntry;
use super::Lowerer;

impl Lowerer<'_> {
    pub(super) fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Pops the innermost scope, emitting `destroy` for every tracked
    /// entry in reverse declaration order, skipping names that were
    /// moved out of.
    pub(super) fn pop_scope(&mut self) {
        let Some(entries) = self.scopes.pop() else { return };
        self.emit_destroys_for(&entries);
    }

    pub(super) fn track_lifecycle(&mut self, name: &str, alloca: VarId, struct_name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(ScopeEntry {
                name: name.to_string(),
                alloca,
                struct_name: struct_name.to_string(),
            });
        }
    }

    pub(super) fn mark_moved(&mut self, name: &str) {
        self.moved.insert(name.to_string());
    }

    fn emit_destroys_for(&mut self, entries: &[ScopeEntry]) {
        for entry in entries.iter().rev() {
            if self.moved.contains(&entry.name) {
                continue;
            }
            self.builder.emit(IrInst::Destroy {
                value: Operand::Var(entry.alloca),
                struct_name: entry.struct_name.clone(),
            });
        }
    }

    /// Emits destroys across the *entire* scope stack (used by
    /// `return`), skipping the scope entry whose name equals
    /// `skip_name` since ownership transfers out through the return
    /// value.
    pub(super) fn emit_return_destroys(&mut self, skip_name: Option<&str>) {
        for scope in self.scopes.clone().iter().rev() {
            for entry in scope.iter().rev() {
                if self.moved.contains(&entry.name) {
                    continue;
                }
                if skip_name == Some(entry.name.as_str()) {
                    continue;
                }
                self.builder.emit(IrInst::Destroy {
                    value: Operand::Var(entry.alloca),
                    struct_name: entry.struct_name.clone(),
                });
            }
        }
    }

    /// Emits destroys for scopes opened since `depth` (used by
    /// `break`/`continue`, which only unwind loop-local scopes).
    pub(super) fn emit_loop_exit_destroys(&mut self, depth: usize) {
        for scope in self.scopes.clone()[depth..].iter().rev() {
            for entry in scope.iter().rev() {
                if self.moved.contains(&entry.name) {
                    continue;
                }
                self.builder.emit(IrInst::Destroy {
                    value: Operand::Var(entry.alloca),
                    struct_name: entry.struct_name.clone(),
                });
            }
        }
    }
}
