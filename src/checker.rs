//! The auxiliary input the lowerer expects alongside a [`crate::ast::Program`].
//!
//! None of this is computed here — it is the contract a type checker
//! (out of scope for this crate) is expected to hand the lowerer. What
//! lives in this module is the shape of that contract (§3.7) plus small
//! builder helpers the test fixtures use to construct it by hand.

use std::collections::{HashMap, HashSet};

use crate::ast::ExprId;
use crate::ir::IrType;

/// Per-program (or per-module) output of the type checker.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    /// Every expression's resolved semantic type.
    pub expr_types: HashMap<ExprId, IrType>,
    /// Call-site expressions resolved to a monomorphized or mangled
    /// callee name, when the source name alone is not enough (generics,
    /// overloads, module qualification).
    pub call_targets: HashMap<ExprId, String>,
    /// Expressions (indexing, some operators) that actually resolve to
    /// an operator-method call; value is the method's mangled name.
    pub operator_methods: HashMap<ExprId, String>,
    /// Functions declared `throws`, keyed by their mangled name.
    pub throws_functions: HashMap<String, ThrowsInfo>,
    /// Structs carrying `__destroy`/`__oncopy`, keyed by struct name.
    pub lifecycle_hooks: HashMap<String, LifecycleHooks>,
    /// Mangled names that correspond to an overloaded source function.
    pub overloaded_names: HashSet<String>,
    /// Per-module import/prefix bookkeeping, keyed by module name.
    pub modules: HashMap<String, ModuleInfo>,
}

/// A throwing function's original return type and its ordered error list.
/// `Ek`'s tag is `index + 1` within `errors`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrowsInfo {
    pub original_return: IrType,
    pub errors: Vec<IrType>,
}

impl ThrowsInfo {
    /// The 1-based tag of a named error type, if it is one of this
    /// function's declared errors.
    pub fn tag_of(&self, error_name: &str) -> Option<i64> {
        self.errors.iter().position(|e| matches!(e, IrType::Struct(s) if s.name == error_name))
            .map(|idx| (idx + 1) as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleHooks {
    pub has_destroy: bool,
    pub has_oncopy: bool,
}

impl LifecycleHooks {
    pub fn any(&self) -> bool {
        self.has_destroy || self.has_oncopy
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    /// Prefix prepended (as `<prefix>_`) to this module's non-`main`
    /// top-level functions during mangling.
    pub prefix: Option<String>,
    /// Imported-name → mangled-name, for names pulled in from other
    /// modules.
    pub imports: HashMap<String, String>,
    /// The subset of `imports` whose source function is overloaded.
    pub overloaded_imports: HashSet<String>,
}

impl CheckResult {
    pub fn type_of(&self, expr: ExprId) -> Option<&IrType> {
        self.expr_types.get(&expr)
    }

    pub fn call_target(&self, expr: ExprId) -> Option<&str> {
        self.call_targets.get(&expr).map(String::as_str)
    }

    pub fn operator_method(&self, expr: ExprId) -> Option<&str> {
        self.operator_methods.get(&expr).map(String::as_str)
    }

    pub fn throws_info(&self, mangled_name: &str) -> Option<&ThrowsInfo> {
        self.throws_functions.get(mangled_name)
    }

    pub fn is_overloaded(&self, mangled_name: &str) -> bool {
        self.overloaded_names.contains(mangled_name)
    }

    pub fn lifecycle_of(&self, struct_name: &str) -> LifecycleHooks {
        self.lifecycle_hooks.get(struct_name).cloned().unwrap_or_default()
    }
}
