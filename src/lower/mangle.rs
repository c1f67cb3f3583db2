//! Name mangling and overload-suffix derivation (§4.1.1).

use crate::ir::IrType;

/// Derive the suffix mangling rules use for a resolved parameter type.
pub fn type_suffix(ty: &IrType) -> String {
    match ty {
        IrType::Int { bits, signed } => format!("{}{}", if *signed { "i" } else { "u" }, *bits as u32),
        IrType::Float { bits } => format!("f{}", *bits as u32),
        IrType::Bool => "bool".to_string(),
        IrType::String => "string".to_string(),
        IrType::Void => "void".to_string(),
        IrType::Ptr(inner) => format!("ptr_{}", type_suffix(inner)),
        IrType::Struct(s) => s.name.clone(),
        IrType::Enum(e) => e.name.clone(),
        IrType::Array { element, length } => format!("arr{}_{}", length, type_suffix(element)),
        IrType::Function { .. } => "fn".to_string(),
    }
}

/// Full name-mangling decision for a top-level function.
///
/// - non-overloaded, non-imported, non-prefixed names pass through unchanged;
/// - a module prefix (except on `main`) prepends `<prefix>_`;
/// - overloaded names additionally append `_<suffix>..._<suffix>` for
///   every parameter.
pub fn mangle_function(
    source_name: &str,
    module_prefix: Option<&str>,
    is_overloaded: bool,
    param_types: &[IrType],
) -> String {
    let mut name = source_name.to_string();

    if let Some(prefix) = module_prefix {
        if source_name != "main" {
            name = format!("{prefix}_{name}");
        }
    }

    if is_overloaded {
        for ty in param_types {
            name.push('_');
            name.push_str(&type_suffix(ty));
        }
    }

    name
}

/// Struct methods are emitted as top-level functions `<struct>_<method>`
/// (with module prefix applied the same way as a free function).
pub fn mangle_method(struct_name: &str, method_name: &str, module_prefix: Option<&str>) -> String {
    let base = format!("{struct_name}_{method_name}");
    match module_prefix {
        Some(prefix) => format!("{prefix}_{base}"),
        None => base,
    }
}

/// `mod.fn(args)` lowers to `<mod>_fn`.
pub fn mangle_qualified_call(module: &str, func: &str) -> String {
    format!("{module}_{func}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IntBits, StructTy};

    #[test]
    fn suffix_for_integers_and_pointers() {
        assert_eq!(type_suffix(&IrType::Int { bits: IntBits::B32, signed: true }), "i32");
        assert_eq!(type_suffix(&IrType::Int { bits: IntBits::B8, signed: false }), "u8");
        assert_eq!(type_suffix(&IrType::ptr(IrType::Bool)), "ptr_bool");
    }

    #[test]
    fn struct_suffix_uses_name() {
        let ty = IrType::Struct(StructTy { name: "Point".into(), fields: vec![] });
        assert_eq!(type_suffix(&ty), "Point");
    }

    #[test]
    fn overload_mangling_appends_all_param_suffixes() {
        let name = mangle_function("add", None, true, &[IrType::i32(), IrType::Float { bits: crate::ir::FloatBits::B64 }]);
        assert_eq!(name, "add_i32_f64");
    }

    #[test]
    fn prefix_skipped_for_main() {
        let name = mangle_function("main", Some("app"), false, &[]);
        assert_eq!(name, "main");
    }

    #[test]
    fn prefix_applied_to_non_main() {
        let name = mangle_function("helper", Some("app"), false, &[]);
        assert_eq!(name, "app_helper");
    }

    #[test]
    fn method_mangling_joins_struct_and_method() {
        assert_eq!(mangle_method("Point", "length", None), "Point_length");
        assert_eq!(mangle_method("Point", "length", Some("geo")), "geo_Point_length");
    }
}
