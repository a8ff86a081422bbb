//! Type helper utilities for syn type analysis.

/// The single generic argument of a path type whose last segment is `name`.
fn single_arg<'a>(ty: &'a syn::Type, name: &str) -> Option<&'a syn::Type> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let seg = type_path.path.segments.last()?;
    if seg.ident != name {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &seg.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    let syn::GenericArgument::Type(inner) = args.args.first()? else {
        return None;
    };
    Some(inner)
}

/// Extract the inner type T from Option<T>, or return None if not an Option type.
///
/// Recognizes `Option<T>`, `std::option::Option<T>`, and `core::option::Option<T>`.
pub fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    single_arg(ty, "Option")
}

/// Extract the inner type T from Box<T>.
pub fn box_inner(ty: &syn::Type) -> Option<&syn::Type> {
    single_arg(ty, "Box")
}

/// Whether the last path segment of `ty` is `name`, e.g. `TableMeta` or `dbkit::TableMeta`.
pub fn is_named(ty: &syn::Type, name: &str) -> bool {
    match ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .is_some_and(|seg| seg.ident == name),
        _ => false,
    }
}

/// `dyn Trait`, possibly behind `Box`, `Option`, `Arc` or a reference.
pub fn is_trait_object(ty: &syn::Type) -> bool {
    match ty {
        syn::Type::TraitObject(_) => true,
        syn::Type::Reference(reference) => is_trait_object(&reference.elem),
        syn::Type::Paren(paren) => is_trait_object(&paren.elem),
        _ => ["Box", "Option", "Arc", "Rc"]
            .iter()
            .find_map(|wrapper| single_arg(ty, wrapper))
            .is_some_and(is_trait_object),
    }
}

/// How a flattened record is held by its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    /// `T`
    Plain,
    /// `Box<T>`
    Boxed,
    /// `Option<T>`
    Optional,
    /// `Option<Box<T>>`
    OptionalBoxed,
}

/// Split a flattened field type into its wrapper and the record type inside.
pub fn embedded_wrapper(ty: &syn::Type) -> (Wrapper, &syn::Type) {
    if let Some(inner) = option_inner(ty) {
        return match box_inner(inner) {
            Some(record) => (Wrapper::OptionalBoxed, record),
            None => (Wrapper::Optional, inner),
        };
    }
    match box_inner(ty) {
        Some(record) => (Wrapper::Boxed, record),
        None => (Wrapper::Plain, ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;
    use syn::parse_quote;

    fn tokens(ty: &syn::Type) -> String {
        ty.to_token_stream().to_string()
    }

    #[test]
    fn test_option_inner() {
        let ty: syn::Type = parse_quote!(Option<String>);
        assert!(option_inner(&ty).is_some());

        let ty: syn::Type = parse_quote!(std::option::Option<i32>);
        assert!(option_inner(&ty).is_some());

        let ty: syn::Type = parse_quote!(String);
        assert!(option_inner(&ty).is_none());

        let ty: syn::Type = parse_quote!(Vec<String>);
        assert!(option_inner(&ty).is_none());
    }

    #[test]
    fn test_embedded_wrapper() {
        let ty: syn::Type = parse_quote!(Address);
        let (wrapper, inner) = embedded_wrapper(&ty);
        assert_eq!(wrapper, Wrapper::Plain);
        assert_eq!(tokens(inner), "Address");

        let ty: syn::Type = parse_quote!(Box<Address>);
        assert_eq!(embedded_wrapper(&ty).0, Wrapper::Boxed);

        let ty: syn::Type = parse_quote!(Option<Address>);
        assert_eq!(embedded_wrapper(&ty).0, Wrapper::Optional);

        let ty: syn::Type = parse_quote!(Option<Box<crate::Address>>);
        let (wrapper, inner) = embedded_wrapper(&ty);
        assert_eq!(wrapper, Wrapper::OptionalBoxed);
        assert_eq!(tokens(inner), "crate :: Address");
    }

    #[test]
    fn test_trait_objects() {
        let ty: syn::Type = parse_quote!(Box<dyn Fn() + Send>);
        assert!(is_trait_object(&ty));

        let ty: syn::Type = parse_quote!(Option<std::sync::Arc<dyn Notifier>>);
        assert!(is_trait_object(&ty));

        let ty: syn::Type = parse_quote!(Box<Address>);
        assert!(!is_trait_object(&ty));
    }

    #[test]
    fn test_is_named() {
        let ty: syn::Type = parse_quote!(dbkit::TableMeta);
        assert!(is_named(&ty, "TableMeta"));

        let ty: syn::Type = parse_quote!(Option<TableMeta>);
        assert!(!is_named(&ty, "TableMeta"));
    }
}
