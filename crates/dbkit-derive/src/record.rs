//! Record derive macro implementation
//!
//! Generates a `Record` impl whose descriptor is built once, on first use. Each field
//! contributes a `FieldDescriptor` with plain `fn` accessors, so the runtime never needs
//! type information beyond `TypeId`.

mod attrs;

use crate::common::syn_types::{Wrapper, embedded_wrapper, is_named, is_trait_object};
use attrs::{FieldAttr, struct_table};
use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Record can only be derived for structs",
            ));
        }
    };

    let mut table = struct_table(&input)?;
    let mut descriptors = Vec::new();
    for field in fields {
        let attr = FieldAttr::parse(field)?;
        if attr.skip {
            continue;
        }
        if is_named(&field.ty, "TableMeta") && table.is_none() {
            table = attr.table.clone();
        }
        descriptors.push(field_descriptor(name, field, &attr)?);
    }
    let table = table.unwrap_or_else(|| name.to_string().to_snake_case());

    Ok(quote! {
        impl ::dbkit::Record for #name {
            fn descriptor() -> &'static ::dbkit::RecordDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<::dbkit::RecordDescriptor> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    ::dbkit::RecordDescriptor::new::<#name>(::std::vec![#(#descriptors),*])
                        .with_table(#table)
                })
            }
        }
    })
}

fn field_descriptor(
    owner: &syn::Ident,
    field: &syn::Field,
    attr: &FieldAttr,
) -> Result<TokenStream> {
    let Some(ident) = field.ident.as_ref() else {
        return Err(syn::Error::new_spanned(field, "expected a named field"));
    };
    let field_name = ident.to_string();
    let ty = &field.ty;

    if attr.relation.is_some() {
        return Ok(quote! { ::dbkit::FieldDescriptor::relation(#field_name) });
    }
    if is_named(ty, "TableMeta") {
        return Ok(quote! { ::dbkit::FieldDescriptor::meta(#field_name) });
    }
    if attr.table.is_some() {
        return Err(syn::Error::new_spanned(
            field,
            "#[orm(table = ...)] belongs on the struct or on a TableMeta field",
        ));
    }
    if is_trait_object(ty) {
        return Ok(quote! { ::dbkit::FieldDescriptor::opaque(#field_name) });
    }

    let descriptor = if attr.flatten {
        embedded(owner, ident, ty)
    } else {
        let constructor = if attr.scan {
            quote!(scanned)
        } else if attr.json {
            quote!(json)
        } else {
            quote!(value)
        };
        quote! {{
            fn get(record: &dyn ::std::any::Any) -> ::std::option::Option<&dyn ::std::any::Any> {
                record
                    .downcast_ref::<#owner>()
                    .map(|r| &r.#ident as &dyn ::std::any::Any)
            }
            fn get_mut(
                record: &mut dyn ::std::any::Any,
            ) -> ::std::option::Option<&mut dyn ::std::any::Any> {
                record
                    .downcast_mut::<#owner>()
                    .map(|r| &mut r.#ident as &mut dyn ::std::any::Any)
            }
            ::dbkit::FieldDescriptor::#constructor::<#ty>(#field_name, get, get_mut)
        }}
    };

    let mut tokens = descriptor;
    if let Some(column) = &attr.column {
        tokens = quote! { #tokens.orm_tag(#column) };
    }
    if let Some(rename) = &attr.serde_rename {
        tokens = quote! { #tokens.serde_tag(#rename) };
    }
    if attr.primary {
        tokens = quote! { #tokens.primary() };
    }
    Ok(tokens)
}

/// Accessors for a flattened record. Optional levels are allocated on first write.
fn embedded(owner: &syn::Ident, ident: &syn::Ident, ty: &syn::Type) -> TokenStream {
    let (wrapper, record) = embedded_wrapper(ty);
    let (get, get_mut) = match wrapper {
        Wrapper::Plain => (
            quote! { .map(|r| &r.#ident as &dyn ::std::any::Any) },
            quote! { .map(|r| &mut r.#ident as &mut dyn ::std::any::Any) },
        ),
        Wrapper::Boxed => (
            quote! { .map(|r| &*r.#ident as &dyn ::std::any::Any) },
            quote! { .map(|r| &mut *r.#ident as &mut dyn ::std::any::Any) },
        ),
        Wrapper::Optional => (
            quote! {
                .and_then(|r| r.#ident.as_ref())
                .map(|inner| inner as &dyn ::std::any::Any)
            },
            quote! {
                .map(|r| {
                    r.#ident.get_or_insert_with(::std::default::Default::default)
                        as &mut dyn ::std::any::Any
                })
            },
        ),
        Wrapper::OptionalBoxed => (
            quote! {
                .and_then(|r| r.#ident.as_deref())
                .map(|inner| inner as &dyn ::std::any::Any)
            },
            quote! {
                .map(|r| {
                    &mut **r.#ident.get_or_insert_with(::std::default::Default::default)
                        as &mut dyn ::std::any::Any
                })
            },
        ),
    };
    let field_name = ident.to_string();

    quote! {{
        fn get(record: &dyn ::std::any::Any) -> ::std::option::Option<&dyn ::std::any::Any> {
            record.downcast_ref::<#owner>()#get
        }
        fn get_mut(
            record: &mut dyn ::std::any::Any,
        ) -> ::std::option::Option<&mut dyn ::std::any::Any> {
            record.downcast_mut::<#owner>()#get_mut
        }
        ::dbkit::FieldDescriptor::embedded::<#record>(#field_name, get, get_mut)
    }}
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expanded(input: DeriveInput) -> String {
        expand(input).unwrap().to_string()
    }

    #[test]
    fn test_expand_basic_record() {
        let out = expanded(parse_quote! {
            struct UserAccount {
                #[orm(primary)]
                id: i64,
                #[orm(column = "user_name")]
                name: String,
                #[orm(skip)]
                scratch: String,
            }
        });
        assert!(out.contains("impl :: dbkit :: Record for UserAccount"));
        assert!(out.contains("with_table (\"user_account\")"));
        assert!(out.contains("value :: < i64 > (\"id\""));
        assert!(out.contains(". orm_tag (\"user_name\")"));
        assert!(out.contains(". primary ()"));
        assert!(!out.contains("scratch"));
    }

    #[test]
    fn test_expand_field_kinds() {
        let out = expanded(parse_quote! {
            struct Order {
                #[orm(table = "orders")]
                meta: TableMeta,
                #[orm(flatten)]
                address: Option<Box<Address>>,
                #[orm(with = "uid=id")]
                items: Vec<Item>,
                notifier: Option<Box<dyn Notifier>>,
                #[orm(json)]
                tags: Vec<String>,
                #[orm(scan)]
                amount: Money,
            }
        });
        assert!(out.contains("with_table (\"orders\")"));
        assert!(out.contains("meta (\"meta\")"));
        assert!(out.contains("embedded :: < Address > (\"address\""));
        assert!(out.contains("get_or_insert_with"));
        assert!(out.contains("relation (\"items\")"));
        assert!(out.contains("opaque (\"notifier\")"));
        assert!(out.contains("json :: < Vec < String > > (\"tags\""));
        assert!(out.contains("scanned :: < Money > (\"amount\""));
    }

    #[test]
    fn test_rejects_unsupported_shapes() {
        assert!(expand(parse_quote! { struct Wrapper<T> { inner: T } }).is_err());
        assert!(expand(parse_quote! { struct Pair(i64, i64); }).is_err());
        assert!(expand(parse_quote! { enum Kind { A, B } }).is_err());
        assert!(
            expand(parse_quote! {
                struct Bad {
                    #[orm(table = "bad")]
                    id: i64,
                }
            })
            .is_err()
        );
    }
}
