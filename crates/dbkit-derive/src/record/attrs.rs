//! Attribute parsing for the Record derive macro.
//!
//! Reads `#[orm(...)]` and the subset of `#[serde(...)]` that affects column mapping
//! (`rename`, `flatten`, `skip`).

use syn::punctuated::Punctuated;
use syn::{Attribute, DeriveInput, Meta, Result, Token};

/// Parsed field-level attributes.
#[derive(Debug, Default)]
pub(super) struct FieldAttr {
    pub column: Option<String>,
    pub serde_rename: Option<String>,
    pub table: Option<String>,
    pub relation: Option<String>,
    pub flatten: bool,
    pub skip: bool,
    pub scan: bool,
    pub json: bool,
    pub primary: bool,
}

fn string_value(meta: &Meta) -> Result<String> {
    let name_value = meta.require_name_value()?;
    match &name_value.value {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) => Ok(lit.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn nested(attr: &Attribute) -> Result<Punctuated<Meta, Token![,]>> {
    attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
}

impl FieldAttr {
    pub(super) fn parse(field: &syn::Field) -> Result<Self> {
        let mut out = Self::default();
        for attr in &field.attrs {
            if attr.path().is_ident("orm") {
                for meta in nested(attr)? {
                    out.apply_orm(&meta)?;
                }
            } else if attr.path().is_ident("serde") {
                for meta in nested(attr)? {
                    out.apply_serde(&meta)?;
                }
            }
        }

        if out.scan && out.json {
            return Err(syn::Error::new_spanned(
                field,
                "#[orm(scan)] and #[orm(json)] are mutually exclusive",
            ));
        }
        if out.flatten && (out.scan || out.json) {
            return Err(syn::Error::new_spanned(
                field,
                "a flattened field cannot use #[orm(scan)] or #[orm(json)]",
            ));
        }
        Ok(out)
    }

    fn apply_orm(&mut self, meta: &Meta) -> Result<()> {
        let path = meta.path();
        if path.is_ident("column") {
            self.column = Some(string_value(meta)?);
        } else if path.is_ident("table") {
            self.table = Some(string_value(meta)?);
        } else if path.is_ident("with") {
            self.relation = Some(string_value(meta)?);
        } else if path.is_ident("flatten") {
            meta.require_path_only()?;
            self.flatten = true;
        } else if path.is_ident("skip") {
            meta.require_path_only()?;
            self.skip = true;
        } else if path.is_ident("scan") {
            meta.require_path_only()?;
            self.scan = true;
        } else if path.is_ident("json") {
            meta.require_path_only()?;
            self.json = true;
        } else if path.is_ident("primary") {
            meta.require_path_only()?;
            self.primary = true;
        } else {
            return Err(syn::Error::new_spanned(
                path,
                "unknown orm attribute; expected one of: column, table, with, flatten, skip, scan, json, primary",
            ));
        }
        Ok(())
    }

    /// Serde keys that do not affect column mapping are ignored.
    fn apply_serde(&mut self, meta: &Meta) -> Result<()> {
        match meta {
            Meta::NameValue(_) if meta.path().is_ident("rename") => {
                self.serde_rename = Some(string_value(meta)?);
            }
            Meta::Path(path) if path.is_ident("flatten") => self.flatten = true,
            Meta::Path(path) if path.is_ident("skip") => self.skip = true,
            _ => {}
        }
        Ok(())
    }
}

/// Struct-level `#[orm(table = "...")]`.
pub(super) fn struct_table(input: &DeriveInput) -> Result<Option<String>> {
    let mut table = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("orm") {
            continue;
        }
        for meta in nested(attr)? {
            if meta.path().is_ident("table") {
                table = Some(string_value(&meta)?);
            } else {
                return Err(syn::Error::new_spanned(
                    meta.path(),
                    "unknown orm attribute on a struct; expected `table`",
                ));
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_field_attrs() {
        let field: syn::Field = parse_quote! {
            #[orm(column = "user_name", primary)]
            #[serde(rename = "userName", default)]
            name: String
        };
        let attr = FieldAttr::parse(&field).unwrap();
        assert_eq!(attr.column.as_deref(), Some("user_name"));
        assert_eq!(attr.serde_rename.as_deref(), Some("userName"));
        assert!(attr.primary);
        assert!(!attr.flatten);
    }

    #[test]
    fn test_serde_flatten_and_skip() {
        let field: syn::Field = parse_quote! {
            #[serde(flatten, skip_serializing_if = "Option::is_none")]
            profile: Option<Profile>
        };
        assert!(FieldAttr::parse(&field).unwrap().flatten);

        let field: syn::Field = parse_quote! {
            #[serde(skip)]
            scratch: String
        };
        assert!(FieldAttr::parse(&field).unwrap().skip);
    }

    #[test]
    fn test_relation_and_table() {
        let field: syn::Field = parse_quote! {
            #[orm(with = "uid=id")]
            orders: Vec<Order>
        };
        assert_eq!(
            FieldAttr::parse(&field).unwrap().relation.as_deref(),
            Some("uid=id")
        );

        let input: DeriveInput = parse_quote! {
            #[orm(table = "users")]
            struct User { id: i64 }
        };
        assert_eq!(struct_table(&input).unwrap().as_deref(), Some("users"));
    }

    #[test]
    fn test_invalid_attrs() {
        let field: syn::Field = parse_quote! {
            #[orm(colum = "x")]
            name: String
        };
        assert!(FieldAttr::parse(&field).is_err());

        let field: syn::Field = parse_quote! {
            #[orm(scan, json)]
            tags: Tags
        };
        assert!(FieldAttr::parse(&field).is_err());

        let field: syn::Field = parse_quote! {
            #[orm(column = 5)]
            name: String
        };
        assert!(FieldAttr::parse(&field).is_err());
    }
}
