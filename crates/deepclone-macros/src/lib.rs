//! # deepclone macros
//!
//! `#[derive(Reflect)]` for plain structs with named fields.
//!
//! The derived type becomes a named record type whose fields follow the
//! struct declaration order. `pub` fields are exported; every other field is
//! unexported, so a deep copy leaves it at its zero value.
//!
//! ### Attributes
//!
//! - `#[reflect(name = "...")]` on the struct - runtime type name (default: the struct name)
//! - `#[reflect(rename = "...")]` on a field - runtime field name (default: the field name)
//!
//! ### Example
//!
//! ```ignore
//! use deepclone::Reflect;
//!
//! #[derive(Reflect)]
//! #[reflect(name = "Person")]
//! struct Person {
//!     #[reflect(rename = "Name")]
//!     pub name: String,
//!     pub friends: Vec<Box<Person>>,
//!     password: String,
//! }
//! ```
//!
//! Field types are resolved lazily, so a struct may refer to itself through
//! `Box`, `Option<Box<_>>` or `Vec`. Generic structs, tuple structs, enums
//! and unions are rejected.

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Fields, Ident, LitStr, Visibility, parse_macro_input,
    spanned::Spanned,
};

/// Derive `deepclone::Reflect` for a struct with named fields
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// A struct field as it appears in the runtime record type
struct FieldInfo {
    ident: Ident,
    name: String,
    ty: syn::Type,
    exported: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "#[derive(Reflect)] does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named
                .named
                .iter()
                .map(field_info)
                .collect::<syn::Result<Vec<_>>>()?,
            Fields::Unit => Vec::new(),
            Fields::Unnamed(unnamed) => {
                return Err(syn::Error::new(
                    unnamed.span(),
                    "#[derive(Reflect)] requires named fields; tuple structs are not supported",
                ));
            }
        },
        Data::Enum(data) => {
            return Err(syn::Error::new_spanned(
                data.enum_token,
                "#[derive(Reflect)] is only supported on structs",
            ));
        }
        Data::Union(data) => {
            return Err(syn::Error::new_spanned(
                data.union_token,
                "#[derive(Reflect)] is only supported on structs",
            ));
        }
    };

    let ident = &input.ident;
    let type_name = reflect_attr(&input.attrs, "name")?.unwrap_or_else(|| ident.to_string());

    let field_defs = fields.iter().map(|f| {
        let name = &f.name;
        let ty = &f.ty;
        let def = quote! {
            ::deepclone::Field::deferred(#name, <#ty as ::deepclone::Reflect>::reflect_type)
        };
        if f.exported {
            def
        } else {
            quote! { #def.private() }
        }
    });

    let idents: Vec<_> = fields.iter().map(|f| &f.ident).collect();
    let types: Vec<_> = fields.iter().map(|f| &f.ty).collect();
    let indices = 0..fields.len();

    Ok(quote! {
        impl ::deepclone::Reflect for #ident {
            fn reflect_type() -> ::deepclone::Type {
                static TYPE: ::std::sync::OnceLock<::deepclone::Type> = ::std::sync::OnceLock::new();
                TYPE.get_or_init(|| {
                    ::deepclone::Type::named(
                        #type_name,
                        ::deepclone::Type::record(::std::vec![#(#field_defs),*]),
                    )
                })
                .clone()
            }

            fn to_value(&self) -> ::deepclone::Value {
                ::deepclone::Value::from_record_parts(
                    <Self as ::deepclone::Reflect>::reflect_type(),
                    ::std::vec![#(<#types as ::deepclone::Reflect>::to_value(&self.#idents)),*],
                )
            }

            fn from_value(value: &::deepclone::Value) -> ::deepclone::CloneResult<Self> {
                let ty = <Self as ::deepclone::Reflect>::reflect_type();
                let value = value.concrete();
                if value.type_of() != ::std::option::Option::Some(&ty) {
                    return ::std::result::Result::Err(
                        ::deepclone::CloneError::type_mismatch(&ty, value.type_of()),
                    );
                }
                ::std::result::Result::Ok(Self {
                    #(#idents: <#types as ::deepclone::Reflect>::from_value(&value.field_at(#indices)?)?,)*
                })
            }
        }
    })
}

fn field_info(field: &syn::Field) -> syn::Result<FieldInfo> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?;
    let name = reflect_attr(&field.attrs, "rename")?.unwrap_or_else(|| ident.to_string());
    Ok(FieldInfo {
        ident,
        name,
        ty: field.ty.clone(),
        exported: matches!(field.vis, Visibility::Public(_)),
    })
}

/// Value of `#[reflect(key = "...")]`, rejecting any other key
fn reflect_attr(attrs: &[Attribute], key: &str) -> syn::Result<Option<String>> {
    let mut found = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("reflect")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) {
                let lit: LitStr = meta.value()?.parse()?;
                found = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error(format!("unknown reflect attribute, expected `{key}`")))
            }
        })?;
    }
    Ok(found)
}
