//! Procedural macros for the docwire project.
//!
//! This crate provides `#[derive(Entity)]`, which implements both
//! `docwire::document::Descriptor` and `docwire::document::Entity` for a struct.
//!
//! # Attributes
//!
//! - `#[entity(collection = "name")]` on the struct sets the collection. Defaults to the
//!   lowercased struct name.
//! - `#[entity(id)]` on an `Option<_>` field marks the identifier. Without it, the field
//!   serialized as `_id` is used.
//! - `#[entity(id, generator = "path::to::fn")]` mints identifiers by calling `fn()`. The
//!   return value must convert into `bson::Bson`. Defaults to a new `ObjectId`.
//!
//! `#[serde(rename = "...")]` on the identifier field is honored.

#[allow(unused_extern_crates)]
extern crate self as docwire_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Expr, ExprLit, Field, Fields, GenericArgument, Ident, Lit, LitStr, Meta, Path,
    PathArguments, Token, Type, parse_macro_input, punctuated::Punctuated,
};

#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_entity(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

struct IdField {
    ident: Ident,
    serialized_name: String,
    generator: Option<Path>,
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let collection = collection_name(&input)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Entity can only be derived for structs with named fields",
                ));
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "Entity can only be derived for structs")),
    };

    let id = id_field(name, fields.iter())?;
    let id_ident = &id.ident;
    let id_name = &id.serialized_name;

    let generate = id.generator.as_ref().map(|generator| {
        quote! {
            fn generate_identifier(&self) -> ::docwire::bson::Bson {
                ::docwire::bson::Bson::from(#generator())
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::docwire::document::Descriptor for #name #ty_generics #where_clause {
            fn id_field() -> &'static str {
                #id_name
            }

            fn identifier(&self) -> ::core::option::Option<::docwire::bson::Bson> {
                self.#id_ident
                    .as_ref()
                    .and_then(|value| ::docwire::bson::ser::serialize_to_bson(value).ok())
                    .filter(|value| !::core::matches!(value, ::docwire::bson::Bson::Null))
            }

            fn set_identifier(
                &mut self,
                value: ::docwire::bson::Bson,
            ) -> ::docwire::error::DocumentStoreResult<()> {
                self.#id_ident = ::core::option::Option::Some(::docwire::bson::de::deserialize_from_bson(value)?);

                ::core::result::Result::Ok(())
            }

            #generate
        }

        impl #impl_generics ::docwire::document::Entity for #name #ty_generics #where_clause {
            fn collection_name() -> &'static str {
                #collection
            }
        }
    })
}

fn collection_name(input: &DeriveInput) -> syn::Result<String> {
    let mut collection = None;

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                collection = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported entity attribute, expected `collection`"))
            }
        })?;
    }

    Ok(collection.unwrap_or_else(|| input.ident.to_string().to_lowercase()))
}

fn id_field<'a>(name: &Ident, fields: impl Iterator<Item = &'a Field>) -> syn::Result<IdField> {
    let mut marked = None;
    let mut fallback = None;

    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let serialized_name = serde_rename(field)?.unwrap_or_else(|| ident.to_string());

        let mut is_id = false;
        let mut generator = None;
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    is_id = true;
                    Ok(())
                } else if meta.path.is_ident("generator") {
                    let value: LitStr = meta.value()?.parse()?;
                    generator = Some(value.parse::<Path>()?);
                    Ok(())
                } else {
                    Err(meta.error("unsupported entity attribute, expected `id` or `generator`"))
                }
            })?;
        }

        if generator.is_some() && !is_id {
            return Err(syn::Error::new_spanned(field, "`generator` requires `id`"));
        }

        if is_id {
            if marked.is_some() {
                return Err(syn::Error::new_spanned(field, "only one field can be marked `#[entity(id)]`"));
            }
            ensure_option(field)?;
            marked = Some(IdField { ident, serialized_name, generator });
        } else if serialized_name == "_id" && fallback.is_none() {
            fallback = Some((field, IdField { ident, serialized_name, generator: None }));
        }
    }

    if let Some(id) = marked {
        return Ok(id);
    }

    match fallback {
        Some((field, id)) => {
            ensure_option(field)?;
            Ok(id)
        }
        None => Err(syn::Error::new_spanned(
            name,
            "no identifier field; mark one with `#[entity(id)]` or serialize one as `_id`",
        )),
    }
}

fn serde_rename(field: &Field) -> syn::Result<Option<String>> {
    let mut rename = None;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
        for meta in metas {
            if let Meta::NameValue(pair) = meta
                && pair.path.is_ident("rename")
                && let Expr::Lit(ExprLit { lit: Lit::Str(value), .. }) = &pair.value
            {
                rename = Some(value.value());
            }
        }
    }

    Ok(rename)
}

fn ensure_option(field: &Field) -> syn::Result<()> {
    if let Type::Path(path) = &field.ty
        && let Some(segment) = path.path.segments.last()
        && segment.ident == "Option"
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && matches!(args.args.first(), Some(GenericArgument::Type(_)))
    {
        return Ok(());
    }

    Err(syn::Error::new_spanned(&field.ty, "the identifier field must be an `Option<_>`"))
}
