use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::{Data, DeriveInput, Field, Fields, LitStr, Token, Type};

pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

#[derive(Default)]
struct ContainerOptions {
    collection: Option<String>,
    tag: Option<String>,
    rename_all: Option<RenameRule>,
}

/// Serde's `rename_all` rules, as applied to snake_case field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn parse(lit: &LitStr) -> syn::Result<Self> {
        Ok(match lit.value().as_str() {
            "lowercase" => RenameRule::Lower,
            "UPPERCASE" => RenameRule::Upper,
            "PascalCase" => RenameRule::Pascal,
            "camelCase" => RenameRule::Camel,
            "snake_case" => RenameRule::Snake,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnake,
            "kebab-case" => RenameRule::Kebab,
            "SCREAMING-KEBAB-CASE" => RenameRule::ScreamingKebab,
            other => {
                return Err(syn::Error::new_spanned(
                    lit,
                    format!("unknown rename_all rule `{}`", other),
                ))
            }
        })
    }

    fn apply(self, field: &str) -> String {
        match self {
            RenameRule::Lower | RenameRule::Snake => field.to_string(),
            RenameRule::Upper | RenameRule::ScreamingSnake => field.to_ascii_uppercase(),
            RenameRule::Pascal => {
                let mut pascal = String::new();
                let mut capitalize = true;
                for ch in field.chars() {
                    if ch == '_' {
                        capitalize = true;
                    } else if capitalize {
                        pascal.push(ch.to_ascii_uppercase());
                        capitalize = false;
                    } else {
                        pascal.push(ch);
                    }
                }
                pascal
            }
            RenameRule::Camel => {
                let pascal = RenameRule::Pascal.apply(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => pascal,
                }
            }
            RenameRule::Kebab => field.replace('_', "-"),
            RenameRule::ScreamingKebab => field.to_ascii_uppercase().replace('_', "-"),
        }
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let options = container_options(input)?;
    let collection = options
        .collection
        .unwrap_or_else(|| format!("{}s", to_snake_case(&name.unraw().to_string())));
    let tag = options.tag.unwrap_or_else(|| name.unraw().to_string());
    let keys = key_fields(input, options.rename_all)?;
    let key_names = keys.iter().map(|(name, _)| name);
    let key_types = keys.iter().map(|(_, ty)| ty);

    Ok(quote! {
        impl #impl_generics ::salus::Record for #name #ty_generics #where_clause {
            const COLLECTION: &'static str = #collection;
            const TAG: &'static str = #tag;
            const KEY_FIELDS: &'static [&'static str] = &[#(#key_names),*];
            const KEY_KINDS: &'static [::salus::KeyKind] =
                &[#(<#key_types as ::salus::KeyType>::KIND),*];
        }
    })
}

fn container_options(input: &DeriveInput) -> syn::Result<ContainerOptions> {
    let mut options = ContainerOptions::default();

    for attr in &input.attrs {
        if attr.path().is_ident("record") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("collection") {
                    let value: LitStr = meta.value()?.parse()?;
                    options.collection = Some(value.value());
                    Ok(())
                } else if meta.path.is_ident("tag") {
                    let value: LitStr = meta.value()?.parse()?;
                    options.tag = Some(value.value());
                    Ok(())
                } else {
                    Err(meta.error("expected `collection = \"...\"` or `tag = \"...\"`"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename_all") {
                    if let Some(rule) = serialized_name(&meta)? {
                        options.rename_all = Some(RenameRule::parse(&rule)?);
                    }
                    Ok(())
                } else {
                    skip_meta(&meta)
                }
            })?;
        }
    }

    Ok(options)
}

fn key_fields(
    input: &DeriveInput,
    rename_all: Option<RenameRule>,
) -> syn::Result<Vec<(String, Type)>> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Record derive requires a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Record derive only supports structs",
            ))
        }
    };

    let mut keys = Vec::new();
    let mut id_field = None;

    for field in fields {
        let Some(ident) = &field.ident else {
            continue;
        };

        let mut is_key = false;
        for attr in &field.attrs {
            if attr.path().is_ident("record") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("key") {
                        is_key = true;
                        Ok(())
                    } else {
                        Err(meta.error("expected `key`"))
                    }
                })?;
            }
        }

        let serialized = match serde_rename(field)? {
            Some(renamed) => renamed,
            None => {
                let raw = ident.unraw().to_string();
                match rename_all {
                    Some(rule) => rule.apply(&raw),
                    None => raw,
                }
            }
        };
        if is_key {
            keys.push((serialized, field.ty.clone()));
        } else if ident == "id" {
            id_field = Some((serialized, field.ty.clone()));
        }
    }

    if keys.is_empty() {
        if let Some(id) = id_field {
            keys.push(id);
        }
    }

    if keys.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Record derive: no field marked #[record(key)] and no field named `id`",
        ));
    }

    Ok(keys)
}

/// The name serde writes for this field, when renamed with
/// `#[serde(rename = "...")]` or `#[serde(rename(serialize = "..."))]`.
fn serde_rename(field: &Field) -> syn::Result<Option<String>> {
    let mut renamed = None;

    for attr in &field.attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if let Some(name) = serialized_name(&meta)? {
                    renamed = Some(name.value());
                }
                Ok(())
            } else {
                skip_meta(&meta)
            }
        })?;
    }

    Ok(renamed)
}

/// `key = "..."` or `key(serialize = "...", deserialize = "...")`.
fn serialized_name(meta: &ParseNestedMeta) -> syn::Result<Option<LitStr>> {
    if meta.input.peek(Token![=]) {
        return Ok(Some(meta.value()?.parse()?));
    }

    let mut name = None;
    meta.parse_nested_meta(|inner| {
        let value: LitStr = inner.value()?.parse()?;
        if inner.path.is_ident("serialize") {
            name = Some(value);
        }
        Ok(())
    })?;
    Ok(name)
}

/// Consume a serde option this derive does not care about.
fn skip_meta(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta(&inner))?;
    }
    Ok(())
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
