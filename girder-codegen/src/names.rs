//! Identifier and naming utilities shared by the generators.

use heck::{ToSnakeCase, ToUpperCamelCase};
use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;

/// Build an identifier at the call site span.
pub fn ident(name: &str) -> Ident {
    Ident::new(name, Span::call_site())
}

/// Snake-cased, keyword-safe field identifier for an IR field name. Wire
/// names are preserved separately via serde attributes and the encoding
/// descriptions, so the ident only has to be a valid target identifier.
pub fn field_ident(name: &str) -> Ident {
    let snaked = name.to_snake_case();
    // `self`/`super`/`crate` cannot even be raw identifiers.
    if matches!(snaked.as_str(), "self" | "super" | "crate" | "_") {
        return Ident::new(&format!("{snaked}_"), Span::call_site());
    }
    match syn::parse_str::<Ident>(&snaked) {
        Ok(id) => id,
        // A Rust keyword; fall back to a raw identifier.
        Err(_) => Ident::new_raw(&snaked, Span::call_site()),
    }
}

pub fn snake(name: &str) -> String {
    name.to_snake_case()
}

pub fn pascal(name: &str) -> String {
    name.to_upper_camel_case()
}

/// Module path tokens for a package-relative path: `""` maps to `crate`,
/// `"users"` to `crate::users`, `"infra/metrics"` to `crate::infra::metrics`.
pub fn module_path(rel_path: &str) -> TokenStream {
    let mut tokens = quote! { crate };
    for seg in rel_path.split('/').filter(|s| !s.is_empty()) {
        let seg = ident(seg);
        tokens = quote! { #tokens::#seg };
    }
    tokens
}

/// Canonical HTTP header casing: the first letter and every letter following
/// a `-` are uppercased, the rest lowercased. Names containing characters
/// outside the header token set are returned unchanged.
pub fn canonical_header_key(name: &str) -> String {
    const TOKEN_CHARS: &str = "!#$%&'*+-.^_`|~";
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || TOKEN_CHARS.contains(c))
    {
        return name.to_owned();
    }
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// Mangle a rendered type expression into an identifier fragment: brackets,
/// commas, path separators, spaces, and the nullable sigil all become
/// underscores, keeping distinct type expressions distinct.
pub fn mangle_type_expr(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    for c in expr.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

/// Placeholder identifier emitted when a parametric declaration is walked
/// without use-site type arguments.
pub fn type_param_placeholder(param_name: &str) -> String {
    format!("__GirderTypeParam_{param_name}")
}
