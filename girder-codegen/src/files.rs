//! Output file model and rendering.

use proc_macro2::TokenStream;
use quote::quote;

use crate::error::GenError;

/// A single generated source file, addressed relative to the user crate's
/// source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub contents: String,
}

/// Join a package-relative directory and a file name into an output path.
pub fn file_path(pkg_rel: &str, file_name: &str) -> String {
    if pkg_rel.is_empty() {
        file_name.to_owned()
    } else {
        format!("{pkg_rel}/{file_name}")
    }
}

/// Render a token stream into a formatted source file with the generator
/// banner. The tokens must parse as a full file; anything else is a
/// generator bug and aborts the run instead of writing partial output.
pub fn render(path: &str, body: TokenStream) -> Result<GeneratedFile, GenError> {
    let tokens = quote! {
        #![allow(
            dead_code,
            unused_imports,
            unused_mut,
            unused_variables,
            clippy::all,
            non_camel_case_types,
            non_snake_case,
            non_upper_case_globals
        )]
        #body
    };
    let file: syn::File = syn::parse2(tokens).map_err(|err| GenError::Render {
        file: path.to_owned(),
        msg: err.to_string(),
    })?;
    let mut contents = format!(
        "// Code generated by girder {}. DO NOT EDIT.\n\n",
        crate::VERSION
    );
    contents.push_str(&prettyplease::unparse(&file));
    Ok(GeneratedFile {
        path: path.to_owned(),
        contents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_prepends_banner_and_formats() {
        let file = render("users/girder_gen_api.rs", quote! { pub fn f() -> i32 { 1 } }).unwrap();
        assert!(file.contents.starts_with("// Code generated by girder"));
        assert!(file.contents.contains("pub fn f() -> i32 {"));
        assert!(file.contents.contains("#![allow("));
    }

    #[test]
    fn render_rejects_malformed_tokens() {
        use proc_macro2::TokenStream;
        let bad: TokenStream = "pub fn".parse().unwrap();
        let err = render("x.rs", bad).unwrap_err();
        assert!(matches!(err, GenError::Render { .. }));
    }

    #[test]
    fn file_path_joins() {
        assert_eq!(file_path("", "girder_gen_etype.rs"), "girder_gen_etype.rs");
        assert_eq!(
            file_path("users", "girder_gen_api.rs"),
            "users/girder_gen_api.rs"
        );
    }
}
