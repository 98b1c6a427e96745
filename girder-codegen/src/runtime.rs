//! Token fragments for the runtime ABI the generated code targets.

use proc_macro2::TokenStream;
use quote::quote;

/// Import path of the runtime crate referenced by generated code.
pub fn core() -> TokenStream {
    quote! { girder_core }
}

/// Module path of the generated marshaller library file.
pub fn etype() -> TokenStream {
    quote! { crate::girder_gen_etype }
}

/// `girder_core::api::Error::builder().code(..).msg(#msg).err()`.
pub fn err_with_code(code: &str, msg: TokenStream) -> TokenStream {
    let code = crate::names::ident(code);
    quote! {
        girder_core::api::Error::builder()
            .code(girder_core::api::Code::#code)
            .msg(#msg)
            .err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_builder_shape() {
        let tokens = err_with_code("Unauthenticated", quote! { "invalid auth param" }).to_string();
        assert!(tokens.contains("Code :: Unauthenticated"));
        assert!(tokens.contains(". err ()"));
    }
}
