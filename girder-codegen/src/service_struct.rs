//! Service-struct lifecycle descriptor generation.
//!
//! The runtime guarantees at-most-once setup and memoizes the resulting
//! `(instance, error)` pair; the generator only binds the user's
//! initializer.

use proc_macro2::{Ident, TokenStream};
use quote::quote;

use girder_ir::{Service, ServiceStruct};

use crate::names::{ident, module_path, snake};
use crate::runtime;

pub struct ServiceStructOutput {
    pub tokens: TokenStream,
    pub desc_ident: Ident,
}

pub fn generate_service_struct(svc: &Service, ss: &ServiceStruct) -> ServiceStructOutput {
    let core = runtime::core();
    let svc_mod = module_path(&svc.pkg.rel_path);
    let struct_name = ident(&ss.name);
    let desc = ident(&format!("__GIRDER_SVCSTRUCT_{}", ss.name));
    let service = &svc.name;
    let name = &ss.name;
    let setup_def_loc = ss.init_def_loc.unwrap_or(ss.def_loc);

    let (init_fn, setup) = match &ss.init_func {
        Some(init) => {
            let init_fn = ident(&format!("__girder_{}_service_init", snake(&svc.name)));
            let user_init = ident(&snake(init));
            (
                quote! {
                    fn #init_fn() -> #core::service::SetupFuture<#svc_mod::#struct_name> {
                        Box::pin(#svc_mod::#user_init())
                    }
                },
                quote! { Some(#init_fn) },
            )
        }
        None => (quote! {}, quote! { None }),
    };

    ServiceStructOutput {
        tokens: quote! {
            #init_fn
            pub static #desc: #core::service::Decl<#svc_mod::#struct_name> =
                #core::service::Decl::new(#service, #name, #setup, #setup_def_loc);
        },
        desc_ident: desc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_ir::PkgLoc;

    #[test]
    fn initializer_is_bound() {
        let svc = Service::new("users", PkgLoc::new("users", "users"));
        let ss = ServiceStruct {
            name: "Service".into(),
            init_func: Some("InitService".into()),
            def_loc: 9,
            init_def_loc: Some(10),
        };
        let out = generate_service_struct(&svc, &ss);
        let text = out.tokens.to_string();
        assert!(text.contains("Box :: pin (crate :: users :: init_service ())"));
        assert!(text.contains("Decl :: new (\"users\" , \"Service\" , Some (__girder_users_service_init) , 10u32)"));
        assert_eq!(out.desc_ident.to_string(), "__GIRDER_SVCSTRUCT_Service");
    }

    #[test]
    fn missing_initializer_is_none() {
        let svc = Service::new("users", PkgLoc::new("users", "users"));
        let ss = ServiceStruct {
            name: "Service".into(),
            init_func: None,
            def_loc: 9,
            init_def_loc: None,
        };
        let out = generate_service_struct(&svc, &ss);
        let text = out.tokens.to_string();
        assert!(text.contains(", None , 9u32)"));
    }
}
