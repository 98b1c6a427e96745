//! Middleware descriptor generation.

use proc_macro2::{Ident, TokenStream};
use quote::quote;

use girder_ir::{App, Middleware};

use crate::error::GenError;
use crate::names::{ident, module_path, snake};
use crate::runtime;

#[derive(Debug)]
pub struct MiddlewareOutput {
    pub tokens: TokenStream,
    pub desc_ident: Ident,
}

pub fn generate_middleware(app: &App, mw: &Middleware) -> Result<MiddlewareOutput, GenError> {
    let ctx = format!("middleware {}.{}", mw.pkg.pkg_name, mw.name);
    let core = runtime::core();
    let desc = ident(&format!("__GIRDER_MIDDLEWARE_{}", mw.name));
    let invoke_fn = ident(&format!(
        "__girder_mw_{}_{}_invoke",
        snake(&mw.pkg.pkg_name),
        snake(&mw.name)
    ));
    let user_fn = ident(&snake(&mw.name));
    let pkg_mod = module_path(&mw.pkg.rel_path);

    // With a service-struct binding the middleware is a method on the
    // struct; its instance is fetched first and an init failure becomes the
    // response's error.
    let body = match &mw.service_struct {
        Some(service) => {
            let svc = app.service(service).ok_or_else(|| {
                GenError::ir_shape(
                    format!("middleware bound to unknown service {service}"),
                    &ctx,
                )
                .at(mw.def_loc)
            })?;
            let ss = svc.service_struct.as_ref().ok_or_else(|| {
                GenError::ir_shape(
                    format!("middleware bound to service {service} which has no service struct"),
                    &ctx,
                )
                .at(mw.def_loc)
            })?;
            let svc_mod = module_path(&svc.pkg.rel_path);
            let decl = ident(&format!("__GIRDER_SVCSTRUCT_{}", ss.name));
            quote! {
                let __svc = match #svc_mod::girder_gen_api::#decl.get().await {
                    Ok(svc) => svc,
                    Err(err) => return #core::api::MiddlewareResponse::from_err(err),
                };
                __svc.#user_fn(__req, __next).await
            }
        }
        None => quote! { #pkg_mod::#user_fn(__req, __next).await },
    };

    let pkg_name = &mw.pkg.pkg_name;
    let name = &mw.name;
    let global = mw.global;
    let def_loc = mw.def_loc;

    Ok(MiddlewareOutput {
        tokens: quote! {
            fn #invoke_fn(
                __req: #core::api::MiddlewareRequest,
                __next: #core::api::Next,
            ) -> #core::api::MiddlewareFuture {
                Box::pin(async move {
                    #body
                })
            }

            pub static #desc: #core::api::Middleware = #core::api::Middleware {
                pkg_name: #pkg_name,
                name: #name,
                global: #global,
                def_loc: #def_loc,
                invoke: #invoke_fn,
            };
        },
        desc_ident: desc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_ir::{PkgLoc, Service, ServiceStruct};

    #[test]
    fn unbound_middleware_delegates_to_user_fn() {
        let app = App::new("myapp");
        let mw = Middleware {
            pkg: PkgLoc::new("mw", "mw"),
            name: "Logger".into(),
            global: true,
            service_struct: None,
            def_loc: 11,
        };
        let out = generate_middleware(&app, &mw).unwrap();
        let text = out.tokens.to_string();
        assert!(text.contains("crate :: mw :: logger (__req , __next) . await"));
        assert!(text.contains("global : true"));
        assert_eq!(out.desc_ident.to_string(), "__GIRDER_MIDDLEWARE_Logger");
    }

    #[test]
    fn bound_middleware_fetches_service_struct() {
        let mut app = App::new("myapp");
        let mut svc = Service::new("users", PkgLoc::new("users", "users"));
        svc.service_struct = Some(ServiceStruct {
            name: "Service".into(),
            init_func: None,
            def_loc: 4,
            init_def_loc: None,
        });
        app.services.push(svc);
        let mw = Middleware {
            pkg: PkgLoc::new("users", "users"),
            name: "Audit".into(),
            global: false,
            service_struct: Some("users".into()),
            def_loc: 12,
        };
        let out = generate_middleware(&app, &mw).unwrap();
        let text = out.tokens.to_string();
        assert!(text.contains("__GIRDER_SVCSTRUCT_Service . get () . await"));
        assert!(text.contains("MiddlewareResponse :: from_err"));
        assert!(text.contains("__svc . audit (__req , __next) . await"));
    }

    #[test]
    fn bound_middleware_requires_existing_struct() {
        let app = App::new("myapp");
        let mw = Middleware {
            pkg: PkgLoc::new("mw", "mw"),
            name: "Audit".into(),
            global: false,
            service_struct: Some("ghost".into()),
            def_loc: 12,
        };
        let err = generate_middleware(&app, &mw).unwrap_err();
        assert!(err.to_string().contains("unknown service ghost"));
    }
}
