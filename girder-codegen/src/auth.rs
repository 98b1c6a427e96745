//! Auth-handler code generation: params type, decoder, caller, and
//! descriptor. Supports the structured header/query mode and the legacy
//! bearer-token mode (params declared as a single string).

use proc_macro2::{Ident, TokenStream};
use quote::quote;

use girder_ir::{AuthHandler, Builtin, Service};

use crate::encoding::describe_request;
use crate::error::GenError;
use crate::marshaller::{wrap_decode, MarshallerBuilder, Usage};
use crate::names::{field_ident, ident, module_path, snake};
use crate::runtime;
use crate::typetrans::{resolve_builtin, TypeTranslator};

#[derive(Debug)]
pub struct AuthOutput {
    pub tokens: TokenStream,
    pub desc_ident: Ident,
    /// The auth data type expression (already `Option`-wrapped when the
    /// handler returns it behind a pointer), for the entrypoint's `Static`.
    pub auth_data_ty: Option<TokenStream>,
    /// Header names credentials arrive through, for the CORS allow set.
    pub allow_headers: Vec<String>,
}

pub fn generate_auth(
    tr: &mut TypeTranslator<'_>,
    mb: &mut MarshallerBuilder,
    svc: &Service,
    auth: &AuthHandler,
) -> Result<AuthOutput, GenError> {
    let ctx = format!("auth handler {}.{}", auth.service, auth.name);
    tracing::debug!(service = %auth.service, name = %auth.name, "generating auth handler");

    let core = runtime::core();
    let base = format!("__girder_{}_{}", snake(&auth.service), snake(&auth.name));
    let decode_fn = ident(&format!("{base}_decode_auth"));
    let handler_fn = ident(&format!("{base}_auth_handler"));
    let serialize_fn = ident(&format!("{base}_serialize_params"));
    let desc = ident("__GIRDER_AUTH_HANDLER");
    let user_fn = ident(&snake(&auth.name));

    // Legacy token mode: the params are a bare string.
    let legacy = matches!(resolve_builtin(tr.app(), &auth.params), Some(Builtin::String));
    let params_ty = if legacy {
        quote! { String }
    } else {
        tr.rust_type(&auth.params, &ctx)?
    };

    let (decode, allow_headers) = if legacy {
        (
            legacy_decode_tokens(&decode_fn, &params_ty),
            vec!["Authorization".to_owned()],
        )
    } else {
        structured_decode_tokens(tr, mb, auth, &decode_fn, &params_ty, &ctx)?
    };

    let handler = handler_tokens(svc, auth, &handler_fn, &user_fn, &params_ty, &ctx)?;

    let serialize = quote! {
        fn #serialize_fn(
            __json: &#core::api::JsonCodec,
            __params: &#params_ty,
        ) -> Result<String, #core::api::Error> {
            __json.encode(__params)
        }
    };

    let service = &auth.service;
    let name = &auth.name;
    let def_loc = auth.def_loc;
    let has_auth_data = auth.auth_data.is_some();
    let descriptor = quote! {
        pub static #desc: #core::api::AuthHandlerDesc<#params_ty> = #core::api::AuthHandlerDesc {
            service: #service,
            name: #name,
            def_loc: #def_loc,
            has_auth_data: #has_auth_data,
            decode_auth: #decode_fn,
            auth_handler: #handler_fn,
            serialize_params: #serialize_fn,
        };
    };

    let auth_data_ty = match &auth.auth_data {
        Some(data) => {
            let base = tr.rust_type(&data.typ, &ctx)?;
            Some(if data.is_pointer {
                quote! { Option<#base> }
            } else {
                base
            })
        }
        None => None,
    };

    Ok(AuthOutput {
        tokens: quote! {
            #decode
            #handler
            #serialize
            #descriptor
        },
        desc_ident: desc,
        auth_data_ty,
        allow_headers,
    })
}

fn legacy_decode_tokens(decode_fn: &Ident, params_ty: &TokenStream) -> TokenStream {
    let core = runtime::core();
    let unauth = runtime::err_with_code("Unauthenticated", quote! { "invalid auth param" });
    quote! {
        fn #decode_fn(__req: &#core::api::HttpRequest) -> Result<#params_ty, #core::api::Error> {
            let __header = __req.header("Authorization").unwrap_or_default();
            for __prefix in ["Bearer ", "Token "] {
                if let Some(__token) = __header.strip_prefix(__prefix) {
                    if !__token.is_empty() {
                        return Ok(__token.to_owned());
                    }
                }
            }
            Err(#unauth)
        }
    }
}

fn structured_decode_tokens(
    tr: &mut TypeTranslator<'_>,
    mb: &mut MarshallerBuilder,
    auth: &AuthHandler,
    decode_fn: &Ident,
    params_ty: &TokenStream,
    ctx: &str,
) -> Result<(TokenStream, Vec<String>), GenError> {
    let core = runtime::core();

    // Auth params decode from the header and query portions only; using the
    // query-default method class routes every untagged field to the query
    // string, and anything that still lands in the body is rejected.
    let encs = describe_request(tr.app(), &auth.params, &["GET".to_owned()], ctx)
        .map_err(|e| e.at(auth.def_loc))?;
    let enc = &encs[0];
    if !enc.body.is_empty() {
        return Err(GenError::encoding(
            "auth handler params must be header or query parameters",
            ctx,
        )
        .at(auth.def_loc));
    }

    let mut usage = Usage::new();
    let mut stmts = Vec::new();

    for p in &enc.header {
        let field = field_ident(&p.ident);
        let wire = &p.wire_name;
        let repr = p.repr.as_ref().expect("header params carry a repr");
        let stmt = if repr.list {
            let call = mb.decode_list(&mut usage, repr.kind, wire, quote! { &__vs }, false);
            let assign = assign_value(&field, repr.option, call);
            quote! {
                let __vs = __req.header_values(#wire);
                if !__vs.is_empty() {
                    __found += 1;
                    #assign
                }
            }
        } else {
            let call = mb.decode(&mut usage, repr.kind, wire, quote! { __v }, false);
            let assign = assign_value(&field, repr.option, call);
            quote! {
                if let Some(__v) = __req.header(#wire) {
                    __found += 1;
                    #assign
                }
            }
        };
        stmts.push(stmt);
    }

    if !enc.query.is_empty() {
        stmts.push(quote! { let __qs = #core::api::parse_query(__req); });
        for p in &enc.query {
            let field = field_ident(&p.ident);
            let wire = &p.wire_name;
            let repr = p.repr.as_ref().expect("query params carry a repr");
            let stmt = if repr.list {
                let call = mb.decode_list(&mut usage, repr.kind, wire, quote! { &__vs }, false);
                let assign = assign_value(&field, repr.option, call);
                quote! {
                    let __vs = __qs.all(#wire);
                    if !__vs.is_empty() {
                        __found += 1;
                        #assign
                    }
                }
            } else {
                let call = mb.decode(&mut usage, repr.kind, wire, quote! { __v }, false);
                let assign = assign_value(&field, repr.option, call);
                quote! {
                    if let Some(__v) = __qs.first(#wire) {
                        __found += 1;
                        #assign
                    }
                }
            };
            stmts.push(stmt);
        }
    }

    // Credentials must be present before conversion errors are considered.
    let unauth = runtime::err_with_code("Unauthenticated", quote! { "no auth parameters present" });
    stmts.push(quote! {
        if __found == 0 {
            return Err(#unauth);
        }
    });

    let invalid = runtime::err_with_code("InvalidArgument", quote! { __err });
    let wrapped = wrap_decode(
        usage,
        quote! { #(#stmts)* },
        quote! { return Err(#invalid); },
    );

    let allow_headers = enc.header.iter().map(|p| p.wire_name.clone()).collect();
    Ok((
        quote! {
            fn #decode_fn(__req: &#core::api::HttpRequest) -> Result<#params_ty, #core::api::Error> {
                let mut __params: #params_ty = Default::default();
                let mut __found = 0usize;
                #wrapped
                Ok(__params)
            }
        },
        allow_headers,
    ))
}

fn assign_value(field: &Ident, option: bool, call: TokenStream) -> TokenStream {
    if option {
        quote! { __params.#field = Some(#call); }
    } else {
        quote! { __params.#field = #call; }
    }
}

fn handler_tokens(
    svc: &Service,
    auth: &AuthHandler,
    handler_fn: &Ident,
    user_fn: &Ident,
    params_ty: &TokenStream,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    let core = runtime::core();
    let svc_mod = module_path(&svc.pkg.rel_path);

    let svc_struct = match &auth.service_struct {
        Some(binding) => {
            if binding != &svc.name {
                return Err(GenError::ir_shape(
                    format!("auth handler bound to service struct of foreign service {binding}"),
                    ctx,
                )
                .at(auth.def_loc));
            }
            let ss = svc.service_struct.as_ref().ok_or_else(|| {
                GenError::ir_shape("auth handler bound to a missing service struct", ctx)
                    .at(auth.def_loc)
            })?;
            Some(ident(&format!("__GIRDER_SVCSTRUCT_{}", ss.name)))
        }
        None => None,
    };

    let invoke = match &svc_struct {
        Some(decl) => quote! {
            let __svc = #decl.get().await?;
            __svc.#user_fn(__ctx, __params).await
        },
        None => quote! { #svc_mod::#user_fn(__ctx, __params).await },
    };

    let body = if auth.auth_data.is_some() {
        quote! {
            let (__uid, __data) = { #invoke }?;
            Ok(#core::api::AuthInfo::with_data(__uid, __data))
        }
    } else {
        quote! {
            let __uid = { #invoke }?;
            Ok(#core::api::AuthInfo::uid_only(__uid))
        }
    };

    Ok(quote! {
        fn #handler_fn(
            __ctx: #core::api::Context,
            __params: #params_ty,
        ) -> #core::api::HandlerFuture<#core::api::AuthInfo> {
            Box::pin(#core::api::catch_handler_panic(async move {
                #body
            }))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_ir::{App, Decl, Field, ParamDesc, PkgLoc, StructType, Type};

    fn gen(app: &App, auth: &AuthHandler) -> (String, AuthOutput) {
        let svc = app.service(&auth.service).unwrap().clone();
        let mut tr = TypeTranslator::new(app);
        let mut mb = MarshallerBuilder::new();
        let out = generate_auth(&mut tr, &mut mb, &svc, auth).unwrap();
        (out.tokens.to_string(), out)
    }

    fn app_with_service(name: &str) -> App {
        let mut app = App::new("myapp");
        app.services.push(Service::new(name, PkgLoc::new(name, name)));
        app
    }

    #[test]
    fn legacy_token_mode() {
        let app = app_with_service("auth");
        let auth = AuthHandler {
            service: "auth".into(),
            name: "Auth".into(),
            params: Type::builtin(Builtin::String),
            auth_data: None,
            service_struct: None,
            def_loc: 3,
        };
        let (text, out) = gen(&app, &auth);
        assert!(text.contains("\"Bearer \""));
        assert!(text.contains("\"Token \""));
        assert!(text.contains("Code :: Unauthenticated"));
        assert!(text.contains("AuthHandlerDesc < String >"));
        assert!(text.contains("has_auth_data : false"));
        assert!(out.auth_data_ty.is_none());
    }

    #[test]
    fn structured_mode_reads_header_and_requires_presence() {
        let mut app = app_with_service("auth");
        app.decls.push(Decl::new(
            0,
            "Params",
            Type::Struct(StructType {
                fields: vec![
                    Field::new("APIKey", Type::builtin(Builtin::String))
                        .with_tag("header", "X-API-Key"),
                ],
            }),
            PkgLoc::new("auth", "auth"),
        ));
        app.decls.push(Decl::new(
            1,
            "User",
            Type::Struct(StructType { fields: vec![] }),
            PkgLoc::new("auth", "auth"),
        ));
        let auth = AuthHandler {
            service: "auth".into(),
            name: "Auth".into(),
            params: Type::named(0),
            auth_data: Some(ParamDesc {
                typ: Type::named(1),
                is_pointer: true,
            }),
            service_struct: None,
            def_loc: 3,
        };
        let (text, out) = gen(&app, &auth);
        assert!(text.contains("__req . header (\"X-Api-Key\")") || text.contains("__req . header (\"X-API-Key\")"));
        assert!(text.contains("__found == 0"));
        assert!(text.contains("has_auth_data : true"));
        assert!(text.contains("AuthInfo :: with_data"));
        assert_eq!(
            out.auth_data_ty.unwrap().to_string(),
            "Option < crate :: auth :: User >"
        );
    }

    #[test]
    fn body_params_are_rejected() {
        let mut app = app_with_service("auth");
        app.decls.push(Decl::new(
            0,
            "Params",
            Type::Struct(StructType {
                // `json` tag does not move a field out of the query default,
                // but a map type cannot be a query parameter.
                fields: vec![Field::new(
                    "Blob",
                    Type::map(Type::builtin(Builtin::String), Type::builtin(Builtin::String)),
                )],
            }),
            PkgLoc::new("auth", "auth"),
        ));
        let auth = AuthHandler {
            service: "auth".into(),
            name: "Auth".into(),
            params: Type::named(0),
            auth_data: None,
            service_struct: None,
            def_loc: 3,
        };
        let svc = app.service("auth").unwrap().clone();
        let mut tr = TypeTranslator::new(&app);
        let mut mb = MarshallerBuilder::new();
        let err = generate_auth(&mut tr, &mut mb, &svc, &auth).unwrap_err();
        assert!(err.to_string().contains("unsupported for header/query"));
    }
}
