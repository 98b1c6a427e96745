//! Per-endpoint code generation: request struct, decoder, handlers,
//! response encoder, clone/path helpers, in-process caller, and the
//! endpoint descriptor.

use proc_macro2::{Ident, TokenStream};
use quote::quote;

use girder_ir::{expand_methods, Builtin, Endpoint, ParamDesc, Segment, SegmentKind, Service};

use crate::encoding::{describe_request, describe_response, EncodedParam, ReqEncoding, RespEncoding};
use crate::error::GenError;
use crate::marshaller::{wrap_decode, MarshallerBuilder, Usage};
use crate::names::{field_ident, ident, module_path, snake};
use crate::runtime;
use crate::typetrans::{builtin_type, TypeTranslator};

/// Everything the rest of the generator needs to know about one generated
/// endpoint.
pub struct EndpointOutput {
    pub tokens: TokenStream,
    pub desc_ident: Ident,
    /// Request header names, for the CORS allow set.
    pub allow_headers: Vec<String>,
    /// Response header names, for the CORS expose set.
    pub expose_headers: Vec<String>,
}

/// Names and shared token fragments for one endpoint, mirroring its
/// generated items.
struct EndpointNames {
    req_ty: Ident,
    desc: Ident,
    decode: Ident,
    clone_req: Ident,
    req_path: Ident,
    user_payload: Ident,
    app_handler: Ident,
    raw_handler: Ident,
    encode_resp: Ident,
    clone_resp: Ident,
    caller: Ident,
    user_fn: Ident,
}

impl EndpointNames {
    fn new(svc: &Service, ep: &Endpoint) -> EndpointNames {
        let base = format!("__girder_{}_{}", snake(&svc.name), snake(&ep.name));
        EndpointNames {
            req_ty: ident(&format!("__GirderReq_{}", ep.name)),
            desc: ident(&format!("__GIRDER_API_{}", ep.name)),
            decode: ident(&format!("{base}_decode_req")),
            clone_req: ident(&format!("{base}_clone_req")),
            req_path: ident(&format!("{base}_req_path")),
            user_payload: ident(&format!("{base}_user_payload")),
            app_handler: ident(&format!("{base}_app_handler")),
            raw_handler: ident(&format!("{base}_raw_handler")),
            encode_resp: ident(&format!("{base}_encode_resp")),
            clone_resp: ident(&format!("{base}_clone_resp")),
            caller: ident(&format!("call_{}", snake(&ep.name))),
            user_fn: ident(&snake(&ep.name)),
        }
    }
}

/// Whether the request struct is emitted as a type alias to the payload
/// (payload is the only field of a non-raw endpoint).
fn is_alias_req(ep: &Endpoint) -> bool {
    !ep.raw && ep.request.is_some() && ep.path.num_params() == 0
}

pub fn generate_endpoint(
    tr: &mut TypeTranslator<'_>,
    mb: &mut MarshallerBuilder,
    svc: &Service,
    ep: &Endpoint,
) -> Result<EndpointOutput, GenError> {
    let ctx = format!("service {}, endpoint {}", svc.name, ep.name);
    tracing::debug!(service = %svc.name, endpoint = %ep.name, "generating endpoint");

    let names = EndpointNames::new(svc, ep);
    let methods = expand_methods(&ep.methods);

    let req_encodings = match (&ep.request, ep.raw) {
        (Some(req), false) => describe_request(tr.app(), &req.typ, &methods, &ctx)
            .map_err(|e| e.at(ep.def_loc))?,
        _ => Vec::new(),
    };
    let resp_encoding = match (&ep.response, ep.raw) {
        (Some(resp), false) => {
            describe_response(tr.app(), &resp.typ, &ctx).map_err(|e| e.at(ep.def_loc))?
        }
        _ => RespEncoding::default(),
    };

    let req_ty_def = req_type_tokens(tr, ep, &names, &ctx)?;
    let resp_ty = resp_type_tokens(tr, ep, &ctx)?;
    let decode = decode_tokens(tr, mb, ep, &names, &req_encodings, &ctx)?;
    let clone_req = clone_req_tokens(ep, &names);
    let req_path = req_path_tokens(mb, ep, &names);
    let user_payload = user_payload_tokens(ep, &names);
    let handlers = handler_tokens(svc, ep, &names, &resp_ty, &ctx)?;
    let encode_resp = encode_resp_tokens(mb, ep, &names, &resp_ty, &resp_encoding);
    let clone_resp = clone_resp_tokens(&names, &resp_ty);
    let caller = caller_tokens(tr, ep, &names, &resp_ty, &ctx)?;
    let descriptor = descriptor_tokens(svc, ep, &names, &methods, &resp_ty);

    let allow_headers = req_encodings
        .iter()
        .flat_map(|enc| enc.header.iter().map(|p| p.wire_name.clone()))
        .collect();
    let expose_headers = resp_encoding
        .header
        .iter()
        .map(|p| p.wire_name.clone())
        .collect();

    Ok(EndpointOutput {
        tokens: quote! {
            #req_ty_def
            #decode
            #clone_req
            #req_path
            #user_payload
            #handlers
            #encode_resp
            #clone_resp
            #caller
            #descriptor
        },
        desc_ident: names.desc,
        allow_headers,
        expose_headers,
    })
}

/// Translated payload type of the request, without pointer wrapping.
fn payload_base_type(
    tr: &mut TypeTranslator<'_>,
    req: &ParamDesc,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    tr.rust_type(&req.typ, ctx)
}

fn param_field(seg: &Segment) -> Ident {
    field_ident(&seg.value)
}

fn req_type_tokens(
    tr: &mut TypeTranslator<'_>,
    ep: &Endpoint,
    names: &EndpointNames,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    let req_ty = &names.req_ty;
    let core = runtime::core();

    if ep.raw {
        // Raw endpoints receive the raw response writer and request.
        return Ok(quote! {
            pub struct #req_ty {
                pub w: #core::api::RawResponseWriter,
                pub req: #core::api::RawRequest,
            }
        });
    }

    match &ep.request {
        Some(req) if is_alias_req(ep) => {
            let base = payload_base_type(tr, req, ctx)?;
            let aliased = if req.is_pointer {
                quote! { Option<#base> }
            } else {
                base
            };
            Ok(quote! { pub type #req_ty = #aliased; })
        }
        Some(req) => {
            let mut fields = Vec::new();
            for seg in ep.path.params() {
                let name = param_field(seg);
                let ty = builtin_type(seg.value_type);
                fields.push(quote! { pub #name: #ty, });
            }
            let base = payload_base_type(tr, req, ctx)?;
            let params_ty = if req.is_pointer {
                quote! { Option<#base> }
            } else {
                base
            };
            fields.push(quote! { pub params: #params_ty, });
            Ok(quote! {
                #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
                pub struct #req_ty {
                    #(#fields)*
                }
            })
        }
        None if ep.path.num_params() > 0 => {
            let fields: Vec<TokenStream> = ep
                .path
                .params()
                .map(|seg| {
                    let name = param_field(seg);
                    let ty = builtin_type(seg.value_type);
                    quote! { pub #name: #ty, }
                })
                .collect();
            Ok(quote! {
                #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
                pub struct #req_ty {
                    #(#fields)*
                }
            })
        }
        None => Ok(quote! { pub type #req_ty = #core::api::Void; }),
    }
}

fn resp_type_tokens(
    tr: &mut TypeTranslator<'_>,
    ep: &Endpoint,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    let core = runtime::core();
    match (&ep.response, ep.raw) {
        (Some(resp), false) => {
            let base = tr.rust_type(&resp.typ, ctx)?;
            Ok(if resp.is_pointer {
                quote! { Option<#base> }
            } else {
                base
            })
        }
        _ => Ok(quote! { #core::api::Void }),
    }
}

fn decode_tokens(
    tr: &mut TypeTranslator<'_>,
    mb: &mut MarshallerBuilder,
    ep: &Endpoint,
    names: &EndpointNames,
    req_encodings: &[ReqEncoding],
    ctx: &str,
) -> Result<TokenStream, GenError> {
    let core = runtime::core();
    let req_ty = &names.req_ty;
    let decode = &names.decode;
    let mut usage = Usage::new();

    // Path parameters, in order.
    let num_params = ep.path.num_params();
    let mut path_stmts = Vec::new();
    for (idx, seg) in ep.path.params().enumerate() {
        let seg_var = ident(&format!("__seg{idx}"));
        let field_name = &seg.value;
        let kind = seg.value_type;

        // The router hands the wildcard's value with its leading slash;
        // the framework's path model excludes it.
        let raw_expr = if seg.kind == SegmentKind::Wildcard {
            quote! { __ps[#idx].strip_prefix('/').unwrap_or(__ps[#idx].as_str()) }
        } else {
            quote! { __ps[#idx].as_str() }
        };
        let unescaped = matches!(kind, Builtin::String | Builtin::Uuid);
        let value_expr = if unescaped {
            quote! { #core::api::path_unescape(#raw_expr) }
        } else {
            quote! { (#raw_expr).to_owned() }
        };
        path_stmts.push(quote! {
            let #seg_var = #value_expr;
            __path_vals.push(#seg_var.clone());
        });

        let call = mb.decode(&mut usage, kind, field_name, quote! { &#seg_var }, true);
        if ep.raw {
            // Validated for error reporting, then discarded.
            path_stmts.push(quote! { let _ = #call; });
        } else {
            let field = param_field(seg);
            path_stmts.push(quote! { let #field = #call; });
        }
    }

    // Request payload, when present.
    let (payload_stmts, req_value) = if ep.raw {
        (quote! {}, quote! { None })
    } else if let Some(req) = &ep.request {
        let payload_ty = payload_base_type(tr, req, ctx)?;
        let groups: Vec<TokenStream> = req_encodings
            .iter()
            .map(|enc| group_decode_stmts(mb, &mut usage, enc))
            .collect();
        let body = match groups.len() {
            0 => quote! {},
            1 => {
                let only = &groups[0];
                quote! { #only }
            }
            _ => {
                let mut arms = Vec::new();
                for (i, enc) in req_encodings.iter().enumerate() {
                    let stmts = &groups[i];
                    if i + 1 == req_encodings.len() {
                        arms.push(quote! { _ => { #stmts } });
                    } else {
                        let pats = &enc.methods;
                        arms.push(quote! { #(#pats)|* => { #stmts } });
                    }
                }
                quote! {
                    match __req.method() {
                        #(#arms)*
                    }
                }
            }
        };
        let stmts = quote! {
            let mut __payload: #payload_ty = Default::default();
            #body
        };
        let payload_value = if req.is_pointer {
            quote! { Some(__payload) }
        } else {
            quote! { __payload }
        };
        let req_value = if is_alias_req(ep) {
            quote! { Some(#payload_value) }
        } else {
            let field_inits: Vec<TokenStream> = ep
                .path
                .params()
                .map(|seg| {
                    let field = param_field(seg);
                    quote! { #field, }
                })
                .collect();
            quote! { Some(#req_ty { #(#field_inits)* params: #payload_value }) }
        };
        (stmts, req_value)
    } else if num_params > 0 {
        let field_inits: Vec<TokenStream> = ep
            .path
            .params()
            .map(|seg| {
                let field = param_field(seg);
                quote! { #field, }
            })
            .collect();
        (quote! {}, quote! { Some(#req_ty { #(#field_inits)* }) })
    } else {
        (quote! {}, quote! { Some(#core::api::Void::default()) })
    };

    let on_err = {
        let err = runtime::err_with_code("InvalidArgument", quote! { __err });
        quote! { return Err(#err); }
    };
    let wrapped = wrap_decode(
        usage,
        quote! {
            #(#path_stmts)*
            #payload_stmts
        },
        on_err,
    );

    Ok(quote! {
        fn #decode(
            __req: &#core::api::HttpRequest,
            __ps: &#core::api::PathParams,
            __json: &#core::api::JsonCodec,
        ) -> Result<(Option<#req_ty>, #core::api::UnnamedParams), #core::api::Error> {
            let mut __path_vals: #core::api::UnnamedParams = Vec::with_capacity(#num_params);
            #wrapped
            Ok((#req_value, __path_vals))
        }
    })
}

/// Statements decoding one method group's header, query, and body
/// parameters into `__payload`.
fn group_decode_stmts(mb: &mut MarshallerBuilder, usage: &mut Usage, enc: &ReqEncoding) -> TokenStream {
    let mut stmts = Vec::new();

    for p in &enc.header {
        stmts.push(header_decode_stmt(mb, usage, p));
    }

    if !enc.query.is_empty() {
        let core = runtime::core();
        stmts.push(quote! { let __qs = #core::api::parse_query(__req); });
        for p in &enc.query {
            stmts.push(query_decode_stmt(mb, usage, p));
        }
    }

    if !enc.body.is_empty() {
        stmts.push(body_decode_stmt(mb, usage, &enc.body));
    }

    quote! { #(#stmts)* }
}

fn header_decode_stmt(mb: &mut MarshallerBuilder, usage: &mut Usage, p: &EncodedParam) -> TokenStream {
    let field = field_ident(&p.ident);
    let wire = &p.wire_name;
    let repr = p.repr.as_ref().expect("header params carry a repr");
    let required = !p.optional && !repr.option;

    match (repr.list, repr.option) {
        (false, false) => {
            let call = mb.decode(
                usage,
                repr.kind,
                wire,
                quote! { __req.header(#wire).unwrap_or_default() },
                required,
            );
            quote! { __payload.#field = #call; }
        }
        (false, true) => {
            let call = mb.decode(usage, repr.kind, wire, quote! { __v }, false);
            quote! {
                __payload.#field = match __req.header(#wire) {
                    Some(__v) => Some(#call),
                    None => None,
                };
            }
        }
        (true, false) => {
            let call = mb.decode_list(
                usage,
                repr.kind,
                wire,
                quote! { &__req.header_values(#wire) },
                required,
            );
            quote! { __payload.#field = #call; }
        }
        (true, true) => {
            let call = mb.decode_list(usage, repr.kind, wire, quote! { &__vs }, false);
            quote! {
                __payload.#field = {
                    let __vs = __req.header_values(#wire);
                    if __vs.is_empty() { None } else { Some(#call) }
                };
            }
        }
    }
}

fn query_decode_stmt(mb: &mut MarshallerBuilder, usage: &mut Usage, p: &EncodedParam) -> TokenStream {
    let field = field_ident(&p.ident);
    let wire = &p.wire_name;
    let repr = p.repr.as_ref().expect("query params carry a repr");
    let required = !p.optional && !repr.option;

    match (repr.list, repr.option) {
        (false, false) => {
            let call = mb.decode(
                usage,
                repr.kind,
                wire,
                quote! { __qs.first(#wire).unwrap_or_default() },
                required,
            );
            quote! { __payload.#field = #call; }
        }
        (false, true) => {
            let call = mb.decode(usage, repr.kind, wire, quote! { __v }, false);
            quote! {
                __payload.#field = match __qs.first(#wire) {
                    Some(__v) => Some(#call),
                    None => None,
                };
            }
        }
        (true, false) => {
            let call = mb.decode_list(usage, repr.kind, wire, quote! { &__qs.all(#wire) }, required);
            quote! { __payload.#field = #call; }
        }
        (true, true) => {
            let call = mb.decode_list(usage, repr.kind, wire, quote! { &__vs }, false);
            quote! {
                __payload.#field = {
                    let __vs = __qs.all(#wire);
                    if __vs.is_empty() { None } else { Some(#call) }
                };
            }
        }
    }
}

fn body_decode_stmt(mb: &mut MarshallerBuilder, usage: &mut Usage, body: &[EncodedParam]) -> TokenStream {
    let core = runtime::core();
    let mut arms = Vec::new();
    for p in body {
        let field = field_ident(&p.ident);
        // Top-level body keys match case-insensitively.
        let key = p.wire_name.to_lowercase();
        let call = mb.decode_json_field(usage, &p.wire_name, quote! { __value });
        arms.push(quote! { #key => { __payload.#field = #call; } });
    }
    quote! {
        let __body = __req.take_body()?;
        #core::api::iterate_json_object(__json, &__body, |__key, __value| {
            match #core::api::fold_case(__key).as_str() {
                #(#arms)*
                // Unknown top-level keys are skipped.
                _ => {}
            }
        });
    }
}

fn clone_req_tokens(ep: &Endpoint, names: &EndpointNames) -> TokenStream {
    let core = runtime::core();
    let req_ty = &names.req_ty;
    let clone_req = &names.clone_req;
    let body = if ep.raw {
        let err = runtime::err_with_code("Internal", quote! { "raw requests cannot be cloned" });
        quote! { Err(#err) }
    } else {
        // Deep copy via JSON round-trip; no per-type clone code.
        quote! { #core::api::clone_via_json(req) }
    };
    quote! {
        fn #clone_req(req: &#req_ty) -> Result<#req_ty, #core::api::Error> {
            #body
        }
    }
}

fn req_path_tokens(mb: &mut MarshallerBuilder, ep: &Endpoint, names: &EndpointNames) -> TokenStream {
    let core = runtime::core();
    let req_ty = &names.req_ty;
    let req_path = &names.req_path;
    let template = ep.path.to_string();

    let values: Vec<TokenStream> = if ep.raw {
        Vec::new()
    } else {
        ep.path
            .params()
            .map(|seg| {
                let field = param_field(seg);
                mb.encode(seg.value_type, quote! { &req.#field })
            })
            .collect()
    };

    quote! {
        fn #req_path(req: &#req_ty) -> Result<(&'static str, #core::api::UnnamedParams), #core::api::Error> {
            Ok((#template, vec![#(#values),*]))
        }
    }
}

fn user_payload_tokens(ep: &Endpoint, names: &EndpointNames) -> TokenStream {
    let core = runtime::core();
    let req_ty = &names.req_ty;
    let user_payload = &names.user_payload;
    let body = if ep.raw || ep.request.is_none() {
        quote! { None }
    } else if is_alias_req(ep) {
        quote! { Some(#core::api::PayloadRef::new(req)) }
    } else {
        quote! { Some(#core::api::PayloadRef::new(&req.params)) }
    };
    quote! {
        fn #user_payload(req: &#req_ty) -> Option<#core::api::PayloadRef<'_>> {
            #body
        }
    }
}

fn handler_tokens(
    svc: &Service,
    ep: &Endpoint,
    names: &EndpointNames,
    resp_ty: &TokenStream,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    let core = runtime::core();
    let req_ty = &names.req_ty;
    let user_fn = &names.user_fn;
    let svc_mod = module_path(&svc.pkg.rel_path);

    // Service-struct fetch, when the handler is a method on the struct.
    let svc_struct = match &ep.service_struct {
        Some(binding) => {
            if binding != &svc.name {
                return Err(GenError::ir_shape(
                    format!("endpoint bound to service struct of foreign service {binding}"),
                    ctx,
                )
                .at(ep.def_loc));
            }
            let ss = svc.service_struct.as_ref().ok_or_else(|| {
                GenError::ir_shape("endpoint bound to a missing service struct", ctx).at(ep.def_loc)
            })?;
            Some(ident(&format!("__GIRDER_SVCSTRUCT_{}", ss.name)))
        }
        None => None,
    };

    if ep.raw {
        let raw_handler = &names.raw_handler;
        let call = match &svc_struct {
            Some(decl) => quote! {
                let __svc = match #decl.get().await {
                    Ok(svc) => svc,
                    Err(err) => {
                        #core::api::write_http_error(__w, err);
                        return;
                    }
                };
                __svc.#user_fn(__w, __req).await
            },
            None => quote! { #svc_mod::#user_fn(__w, __req).await },
        };
        return Ok(quote! {
            fn #raw_handler(
                __w: #core::api::RawResponseWriter,
                __req: #core::api::RawRequest,
            ) -> #core::api::RawHandlerFuture {
                Box::pin(async move {
                    #call
                })
            }
        });
    }

    let app_handler = &names.app_handler;

    // Handler arguments: path fields in order, then the payload.
    let mut args = vec![quote! { __ctx }];
    for seg in ep.path.params() {
        let field = param_field(seg);
        args.push(quote! { __req.#field });
    }
    if ep.request.is_some() {
        if is_alias_req(ep) {
            args.push(quote! { __req });
        } else {
            args.push(quote! { __req.params });
        }
    }

    let invoke = match &svc_struct {
        Some(decl) => quote! {
            let __svc = #decl.get().await?;
            __svc.#user_fn(#(#args),*).await
        },
        None => quote! { #svc_mod::#user_fn(#(#args),*).await },
    };

    // Endpoints without a response type still yield a value to the runtime.
    let body = if ep.response.is_none() {
        quote! {
            #invoke?;
            Ok(#core::api::Void::default())
        }
    } else {
        invoke
    };

    Ok(quote! {
        fn #app_handler(
            __ctx: #core::api::Context,
            __req: #req_ty,
        ) -> #core::api::HandlerFuture<#resp_ty> {
            Box::pin(#core::api::catch_handler_panic(async move {
                #body
            }))
        }
    })
}

fn encode_resp_tokens(
    mb: &mut MarshallerBuilder,
    ep: &Endpoint,
    names: &EndpointNames,
    resp_ty: &TokenStream,
    enc: &RespEncoding,
) -> TokenStream {
    let core = runtime::core();
    let encode_resp = &names.encode_resp;

    let body = match (&ep.response, ep.raw) {
        (Some(resp), false) => {
            let header_stmts: Vec<TokenStream> = enc
                .header
                .iter()
                .map(|p| header_encode_stmt(mb, p))
                .collect();
            let body_stmts = if enc.body.is_empty() {
                quote! { __w.write_body(b"null\n")?; }
            } else {
                let fields: Vec<TokenStream> = enc
                    .body
                    .iter()
                    .map(|p| {
                        let field = field_ident(&p.ident);
                        let wire = &p.wire_name;
                        quote! { __ob.field(#wire, &resp.#field)?; }
                    })
                    .collect();
                quote! {
                    let mut __ob = __json.object_writer();
                    #(#fields)*
                    __w.write_body(&__ob.finish_with_newline())?;
                }
            };
            if resp.is_pointer {
                // A null response serializes as a literal null body.
                quote! {
                    let Some(resp) = resp.as_ref() else {
                        return __w.write_body(b"null\n");
                    };
                    #(#header_stmts)*
                    #body_stmts
                    Ok(())
                }
            } else {
                quote! {
                    #(#header_stmts)*
                    #body_stmts
                    Ok(())
                }
            }
        }
        _ => quote! { __w.write_body(b"null\n") },
    };

    quote! {
        fn #encode_resp(
            __w: &mut #core::api::ResponseWriter,
            __json: &#core::api::JsonCodec,
            resp: &#resp_ty,
        ) -> Result<(), #core::api::Error> {
            #body
        }
    }
}

fn header_encode_stmt(mb: &mut MarshallerBuilder, p: &EncodedParam) -> TokenStream {
    let field = field_ident(&p.ident);
    let wire = &p.wire_name;
    let repr = p.repr.as_ref().expect("header params carry a repr");

    match (repr.list, repr.option) {
        (false, false) => {
            let call = mb.encode(repr.kind, quote! { &resp.#field });
            quote! { __w.add_header(#wire, #call); }
        }
        (false, true) => {
            let call = mb.encode(repr.kind, quote! { __v });
            quote! {
                if let Some(__v) = resp.#field.as_ref() {
                    __w.add_header(#wire, #call);
                }
            }
        }
        (true, false) => {
            // Multi-valued headers produce one line per element.
            let call = mb.encode_list(repr.kind, quote! { &resp.#field });
            quote! {
                for __v in #call {
                    __w.add_header(#wire, __v);
                }
            }
        }
        (true, true) => {
            let call = mb.encode_list(repr.kind, quote! { __vs });
            quote! {
                if let Some(__vs) = resp.#field.as_ref() {
                    for __v in #call {
                        __w.add_header(#wire, __v);
                    }
                }
            }
        }
    }
}

fn clone_resp_tokens(names: &EndpointNames, resp_ty: &TokenStream) -> TokenStream {
    let core = runtime::core();
    let clone_resp = &names.clone_resp;
    quote! {
        fn #clone_resp(resp: &#resp_ty) -> Result<#resp_ty, #core::api::Error> {
            #core::api::clone_via_json(resp)
        }
    }
}

fn caller_tokens(
    tr: &mut TypeTranslator<'_>,
    ep: &Endpoint,
    names: &EndpointNames,
    resp_ty: &TokenStream,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    if ep.raw {
        // Raw endpoints have no in-process caller.
        return Ok(quote! {});
    }
    let core = runtime::core();
    let caller = &names.caller;
    let req_ty = &names.req_ty;
    let desc = &names.desc;

    let mut params = Vec::new();
    let mut inits = Vec::new();
    for seg in ep.path.params() {
        let field = param_field(seg);
        let ty = builtin_type(seg.value_type);
        params.push(quote! { #field: #ty });
        inits.push(quote! { #field, });
    }
    let req_value = if let Some(req) = &ep.request {
        let base = payload_base_type(tr, req, ctx)?;
        let ty = if req.is_pointer {
            quote! { Option<#base> }
        } else {
            base
        };
        params.push(quote! { params: #ty });
        if is_alias_req(ep) {
            quote! { let __req: #req_ty = params; }
        } else {
            inits.push(quote! { params, });
            quote! { let __req = #req_ty { #(#inits)* }; }
        }
    } else if ep.path.num_params() > 0 {
        quote! { let __req = #req_ty { #(#inits)* }; }
    } else {
        quote! { let __req = #core::api::Void::default(); }
    };

    Ok(quote! {
        pub async fn #caller(
            __ctx: #core::api::Context,
            #(#params),*
        ) -> Result<#resp_ty, #core::api::Error> {
            #req_value
            #desc.call(#core::api::new_call_context(__ctx), __req).await
        }
    })
}

fn descriptor_tokens(
    svc: &Service,
    ep: &Endpoint,
    names: &EndpointNames,
    methods: &[String],
    resp_ty: &TokenStream,
) -> TokenStream {
    let core = runtime::core();
    let req_ty = &names.req_ty;
    let desc = &names.desc;
    let service = &svc.name;
    let endpoint = &ep.name;
    let raw = ep.raw;
    let path = ep.path.to_string();
    let raw_path = ep.path.raw_path();
    let def_loc = ep.def_loc;
    let param_names: Vec<String> = ep.path.params().map(|s| s.value.clone()).collect();
    let access = match ep.access {
        girder_ir::Access::Public => quote! { Public },
        girder_ir::Access::RequiresAuth => quote! { RequiresAuth },
        girder_ir::Access::Private => quote! { Private },
    };

    let decode = &names.decode;
    let clone_req = &names.clone_req;
    let req_path = &names.req_path;
    let user_payload = &names.user_payload;
    let encode_resp = &names.encode_resp;
    let clone_resp = &names.clone_resp;
    let (app_handler, raw_handler) = if ep.raw {
        let h = &names.raw_handler;
        (quote! { None }, quote! { Some(#h) })
    } else {
        let h = &names.app_handler;
        (quote! { Some(#h) }, quote! { None })
    };

    quote! {
        pub static #desc: #core::api::Desc<#req_ty, #resp_ty> = #core::api::Desc {
            service: #service,
            endpoint: #endpoint,
            methods: &[#(#methods),*],
            raw: #raw,
            path: #path,
            raw_path: #raw_path,
            path_param_names: &[#(#param_names),*],
            def_loc: #def_loc,
            access: #core::api::Access::#access,
            decode_req: #decode,
            clone_req: #clone_req,
            req_path: #req_path,
            user_payload: #user_payload,
            app_handler: #app_handler,
            raw_handler: #raw_handler,
            encode_resp: #encode_resp,
            clone_resp: #clone_resp,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_ir::{Access, App, Decl, Field, Path, PathType, PkgLoc, StructType, Type};

    fn svc(name: &str) -> Service {
        Service::new(name, PkgLoc::new(name, name))
    }

    fn gen(app: &App, svc: &Service, ep: &Endpoint) -> (String, EndpointOutput) {
        let mut tr = TypeTranslator::new(app);
        let mut mb = MarshallerBuilder::new();
        let out = generate_endpoint(&mut tr, &mut mb, svc, ep).unwrap();
        (out.tokens.to_string(), out)
    }

    #[test]
    fn ping_endpoint_is_void_void() {
        let app = App::new("myapp");
        let svc = svc("health");
        let mut ep = Endpoint::new("Ping", &["GET"], Path::parse(PathType::Url, "/ping").unwrap());
        ep.access = Access::Public;
        let (text, out) = gen(&app, &svc, &ep);

        assert!(text.contains("pub type __GirderReq_Ping = girder_core :: api :: Void"));
        assert!(text.contains("Desc < __GirderReq_Ping , girder_core :: api :: Void >"));
        assert!(text.contains("methods : & [\"GET\"]"));
        assert!(text.contains("path : \"/ping\""));
        assert!(text.contains("raw_path : \"/ping\""));
        assert!(text.contains("path_param_names : & []"));
        assert!(text.contains("access : girder_core :: api :: Access :: Public"));
        assert_eq!(out.desc_ident.to_string(), "__GIRDER_API_Ping");
    }

    #[test]
    fn path_params_become_typed_fields() {
        let mut app = App::new("myapp");
        app.decls.push(Decl::new(
            0,
            "User",
            Type::Struct(StructType {
                fields: vec![Field::new("Name", Type::builtin(Builtin::String))],
            }),
            PkgLoc::new("users", "users"),
        ));
        let svc = svc("users");
        let mut ep = Endpoint::new(
            "GetUser",
            &["GET"],
            Path::parse(PathType::Url, "/users/:id").unwrap(),
        );
        ep.response = Some(ParamDesc {
            typ: Type::named(0),
            is_pointer: true,
        });
        let (text, _) = gen(&app, &svc, &ep);

        assert!(text.contains("pub id : String"));
        assert!(text.contains("raw_path : \"/users/:0\""));
        // String path params are percent-unescaped.
        assert!(text.contains("path_unescape"));
        // Pointer response guards serialization behind a null check.
        assert!(text.contains("let Some (resp) = resp . as_ref () else"));
        assert!(text.contains("b\"null\\n\""));
    }

    #[test]
    fn raw_endpoint_shape() {
        let app = App::new("myapp");
        let svc = svc("files");
        let mut ep = Endpoint::new(
            "Upload",
            &["POST"],
            Path::parse(PathType::Url, "/files/*path").unwrap(),
        );
        ep.raw = true;
        let (text, _) = gen(&app, &svc, &ep);

        assert!(text.contains("pub w : girder_core :: api :: RawResponseWriter"));
        assert!(text.contains("pub req : girder_core :: api :: RawRequest"));
        // Wildcard values lose exactly one leading slash before validation.
        assert!(text.contains("strip_prefix ('/')"));
        // The converted value is validated but discarded.
        assert!(text.contains("let _ = __de . parse_string"));
        assert!(text.contains("app_handler : None"));
        assert!(text.contains("raw_handler : Some (__girder_files_upload_raw_handler)"));
        // No in-process caller for raw endpoints.
        assert!(!text.contains("pub async fn call_upload"));
    }

    #[test]
    fn alias_request_struct_for_payload_only() {
        let mut app = App::new("myapp");
        app.decls.push(Decl::new(
            0,
            "Params",
            Type::Struct(StructType {
                fields: vec![Field::new("Name", Type::builtin(Builtin::String))],
            }),
            PkgLoc::new("users", "users"),
        ));
        let svc = svc("users");
        let mut ep = Endpoint::new(
            "Create",
            &["POST"],
            Path::parse(PathType::Url, "/users").unwrap(),
        );
        ep.request = Some(ParamDesc {
            typ: Type::named(0),
            is_pointer: false,
        });
        let (text, _) = gen(&app, &svc, &ep);

        assert!(text.contains("pub type __GirderReq_Create = crate :: users :: Params"));
        // Body fields decode with case-insensitive key matching.
        assert!(text.contains("fold_case"));
        assert!(text.contains("\"name\" =>"));
    }

    #[test]
    fn wildcard_methods_expand_in_descriptor() {
        let app = App::new("myapp");
        let svc = svc("health");
        let ep = Endpoint::new("Any", &["*"], Path::parse(PathType::Url, "/any").unwrap());
        let (text, _) = gen(&app, &svc, &ep);
        assert!(text.contains(
            "methods : & [\"GET\" , \"HEAD\" , \"POST\" , \"PUT\" , \"DELETE\" , \"CONNECT\" , \"OPTIONS\" , \"TRACE\" , \"PATCH\"]"
        ));
    }

    #[test]
    fn header_params_feed_cors_sets() {
        let mut app = App::new("myapp");
        app.decls.push(Decl::new(
            0,
            "Req",
            Type::Struct(StructType {
                fields: vec![
                    Field::new("Auth", Type::builtin(Builtin::String))
                        .with_tag("header", "authorization"),
                ],
            }),
            PkgLoc::new("users", "users"),
        ));
        app.decls.push(Decl::new(
            1,
            "Resp",
            Type::Struct(StructType {
                fields: vec![
                    Field::new("Foo", Type::builtin(Builtin::String)).with_tag("header", "x-foo"),
                ],
            }),
            PkgLoc::new("users", "users"),
        ));
        let svc = svc("users");
        let mut ep = Endpoint::new(
            "Fetch",
            &["GET"],
            Path::parse(PathType::Url, "/fetch").unwrap(),
        );
        ep.request = Some(ParamDesc {
            typ: Type::named(0),
            is_pointer: false,
        });
        ep.response = Some(ParamDesc {
            typ: Type::named(1),
            is_pointer: false,
        });
        let (_, out) = gen(&app, &svc, &ep);
        assert_eq!(out.allow_headers, ["Authorization"]);
        assert_eq!(out.expose_headers, ["X-Foo"]);
    }

    #[test]
    fn service_struct_binding_fetches_instance() {
        let app = App::new("myapp");
        let mut service = svc("users");
        service.service_struct = Some(girder_ir::ServiceStruct {
            name: "Service".into(),
            init_func: Some("init_service".into()),
            def_loc: 9,
            init_def_loc: Some(10),
        });
        let mut ep = Endpoint::new(
            "List",
            &["GET"],
            Path::parse(PathType::Url, "/users").unwrap(),
        );
        ep.service_struct = Some("users".into());
        let (text, _) = gen(&app, &service, &ep);
        assert!(text.contains("__GIRDER_SVCSTRUCT_Service . get () . await ?"));
        assert!(text.contains("__svc . list (__ctx) . await"));
    }
}
