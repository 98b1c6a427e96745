//! Program entrypoint generation: the production `load()` describing the
//! application's static topology, and the per-test-package test loader.

use std::collections::{BTreeMap, BTreeSet};

use proc_macro2::{Ident, TokenStream};
use quote::quote;

use girder_ir::{App, TestPackage};

use crate::runtime;

/// Cross-reference to one generated endpoint descriptor.
pub struct EndpointRef {
    pub service: String,
    pub name: String,
    /// Module of the generated api file, e.g. `crate::users::girder_gen_api`.
    pub module: TokenStream,
    pub desc: Ident,
    /// Pre-matched middleware chain (indices into the app's middleware).
    pub middleware: Vec<usize>,
}

pub struct MiddlewareRef {
    pub module: TokenStream,
    pub desc: Ident,
}

pub struct ServiceInitRef {
    pub service: String,
    pub module: TokenStream,
    pub desc: Ident,
}

pub struct AuthRef {
    pub module: TokenStream,
    pub desc: Ident,
    pub auth_data_ty: Option<TokenStream>,
}

/// Everything the entrypoint emits is resolved ahead of time by the other
/// generators and handed over here.
pub struct EntrypointInput<'a> {
    pub app: &'a App,
    /// Sorted by (service, endpoint) name.
    pub endpoints: Vec<EndpointRef>,
    pub middleware: BTreeMap<usize, MiddlewareRef>,
    pub service_inits: Vec<ServiceInitRef>,
    pub auth: Option<AuthRef>,
    pub allow_headers: BTreeSet<String>,
    pub expose_headers: BTreeSet<String>,
}

/// The production loader file body.
pub fn generate_main(input: &EntrypointInput<'_>) -> TokenStream {
    let core = runtime::core();
    let static_block = static_tokens(input, false, "");

    let handlers: Vec<TokenStream> = input
        .endpoints
        .iter()
        .map(|ep| {
            let module = &ep.module;
            let desc = &ep.desc;
            let middleware = if ep.middleware.is_empty() {
                quote! { None }
            } else {
                let refs: Vec<TokenStream> = ep
                    .middleware
                    .iter()
                    .filter_map(|idx| input.middleware.get(idx))
                    .map(|mw| {
                        let m = &mw.module;
                        let d = &mw.desc;
                        quote! { &#m::#d }
                    })
                    .collect();
                quote! { Some(&[#(#refs),*]) }
            };
            quote! {
                #core::app::HandlerRegistration {
                    handler: &#module::#desc,
                    middleware: #middleware,
                },
            }
        })
        .collect();

    let inits = service_init_tokens(input);
    let auth_handler = auth_tokens(input);

    quote! {
        pub fn load() -> #core::app::LoadData {
            #core::app::LoadData {
                static_data: #static_block,
                api_handlers: vec![
                    #(#handlers)*
                ],
                service_inits: vec![
                    #(#inits)*
                ],
                auth_handler: #auth_handler,
            }
        }

        #core::app::app_loader!(load);
    }
}

/// A test loader file body: testing mode, no API handlers.
pub fn generate_test_main(input: &EntrypointInput<'_>, tp: &TestPackage) -> TokenStream {
    let core = runtime::core();
    let test_service = tp.service.clone().unwrap_or_default();
    let static_block = static_tokens(input, true, &test_service);
    let inits = service_init_tokens(input);
    let auth_handler = auth_tokens(input);

    quote! {
        pub fn load() -> #core::app::LoadData {
            #core::app::LoadData {
                static_data: #static_block,
                api_handlers: Vec::new(),
                service_inits: vec![
                    #(#inits)*
                ],
                auth_handler: #auth_handler,
            }
        }

        #core::app::app_loader!(load);
    }
}

fn service_init_tokens(input: &EntrypointInput<'_>) -> Vec<TokenStream> {
    let core = runtime::core();
    input
        .service_inits
        .iter()
        .map(|init| {
            let service = &init.service;
            let module = &init.module;
            let desc = &init.desc;
            quote! {
                #core::app::Initializer {
                    service: #service,
                    setup: &#module::#desc,
                },
            }
        })
        .collect()
}

fn auth_tokens(input: &EntrypointInput<'_>) -> TokenStream {
    match &input.auth {
        Some(auth) => {
            let module = &auth.module;
            let desc = &auth.desc;
            quote! { Some(&#module::#desc) }
        }
        None => quote! { None },
    }
}

fn static_tokens(input: &EntrypointInput<'_>, testing: bool, test_service: &str) -> TokenStream {
    let core = runtime::core();
    let app = input.app;

    let auth_data = match input.auth.as_ref().and_then(|a| a.auth_data_ty.as_ref()) {
        Some(ty) => quote! { Some(#core::api::TypeDesc::of::<#ty>()) },
        None => quote! { None },
    };

    let version = crate::VERSION;
    let revision = &app.revision;
    let uncommitted = app.uncommitted_changes;

    let allow = header_list_tokens(&input.allow_headers);
    let expose = header_list_tokens(&input.expose_headers);

    // Topics and subscriptions sorted by name for stable output.
    let mut topics: Vec<_> = app.pubsub_topics.iter().collect();
    topics.sort_by(|a, b| a.name.cmp(&b.name));
    let topic_entries: Vec<TokenStream> = topics
        .iter()
        .map(|topic| {
            let name = &topic.name;
            let mut subs: Vec<_> = topic.subscriptions.iter().collect();
            subs.sort_by(|a, b| a.name.cmp(&b.name));
            let sub_entries: Vec<TokenStream> = subs
                .iter()
                .map(|sub| {
                    let sub_name = &sub.name;
                    let service = &sub.service;
                    let trace_idx = sub.trace_idx;
                    quote! {
                        #core::app::StaticPubsubSubscription {
                            name: #sub_name,
                            service: #service,
                            trace_idx: #trace_idx,
                        },
                    }
                })
                .collect();
            quote! {
                #core::app::StaticPubsubTopic {
                    name: #name,
                    subscriptions: &[
                        #(#sub_entries)*
                    ],
                },
            }
        })
        .collect();

    let mut bundled = app.bundled_services.clone();
    bundled.sort();

    quote! {
        #core::app::Static {
            auth_data: #auth_data,
            girder_version: #version,
            commit: #core::app::CommitInfo {
                revision: #revision,
                uncommitted: #uncommitted,
            },
            cors_allow_headers: #allow,
            cors_expose_headers: #expose,
            pubsub_topics: &[
                #(#topic_entries)*
            ],
            testing: #testing,
            test_service: #test_service,
            bundled_services: &[#(#bundled),*],
        }
    }
}

fn header_list_tokens(headers: &BTreeSet<String>) -> TokenStream {
    if headers.is_empty() {
        quote! { None }
    } else {
        let items: Vec<&String> = headers.iter().collect();
        quote! { Some(&[#(#items),*]) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::{ident, module_path};
    use girder_ir::{PubsubSubscription, PubsubTopic};

    fn input_for(app: &App) -> EntrypointInput<'_> {
        EntrypointInput {
            app,
            endpoints: vec![EndpointRef {
                service: "users".into(),
                name: "GetUser".into(),
                module: module_path("users/girder_gen_api"),
                desc: ident("__GIRDER_API_GetUser"),
                middleware: vec![0],
            }],
            middleware: BTreeMap::from([(
                0usize,
                MiddlewareRef {
                    module: module_path("mw/girder_gen_infra"),
                    desc: ident("__GIRDER_MIDDLEWARE_Logger"),
                },
            )]),
            service_inits: vec![ServiceInitRef {
                service: "users".into(),
                module: module_path("users/girder_gen_api"),
                desc: ident("__GIRDER_SVCSTRUCT_Service"),
            }],
            auth: None,
            allow_headers: BTreeSet::from(["X-Foo".to_owned(), "Authorization".to_owned()]),
            expose_headers: BTreeSet::new(),
        }
    }

    #[test]
    fn cors_headers_are_sorted_and_optional() {
        let mut app = App::new("myapp");
        app.revision = "abc123".into();
        let input = input_for(&app);
        let text = generate_main(&input).to_string();
        assert!(text.contains("cors_allow_headers : Some (& [\"Authorization\" , \"X-Foo\"])"));
        assert!(text.contains("cors_expose_headers : None"));
    }

    #[test]
    fn handlers_carry_their_middleware_chain() {
        let app = App::new("myapp");
        let input = input_for(&app);
        let text = generate_main(&input).to_string();
        assert!(text.contains("handler : & crate :: users :: girder_gen_api :: __GIRDER_API_GetUser"));
        assert!(text.contains(
            "middleware : Some (& [& crate :: mw :: girder_gen_infra :: __GIRDER_MIDDLEWARE_Logger])"
        ));
        assert!(text.contains("setup : & crate :: users :: girder_gen_api :: __GIRDER_SVCSTRUCT_Service"));
    }

    #[test]
    fn pubsub_topics_sorted_with_trace_idx() {
        let mut app = App::new("myapp");
        app.pubsub_topics = vec![
            PubsubTopic {
                name: "zebra".into(),
                subscriptions: vec![],
            },
            PubsubTopic {
                name: "emails".into(),
                subscriptions: vec![PubsubSubscription {
                    name: "send".into(),
                    service: "email".into(),
                    trace_idx: 2,
                }],
            },
        ];
        let input = input_for(&app);
        let text = generate_main(&input).to_string();
        let emails_at = text.find("\"emails\"").unwrap();
        let zebra_at = text.find("\"zebra\"").unwrap();
        assert!(emails_at < zebra_at);
        assert!(text.contains("trace_idx : 2i32"));
    }

    #[test]
    fn test_main_sets_testing_mode_without_handlers() {
        let mut app = App::new("myapp");
        app.bundled_services = vec!["users".into(), "billing".into()];
        let input = input_for(&app);
        let tp = TestPackage {
            loc: girder_ir::PkgLoc::new("users", "users"),
            service: Some("users".into()),
        };
        let text = generate_test_main(&input, &tp).to_string();
        assert!(text.contains("testing : true"));
        assert!(text.contains("test_service : \"users\""));
        assert!(text.contains("api_handlers : Vec :: new ()"));
        // Bundled services are sorted.
        assert!(text.contains("bundled_services : & [\"billing\" , \"users\"]"));
    }

    #[test]
    fn loader_registers_through_runtime_hook() {
        let app = App::new("myapp");
        let input = input_for(&app);
        let text = generate_main(&input).to_string();
        assert!(text.contains("app_loader ! (load)"));
    }
}
