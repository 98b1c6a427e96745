//! The Girder compile-time code generator.
//!
//! Given the parsed, cross-referenced IR of a user application
//! ([`girder_ir::App`]), [`generate`] produces the full set of
//! framework-integrated source files that wire the user's handwritten code
//! into the `girder_core` runtime:
//!
//! - one api file per service (endpoint descriptors, service-struct
//!   descriptor, cache key mappers, and the auth-handler descriptor when the
//!   service hosts it),
//! - one infra file per package (metric label mappers, middleware
//!   descriptors),
//! - the shared marshaller library (`girder_gen_etype.rs`),
//! - one config-unmarshaller file per service that loads typed config,
//! - the production entrypoint (`girder_gen_main.rs`) and one test
//!   entrypoint per test package.
//!
//! Generation is a pure function of the IR: it performs no I/O, runs to
//! completion single-threaded, and produces byte-identical output for
//! identical input. Any fatal condition aborts the whole run through
//! [`GenError`] before a single file is produced.

use std::collections::{BTreeMap, BTreeSet};

use proc_macro2::TokenStream;
use quote::quote;

use girder_ir::{App, Endpoint, Service};
use girder_paths::ConflictSet;

pub mod auth;
pub mod config_unmarshal;
pub mod encoding;
pub mod endpoint;
pub mod entrypoint;
pub mod error;
pub mod files;
pub mod infra;
pub mod marshaller;
pub mod middleware;
pub mod names;
pub mod runtime;
pub mod service_struct;
pub mod typetrans;

pub use error::GenError;
pub use files::GeneratedFile;

use entrypoint::{AuthRef, EndpointRef, EntrypointInput, MiddlewareRef, ServiceInitRef};
use marshaller::MarshallerBuilder;
use typetrans::TypeTranslator;

/// Compiler version string, embedded in generated banners and the
/// entrypoint's static data.
pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Run the generator over an application IR.
pub fn generate(app: &App) -> Result<Vec<GeneratedFile>, GenError> {
    let _span = tracing::info_span!("generate", module = %app.module_path).entered();

    check_route_conflicts(app)?;

    let mut tr = TypeTranslator::new(app);
    let mut mb = MarshallerBuilder::new();
    let mut out = Vec::new();

    let mut endpoints: Vec<EndpointRef> = Vec::new();
    let mut service_inits: Vec<ServiceInitRef> = Vec::new();
    let mut auth_ref: Option<AuthRef> = None;
    let mut allow_headers = BTreeSet::new();
    let mut expose_headers = BTreeSet::new();

    let mut services: Vec<&Service> = app.services.iter().collect();
    services.sort_by(|a, b| a.name.cmp(&b.name));

    for svc in &services {
        let _svc_span = tracing::debug_span!("service", name = %svc.name).entered();
        let api_mod = api_module(svc);
        let mut body = TokenStream::new();

        let mut eps: Vec<&Endpoint> = svc.endpoints.iter().collect();
        eps.sort_by(|a, b| a.name.cmp(&b.name));
        for ep in eps {
            let gen = endpoint::generate_endpoint(&mut tr, &mut mb, svc, ep)?;
            allow_headers.extend(gen.allow_headers);
            expose_headers.extend(gen.expose_headers);
            endpoints.push(EndpointRef {
                service: svc.name.clone(),
                name: ep.name.clone(),
                module: api_mod.clone(),
                desc: gen.desc_ident,
                middleware: ep.middleware.clone(),
            });
            body.extend(gen.tokens);
        }

        if let Some(ss) = &svc.service_struct {
            let gen = service_struct::generate_service_struct(svc, ss);
            service_inits.push(ServiceInitRef {
                service: svc.name.clone(),
                module: api_mod.clone(),
                desc: gen.desc_ident,
            });
            body.extend(gen.tokens);
        }

        let mut keyspaces: Vec<_> = svc.keyspaces.iter().collect();
        keyspaces.sort_by(|a, b| a.name.cmp(&b.name));
        for ks in keyspaces {
            body.extend(infra::generate_keyspace(&mut tr, svc, ks)?);
        }

        if let Some(auth) = &app.auth_handler {
            if auth.service == svc.name {
                let gen = auth::generate_auth(&mut tr, &mut mb, svc, auth)?;
                // Browsers must be allowed to send the credential headers.
                allow_headers.extend(gen.allow_headers);
                auth_ref = Some(AuthRef {
                    module: api_mod.clone(),
                    desc: gen.desc_ident,
                    auth_data_ty: gen.auth_data_ty,
                });
                body.extend(gen.tokens);
            }
        }

        for hoisted in tr.take_hoisted() {
            body.extend(hoisted);
        }
        out.push(files::render(
            &files::file_path(&svc.pkg.rel_path, "girder_gen_api.rs"),
            body,
        )?);

        if let Some(cfg) = config_unmarshal::generate_config(&mut tr, &mut mb, svc)? {
            let mut body = cfg;
            for hoisted in tr.take_hoisted() {
                body.extend(hoisted);
            }
            out.push(files::render(
                &files::file_path(&svc.pkg.rel_path, "girder_gen_config.rs"),
                body,
            )?);
        }
    }

    if let Some(auth) = &app.auth_handler {
        if auth_ref.is_none() {
            return Err(GenError::ir_shape(
                format!("auth handler declared on unknown service {}", auth.service),
                "application",
            )
            .at(auth.def_loc));
        }
    }

    // Per-package infra files: metric label mappers plus middleware
    // descriptors, both sorted by name within their package.
    let mut infra_bodies: BTreeMap<String, TokenStream> = BTreeMap::new();
    let mut packages: Vec<_> = app.packages.iter().collect();
    packages.sort_by(|a, b| a.loc.rel_path.cmp(&b.loc.rel_path));
    for pkg in packages {
        let mut metrics: Vec<_> = pkg.metrics.iter().collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        for metric in metrics {
            if let Some(tokens) = infra::generate_metric(&mut tr, &pkg.loc, metric)? {
                infra_bodies.entry(pkg.loc.rel_path.clone()).or_default().extend(tokens);
            }
        }
        for hoisted in tr.take_hoisted() {
            infra_bodies
                .entry(pkg.loc.rel_path.clone())
                .or_default()
                .extend(hoisted);
        }
    }

    let mut middleware_refs: BTreeMap<usize, MiddlewareRef> = BTreeMap::new();
    let mut mw_by_pkg: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, mw) in app.middleware.iter().enumerate() {
        mw_by_pkg.entry(mw.pkg.rel_path.clone()).or_default().push(idx);
    }
    for (rel_path, mut indices) in mw_by_pkg {
        indices.sort_by(|a, b| app.middleware[*a].name.cmp(&app.middleware[*b].name));
        for idx in indices {
            let mw = &app.middleware[idx];
            let gen = middleware::generate_middleware(app, mw)?;
            middleware_refs.insert(
                idx,
                MiddlewareRef {
                    module: names::module_path(&files::file_path(&rel_path, "girder_gen_infra")),
                    desc: gen.desc_ident,
                },
            );
            infra_bodies.entry(rel_path.clone()).or_default().extend(gen.tokens);
        }
    }

    for (rel_path, body) in infra_bodies {
        out.push(files::render(
            &files::file_path(&rel_path, "girder_gen_infra.rs"),
            body,
        )?);
    }

    // The marshaller library is emitted last, once every generator has
    // recorded its demand.
    out.push(files::render("girder_gen_etype.rs", mb.emit_module())?);

    let input = EntrypointInput {
        app,
        endpoints,
        middleware: middleware_refs,
        service_inits,
        auth: auth_ref,
        allow_headers,
        expose_headers,
    };
    out.push(files::render(
        "girder_gen_main.rs",
        entrypoint::generate_main(&input),
    )?);

    let mut test_packages: Vec<_> = app.test_packages.iter().collect();
    test_packages.sort_by(|a, b| a.loc.rel_path.cmp(&b.loc.rel_path));
    for tp in test_packages {
        out.push(files::render(
            &files::file_path(&tp.loc.rel_path, "girder_gen_main_test.rs"),
            entrypoint::generate_test_main(&input, tp),
        )?);
    }

    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

/// Module of a service's generated api file.
fn api_module(svc: &Service) -> TokenStream {
    let module = names::module_path(&svc.pkg.rel_path);
    quote! { #module::girder_gen_api }
}

/// Register every endpoint's (method, path) pairs in a routing trie,
/// surfacing the first conflict with both offending paths.
fn check_route_conflicts(app: &App) -> Result<(), GenError> {
    let mut set = ConflictSet::new();
    let mut services: Vec<&Service> = app.services.iter().collect();
    services.sort_by(|a, b| a.name.cmp(&b.name));
    for svc in services {
        let mut eps: Vec<&Endpoint> = svc.endpoints.iter().collect();
        eps.sort_by(|a, b| a.name.cmp(&b.name));
        for ep in eps {
            for method in &ep.methods {
                set.add(method, &ep.path).map_err(|conflict| GenError::PathConflict {
                    conflict,
                    context: format!("service {}, endpoint {}", svc.name, ep.name),
                })?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_ir::{Path, PathType, PkgLoc};

    #[test]
    fn conflicting_paths_abort_generation() {
        let mut app = App::new("myapp");
        let mut svc = Service::new("users", PkgLoc::new("users", "users"));
        svc.endpoints.push(Endpoint::new(
            "Get",
            &["GET"],
            Path::parse(PathType::Url, "/users/:id").unwrap(),
        ));
        svc.endpoints.push(Endpoint::new(
            "GetAdmin",
            &["GET"],
            Path::parse(PathType::Url, "/users/admin").unwrap(),
        ));
        app.services.push(svc);
        let err = generate(&app).unwrap_err();
        assert!(matches!(err, GenError::PathConflict { .. }), "{err}");
    }
}
