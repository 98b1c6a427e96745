//! Infrastructure mappers: cache keyspace key formatting and metric label
//! mapping.

use proc_macro2::TokenStream;
use quote::quote;

use girder_ir::{Builtin, CacheKeyspace, Metric, PkgLoc, SegmentKind, Service};

use crate::error::GenError;
use crate::names::{field_ident, ident, snake};
use crate::typetrans::{resolve_builtin, resolve_struct, TypeTranslator};

/// Generate the key-mapper function for a cache keyspace: composes the
/// keyspace path from the key's segment variables.
pub fn generate_keyspace(
    tr: &mut TypeTranslator<'_>,
    svc: &Service,
    ks: &CacheKeyspace,
) -> Result<TokenStream, GenError> {
    let ctx = format!("service {}, keyspace {}", svc.name, ks.name);
    let fn_name = ident(&format!(
        "__girder_{}_{}_key_mapper",
        snake(&svc.name),
        snake(&ks.name)
    ));
    let key_ty = tr.rust_type(&ks.key_type, &ctx)?;

    let scalar_key = resolve_builtin(tr.app(), &ks.key_type);

    let mut template = String::new();
    let mut args: Vec<TokenStream> = Vec::new();
    for (i, seg) in ks.path.segments.iter().enumerate() {
        if i > 0 {
            template.push('/');
        }
        if seg.kind == SegmentKind::Literal {
            // Literal braces would be read as format placeholders.
            template.push_str(&seg.value.replace('{', "{{").replace('}', "}}"));
            continue;
        }
        template.push_str("{}");

        let (kind, value) = match scalar_key {
            Some(kind) => (kind, quote! { key }),
            None => {
                let (st, _) = resolve_struct(tr.app(), &ks.key_type).ok_or_else(|| {
                    GenError::ir_shape(
                        "cache key type must be a builtin scalar or a struct of builtin scalars",
                        &ctx,
                    )
                    .at(ks.def_loc)
                })?;
                let field = st
                    .fields
                    .iter()
                    .find(|f| f.name == seg.value || snake(&f.name) == snake(&seg.value))
                    .ok_or_else(|| {
                        GenError::ir_shape(
                            format!("cache key struct has no field for path segment {:?}", seg.value),
                            &ctx,
                        )
                        .at(ks.def_loc)
                    })?;
                let kind = resolve_builtin(tr.app(), &field.typ).ok_or_else(|| {
                    GenError::ir_shape(
                        format!("cache key field {} must be a builtin scalar", field.name),
                        &ctx,
                    )
                    .at(ks.def_loc)
                })?;
                let name = field_ident(&field.name);
                (kind, quote! { key.#name })
            }
        };

        // String-shaped segments escape path separators in their values.
        let arg = match kind {
            Builtin::String => quote! { #value.replace('/', "\\/") },
            Builtin::Bytes => quote! { String::from_utf8_lossy(&#value).replace('/', "\\/") },
            _ => value,
        };
        args.push(arg);
    }

    let body = if args.is_empty() {
        quote! { #template.to_owned() }
    } else {
        quote! { format!(#template, #(#args),*) }
    };

    Ok(quote! {
        pub fn #fn_name(key: #key_ty) -> String {
            #body
        }
    })
}

/// Generate the label mapper for a metric. Metrics without a label struct
/// are skipped.
pub fn generate_metric(
    tr: &mut TypeTranslator<'_>,
    pkg: &PkgLoc,
    metric: &Metric,
) -> Result<Option<TokenStream>, GenError> {
    let Some(labels_ty) = &metric.labels else {
        return Ok(None);
    };
    let ctx = format!("package {}, metric {}", pkg.pkg_name, metric.name);

    let (st, decl) = resolve_struct(tr.app(), labels_ty).ok_or_else(|| {
        GenError::ir_shape("metric labels must be a named struct of builtin fields", &ctx)
            .at(metric.def_loc)
    })?;
    if decl.is_none() {
        return Err(GenError::ir_shape(
            "metric labels must be a named struct",
            &ctx,
        )
        .at(metric.def_loc));
    }

    // Stable output: fields sorted by their snake-cased key name.
    let mut fields: Vec<_> = st.fields.iter().collect();
    fields.sort_by_key(|f| snake(&f.name));

    let core = crate::runtime::core();
    let mut entries = Vec::new();
    for field in fields {
        let key = snake(&field.name);
        let name = field_ident(&field.name);
        let kind = resolve_builtin(tr.app(), &field.typ).ok_or_else(|| {
            GenError::ir_shape(
                format!("metric label field {} has a non-builtin type", field.name),
                &ctx,
            )
            .at(metric.def_loc)
        })?;
        let value = match kind {
            Builtin::String => quote! { labels.#name.clone() },
            Builtin::Bool => quote! { labels.#name.to_string() },
            k if k.is_integer() || k.is_float() => quote! { labels.#name.to_string() },
            _ => {
                return Err(GenError::ir_shape(
                    format!(
                        "metric label field {} must be a string, bool, or numeric type",
                        field.name
                    ),
                    &ctx,
                )
                .at(metric.def_loc));
            }
        };
        entries.push(quote! {
            #core::metrics::KeyValue { key: #key, value: #value },
        });
    }

    let fn_name = ident(&format!("__girder_metric_{}_labels", snake(&metric.name)));
    let labels_rust = tr.rust_type(labels_ty, &ctx)?;

    Ok(Some(quote! {
        pub fn #fn_name(labels: &#labels_rust) -> Vec<#core::metrics::KeyValue> {
            vec![
                #(#entries)*
            ]
        }
    }))
}
