//! Typed config unmarshaller generation.
//!
//! For every service with `config::load` call sites this emits one
//! named-type unmarshaller per declaration reachable from any load site,
//! plus one concrete unmarshaller per load site with all type arguments
//! pinned, so no generic instantiation happens at the call.

use std::collections::{BTreeMap, BTreeSet};

use proc_macro2::{Ident, TokenStream};
use quote::quote;

use girder_ir::{App, Decl, DeclId, Service, Type};

use crate::error::GenError;
use crate::marshaller::{kind_suffix, MarshallerBuilder, Usage};
use crate::names::{field_ident, ident, mangle_type_expr, module_path, snake};
use crate::runtime;
use crate::typetrans::{resolve_builtin, TypeTranslator};

/// Generate the config-unmarshaller file body for a service, or `None` when
/// the service loads no typed config.
pub fn generate_config(
    tr: &mut TypeTranslator<'_>,
    mb: &mut MarshallerBuilder,
    svc: &Service,
) -> Result<Option<TokenStream>, GenError> {
    if svc.config_loads.is_empty() {
        return Ok(None);
    }
    let ctx = format!("service {}, config", svc.name);
    tracing::debug!(service = %svc.name, loads = svc.config_loads.len(), "generating config unmarshallers");

    // Discover every declaration reachable from any load site, sorted
    // ascending by id for deterministic emission.
    let mut decl_ids = BTreeSet::new();
    for load in &svc.config_loads {
        collect_decls(tr.app(), &load.concrete, &mut decl_ids, &ctx)?;
    }

    let mut items = Vec::new();
    for id in &decl_ids {
        let decl = tr.lookup(*id, &ctx)?;
        items.push(named_unmarshaller(tr, mb, decl, &ctx)?);
    }

    // One concrete unmarshaller per load site; identical concrete types
    // collapse to a single definition.
    let mut loads: BTreeMap<String, TokenStream> = BTreeMap::new();
    for load in &svc.config_loads {
        let display = {
            let base = tr.type_display(&load.concrete, &ctx)?;
            if load.is_pointer {
                format!("Option<{base}>")
            } else {
                base
            }
        };
        let name = format!("__GIRDER_CONFIG_LOAD_{}", mangle_type_expr(&display));
        if loads.contains_key(&name) {
            continue;
        }
        let tokens = load_site_unmarshaller(tr, mb, load, &name, &ctx)?;
        loads.insert(name, tokens);
    }
    items.extend(loads.into_values());

    Ok(Some(quote! { #(#items)* }))
}

fn unmarshal_fn_name(decl: &Decl) -> Ident {
    let pkg = if decl.loc.rel_path.is_empty() {
        "root".to_owned()
    } else {
        decl.loc.rel_path.replace('/', "_")
    };
    ident(&format!("__girder_config_unmarshal_{pkg}_{}", decl.name))
}

fn unmarshal_arg_name(param: &str) -> Ident {
    ident(&format!("__unmarshal_{}", snake(param)))
}

/// Emit the named-type unmarshaller function for one declaration. Generic
/// declarations become generic functions taking one unmarshaller argument
/// per type parameter.
fn named_unmarshaller(
    tr: &mut TypeTranslator<'_>,
    mb: &mut MarshallerBuilder,
    decl: &Decl,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    let core = runtime::core();
    let fn_name = unmarshal_fn_name(decl);
    let decl_mod = module_path(&decl.loc.rel_path);
    let decl_name = ident(&decl.name);

    let params: Vec<Ident> = decl.type_params.iter().map(|p| ident(&p.name)).collect();
    let obj_ty = if params.is_empty() {
        quote! { #decl_mod::#decl_name }
    } else {
        quote! { #decl_mod::#decl_name<#(#params),*> }
    };

    // A struct body unmarshals into the declared type itself; anything else
    // (aliases, containers) goes through the general expression.
    let body = match &decl.typ {
        Type::Struct(st) => {
            struct_unmarshal_expr(tr, mb, Some(decl), st, obj_ty.clone(), quote! { __path }, ctx)?
        }
        other => unmarshal_expr(tr, mb, Some(decl), other, quote! { __path }, ctx)?,
    };

    if decl.type_params.is_empty() {
        return Ok(quote! {
            pub fn #fn_name(
                __r: &mut #core::config::Reader,
                __path: #core::config::Path,
            ) -> #obj_ty {
                #body
            }
        });
    }
    let args: Vec<TokenStream> = decl
        .type_params
        .iter()
        .map(|p| {
            let arg = unmarshal_arg_name(&p.name);
            let ty = ident(&p.name);
            quote! {
                #arg: impl Fn(&mut #core::config::Reader, #core::config::Path) -> #ty + Copy
            }
        })
        .collect();

    Ok(quote! {
        pub fn #fn_name<#(#params: Default),*>(
            __r: &mut #core::config::Reader,
            __path: #core::config::Path,
            #(#args),*
        ) -> #obj_ty {
            #body
        }
    })
}

fn load_site_unmarshaller(
    tr: &mut TypeTranslator<'_>,
    mb: &mut MarshallerBuilder,
    load: &girder_ir::ConfigLoad,
    name: &str,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    let core = runtime::core();
    let static_name = ident(name);
    let base_ty = tr.rust_type(&load.concrete, ctx)?;
    let full_ty = if load.is_pointer {
        quote! { Option<#base_ty> }
    } else {
        base_ty
    };

    let inner = unmarshal_expr(tr, mb, None, &load.concrete, quote! { __path }, ctx)?;
    let init = if load.is_pointer {
        quote! {
            |__r, __path| if __r.read_nil() { None } else { Some(#inner) }
        }
    } else if direct_fn_ref(tr, &load.concrete) {
        // A plain non-generic named type: the function item itself is the
        // unmarshaller.
        let decl = match &load.concrete {
            Type::Named(named) => tr.lookup(named.id, ctx)?,
            _ => unreachable!(),
        };
        let fn_name = unmarshal_fn_name(decl);
        quote! { #fn_name }
    } else {
        quote! { |__r, __path| #inner }
    };

    Ok(quote! {
        pub static #static_name: #core::config::Unmarshaler<#full_ty> = #init;
    })
}

fn direct_fn_ref(tr: &TypeTranslator<'_>, ty: &Type) -> bool {
    match ty {
        Type::Named(named) => match tr.app().decl(named.id) {
            Some(decl) => decl.type_params.is_empty() && named.type_args.is_empty(),
            None => false,
        },
        _ => false,
    }
}

/// Expression reading a value of `ty` from `__r` at `path`.
fn unmarshal_expr(
    tr: &mut TypeTranslator<'_>,
    mb: &mut MarshallerBuilder,
    current: Option<&Decl>,
    ty: &Type,
    path: TokenStream,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    let core = runtime::core();
    Ok(match ty {
        Type::Builtin(kind) => {
            let method = ident(&format!("read_{}", kind_suffix(*kind)));
            quote! { __r.#method() }
        }
        Type::Named(named) => {
            let decl = tr.lookup(named.id, ctx)?;
            let fn_name = unmarshal_fn_name(decl);
            if decl.type_params.is_empty() {
                quote! { #fn_name(__r, #path) }
            } else {
                if named.type_args.len() != decl.type_params.len() {
                    return Err(GenError::ir_shape(
                        format!(
                            "config type {} used with {} type arguments, expected {}",
                            decl.name,
                            named.type_args.len(),
                            decl.type_params.len()
                        ),
                        ctx,
                    ));
                }
                let args = named
                    .type_args
                    .iter()
                    .map(|arg| {
                        let inner = unmarshal_expr(tr, mb, current, arg, quote! { __path }, ctx)?;
                        Ok(quote! { |__r: &mut #core::config::Reader, __path: #core::config::Path| #inner })
                    })
                    .collect::<Result<Vec<_>, GenError>>()?;
                quote! { #fn_name(__r, #path, #(#args),*) }
            }
        }
        Type::Struct(st) => {
            let obj_ty = tr.rust_type(ty, ctx)?;
            struct_unmarshal_expr(tr, mb, current, st, obj_ty, path, ctx)?
        }
        Type::Map(key, value) => {
            let key_kind = resolve_builtin(tr.app(), key).ok_or_else(|| {
                GenError::ir_shape("config map keys must be builtin scalars", ctx)
            })?;
            let mut usage = Usage::new();
            let etype = runtime::etype();
            let key_call = mb.decode(&mut usage, key_kind, "map key", quote! { __key }, true);
            let value_expr = unmarshal_expr(tr, mb, current, value, quote! { __path }, ctx)?;
            quote! {
                #core::config::read_map(
                    __r,
                    #path,
                    |__key| {
                        let mut __de = #etype::Marshaller::new();
                        #key_call
                    },
                    |__r, __path| #value_expr,
                )
            }
        }
        Type::List(elem) => {
            let elem_expr = unmarshal_expr(tr, mb, current, elem, quote! { __path }, ctx)?;
            quote! {
                #core::config::read_array(__r, #path, |__r, __path| #elem_expr)
            }
        }
        Type::Pointer(base) => {
            let base_expr = unmarshal_expr(tr, mb, current, base, path, ctx)?;
            quote! {
                if __r.read_nil() { None } else { Some(#base_expr) }
            }
        }
        Type::Config { elem, values_list } => {
            if *values_list {
                let elem_expr = unmarshal_expr(tr, mb, current, elem, quote! { __path }, ctx)?;
                quote! {
                    #core::config::create_value_list(
                        #core::config::read_array(__r, #path, |__r, __path| #elem_expr),
                        #path,
                    )
                }
            } else {
                let elem_expr = unmarshal_expr(tr, mb, current, elem, path.clone(), ctx)?;
                quote! {
                    #core::config::create_value(#elem_expr, #path)
                }
            }
        }
        Type::TypeParam { decl, index } => {
            let owner = tr.lookup(*decl, ctx)?;
            let in_scope = current.map(|d| d.id == *decl).unwrap_or(false);
            if !in_scope {
                return Err(GenError::ir_shape(
                    format!(
                        "type parameter of {} referenced outside its declaration",
                        owner.name
                    ),
                    ctx,
                ));
            }
            let param = owner.type_params.get(*index).ok_or_else(|| {
                GenError::ir_shape(
                    format!("type parameter index {index} out of range for {}", owner.name),
                    ctx,
                )
            })?;
            let arg = unmarshal_arg_name(&param.name);
            quote! { #arg(__r, #path) }
        }
    })
}

fn struct_unmarshal_expr(
    tr: &mut TypeTranslator<'_>,
    mb: &mut MarshallerBuilder,
    current: Option<&Decl>,
    st: &girder_ir::StructType,
    obj_ty: TokenStream,
    path: TokenStream,
    ctx: &str,
) -> Result<TokenStream, GenError> {
    let core = runtime::core();
    let mut arms = Vec::new();
    for field in &st.fields {
        if field.json_name.as_deref() == Some("-") {
            continue;
        }
        let key = field.wire_name().to_owned();
        let name = field_ident(&field.name);
        let value = unmarshal_expr(tr, mb, current, &field.typ, quote! { #path.child(#key) }, ctx)?;
        arms.push(quote! { #key => { __obj.#name = #value; } });
    }
    Ok(quote! {
        {
            let mut __obj: #obj_ty = Default::default();
            #core::config::read_object(__r, |__r, __field| match __field {
                #(#arms)*
                _ => { __r.skip(); }
            });
            __obj
        }
    })
}

/// Collect every declaration id reachable from a type, following both the
/// declarations' bodies and use-site type arguments.
fn collect_decls(
    app: &App,
    ty: &Type,
    out: &mut BTreeSet<DeclId>,
    ctx: &str,
) -> Result<(), GenError> {
    match ty {
        Type::Builtin(_) | Type::TypeParam { .. } => Ok(()),
        Type::Named(named) => {
            for arg in &named.type_args {
                collect_decls(app, arg, out, ctx)?;
            }
            if out.insert(named.id) {
                let decl = app
                    .decl(named.id)
                    .ok_or_else(|| GenError::ir_shape(format!("dangling declaration id {}", named.id), ctx))?;
                collect_decls(app, &decl.typ, out, ctx)?;
            }
            Ok(())
        }
        Type::Struct(st) => {
            for field in &st.fields {
                collect_decls(app, &field.typ, out, ctx)?;
            }
            Ok(())
        }
        Type::Map(key, value) => {
            collect_decls(app, key, out, ctx)?;
            collect_decls(app, value, out, ctx)
        }
        Type::List(elem) | Type::Pointer(elem) => collect_decls(app, elem, out, ctx),
        Type::Config { elem, .. } => collect_decls(app, elem, out, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_ir::{Builtin, ConfigLoad, Field, PkgLoc, StructType, TypeParam};

    fn billing_app() -> App {
        let mut app = App::new("myapp");
        app.decls.push(Decl::new(
            0,
            "Config",
            Type::Struct(StructType {
                fields: vec![Field::new(
                    "Rate",
                    Type::config(Type::builtin(Builtin::Float64), false),
                )
                .with_json_name("rate")],
            }),
            PkgLoc::new("billing", "billing"),
        ));
        app
    }

    fn billing_svc(loads: Vec<ConfigLoad>) -> Service {
        let mut svc = Service::new("billing", PkgLoc::new("billing", "billing"));
        svc.config_loads = loads;
        svc
    }

    fn gen(app: &App, svc: &Service) -> String {
        let mut tr = TypeTranslator::new(app);
        let mut mb = MarshallerBuilder::new();
        generate_config(&mut tr, &mut mb, svc)
            .unwrap()
            .unwrap()
            .to_string()
    }

    #[test]
    fn value_fields_wrap_with_live_path() {
        let app = billing_app();
        let svc = billing_svc(vec![ConfigLoad {
            concrete: Type::named(0),
            is_pointer: false,
            def_loc: 20,
        }]);
        let text = gen(&app, &svc);
        assert!(text.contains("pub fn __girder_config_unmarshal_billing_Config"));
        assert!(text.contains("create_value (__r . read_f64 ()"));
        assert!(text.contains("__path . child (\"rate\")"));
        // Concrete load-site unmarshaller pins the type.
        assert!(text.contains("pub static __GIRDER_CONFIG_LOAD_billing__Config"));
        assert!(text.contains("Unmarshaler < crate :: billing :: Config >"));
    }

    #[test]
    fn no_loads_no_file() {
        let app = billing_app();
        let svc = billing_svc(vec![]);
        let mut tr = TypeTranslator::new(&app);
        let mut mb = MarshallerBuilder::new();
        assert!(generate_config(&mut tr, &mut mb, &svc).unwrap().is_none());
    }

    #[test]
    fn generic_decl_takes_unmarshaller_args() {
        let mut app = App::new("myapp");
        let mut pair = Decl::new(
            1,
            "Pair",
            Type::Struct(StructType {
                fields: vec![
                    Field::new("First", Type::TypeParam { decl: 1, index: 0 }),
                    Field::new("Second", Type::TypeParam { decl: 1, index: 1 }),
                ],
            }),
            PkgLoc::new("billing", "billing"),
        );
        pair.type_params = vec![TypeParam { name: "T".into() }, TypeParam { name: "U".into() }];
        app.decls.push(pair);

        let svc = billing_svc(vec![ConfigLoad {
            concrete: Type::named_with(
                1,
                vec![Type::builtin(Builtin::Int64), Type::builtin(Builtin::String)],
            ),
            is_pointer: false,
            def_loc: 20,
        }]);
        let text = gen(&app, &svc);
        assert!(text.contains("pub fn __girder_config_unmarshal_billing_Pair < T : Default , U : Default >"));
        assert!(text.contains("__unmarshal_t"));
        assert!(text.contains("__unmarshal_u"));
        // The load site pins both arguments as closures.
        assert!(text.contains("| __r : & mut girder_core :: config :: Reader , __path : girder_core :: config :: Path | __r . read_i64 ()"));
        assert!(text.contains("__GIRDER_CONFIG_LOAD_billing__Pair_i64__String_"));
    }

    #[test]
    fn load_site_names_stay_distinct() {
        let mut app = billing_app();
        let mut generic = Decl::new(
            1,
            "Box",
            Type::Struct(StructType {
                fields: vec![Field::new("Value", Type::TypeParam { decl: 1, index: 0 })],
            }),
            PkgLoc::new("billing", "billing"),
        );
        generic.type_params = vec![TypeParam { name: "T".into() }];
        app.decls.push(generic);

        let svc = billing_svc(vec![
            ConfigLoad {
                concrete: Type::named(0),
                is_pointer: false,
                def_loc: 20,
            },
            ConfigLoad {
                concrete: Type::named_with(1, vec![Type::named(0)]),
                is_pointer: false,
                def_loc: 21,
            },
        ]);
        let text = gen(&app, &svc);
        let a = "__GIRDER_CONFIG_LOAD_billing__Config";
        let b = "__GIRDER_CONFIG_LOAD_billing__Box_billing__Config_";
        assert!(text.contains(a));
        assert!(text.contains(b));
    }

    #[test]
    fn pointer_load_reads_nil() {
        let app = billing_app();
        let svc = billing_svc(vec![ConfigLoad {
            concrete: Type::named(0),
            is_pointer: true,
            def_loc: 20,
        }]);
        let text = gen(&app, &svc);
        assert!(text.contains("if __r . read_nil () { None } else { Some"));
        assert!(text.contains("Unmarshaler < Option < crate :: billing :: Config > >"));
    }

    #[test]
    fn maps_and_lists_use_runtime_helpers() {
        let mut app = App::new("myapp");
        app.decls.push(Decl::new(
            0,
            "Config",
            Type::Struct(StructType {
                fields: vec![
                    Field::new(
                        "Limits",
                        Type::map(Type::builtin(Builtin::String), Type::builtin(Builtin::Int64)),
                    ),
                    Field::new("Names", Type::list(Type::builtin(Builtin::String))),
                ],
            }),
            PkgLoc::new("billing", "billing"),
        ));
        let svc = billing_svc(vec![ConfigLoad {
            concrete: Type::named(0),
            is_pointer: false,
            def_loc: 20,
        }]);
        let text = gen(&app, &svc);
        assert!(text.contains("config :: read_map"));
        assert!(text.contains("config :: read_array"));
        // Map keys parse through the marshaller.
        assert!(text.contains("Marshaller :: new ()"));
    }
}
