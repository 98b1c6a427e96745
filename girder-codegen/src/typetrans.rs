//! Translation of IR type descriptors into target type expressions.
//!
//! Two occurrences of the same IR type always produce textually equal
//! expressions, which is what keeps repeated generation runs byte-equal.

use proc_macro2::TokenStream;
use quote::quote;

use girder_ir::{App, Builtin, Decl, Field, StructType, Type};

use crate::error::GenError;
use crate::names::{field_ident, ident, module_path, type_param_placeholder};

/// Translates IR types to Rust type expressions, hoisting inline structural
/// types into named definitions as it goes (the target has no anonymous
/// structs).
pub struct TypeTranslator<'a> {
    app: &'a App,
    hoisted: Vec<TokenStream>,
    anon_count: usize,
}

impl<'a> TypeTranslator<'a> {
    pub fn new(app: &'a App) -> Self {
        TypeTranslator {
            app,
            hoisted: Vec::new(),
            anon_count: 0,
        }
    }

    pub fn app(&self) -> &'a App {
        self.app
    }

    /// Definitions hoisted while translating, to be appended to the file
    /// being generated. Resets the hoist buffer.
    pub fn take_hoisted(&mut self) -> Vec<TokenStream> {
        std::mem::take(&mut self.hoisted)
    }

    /// Render an IR type as a Rust type expression.
    pub fn rust_type(&mut self, ty: &Type, ctx: &str) -> Result<TokenStream, GenError> {
        Ok(match ty {
            Type::Builtin(b) => builtin_type(*b),
            Type::Named(named) => {
                let decl = self.lookup(named.id, ctx)?;
                let path = module_path(&decl.loc.rel_path);
                let name = ident(&decl.name);
                if !named.type_args.is_empty() {
                    let args = named
                        .type_args
                        .iter()
                        .map(|a| self.rust_type(a, ctx))
                        .collect::<Result<Vec<_>, _>>()?;
                    quote! { #path::#name<#(#args),*> }
                } else if !decl.type_params.is_empty() {
                    // Walked without use-site arguments: emit documented
                    // placeholder identifiers.
                    let args = decl
                        .type_params
                        .iter()
                        .map(|p| ident(&type_param_placeholder(&p.name)))
                        .collect::<Vec<_>>();
                    quote! { #path::#name<#(#args),*> }
                } else {
                    quote! { #path::#name }
                }
            }
            Type::Struct(st) => {
                let name = self.hoist_struct(st, ctx)?;
                quote! { #name }
            }
            Type::Map(key, value) => {
                let key = self.rust_type(key, ctx)?;
                let value = self.rust_type(value, ctx)?;
                quote! { std::collections::HashMap<#key, #value> }
            }
            Type::List(elem) => {
                let elem = self.rust_type(elem, ctx)?;
                quote! { Vec<#elem> }
            }
            Type::Pointer(base) => {
                let base = self.rust_type(base, ctx)?;
                quote! { Option<#base> }
            }
            Type::TypeParam { decl, index } => {
                let decl = self.lookup(*decl, ctx)?;
                let param = decl.type_params.get(*index).ok_or_else(|| {
                    GenError::ir_shape(
                        format!(
                            "type parameter index {index} out of range for declaration {}",
                            decl.name
                        ),
                        ctx,
                    )
                })?;
                let name = ident(&param.name);
                quote! { #name }
            }
            Type::Config { elem, values_list } => {
                let elem = self.rust_type(elem, ctx)?;
                if *values_list {
                    quote! { girder_core::config::Values<#elem> }
                } else {
                    quote! { girder_core::config::Value<#elem> }
                }
            }
        })
    }

    /// Render a struct definition's fields, with serde attributes expressing
    /// the IR's wire tags and preserved doc comments.
    pub fn struct_fields(&mut self, st: &StructType, ctx: &str) -> Result<Vec<TokenStream>, GenError> {
        st.fields
            .iter()
            .map(|f| self.field_def(f, ctx))
            .collect()
    }

    fn field_def(&mut self, field: &Field, ctx: &str) -> Result<TokenStream, GenError> {
        let name = field_ident(&field.name);
        let ty = self.rust_type(&field.typ, ctx)?;

        let mut attrs = Vec::new();
        if !field.doc.is_empty() {
            let doc = &field.doc;
            attrs.push(quote! { #[doc = #doc] });
        }
        if field.json_name.as_deref() == Some("-") {
            attrs.push(quote! { #[serde(skip)] });
        } else {
            let wire = field.wire_name();
            if wire != name.to_string() {
                attrs.push(quote! { #[serde(rename = #wire)] });
            }
            if field.optional {
                if renders_as_option(&field.typ) {
                    attrs.push(quote! { #[serde(default, skip_serializing_if = "Option::is_none")] });
                } else {
                    attrs.push(quote! { #[serde(default)] });
                }
            }
        }

        Ok(quote! {
            #(#attrs)*
            pub #name: #ty,
        })
    }

    fn hoist_struct(&mut self, st: &StructType, ctx: &str) -> Result<proc_macro2::Ident, GenError> {
        let name = ident(&format!("__GirderType{}", self.anon_count));
        self.anon_count += 1;
        let fields = self.struct_fields(st, ctx)?;
        self.hoisted.push(quote! {
            #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
            pub struct #name {
                #(#fields)*
            }
        });
        Ok(name)
    }

    /// Compact display form of a type, used to derive identifiers (e.g.
    /// `billing::Config<i64, String>`).
    pub fn type_display(&self, ty: &Type, ctx: &str) -> Result<String, GenError> {
        Ok(match ty {
            Type::Builtin(b) => builtin_display(*b).to_owned(),
            Type::Named(named) => {
                let decl = self.lookup(named.id, ctx)?;
                let mut out = if decl.loc.rel_path.is_empty() {
                    decl.name.clone()
                } else {
                    format!("{}::{}", decl.loc.rel_path.replace('/', "::"), decl.name)
                };
                if !named.type_args.is_empty() {
                    let args = named
                        .type_args
                        .iter()
                        .map(|a| self.type_display(a, ctx))
                        .collect::<Result<Vec<_>, _>>()?;
                    out.push('<');
                    out.push_str(&args.join(", "));
                    out.push('>');
                }
                out
            }
            Type::Struct(_) => "struct".to_owned(),
            Type::Map(key, value) => format!(
                "Map<{}, {}>",
                self.type_display(key, ctx)?,
                self.type_display(value, ctx)?
            ),
            Type::List(elem) => format!("Vec<{}>", self.type_display(elem, ctx)?),
            Type::Pointer(base) => format!("Option<{}>", self.type_display(base, ctx)?),
            Type::TypeParam { decl, index } => {
                let decl = self.lookup(*decl, ctx)?;
                decl.type_params
                    .get(*index)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| format!("P{index}"))
            }
            Type::Config { elem, values_list } => {
                let inner = self.type_display(elem, ctx)?;
                if *values_list {
                    format!("Values<{inner}>")
                } else {
                    format!("Value<{inner}>")
                }
            }
        })
    }

    pub fn lookup(&self, id: girder_ir::DeclId, ctx: &str) -> Result<&'a Decl, GenError> {
        self.app
            .decl(id)
            .ok_or_else(|| GenError::ir_shape(format!("dangling declaration id {id}"), ctx))
    }
}

/// Whether the translated form of a type is `Option<_>`.
pub fn renders_as_option(ty: &Type) -> bool {
    matches!(ty, Type::Pointer(_))
}

/// The Rust rendering of a builtin kind.
pub fn builtin_type(b: Builtin) -> TokenStream {
    match b {
        Builtin::Any => quote! { serde_json::Value },
        Builtin::Bool => quote! { bool },
        Builtin::Int8 => quote! { i8 },
        Builtin::Int16 => quote! { i16 },
        Builtin::Int32 => quote! { i32 },
        Builtin::Int64 => quote! { i64 },
        Builtin::Int => quote! { i64 },
        Builtin::Uint8 => quote! { u8 },
        Builtin::Uint16 => quote! { u16 },
        Builtin::Uint32 => quote! { u32 },
        Builtin::Uint64 => quote! { u64 },
        Builtin::Uint => quote! { u64 },
        Builtin::Float32 => quote! { f32 },
        Builtin::Float64 => quote! { f64 },
        Builtin::String => quote! { String },
        Builtin::Bytes => quote! { Vec<u8> },
        Builtin::Time => quote! { girder_core::time::Timestamp },
        Builtin::Uuid => quote! { girder_core::uuid::Uuid },
        Builtin::Json => quote! { girder_core::json::RawJson },
        Builtin::UserId => quote! { girder_core::auth::Uid },
    }
}

fn builtin_display(b: Builtin) -> &'static str {
    match b {
        Builtin::Any => "Any",
        Builtin::Bool => "bool",
        Builtin::Int8 => "i8",
        Builtin::Int16 => "i16",
        Builtin::Int32 => "i32",
        Builtin::Int64 => "i64",
        Builtin::Int => "i64",
        Builtin::Uint8 => "u8",
        Builtin::Uint16 => "u16",
        Builtin::Uint32 => "u32",
        Builtin::Uint64 => "u64",
        Builtin::Uint => "u64",
        Builtin::Float32 => "f32",
        Builtin::Float64 => "f64",
        Builtin::String => "String",
        Builtin::Bytes => "Bytes",
        Builtin::Time => "Timestamp",
        Builtin::Uuid => "Uuid",
        Builtin::Json => "RawJson",
        Builtin::UserId => "Uid",
    }
}

/// Follow `Named` references to the underlying builtin kind, if the type is
/// (an alias of) a builtin.
pub fn resolve_builtin(app: &App, ty: &Type) -> Option<Builtin> {
    match ty {
        Type::Builtin(b) => Some(*b),
        Type::Named(named) => {
            let decl = app.decl(named.id)?;
            if decl.type_params.is_empty() {
                resolve_builtin(app, &decl.typ)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Follow `Named` and `Pointer` indirection to an underlying struct type.
/// Returns the struct together with the declaration it came from, when the
/// struct was reached through one.
pub fn resolve_struct<'a>(app: &'a App, ty: &'a Type) -> Option<(&'a StructType, Option<&'a Decl>)> {
    match ty {
        Type::Struct(st) => Some((st, None)),
        Type::Pointer(base) => resolve_struct(app, base),
        Type::Named(named) => {
            let decl = app.decl(named.id)?;
            match &decl.typ {
                Type::Struct(st) => Some((st, Some(decl))),
                other => resolve_struct(app, other),
            }
        }
        _ => None,
    }
}
