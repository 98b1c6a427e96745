//! The generated marshaller library.
//!
//! Endpoint and auth decoding pull per-scalar conversion helpers from a
//! [`MarshallerBuilder`]; the builder records which `(kind, list, direction)`
//! triples were demanded and emits exactly one method per triple into the
//! shared `girder_gen_etype.rs` file at the end of the run.
//!
//! Decode methods live on a `Marshaller` instance that captures only the
//! first error; encode methods are pure associated functions.

use std::collections::BTreeSet;

use proc_macro2::TokenStream;
use quote::quote;

use girder_ir::Builtin;

use crate::names::ident;
use crate::runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dir {
    Decode,
    Encode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MethodKey {
    kind: Builtin,
    list: bool,
    dir: Dir,
}

/// Tracks whether a generation block used any decode conversion, deciding
/// whether [`wrap_decode`] needs to materialize a marshaller instance.
#[derive(Debug, Default)]
pub struct Usage {
    used: bool,
}

impl Usage {
    pub fn new() -> Usage {
        Usage::default()
    }

    pub fn used(&self) -> bool {
        self.used
    }
}

/// Records demanded conversions and emits the shared library file body.
#[derive(Default)]
pub struct MarshallerBuilder {
    seen: BTreeSet<MethodKey>,
    json_decode: bool,
}

impl MarshallerBuilder {
    pub fn new() -> MarshallerBuilder {
        MarshallerBuilder::default()
    }

    /// Call expression decoding a single scalar from a `&str` source.
    pub fn decode(
        &mut self,
        usage: &mut Usage,
        kind: Builtin,
        field: &str,
        src: TokenStream,
        required: bool,
    ) -> TokenStream {
        usage.used = true;
        self.seen.insert(MethodKey {
            kind,
            list: false,
            dir: Dir::Decode,
        });
        let method = ident(&format!("parse_{}", kind_suffix(kind)));
        quote! { __de.#method(#field, #src, #required) }
    }

    /// Call expression decoding a list of scalars from a `&[String]` source.
    pub fn decode_list(
        &mut self,
        usage: &mut Usage,
        kind: Builtin,
        field: &str,
        src: TokenStream,
        required: bool,
    ) -> TokenStream {
        usage.used = true;
        // The list variant delegates to the scalar variant, so demand both.
        self.seen.insert(MethodKey {
            kind,
            list: false,
            dir: Dir::Decode,
        });
        self.seen.insert(MethodKey {
            kind,
            list: true,
            dir: Dir::Decode,
        });
        let method = ident(&format!("parse_{}_list", kind_suffix(kind)));
        quote! { __de.#method(#field, #src, #required) }
    }

    /// Call expression decoding a body field from raw JSON into its target
    /// type (inferred from the assignment site).
    pub fn decode_json_field(&mut self, usage: &mut Usage, field: &str, raw: TokenStream) -> TokenStream {
        usage.used = true;
        self.json_decode = true;
        quote! { __de.from_json(__json, #field, #raw) }
    }

    /// Call expression formatting a single scalar to a `String`. `val` must
    /// be a reference expression.
    pub fn encode(&mut self, kind: Builtin, val: TokenStream) -> TokenStream {
        self.seen.insert(MethodKey {
            kind,
            list: false,
            dir: Dir::Encode,
        });
        let etype = runtime::etype();
        let method = ident(&format!("format_{}", kind_suffix(kind)));
        quote! { #etype::Marshaller::#method(#val) }
    }

    /// Call expression formatting a list of scalars to a `Vec<String>`.
    pub fn encode_list(&mut self, kind: Builtin, val: TokenStream) -> TokenStream {
        self.seen.insert(MethodKey {
            kind,
            list: false,
            dir: Dir::Encode,
        });
        self.seen.insert(MethodKey {
            kind,
            list: true,
            dir: Dir::Encode,
        });
        let etype = runtime::etype();
        let method = ident(&format!("format_{}_list", kind_suffix(kind)));
        quote! { #etype::Marshaller::#method(#val) }
    }

    /// Emit the library file body: the `Marshaller` struct and one method
    /// per demanded triple, in deterministic order.
    pub fn emit_module(&self) -> TokenStream {
        let methods: Vec<TokenStream> = self.seen.iter().map(|key| method_tokens(*key)).collect();
        let from_json = if self.json_decode {
            from_json_tokens()
        } else {
            quote! {}
        };
        quote! {
            //! Per-scalar value marshalling with first-error capture.

            /// Converts scalar values to and from their string form,
            /// recording only the first conversion error.
            #[derive(Default)]
            pub struct Marshaller {
                last_error: Option<String>,
            }

            impl Marshaller {
                pub fn new() -> Self {
                    Self::default()
                }

                /// Record a conversion error. Only the first error is kept.
                fn set_err(&mut self, field: &'static str, msg: &str, err: impl std::fmt::Display) {
                    if self.last_error.is_none() {
                        self.last_error = Some(format!("{field}: {msg}: {err}"));
                    }
                }

                /// Take the first recorded error, if any.
                pub fn take_err(&mut self) -> Option<String> {
                    self.last_error.take()
                }

                #from_json

                #(#methods)*
            }
        }
    }
}

/// Wrap a decode block: if no conversion was used the statements pass
/// through unchanged, otherwise the block gains marshaller construction and
/// a first-error check.
pub fn wrap_decode(usage: Usage, stmts: TokenStream, on_err: TokenStream) -> TokenStream {
    if !usage.used {
        return stmts;
    }
    let etype = runtime::etype();
    quote! {
        let mut __de = #etype::Marshaller::new();
        #stmts
        if let Some(__err) = __de.take_err() {
            #on_err
        }
    }
}

pub(crate) fn kind_suffix(kind: Builtin) -> &'static str {
    match kind {
        Builtin::Any => "any",
        Builtin::Bool => "bool",
        Builtin::Int8 => "i8",
        Builtin::Int16 => "i16",
        Builtin::Int32 => "i32",
        Builtin::Int64 => "i64",
        Builtin::Int => "int",
        Builtin::Uint8 => "u8",
        Builtin::Uint16 => "u16",
        Builtin::Uint32 => "u32",
        Builtin::Uint64 => "u64",
        Builtin::Uint => "uint",
        Builtin::Float32 => "f32",
        Builtin::Float64 => "f64",
        Builtin::String => "string",
        Builtin::Bytes => "bytes",
        Builtin::Time => "time",
        Builtin::Uuid => "uuid",
        Builtin::Json => "json",
        Builtin::UserId => "user_id",
    }
}

fn from_json_tokens() -> TokenStream {
    quote! {
        /// Decode a JSON body field into its target type, recording a
        /// conversion failure against the field name.
        pub fn from_json<T>(
            &mut self,
            json: &girder_core::api::JsonCodec,
            field: &'static str,
            raw: &girder_core::json::RawJson,
        ) -> T
        where
            T: Default + serde::de::DeserializeOwned,
        {
            match json.decode(raw) {
                Ok(v) => v,
                Err(err) => {
                    self.set_err(field, "invalid json parameter", err);
                    T::default()
                }
            }
        }
    }
}

fn method_tokens(key: MethodKey) -> TokenStream {
    if key.list {
        return list_method_tokens(key);
    }
    match key.dir {
        Dir::Decode => decode_method_tokens(key.kind),
        Dir::Encode => encode_method_tokens(key.kind),
    }
}

fn list_method_tokens(key: MethodKey) -> TokenStream {
    let suffix = kind_suffix(key.kind);
    let scalar_ty = scalar_rust_type(key.kind);
    match key.dir {
        Dir::Decode => {
            let method = ident(&format!("parse_{suffix}_list"));
            let scalar = ident(&format!("parse_{suffix}"));
            quote! {
                pub fn #method(&mut self, field: &'static str, values: &[String], required: bool) -> Vec<#scalar_ty> {
                    if !required && values.is_empty() {
                        return Vec::new();
                    }
                    values.iter().map(|v| self.#scalar(field, v, required)).collect()
                }
            }
        }
        Dir::Encode => {
            let method = ident(&format!("format_{suffix}_list"));
            let scalar = ident(&format!("format_{suffix}"));
            quote! {
                pub fn #method(values: &[#scalar_ty]) -> Vec<String> {
                    values.iter().map(|v| Self::#scalar(v)).collect()
                }
            }
        }
    }
}

/// The owned Rust type a scalar kind parses to.
fn scalar_rust_type(kind: Builtin) -> TokenStream {
    crate::typetrans::builtin_type(kind)
}

fn decode_method_tokens(kind: Builtin) -> TokenStream {
    let method = ident(&format!("parse_{}", kind_suffix(kind)));
    let ty = scalar_rust_type(kind);

    // String-shaped kinds never fail to parse.
    match kind {
        Builtin::String => {
            return quote! {
                pub fn #method(&mut self, _field: &'static str, s: &str, _required: bool) -> String {
                    s.to_owned()
                }
            };
        }
        Builtin::UserId => {
            return quote! {
                pub fn #method(&mut self, _field: &'static str, s: &str, _required: bool) -> girder_core::auth::Uid {
                    girder_core::auth::Uid::from(s.to_owned())
                }
            };
        }
        Builtin::Json => {
            return quote! {
                pub fn #method(&mut self, _field: &'static str, s: &str, _required: bool) -> girder_core::json::RawJson {
                    girder_core::json::RawJson::from(s.to_owned())
                }
            };
        }
        _ => {}
    }

    let (parse_expr, err_msg, zero) = match kind {
        Builtin::Bool => (
            quote! { s.parse::<bool>() },
            "invalid bool parameter",
            quote! { Default::default() },
        ),
        Builtin::Bytes => (
            quote! { girder_core::api::decode_base64url(s) },
            "invalid base64 parameter",
            quote! { Default::default() },
        ),
        Builtin::Uuid => (
            quote! { s.parse::<girder_core::uuid::Uuid>() },
            "invalid uuid parameter",
            quote! { Default::default() },
        ),
        Builtin::Time => (
            quote! { girder_core::time::parse_rfc3339(s) },
            "invalid timestamp parameter",
            quote! { Default::default() },
        ),
        Builtin::Any => (
            quote! { serde_json::from_str::<serde_json::Value>(s) },
            "invalid json parameter",
            quote! { serde_json::Value::Null },
        ),
        _ => {
            // Numeric kinds parse at their exact bit width.
            (
                quote! { s.parse::<#ty>() },
                "invalid numeric parameter",
                quote! { Default::default() },
            )
        }
    };

    quote! {
        pub fn #method(&mut self, field: &'static str, s: &str, required: bool) -> #ty {
            if !required && s.is_empty() {
                return #zero;
            }
            match #parse_expr {
                Ok(v) => v,
                Err(err) => {
                    self.set_err(field, #err_msg, err);
                    #zero
                }
            }
        }
    }
}

fn encode_method_tokens(kind: Builtin) -> TokenStream {
    let method = ident(&format!("format_{}", kind_suffix(kind)));
    match kind {
        Builtin::String => quote! {
            pub fn #method(v: &str) -> String {
                v.to_owned()
            }
        },
        Builtin::Bytes => quote! {
            pub fn #method(v: &[u8]) -> String {
                girder_core::api::encode_base64url(v)
            }
        },
        Builtin::Time => quote! {
            pub fn #method(v: &girder_core::time::Timestamp) -> String {
                girder_core::time::format_rfc3339(v)
            }
        },
        Builtin::Json => quote! {
            pub fn #method(v: &girder_core::json::RawJson) -> String {
                v.to_string()
            }
        },
        Builtin::Any => quote! {
            pub fn #method(v: &serde_json::Value) -> String {
                v.to_string()
            }
        },
        _ => {
            let ty = scalar_rust_type(kind);
            quote! {
                pub fn #method(v: &#ty) -> String {
                    v.to_string()
                }
            }
        }
    }
}
