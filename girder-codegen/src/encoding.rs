//! Request/response encoding descriptions.
//!
//! An encoding description partitions a payload struct's top-level fields
//! into header, query, and body parameter groups. Requests are described per
//! HTTP method (methods without request bodies default untagged fields to
//! the query string); responses have a single header/body split.

use girder_ir::{App, Builtin, Field, Type};

use crate::error::GenError;
use crate::names::{canonical_header_key, field_ident, snake};
use crate::typetrans::{resolve_builtin, resolve_struct};

/// How a header or query parameter is represented on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRepr {
    pub kind: Builtin,
    pub list: bool,
    /// The field is `Option`-wrapped in the generated struct.
    pub option: bool,
}

/// One payload field assigned to a parameter group.
#[derive(Debug, Clone)]
pub struct EncodedParam {
    /// IR field name.
    pub src_name: String,
    /// Generated struct field ident (string form).
    pub ident: String,
    /// Wire name: header name, query key, or JSON object key.
    pub wire_name: String,
    pub typ: Type,
    pub optional: bool,
    /// Scalar representation; present for header and query parameters.
    pub repr: Option<ParamRepr>,
}

/// The request encoding for one group of HTTP methods.
#[derive(Debug, Clone)]
pub struct ReqEncoding {
    pub methods: Vec<String>,
    pub header: Vec<EncodedParam>,
    pub query: Vec<EncodedParam>,
    pub body: Vec<EncodedParam>,
}

#[derive(Debug, Clone, Default)]
pub struct RespEncoding {
    pub header: Vec<EncodedParam>,
    pub body: Vec<EncodedParam>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Header,
    Query,
    Body,
}

/// Whether a method's untagged request fields default to the query string
/// instead of a JSON body.
fn query_default(method: &str) -> bool {
    matches!(method, "GET" | "HEAD" | "DELETE")
}

/// Compute the per-method-group request encodings for a payload type.
/// `methods` must already be wildcard-expanded.
pub fn describe_request(
    app: &App,
    payload: &Type,
    methods: &[String],
    ctx: &str,
) -> Result<Vec<ReqEncoding>, GenError> {
    if methods.is_empty() {
        return Err(GenError::encoding("endpoint declares no HTTP methods", ctx));
    }
    let (st, _) = resolve_struct(app, payload)
        .ok_or_else(|| GenError::ir_shape("request payload must be a struct", ctx))?;

    // Split methods into the two default-location classes, preserving order.
    let query_methods: Vec<String> = methods.iter().filter(|m| query_default(m)).cloned().collect();
    let body_methods: Vec<String> = methods.iter().filter(|m| !query_default(m)).cloned().collect();

    let mut out = Vec::new();
    for methods in [query_methods, body_methods] {
        if methods.is_empty() {
            continue;
        }
        let default_loc = if query_default(&methods[0]) {
            Location::Query
        } else {
            Location::Body
        };
        let mut enc = ReqEncoding {
            methods,
            header: Vec::new(),
            query: Vec::new(),
            body: Vec::new(),
        };
        for field in &st.fields {
            let Some((loc, param)) = describe_field(app, field, default_loc, true, ctx)? else {
                continue;
            };
            match loc {
                Location::Header => enc.header.push(param),
                Location::Query => enc.query.push(param),
                Location::Body => enc.body.push(param),
            }
        }
        out.push(enc);
    }

    // Identical splits collapse to a single group covering every method.
    if out.len() == 2 && same_split(&out[0], &out[1]) {
        let methods = methods.to_vec();
        let mut merged = out.swap_remove(0);
        merged.methods = methods;
        out.clear();
        out.push(merged);
    }

    Ok(out)
}

fn same_split(a: &ReqEncoding, b: &ReqEncoding) -> bool {
    let names = |params: &[EncodedParam]| -> Vec<String> {
        params.iter().map(|p| p.src_name.clone()).collect()
    };
    names(&a.header) == names(&b.header)
        && names(&a.query) == names(&b.query)
        && names(&a.body) == names(&b.body)
}

/// Compute the response encoding (header vs body) for a payload type.
pub fn describe_response(app: &App, payload: &Type, ctx: &str) -> Result<RespEncoding, GenError> {
    let (st, _) = resolve_struct(app, payload)
        .ok_or_else(|| GenError::ir_shape("response payload must be a struct", ctx))?;
    let mut enc = RespEncoding::default();
    for field in &st.fields {
        let Some((loc, param)) = describe_field(app, field, Location::Body, false, ctx)? else {
            continue;
        };
        match loc {
            Location::Header => enc.header.push(param),
            Location::Query => {
                return Err(GenError::encoding(
                    format!("field {}: query parameters are not supported in responses", field.name),
                    ctx,
                ));
            }
            Location::Body => enc.body.push(param),
        }
    }
    Ok(enc)
}

fn describe_field(
    app: &App,
    field: &Field,
    default_loc: Location,
    allow_query: bool,
    ctx: &str,
) -> Result<Option<(Location, EncodedParam)>, GenError> {
    if field.json_name.as_deref() == Some("-") {
        return Ok(None);
    }

    let header_tag = field.tag("header");
    let query_tag = field.tag("query").or_else(|| field.tag("qs"));
    if header_tag.is_some() && query_tag.is_some() {
        return Err(GenError::encoding(
            format!("field {} is tagged for both header and query", field.name),
            ctx,
        ));
    }

    let (loc, wire_name) = if let Some(tag) = header_tag {
        let name = if tag.name.is_empty() {
            field.name.clone()
        } else {
            tag.name.clone()
        };
        (Location::Header, canonical_header_key(&name))
    } else if let Some(tag) = query_tag {
        let name = if tag.name.is_empty() {
            snake(&field.name)
        } else {
            tag.name.clone()
        };
        (Location::Query, name)
    } else if let Some(qs) = &field.query_string_name {
        (Location::Query, qs.clone())
    } else {
        let wire = match default_loc {
            Location::Query if allow_query => snake(&field.name),
            _ => field.wire_name().to_owned(),
        };
        (default_loc, wire)
    };

    let repr = match loc {
        Location::Body => None,
        Location::Header | Location::Query => Some(param_repr(app, field, ctx)?),
    };

    Ok(Some((
        loc,
        EncodedParam {
            src_name: field.name.clone(),
            ident: field_ident(&field.name).to_string(),
            wire_name,
            typ: field.typ.clone(),
            optional: field.optional || matches!(field.typ, Type::Pointer(_)),
            repr,
        },
    )))
}

/// Resolve the scalar representation of a header/query parameter.
fn param_repr(app: &App, field: &Field, ctx: &str) -> Result<ParamRepr, GenError> {
    let (typ, option) = match &field.typ {
        Type::Pointer(base) => (base.as_ref(), true),
        other => (other, false),
    };
    if let Some(kind) = resolve_builtin(app, typ) {
        return Ok(ParamRepr {
            kind,
            list: false,
            option,
        });
    }
    if let Type::List(elem) = typ {
        if let Some(kind) = resolve_builtin(app, elem) {
            return Ok(ParamRepr {
                kind,
                list: true,
                option,
            });
        }
    }
    Err(GenError::encoding(
        format!(
            "field {} has a type unsupported for header/query parameters",
            field.name
        ),
        ctx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_ir::StructType;

    fn payload(fields: Vec<Field>) -> Type {
        Type::Struct(StructType { fields })
    }

    fn methods(ms: &[&str]) -> Vec<String> {
        ms.iter().map(|m| (*m).to_owned()).collect()
    }

    #[test]
    fn untagged_fields_default_by_method() {
        let app = App::new("myapp");
        let p = payload(vec![Field::new("Name", Type::builtin(Builtin::String))]);

        let encs = describe_request(&app, &p, &methods(&["GET"]), "t").unwrap();
        assert_eq!(encs.len(), 1);
        assert_eq!(encs[0].query.len(), 1);
        assert!(encs[0].body.is_empty());

        let encs = describe_request(&app, &p, &methods(&["POST"]), "t").unwrap();
        assert_eq!(encs[0].body.len(), 1);
        assert!(encs[0].query.is_empty());
    }

    #[test]
    fn mixed_methods_split_into_groups() {
        let app = App::new("myapp");
        let p = payload(vec![Field::new("Name", Type::builtin(Builtin::String))]);
        let encs = describe_request(&app, &p, &methods(&["GET", "POST"]), "t").unwrap();
        assert_eq!(encs.len(), 2);
        assert_eq!(encs[0].methods, ["GET"]);
        assert_eq!(encs[1].methods, ["POST"]);
        assert_eq!(encs[0].query.len(), 1);
        assert_eq!(encs[1].body.len(), 1);
    }

    #[test]
    fn header_tagged_fields_group_identically_across_methods() {
        let app = App::new("myapp");
        let p = payload(vec![
            Field::new("Auth", Type::builtin(Builtin::String)).with_tag("header", "Authorization")
        ]);
        let encs = describe_request(&app, &p, &methods(&["GET", "POST"]), "t").unwrap();
        // Same split in both classes collapses to one group.
        assert_eq!(encs.len(), 1);
        assert_eq!(encs[0].methods, ["GET", "POST"]);
        assert_eq!(encs[0].header.len(), 1);
        assert_eq!(encs[0].header[0].wire_name, "Authorization");
    }

    #[test]
    fn header_and_query_tags_conflict() {
        let app = App::new("myapp");
        let p = payload(vec![Field::new("X", Type::builtin(Builtin::String))
            .with_tag("header", "X-X")
            .with_tag("query", "x")]);
        let err = describe_request(&app, &p, &methods(&["POST"]), "t").unwrap_err();
        assert!(err.to_string().contains("both header and query"));
    }

    #[test]
    fn skipped_fields_are_dropped() {
        let app = App::new("myapp");
        let p = payload(vec![
            Field::new("Secret", Type::builtin(Builtin::String)).with_json_name("-"),
            Field::new("Name", Type::builtin(Builtin::String)),
        ]);
        let encs = describe_request(&app, &p, &methods(&["POST"]), "t").unwrap();
        assert_eq!(encs[0].body.len(), 1);
        assert_eq!(encs[0].body[0].src_name, "Name");
    }

    #[test]
    fn response_rejects_query_tags() {
        let app = App::new("myapp");
        let p = payload(vec![Field::new("X", Type::builtin(Builtin::String)).with_tag("query", "x")]);
        let err = describe_response(&app, &p, "t").unwrap_err();
        assert!(err.to_string().contains("not supported in responses"));
    }

    #[test]
    fn response_splits_header_and_body() {
        let app = App::new("myapp");
        let p = payload(vec![
            Field::new("XFoo", Type::builtin(Builtin::String)).with_tag("header", "x-foo"),
            Field::new("Name", Type::builtin(Builtin::String)),
        ]);
        let enc = describe_response(&app, &p, "t").unwrap();
        assert_eq!(enc.header.len(), 1);
        assert_eq!(enc.header[0].wire_name, "X-Foo");
        assert_eq!(enc.body.len(), 1);
    }

    #[test]
    fn optional_list_params_resolve_repr() {
        let app = App::new("myapp");
        let p = payload(vec![
            Field::new("Tags", Type::list(Type::builtin(Builtin::String))).with_tag("query", "tags"),
            Field::new("Limit", Type::pointer(Type::builtin(Builtin::Int32))).with_tag("query", "limit"),
        ]);
        let encs = describe_request(&app, &p, &methods(&["GET"]), "t").unwrap();
        let tags = &encs[0].query[0];
        assert_eq!(
            tags.repr,
            Some(ParamRepr {
                kind: Builtin::String,
                list: true,
                option: false
            })
        );
        let limit = &encs[0].query[1];
        assert_eq!(
            limit.repr,
            Some(ParamRepr {
                kind: Builtin::Int32,
                list: false,
                option: true
            })
        );
    }

    #[test]
    fn non_struct_payload_is_rejected() {
        let app = App::new("myapp");
        let err =
            describe_request(&app, &Type::builtin(Builtin::String), &methods(&["POST"]), "t")
                .unwrap_err();
        assert!(err.to_string().contains("must be a struct"));
    }
}
