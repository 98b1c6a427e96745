//! Path spec parsing and canonicalization for the Girder code generator.
//!
//! A [`Path`] is an ordered sequence of segments parsed from a declaration
//! string such as `/users/:id` (URL paths) or `user/:id` (cache keyspace
//! paths). Parsing validates the declaration eagerly so every downstream
//! consumer can assume a well-formed path.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod conflict;

pub use conflict::{Conflict, ConflictSet};

/// Scalar kinds shared between path parameters, the marshaller library, and
/// the IR type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Builtin {
    Any,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint,
    Float32,
    Float64,
    String,
    Bytes,
    Time,
    Uuid,
    Json,
    UserId,
}

impl Builtin {
    /// Whether the kind is one of the integer builtins (signed or unsigned).
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Builtin::Int8
                | Builtin::Int16
                | Builtin::Int32
                | Builtin::Int64
                | Builtin::Int
                | Builtin::Uint8
                | Builtin::Uint16
                | Builtin::Uint32
                | Builtin::Uint64
                | Builtin::Uint
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Builtin::Float32 | Builtin::Float64)
    }
}

/// Whether a path declares a URL route or a cache keyspace key.
///
/// URL paths start with a leading slash and may end in a wildcard segment;
/// cache key paths have neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathType {
    Url,
    CacheKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Literal,
    Param,
    Wildcard,
}

/// A single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Literal text, or the parameter name for `Param`/`Wildcard` segments.
    pub value: String,
    /// Scalar kind a non-literal segment decodes to. Defaults to `String`.
    pub value_type: Builtin,
}

impl Segment {
    pub fn literal(value: impl Into<String>) -> Self {
        Segment {
            kind: SegmentKind::Literal,
            value: value.into(),
            value_type: Builtin::String,
        }
    }

    pub fn param(name: impl Into<String>, value_type: Builtin) -> Self {
        Segment {
            kind: SegmentKind::Param,
            value: name.into(),
            value_type,
        }
    }

    pub fn wildcard(name: impl Into<String>, value_type: Builtin) -> Self {
        Segment {
            kind: SegmentKind::Wildcard,
            value: name.into(),
            value_type,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.kind == SegmentKind::Literal
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SegmentKind::Literal => write!(f, "{}", self.value),
            SegmentKind::Param => write!(f, ":{}", self.value),
            SegmentKind::Wildcard => write!(f, "*{}", self.value),
        }
    }
}

/// A parsed, validated path spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub typ: PathType,
    pub segments: Vec<Segment>,
}

/// Error produced while parsing a path declaration string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub path: String,
    pub msg: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid path {:?}: {}", self.path, self.msg)
    }
}

impl std::error::Error for ParseError {}

impl Path {
    /// Parse a path declaration string.
    ///
    /// URL paths must begin with `/` and may use `:name` parameter and
    /// `*name` trailing wildcard segments. Cache key paths must not begin
    /// with `/` and allow parameters only.
    pub fn parse(typ: PathType, path: &str) -> Result<Path, ParseError> {
        let err = |msg: &str| {
            Err(ParseError {
                path: path.to_owned(),
                msg: msg.to_owned(),
            })
        };

        if path.is_empty() {
            return err("path must not be empty");
        }
        match typ {
            PathType::Url => {
                if !path.starts_with('/') {
                    return err("path must begin with '/'");
                }
                if path.contains('?') {
                    return err("path must not contain '?'");
                }
            }
            PathType::CacheKey => {
                if path.starts_with('/') {
                    return err("path must not begin with '/'");
                }
            }
        }

        // The root URL path has no segments at all.
        if typ == PathType::Url && path == "/" {
            return Ok(Path {
                typ,
                segments: Vec::new(),
            });
        }

        let rest = match typ {
            PathType::Url => &path[1..],
            PathType::CacheKey => path,
        };
        if rest.ends_with('/') {
            return err("path must not end with a trailing '/'");
        }

        let raw_segments: Vec<&str> = rest.split('/').collect();
        let mut segments = Vec::with_capacity(raw_segments.len());
        for (idx, raw) in raw_segments.iter().enumerate() {
            if raw.is_empty() {
                return err("path must not contain a double slash");
            }
            let seg = if let Some(name) = raw.strip_prefix(':') {
                if !is_identifier(name) {
                    return err("path parameter name must be a valid identifier");
                }
                Segment::param(name, Builtin::String)
            } else if let Some(name) = raw.strip_prefix('*') {
                if typ != PathType::Url {
                    return err("wildcard segments are only allowed in URL paths");
                }
                if !is_identifier(name) {
                    return err("wildcard parameter name must be a valid identifier");
                }
                if idx != raw_segments.len() - 1 {
                    return err("wildcard must be the last path segment");
                }
                Segment::wildcard(name, Builtin::String)
            } else {
                Segment::literal(*raw)
            };
            segments.push(seg);
        }

        Ok(Path { typ, segments })
    }

    /// Number of non-literal (parameter and wildcard) segments.
    pub fn num_params(&self) -> usize {
        self.segments.iter().filter(|s| !s.is_literal()).count()
    }

    /// Iterator over the non-literal segments, in declaration order.
    pub fn params(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| !s.is_literal())
    }

    /// The router-canonical form of the path: parameters are renumbered
    /// positionally (`:0`, `:1`, …, wildcards as `*N`) so two paths with the
    /// same shape but different parameter names compare equal.
    pub fn raw_path(&self) -> String {
        let mut out = String::new();
        let mut next_param = 0usize;
        for (i, seg) in self.segments.iter().enumerate() {
            // Cache key paths have no leading slash.
            if self.typ == PathType::Url || i > 0 {
                out.push('/');
            }
            match seg.kind {
                SegmentKind::Literal => out.push_str(&seg.value),
                SegmentKind::Param => {
                    out.push(':');
                    out.push_str(&next_param.to_string());
                    next_param += 1;
                }
                SegmentKind::Wildcard => {
                    out.push('*');
                    out.push_str(&next_param.to_string());
                    next_param += 1;
                }
            }
        }
        if self.typ == PathType::Url && self.segments.is_empty() {
            out.push('/');
        }
        out
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.typ == PathType::Url && self.segments.is_empty() {
            return write!(f, "/");
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if self.typ == PathType::Url || i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

/// Valid identifier: leading alpha or underscore, then alphanumerics or
/// underscores.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
