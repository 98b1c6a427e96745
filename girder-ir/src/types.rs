//! Type descriptors and the declarations table.

use serde::{Deserialize, Serialize};

use girder_paths::Builtin;

/// Index into [`crate::App::decls`].
pub type DeclId = u32;

/// A stable identifier for a source location, emitted verbatim into
/// descriptors so the runtime can attribute behavior to a source position.
pub type DefLoc = u32;

/// Package location of a declaration or definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgLoc {
    /// Module path relative to the crate root, `/`-separated
    /// (e.g. `"users"` or `"infra/metrics"`). Empty for the crate root.
    pub rel_path: String,
    /// The package's local name (last path component, or the app name for
    /// the crate root).
    pub pkg_name: String,
}

impl PkgLoc {
    pub fn new(rel_path: impl Into<String>, pkg_name: impl Into<String>) -> Self {
        PkgLoc {
            rel_path: rel_path.into(),
            pkg_name: pkg_name.into(),
        }
    }
}

/// A type descriptor: the closed sum over every type shape the IR can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Builtin(Builtin),
    Named(Named),
    Struct(StructType),
    Map(Box<Type>, Box<Type>),
    List(Box<Type>),
    Pointer(Box<Type>),
    /// Reference to a type parameter of the enclosing declaration.
    TypeParam { decl: DeclId, index: usize },
    /// Framework marker wrapping a type with reconfigurable semantics.
    Config { elem: Box<Type>, values_list: bool },
}

impl Type {
    pub fn builtin(b: Builtin) -> Type {
        Type::Builtin(b)
    }

    pub fn named(id: DeclId) -> Type {
        Type::Named(Named {
            id,
            type_args: Vec::new(),
        })
    }

    pub fn named_with(id: DeclId, type_args: Vec<Type>) -> Type {
        Type::Named(Named { id, type_args })
    }

    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn pointer(base: Type) -> Type {
        Type::Pointer(Box::new(base))
    }

    pub fn config(elem: Type, values_list: bool) -> Type {
        Type::Config {
            elem: Box::new(elem),
            values_list,
        }
    }
}

/// A use of a named declaration, optionally applied to type arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Named {
    pub id: DeclId,
    pub type_args: Vec<Type>,
}

/// A structural type: ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    pub fields: Vec<Field>,
}

/// A single struct field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Source-level field name; a valid identifier in every target.
    pub name: String,
    pub typ: Type,
    pub doc: String,
    /// JSON wire name override. `"-"` means "do not serialize".
    pub json_name: Option<String>,
    /// Query-string name override.
    pub query_string_name: Option<String>,
    /// Optional implies JSON omit-on-empty.
    pub optional: bool,
    pub tags: Vec<Tag>,
}

impl Field {
    pub fn new(name: impl Into<String>, typ: Type) -> Field {
        Field {
            name: name.into(),
            typ,
            doc: String::new(),
            json_name: None,
            query_string_name: None,
            optional: false,
            tags: Vec::new(),
        }
    }

    pub fn with_json_name(mut self, name: impl Into<String>) -> Field {
        self.json_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, name: impl Into<String>) -> Field {
        self.tags.push(Tag {
            key: key.into(),
            name: name.into(),
            options: Vec::new(),
        });
        self
    }

    pub fn optional(mut self) -> Field {
        self.optional = true;
        self
    }

    /// The field's JSON wire name (explicit override or the source name).
    pub fn wire_name(&self) -> &str {
        self.json_name.as_deref().unwrap_or(&self.name)
    }

    /// Look up a tag by key.
    pub fn tag(&self, key: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.key == key)
    }
}

/// A raw field tag: `key:"name,opt1,opt2"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub name: String,
    pub options: Vec<String>,
}

/// A type parameter of a parametric declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
}

/// An entry in the declarations table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decl {
    pub id: DeclId,
    pub name: String,
    pub typ: Type,
    /// Non-empty for parametric declarations.
    pub type_params: Vec<TypeParam>,
    pub loc: PkgLoc,
}

impl Decl {
    pub fn new(id: DeclId, name: impl Into<String>, typ: Type, loc: PkgLoc) -> Decl {
        Decl {
            id,
            name: name.into(),
            typ,
            type_params: Vec::new(),
            loc,
        }
    }
}
