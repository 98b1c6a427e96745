//! The application model: services, endpoints, auth, middleware,
//! infrastructure declarations, and the [`App`] root tying them together.

use serde::{Deserialize, Serialize};

use girder_paths::Path;

use crate::types::{Decl, DeclId, DefLoc, PkgLoc, Type};

/// Endpoint access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    Public,
    RequiresAuth,
    Private,
}

/// A request or response payload descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDesc {
    pub typ: Type,
    /// Whether the handler takes/returns the payload behind the target
    /// language's nullable reference form.
    pub is_pointer: bool,
}

/// A single API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Exported endpoint name (e.g. `GetUser`). The user's handler function
    /// is its snake_case form.
    pub name: String,
    pub doc: String,
    /// HTTP verbs, or a solitary `"*"` meaning any method.
    pub methods: Vec<String>,
    pub path: Path,
    pub access: Access,
    /// Raw endpoints bypass marshalling and receive the raw request and
    /// response objects directly.
    pub raw: bool,
    pub request: Option<ParamDesc>,
    pub response: Option<ParamDesc>,
    /// Name of the service whose service struct hosts this endpoint's
    /// handler as a method, if any.
    pub service_struct: Option<String>,
    /// Pre-matched middleware chain: indices into [`App::middleware`], in
    /// application order.
    pub middleware: Vec<usize>,
    pub def_loc: DefLoc,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, methods: &[&str], path: Path) -> Endpoint {
        Endpoint {
            name: name.into(),
            doc: String::new(),
            methods: methods.iter().map(|m| (*m).to_owned()).collect(),
            path,
            access: Access::Public,
            raw: false,
            request: None,
            response: None,
            service_struct: None,
            middleware: Vec::new(),
            def_loc: 0,
        }
    }
}

/// The application's optional auth handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthHandler {
    /// Service hosting the handler.
    pub service: String,
    /// Exported handler name.
    pub name: String,
    /// Must be a struct type, or a single string for legacy token mode.
    pub params: Type,
    pub auth_data: Option<ParamDesc>,
    pub service_struct: Option<String>,
    pub def_loc: DefLoc,
}

/// A request middleware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Middleware {
    pub pkg: PkgLoc,
    /// Exported middleware name; the user function is its snake_case form.
    pub name: String,
    pub global: bool,
    pub service_struct: Option<String>,
    pub def_loc: DefLoc,
}

/// A per-service singleton struct with an at-most-once initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStruct {
    /// Exported struct name.
    pub name: String,
    /// User-provided initializer function ident, if any.
    pub init_func: Option<String>,
    pub def_loc: DefLoc,
    pub init_def_loc: Option<DefLoc>,
}

/// A typed cache partition whose keys format into a string path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKeyspace {
    /// The keyspace variable's exported name.
    pub name: String,
    /// A builtin scalar, or a struct of builtin scalars naming the path's
    /// segment variables.
    pub key_type: Type,
    /// A `CacheKey`-typed path.
    pub path: Path,
    pub def_loc: DefLoc,
}

/// A metric declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    /// A named struct of builtin fields. Metrics without labels get no
    /// generated mapper.
    pub labels: Option<Type>,
    pub def_loc: DefLoc,
}

/// A `config::load` call site within a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigLoad {
    /// Fully applied concrete config type.
    pub concrete: Type,
    pub is_pointer: bool,
    pub def_loc: DefLoc,
}

/// A pubsub subscription as seen by the entrypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubsubSubscription {
    pub name: String,
    pub service: String,
    pub trace_idx: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubsubTopic {
    pub name: String,
    pub subscriptions: Vec<PubsubSubscription>,
}

/// A service: one package of user code exposing endpoints and owning
/// infrastructure declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub pkg: PkgLoc,
    pub endpoints: Vec<Endpoint>,
    pub service_struct: Option<ServiceStruct>,
    pub keyspaces: Vec<CacheKeyspace>,
    pub config_loads: Vec<ConfigLoad>,
}

impl Service {
    pub fn new(name: impl Into<String>, pkg: PkgLoc) -> Service {
        Service {
            name: name.into(),
            pkg,
            endpoints: Vec::new(),
            service_struct: None,
            keyspaces: Vec::new(),
            config_loads: Vec::new(),
        }
    }
}

/// A non-service package that carries infrastructure declarations
/// (metric label mappers and similar).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub loc: PkgLoc,
    pub metrics: Vec<Metric>,
}

/// A test package that needs its own test entrypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPackage {
    pub loc: PkgLoc,
    /// The service the test package belongs to, when any.
    pub service: Option<String>,
}

/// The whole parsed application: the input to the code generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    /// The user crate's import name.
    pub module_path: String,
    /// VCS revision of the app build.
    pub revision: String,
    pub uncommitted_changes: bool,
    pub decls: Vec<Decl>,
    pub services: Vec<Service>,
    pub packages: Vec<Package>,
    pub middleware: Vec<Middleware>,
    pub auth_handler: Option<AuthHandler>,
    pub pubsub_topics: Vec<PubsubTopic>,
    pub test_packages: Vec<TestPackage>,
    /// Service names bundled into this binary.
    pub bundled_services: Vec<String>,
}

impl App {
    pub fn new(module_path: impl Into<String>) -> App {
        App {
            module_path: module_path.into(),
            revision: String::new(),
            uncommitted_changes: false,
            decls: Vec::new(),
            services: Vec::new(),
            packages: Vec::new(),
            middleware: Vec::new(),
            auth_handler: None,
            pubsub_topics: Vec::new(),
            test_packages: Vec::new(),
            bundled_services: Vec::new(),
        }
    }

    /// Resolve a declaration id. Ids are dense, so a miss means the IR is
    /// malformed.
    pub fn decl(&self, id: DeclId) -> Option<&Decl> {
        self.decls.iter().find(|d| d.id == id)
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_paths::{Builtin, PathType};

    #[test]
    fn decl_lookup_by_id() {
        let mut app = App::new("myapp");
        app.decls.push(Decl::new(
            0,
            "User",
            Type::builtin(Builtin::String),
            PkgLoc::new("users", "users"),
        ));
        assert_eq!(app.decl(0).unwrap().name, "User");
        assert!(app.decl(7).is_none());
    }

    #[test]
    fn endpoint_builder_defaults() {
        let ep = Endpoint::new("Ping", &["GET"], Path::parse(PathType::Url, "/ping").unwrap());
        assert_eq!(ep.access, Access::Public);
        assert!(!ep.raw);
        assert!(ep.request.is_none());
    }
}
