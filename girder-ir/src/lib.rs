//! The typed, cross-referenced intermediate representation of a user
//! application, produced by the (external) parser and consumed read-only by
//! the code generator.
//!
//! All cross-references (declaration ids, type parameter indices,
//! subscription trace indices) are dense, stable, and resolvable within a
//! single [`App`].

pub mod app;
pub mod types;

pub use app::*;
pub use types::*;

pub use girder_paths::{Builtin, Path, PathType, Segment, SegmentKind};

/// The nine canonical HTTP methods, in the fixed order a solitary `"*"`
/// method list expands to.
pub const CANONICAL_METHODS: [&str; 9] = [
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

/// Expand an endpoint method list, replacing a solitary `"*"` with the nine
/// canonical methods.
pub fn expand_methods(methods: &[String]) -> Vec<String> {
    if methods.len() == 1 && methods[0] == "*" {
        CANONICAL_METHODS.iter().map(|m| (*m).to_owned()).collect()
    } else {
        methods.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_expands_to_nine_methods_in_order() {
        let methods = expand_methods(&["*".to_owned()]);
        assert_eq!(
            methods,
            ["GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH"]
        );
    }

    #[test]
    fn explicit_methods_pass_through() {
        let methods = expand_methods(&["GET".to_owned(), "POST".to_owned()]);
        assert_eq!(methods, ["GET", "POST"]);
    }
}
