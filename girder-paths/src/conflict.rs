//! Method-keyed conflict detection for registered paths.
//!
//! The router downstream of the generator keys its routing trie on the
//! canonicalized path shape, so two endpoints whose paths differ only in
//! parameter names collide. [`ConflictSet`] mirrors that trie at generation
//! time and reports the first incompatible pair with a readable reason.

use std::collections::BTreeMap;
use std::fmt;

use crate::{Path, SegmentKind};

/// A routing conflict between a path being registered and one already
/// present in the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// HTTP method bucket the conflict was found in (`*` for any-method).
    pub method: String,
    /// The path being registered.
    pub path: String,
    /// The previously registered path it collides with.
    pub other: String,
    pub reason: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "path {} conflicts with {} (method {}): {}",
            self.path, self.other, self.method, self.reason
        )
    }
}

impl std::error::Error for Conflict {}

#[derive(Default)]
struct Node {
    literals: BTreeMap<String, Node>,
    param: Option<Box<Node>>,
    wildcard: Option<Box<Node>>,
    /// Full path string of a route terminating at this node.
    terminal: Option<String>,
    /// First registered path that passed through this node, for reporting.
    sample: String,
}

/// A set of registered `(method, path)` pairs with trie-based conflict
/// detection. Method `"*"` denotes any-method routes and is checked pairwise
/// against every explicitly registered method.
#[derive(Default)]
pub struct ConflictSet {
    roots: BTreeMap<String, Node>,
}

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path under the given method, returning the first conflict
    /// found. The path is only inserted after every candidate method bucket
    /// passes, so a failed registration leaves the set unchanged.
    pub fn add(&mut self, method: &str, path: &Path) -> Result<(), Conflict> {
        let candidates: Vec<String> = if method == "*" {
            // Any-method routes collide with every registered method.
            let mut c: Vec<String> = self.roots.keys().cloned().collect();
            if !c.iter().any(|m| m == "*") {
                c.push("*".to_owned());
            }
            c
        } else {
            vec![method.to_owned(), "*".to_owned()]
        };

        let rendered = path.to_string();
        for m in &candidates {
            if let Some(root) = self.roots.get(m) {
                check(root, path, &rendered, m)?;
            }
        }

        insert(self.roots.entry(method.to_owned()).or_default(), path, &rendered);
        Ok(())
    }
}

fn conflict(method: &str, path: &str, other: &str, reason: impl Into<String>) -> Conflict {
    Conflict {
        method: method.to_owned(),
        path: path.to_owned(),
        other: other.to_owned(),
        reason: reason.into(),
    }
}

fn check(root: &Node, path: &Path, rendered: &str, method: &str) -> Result<(), Conflict> {
    let mut node = root;
    for seg in &path.segments {
        match seg.kind {
            SegmentKind::Literal => {
                if node.param.is_some() {
                    return Err(conflict(
                        method,
                        rendered,
                        &node.sample,
                        format!("literal segment {:?} overlaps a parameter segment", seg.value),
                    ));
                }
                if node.wildcard.is_some() {
                    return Err(conflict(
                        method,
                        rendered,
                        &node.sample,
                        format!("literal segment {:?} overlaps a wildcard segment", seg.value),
                    ));
                }
                match node.literals.get(&seg.value) {
                    Some(next) => node = next,
                    // Fresh subtree; nothing further can conflict.
                    None => return Ok(()),
                }
            }
            SegmentKind::Param => {
                if !node.literals.is_empty() {
                    return Err(conflict(
                        method,
                        rendered,
                        &node.sample,
                        format!("parameter segment :{} overlaps a literal segment", seg.value),
                    ));
                }
                if node.wildcard.is_some() {
                    return Err(conflict(
                        method,
                        rendered,
                        &node.sample,
                        format!("parameter segment :{} overlaps a wildcard segment", seg.value),
                    ));
                }
                match &node.param {
                    Some(next) => node = next,
                    None => return Ok(()),
                }
            }
            SegmentKind::Wildcard => {
                if !node.literals.is_empty() || node.param.is_some() {
                    return Err(conflict(
                        method,
                        rendered,
                        &node.sample,
                        format!("wildcard segment *{} overlaps existing segments", seg.value),
                    ));
                }
                match &node.wildcard {
                    Some(next) => node = next,
                    None => return Ok(()),
                }
            }
        }
    }
    if let Some(other) = &node.terminal {
        return Err(conflict(method, rendered, other, "duplicate path"));
    }
    Ok(())
}

fn insert(root: &mut Node, path: &Path, rendered: &str) {
    let mut node = root;
    if node.sample.is_empty() {
        node.sample = rendered.to_owned();
    }
    for seg in &path.segments {
        node = match seg.kind {
            SegmentKind::Literal => node.literals.entry(seg.value.clone()).or_default(),
            SegmentKind::Param => node.param.get_or_insert_with(Default::default),
            SegmentKind::Wildcard => node.wildcard.get_or_insert_with(Default::default),
        };
        if node.sample.is_empty() {
            node.sample = rendered.to_owned();
        }
    }
    node.terminal = Some(rendered.to_owned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PathType;

    fn url(s: &str) -> Path {
        Path::parse(PathType::Url, s).unwrap()
    }

    #[test]
    fn same_shape_is_duplicate() {
        let mut set = ConflictSet::new();
        set.add("GET", &url("/users/:id")).unwrap();
        let err = set.add("GET", &url("/users/:uid")).unwrap_err();
        assert_eq!(err.reason, "duplicate path");
        assert_eq!(err.other, "/users/:id");
    }

    #[test]
    fn literal_vs_param_conflicts() {
        let mut set = ConflictSet::new();
        set.add("GET", &url("/users/:id")).unwrap();
        let err = set.add("GET", &url("/users/admin")).unwrap_err();
        assert!(err.reason.contains("parameter"), "reason: {}", err.reason);
    }

    #[test]
    fn distinct_methods_do_not_conflict() {
        let mut set = ConflictSet::new();
        set.add("GET", &url("/users/:id")).unwrap();
        set.add("POST", &url("/users/:id")).unwrap();
    }

    #[test]
    fn any_method_conflicts_with_registered_method() {
        let mut set = ConflictSet::new();
        set.add("GET", &url("/users/:id")).unwrap();
        let err = set.add("*", &url("/users/:id")).unwrap_err();
        assert_eq!(err.reason, "duplicate path");
        assert_eq!(err.method, "GET");
    }

    #[test]
    fn registered_method_conflicts_with_any_method() {
        let mut set = ConflictSet::new();
        set.add("*", &url("/users/:id")).unwrap();
        let err = set.add("POST", &url("/users/:id")).unwrap_err();
        assert_eq!(err.method, "*");
    }

    #[test]
    fn wildcard_vs_param_conflicts() {
        let mut set = ConflictSet::new();
        set.add("GET", &url("/files/:name")).unwrap();
        let err = set.add("GET", &url("/files/*path")).unwrap_err();
        assert!(err.reason.contains("wildcard"), "reason: {}", err.reason);
    }

    #[test]
    fn failed_insert_leaves_set_unchanged() {
        let mut set = ConflictSet::new();
        set.add("GET", &url("/users/:id")).unwrap();
        set.add("GET", &url("/users/admin")).unwrap_err();
        // The rejected path must not have been half-inserted.
        set.add("POST", &url("/users/admin")).unwrap();
    }

    #[test]
    fn sibling_subtrees_do_not_conflict() {
        let mut set = ConflictSet::new();
        set.add("GET", &url("/users/:id/posts")).unwrap();
        set.add("GET", &url("/users/:id/comments")).unwrap();
        set.add("GET", &url("/teams/:id/posts")).unwrap();
    }
}
