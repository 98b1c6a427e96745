//! Generation errors.
//!
//! Every fatal condition bubbles through [`GenError`] with `?` to the top of
//! [`crate::generate`]; no output files are produced on failure.

use std::fmt;

use girder_ir::DefLoc;
use girder_paths::Conflict;

/// A fatal code generation error, carrying the IR location it was detected
/// at whenever one is known.
#[derive(Debug, Clone, PartialEq)]
pub enum GenError {
    /// The IR violated a shape invariant (dangling decl id, unsupported
    /// type in a position that requires a builtin, and similar).
    IrShape {
        msg: String,
        context: String,
        def_loc: Option<DefLoc>,
    },
    /// Two registered endpoint paths collide in the routing trie.
    PathConflict { conflict: Conflict, context: String },
    /// The request/response encoding description could not be computed.
    Encoding {
        msg: String,
        context: String,
        def_loc: Option<DefLoc>,
    },
    /// An assembled token stream did not parse as a source file. This is a
    /// generator bug surfaced instead of writing partial output.
    Render { file: String, msg: String },
}

impl GenError {
    pub fn ir_shape(msg: impl Into<String>, context: impl Into<String>) -> GenError {
        GenError::IrShape {
            msg: msg.into(),
            context: context.into(),
            def_loc: None,
        }
    }

    pub fn encoding(msg: impl Into<String>, context: impl Into<String>) -> GenError {
        GenError::Encoding {
            msg: msg.into(),
            context: context.into(),
            def_loc: None,
        }
    }

    /// Attach the defining source location, if the error site knows one.
    pub fn at(mut self, loc: DefLoc) -> GenError {
        match &mut self {
            GenError::IrShape { def_loc, .. } | GenError::Encoding { def_loc, .. } => {
                *def_loc = Some(loc);
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenError::IrShape {
                msg,
                context,
                def_loc,
            } => {
                write!(f, "{context}: {msg}")?;
                if let Some(loc) = def_loc {
                    write!(f, " (def loc {loc})")?;
                }
                Ok(())
            }
            GenError::PathConflict { conflict, context } => {
                write!(f, "{context}: {conflict}")
            }
            GenError::Encoding {
                msg,
                context,
                def_loc,
            } => {
                write!(f, "{context}: {msg}")?;
                if let Some(loc) = def_loc {
                    write!(f, " (def loc {loc})")?;
                }
                Ok(())
            }
            GenError::Render { file, msg } => {
                write!(f, "generated file {file} failed to render: {msg}")
            }
        }
    }
}

impl std::error::Error for GenError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_and_loc() {
        let err = GenError::ir_shape("dangling decl id 12", "service users").at(4);
        assert_eq!(err.to_string(), "service users: dangling decl id 12 (def loc 4)");
    }
}
