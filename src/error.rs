//! Crate-wide error type for the compilation pipeline.
//!
//! One enum covers every sub-component (§7 of the spec): the model layer,
//! the join graph, the design resolver, the filter compiler and the
//! generators all return `Result<_, CompileError>` and none of them recovers
//! internally — an error always surfaces verbatim to the caller, quoting the
//! offending identifier.

use thiserror::Error;

/// Errors raised while compiling a [`crate::request::Request`] against a
/// [`crate::model::Project`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Malformed request: unknown field, ambiguous field, incompatible
    /// metrics/dimensions, invalid model shape.
    #[error("query error: {0}")]
    Query(String),

    /// Malformed filter: missing `field`, unknown expression, bad logical
    /// operator.
    #[error("parse error: {0}")]
    Parse(String),

    /// Requested fields span non-joinable views with no merged-result path,
    /// or a merged join field is missing from a sub-bucket.
    #[error("join error: {0}")]
    Join(String),

    /// A referenced field/view is not in the project or not visible to the
    /// caller.
    #[error("access denied or does not exist: '{0}'")]
    AccessDenied(String),

    /// Dialect-unsupported construct, or a configuration not yet supported.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

pub type CompileResult<T> = Result<T, CompileError>;

impl From<Vec<crate::model::ModelError>> for CompileError {
    fn from(errors: Vec<crate::model::ModelError>) -> Self {
        let joined = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        CompileError::Query(joined)
    }
}
