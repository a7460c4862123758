//! Error taxonomy for script resolution.
//!
//! Only [`DataLinkError`] is *soft*: the portal loop absorbs it, empties the
//! offending span, and reports the whole collection at the end of the pass
//! as an [`AggregateError`]. Every other variant of [`ResolveError`] is hard
//! and unwinds the call immediately.

use serde::Serialize;
use std::fmt;

/// Why a link, or a template reference, could not produce text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkFailure {
    #[error("resolved value is empty")]
    Empty,
    #[error("conduit '{alias}' is not mounted")]
    UnknownConduit { alias: String },
    #[error("{target} is out of range ({available} {author} turn(s) available)")]
    OutOfRange {
        target: String,
        author: String,
        available: usize,
    },
    #[error("prompt template '{id}' not found")]
    MissingTemplate { id: String },
}

/// Soft failure: a link or template reference that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("unresolved {token}: {reason}")]
pub struct DataLinkError {
    /// The literal token as written in the script (e.g. `@AI-1:thoughts`).
    pub token: String,
    pub reason: LinkFailure,
}

impl DataLinkError {
    pub fn new(token: impl Into<String>, reason: LinkFailure) -> Self {
        Self {
            token: token.into(),
            reason,
        }
    }
}

/// Malformed portal, link, or parameter syntax.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} in `{fragment}`")]
pub struct SyntaxError {
    pub message: String,
    /// The source fragment being parsed when the error occurred.
    pub fragment: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fragment: fragment.into(),
        }
    }
}

/// Failure of an action portal. Never collected: side effects may already
/// have happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("action '{action}' on {target} failed: {reason}")]
pub struct ActionError {
    pub target: String,
    pub action: String,
    pub reason: String,
}

/// Every link that failed during a primary pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateError {
    pub errors: Vec<DataLinkError>,
}

impl AggregateError {
    /// Offending tokens in the order they were encountered.
    pub fn tokens(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.token.as_str()).collect()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unresolved link(s)", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Top-level error returned by the [`Resolver`](crate::resolver::Resolver).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// Soft failure escaping a helper called outside the portal loop.
    #[error(transparent)]
    DataLink(#[from] DataLinkError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl ResolveError {
    /// Whether the portal loop may absorb this error and continue.
    pub fn is_soft(&self) -> bool {
        matches!(self, ResolveError::DataLink(_))
    }
}
