//! Error types for the extension registry

use thiserror::Error;

use crate::descriptor::ExtensionId;
use crate::validator::ValidationIssue;

/// Result type for extension operations
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// Extension registry errors
///
/// Per-candidate decode failures and validation issues are returned as data
/// (see [`crate::parser::DecodeError`] and [`crate::validator::ValidationIssue`]),
/// not through this type.
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Malformed document at {line}:{column}: {reason}")]
    MalformedDocument {
        reason: String,
        line: u32,
        column: u32,
    },

    #[error("Extension already registered: {name} version {} for layer {layer}", .version.as_deref().unwrap_or("<none>"))]
    DuplicateExtension {
        name: String,
        version: Option<String>,
        layer: String,
    },

    #[error("Invalid extension descriptor {extension}: {}", join_issues(.issues))]
    InvalidDescriptor {
        extension: ExtensionId,
        issues: Vec<ValidationIssue>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtensionError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            reason: reason.into(),
            line: 0,
            column: 0,
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; ")
}

impl From<roxmltree::Error> for ExtensionError {
    fn from(e: roxmltree::Error) -> Self {
        let pos = e.pos();
        Self::MalformedDocument {
            reason: e.to_string(),
            line: pos.row,
            column: pos.col,
        }
    }
}
