//! Document fingerprints
//!
//! The registry remembers the SHA-256 of the capabilities document its
//! records were loaded from, so hosts can tell whether a re-fetched document
//! actually changed before re-ingesting it.

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 checksum of a source document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum of a document held as text
    pub fn of_document(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `content` hashes to this checksum
    pub fn matches(&self, content: &str) -> bool {
        *self == Self::of_document(content)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let doc = r#"<WMS_Capabilities version="1.3.0"/>"#;
        assert_eq!(Checksum::of_document(doc), Checksum::of_document(doc));
        assert_eq!(Checksum::of_document(doc).as_str().len(), 64);
    }

    #[test]
    fn test_checksum_matches() {
        let doc = r#"<WMS_Capabilities version="1.3.0"/>"#;
        let checksum = Checksum::of_document(doc);
        assert!(checksum.matches(doc));
        assert!(!checksum.matches(r#"<WMS_Capabilities version="1.1.1"/>"#));
    }
}
