//! Extension records and the extended-capability variants they come from

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{ExtensionError, Result};
use crate::schema::{EXTENSIONS_NS, SUPPORTED_EXTENSION};

/// One `ExtensionProperty` entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtensionProperty {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ExtensionProperty {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            version: None,
        }
    }

    pub fn versioned(value: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            version: Some(version.into()),
        }
    }
}

/// Extension identifier: name plus optional version tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ExtensionId {
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(String::from),
        }
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

/// A decoded `SupportedExtension` element that has not been validated yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateExtension {
    pub name: String,
    pub version: Option<String>,
    pub documentation_uri: String,
    pub layers: Vec<String>,
    pub properties: Vec<ExtensionProperty>,
    /// 1-based source line of the `SupportedExtension` element, 0 if unknown
    #[serde(default)]
    pub line: u32,
}

impl CandidateExtension {
    pub fn id(&self) -> ExtensionId {
        ExtensionId::new(&self.name, self.version.as_deref())
    }
}

/// A validated `SupportedExtension` record
///
/// Descriptors are immutable once accepted; the registry hands them out
/// behind `Arc` and offers no update in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    /// Extension identifier, e.g. `user_band_math`
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Documentation link taken from `OnlineResource/@xlink:href`
    pub documentation_uri: String,
    /// Layer names in document order
    pub layers: Vec<String>,
    #[serde(default)]
    pub properties: Vec<ExtensionProperty>,
}

impl ExtensionDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: Option<&str>,
        documentation_uri: impl Into<String>,
        layers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.map(String::from),
            documentation_uri: documentation_uri.into(),
            layers: layers.into_iter().map(Into::into).collect(),
            properties: Vec::new(),
        }
    }

    /// Builder-style property append
    pub fn with_property(mut self, property: ExtensionProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn id(&self) -> ExtensionId {
        ExtensionId::new(&self.name, self.version.as_deref())
    }

    pub fn applies_to(&self, layer: &str) -> bool {
        self.layers.iter().any(|l| l == layer)
    }

    /// Resolve the documentation URI, joining relative references onto `base`
    pub fn resolve_documentation(&self, base: Option<&Url>) -> Result<Url> {
        match Url::parse(&self.documentation_uri) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = base.ok_or_else(|| {
                    ExtensionError::NotFound(format!(
                        "base URL for relative documentation link '{}'",
                        self.documentation_uri
                    ))
                })?;
                base.join(&self.documentation_uri)
                    .map_err(|e| ExtensionError::InvalidUri {
                        uri: self.documentation_uri.clone(),
                        reason: format!("cannot resolve against {}: {}", base, e),
                    })
            }
            Err(e) => Err(ExtensionError::InvalidUri {
                uri: self.documentation_uri.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl From<CandidateExtension> for ExtensionDescriptor {
    fn from(candidate: CandidateExtension) -> Self {
        Self {
            name: candidate.name,
            version: candidate.version,
            documentation_uri: candidate.documentation_uri,
            layers: candidate.layers,
            properties: candidate.properties,
        }
    }
}

/// Namespace-qualified element name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub local_name: String,
}

impl QualifiedName {
    pub fn new(namespace: Option<&str>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(String::from),
            local_name: local_name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

/// Known members of the `_ExtendedCapabilities` substitution group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    SupportedExtension,
    Unknown,
}

impl CapabilityKind {
    pub fn classify(namespace: Option<&str>, local_name: &str) -> Self {
        match (namespace, local_name) {
            (Some(EXTENSIONS_NS), SUPPORTED_EXTENSION) => CapabilityKind::SupportedExtension,
            _ => CapabilityKind::Unknown,
        }
    }
}

/// One element found at an extended-capabilities extension point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedCapability {
    SupportedExtension(CandidateExtension),
    /// Substitution group member this crate does not decode
    Unknown(QualifiedName),
}
