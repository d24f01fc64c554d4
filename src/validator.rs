//! Candidate validation
//!
//! Rules run in a fixed order and the first failing rule ends the checks for
//! that record:
//! 1. the extension name is not empty
//! 2. the documentation link is a non-empty, syntactically valid URI reference
//! 3. at least one layer, no empty or repeated layer names
//! 4. no earlier accepted record with the same name and version shares a
//!    layer while declaring different properties

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::{ConflictPolicy, ValidationConfig};
use crate::descriptor::{CandidateExtension, ExtensionDescriptor, ExtensionId};
use crate::schema::{Field, SchemaModel};

/// RFC 3986 URI-reference characters, with well-formed percent escapes
const URI_REFERENCE_PATTERN: &str =
    r"^(?:[A-Za-z0-9\-._~:/?#\[\]@!$&'()*+,;=]|%[0-9A-Fa-f]{2})+$";

/// Base used only to syntax-check relative references
const RELATIVE_CHECK_BASE: &str = "http://localhost/";

/// A reason a record was rejected (or, for soft conflicts, warned about)
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("{field} must not be empty")]
    EmptyField { field: Field },

    #[error("invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("extension declares no layers")]
    EmptyLayerSet,

    #[error("layer '{layer}' is listed more than once")]
    DuplicateLayer { layer: String },

    #[error("{extension} already declared for layer '{layer}' with different properties")]
    ConflictingExtensionDefinition { extension: ExtensionId, layer: String },
}

/// Outcome of validating one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted {
        descriptor: ExtensionDescriptor,
        /// Conflicts downgraded by [`ConflictPolicy::Warn`]
        warnings: Vec<ValidationIssue>,
    },
    Rejected(Vec<ValidationIssue>),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Verdict::Accepted { warnings, .. } => warnings,
            Verdict::Rejected(issues) => issues,
        }
    }
}

/// A rejected candidate with its reasons
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub extension: ExtensionId,
    pub line: u32,
    pub issues: Vec<ValidationIssue>,
}

/// An issue on an accepted record
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub extension: ExtensionId,
    pub issue: ValidationIssue,
}

/// Result of validating a batch of candidates against each other
#[derive(Debug, Clone, Default)]
pub struct BatchValidation {
    pub accepted: Vec<ExtensionDescriptor>,
    pub rejected: Vec<Rejection>,
    pub warnings: Vec<Warning>,
}

/// Applies the record rules to decoded candidates
#[derive(Debug, Clone)]
pub struct Validator {
    schema: SchemaModel,
    conflict_policy: ConflictPolicy,
    uri_reference: Regex,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(SchemaModel::default(), &ValidationConfig::default())
    }
}

impl Validator {
    pub fn new(schema: SchemaModel, config: &ValidationConfig) -> Self {
        Self {
            schema,
            conflict_policy: config.conflict_policy,
            uri_reference: Regex::new(URI_REFERENCE_PATTERN).expect("URI reference pattern compiles"),
        }
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    /// Validate one candidate against the records accepted so far
    pub fn validate<'a>(
        &self,
        candidate: &CandidateExtension,
        accepted: impl IntoIterator<Item = &'a ExtensionDescriptor>,
    ) -> Verdict {
        let issues = self.check_record(&candidate.name, &candidate.documentation_uri, &candidate.layers);
        if !issues.is_empty() {
            return Verdict::Rejected(issues);
        }

        let conflicts = check_conflicts(candidate, accepted);
        match (self.conflict_policy, conflicts.is_empty()) {
            (ConflictPolicy::Reject, false) => Verdict::Rejected(conflicts),
            _ => Verdict::Accepted {
                descriptor: ExtensionDescriptor::from(candidate.clone()),
                warnings: conflicts,
            },
        }
    }

    /// Per-record rules on an already built descriptor
    ///
    /// Empty when the descriptor could have come out of [`Validator::validate`].
    pub fn check_descriptor(&self, descriptor: &ExtensionDescriptor) -> Vec<ValidationIssue> {
        self.check_record(&descriptor.name, &descriptor.documentation_uri, &descriptor.layers)
    }

    /// Name, then URI, then layers; stops at the first rule that fails
    fn check_record(&self, name: &str, uri: &str, layers: &[String]) -> Vec<ValidationIssue> {
        if let Some(issue) = self.check_name(name) {
            return vec![issue];
        }
        if let Some(issue) = self.check_uri(uri) {
            return vec![issue];
        }
        self.check_layers(layers)
    }

    /// Validate candidates in order, each against the ones accepted before it
    pub fn validate_batch(&self, candidates: &[CandidateExtension]) -> BatchValidation {
        let mut batch = BatchValidation::default();
        for candidate in candidates {
            match self.validate(candidate, &batch.accepted) {
                Verdict::Accepted {
                    descriptor,
                    warnings,
                } => {
                    let id = descriptor.id();
                    batch.warnings.extend(warnings.into_iter().map(|issue| Warning {
                        extension: id.clone(),
                        issue,
                    }));
                    batch.accepted.push(descriptor);
                }
                Verdict::Rejected(issues) => batch.rejected.push(Rejection {
                    extension: candidate.id(),
                    line: candidate.line,
                    issues,
                }),
            }
        }
        batch
    }

    fn check_name(&self, name: &str) -> Option<ValidationIssue> {
        name.trim().is_empty().then(|| ValidationIssue::EmptyField {
            field: Field::Extension,
        })
    }

    fn check_uri(&self, uri: &str) -> Option<ValidationIssue> {
        if uri.is_empty() {
            return Some(ValidationIssue::EmptyField {
                field: Field::OnlineResource,
            });
        }
        if !self.uri_reference.is_match(uri) {
            return Some(ValidationIssue::InvalidUri {
                uri: uri.to_string(),
                reason: "contains characters not allowed in a URI reference".to_string(),
            });
        }

        let parsed = if has_scheme(uri) {
            Url::parse(uri)
        } else {
            Url::parse(RELATIVE_CHECK_BASE).and_then(|base| base.join(uri))
        };
        parsed.err().map(|e| ValidationIssue::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })
    }

    fn check_layers(&self, layers: &[String]) -> Vec<ValidationIssue> {
        let min = self.schema.field(Field::Layer).cardinality.min();
        if layers.len() < min {
            return vec![ValidationIssue::EmptyLayerSet];
        }

        let mut issues = Vec::new();
        if layers.iter().any(|l| l.is_empty()) {
            issues.push(ValidationIssue::EmptyField {
                field: Field::Layer,
            });
        }
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for layer in layers.iter().filter(|l| !l.is_empty()) {
            if !seen.insert(layer) && reported.insert(layer) {
                issues.push(ValidationIssue::DuplicateLayer {
                    layer: layer.clone(),
                });
            }
        }
        issues
    }
}

/// One issue per shared layer whose earlier definition declares other properties
fn check_conflicts<'a>(
    candidate: &CandidateExtension,
    accepted: impl IntoIterator<Item = &'a ExtensionDescriptor>,
) -> Vec<ValidationIssue> {
    let id = candidate.id();
    let mut conflicting_layers: Vec<&str> = Vec::new();

    for existing in accepted {
        if existing.name != candidate.name || existing.version != candidate.version {
            continue;
        }
        if existing.properties == candidate.properties {
            continue;
        }
        for layer in &candidate.layers {
            if existing.applies_to(layer) && !conflicting_layers.contains(&layer.as_str()) {
                conflicting_layers.push(layer);
            }
        }
    }

    conflicting_layers
        .into_iter()
        .map(|layer| ValidationIssue::ConflictingExtensionDefinition {
            extension: id.clone(),
            layer: layer.to_string(),
        })
        .collect()
}

/// Whether the reference starts with `scheme:` (RFC 3986 section 3.1)
fn has_scheme(uri: &str) -> bool {
    match uri.find(':') {
        Some(colon) if colon > 0 => {
            let scheme = &uri[..colon];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ExtensionProperty;

    const NO_PRIOR: [&ExtensionDescriptor; 0] = [];

    fn candidate(layers: &[&str]) -> CandidateExtension {
        CandidateExtension {
            name: "user_band_math".to_string(),
            version: Some("1.0".to_string()),
            documentation_uri: "https://docs.example.org/band_math".to_string(),
            layers: layers.iter().map(|l| l.to_string()).collect(),
            properties: vec![ExtensionProperty::new("float")],
            line: 3,
        }
    }

    fn rejected(verdict: Verdict) -> Vec<ValidationIssue> {
        match verdict {
            Verdict::Rejected(issues) => issues,
            other => panic!("Expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_accepts_valid_candidate() {
        let verdict = Validator::default().validate(&candidate(&["ndvi"]), NO_PRIOR);
        match verdict {
            Verdict::Accepted {
                descriptor,
                warnings,
            } => {
                assert_eq!(descriptor.layers, vec!["ndvi"]);
                assert!(warnings.is_empty());
            }
            other => panic!("Expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_name() {
        let mut c = candidate(&["ndvi"]);
        c.name = "  ".to_string();
        c.documentation_uri = String::new();
        // name rule runs first and short-circuits the URI rule
        assert_eq!(
            rejected(Validator::default().validate(&c, NO_PRIOR)),
            vec![ValidationIssue::EmptyField {
                field: Field::Extension
            }]
        );
    }

    #[test]
    fn test_empty_uri() {
        let mut c = candidate(&["ndvi"]);
        c.documentation_uri = String::new();
        assert_eq!(
            rejected(Validator::default().validate(&c, NO_PRIOR)),
            vec![ValidationIssue::EmptyField {
                field: Field::OnlineResource
            }]
        );
    }

    #[test]
    fn test_invalid_uris() {
        let validator = Validator::default();
        for uri in ["has space", "http://", "bad%zzescape", "http://[::1"] {
            let mut c = candidate(&["ndvi"]);
            c.documentation_uri = uri.to_string();
            let issues = rejected(validator.validate(&c, NO_PRIOR));
            assert!(
                matches!(issues[0], ValidationIssue::InvalidUri { .. }),
                "{} should be invalid",
                uri
            );
        }
    }

    #[test]
    fn test_relative_uri_accepted() {
        let mut c = candidate(&["ndvi"]);
        c.documentation_uri = "../docs/band_math.html#usage".to_string();
        assert!(Validator::default().validate(&c, NO_PRIOR).is_accepted());
    }

    #[test]
    fn test_empty_layer_set() {
        assert_eq!(
            rejected(Validator::default().validate(&candidate(&[]), NO_PRIOR)),
            vec![ValidationIssue::EmptyLayerSet]
        );
    }

    #[test]
    fn test_duplicate_layer_reported_once() {
        let issues = rejected(
            Validator::default().validate(&candidate(&["ndvi", "ndwi", "ndvi", "ndvi"]), NO_PRIOR),
        );
        assert_eq!(
            issues,
            vec![ValidationIssue::DuplicateLayer {
                layer: "ndvi".to_string()
            }]
        );
    }

    #[test]
    fn test_conflicting_definition() {
        let validator = Validator::default();
        let existing = ExtensionDescriptor::new(
            "user_band_math",
            Some("1.0"),
            "https://docs.example.org/band_math",
            ["ndvi", "other"],
        )
        .with_property(ExtensionProperty::new("int"));

        let issues = rejected(validator.validate(&candidate(&["ndvi"]), [&existing]));
        assert_eq!(
            issues,
            vec![ValidationIssue::ConflictingExtensionDefinition {
                extension: ExtensionId::new("user_band_math", Some("1.0")),
                layer: "ndvi".to_string()
            }]
        );
    }

    #[test]
    fn test_identical_properties_do_not_conflict() {
        let validator = Validator::default();
        let existing = ExtensionDescriptor::from(candidate(&["ndvi"]));
        assert!(validator
            .validate(&candidate(&["ndvi"]), [&existing])
            .is_accepted());
    }

    #[test]
    fn test_other_version_does_not_conflict() {
        let validator = Validator::default();
        let mut other = ExtensionDescriptor::from(candidate(&["ndvi"]));
        other.version = Some("2.0".to_string());
        other.properties.clear();
        assert!(validator
            .validate(&candidate(&["ndvi"]), [&other])
            .is_accepted());
    }

    #[test]
    fn test_warn_policy_accepts_conflicts() {
        let validator = Validator::new(
            SchemaModel::default(),
            &ValidationConfig {
                conflict_policy: ConflictPolicy::Warn,
            },
        );
        let mut existing = ExtensionDescriptor::from(candidate(&["ndvi"]));
        existing.properties.clear();

        let verdict = validator.validate(&candidate(&["ndvi"]), [&existing]);
        assert!(verdict.is_accepted());
        assert_eq!(verdict.issues().len(), 1);
    }

    #[test]
    fn test_batch_checks_against_earlier_records() {
        let mut second = candidate(&["ndvi", "ndwi"]);
        second.properties = vec![ExtensionProperty::new("rgb")];
        let third = candidate(&["ndwi"]);

        let batch = Validator::default().validate_batch(&[candidate(&["ndvi"]), second, third]);
        assert_eq!(batch.accepted.len(), 2);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].line, 3);
    }
}
