//! Document ingestion
//!
//! Runs a capabilities document through the parser and validator and loads
//! the accepted records into a registry, replacing whatever the registry held
//! before.

use std::collections::HashMap;
use std::io::Read;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::checksum::Checksum;
use crate::config::{DuplicatePolicy, ExtensionsConfig};
use crate::descriptor::{ExtensionDescriptor, ExtensionId, QualifiedName};
use crate::error::{ExtensionError, Result};
use crate::parser::{CandidateError, DocumentParser};
use crate::registry::ExtensionRegistry;
use crate::schema::SchemaModel;
use crate::validator::{Rejection, Validator, Warning};

/// A record left out because its key was already taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Duplicate {
    pub extension: ExtensionId,
    pub layer: String,
}

/// Summary of one ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub checksum: Checksum,
    pub ingested_at: DateTime<Utc>,
    /// `SupportedExtension` elements found, decodable or not
    pub candidates: usize,
    /// Records now in the registry
    pub registered: usize,
    pub decode_errors: Vec<CandidateError>,
    pub rejected: Vec<Rejection>,
    pub warnings: Vec<Warning>,
    pub duplicates: Vec<Duplicate>,
    pub unknown_capabilities: Vec<QualifiedName>,
}

impl IngestReport {
    /// No record was dropped for any reason
    pub fn is_clean(&self) -> bool {
        self.decode_errors.is_empty() && self.rejected.is_empty() && self.duplicates.is_empty()
    }
}

/// Parse, validate and register in one step
#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    parser: DocumentParser,
    validator: Validator,
    on_duplicate: DuplicatePolicy,
}

impl Ingestor {
    pub fn new(config: &ExtensionsConfig) -> Self {
        let schema = SchemaModel::supported_extension();
        Self {
            parser: DocumentParser::new(schema.clone(), config.parser.clone()),
            validator: Validator::new(schema, &config.validation),
            on_duplicate: config.registry.on_duplicate,
        }
    }

    pub fn parser(&self) -> &DocumentParser {
        &self.parser
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn ingest_reader(
        &self,
        mut reader: impl Read,
        registry: &ExtensionRegistry,
    ) -> Result<IngestReport> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let document = std::str::from_utf8(&bytes)
            .map_err(|e| ExtensionError::malformed(format!("document is not UTF-8: {}", e)))?;
        self.ingest_str(document, registry)
    }

    /// Settle records that share a `(name, version, layer)` key with an
    /// earlier record of the same document
    ///
    /// The shared layers go to the earlier record; the later one keeps its
    /// other layers and is dropped only if none remain. A conflicting
    /// definition let through by [`ConflictPolicy::Warn`](crate::config::ConflictPolicy::Warn) is always settled
    /// this way. A repeat with identical properties fails the ingest under
    /// [`DuplicatePolicy::Reject`].
    fn resolve_collisions(
        &self,
        accepted: Vec<ExtensionDescriptor>,
    ) -> Result<(Vec<ExtensionDescriptor>, Vec<Duplicate>)> {
        let mut records: Vec<ExtensionDescriptor> = Vec::with_capacity(accepted.len());
        let mut owners: HashMap<(ExtensionId, String), usize> = HashMap::new();
        let mut duplicates = Vec::new();

        for mut descriptor in accepted {
            let id = descriptor.id();
            let (shared, free): (Vec<String>, Vec<String>) = descriptor
                .layers
                .drain(..)
                .partition(|layer| owners.contains_key(&(id.clone(), layer.clone())));

            for layer in shared {
                let owner = &records[owners[&(id.clone(), layer.clone())]];
                let repeat = owner.properties == descriptor.properties;
                if repeat && self.on_duplicate == DuplicatePolicy::Reject {
                    return Err(ExtensionError::DuplicateExtension {
                        name: id.name,
                        version: id.version,
                        layer,
                    });
                }
                duplicates.push(Duplicate {
                    extension: id.clone(),
                    layer,
                });
            }

            if free.is_empty() {
                continue;
            }
            for layer in &free {
                owners.insert((id.clone(), layer.clone()), records.len());
            }
            descriptor.layers = free;
            records.push(descriptor);
        }

        Ok((records, duplicates))
    }

    /// Replace the registry contents with the records of `document`
    ///
    /// A malformed document fails without touching the registry. With
    /// [`DuplicatePolicy::Reject`] a repeated declaration inside the document
    /// fails the same way; otherwise the first declaration of a layer wins
    /// and the rest are listed in [`IngestReport::duplicates`].
    pub fn ingest_str(&self, document: &str, registry: &ExtensionRegistry) -> Result<IngestReport> {
        let checksum = Checksum::of_document(document);
        let outcome = self.parser.parse_str(document)?;

        for e in &outcome.errors {
            warn!(index = e.index, line = e.line, error = %e.error, "dropping undecodable extension");
        }

        let batch = self.validator.validate_batch(&outcome.candidates);
        for rejection in &batch.rejected {
            for issue in &rejection.issues {
                warn!(extension = %rejection.extension, line = rejection.line, %issue, "rejected extension");
            }
        }
        for warning in &batch.warnings {
            warn!(extension = %warning.extension, issue = %warning.issue, "accepted conflicting extension");
        }

        let (records, mut duplicates) = self.resolve_collisions(batch.accepted)?;
        for e in registry.replace_all(records, Some(checksum.clone())) {
            match e {
                ExtensionError::DuplicateExtension { name, version, layer } => duplicates.push(Duplicate {
                    extension: ExtensionId { name, version },
                    layer,
                }),
                other => warn!(error = %other, "registry refused extension"),
            }
        }
        for duplicate in &duplicates {
            warn!(extension = %duplicate.extension, layer = %duplicate.layer, "skipping duplicate extension");
        }

        let report = IngestReport {
            checksum,
            ingested_at: Utc::now(),
            candidates: outcome.candidates.len() + outcome.errors.len(),
            registered: registry.len(),
            decode_errors: outcome.errors,
            rejected: batch.rejected,
            warnings: batch.warnings,
            duplicates,
            unknown_capabilities: outcome.unknown,
        };
        info!(
            checksum = %report.checksum,
            candidates = report.candidates,
            registered = report.registered,
            dropped = report.decode_errors.len() + report.rejected.len() + report.duplicates.len(),
            "ingested capabilities document"
        );

        Ok(report)
    }
}
