//! Capabilities document decoding
//!
//! Locates the extended-capabilities extension points of a WMS capabilities
//! document and decodes every `SupportedExtension` found there into a
//! [`CandidateExtension`]. Candidates with broken structure are reported
//! individually and never abort the rest of the document.

use std::io::Read;

use roxmltree::{Document, Node, ParsingOptions};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::ParserConfig;
use crate::descriptor::{
    CandidateExtension, CapabilityKind, ExtendedCapability, ExtensionProperty, QualifiedName,
};
use crate::error::{ExtensionError, Result};
use crate::schema::{AttributeUse, Field, FieldSpec, SchemaModel, WMS_NS, XLINK_NS};

/// Standard children of `wms:Capability`; everything else is an extended capability
const STANDARD_CAPABILITY_CHILDREN: &[&str] = &["Request", "Exception", "Layer"];

/// Structural problem with a single `SupportedExtension` element
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeError {
    #[error("missing required element {element}")]
    MissingElement { element: Field },

    #[error("element {element} is missing attribute {attribute}")]
    MissingAttribute {
        element: Field,
        attribute: &'static str,
    },

    #[error("element {element} occurs {count} times")]
    TooManyOccurrences { element: Field, count: usize },

    #[error("element {element} appears after {after}")]
    OutOfOrder { element: Field, after: Field },
}

/// A dropped candidate and where it was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateError {
    /// Zero-based index among the `SupportedExtension` elements of the document
    pub index: usize,
    /// 1-based source line of the element
    pub line: u32,
    pub error: DecodeError,
}

/// Everything decoded from one document
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Successfully decoded candidates in document order
    pub candidates: Vec<CandidateExtension>,
    pub errors: Vec<CandidateError>,
    /// Extended capabilities that are not `SupportedExtension`
    pub unknown: Vec<QualifiedName>,
}

impl ParseOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Decoder for WMS capabilities documents
#[derive(Debug, Clone, Default)]
pub struct DocumentParser {
    schema: SchemaModel,
    config: ParserConfig,
}

impl DocumentParser {
    pub fn new(schema: SchemaModel, config: ParserConfig) -> Self {
        Self { schema, config }
    }

    pub fn schema(&self) -> &SchemaModel {
        &self.schema
    }

    /// Decode a document read from `reader`
    pub fn parse_reader(&self, mut reader: impl Read) -> Result<ParseOutcome> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.parse_bytes(&bytes)
    }

    /// Decode a UTF-8 encoded document
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<ParseOutcome> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtensionError::malformed(format!("document is not UTF-8: {}", e)))?;
        self.parse_str(text)
    }

    /// Decode a document held in memory
    ///
    /// Fails with [`ExtensionError::MalformedDocument`] when the input is not
    /// well-formed XML; no partial outcome is returned in that case.
    pub fn parse_str(&self, text: &str) -> Result<ParseOutcome> {
        let text = text.trim_start_matches('\u{feff}');
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(text, options)?;

        let mut outcome = ParseOutcome::default();
        let mut index = 0;
        for node in self.extension_points(&doc) {
            let line = line_of(&doc, node);
            match self.decode_capability(node) {
                Ok(ExtendedCapability::SupportedExtension(mut candidate)) => {
                    candidate.line = line;
                    outcome.candidates.push(candidate);
                    index += 1;
                }
                Ok(ExtendedCapability::Unknown(name)) => {
                    debug!(element = %name, line, "skipping unknown extended capability");
                    outcome.unknown.push(name);
                }
                Err(error) => {
                    outcome.errors.push(CandidateError { index, line, error });
                    index += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Elements standing in for `_ExtendedCapabilities`, in document order
    fn extension_points<'a, 'input>(&self, doc: &'a Document<'input>) -> Vec<Node<'a, 'input>> {
        let root = doc.root_element();
        let tag = root.tag_name();
        if self.config.accept_standalone && self.schema.is_root(tag.namespace(), tag.name()) {
            return vec![root];
        }

        root.descendants()
            .filter(|n| {
                n.is_element()
                    && n.tag_name().namespace() == Some(WMS_NS)
                    && n.tag_name().name() == "Capability"
            })
            .flat_map(|capability| {
                capability
                    .children()
                    .filter(|c| c.is_element() && !is_standard_capability_child(c))
            })
            .collect()
    }

    /// Classify one extension point and decode it when the kind is known
    pub(crate) fn decode_capability(
        &self,
        node: Node<'_, '_>,
    ) -> std::result::Result<ExtendedCapability, DecodeError> {
        let tag = node.tag_name();
        match CapabilityKind::classify(tag.namespace(), tag.name()) {
            CapabilityKind::SupportedExtension => self
                .decode_extension(node)
                .map(ExtendedCapability::SupportedExtension),
            CapabilityKind::Unknown => Ok(ExtendedCapability::Unknown(QualifiedName::new(
                tag.namespace(),
                tag.name(),
            ))),
        }
    }

    fn decode_extension(
        &self,
        node: Node<'_, '_>,
    ) -> std::result::Result<CandidateExtension, DecodeError> {
        let fields = self.schema.fields();
        let mut counts = vec![0usize; fields.len()];
        let mut furthest: Option<usize> = None;

        let mut name = None;
        let mut version = None;
        let mut documentation_uri = None;
        let mut layers = Vec::new();
        let mut properties = Vec::new();

        for child in node.children().filter(|n| n.is_element()) {
            let tag = child.tag_name();
            let Some(pos) = self.schema.position_of(tag.namespace(), tag.name()) else {
                trace!(element = tag.name(), "ignoring unknown child element");
                continue;
            };
            let spec = &fields[pos];

            if let Some(last) = furthest {
                if pos < last {
                    return Err(DecodeError::OutOfOrder {
                        element: spec.field,
                        after: fields[last].field,
                    });
                }
            }
            furthest = Some(pos);

            counts[pos] += 1;
            if !spec.cardinality.max().map_or(true, |max| counts[pos] <= max) {
                return Err(DecodeError::TooManyOccurrences {
                    element: spec.field,
                    count: counts[pos],
                });
            }

            match spec.field {
                Field::Extension => {
                    name = Some(text_of(child));
                    version = self.version_attribute(child, spec)?;
                }
                Field::OnlineResource => {
                    let href = child.attribute((XLINK_NS, "href")).ok_or(
                        DecodeError::MissingAttribute {
                            element: spec.field,
                            attribute: "xlink:href",
                        },
                    )?;
                    documentation_uri = Some(href.trim().to_string());
                }
                Field::Layer => layers.push(text_of(child)),
                Field::ExtensionProperty => properties.push(ExtensionProperty {
                    value: text_of(child),
                    version: self.version_attribute(child, spec)?,
                }),
            }
        }

        // Layer and ExtensionProperty minimums are the validator's concern
        for (spec, count) in fields.iter().zip(&counts) {
            if spec.cardinality.max() == Some(1) && !spec.cardinality.allows(*count) {
                return Err(DecodeError::MissingElement {
                    element: spec.field,
                });
            }
        }

        match (name, documentation_uri) {
            (Some(name), Some(documentation_uri)) => Ok(CandidateExtension {
                name,
                version,
                documentation_uri,
                layers,
                properties,
                line: 0,
            }),
            (None, _) => Err(DecodeError::MissingElement {
                element: Field::Extension,
            }),
            (_, None) => Err(DecodeError::MissingElement {
                element: Field::OnlineResource,
            }),
        }
    }

    fn version_attribute(
        &self,
        node: Node<'_, '_>,
        spec: &FieldSpec,
    ) -> std::result::Result<Option<String>, DecodeError> {
        let value = node.attribute("version").map(|v| v.trim().to_string());
        if value.is_none()
            && spec.version_attribute == Some(AttributeUse::Required)
            && self.config.require_extension_version
        {
            return Err(DecodeError::MissingAttribute {
                element: spec.field,
                attribute: "version",
            });
        }
        Ok(value)
    }
}

fn is_standard_capability_child(node: &Node<'_, '_>) -> bool {
    node.tag_name().namespace() == Some(WMS_NS)
        && STANDARD_CAPABILITY_CHILDREN.contains(&node.tag_name().name())
}

/// Concatenated, trimmed text content of an element
fn text_of(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn line_of(doc: &Document<'_>, node: Node<'_, '_>) -> u32 {
    doc.text_pos_at(node.range().start).row
}
