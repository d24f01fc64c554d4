//! Structural model of the `SupportedExtension` element
//!
//! The parser and validator both read cardinality and ordering from here, so
//! the element layout lives in exactly one place.

use serde::Serialize;
use std::fmt;

/// Target namespace of the extension schema
pub const EXTENSIONS_NS: &str = "http://dea.ga.gov.au/namespaces/wms_extensions";

/// WMS 1.3.0 namespace
pub const WMS_NS: &str = "http://www.opengis.net/wms";

/// XLink namespace, carries `xlink:href` on `OnlineResource`
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Version attribute value declared on the extension schema
pub const SCHEMA_VERSION: &str = "1.3.0.0";

/// Local name of the substitution group member this crate understands
pub const SUPPORTED_EXTENSION: &str = "SupportedExtension";

/// Occurrence constraint of a child element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// minOccurs=1 maxOccurs=1
    ExactlyOne,
    /// minOccurs=0 maxOccurs=1
    ZeroOrOne,
    /// minOccurs=1 maxOccurs=unbounded
    OneOrMore,
    /// minOccurs=0 maxOccurs=unbounded
    ZeroOrMore,
}

impl Cardinality {
    pub fn min(&self) -> usize {
        match self {
            Cardinality::ExactlyOne | Cardinality::OneOrMore => 1,
            Cardinality::ZeroOrOne | Cardinality::ZeroOrMore => 0,
        }
    }

    /// Upper bound, `None` when unbounded
    pub fn max(&self) -> Option<usize> {
        match self {
            Cardinality::ExactlyOne | Cardinality::ZeroOrOne => Some(1),
            Cardinality::OneOrMore | Cardinality::ZeroOrMore => None,
        }
    }

    /// Whether `count` occurrences satisfy this constraint
    pub fn allows(&self, count: usize) -> bool {
        count >= self.min() && self.max().map_or(true, |max| count <= max)
    }
}

/// Use of a `version` attribute on a child element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeUse {
    Required,
    Optional,
}

/// Child fields of `SupportedExtension`, in schema order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Field {
    Extension,
    OnlineResource,
    Layer,
    ExtensionProperty,
}

impl Field {
    /// Element local name
    pub fn element_name(&self) -> &'static str {
        match self {
            Field::Extension => "Extension",
            Field::OnlineResource => "OnlineResource",
            Field::Layer => "Layer",
            Field::ExtensionProperty => "ExtensionProperty",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Specification of one child element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub field: Field,
    /// Namespace the element is qualified with
    pub namespace: &'static str,
    pub cardinality: Cardinality,
    /// `None` when the element carries no `version` attribute
    pub version_attribute: Option<AttributeUse>,
}

impl FieldSpec {
    pub fn name(&self) -> &'static str {
        self.field.element_name()
    }

    pub fn matches(&self, namespace: Option<&str>, local_name: &str) -> bool {
        namespace == Some(self.namespace) && local_name == self.name()
    }
}

/// Read-only description of the `SupportedExtension` content model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaModel {
    element: &'static str,
    namespace: &'static str,
    fields: Vec<FieldSpec>,
}

impl Default for SchemaModel {
    fn default() -> Self {
        Self::supported_extension()
    }
}

impl SchemaModel {
    /// Content model of `SupportedExtension` as declared by the schema
    pub fn supported_extension() -> Self {
        Self {
            element: SUPPORTED_EXTENSION,
            namespace: EXTENSIONS_NS,
            fields: vec![
                FieldSpec {
                    field: Field::Extension,
                    namespace: EXTENSIONS_NS,
                    cardinality: Cardinality::ExactlyOne,
                    version_attribute: Some(AttributeUse::Required),
                },
                FieldSpec {
                    field: Field::OnlineResource,
                    namespace: WMS_NS,
                    cardinality: Cardinality::ExactlyOne,
                    version_attribute: None,
                },
                FieldSpec {
                    field: Field::Layer,
                    namespace: EXTENSIONS_NS,
                    cardinality: Cardinality::OneOrMore,
                    version_attribute: None,
                },
                FieldSpec {
                    field: Field::ExtensionProperty,
                    namespace: EXTENSIONS_NS,
                    cardinality: Cardinality::ZeroOrMore,
                    version_attribute: Some(AttributeUse::Optional),
                },
            ],
        }
    }

    /// Local name of the modelled element
    pub fn element(&self) -> &'static str {
        self.element
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Child field specs in the order the schema fixes
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Spec of one child field
    pub fn field(&self, field: Field) -> &FieldSpec {
        // `fields` holds one spec per `Field`, in declaration order.
        &self.fields[field as usize]
    }

    /// Schema position of a child element, `None` for unknown elements
    pub fn position_of(&self, namespace: Option<&str>, local_name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|spec| spec.matches(namespace, local_name))
    }

    /// Whether the given element is this model's root element
    pub fn is_root(&self, namespace: Option<&str>, local_name: &str) -> bool {
        namespace == Some(self.namespace) && local_name == self.element
    }
}
