//! WMS Extension Registry
//!
//! Decodes the `SupportedExtension` declarations a WMS 1.3.0 capabilities
//! document advertises through its `_ExtendedCapabilities` extension point,
//! validates them and indexes the accepted records for runtime lookup.
//!
//! ## Pipeline
//!
//! ```text
//! capabilities XML
//!   └─ DocumentParser   → CandidateExtension*  (+ per-candidate DecodeError)
//!       └─ Validator    → ExtensionDescriptor* (+ ValidationIssue)
//!           └─ ExtensionRegistry  by_layer / by_extension / all
//! ```
//!
//! [`Ingestor`] runs the three stages in one call.
//!
//! ## Element layout
//!
//! ```xml
//! <ext:SupportedExtension xmlns:ext="http://dea.ga.gov.au/namespaces/wms_extensions">
//!   <ext:Extension version="1.0">user_band_math</ext:Extension>
//!   <wms:OnlineResource xlink:type="simple" xlink:href="https://..."/>
//!   <ext:Layer>ndvi</ext:Layer>
//!   <ext:ExtensionProperty version="1">float</ext:ExtensionProperty>
//! </ext:SupportedExtension>
//! ```

pub mod checksum;
pub mod config;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod ingest;
pub mod parser;
pub mod registry;
pub mod schema;
pub mod service;
pub mod validator;

pub use checksum::Checksum;
pub use config::{ConflictPolicy, DuplicatePolicy, ExtensionsConfig, OutputFormat, ParserConfig};
pub use descriptor::{
    CandidateExtension, ExtendedCapability, ExtensionDescriptor, ExtensionId, ExtensionProperty,
    QualifiedName,
};
pub use encode::{encode_document, encode_element};
pub use error::{ExtensionError, Result};
pub use ingest::{IngestReport, Ingestor};
pub use parser::{CandidateError, DecodeError, DocumentParser, ParseOutcome};
pub use registry::{DescriptorId, ExtensionRegistry, RegistrySnapshot};
pub use schema::{Cardinality, Field, FieldSpec, SchemaModel};
pub use service::{documentation_base, service_base_url};
pub use validator::{ValidationIssue, Validator, Verdict};
