//! XML re-encoding of descriptors
//!
//! Output decodes back to the same descriptors through [`crate::parser`].

use std::fmt::Display;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::descriptor::ExtensionDescriptor;
use crate::error::{ExtensionError, Result};
use crate::schema::{EXTENSIONS_NS, WMS_NS, XLINK_NS};

const WMS_VERSION: &str = "1.3.0";

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Result<Self> {
        let mut out = Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        };
        out.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(out)
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(encode_error)
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        self.write(Event::Start(start))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.start(name, attributes)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn extension(&mut self, descriptor: &ExtensionDescriptor, namespaces: bool) -> Result<()> {
        let mut root_attributes = Vec::new();
        if namespaces {
            root_attributes.extend(namespace_declarations());
        }
        self.start("ext:SupportedExtension", &root_attributes)?;

        let version: Vec<(&str, &str)> = descriptor
            .version
            .as_deref()
            .map(|v| ("version", v))
            .into_iter()
            .collect();
        self.text_element("ext:Extension", &version, &descriptor.name)?;

        let mut resource = BytesStart::new("wms:OnlineResource");
        resource.push_attribute(("xlink:type", "simple"));
        resource.push_attribute(("xlink:href", descriptor.documentation_uri.as_str()));
        self.write(Event::Empty(resource))?;

        for layer in &descriptor.layers {
            self.text_element("ext:Layer", &[], layer)?;
        }
        for property in &descriptor.properties {
            let version: Vec<(&str, &str)> = property
                .version
                .as_deref()
                .map(|v| ("version", v))
                .into_iter()
                .collect();
            self.text_element("ext:ExtensionProperty", &version, &property.value)?;
        }

        self.end("ext:SupportedExtension")
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner()).map_err(encode_error)
    }
}

fn namespace_declarations() -> [(&'static str, &'static str); 3] {
    [
        ("xmlns:wms", WMS_NS),
        ("xmlns:ext", EXTENSIONS_NS),
        ("xmlns:xlink", XLINK_NS),
    ]
}

fn encode_error(e: impl Display) -> ExtensionError {
    ExtensionError::Encode(e.to_string())
}

/// Encode one descriptor as a standalone `SupportedExtension` document
pub fn encode_element(descriptor: &ExtensionDescriptor) -> Result<String> {
    let mut out = XmlOut::new()?;
    out.extension(descriptor, true)?;
    out.finish()
}

/// Encode descriptors as a minimal WMS capabilities document
///
/// Each descriptor becomes one extended capability under `wms:Capability`.
pub fn encode_document<'a>(
    descriptors: impl IntoIterator<Item = &'a ExtensionDescriptor>,
) -> Result<String> {
    let mut out = XmlOut::new()?;

    let mut root_attributes = vec![("version", WMS_VERSION)];
    root_attributes.extend(namespace_declarations());
    out.start("wms:WMS_Capabilities", &root_attributes)?;
    out.start("wms:Capability", &[])?;
    for descriptor in descriptors {
        out.extension(descriptor, false)?;
    }
    out.end("wms:Capability")?;
    out.end("wms:WMS_Capabilities")?;

    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ExtensionProperty;
    use crate::parser::DocumentParser;

    fn band_math() -> ExtensionDescriptor {
        ExtensionDescriptor::new(
            "user_band_math",
            Some("1.0"),
            "https://docs.example.org/band_math?a=1&b=2",
            ["ndvi", "ndwi"],
        )
        .with_property(ExtensionProperty::versioned("float", "2"))
        .with_property(ExtensionProperty::new("<rgb & alpha>"))
    }

    #[test]
    fn test_element_round_trip() {
        let xml = encode_element(&band_math()).unwrap();
        assert!(xml.contains("&amp;"));

        let outcome = DocumentParser::default().parse_str(&xml).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(ExtensionDescriptor::from(outcome.candidates[0].clone()), band_math());
    }

    #[test]
    fn test_document_round_trip() {
        let mut other = band_math();
        other.name = "time_series".to_string();
        other.version = None;
        other.properties.clear();

        let xml = encode_document([&band_math(), &other]).unwrap();
        assert!(xml.contains("<wms:Capability>"));

        let outcome = DocumentParser::default().parse_str(&xml).unwrap();
        // the second descriptor has no version, which the default parser requires
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, 1);
    }

    #[test]
    fn test_empty_document() {
        let xml = encode_document(Vec::<&ExtensionDescriptor>::new()).unwrap();
        let outcome = DocumentParser::default().parse_str(&xml).unwrap();
        assert!(outcome.candidates.is_empty());
        assert!(outcome.unknown.is_empty());
    }
}
