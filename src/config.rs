//! Configuration for parsing, validation and registration
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (wms-extensions.toml)
//! - Environment variables (WMS_EXT__*)
//!
//! ## Example config file (wms-extensions.toml):
//! ```toml
//! [parser]
//! require_extension_version = true
//! accept_standalone = true
//!
//! [validation]
//! conflict_policy = "warn"
//!
//! [registry]
//! on_duplicate = "skip"
//!
//! [service]
//! allowed_urls = ["https://ows.example.org/wms", "https://ows-alt.example.org/wms"]
//!
//! [output]
//! format = "compact"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    #[serde(default)]
    pub parser: ParserConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Document decoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Drop `Extension` elements without a `version` attribute
    #[serde(default = "default_true")]
    pub require_extension_version: bool,

    /// Decode documents whose root element is a `SupportedExtension`
    #[serde(default = "default_true")]
    pub accept_standalone: bool,
}

/// How conflicting definitions of one extension on one layer are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Reject the later record
    #[default]
    Reject,
    /// Accept the later record and report a warning
    Warn,
}

/// Validation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

/// What ingestion does when a record's key is already registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail the ingest when a document repeats a declaration
    #[default]
    Reject,
    /// Keep the first declaration and note the repeat in the report
    Skip,
}

/// Registry settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

/// Service endpoint settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Public base URLs of the service; relative documentation links resolve
    /// against the one matching the request
    #[serde(default)]
    pub allowed_urls: Vec<String>,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_true() -> bool {
    true
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            require_extension_version: true,
            accept_standalone: true,
        }
    }
}

impl OutputFormat {
    /// Serialize a value as JSON in this format
    pub fn to_json<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        match self {
            OutputFormat::Pretty => serde_json::to_string_pretty(value),
            OutputFormat::Compact => serde_json::to_string(value),
        }
    }
}

impl ExtensionsConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "wms-extensions.toml",
            ".wms-extensions.toml",
            "config/wms-extensions.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("au", "ga", "wms-extensions") {
            let xdg_config = config_dir.config_dir().join("wms-extensions.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // WMS_EXT__VALIDATION__CONFLICT_POLICY=warn
        builder = builder.add_source(
            Environment::with_prefix("WMS_EXT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtensionsConfig::default();
        assert!(config.parser.require_extension_version);
        assert!(config.parser.accept_standalone);
        assert_eq!(config.validation.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.registry.on_duplicate, DuplicatePolicy::Reject);
        assert!(config.service.allowed_urls.is_empty());
    }

    #[test]
    fn test_serialize_config() {
        let config = ExtensionsConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[parser]"));
        assert!(toml_str.contains("[validation]"));
        assert!(toml_str.contains("conflict_policy = \"reject\""));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[validation]
conflict_policy = "warn"

[service]
allowed_urls = ["https://ows.example.org/wms"]
"#,
        )
        .unwrap();

        let config = ExtensionsConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.validation.conflict_policy, ConflictPolicy::Warn);
        assert_eq!(config.service.allowed_urls, vec!["https://ows.example.org/wms"]);
        // sections absent from the file keep their defaults
        assert!(config.parser.require_extension_version);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = ExtensionsConfig::default();
        config.output.format = OutputFormat::Compact;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = ExtensionsConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded.output.format, OutputFormat::Compact);
    }
}
