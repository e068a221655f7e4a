//! Schema configuration model and document loading.
//!
//! The configuration is the only input to the compiler. Field maps use
//! [`IndexMap`] so that declaration order survives deserialization: the
//! order of a base type's fields is its root-version layout.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Name of the latest version; the version chain must end here.
    pub current_version: String,
    #[serde(default)]
    pub interfaces: IndexMap<String, InterfaceConfig>,
    /// Base types with their root-version field layouts.
    #[serde(default)]
    pub base_types: IndexMap<String, BaseTypeConfig>,
    /// Super types with their ordered member lists. A member's position is
    /// its discriminant.
    #[serde(default)]
    pub super_types: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub custom_types: IndexMap<String, CustomTypeConfig>,
    pub versions: IndexMap<String, VersionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseTypeConfig {
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

/// An externally implemented type: the host class that represents it and
/// the serializer that encodes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomTypeConfig {
    pub class: String,
    pub serializer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionConfig {
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub transformations: Vec<TransformationConfig>,
    #[serde(default)]
    pub changelog: Option<String>,
}

/// A transformation record as written in the configuration. Type references
/// and code references are still raw strings at this point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformationConfig {
    Move {
        #[serde(rename = "type")]
        type_name: String,
        from: String,
        to: String,
        #[serde(default)]
        index: Option<usize>,
    },
    Insert {
        #[serde(rename = "type")]
        type_name: String,
        to: String,
        field_type: String,
        initializer: String,
        #[serde(default)]
        context: Vec<String>,
        #[serde(default)]
        index: Option<usize>,
    },
    Remove {
        #[serde(rename = "type")]
        type_name: String,
        from: String,
    },
    Convert {
        #[serde(rename = "type")]
        type_name: String,
        from: String,
        new_type: String,
        converter: String,
        #[serde(default)]
        context: Vec<String>,
    },
}

/// Supported configuration document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick a format from the file extension; anything other than `.toml`
    /// is read as JSON.
    pub fn from_path(path: &Path) -> ConfigFormat {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Errors raised while decoding a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Decode a configuration document.
pub fn load_config_str(text: &str, format: ConfigFormat) -> Result<SchemaConfig, ConfigError> {
    let config = match format {
        ConfigFormat::Json => serde_json::from_str(text)?,
        ConfigFormat::Toml => toml::from_str(text)?,
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_preserves_field_order() {
        let cfg = load_config_str(
            r#"{
                "current_version": "v1",
                "base_types": {
                    "User": { "fields": { "zeta": "string", "alpha": "int", "mid": "-User" } }
                },
                "versions": { "v1": {} }
            }"#,
            ConfigFormat::Json,
        )
        .unwrap();
        let fields: Vec<&str> = cfg.base_types["User"]
            .fields
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(fields, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn toml_transformations_decode() {
        let cfg = load_config_str(
            r#"
current_version = "v2"

[base_types.User.fields]
name = "string"
age = "int"

[versions.v1]

[versions.v2]
previous = "v1"
changelog = "rename age"

[[versions.v2.transformations]]
kind = "move"
type = "User"
from = "age"
to = "years"
"#,
            ConfigFormat::Toml,
        )
        .unwrap();
        let v2 = &cfg.versions["v2"];
        assert_eq!(v2.previous.as_deref(), Some("v1"));
        assert_eq!(
            v2.transformations,
            vec![TransformationConfig::Move {
                type_name: "User".into(),
                from: "age".into(),
                to: "years".into(),
                index: None,
            }]
        );
        let fields: Vec<&str> = cfg.base_types["User"]
            .fields
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(fields, vec!["name", "age"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = load_config_str(
            r#"{ "current_version": "v1", "versions": {}, "extra": 1 }"#,
            ConfigFormat::Json,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("schema")), ConfigFormat::Json);
    }
}
