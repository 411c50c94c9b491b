//! Metadata Configuration - Convention settings for model building
//!
//! Settings can be built programmatically, deserialized from JSON, or read from
//! `ELIF_METADATA_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{MetadataError, MetadataResult};

const ENV_PREFIX: &str = "ELIF_METADATA_";

/// Naming patterns used to find the field backing a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackingFieldConvention {
    /// `<Name>k__BackingField`
    AutoProperty,
    /// `_name`
    UnderscoreCamel,
    /// `_Name`
    UnderscorePascal,
    /// `m_name`
    MemberCamel,
    /// `m_Name`
    MemberPascal,
    /// `name`
    Camel,
}

impl BackingFieldConvention {
    /// All conventions in the order they are tried by default
    pub const ALL: [BackingFieldConvention; 6] = [
        Self::AutoProperty,
        Self::UnderscoreCamel,
        Self::UnderscorePascal,
        Self::MemberCamel,
        Self::MemberPascal,
        Self::Camel,
    ];

    /// Field name this convention expects for the given property
    pub fn field_name(self, property_name: &str) -> String {
        match self {
            Self::AutoProperty => format!("<{}>k__BackingField", property_name),
            Self::UnderscoreCamel => format!("_{}", camel_case(property_name)),
            Self::UnderscorePascal => format!("_{}", property_name),
            Self::MemberCamel => format!("m_{}", camel_case(property_name)),
            Self::MemberPascal => format!("m_{}", property_name),
            Self::Camel => camel_case(property_name),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "auto_property" => Some(Self::AutoProperty),
            "underscore_camel" => Some(Self::UnderscoreCamel),
            "underscore_pascal" => Some(Self::UnderscorePascal),
            "member_camel" => Some(Self::MemberCamel),
            "member_pascal" => Some(Self::MemberPascal),
            "camel" => Some(Self::Camel),
            _ => None,
        }
    }
}

fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Conventions applied while building a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Backing field patterns, tried in order
    pub backing_field_conventions: Vec<BackingFieldConvention>,
    /// Suffix of conventional key and foreign key names (`Id`, `CustomerId`)
    pub key_suffix: String,
    /// Create shadow foreign key properties when none can be discovered
    pub synthesize_shadow_foreign_keys: bool,
    /// Add scalar CLR properties and the conventional key when a CLR entity type is added
    pub discover_clr_members: bool,
    /// Emit a debug event for every convention decision
    pub log_conventions: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backing_field_conventions: BackingFieldConvention::ALL.to_vec(),
            key_suffix: "Id".to_string(),
            synthesize_shadow_foreign_keys: true,
            discover_clr_members: true,
            log_conventions: true,
        }
    }
}

impl MetadataConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backing field conventions
    pub fn with_backing_field_conventions(mut self, conventions: Vec<BackingFieldConvention>) -> Self {
        self.backing_field_conventions = conventions;
        self
    }

    /// Set the key suffix
    pub fn with_key_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.key_suffix = suffix.into();
        self
    }

    /// Enable or disable shadow foreign key synthesis
    pub fn with_shadow_foreign_keys(mut self, enabled: bool) -> Self {
        self.synthesize_shadow_foreign_keys = enabled;
        self
    }

    /// Enable or disable CLR member discovery
    pub fn with_member_discovery(mut self, enabled: bool) -> Self {
        self.discover_clr_members = enabled;
        self
    }

    /// Enable or disable convention logging
    pub fn with_convention_logging(mut self, enabled: bool) -> Self {
        self.log_conventions = enabled;
        self
    }

    /// Parse a JSON document; missing fields fall back to defaults
    pub fn from_json(json: &str) -> MetadataResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MetadataError::configuration(format!("invalid metadata config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `ELIF_METADATA_*` environment variables
    pub fn from_env() -> MetadataResult<Self> {
        let mut config = Self::default();

        if let Some(suffix) = env_var("KEY_SUFFIX") {
            config.key_suffix = suffix;
        }

        if let Some(value) = env_var("SYNTHESIZE_SHADOW_FKS") {
            config.synthesize_shadow_foreign_keys = parse_bool("SYNTHESIZE_SHADOW_FKS", &value)?;
        }

        if let Some(value) = env_var("DISCOVER_CLR_MEMBERS") {
            config.discover_clr_members = parse_bool("DISCOVER_CLR_MEMBERS", &value)?;
        }

        if let Some(value) = env_var("LOG_CONVENTIONS") {
            config.log_conventions = parse_bool("LOG_CONVENTIONS", &value)?;
        }

        if let Some(value) = env_var("BACKING_FIELD_CONVENTIONS") {
            config.backing_field_conventions = value
                .split(',')
                .filter(|item| !item.trim().is_empty())
                .map(|item| {
                    BackingFieldConvention::parse(item).ok_or_else(|| {
                        MetadataError::configuration(format!(
                            "{}BACKING_FIELD_CONVENTIONS: unknown convention '{}'",
                            ENV_PREFIX,
                            item.trim()
                        ))
                    })
                })
                .collect::<MetadataResult<Vec<_>>>()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> MetadataResult<()> {
        if self.key_suffix.trim().is_empty() {
            return Err(MetadataError::configuration("key_suffix must not be empty"));
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn parse_bool(name: &str, value: &str) -> MetadataResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MetadataError::configuration(format!(
            "{}{}: expected a boolean, got '{}'",
            ENV_PREFIX, name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            "KEY_SUFFIX",
            "SYNTHESIZE_SHADOW_FKS",
            "DISCOVER_CLR_MEMBERS",
            "LOG_CONVENTIONS",
            "BACKING_FIELD_CONVENTIONS",
        ] {
            env::remove_var(format!("{}{}", ENV_PREFIX, name));
        }
    }

    #[test]
    fn test_backing_field_names() {
        assert_eq!(BackingFieldConvention::AutoProperty.field_name("Name"), "<Name>k__BackingField");
        assert_eq!(BackingFieldConvention::UnderscoreCamel.field_name("Name"), "_name");
        assert_eq!(BackingFieldConvention::UnderscorePascal.field_name("Name"), "_Name");
        assert_eq!(BackingFieldConvention::MemberCamel.field_name("Name"), "m_name");
        assert_eq!(BackingFieldConvention::MemberPascal.field_name("Name"), "m_Name");
        assert_eq!(BackingFieldConvention::Camel.field_name("Name"), "name");
    }

    #[test]
    fn test_from_json_uses_defaults_for_missing_fields() {
        let config = MetadataConfig::from_json(r#"{ "key_suffix": "Key" }"#).unwrap();
        assert_eq!(config.key_suffix, "Key");
        assert!(config.synthesize_shadow_foreign_keys);
        assert_eq!(config.backing_field_conventions.len(), 6);
    }

    #[test]
    fn test_from_json_rejects_empty_suffix() {
        assert!(MetadataConfig::from_json(r#"{ "key_suffix": "" }"#).is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("ELIF_METADATA_SYNTHESIZE_SHADOW_FKS", "false");
        env::set_var("ELIF_METADATA_BACKING_FIELD_CONVENTIONS", "underscore_camel, camel");

        let config = MetadataConfig::from_env().unwrap();
        assert!(!config.synthesize_shadow_foreign_keys);
        assert_eq!(
            config.backing_field_conventions,
            vec![BackingFieldConvention::UnderscoreCamel, BackingFieldConvention::Camel]
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        clear_env();
        env::set_var("ELIF_METADATA_LOG_CONVENTIONS", "maybe");
        assert!(MetadataConfig::from_env().is_err());

        clear_env();
        env::set_var("ELIF_METADATA_BACKING_FIELD_CONVENTIONS", "hungarian");
        assert!(MetadataConfig::from_env().is_err());
        clear_env();
    }
}
