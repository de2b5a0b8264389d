//! Configuration service contract and a TOML-backed implementation.
//!
//! The runtime state never parses configuration itself. It talks to a
//! [`ConfigService`], which answers three kinds of questions:
//!
//! - which handle an extension was registered under
//! - the value of a named option for an extension (or the core, handle 0)
//! - the delimited list of species an extension emits
//!
//! [`ExtensionConfig`] is the reference implementation, read from TOML:
//!
//! ```
//! use rhemco_core::config::{ConfigService, ExtensionConfig, CORE_EXTENSION};
//!
//! let config = ExtensionConfig::from_toml_str(
//!     r#"
//!     separator = ";"
//!
//!     [core]
//!     "Negative values" = 2
//!
//!     [[extensions]]
//!     name = "Custom"
//!     handle = 7
//!     species = "O3;NO"
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.extension_handle("Custom"), Some(7));
//! assert_eq!(config.get_int(CORE_EXTENSION, "Negative values").unwrap(), Some(2));
//! assert_eq!(config.extension_species(7).unwrap(), "O3;NO");
//! ```

use crate::errors::{HcoError, HcoResult};
use crate::utils::{check_separator, check_wildcard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Handle of an extension, assigned by the configuration
pub type ExtensionHandle = i32;

/// Handle under which the core's own options are stored
pub const CORE_EXTENSION: ExtensionHandle = 0;

pub const DEFAULT_SEPARATOR: &str = "/";
pub const DEFAULT_WILDCARD: &str = "*";

/// Value of a configuration option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

impl OptionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "integer",
            OptionValue::Real(_) => "real",
            OptionValue::Str(_) => "string",
        }
    }
}

fn type_mismatch(name: &str, expected: &str, found: &OptionValue) -> HcoError {
    HcoError::configuration(format!(
        "option '{}' should be {}, found {}",
        name,
        expected,
        found.type_name()
    ))
}

/// Source of extension registrations and option values.
///
/// Lookups that find nothing return `None`; it is up to the caller to apply
/// a default or to fail.
pub trait ConfigService: std::fmt::Debug + Send + Sync {
    /// True once the configuration has been parsed at least once
    fn is_ready(&self) -> bool;

    /// Handle of an enabled extension
    fn extension_handle(&self, name: &str) -> Option<ExtensionHandle>;

    /// Raw value of an option
    fn option(&self, extension: ExtensionHandle, name: &str) -> Option<OptionValue>;

    /// Delimited species list registered to an extension
    fn extension_species(&self, extension: ExtensionHandle) -> HcoResult<String>;

    /// Separator used in species lists
    fn separator(&self) -> &str {
        DEFAULT_SEPARATOR
    }

    /// Token that stands for "all species"
    fn wildcard(&self) -> &str {
        DEFAULT_WILDCARD
    }

    fn get_bool(&self, extension: ExtensionHandle, name: &str) -> HcoResult<Option<bool>> {
        match self.option(extension, name) {
            None => Ok(None),
            Some(OptionValue::Bool(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(name, "bool", &other)),
        }
    }

    fn get_int(&self, extension: ExtensionHandle, name: &str) -> HcoResult<Option<i64>> {
        match self.option(extension, name) {
            None => Ok(None),
            Some(OptionValue::Int(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(name, "integer", &other)),
        }
    }

    /// Integers are accepted and widened
    fn get_real(&self, extension: ExtensionHandle, name: &str) -> HcoResult<Option<f64>> {
        match self.option(extension, name) {
            None => Ok(None),
            Some(OptionValue::Real(v)) => Ok(Some(v)),
            Some(OptionValue::Int(v)) => Ok(Some(v as f64)),
            Some(other) => Err(type_mismatch(name, "real", &other)),
        }
    }

    fn get_string(&self, extension: ExtensionHandle, name: &str) -> HcoResult<Option<String>> {
        match self.option(extension, name) {
            None => Ok(None),
            Some(OptionValue::Str(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(name, "string", &other)),
        }
    }
}

/// Parse progress of an [`ExtensionConfig`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigStage {
    /// Nothing has been read yet; option lookups are not meaningful
    Empty,
    /// At least one source has been read
    Parsed,
}

fn default_enabled() -> bool {
    true
}

/// Registration of one extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionEntry {
    pub name: String,
    pub handle: ExtensionHandle,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Species list, joined with the configured separator
    #[serde(default)]
    pub species: String,
    #[serde(default)]
    pub options: HashMap<String, OptionValue>,
}

impl ExtensionEntry {
    pub fn new(name: impl Into<String>, handle: ExtensionHandle, species: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle,
            enabled: true,
            species: species.into(),
            options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(name.into(), value);
        self
    }
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_wildcard() -> String {
    DEFAULT_WILDCARD.to_string()
}

/// On-disk layout of a configuration file
#[derive(Debug, Deserialize)]
struct ConfigFile {
    separator: Option<String>,
    wildcard: Option<String>,
    #[serde(default)]
    core: HashMap<String, OptionValue>,
    #[serde(default)]
    extensions: Vec<ExtensionEntry>,
}

/// In-memory configuration built from TOML sources.
#[derive(Debug, Clone)]
pub struct ExtensionConfig {
    stage: ConfigStage,
    separator: String,
    wildcard: String,
    core_options: HashMap<String, OptionValue>,
    extensions: Vec<ExtensionEntry>,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionConfig {
    /// Create an empty configuration that has not been parsed yet.
    pub fn new() -> Self {
        Self {
            stage: ConfigStage::Empty,
            separator: default_separator(),
            wildcard: default_wildcard(),
            core_options: HashMap::new(),
            extensions: vec![],
        }
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(source: &str) -> HcoResult<Self> {
        let mut config = Self::new();
        config.load_str(source)?;
        Ok(config)
    }

    /// Merge a TOML source into this configuration.
    ///
    /// A source that sets the separator or wildcard replaces the current one;
    /// otherwise it is kept. Core options are overwritten key by key.
    /// Extensions are added and must not clash with ones already registered
    /// or with each other.
    ///
    /// On error the configuration is left as it was.
    pub fn load_str(&mut self, source: &str) -> HcoResult<()> {
        let file: ConfigFile = toml::from_str(source)
            .map_err(|e| HcoError::configuration(format!("could not parse configuration: {}", e)))?;

        let mut merged = self.clone();
        if let Some(separator) = file.separator {
            merged.with_separator(separator)?;
        }
        if let Some(wildcard) = file.wildcard {
            merged.with_wildcard(wildcard)?;
        }
        merged.core_options.extend(file.core);
        for entry in file.extensions {
            merged.add_extension(entry)?;
        }
        merged.stage = ConfigStage::Parsed;

        *self = merged;
        Ok(())
    }

    pub fn stage(&self) -> ConfigStage {
        self.stage
    }

    /// Mark the configuration as parsed without reading a source
    pub fn mark_parsed(&mut self) -> &mut Self {
        self.stage = ConfigStage::Parsed;
        self
    }

    /// Set the species list separator; it must not be empty.
    pub fn with_separator(&mut self, separator: impl Into<String>) -> HcoResult<&mut Self> {
        let separator = separator.into();
        check_separator(&separator)?;
        self.separator = separator;
        Ok(self)
    }

    /// Set the wildcard token; it must be non-empty and already trimmed.
    pub fn with_wildcard(&mut self, wildcard: impl Into<String>) -> HcoResult<&mut Self> {
        let wildcard = wildcard.into();
        check_wildcard(&wildcard)?;
        self.wildcard = wildcard;
        Ok(self)
    }

    pub fn set_core_option(&mut self, name: impl Into<String>, value: OptionValue) -> &mut Self {
        self.core_options.insert(name.into(), value);
        self
    }

    /// Register an extension.
    ///
    /// Handles must be positive (0 belongs to the core) and, like names, unique.
    pub fn add_extension(&mut self, entry: ExtensionEntry) -> HcoResult<()> {
        if entry.handle <= CORE_EXTENSION {
            return Err(HcoError::configuration(format!(
                "extension '{}' has handle {}; handles must be positive",
                entry.name, entry.handle
            )));
        }
        if let Some(existing) = self
            .extensions
            .iter()
            .find(|e| e.handle == entry.handle || e.name == entry.name)
        {
            return Err(HcoError::configuration(format!(
                "extension '{}' ({}) clashes with '{}' ({})",
                entry.name, entry.handle, existing.name, existing.handle
            )));
        }
        self.extensions.push(entry);
        Ok(())
    }

    pub fn extensions(&self) -> &[ExtensionEntry] {
        &self.extensions
    }

    fn entry(&self, extension: ExtensionHandle) -> Option<&ExtensionEntry> {
        self.extensions.iter().find(|e| e.handle == extension)
    }
}

impl ConfigService for ExtensionConfig {
    fn is_ready(&self) -> bool {
        self.stage == ConfigStage::Parsed
    }

    fn extension_handle(&self, name: &str) -> Option<ExtensionHandle> {
        self.extensions
            .iter()
            .find(|e| e.enabled && e.name == name)
            .map(|e| e.handle)
    }

    fn option(&self, extension: ExtensionHandle, name: &str) -> Option<OptionValue> {
        if extension == CORE_EXTENSION {
            return self.core_options.get(name).cloned();
        }
        self.entry(extension)?.options.get(name).cloned()
    }

    fn extension_species(&self, extension: ExtensionHandle) -> HcoResult<String> {
        self.entry(extension)
            .map(|e| e.species.clone())
            .ok_or_else(|| HcoError::not_found("extension", extension))
    }

    fn separator(&self) -> &str {
        &self.separator
    }

    fn wildcard(&self) -> &str {
        &self.wildcard
    }
}
