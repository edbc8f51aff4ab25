use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// What auto-mapping does with a field it cannot flatten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedFieldPolicy {
    /// Fail with `MappingError::UnsupportedFieldKind`.
    #[default]
    Error,
    /// Leave the field out and log a warning.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Joins prefixes and nested column names.
    pub separator: String,
    pub unsupported_fields: UnsupportedFieldPolicy,
    /// Record count from which values are extracted on the rayon pool.
    pub parallel_threshold: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            unsupported_fields: UnsupportedFieldPolicy::Error,
            parallel_threshold: 4096,
        }
    }
}

const ENV_PREFIX: &str = "RECORD_FLATTEN";

impl MapperConfig {
    /// Loads `path` (any format the `config` crate knows, extension
    /// optional, may be missing) with `RECORD_FLATTEN__*` overrides on top.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder().add_source(File::with_name(path).required(false)))
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn from_builder(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let cfg = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let parsed: MapperConfig = cfg.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.separator.is_empty() {
            return Err(ConfigError::Message("separator must not be empty".into()));
        }
        Ok(())
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_unsupported_fields(mut self, policy: UnsupportedFieldPolicy) -> Self {
        self.unsupported_fields = policy;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }
}
