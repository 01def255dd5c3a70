use eyre::WrapErr;
use serde::Deserialize;

/// Tunables of a [`crate::Model`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Maximum number of REPL elements kept; older elements are dropped first
    pub max_repl_length: usize,
    /// Number of frames requested per `stackTrace` page
    pub stack_frame_page_size: i64,
    /// Maximum number of children shown for one structured output value
    pub max_key_value_children: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_repl_length: 10_000,
            stack_frame_page_size: protocol::DEFAULT_STACK_FRAME_PAGE_SIZE,
            max_key_value_children: 1_000,
        }
    }
}

impl ModelConfig {
    pub fn from_toml_str(contents: &str) -> eyre::Result<Self> {
        let config: Self = toml::from_str(contents).wrap_err("parsing model configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// A page size of zero would request the whole stack at once
    pub fn validate(&self) -> eyre::Result<()> {
        eyre::ensure!(
            self.stack_frame_page_size > 0,
            "stack_frame_page_size must be positive, got {}",
            self.stack_frame_page_size
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = ModelConfig::from_toml_str("max_repl_length = 5").unwrap();
        assert_eq!(config.max_repl_length, 5);
        assert_eq!(config.stack_frame_page_size, 20);
        assert_eq!(config.max_key_value_children, 1000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ModelConfig::from_toml_str("max_repl = 5").is_err());
    }

    #[test]
    fn page_size_must_be_positive() {
        for contents in ["stack_frame_page_size = 0", "stack_frame_page_size = -5"] {
            let err = ModelConfig::from_toml_str(contents).unwrap_err();
            assert!(err.to_string().contains("stack_frame_page_size"), "{err}");
        }
        assert!(ModelConfig::from_toml_str("stack_frame_page_size = 1").is_ok());
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(ModelConfig::from_toml_str("").unwrap(), ModelConfig::default());
    }
}
