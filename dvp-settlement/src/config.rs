//! Configuration for the settlement evaluator

use serde::{Deserialize, Serialize};

/// Engine configuration
///
/// All intervals are ledger seconds, applied to contract wake times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay before re-evaluating a contract that could not settle yet
    pub retry_interval: i64,

    /// Delay between completion cleanup polls once a contract has settled
    pub completed_grace: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_interval: 5,
            completed_grace: 5,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Validation(format!("Failed to read config: {}", e)))?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Validation(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_interval, 5);
        assert_eq!(config.completed_grace, 5);
    }

    #[test]
    fn test_parse_toml() {
        let config: EngineConfig =
            toml::from_str("retry_interval = 30\ncompleted_grace = 10\n").unwrap();
        assert_eq!(config.retry_interval, 30);
        assert_eq!(config.completed_grace, 10);
    }
}
