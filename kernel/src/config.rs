// Revert Configuration
//
// Tunables for the revert engine, loadable from JSON.

use serde::{Deserialize, Serialize};

/// Revert engine configuration loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RevertConfig {
    /// Fail a revert when a versioned field of the reverted object never
    /// appears in its history. Off by default: the revert is partial.
    pub strict: bool,
}

impl RevertConfig {
    /// Default built-in configuration (used if no config is provided).
    pub fn default_config() -> Self {
        Self { strict: false }
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_lenient() {
        assert!(!RevertConfig::default_config().strict);
        assert_eq!(RevertConfig::default(), RevertConfig::default_config());
    }

    #[test]
    fn parses_from_json() {
        let config: RevertConfig = serde_json::from_str(r#"{ "strict": true }"#).unwrap();
        assert_eq!(config, RevertConfig::strict());

        let config: RevertConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.strict);
    }
}
