//! Transaction manager configuration

use serde::{Deserialize, Serialize};

/// Settings applied to every repository a manager creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Record undo history for new repositories
    pub history_enabled: bool,
    /// Oldest checkpoints are dropped beyond this many (0 = unbounded)
    pub max_checkpoints: usize,
    /// Purge commits every repository has already replayed
    pub garbage_collect: bool,
}

impl TransactionConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With undo history for every repository
    #[inline]
    #[must_use]
    pub fn with_history(mut self) -> Self {
        self.history_enabled = true;
        self
    }

    /// With at most `max` undo checkpoints per repository
    #[inline]
    #[must_use]
    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = max;
        self
    }

    /// Keep every commit in the log
    #[inline]
    #[must_use]
    pub fn without_garbage_collection(mut self) -> Self {
        self.garbage_collect = false;
        self
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            history_enabled: false,
            max_checkpoints: 100,
            garbage_collect: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_compose() {
        let config = TransactionConfig::new()
            .with_history()
            .with_max_checkpoints(3)
            .without_garbage_collection();
        assert!(config.history_enabled);
        assert_eq!(config.max_checkpoints, 3);
        assert!(!config.garbage_collect);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: TransactionConfig = serde_json::from_str(r#"{"history_enabled": true}"#).unwrap();
        assert!(config.history_enabled);
        assert_eq!(config.max_checkpoints, 100);
        assert!(config.garbage_collect);
    }
}
