//! Engine configuration

use crate::{WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};

/// Tunables for the transition engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of auto-executed actions chained from one call (default: 32)
    pub max_auto_chain_depth: usize,
    /// Complete the entry once every current step has no actions (default: true)
    pub implicit_finish: bool,
    /// Status written to steps closed by entry completion (default: "Finished")
    pub finished_status: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_auto_chain_depth: 32,
            implicit_finish: true,
            finished_status: "Finished".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> WorkflowResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| WorkflowError::Configuration(format!("invalid engine config: {}", e)))
    }

    pub fn with_max_auto_chain_depth(mut self, depth: usize) -> Self {
        self.max_auto_chain_depth = depth;
        self
    }

    pub fn with_implicit_finish(mut self, enabled: bool) -> Self {
        self.implicit_finish = enabled;
        self
    }

    pub fn with_finished_status(mut self, status: impl Into<String>) -> Self {
        self.finished_status = status.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_auto_chain_depth, 32);
        assert!(config.implicit_finish);
        assert_eq!(config.finished_status, "Finished");
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{"max_auto_chain_depth": 4}"#).unwrap();
        assert_eq!(config.max_auto_chain_depth, 4);
        assert!(config.implicit_finish);
        assert_eq!(config.finished_status, "Finished");
    }

    #[test]
    fn test_from_json_invalid() {
        let result = EngineConfig::from_json("{not json");
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }
}
