//! Engine tunables.

use serde::{Deserialize, Serialize};

use remix_types::DEFAULT_MAX_GRAPH_ITERATIONS;

/// Remix engine configuration (the `[graph]` section of the daemon config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemixConfig {
    /// Upper bound on root/descendant expansion rounds when collecting a full
    /// remix graph. Almost every real graph settles within two rounds; very
    /// flat and wide graphs may hit the cap and come back incomplete.
    #[serde(default = "default_max_graph_iterations")]
    pub max_graph_iterations: usize,
}

fn default_max_graph_iterations() -> usize {
    DEFAULT_MAX_GRAPH_ITERATIONS
}

impl Default for RemixConfig {
    fn default() -> Self {
        Self {
            max_graph_iterations: default_max_graph_iterations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_iteration_cap() {
        assert_eq!(RemixConfig::default().max_graph_iterations, 6);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let config: RemixConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config, RemixConfig::default());
    }
}
