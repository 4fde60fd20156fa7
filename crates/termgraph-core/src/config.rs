//! Runtime configuration, read from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::commit::DEFAULT_COMMIT_HISTORY_LIMIT;
use crate::coordinate::{ManifoldCoordinate, Premise, StampCoordinate};
use crate::error::{CoreError, Result};
use crate::spine::DEFAULT_SPINE_SIZE;
use crate::NodeId;

pub const DEFAULT_CYCLE_BUDGET_PERCENT: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermgraphConfig {
    /// Slots per spine segment.
    pub spine_size: usize,
    /// Extra progress units reserved for the cycle pass, as a percentage of
    /// the node count.
    pub cycle_budget_percent: u64,
    /// Commit records retained by the commit log.
    pub commit_history_limit: usize,
    pub include_sememe_edges: bool,
    pub include_non_dl_edges: bool,
}

impl Default for TermgraphConfig {
    fn default() -> Self {
        Self {
            spine_size: DEFAULT_SPINE_SIZE,
            cycle_budget_percent: DEFAULT_CYCLE_BUDGET_PERCENT,
            commit_history_limit: DEFAULT_COMMIT_HISTORY_LIMIT,
            include_sememe_edges: false,
            include_non_dl_edges: false,
        }
    }
}

impl TermgraphConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.spine_size == 0 {
            return Err(CoreError::Config("spine_size must be positive".to_string()));
        }
        Ok(())
    }

    /// A manifold coordinate carrying this configuration's edge policy.
    pub fn manifold(
        &self,
        stamp: StampCoordinate,
        premise: Premise,
        assemblage: NodeId,
    ) -> ManifoldCoordinate {
        ManifoldCoordinate::new(stamp, premise, assemblage)
            .with_sememe_edges(self.include_sememe_edges)
            .with_non_dl_edges(self.include_non_dl_edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let config = TermgraphConfig::from_json_str(r#"{ "include_sememe_edges": true }"#).unwrap();
        assert!(config.include_sememe_edges);
        assert_eq!(config.spine_size, DEFAULT_SPINE_SIZE);
        assert_eq!(config.cycle_budget_percent, 10);
    }

    #[test]
    fn zero_spine_size_is_rejected() {
        let err = TermgraphConfig::from_json_str(r#"{ "spine_size": 0 }"#).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "spine_size": 64, "commit_history_limit": 8 }}"#).unwrap();

        let config = TermgraphConfig::load(file.path()).unwrap();
        assert_eq!(config.spine_size, 64);
        assert_eq!(config.commit_history_limit, 8);

        let missing = TermgraphConfig::load(Path::new("/nonexistent/termgraph.json"));
        assert!(matches!(missing, Err(CoreError::Config(_))));
    }

    #[test]
    fn manifold_applies_edge_policy() {
        let config = TermgraphConfig {
            include_non_dl_edges: true,
            ..TermgraphConfig::default()
        };
        let manifold = config.manifold(StampCoordinate::latest_on(1), Premise::Inferred, 7);
        assert!(manifold.include_non_dl);
        assert!(!manifold.include_sememe);
        assert_eq!(manifold.assemblage, 7);
    }
}
