//! JSON fixtures: paths, stamps, edges and commits to load into a `Termgraph`.
//!
//! ```json
//! {
//!   "assemblage": 100,
//!   "paths": [{ "path": 2, "origins": [{ "path": 1, "time": 500 }] }],
//!   "stamps": [
//!     { "key": "s1", "status": "active", "time": 10, "path": 1 },
//!     { "key": "draft", "status": "active", "path": 2 }
//!   ],
//!   "edges": [{ "child": 3, "parent": 1, "stamp": "s1", "flags": ["stated"] }],
//!   "commits": [{ "time": 600, "stamps": ["draft"], "comment": "promote" }]
//! }
//! ```
//!
//! A stamp without `time` is allocated uncommitted and only becomes visible
//! once a commit names it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use termgraph_core::{
    ComponentRef, NodeId, StampPosition, StampSequence, Status, TaxonomyEdge, TaxonomyFlags,
    Termgraph,
};

pub const DEFAULT_ASSEMBLAGE: NodeId = 0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub assemblage: Option<NodeId>,
    #[serde(default)]
    pub paths: Vec<PathSpec>,
    #[serde(default)]
    pub stamps: Vec<StampSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub commits: Vec<CommitSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSpec {
    pub path: NodeId,
    #[serde(default)]
    pub origins: Vec<StampPosition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampSpec {
    pub key: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default)]
    pub author: NodeId,
    #[serde(default)]
    pub module: NodeId,
    pub path: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub child: NodeId,
    pub parent: NodeId,
    pub stamp: String,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSpec {
    pub time: i64,
    pub stamps: Vec<String>,
    #[serde(default)]
    pub comment: String,
}

/// What a load produced, for reporting.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub assemblage: NodeId,
    pub stamps: BTreeMap<String, StampSequence>,
    pub edges: usize,
    pub commits: usize,
}

impl Loaded {
    pub fn stamp(&self, key: &str) -> Result<StampSequence> {
        self.stamps
            .get(key)
            .copied()
            .ok_or_else(|| anyhow!("unknown stamp key `{key}`"))
    }
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse fixture {}", path.display()))
    }

    /// Load everything into `tg`, in order: paths, stamps, edges, commits.
    pub fn apply(&self, tg: &Termgraph) -> Result<Loaded> {
        let assemblage = self.assemblage.unwrap_or(DEFAULT_ASSEMBLAGE);

        for spec in &self.paths {
            for origin in &spec.origins {
                tg.origins().add_origin(spec.path, *origin);
            }
        }

        let mut stamps = BTreeMap::new();
        for spec in &self.stamps {
            let seq = match spec.time {
                Some(time) => tg.pool().allocate_committed(
                    spec.status,
                    time,
                    spec.author,
                    spec.module,
                    spec.path,
                ),
                None => tg
                    .pool()
                    .allocate_uncommitted(spec.status, spec.author, spec.module, spec.path),
            };
            if stamps.insert(spec.key.clone(), seq).is_some() {
                bail!("duplicate stamp key `{}`", spec.key);
            }
        }

        let mut loaded = Loaded {
            assemblage,
            stamps,
            ..Loaded::default()
        };

        for spec in &self.edges {
            let seq = loaded.stamp(&spec.stamp)?;
            let flags = parse_flags(&spec.flags)
                .with_context(|| format!("edge {} -> {}", spec.child, spec.parent))?;
            tg.store()
                .append_edge(spec.child, TaxonomyEdge::new(spec.parent, seq, flags))
                .with_context(|| format!("edge {} -> {}", spec.child, spec.parent))?;
            tg.assemblages().extend(assemblage, [spec.child, spec.parent]);
            if tg.pool().resolve(seq)?.is_uncommitted() {
                tg.pool().touch(seq, ComponentRef::Concept(spec.child))?;
            }
            loaded.edges += 1;
        }

        for spec in &self.commits {
            let sequences = spec
                .stamps
                .iter()
                .map(|key| loaded.stamp(key))
                .collect::<Result<BTreeSet<_>>>()?;
            tg.commits()
                .commit(&sequences, spec.time, spec.comment.clone())
                .with_context(|| format!("commit at {}", spec.time))?;
            loaded.commits += 1;
        }

        tracing::info!(
            stamps = loaded.stamps.len(),
            edges = loaded.edges,
            commits = loaded.commits,
            "fixture loaded"
        );
        Ok(loaded)
    }
}

pub fn parse_flags(names: &[String]) -> Result<TaxonomyFlags> {
    let mut flags = TaxonomyFlags::empty();
    for name in names {
        flags |= name
            .parse::<TaxonomyFlags>()
            .map_err(|e| anyhow!("{e}"))?;
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use termgraph_core::TermgraphConfig;

    fn fixture(json: &str) -> Fixture {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn loads_stamps_edges_and_commits() {
        let tg = Termgraph::new(TermgraphConfig::default()).unwrap();
        let f = fixture(
            r#"{
                "assemblage": 7,
                "stamps": [
                    { "key": "s1", "status": "active", "time": 10, "path": 1 },
                    { "key": "draft", "status": "active", "path": 1 }
                ],
                "edges": [
                    { "child": 2, "parent": 1, "stamp": "s1", "flags": ["stated"] },
                    { "child": 3, "parent": 1, "stamp": "draft", "flags": ["STATED", "inferred"] }
                ],
                "commits": [{ "time": 20, "stamps": ["draft"] }]
            }"#,
        );

        let loaded = f.apply(&tg).unwrap();
        assert_eq!(loaded.assemblage, 7);
        assert_eq!(loaded.edges, 2);
        assert_eq!(loaded.commits, 1);

        let latest = tg.commits().latest().unwrap();
        assert!(latest.concepts.contains(&3));
        assert_eq!(tg.assemblages().members(7).len(), 3);
    }

    #[test]
    fn unknown_keys_and_flags_are_reported() {
        let tg = Termgraph::new(TermgraphConfig::default()).unwrap();
        let missing = fixture(
            r#"{ "edges": [{ "child": 2, "parent": 1, "stamp": "nope", "flags": ["stated"] }] }"#,
        );
        assert!(missing.apply(&tg).is_err());

        assert!(parse_flags(&["stated".to_string(), "bogus".to_string()]).is_err());
    }
}
