//! Termgraph CLI
//!
//! Loads JSON fixtures into the taxonomy core and inspects the result:
//! - `build`: build a taxonomy snapshot and report its shape and diagnostics
//! - `visible`: compute the latest visible stamps among a set of fixture stamps
//! - `decode`: unpack taxonomy words

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use termgraph_core::{
    Contradiction, NodeId, Precedence, Premise, StampCoordinate, StampPosition, StampSequence,
    TaxonomyEdge, Termgraph, TermgraphConfig, Tree, TreeSummary,
};

mod fixture;

use fixture::Fixture;

#[derive(Parser)]
#[command(name = "termgraph")]
#[command(author, version, about = "Termgraph: versioned terminology taxonomy inspector")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a fixture and build its taxonomy for one coordinate.
    Build {
        #[command(flatten)]
        view: ViewArgs,
        /// Logic-graph premise to build from
        #[arg(long, value_enum, default_value_t = PremiseArg::Stated)]
        premise: PremiseArg,
        /// Include edges derived from non-hierarchy semantics
        #[arg(long)]
        sememe: bool,
        /// Include relationships outside description-logic scope
        #[arg(long)]
        non_dl: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load a fixture and report which of the given stamps are visible.
    Visible {
        #[command(flatten)]
        view: ViewArgs,
        /// Fixture stamp keys to compare
        #[arg(required = true)]
        stamps: Vec<String>,
        /// Order equally recent versions by coordinate position
        #[arg(long)]
        path_precedence: bool,
    },

    /// Decode `destination:packed` taxonomy word pairs.
    Decode {
        /// Word pairs, e.g. `3:0x01000005`
        #[arg(required = true)]
        words: Vec<String>,
    },
}

#[derive(Args)]
struct ViewArgs {
    /// Fixture JSON file
    fixture: PathBuf,
    /// Configuration JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Path to view from
    #[arg(long, default_value_t = 1)]
    path: NodeId,
    /// Time cutoff on the path (default: latest)
    #[arg(long)]
    time: Option<i64>,
}

impl ViewArgs {
    fn open(&self) -> Result<(Termgraph, fixture::Loaded)> {
        let config = match &self.config {
            Some(path) => TermgraphConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => TermgraphConfig::default(),
        };
        let tg = Termgraph::new(config)?;
        let loaded = Fixture::load(&self.fixture)?.apply(&tg)?;
        Ok((tg, loaded))
    }

    fn position(&self) -> StampPosition {
        match self.time {
            Some(time) => StampPosition::new(self.path, time),
            None => StampPosition::latest(self.path),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PremiseArg {
    Stated,
    Inferred,
}

impl From<PremiseArg> for Premise {
    fn from(arg: PremiseArg) -> Self {
        match arg {
            PremiseArg::Stated => Premise::Stated,
            PremiseArg::Inferred => Premise::Inferred,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            view,
            premise,
            sememe,
            non_dl,
            json,
        } => cmd_build(&view, premise.into(), sememe, non_dl, json),
        Commands::Visible {
            view,
            stamps,
            path_precedence,
        } => cmd_visible(&view, &stamps, path_precedence),
        Commands::Decode { words } => cmd_decode(&words),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// build
// ============================================================================

#[derive(Serialize)]
struct BuildReport {
    summary: TreeSummary,
    roots: Vec<NodeId>,
    /// `(child, parent)` pairs
    edges: Vec<(NodeId, NodeId)>,
    cycles: Vec<Vec<NodeId>>,
    contradictions: Vec<Contradiction>,
    inactive: Vec<NodeId>,
}

impl BuildReport {
    fn from_tree(tree: &Tree) -> Self {
        let edges = tree
            .nodes()
            .iter()
            .flat_map(|child| tree.parents_of(child).into_iter().map(move |p| (child, p)))
            .collect();
        Self {
            summary: tree.summary(),
            roots: tree.roots().iter().collect(),
            edges,
            cycles: tree.cycles().to_vec(),
            contradictions: tree.contradictions().to_vec(),
            inactive: tree.inactive_concepts().iter().collect(),
        }
    }
}

fn cmd_build(
    view: &ViewArgs,
    premise: Premise,
    sememe: bool,
    non_dl: bool,
    json: bool,
) -> Result<()> {
    let (tg, loaded) = view.open()?;
    let mut manifold = tg.manifold(
        StampCoordinate::new(vec![view.position()]),
        premise,
        loaded.assemblage,
    );
    manifold.include_sememe |= sememe;
    manifold.include_non_dl |= non_dl;

    let tree = tg.build(&manifold)?;
    let report = BuildReport::from_tree(&tree);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let s = &report.summary;
    println!(
        "{} {} nodes, {} edges, {} roots ({} redundant edges removed)",
        "Built".green().bold(),
        s.nodes,
        s.edges,
        s.roots,
        s.redundant_edges_removed
    );
    for (child, parent) in &report.edges {
        println!("  {child} {} {parent}", "is-a".cyan());
    }
    for cycle in &report.cycles {
        println!("  {} {:?}", "cycle".red().bold(), cycle);
    }
    for c in &report.contradictions {
        let target = c
            .destination
            .map_or_else(|| "status".to_string(), |d| d.to_string());
        println!(
            "  {} node {} -> {}: {:?}",
            "contradiction".yellow().bold(),
            c.node,
            target,
            c.stamps
        );
    }
    if !report.inactive.is_empty() {
        println!("  {} {:?}", "inactive".yellow(), report.inactive);
    }
    Ok(())
}

// ============================================================================
// visible
// ============================================================================

fn cmd_visible(view: &ViewArgs, keys: &[String], path_precedence: bool) -> Result<()> {
    let (tg, loaded) = view.open()?;
    let candidates = keys
        .iter()
        .map(|k| loaded.stamp(k))
        .collect::<Result<Vec<_>>>()?;

    let precedence = if path_precedence {
        Precedence::Path
    } else {
        Precedence::Time
    };
    let coordinate = StampCoordinate::new(vec![view.position()]).with_precedence(precedence);
    let visible = tg.calculator().compute_visible(candidates, &coordinate)?;

    let key_of = |seq: StampSequence| {
        loaded
            .stamps
            .iter()
            .find(|&(_, &s)| tg.pool().canonical(s) == seq)
            .map_or_else(|| seq.to_string(), |(k, _)| k.clone())
    };

    if visible.is_empty() {
        println!("{}", "nothing visible".yellow());
    }
    for seq in &visible.visible {
        println!("{} {}", "visible".green().bold(), key_of(*seq));
    }
    for group in &visible.contradictions {
        let names: Vec<String> = group.iter().map(|s| key_of(*s)).collect();
        println!("{} {}", "contradiction".red().bold(), names.join(", "));
    }
    Ok(())
}

// ============================================================================
// decode
// ============================================================================

fn parse_word(text: &str) -> Result<u32> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid word `{text}`"))
}

fn cmd_decode(pairs: &[String]) -> Result<()> {
    for pair in pairs {
        let (dest, packed) = pair
            .split_once(':')
            .with_context(|| format!("expected destination:packed, got `{pair}`"))?;
        let edge = TaxonomyEdge::from_words(parse_word(dest)?, parse_word(packed)?)
            .with_context(|| format!("cannot decode `{pair}`"))?;
        let flags: Vec<&str> = edge.flags.names().collect();
        println!(
            "{} -> {} via {} [{}]",
            pair.bold(),
            edge.destination,
            edge.stamp,
            flags.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_parse_in_hex_and_decimal() {
        assert_eq!(parse_word("0x01000005").unwrap(), 0x0100_0005);
        assert_eq!(parse_word("17").unwrap(), 17);
        assert!(parse_word("0xZZ").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
