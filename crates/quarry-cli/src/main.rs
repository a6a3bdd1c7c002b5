//! Quarry - search job compiler CLI
//!
//! The `quarry` command compiles a parsed query tree (JSON) into a job tree.
//!
//! ## Commands
//!
//! - `plan`: print the compiled job tree
//! - `search`: run the job against a JSON corpus served by in-memory backends

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use quarry_backend::fakes::{Corpus, MemoryBackend};
use quarry_backend::{HttpSearcher, SearcherEndpoints};
use quarry_core::telemetry::init_tracing;
use quarry_core::{
    collect, compile, execute_streaming, pretty, Alert, Args, Clients, EngineConfig, Match, Node,
    Protocol, SearchContext, SearchInputs, SearchOutcome, SearchType,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(author = "Quarry Developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile and run code search job trees", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the job tree a query compiles to
    Plan {
        #[command(flatten)]
        query: QueryOpts,
    },

    /// Run a query against a corpus of in-memory repositories
    Search {
        #[command(flatten)]
        query: QueryOpts,

        /// Corpus file (JSON) with repositories and search contexts
        #[arg(short, long)]
        corpus: PathBuf,

        /// Output format for results
        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Comma-separated matcher service URLs for unindexed repositories.
        /// Falls back to QUARRY_SEARCHER_URLS; the corpus is searched locally
        /// when neither is set.
        #[arg(long)]
        searcher_urls: Option<String>,
    },
}

#[derive(ClapArgs)]
struct QueryOpts {
    /// Parsed query tree (JSON): one node or an array of nodes
    #[arg(short, long)]
    query: PathBuf,

    /// Engine configuration (JSON); QUARRY_* variables are used otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// How patterns are interpreted when the query has no patterntype:
    #[arg(long, value_enum, default_value = "literal")]
    pattern_type: PatternTypeArg,

    /// Use the streaming protocol's limits and deadlines
    #[arg(long)]
    streaming: bool,

    /// Multi-tenant deployment: skip unindexed repositories in global searches
    #[arg(long)]
    hosted: bool,

    /// Enforce sub-repository permissions
    #[arg(long)]
    sub_repo_perms: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PatternTypeArg {
    Literal,
    Regex,
    Structural,
}

impl From<PatternTypeArg> for SearchType {
    fn from(value: PatternTypeArg) -> Self {
        match value {
            PatternTypeArg::Literal => SearchType::Literal,
            PatternTypeArg::Regex => SearchType::Regex,
            PatternTypeArg::Structural => SearchType::Structural,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryFile {
    Nodes(Vec<Node>),
    Node(Node),
}

impl From<QueryFile> for Vec<Node> {
    fn from(file: QueryFile) -> Self {
        match file {
            QueryFile::Nodes(nodes) => nodes,
            QueryFile::Node(node) => vec![node],
        }
    }
}

fn load_query(path: &Path) -> Result<Vec<Node>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query {}", path.display()))?;
    let file: QueryFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse query tree in {}", path.display()))?;
    Ok(file.into())
}

fn load_corpus(path: &Path) -> Result<Corpus> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse corpus {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => EngineConfig::from_env().context("Invalid QUARRY_* configuration"),
    }
}

fn compiler_args(opts: &QueryOpts) -> Result<Args> {
    let inputs = SearchInputs {
        pattern_type: opts.pattern_type.into(),
        protocol: if opts.streaming {
            Protocol::Streaming
        } else {
            Protocol::Batch
        },
        hosted: opts.hosted,
        sub_repo_perms: opts.sub_repo_perms,
        ..Default::default()
    };
    Ok(Args::new(inputs, load_config(opts.config.as_deref())?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Plan { query } => cmd_plan(&query),
        Commands::Search {
            query,
            corpus,
            format,
            searcher_urls,
        } => {
            let endpoints = match searcher_urls {
                Some(list) => SearcherEndpoints::parse(&list),
                None => SearcherEndpoints::from_env(),
            };
            cmd_search(&query, &corpus, endpoints, format).await
        }
    }
}

/// Compile and print the job tree
fn cmd_plan(opts: &QueryOpts) -> Result<()> {
    let nodes = load_query(&opts.query)?;
    let args = compiler_args(opts)?;
    let job = compile(&nodes, &args).context("Failed to compile query")?;
    println!("{}", pretty(job.as_ref()));
    Ok(())
}

/// Run the query against the corpus and print what it found
async fn cmd_search(
    opts: &QueryOpts,
    corpus: &Path,
    endpoints: SearcherEndpoints,
    format: Format,
) -> Result<()> {
    let nodes = load_query(&opts.query)?;
    let args = compiler_args(opts)?;
    let job = compile(&nodes, &args).context("Failed to compile query")?;

    let clients = build_clients(load_corpus(corpus)?, endpoints)?;
    let ctx = SearchContext::background();
    info!(search_id = %ctx.search_id(), "running search");

    if opts.streaming && format == Format::Text {
        let (mut rx, handle) = execute_streaming(job, ctx, clients);
        let mut count = 0;
        while let Some(event) = rx.recv().await {
            for m in &event.results {
                println!("{}", render_match(m));
            }
            count += event.results.len();
        }
        let alert = handle
            .await
            .context("Search task panicked")?
            .context("Search failed")?;
        print_summary(count, alert.as_ref());
        return Ok(());
    }

    let outcome = collect(&job, &ctx, &clients)
        .await
        .context("Search failed")?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        Format::Text => print_outcome(&outcome),
    }
    Ok(())
}

/// In-memory backends for the corpus, with unindexed search sent to the
/// matcher service when endpoints are configured.
fn build_clients(corpus: Corpus, endpoints: SearcherEndpoints) -> Result<Clients> {
    let clients = Clients::from_memory(Arc::new(MemoryBackend::from_corpus(corpus)));
    if endpoints.urls().is_empty() {
        return Ok(clients);
    }
    info!(endpoints = endpoints.urls().len(), "using matcher service for unindexed search");
    let searcher = HttpSearcher::new(endpoints).context("Failed to build matcher client")?;
    Ok(clients.with_searcher(Arc::new(searcher)))
}

fn render_match(m: &Match) -> String {
    match m {
        Match::Repo(r) => match &r.rev {
            Some(rev) => format!("repo   {}@{rev}", r.repo.name),
            None => format!("repo   {}", r.repo.name),
        },
        Match::File(f) => {
            let mut out = format!("file   {} {}", f.repo.name, f.path);
            for line in &f.line_matches {
                out.push_str(&format!("\n  {:>5}: {}", line.line_number + 1, line.preview));
            }
            for sym in &f.symbols {
                out.push_str(&format!("\n  {:>5}: {} ({})", sym.line + 1, sym.name, sym.kind));
            }
            out
        }
        Match::Commit(c) => {
            let short = c.oid.get(..7).unwrap_or(&c.oid);
            let subject = c.message.lines().next().unwrap_or_default();
            format!("commit {} {short} {} {subject}", c.repo.name, c.author.name)
        }
    }
}

fn print_summary(count: usize, alert: Option<&Alert>) {
    println!();
    println!("{count} results");
    if let Some(alert) = alert {
        println!("alert: {}", alert.title);
        println!("       {}", alert.description);
    }
}

fn print_outcome(outcome: &SearchOutcome) {
    for m in &outcome.results {
        println!("{}", render_match(m));
    }
    print_summary(outcome.results.len(), outcome.alert.as_ref());
    if outcome.stats.is_limit_hit {
        println!("(result limit reached)");
    }
}
