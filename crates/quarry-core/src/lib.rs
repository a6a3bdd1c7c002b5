//! Quarry search engine
//!
//! Compiles a parsed search query into a tree of composable jobs and runs
//! it against the backends in `quarry_backend`, streaming results as they
//! are found.
//!
//! ```ignore
//! let job = quarry_core::compile(&nodes, &Args::default())?;
//! let outcome = quarry_core::collect(&job, &SearchContext::background(), &clients).await?;
//! ```

pub mod alert;
pub mod clients;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod execute;
pub mod job;
pub mod metrics;
pub mod obs;
pub mod query;
pub mod result;
pub mod streaming;
pub mod telemetry;

pub use alert::{max_alert, Alert};
pub use clients::Clients;
pub use compiler::{
    compile, from_expanded_plan, to_evaluate_job, to_search_job, Args, SearchInputs,
    StrategyFlags, UserSettings,
};
pub use config::{ConfigError, EngineConfig};
pub use context::SearchContext;
pub use error::{CompileError, SearchError, SearchResult};
pub use execute::{collect, execute, execute_streaming, SearchOutcome};
pub use job::printer::{pretty, sexp};
pub use job::{Job, JobRef, JobResult};
pub use query::{Basic, Node, OperatorKind, Parameter, Pattern, Plan, Protocol, SearchType};
pub use result::{Match, MatchKey, ResultTypes, SelectPath};
pub use streaming::{ChannelSender, CollectingSender, SearchEvent, Sender, SharedSender, Stats};
