//! Ingestion decision pipeline.
//!
//! Every run flows through:
//! 1. `build_query()` — request + clock → provider search query
//! 2. `SearchClient::search()` / `ThreadFetcher::fetch_thread()` — retrieval
//! 3. `FilterPipeline::decide()` — sender and thread-position checks
//! 4. `Ledger` check, then `Dispatcher::dispatch()` and the ledger commit
//!
//! `IngestionRunner::run_once()` is the single entry point; scheduling lives
//! outside the pipeline.

pub mod dispatcher;
pub mod filter;
pub mod query;
pub mod runner;
pub mod types;

pub use dispatcher::Dispatcher;
pub use filter::FilterPipeline;
pub use query::build_query;
pub use runner::IngestionRunner;
pub use types::{
    Clock, DEFAULT_GRAPH_NAME, Decision, FixedClock, IngestionRequest, RunReport, SkipReason,
    SystemClock,
};
