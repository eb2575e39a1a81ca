//! Execution engine
//!
//! Turns a physical plan into a tree of push/pull operators and runs it.
//!
//! # Layout
//!
//! - `base`: operator contract, consumer lifecycle, one-shot latch
//! - `context`: per-request state (error sink, phases, result channel)
//! - `batch`: pooled row batches and the pipeline sizing knobs
//! - `build`: plan tree to operator tree
//! - `driver`: pull interface over a running request
//! - one module per operator
//!
//! # Failure model
//!
//! Row-local failures are recorded in the context and stop the operator
//! that hit them. Invariant failures are fatal and abort the request.
//! The driver decides the request's status once the pipeline is done;
//! rows already streamed are never retracted.

mod authorize;
mod base;
pub mod batch;
mod build;
mod context;
mod driver;
mod dummy_scan;
mod errors;
mod filter;
mod index_drop;
mod limit;
mod parallel;
mod phase;
mod project;
mod scan_index;
mod sequence;
mod stream;

#[cfg(test)]
pub(crate) mod test_support;

pub use authorize::Authorize;
pub use base::{require_key, Base, Operator, RowSink};
pub use batch::{
    batch_pool, batch_queue_capacity, pipeline_batch_size, pipeline_cap, set_pipeline_batch,
    set_pipeline_cap, BatchFlush, BatchPool, Batcher, PooledBatch, DEFAULT_BATCH_SIZE,
    DEFAULT_PIPELINE_CAP,
};
pub use build::build;
pub use context::{AllowAll, Authorizer, Context, ContextBuilder};
pub use driver::{execute, QueryOutcome, QueryResult, QueryStatus, ResultStream};
pub use dummy_scan::{DummyScan, Prepare};
pub use errors::{ExecutionError, ExecutionResult, Severity};
pub use filter::Filter;
pub use index_drop::DropIndex;
pub use limit::Limit;
pub use parallel::Parallel;
pub use phase::{Phase, PhaseCounts, PhaseSnapshot, PhaseStats};
pub use project::{FinalProject, InitialProject, PROJECTION};
pub use scan_index::IndexScan;
pub use sequence::Sequence;
pub use stream::Stream;
