//! Per-request execution context
//!
//! One context is created per request and shared (`Arc`) by every
//! operator and task of its pipeline. Everything mutable in it is safe to
//! touch from many tasks at once:
//!
//! - the error sink, appended to by any producer
//! - the abort flag, raised by the first fatal error
//! - phase counters (atomics)
//!
//! The rest is fixed at construction through [`ContextBuilder`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use uuid::Uuid;

use super::batch::PooledBatch;
use super::errors::ExecutionError;
use super::phase::{Phase, PhaseStats};
use crate::datastore::{Datastore, ScanConsistency};
use crate::expression::EvalContext;
use crate::observability::{Event, Logger, Severity};
use crate::plan::Privilege;
use crate::timestamp::{ScanVectorSource, ZeroVectorSource};

/// Checks a request's privileges.
pub trait Authorizer: Send + Sync {
    /// Err carries the reason for denial.
    fn authorize(&self, privileges: &[Privilege]) -> Result<(), String>;
}

/// Grants everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _privileges: &[Privilege]) -> Result<(), String> {
        Ok(())
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Builds a [`Context`]
pub struct ContextBuilder {
    request_id: Uuid,
    datastore: Arc<dyn Datastore>,
    readonly: bool,
    max_parallelism: usize,
    scan_consistency: ScanConsistency,
    vector_source: Arc<dyn ScanVectorSource>,
    named_args: HashMap<String, Value>,
    authorizer: Arc<dyn Authorizer>,
    results: Option<mpsc::Sender<PooledBatch>>,
}

impl ContextBuilder {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            datastore,
            readonly: false,
            max_parallelism: default_parallelism(),
            scan_consistency: ScanConsistency::NotBounded,
            vector_source: Arc::new(ZeroVectorSource),
            named_args: HashMap::new(),
            authorizer: Arc::new(AllowAll),
            results: None,
        }
    }

    pub fn request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Parallelism budget; 0 means the number of available cores.
    pub fn max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = if max_parallelism == 0 {
            default_parallelism()
        } else {
            max_parallelism
        };
        self
    }

    pub fn scan_consistency(mut self, consistency: ScanConsistency) -> Self {
        self.scan_consistency = consistency;
        self
    }

    pub fn vector_source(mut self, source: Arc<dyn ScanVectorSource>) -> Self {
        self.vector_source = source;
        self
    }

    pub fn named_arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.named_args.insert(name.into(), value);
        self
    }

    pub fn named_args(mut self, args: HashMap<String, Value>) -> Self {
        self.named_args.extend(args);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Channel the terminal stage streams result batches into.
    pub fn results(mut self, results: mpsc::Sender<PooledBatch>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn build(self) -> Arc<Context> {
        Arc::new(Context {
            request_id: self.request_id,
            datastore: self.datastore,
            readonly: self.readonly,
            max_parallelism: self.max_parallelism.max(1),
            scan_consistency: self.scan_consistency,
            vector_source: self.vector_source,
            named_args: self.named_args,
            authorizer: self.authorizer,
            errors: Mutex::new(Vec::new()),
            aborted: AtomicBool::new(false),
            phases: PhaseStats::new(),
            started_at: Instant::now(),
            results: Mutex::new(self.results),
        })
    }
}

/// Shared state of one request
pub struct Context {
    request_id: Uuid,
    datastore: Arc<dyn Datastore>,
    readonly: bool,
    max_parallelism: usize,
    scan_consistency: ScanConsistency,
    vector_source: Arc<dyn ScanVectorSource>,
    named_args: HashMap<String, Value>,
    authorizer: Arc<dyn Authorizer>,
    errors: Mutex<Vec<ExecutionError>>,
    aborted: AtomicBool,
    phases: PhaseStats,
    started_at: Instant,
    results: Mutex<Option<mpsc::Sender<PooledBatch>>>,
}

impl Context {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.datastore
    }

    /// Write operators no-op when set
    pub fn readonly(&self) -> bool {
        self.readonly
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    pub fn scan_consistency(&self) -> ScanConsistency {
        self.scan_consistency
    }

    pub fn vector_source(&self) -> &Arc<dyn ScanVectorSource> {
        &self.vector_source
    }

    pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
        &self.authorizer
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    // ==================
    // Error sink
    // ==================

    /// Records an error; a fatal one aborts the request.
    pub fn error(&self, error: ExecutionError) {
        let request_id = self.request_id.to_string();
        let message = error.to_string();
        let severity = if error.is_fatal() {
            Severity::Fatal
        } else {
            Severity::Error
        };
        Logger::event(
            severity,
            Event::ExecutionError,
            &[
                ("code", error.code()),
                ("message", message.as_str()),
                ("request_id", request_id.as_str()),
            ],
        );

        if error.is_fatal() {
            self.aborted.store(true, Ordering::Release);
        }
        self.errors.lock().push(error);
    }

    /// Records a failed task as a fatal internal error.
    pub fn recover(&self, failure: JoinError) {
        let reason = if failure.is_panic() {
            let payload = failure.into_panic();
            if let Some(message) = payload.downcast_ref::<&str>() {
                message.to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "unknown panic payload".to_string()
            }
        } else {
            "task cancelled".to_string()
        };

        let request_id = self.request_id.to_string();
        Logger::event(
            Severity::Fatal,
            Event::TaskPanicked,
            &[("reason", reason.as_str()), ("request_id", request_id.as_str())],
        );
        self.error(ExecutionError::Internal(format!("task failed: {}", reason)));
    }

    /// Snapshot of the recorded errors
    pub fn errors(&self) -> Vec<ExecutionError> {
        self.errors.lock().clone()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    /// Whether a fatal error has been recorded
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    // ==================
    // Phase statistics
    // ==================

    pub fn add_phase_count(&self, phase: Phase, count: u64) {
        self.phases.add_count(phase, count);
    }

    pub fn add_phase_operator(&self, phase: Phase) {
        self.phases.add_operator(phase);
    }

    pub fn phases(&self) -> &PhaseStats {
        &self.phases
    }

    // ==================
    // Result channel
    // ==================

    /// A handle on the result channel, if the request has one.
    pub fn result_sender(&self) -> Option<mpsc::Sender<PooledBatch>> {
        self.results.lock().clone()
    }

    /// Drops the context's own handle on the result channel.
    ///
    /// The channel closes once every stage holding a handle finishes.
    pub fn close_results(&self) {
        self.results.lock().take();
    }
}

impl EvalContext for Context {
    fn named_arg(&self, name: &str) -> Option<&Value> {
        self.named_args.get(name)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("readonly", &self.readonly)
            .field("max_parallelism", &self.max_parallelism)
            .field("scan_consistency", &self.scan_consistency)
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}
