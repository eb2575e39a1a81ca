//! Request driver: pull interface over a running pipeline
//!
//! [`ResultStream::start`] builds the pipeline and spawns its root. Rows
//! arrive in batches on the request's result channel, either from a
//! `Stream` stage or, when the plan has none, from the root's own sink.
//! [`ResultStream::next`] yields them one at a time and stops early once a
//! fatal error has been recorded. [`ResultStream::finish`] stops the
//! pipeline if it is still running and reports the outcome.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::base::{Operator, RowSink};
use super::batch::{batch_queue_capacity, Batcher, PooledBatch};
use super::build::build;
use super::context::{Context, ContextBuilder};
use super::errors::ExecutionError;
use super::phase::PhaseSnapshot;
use crate::observability::{Event, Logger, ObservationScope, Severity};
use crate::plan::PlanNode;
use crate::value::{AnnotatedValue, ParentValue};

/// Final status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// No errors recorded
    Success,
    /// At least one error recorded; rows already streamed are kept
    Errors,
}

/// Summary of a finished request
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub request_id: String,
    pub status: QueryStatus,
    pub errors: Vec<ExecutionError>,
    pub result_count: usize,
    pub phases: PhaseSnapshot,
    pub elapsed_ms: u64,
}

/// Every row of a request plus its outcome
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    #[serde(flatten)]
    pub outcome: QueryOutcome,
}

/// Sink under the root operator; batches rows into the result channel
struct RootSink {
    batcher: Batcher,
    results: Option<mpsc::Sender<PooledBatch>>,
}

#[async_trait]
impl RowSink for RootSink {
    async fn item(&mut self, item: AnnotatedValue, context: &Arc<Context>) -> bool {
        match self.results.as_mut() {
            Some(results) => self.batcher.enbatch(item, results, context).await,
            None => {
                item.release();
                false
            }
        }
    }
}

async fn run_root(mut root: Box<dyn Operator>, context: Arc<Context>) {
    let mut sink = RootSink {
        batcher: Batcher::new(),
        results: context.result_sender(),
    };
    root.run_once(&context, &ParentValue::none(), &mut sink).await;
    if let Some(results) = sink.results.as_mut() {
        sink.batcher.flush(results, &context).await;
    }
}

/// A running request
pub struct ResultStream {
    context: Arc<Context>,
    results: mpsc::Receiver<PooledBatch>,
    pending: VecDeque<AnnotatedValue>,
    handle: Option<JoinHandle<()>>,
    streamed: usize,
    scope: ObservationScope,
}

impl ResultStream {
    /// Builds `plan` and starts running it.
    ///
    /// A build failure is recorded in the context; the stream is then
    /// empty and `finish` reports the error.
    pub fn start(plan: &PlanNode, builder: ContextBuilder) -> Self {
        let (tx, rx) = mpsc::channel(batch_queue_capacity());
        let context = builder.results(tx).build();

        let request_id = context.request_id().to_string();
        Logger::event(
            Severity::Info,
            Event::RequestBegin,
            &[("request_id", request_id.as_str()), ("root", plan.name())],
        );
        let scope = ObservationScope::with_fields("REQUEST", &[("request_id", request_id.as_str())]);

        let handle = match build(plan, &context) {
            Ok(root) => {
                let ctx = Arc::clone(&context);
                Some(tokio::spawn(async move {
                    let run = tokio::spawn(run_root(root, Arc::clone(&ctx)));
                    if let Err(e) = run.await {
                        ctx.recover(e);
                    }
                    ctx.close_results();
                }))
            }
            Err(e) => {
                context.error(e);
                context.close_results();
                None
            }
        };

        Self {
            context,
            results: rx,
            pending: VecDeque::new(),
            handle,
            streamed: 0,
            scope,
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Next result row; None once exhausted or aborted.
    pub async fn next(&mut self) -> Option<Value> {
        loop {
            if self.context.is_aborted() {
                return None;
            }
            if let Some(item) = self.pending.pop_front() {
                self.streamed += 1;
                return Some(item.into_value());
            }
            let mut batch = self.results.recv().await?;
            self.pending.extend(batch.drain());
        }
    }

    /// Stops the pipeline if still running and reports the outcome.
    pub async fn finish(mut self) -> QueryOutcome {
        self.results.close();
        while self.results.recv().await.is_some() {}
        self.pending.clear();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                self.context.recover(e);
            }
        }

        let errors = self.context.errors();
        let status = if errors.is_empty() {
            QueryStatus::Success
        } else {
            QueryStatus::Errors
        };
        let elapsed_ms = u64::try_from(self.context.elapsed().as_millis()).unwrap_or(u64::MAX);
        let outcome = QueryOutcome {
            request_id: self.context.request_id().to_string(),
            status,
            errors,
            result_count: self.streamed,
            phases: self.context.phases().snapshot(),
            elapsed_ms,
        };

        let rows = outcome.result_count.to_string();
        let error_count = outcome.errors.len().to_string();
        match outcome.status {
            QueryStatus::Success => self
                .scope
                .complete_with_fields(&[("rows", rows.as_str())]),
            QueryStatus::Errors => self.scope.complete_with_fields(&[
                ("errors", error_count.as_str()),
                ("rows", rows.as_str()),
            ]),
        }
        outcome
    }
}

/// Runs `plan` to completion, collecting every row.
pub async fn execute(plan: &PlanNode, builder: ContextBuilder) -> QueryResult {
    let mut stream = ResultStream::start(plan, builder);
    let mut rows = Vec::new();
    while let Some(row) = stream.next().await {
        rows.push(row);
    }
    let outcome = stream.finish().await;
    QueryResult { rows, outcome }
}
