//! Parallel: fans a subtree out over worker tasks
//!
//! ```text
//!   input ──► [input queue] ──► worker 0: child ──┐
//!                          ├──► worker 1: copy  ──┼──► [output queue] ──► merge ──► output
//!                          └──► worker n: copy  ──┘
//! ```
//!
//! - Both queues are bounded by the pipeline cap.
//! - Rows are merged first-arrived-first-forwarded; order across workers
//!   is not preserved.
//! - When the output stops accepting, the merge loop drops the output
//!   queue. Workers see it close, whether sending or waiting for input,
//!   and unwind; once every worker has released the input queue the
//!   upstream driver sees its own sends fail and stops.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex};

use super::base::{operator_links, Base, Operator, RowSink};
use super::batch::pipeline_cap;
use super::context::Context;
use crate::plan;
use crate::value::{AnnotatedValue, ParentValue};

type SharedReceiver = Arc<Mutex<mpsc::Receiver<AnnotatedValue>>>;

/// Worker-side source draining the shared input queue.
///
/// Stops as soon as the merged output queue closes, even when the
/// worker's subtree has not tried to send anything since.
struct QueueSource {
    base: Base,
    queue: SharedReceiver,
    merged: mpsc::Sender<AnnotatedValue>,
}

impl QueueSource {
    fn new(queue: SharedReceiver, merged: mpsc::Sender<AnnotatedValue>) -> Self {
        Self {
            base: Base::new(),
            queue,
            merged,
        }
    }
}

#[async_trait]
impl Operator for QueueSource {
    fn name(&self) -> &'static str {
        "QueueSource"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self::new(Arc::clone(&self.queue), self.merged.clone()))
    }

    async fn run_once(
        &mut self,
        context: &Arc<Context>,
        _parent: &ParentValue,
        output: &mut dyn RowSink,
    ) {
        if !self.base.begin_once(self.name()) {
            return;
        }
        loop {
            let next = tokio::select! {
                next = async { self.queue.lock().await.recv().await } => next,
                () = self.merged.closed() => None,
            };
            let Some(item) = next else {
                break;
            };
            if !output.item(item, context).await {
                break;
            }
        }
    }
}

/// Sink pushing rows into a bounded queue; false once the queue closed
struct QueueSink {
    queue: mpsc::Sender<AnnotatedValue>,
}

#[async_trait]
impl RowSink for QueueSink {
    async fn item(&mut self, item: AnnotatedValue, _context: &Arc<Context>) -> bool {
        self.queue.send(item).await.is_ok()
    }
}

pub struct Parallel {
    base: Base,
    plan: Arc<plan::Parallel>,
    child: Option<Box<dyn Operator>>,
    degree: usize,
}

impl Parallel {
    /// `degree` is the negotiated worker count.
    pub fn new(plan: Arc<plan::Parallel>, child: Box<dyn Operator>, degree: usize) -> Self {
        Self {
            base: Base::new(),
            plan,
            child: Some(child),
            degree: degree.max(1),
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

#[async_trait]
impl Operator for Parallel {
    fn name(&self) -> &'static str {
        "Parallel"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.copy(),
            plan: Arc::clone(&self.plan),
            child: self.child.as_ref().map(|child| child.copy()),
            degree: self.degree,
        })
    }

    async fn run_once(
        &mut self,
        context: &Arc<Context>,
        parent: &ParentValue,
        output: &mut dyn RowSink,
    ) {
        if !self.base.begin_once(self.name()) {
            return;
        }
        let Some(first) = self.child.take() else {
            return;
        };

        let (input_tx, input_rx) = mpsc::channel::<AnnotatedValue>(pipeline_cap());
        let (output_tx, output_rx) = mpsc::channel::<AnnotatedValue>(pipeline_cap());
        let shared: SharedReceiver = Arc::new(Mutex::new(input_rx));

        let mut children = Vec::with_capacity(self.degree);
        children.push(first);
        for _ in 1..self.degree {
            let copy = children[0].copy();
            children.push(copy);
        }

        let workers: Vec<_> = children
            .into_iter()
            .map(|mut child| {
                let context = Arc::clone(context);
                let parent = parent.clone();
                let source = QueueSource::new(Arc::clone(&shared), output_tx.clone());
                let mut sink = QueueSink {
                    queue: output_tx.clone(),
                };
                tokio::spawn(async move {
                    child.set_input(Some(Box::new(source)));
                    child.run_once(&context, &parent, &mut sink).await;
                    child.set_input(None);
                    child
                })
            })
            .collect();
        drop(shared);
        drop(output_tx);

        let mut input = self.base.take_input();
        let feed = async {
            let mut sink = QueueSink { queue: input_tx };
            if let Some(upstream) = input.as_mut() {
                upstream.run_once(context, parent, &mut sink).await;
            }
            drop(sink);

            let mut restored = None;
            for finished in join_all(workers).await {
                match finished {
                    Ok(child) => {
                        if restored.is_none() {
                            restored = Some(child);
                        }
                    }
                    Err(e) => context.recover(e),
                }
            }
            restored
        };

        let merge = async {
            let mut output_rx = output_rx;
            while let Some(item) = output_rx.recv().await {
                if !output.item(item, context).await {
                    break;
                }
            }
        };

        let (restored, ()) = tokio::join!(feed, merge);
        self.child = restored;
        self.base.set_input(input);
    }
}
