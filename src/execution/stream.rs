//! Stream: terminal stage feeding the request's result channel

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::base::{operator_links, run_consumer, Base, Consumer, Operator, RowSink};
use super::batch::{BatchFlush, Batcher, PooledBatch};
use super::context::Context;
use super::phase::Phase;
use crate::value::{AnnotatedValue, ParentValue};

/// Result channel handle that counts what it streams
pub(crate) struct ResultFeed {
    sender: mpsc::Sender<PooledBatch>,
}

impl ResultFeed {
    pub(crate) fn new(sender: mpsc::Sender<PooledBatch>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl BatchFlush for ResultFeed {
    async fn flush_batch(&mut self, batch: PooledBatch, context: &Context) -> bool {
        let rows = batch.len() as u64;
        if self.sender.send(batch).await.is_err() {
            return false;
        }
        context.add_phase_count(Phase::Stream, rows);
        true
    }
}

/// Batches rows into the result channel; without one, rows pass through.
#[derive(Default)]
pub struct Stream {
    base: Base,
    batcher: Batcher,
    feed: Option<ResultFeed>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Operator for Stream {
    fn name(&self) -> &'static str {
        "Stream"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self::new())
    }

    async fn run_once(
        &mut self,
        context: &Arc<Context>,
        parent: &ParentValue,
        output: &mut dyn RowSink,
    ) {
        run_consumer(self, context, parent, output).await
    }
}

#[async_trait]
impl Consumer for Stream {
    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    async fn before_items(&mut self, context: &Arc<Context>, _parent: &ParentValue) -> bool {
        context.add_phase_operator(Phase::Stream);
        self.feed = context.result_sender().map(ResultFeed::new);
        true
    }

    async fn process_item(
        &mut self,
        item: AnnotatedValue,
        context: &Arc<Context>,
        output: &mut dyn RowSink,
    ) -> bool {
        match self.feed.as_mut() {
            Some(feed) => self.batcher.enbatch(item, feed, context).await,
            None => output.item(item, context).await,
        }
    }

    async fn after_items(&mut self, context: &Arc<Context>, _output: &mut dyn RowSink) {
        if let Some(mut feed) = self.feed.take() {
            self.batcher.flush(&mut feed, context).await;
        }
    }
}
