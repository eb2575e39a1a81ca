//! Operator contract and shared plumbing
//!
//! Every execution stage is an [`Operator`]. Rows move by push:
//! [`RowSink::item`] hands one row downstream and returns whether the
//! receiver wants more. `false` is the only stop signal. Each stage
//! returns what its own output returned, so a satisfied LIMIT unwinds
//! the chain row by row without any cancellation token.
//!
//! Execution is pull-started: [`Operator::run_once`] on the tail of a
//! chain runs its input, which runs its own input, down to a source.
//! The output link is passed in at run time; a consumer hands its input
//! a sink that routes rows back through itself.
//!
//! # Consumer lifecycle
//!
//! Stages that pull from an input and push to an output implement
//! [`Consumer`] and run through [`run_consumer`]:
//!
//! 1. skipped entirely if the stage writes and the request is readonly
//! 2. `before_items`; `false` ends the run before the input is started
//! 3. the input is run once, every row going through `process_item`
//! 4. `after_items`, always
//!
//! # One-shot
//!
//! An operator instance runs at most once. A second `run_once` is logged
//! and ignored. `&mut self` rules out concurrent re-entry.

use std::sync::Arc;

use async_trait::async_trait;

use super::context::Context;
use super::errors::ExecutionError;
use crate::observability::{Event, Logger, Severity};
use crate::value::{AnnotatedValue, ParentValue};

/// Receiver of pushed rows
#[async_trait]
pub trait RowSink: Send {
    /// Delivers one row. False means stop producing.
    async fn item(&mut self, item: AnnotatedValue, context: &Arc<Context>) -> bool;
}

/// An executable pipeline stage
#[async_trait]
pub trait Operator: Send {
    fn name(&self) -> &'static str;

    fn input(&self) -> Option<&dyn Operator>;

    fn set_input(&mut self, input: Option<Box<dyn Operator>>);

    fn take_input(&mut self) -> Option<Box<dyn Operator>>;

    /// A fresh, not-yet-run instance sharing this one's plan.
    ///
    /// Owned children are copied too; the input link is not.
    fn copy(&self) -> Box<dyn Operator>;

    /// False for stages that mutate the datastore
    fn readonly(&self) -> bool {
        true
    }

    /// Runs this stage, pushing its rows into `output`.
    async fn run_once(
        &mut self,
        context: &Arc<Context>,
        parent: &ParentValue,
        output: &mut dyn RowSink,
    );
}

/// State every operator embeds: the input link and the one-shot latch
#[derive(Default)]
pub struct Base {
    input: Option<Box<dyn Operator>>,
    executed: bool,
}

impl Base {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> Option<&dyn Operator> {
        self.input.as_deref()
    }

    pub fn set_input(&mut self, input: Option<Box<dyn Operator>>) {
        self.input = input;
    }

    pub fn take_input(&mut self) -> Option<Box<dyn Operator>> {
        self.input.take()
    }

    /// Base for a copy: unlinked and not yet run.
    pub fn copy(&self) -> Self {
        Self::default()
    }

    pub fn has_run(&self) -> bool {
        self.executed
    }

    /// Trips the one-shot latch. False if this instance already ran.
    pub fn begin_once(&mut self, name: &str) -> bool {
        if self.executed {
            Logger::event(Severity::Warn, Event::OperatorRerun, &[("operator", name)]);
            return false;
        }
        self.executed = true;
        true
    }
}

/// Implements the link accessors of [`Operator`] over a `base` field.
macro_rules! operator_links {
    () => {
        fn input(&self) -> Option<&dyn $crate::execution::Operator> {
            self.base.input()
        }

        fn set_input(&mut self, input: Option<Box<dyn $crate::execution::Operator>>) {
            self.base.set_input(input);
        }

        fn take_input(&mut self) -> Option<Box<dyn $crate::execution::Operator>> {
            self.base.take_input()
        }
    };
}
pub(crate) use operator_links;

/// A stage that pulls rows from its input and pushes them onward
#[async_trait]
pub(crate) trait Consumer: Operator {
    fn base_mut(&mut self) -> &mut Base;

    async fn before_items(&mut self, _context: &Arc<Context>, _parent: &ParentValue) -> bool {
        true
    }

    /// Handles one input row. False stops the input.
    async fn process_item(
        &mut self,
        item: AnnotatedValue,
        context: &Arc<Context>,
        output: &mut dyn RowSink,
    ) -> bool;

    async fn after_items(&mut self, _context: &Arc<Context>, _output: &mut dyn RowSink) {}
}

/// Routes the input's rows through a consumer into the final output
struct ConsumerSink<'a, C: ?Sized> {
    consumer: &'a mut C,
    output: &'a mut dyn RowSink,
}

#[async_trait]
impl<C: Consumer + ?Sized> RowSink for ConsumerSink<'_, C> {
    async fn item(&mut self, item: AnnotatedValue, context: &Arc<Context>) -> bool {
        self.consumer
            .process_item(item, context, &mut *self.output)
            .await
    }
}

/// Runs a consumer through its lifecycle.
pub(crate) async fn run_consumer<C: Consumer + ?Sized>(
    consumer: &mut C,
    context: &Arc<Context>,
    parent: &ParentValue,
    output: &mut dyn RowSink,
) {
    let name = consumer.name();
    if !consumer.base_mut().begin_once(name) {
        return;
    }

    if context.readonly() && !consumer.readonly() {
        Logger::event(Severity::Info, Event::OperatorSkipped, &[("operator", name)]);
        return;
    }

    if consumer.before_items(context, parent).await {
        if let Some(mut input) = consumer.base_mut().take_input() {
            {
                let mut sink = ConsumerSink {
                    consumer: &mut *consumer,
                    output: &mut *output,
                };
                input.run_once(context, parent, &mut sink).await;
            }
            consumer.base_mut().set_input(Some(input));
        }
    }

    consumer.after_items(context, output).await;
}

/// Extracts the primary key from a row's `meta` attachment.
///
/// Reports an invalid-value error and returns None when the row has no
/// meta, no id, or a non-string id.
pub fn require_key(item: &AnnotatedValue, context: &Context) -> Option<String> {
    let Some(meta) = item.attachment("meta") else {
        context.error(ExecutionError::InvalidValue(
            "value does not have a meta attachment".to_string(),
        ));
        return None;
    };

    match meta.get("id") {
        None => {
            context.error(ExecutionError::InvalidValue(
                "meta attachment does not have an id".to_string(),
            ));
            None
        }
        Some(serde_json::Value::String(key)) => Some(key.clone()),
        Some(other) => {
            context.error(ExecutionError::InvalidValue(format!(
                "meta id is not a string: {}",
                other
            )));
            None
        }
    }
}
