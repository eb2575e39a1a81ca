//! Storage-facing interfaces used by the execution engine
//!
//! The engine never reads documents directly. Index scans go through
//! [`Index::scan`], which pushes [`IndexEntry`] values into an
//! [`IndexConnection`] and closes the stream by dropping the connection.
//! The consumer aborts a scan by dropping its receiving end; backends
//! observe that through [`IndexConnection::is_stopped`] or a failed send.

mod errors;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::execution::{Context, ExecutionError};
use crate::plan::Inclusion;
use crate::timestamp::ScanVector;

pub use errors::{DatastoreError, DatastoreResult};
pub use memory::{MemoryDatastore, MemoryIndex};

/// One index entry: index-key values plus the document's primary key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub entry_key: Vec<Value>,
    pub primary_key: String,
}

/// A span with its bound expressions evaluated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSpan {
    pub seek: Option<Vec<Value>>,
    pub low: Vec<Value>,
    pub high: Vec<Value>,
    pub inclusion: Inclusion,
}

/// Consistency a scan must observe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanConsistency {
    /// Whatever the index currently holds
    #[default]
    NotBounded,
    /// At least the request's scan vector
    AtPlus,
    /// Everything committed before the scan started
    ScanPlus,
}

/// Storage-facing end of an index scan stream
pub struct IndexConnection {
    entries: mpsc::Sender<IndexEntry>,
    context: Arc<Context>,
    index: String,
}

impl IndexConnection {
    /// Creates a connection and the receiving end of its entry stream.
    pub fn new(
        context: Arc<Context>,
        index: &str,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<IndexEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                entries: tx,
                context,
                index: index.to_string(),
            },
            rx,
        )
    }

    /// Sends one entry, waiting for queue space.
    ///
    /// Returns false once the consumer has stopped.
    pub async fn send_entry(&self, entry: IndexEntry) -> bool {
        self.entries.send(entry).await.is_ok()
    }

    /// Whether the consumer has closed its end
    pub fn is_stopped(&self) -> bool {
        self.entries.is_closed()
    }

    /// Resolves once the consumer has closed its end.
    pub async fn stopped(&self) {
        self.entries.closed().await
    }

    /// Reports a backend failure for this scan.
    pub fn error(&self, error: DatastoreError) {
        self.context.error(ExecutionError::Backend {
            index: self.index.clone(),
            message: error.to_string(),
        });
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }
}

/// A secondary index
#[async_trait]
pub trait Index: Send + Sync {
    fn name(&self) -> &str;

    /// Streams the entries in `span` into `conn`, then drops it.
    ///
    /// `limit` of `None` is unbounded.
    #[allow(clippy::too_many_arguments)]
    async fn scan(
        &self,
        request_id: Uuid,
        span: ResolvedSpan,
        distinct: bool,
        limit: Option<usize>,
        consistency: ScanConsistency,
        vector: Option<ScanVector>,
        conn: IndexConnection,
    );

    /// Removes the index from its keyspace.
    async fn drop_index(&self) -> DatastoreResult<()>;
}

/// Index lookup by keyspace
pub trait Datastore: Send + Sync {
    fn index(&self, namespace: &str, keyspace: &str, name: &str) -> Option<Arc<dyn Index>>;
}
