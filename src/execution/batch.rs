//! Row batches and pipeline sizing knobs
//!
//! Two process-wide knobs, adjustable while requests are running:
//!
//! - pipeline cap: ceiling on rows in flight between two tasks (default 512)
//! - pipeline batch: capacity of pooled row batches (default 64)
//!
//! Changes apply to queues and batches created afterwards. A batch keeps
//! the capacity of the pool it was checked out of and returns there when
//! dropped. Operators batching at their own size draw from a pool kept
//! per size.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::Context;
use crate::value::AnnotatedValue;

/// Default ceiling on in-flight rows per queue
pub const DEFAULT_PIPELINE_CAP: usize = 512;

/// Default batch capacity
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Free batches kept per pool
const MAX_RETAINED_BATCHES: usize = 1024;

/// Distinct non-default batch sizes that get a shared pool
const MAX_SIZED_POOLS: usize = 16;

static PIPELINE_CAP: AtomicUsize = AtomicUsize::new(DEFAULT_PIPELINE_CAP);

static BATCH_POOL: LazyLock<RwLock<Arc<BatchPool>>> =
    LazyLock::new(|| RwLock::new(Arc::new(BatchPool::new(DEFAULT_BATCH_SIZE))));

/// Pools for operators batching at a size other than the pipeline batch
static SIZED_POOLS: LazyLock<Mutex<HashMap<usize, Arc<BatchPool>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Sets the in-flight row ceiling; 0 restores the default.
pub fn set_pipeline_cap(cap: usize) {
    let cap = if cap < 1 { DEFAULT_PIPELINE_CAP } else { cap };
    PIPELINE_CAP.store(cap, Ordering::Relaxed);
}

pub fn pipeline_cap() -> usize {
    PIPELINE_CAP.load(Ordering::Relaxed)
}

/// Swaps in a pool of the given batch size; 0 restores the default.
///
/// Batches already checked out keep their capacity.
pub fn set_pipeline_batch(size: usize) {
    let size = if size < 1 { DEFAULT_BATCH_SIZE } else { size };
    let mut pool = BATCH_POOL.write();
    if pool.size() != size {
        *pool = Arc::new(BatchPool::new(size));
    }
}

pub fn pipeline_batch_size() -> usize {
    BATCH_POOL.read().size()
}

/// The current process-wide batch pool
pub fn batch_pool() -> Arc<BatchPool> {
    BATCH_POOL.read().clone()
}

/// Batches of queued rows a channel may hold under the pipeline cap
pub fn batch_queue_capacity() -> usize {
    (pipeline_cap() / pipeline_batch_size()).max(1)
}

/// Free list of row vectors of one capacity
#[derive(Debug)]
pub struct BatchPool {
    size: usize,
    free: Mutex<Vec<Vec<AnnotatedValue>>>,
}

impl BatchPool {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Checks out an empty batch.
    pub fn get(self: &Arc<Self>) -> PooledBatch {
        let items = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.size));
        PooledBatch {
            items,
            pool: Arc::clone(self),
        }
    }

    fn put(&self, mut items: Vec<AnnotatedValue>) {
        items.clear();
        if items.capacity() < self.size {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < MAX_RETAINED_BATCHES {
            free.push(items);
        }
    }

    /// Number of batches held for reuse
    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }
}

/// A batch checked out of a [`BatchPool`]; returns to it on drop.
#[derive(Debug)]
pub struct PooledBatch {
    items: Vec<AnnotatedValue>,
    pool: Arc<BatchPool>,
}

impl PooledBatch {
    pub fn push(&mut self, item: AnnotatedValue) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Capacity of the pool this batch came from
    pub fn capacity(&self) -> usize {
        self.pool.size()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotatedValue> {
        self.items.iter()
    }

    /// Moves the rows out, keeping the buffer for the pool.
    pub fn drain(&mut self) -> std::vec::Drain<'_, AnnotatedValue> {
        self.items.drain(..)
    }
}

impl Drop for PooledBatch {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.items));
    }
}

/// Downstream target of a full batch
#[async_trait]
pub trait BatchFlush: Send {
    /// Hands a batch downstream. False means downstream stopped accepting.
    async fn flush_batch(&mut self, batch: PooledBatch, context: &Context) -> bool;
}

#[async_trait]
impl BatchFlush for mpsc::Sender<PooledBatch> {
    async fn flush_batch(&mut self, batch: PooledBatch, _context: &Context) -> bool {
        self.send(batch).await.is_ok()
    }
}

/// Shared pool for a batch size; past the size limit a fresh pool is
/// returned.
fn sized_pool(size: usize) -> Arc<BatchPool> {
    let mut pools = SIZED_POOLS.lock();
    if let Some(pool) = pools.get(&size) {
        return Arc::clone(pool);
    }
    let pool = Arc::new(BatchPool::new(size));
    if pools.len() < MAX_SIZED_POOLS {
        pools.insert(size, Arc::clone(&pool));
    }
    pool
}

fn allocate_batch(size: usize) -> PooledBatch {
    let pool = batch_pool();
    if pool.size() == size {
        pool.get()
    } else {
        sized_pool(size).get()
    }
}

/// An operator's current partially filled batch
#[derive(Debug, Default)]
pub struct Batcher {
    batch: Option<PooledBatch>,
}

impl Batcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row at the pipeline batch size.
    pub async fn enbatch<F>(&mut self, item: AnnotatedValue, target: &mut F, context: &Context) -> bool
    where
        F: BatchFlush + ?Sized,
    {
        self.enbatch_size(item, target, pipeline_batch_size(), context)
            .await
    }

    /// Appends a row, flushing first when the batch is full.
    ///
    /// If the flush is rejected the row is dropped and false returned.
    pub async fn enbatch_size<F>(
        &mut self,
        item: AnnotatedValue,
        target: &mut F,
        batch_size: usize,
        context: &Context,
    ) -> bool
    where
        F: BatchFlush + ?Sized,
    {
        let full = self.batch.as_ref().is_some_and(|b| b.len() >= batch_size);
        if full && !self.flush(target, context).await {
            return false;
        }
        self.batch
            .get_or_insert_with(|| allocate_batch(batch_size))
            .push(item);
        true
    }

    /// Flushes the pending batch, if any.
    pub async fn flush<F>(&mut self, target: &mut F, context: &Context) -> bool
    where
        F: BatchFlush + ?Sized,
    {
        match self.batch.take() {
            Some(batch) if !batch.is_empty() => target.flush_batch(batch, context).await,
            _ => true,
        }
    }

    pub fn pending(&self) -> usize {
        self.batch.as_ref().map_or(0, PooledBatch::len)
    }
}
