//! Free list of annotation maps
//!
//! Rows that carry attachments or covers check a cleared map out of the
//! pool on first write and return it when dropped.

use std::sync::OnceLock;

use parking_lot::Mutex;

use super::annotated::Annotations;

/// Default number of cleared maps kept for reuse
pub const DEFAULT_RETAINED: usize = 4096;

/// Process-wide pool of annotation maps.
#[derive(Debug)]
pub struct ValuePool {
    free: Mutex<Vec<Box<Annotations>>>,
    max_retained: usize,
}

impl ValuePool {
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_retained,
        }
    }

    /// Takes a cleared map, allocating when the pool is empty.
    pub(crate) fn checkout(&self) -> Box<Annotations> {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Clears and retains a map; maps beyond the bound are freed.
    pub(crate) fn checkin(&self, mut annotations: Box<Annotations>) {
        annotations.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(annotations);
        }
    }

    /// Number of maps currently held for reuse
    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for ValuePool {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED)
    }
}

/// The process-wide pool.
pub fn value_pool() -> &'static ValuePool {
    static POOL: OnceLock<ValuePool> = OnceLock::new();
    POOL.get_or_init(ValuePool::default)
}
