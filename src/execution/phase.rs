//! Per-request phase statistics
//!
//! Counters only; monotonic for the life of the request. Relaxed ordering
//! is enough since totals are read after the pipeline has finished.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Pipeline phases that report document counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    IndexScan,
    Stream,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::IndexScan, Phase::Stream];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::IndexScan => "INDEX_SCAN",
            Phase::Stream => "STREAM",
        }
    }

    fn slot(&self) -> usize {
        match self {
            Phase::IndexScan => 0,
            Phase::Stream => 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct PhaseStats {
    counts: [AtomicU64; 2],
    operators: [AtomicU64; 2],
}

impl PhaseStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds documents processed by a phase
    pub fn add_count(&self, phase: Phase, count: u64) {
        self.counts[phase.slot()].fetch_add(count, Ordering::Relaxed);
    }

    /// Records one more operator instance running in a phase
    pub fn add_operator(&self, phase: Phase) {
        self.operators[phase.slot()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, phase: Phase) -> u64 {
        self.counts[phase.slot()].load(Ordering::Relaxed)
    }

    pub fn operators(&self, phase: Phase) -> u64 {
        self.operators[phase.slot()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PhaseSnapshot {
        let read = |phase| PhaseCounts {
            count: self.count(phase),
            operators: self.operators(phase),
        };
        PhaseSnapshot {
            index_scan: read(Phase::IndexScan),
            stream: read(Phase::Stream),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseCounts {
    pub count: u64,
    pub operators: u64,
}

/// Point-in-time copy of the phase counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseSnapshot {
    pub index_scan: PhaseCounts,
    pub stream: PhaseCounts,
}
