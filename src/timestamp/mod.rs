//! Scan vectors for consistency-bounded index scans
//!
//! A scan vector is a per-partition sequence-number bound: an index scan
//! given a vector must reflect every mutation up to those positions
//! (read-your-writes).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Bound for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Partition position
    pub position: u32,
    /// Partition identity guard
    pub guard: String,
    /// Sequence number that must be visible
    pub value: u64,
}

/// Per-partition sequence bounds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanVector {
    pub entries: Vec<VectorEntry>,
}

impl ScanVector {
    pub fn new(entries: Vec<VectorEntry>) -> Self {
        Self { entries }
    }

    /// Highest sequence number required across partitions
    pub fn max_value(&self) -> u64 {
        self.entries.iter().map(|e| e.value).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How the request supplies scan vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorKind {
    /// No vector; scans are unbounded or request-plus
    None,
    /// One vector, valid for exactly one keyspace
    Single,
    /// A vector per keyspace
    Full,
}

/// Supplies scan vectors per scanned keyspace.
pub trait ScanVectorSource: Send + Sync {
    fn kind(&self) -> VectorKind;

    /// Vector for `namespace:keyspace`, if the source has one.
    fn scan_vector(&self, namespace: &str, keyspace: &str) -> Option<ScanVector>;
}

/// Source with no vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroVectorSource;

impl ScanVectorSource for ZeroVectorSource {
    fn kind(&self) -> VectorKind {
        VectorKind::None
    }

    fn scan_vector(&self, _namespace: &str, _keyspace: &str) -> Option<ScanVector> {
        None
    }
}

/// One vector for whichever single keyspace the request scans
#[derive(Debug, Clone)]
pub struct SingleVectorSource {
    vector: ScanVector,
}

impl SingleVectorSource {
    pub fn new(vector: ScanVector) -> Self {
        Self { vector }
    }
}

impl ScanVectorSource for SingleVectorSource {
    fn kind(&self) -> VectorKind {
        VectorKind::Single
    }

    fn scan_vector(&self, _namespace: &str, _keyspace: &str) -> Option<ScanVector> {
        Some(self.vector.clone())
    }
}

/// Vectors keyed by `namespace:keyspace`
#[derive(Debug, Clone, Default)]
pub struct FullVectorSource {
    vectors: HashMap<String, ScanVector>,
}

impl FullVectorSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(mut self, namespace: &str, keyspace: &str, vector: ScanVector) -> Self {
        self.vectors
            .insert(format!("{}:{}", namespace, keyspace), vector);
        self
    }
}

impl ScanVectorSource for FullVectorSource {
    fn kind(&self) -> VectorKind {
        VectorKind::Full
    }

    fn scan_vector(&self, namespace: &str, keyspace: &str) -> Option<ScanVector> {
        self.vectors
            .get(&format!("{}:{}", namespace, keyspace))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(value: u64) -> ScanVector {
        ScanVector::new(vec![VectorEntry {
            position: 0,
            guard: "g0".to_string(),
            value,
        }])
    }

    #[test]
    fn test_sources() {
        assert_eq!(ZeroVectorSource.kind(), VectorKind::None);
        assert!(ZeroVectorSource.scan_vector("default", "users").is_none());

        let single = SingleVectorSource::new(vector(7));
        assert_eq!(single.kind(), VectorKind::Single);
        assert_eq!(single.scan_vector("any", "thing"), Some(vector(7)));

        let full = FullVectorSource::new().with_vector("default", "users", vector(3));
        assert_eq!(full.scan_vector("default", "users"), Some(vector(3)));
        assert!(full.scan_vector("default", "orders").is_none());
    }

    #[test]
    fn test_max_value() {
        let v = ScanVector::new(vec![
            VectorEntry { position: 0, guard: "a".into(), value: 4 },
            VectorEntry { position: 1, guard: "b".into(), value: 9 },
        ]);
        assert_eq!(v.max_value(), 9);
        assert_eq!(ScanVector::default().max_value(), 0);
    }
}
