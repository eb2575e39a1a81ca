//! aeroquery - query execution engine for a JSON document database
//!
//! Takes a physical plan produced by a planner, builds a pipeline of
//! operators from it and streams result rows to the caller.
//!
//! - `plan`: the plan tree
//! - `expression`: expressions carried by plans
//! - `value`: annotated rows and collation
//! - `datastore`: index access (in-memory implementation included)
//! - `timestamp`: scan vectors for consistent scans
//! - `execution`: operators, builder and request driver
//! - `config`: engine settings
//! - `observability`: structured logging

pub mod cli;
pub mod config;
pub mod datastore;
pub mod execution;
pub mod expression;
pub mod observability;
pub mod plan;
pub mod timestamp;
pub mod value;
