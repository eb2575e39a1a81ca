//! Observability for the execution engine
//!
//! - Structured logging (JSON lines on stderr)
//! - Typed lifecycle events
//! - Begin/complete scopes
//!
//! Per-request document counters live with the request context
//! (`execution::PhaseStats`).
//!
//! # Usage
//!
//! ```ignore
//! use aeroquery::observability::{Event, Logger, ObservationScope, Severity};
//!
//! Logger::event(Severity::Info, Event::PipelineBuilt, &[("root", "Sequence")]);
//!
//! let scope = ObservationScope::new("REQUEST");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;
