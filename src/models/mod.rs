//! Domain models for ADEA.
//!
//! - [`LogEntry`]: a pipeline log record, the unit the store, the anomaly
//!   detector and the `/logs` endpoint all work on.
//! - [`LogLevel`]: record severity, also the first anomaly feature.
//! - API payloads ([`ChatInput`], [`AnomalyReport`], ...) live in `api`.

mod api;
mod log;

pub use api::*;
pub use log::*;
