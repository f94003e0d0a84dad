//! Observability for the replication client
//!
//! - `ClientMetrics`: lock-free counters owned by the client and shared
//!   with the worker thread
//! - `init_logging`: `tracing` subscriber setup for binaries
//!
//! # Usage
//!
//! ```ignore
//! use aerodb_journal_client::observability::{init_logging, ClientMetrics};
//!
//! init_logging(false);
//! let metrics = ClientMetrics::new();
//! metrics.record_delta(512);
//! println!("{}", metrics.to_json());
//! ```

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::{ClientMetrics, MetricsSnapshot};
