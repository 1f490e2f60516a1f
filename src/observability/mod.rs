//! Observability for the tick publisher
//!
//! Structured logging through `tracing` and process-wide metrics counters.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{mqtt_span, publisher_span};
