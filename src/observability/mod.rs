//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing via tracing-subscriber
//! - OpenTelemetry dispatch counters

pub mod metrics;
pub mod tracing;
