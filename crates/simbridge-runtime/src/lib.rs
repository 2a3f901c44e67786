//! `simbridge-runtime` – session orchestration.
//!
//! Wires the telemetry and image channels from `simbridge-link` into one
//! start/stop lifecycle and produces a [`SessionReport`] when it ends.
//!
//! # Modules
//!
//! - [`session`] – [`Session`]: binds all endpoints, runs both channels
//!   concurrently and joins them.  [`SessionHandle`] is the cloneable
//!   `is_done` / `stop` handle.
//! - [`observability`] – [`init_tracing`]: installs the global `tracing`
//!   subscriber (compact or JSON) with an optional OTLP span exporter.  Set
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` to export session spans to Jaeger, Grafana
//!   Tempo, or any OTLP-compatible collector.
//!
//! [`SessionReport`]: simbridge_types::SessionReport

pub mod observability;
pub mod session;

pub use observability::{LogFormat, TracerProviderGuard, init_tracing};
pub use session::{Session, SessionAddrs, SessionHandle};
