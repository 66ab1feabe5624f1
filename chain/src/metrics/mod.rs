//! Pipeline instrumentation.
//!
//! [`MetricsRegistry`] owns a Prometheus registry with the attestation
//! pipeline counters ([`PipelineMetrics`]). Whatever drives the pipeline
//! updates them after each step; [`run_prometheus_http_server`] serves the
//! text format on `GET /metrics`:
//!
//! ```ignore
//! let metrics = Arc::new(MetricsRegistry::new()?);
//! tokio::spawn(run_prometheus_http_server(metrics.clone(), addr));
//!
//! metrics.pipeline.record_tally(&outcome.tally);
//! metrics.pipeline.injected_batches_total.inc();
//! ```

pub mod prometheus;

pub use prometheus::{MetricsRegistry, PipelineMetrics, run_prometheus_http_server};
