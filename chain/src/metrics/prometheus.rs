//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed pipeline metrics, and an
//! async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::consensus::ApplyTally;

/// Attestation pipeline metrics.
///
/// These are registered into a [`Registry`] and updated by whatever drives
/// the pipeline (the node's devnet loop, for instance).
#[derive(Clone)]
pub struct PipelineMetrics {
    /// Vote extensions that went out empty because the sidecar failed.
    pub sidecar_failures_total: IntCounter,
    /// Current value of the liveness guard's consecutive-failure counter.
    pub liveness_consecutive_failures: IntGauge,
    /// Blocks proposed with an injected attestation batch.
    pub injected_batches_total: IntCounter,
    /// Attestations the ledger accepted at finalization.
    pub attestations_applied_total: IntCounter,
    /// Attestations the ledger rejected at finalization.
    pub attestations_rejected_total: IntCounter,
    /// Latency of the finalize step, in seconds.
    pub finalize_seconds: Histogram,
}

impl PipelineMetrics {
    /// Registers pipeline metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sidecar_failures_total = IntCounter::with_opts(Opts::new(
            "pipeline_sidecar_failures_total",
            "Vote extensions produced without data because the sidecar call failed",
        ))?;
        registry.register(Box::new(sidecar_failures_total.clone()))?;

        let liveness_consecutive_failures = IntGauge::with_opts(Opts::new(
            "pipeline_liveness_consecutive_failures",
            "Consecutive proposal rounds without a usable attestation batch",
        ))?;
        registry.register(Box::new(liveness_consecutive_failures.clone()))?;

        let injected_batches_total = IntCounter::with_opts(Opts::new(
            "pipeline_injected_batches_total",
            "Proposals built with an injected attestation batch",
        ))?;
        registry.register(Box::new(injected_batches_total.clone()))?;

        let attestations_applied_total = IntCounter::with_opts(Opts::new(
            "pipeline_attestations_applied_total",
            "Attestations applied by the ledger module",
        ))?;
        registry.register(Box::new(attestations_applied_total.clone()))?;

        let attestations_rejected_total = IntCounter::with_opts(Opts::new(
            "pipeline_attestations_rejected_total",
            "Attestations rejected by the ledger module",
        ))?;
        registry.register(Box::new(attestations_rejected_total.clone()))?;

        let finalize_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "pipeline_finalize_seconds",
                "Time to finalize a block, including attestation application, in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
        )?;
        registry.register(Box::new(finalize_seconds.clone()))?;

        Ok(Self {
            sidecar_failures_total,
            liveness_consecutive_failures,
            injected_batches_total,
            attestations_applied_total,
            attestations_rejected_total,
            finalize_seconds,
        })
    }

    /// Adds one block's apply tally to the counters.
    pub fn record_tally(&self, tally: &ApplyTally) {
        self.attestations_applied_total.inc_by(tally.applied as u64);
        self.attestations_rejected_total.inc_by(tally.rejected as u64);
    }
}

/// Wrapper around a Prometheus registry and the pipeline metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub pipeline: PipelineMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the pipeline metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("attest".to_string()), None)?;
        let pipeline = PipelineMetrics::register(&registry)?;
        Ok(Self { registry, pipeline })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a Tokio
/// runtime, e.g.:
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9898".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!(error = %err, "prometheus HTTP connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, content_type, body) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => (
            StatusCode::OK,
            "text/plain; version=0.0.4",
            Bytes::from(metrics.gather_text()),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            "text/plain",
            Bytes::from_static(b"not found"),
        ),
    };

    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    Ok(resp)
}
