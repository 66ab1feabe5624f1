// node/src/main.rs

//! Attestation devnet node binary.
//!
//! This binary runs a set of in-process validators on top of the
//! `attest_chain` crate and exposes a small HTTP API:
//!
//! - `GET /health`
//! - `GET /status`
//! - `POST /txs`
//!
//! Each validator has its own sidecar client, state backend (RocksDB, or
//! memory with `--ephemeral`) and pipeline instance. A background loop
//! drives them one height per block time, and a Prometheus exporter serves
//! `/metrics`.
//!
//! When the liveness guard trips the process exits with
//! [`LIVENESS_HALT_EXIT_CODE`].

mod config;
mod devnet;
mod routes;
mod state;

use std::future::IntoFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axum::{
    Router,
    routing::{get, post},
};
use clap::Parser;
use tokio::signal;

use attest_chain::{
    AttestationApp, AttestationLedger, DepositLedger, HttpSidecarClient, InMemoryStateStore,
    LIVENESS_HALT_EXIT_CODE, MetricsRegistry, RocksDbConfig, RocksDbStateStore, SidecarClient,
    StateBackend, run_prometheus_http_server,
};
use config::{Cli, FileConfig};
use devnet::{Devnet, DevnetError, DevnetValidator, StepReport, validator_address};
use routes::{health, status, txs};
use state::{AppState, NodeStatus, QueuedTxPool, SharedState, TallyView};

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "attest_node=info,attest_chain=info".to_string()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let cfg = FileConfig::load(&cli).map_err(|e| format!("invalid configuration: {e}"))?;

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.node.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.node.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::error!(error = %e, "metrics HTTP server error");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Shared state
    // ---------------------------

    let app_state: SharedState = Arc::new(AppState {
        tx_pool: tokio::sync::Mutex::new(QueuedTxPool::new(
            cfg.node.consensus.max_block_size_bytes,
            cfg.api.max_pending_txs,
        )),
        status: tokio::sync::Mutex::new(NodeStatus {
            validators: cfg.devnet.validators.len(),
            liveness_threshold: cfg.node.consensus.liveness_failure_threshold,
            ..NodeStatus::default()
        }),
        metrics: metrics.clone(),
    });

    // ---------------------------
    // Devnet validators + loop
    // ---------------------------

    let shutdown = Arc::new(AtomicBool::new(false));
    let block_time = Duration::from_secs(cfg.node.consensus.block_time_secs);

    let devnet_task = if cfg.ephemeral {
        tracing::warn!("running with in-memory state; nothing survives a restart");
        let net = setup_devnet(cfg.clone(), |_| Ok(InMemoryStateStore::new())).await?;
        spawn_devnet(net, app_state.clone(), block_time, shutdown.clone())
    } else {
        let base = cfg.node.storage.clone();
        let net = setup_devnet(cfg.clone(), move |name| {
            let storage = RocksDbConfig {
                path: format!("{}/{}", base.path.trim_end_matches('/'), name),
                ..base.clone()
            };
            RocksDbStateStore::open(&storage)
                .map_err(|e| format!("failed to open RocksDB store at {}: {e}", storage.path))
        })
        .await?;
        spawn_devnet(net, app_state.clone(), block_time, shutdown.clone())
    };

    // ---------------------------
    // HTTP router
    // ---------------------------

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/status", get(status::status))
        .route("/txs", post(txs::submit_tx))
        .with_state(app_state);

    tracing::info!("node API listening on http://{}", cfg.api.listen_addr);

    let listener = tokio::net::TcpListener::bind(cfg.api.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", cfg.api.listen_addr))?;

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .into_future();

    tokio::select! {
        joined = devnet_task => {
            shutdown.store(true, Ordering::Relaxed);
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) if e.is_liveness_halt() => {
                    tracing::error!(
                        error = %e,
                        "attestation pipeline failed for too many consecutive rounds, halting node"
                    );
                    std::process::exit(LIVENESS_HALT_EXIT_CODE);
                }
                Ok(Err(e)) => Err(format!("devnet stopped: {e}")),
                Err(e) => Err(format!("devnet task panicked: {e}")),
            }
        }
        served = server => {
            shutdown.store(true, Ordering::Relaxed);
            served.map_err(|e| format!("API server error: {e}"))
        }
    }
}

type NodeDevnet<S> = Devnet<HttpSidecarClient, DepositLedger, S>;

/// Builds the devnet on a blocking thread.
///
/// The blocking HTTP client must not be created or dropped on an async
/// worker.
async fn setup_devnet<S, F>(cfg: FileConfig, open: F) -> Result<NodeDevnet<S>, String>
where
    S: StateBackend + Send + 'static,
    F: Fn(&str) -> Result<S, String> + Send + 'static,
{
    tokio::task::spawn_blocking(move || build_devnet(&cfg, open))
        .await
        .map_err(|e| format!("devnet setup task failed: {e}"))?
}

/// Builds one pipeline per configured validator, opening state with `open`.
fn build_devnet<S, F>(cfg: &FileConfig, open: F) -> Result<NodeDevnet<S>, String>
where
    S: StateBackend,
    F: Fn(&str) -> Result<S, String>,
{
    let mut validators = Vec::with_capacity(cfg.devnet.validators.len());

    for v in &cfg.devnet.validators {
        let address = cfg.sidecar_address_for(v);
        let sidecar = HttpSidecarClient::new(address, cfg.node.sidecar.timeout())
            .map_err(|e| format!("failed to create sidecar client for {}: {e}", v.name))?;
        let identity = validator_address(&v.name);

        tracing::info!(
            validator = %v.name,
            %identity,
            power = v.power,
            sidecar = address,
            "starting validator"
        );

        validators.push(DevnetValidator {
            name: v.name.clone(),
            power: v.power,
            app: AttestationApp::new(
                cfg.node.consensus.clone(),
                identity,
                sidecar,
                DepositLedger::new(),
                open(&v.name)?,
            ),
        });
    }

    Devnet::new(validators).map_err(|e| format!("failed to start devnet: {e}"))
}

fn spawn_devnet<S>(
    net: NodeDevnet<S>,
    state: SharedState,
    block_time: Duration,
    shutdown: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<Result<(), DevnetError>>
where
    S: StateBackend + Send + 'static,
{
    // The sidecar client blocks; keep it off the async workers.
    tokio::task::spawn_blocking(move || run_devnet_loop(net, &state, block_time, &shutdown))
}

/// Background devnet loop.
///
/// Runs one height per `block_time` until shutdown or a fatal error.
fn run_devnet_loop<C, L, S>(
    mut net: Devnet<C, L, S>,
    state: &AppState,
    block_time: Duration,
    shutdown: &AtomicBool,
) -> Result<(), DevnetError>
where
    C: SidecarClient,
    L: AttestationLedger,
    S: StateBackend,
{
    tracing::info!("devnet running with block time {}s", block_time.as_secs());

    while !shutdown.load(Ordering::Relaxed) {
        let started = Instant::now();

        let stepped = {
            let mut pool = state.tx_pool.blocking_lock();
            net.step(&mut *pool, current_unix_timestamp())
        };

        match stepped {
            Ok(report) => record_step(state, &net, &report),
            Err(e) => {
                state.status.blocking_lock().halted = Some(e.to_string());
                return Err(e);
            }
        }

        sleep_until(started + block_time, shutdown);
    }

    tracing::info!("devnet loop stopped");
    Ok(())
}

/// Pushes one step's results into metrics and the status snapshot.
fn record_step<C, L, S>(state: &AppState, net: &Devnet<C, L, S>, report: &StepReport)
where
    C: SidecarClient,
    L: AttestationLedger,
    S: StateBackend,
{
    let pipeline = &state.metrics.pipeline;
    let liveness_failures = net.liveness_failures();
    pipeline
        .liveness_consecutive_failures
        .set(i64::try_from(liveness_failures).unwrap_or(i64::MAX));

    let mut status = state.status.blocking_lock();
    status.liveness_failures = liveness_failures;

    let StepReport::Finalized(finalized) = report else {
        return;
    };

    pipeline.finalize_seconds.observe(finalized.finalize_secs);
    pipeline.record_tally(&finalized.tally);
    pipeline
        .sidecar_failures_total
        .inc_by(finalized.empty_extensions);
    if finalized.injected.is_some() {
        pipeline.injected_batches_total.inc();
    }

    tracing::info!(
        height = finalized.height,
        proposer = %finalized.proposer,
        injected = finalized.injected.as_ref().map_or(0, |i| i.attestations),
        applied = finalized.tally.applied,
        rejected = finalized.tally.rejected,
        empty_extensions = finalized.empty_extensions,
        rejected_extensions = finalized.rejected_extensions,
        app_hash = %finalized.app_hash,
        "height finalized"
    );

    status.height = finalized.height;
    status.app_hash = Some(finalized.app_hash.to_hex());
    status.last_proposer = Some(finalized.proposer.clone());
    status.last_tally = Some(TallyView::from(&finalized.tally));
}

/// Sleeps until `deadline`, waking early on shutdown.
fn sleep_until(deadline: Instant, shutdown: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(100);

    loop {
        let now = Instant::now();
        if now >= deadline || shutdown.load(Ordering::Relaxed) {
            return;
        }
        std::thread::sleep(SLICE.min(deadline - now));
    }
}

/// Returns the current wall-clock time as seconds since Unix epoch.
fn current_unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal(shutdown: Arc<AtomicBool>) {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    shutdown.store(true, Ordering::Relaxed);
}
