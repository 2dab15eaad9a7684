use anyhow::anyhow;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tattle::codec;
use tattle::metrics::{MetricsSink, PrometheusMetrics};
use tattle::transport::{HttpTransport, inbound};
use tattle::{Detector, DetectorConfig, HttpPeer, Peer, PeerState};

const STATS_INTERVAL: Duration = Duration::from_secs(5);
const METRICS_CONTENT_TYPE: &str = "application/openmetrics-text;charset=utf-8;version=1.0.0";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportKind {
    Http,
}

#[derive(Debug, Parser)]
#[clap(name = "tattle", about = "SWIM-style peer-to-peer failure detector.")]
struct Opts {
    /// Identity of this node. Random when not given.
    #[clap(long, env = "TATTLE_ID")]
    id: Option<String>,

    /// Address the HTTP server binds to.
    #[clap(long, env = "TATTLE_HTTP_LISTEN", default_value = "0.0.0.0:9000")]
    http_listen: SocketAddr,

    /// Host other peers use to reach this node.
    #[clap(long, env = "TATTLE_ADVERTISE_HOST", default_value = "127.0.0.1")]
    advertise_host: String,

    /// Port other peers use to reach this node. Defaults to the listen port.
    #[clap(long, env = "TATTLE_ADVERTISE_PORT")]
    advertise_port: Option<u16>,

    /// Initial peer, as `[id@][protocol://]host:port`. Repeat or comma-separate.
    #[clap(long = "peer", env = "TATTLE_PEERS", value_delimiter = ',', required = true)]
    peers: Vec<HttpPeer>,

    /// Message encoding: `json` or `bincode`.
    #[clap(long, env = "TATTLE_CODEC", default_value = "json")]
    codec: String,

    #[clap(long, env = "TATTLE_TRANSPORT", value_enum, default_value = "http")]
    transport: TransportKind,

    #[clap(long, env = "TATTLE_PING_INTERVAL_MS", default_value_t = 3000)]
    ping_interval_ms: u64,

    #[clap(long, env = "TATTLE_PING_TIMEOUT_MS", default_value_t = 1000)]
    ping_timeout_ms: u64,

    #[clap(long, env = "TATTLE_INDIRECT_PING_PEERS", default_value_t = 1)]
    indirect_ping_peers: usize,

    #[clap(long, env = "TATTLE_INDIRECT_PING_TIMEOUT_MS", default_value_t = 2000)]
    indirect_ping_timeout_ms: u64,

    #[clap(long, env = "TATTLE_SUSPICION_TIMEOUT_MS", default_value_t = 15000)]
    suspicion_timeout_ms: u64,

    #[clap(long, env = "TATTLE_INJECT_TIMEOUT_MS", default_value_t = 1000)]
    inject_timeout_ms: u64,

    #[clap(long, env = "TATTLE_PROCESS_TIMEOUT_MS", default_value_t = 5000)]
    process_timeout_ms: u64,

    #[clap(long, env = "TATTLE_INCOMING_BUFFER_SIZE", default_value_t = 100)]
    incoming_buffer_size: usize,

    /// Fixed gossip retransmit ceiling. Scales with the group when not given.
    #[clap(long, env = "TATTLE_RETRANSMIT_CEILING")]
    retransmit_ceiling: Option<u32>,

    #[clap(long, env = "TATTLE_RETRANSMIT_MULTIPLIER", default_value_t = 4)]
    retransmit_multiplier: u32,

    #[clap(long, env = "TATTLE_MAX_GOSSIP_BATCH", default_value_t = 16)]
    max_gossip_batch: usize,

    /// Metric endpoint path.
    #[clap(long, env = "TATTLE_METRICS_PATH", default_value = "/metrics")]
    metrics_path: String,
}

impl Opts {
    fn local_peer(&self) -> Peer {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let port = self.advertise_port.unwrap_or(self.http_listen.port());

        // The server below only speaks plain HTTP, so that is what gets advertised
        Peer::Http(HttpPeer::new(&id, &self.advertise_host, port))
    }

    fn detector_config(&self, local_peer: Peer) -> DetectorConfig {
        let peers = self.peers.iter().cloned().map(Peer::from).collect();
        let mut config = DetectorConfig::new(local_peer, peers);

        config.ping_interval = Duration::from_millis(self.ping_interval_ms);
        config.ping_timeout = Duration::from_millis(self.ping_timeout_ms);
        config.indirect_ping_peers = self.indirect_ping_peers;
        config.indirect_ping_timeout = Duration::from_millis(self.indirect_ping_timeout_ms);
        config.suspicion_timeout = Duration::from_millis(self.suspicion_timeout_ms);
        config.inject_timeout = Duration::from_millis(self.inject_timeout_ms);
        config.process_timeout = Duration::from_millis(self.process_timeout_ms);
        config.incoming_buffer_size = self.incoming_buffer_size;
        config.retransmit_ceiling = self.retransmit_ceiling;
        config.retransmit_multiplier = self.retransmit_multiplier;
        config.max_gossip_batch = self.max_gossip_batch;

        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();

    let local_peer = opts.local_peer();
    let config = opts.detector_config(local_peer.clone());
    config.validate()?;

    tracing::info!("Starting node {}", local_peer);
    tracing::info!("Initial peers: {:?}", opts.peers);

    let codec = codec::by_name(&opts.codec)
        .ok_or_else(|| anyhow!("unknown codec '{}' (expected json or bincode)", opts.codec))?;
    tracing::info!("Using {} codec", codec.name());

    let cancel = CancellationToken::new();

    // 1. Metrics:
    let mut registry = Registry::default();
    let metrics: Arc<dyn MetricsSink> = Arc::new(PrometheusMetrics::new(&mut registry));
    let registry = Arc::new(registry);

    // 2. Transport:
    let (transport, app) = match opts.transport {
        TransportKind::Http => {
            let (sender, incoming) =
                inbound::channel(config.inbound_settings(), metrics.clone(), cancel.clone());
            let transport = Arc::new(HttpTransport::new(codec, sender, incoming));
            let router = transport.router();
            (transport, router)
        }
    };

    let app = app.merge(
        Router::new()
            .route(&opts.metrics_path, get(metrics_handler))
            .with_state(registry),
    );

    // 3. Detector:
    let detector = Detector::new(config, transport, metrics, cancel.clone())?;

    let detector_handle = {
        let detector = detector.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = detector.run().await;
            if let Err(e) = &result {
                tracing::error!("Failure detector stopped: {}", e);
            }
            cancel.cancel();
            result
        })
    };

    // 4. Spawn stats reporter:
    let stats_detector = detector.clone();
    tokio::spawn(async move {
        let cancel = stats_detector.cancellation_token();
        let mut interval = tokio::time::interval(STATS_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = interval.tick() => {
                    let records = stats_detector.snapshot().await;
                    let incarnation = stats_detector.incarnation().await;
                    let count = |state| records.iter().filter(|r| r.state == state).count();

                    tracing::info!(
                        "Cluster stats: {} alive, {} suspect, {} dead (own inc={})",
                        count(PeerState::Alive),
                        count(PeerState::Suspect),
                        count(PeerState::Dead),
                        incarnation
                    );
                    for record in &records {
                        tracing::debug!("  - {} {} (inc={})", record.peer, record.state, record.incarnation);
                    }
                }
            }
        }
    });

    // 5. Signals:
    tokio::spawn(shutdown_signal(cancel.clone()));

    // 6. Start HTTP server:
    tracing::info!("HTTP server listening on {}", opts.http_listen);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(opts.http_listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    detector_handle.await??;

    tracing::info!("Node shut down");
    Ok(())
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    let mut body = String::new();

    match encode(&mut body, &registry) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Error encoding metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
