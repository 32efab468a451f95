//! Dedup server process entrypoint: configuration, logging, and the
//! axum HTTP facade's deferred startup lifecycle.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dedup_core::DedupConfig;
use dedup_server::embedder::{DeterministicEmbedder, Embedder, LazyEmbedder};
use dedup_server::network::NetworkConfig;
use dedup_server::service::ServerConfig;
use dedup_server::store::{ClusterStore, MemoryDocStore, MergeStore, TicketStore};
use dedup_server::{ClusteringService, IngestCoordinator, MergeService, NetworkModule};

/// Command-line and environment configuration for the dedup server process.
#[derive(Debug, Parser)]
#[command(name = "dedup-server", about = "Ticket-deduplication HTTP facade")]
struct Args {
    /// Identifier for this server process, used in logs and traces.
    #[arg(long, env = "DEDUP_NODE_ID", default_value = "dedup-server-0")]
    node_id: String,

    /// Bind address.
    #[arg(long, env = "DEDUP_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port. 0 means OS-assigned.
    #[arg(long, env = "DEDUP_PORT", default_value_t = 8080)]
    port: u16,

    #[arg(long, env = "DEDUP_AUTO_THRESHOLD", default_value_t = 0.92)]
    auto_threshold: f64,

    #[arg(long, env = "DEDUP_REVIEW_THRESHOLD", default_value_t = 0.85)]
    review_threshold: f64,

    #[arg(long, env = "DEDUP_EMBEDDING_DIMENSIONS", default_value_t = 1536)]
    embedding_dimensions: usize,

    /// Emit logs as JSON instead of human-readable text.
    #[arg(long, env = "DEDUP_LOG_JSON", default_value_t = false)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = ServerConfig {
        dedup: DedupConfig {
            auto_threshold: args.auto_threshold,
            review_threshold: args.review_threshold,
            embedding_dimensions: args.embedding_dimensions,
            ..DedupConfig::default()
        },
        node_id: args.node_id,
        bind_host: args.host,
        bind_port: args.port,
    };

    tracing::info!(node_id = %config.node_id, "starting dedup server");

    let docs = Arc::new(MemoryDocStore::new());
    let tickets = Arc::new(TicketStore::new(docs.clone()));
    let clusters = Arc::new(ClusterStore::new(docs.clone()));
    let merges = Arc::new(MergeStore::new(docs));

    let clustering = Arc::new(ClusteringService::new(clusters.clone(), config.dedup.clone()));

    let embedding_dimensions = config.dedup.embedding_dimensions;
    let embedder: Arc<dyn Embedder> = Arc::new(LazyEmbedder::new(embedding_dimensions, move || {
        Arc::new(DeterministicEmbedder::new(embedding_dimensions)) as Arc<dyn Embedder>
    }));

    let ingest = Arc::new(IngestCoordinator::new(tickets.clone(), clustering.clone(), embedder));
    let merge = Arc::new(MergeService::new(
        clusters,
        tickets,
        merges,
        config.dedup.open_statuses.clone(),
        config.dedup.revert_window_hours,
        config.dedup.max_etag_retries,
    ));

    let network_config = NetworkConfig {
        host: config.bind_host,
        port: config.bind_port,
        ..NetworkConfig::default()
    };

    let mut module = NetworkModule::new(network_config, ingest, clustering, merge);
    let port = module.start().await?;
    tracing::info!(port, "listening");

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
