//! dispatch-worker — turns deploy requests on a queue into scheduled jobs.
//!
//! Flow: SQS → classify envelope → (fetch from S3) → validate → Batch SubmitJob
//! → ack / nack.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use craft_core::config::{load_dotenv, Config};
use craft_dispatch::{
    BatchScheduler, BlobStore, BridgeOptions, DispatchService, ObjectStoreBlobs, QueueBridge,
};
use craft_queue::{QueueConsumer, SqsConsumer};

// ── CLI ─────────────────────────────────────────────────────────────

/// Deploy dispatch worker.
#[derive(Parser, Debug)]
#[command(name = "dispatch-worker", version, about)]
struct Cli {
    /// Config profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "CRAFT_PROFILE", default_value = "")]
    profile: String,

    /// Override the source queue URL.
    #[arg(long)]
    queue_url: Option<String>,

    /// Bound of the message and ack channels.
    #[arg(long, env = "CRAFT_CHANNEL_CAPACITY", default_value_t = 16)]
    channel_capacity: usize,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::for_profile(&cli.profile);
    if let Some(url) = cli.queue_url {
        config.queue.queue_url = url;
    }
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration, refusing to start");
        return Err(e.into());
    }
    config.log_summary();

    let consumer: Arc<dyn QueueConsumer> =
        Arc::new(SqsConsumer::new(&config.aws, &config.queue).await?);
    match consumer.health_check().await {
        Ok(health) => info!(%health, "queue reachable"),
        Err(e) => warn!(error = %e, "queue health check failed, polling anyway"),
    }
    if let Ok(Some(depth)) = consumer.dlq_depth().await {
        info!(depth, "dead-letter queue depth");
    }

    let scheduler = Arc::new(BatchScheduler::new(&config.aws).await);
    let blobs: Option<Arc<dyn BlobStore>> = match config.dispatch.bucket.as_deref() {
        Some(bucket) => Some(Arc::new(ObjectStoreBlobs::s3(&config.aws, bucket)?)),
        None => {
            info!("no CRAFT_BUCKET set, referenced events will fail to fetch");
            None
        }
    };
    let service = Arc::new(DispatchService::new(&config.dispatch, scheduler, blobs)?);

    let shutdown = Arc::new(Notify::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        os_signal().await;
        info!("shutdown signal received, draining");
        signal_shutdown.notify_one();
    });

    let options = BridgeOptions::from_queue_config(&config.queue)
        .with_channel_capacity(cli.channel_capacity);
    let stats = QueueBridge::new(consumer, service, options)
        .run(shutdown)
        .await;

    info!(
        received = stats.received,
        submitted = stats.submitted,
        ignored = stats.ignored,
        failed = stats.failed,
        "dispatch-worker stopped"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl_c");
    }
}
