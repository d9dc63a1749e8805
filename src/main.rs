use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use youtube_watcher::config;
use youtube_watcher::pipeline::Pipeline;
use youtube_watcher::publisher::{EventPublisher, KafkaTransport};
use youtube_watcher::registry::SchemaRegistryClient;
use youtube_watcher::youtube::YoutubeClient;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Publish every video of a YouTube playlist, with statistics, to a Kafka topic"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let registry = SchemaRegistryClient::from_config(&cfg)?;
    let schema = registry
        .get_latest_schema(&cfg.schema_registry.subject)
        .await
        .context("schema lookup failed")?;

    let transport = KafkaTransport::from_config(&cfg.kafka).context("failed to create Kafka producer")?;
    let publisher = EventPublisher::new(
        Arc::new(transport),
        cfg.kafka.topic.clone(),
        schema,
        cfg.kafka.drain_timeout(),
    );
    let youtube = YoutubeClient::from_config(&cfg)?;

    info!(playlist_id = %cfg.youtube.playlist_id, topic = %cfg.kafka.topic, "start");
    let summary = Pipeline::new(&youtube, publisher, cfg.youtube.playlist_id.clone())
        .fail_on_delivery_error(cfg.kafka.fail_on_delivery_error)
        .run()
        .await
        .map_err(|err| {
            error!(stage = %err.stage(), %err, "run failed");
            err
        })?;

    info!(
        playlist_items = summary.playlist_items,
        published = summary.published,
        acknowledged = summary.deliveries.acknowledged(),
        failed = summary.deliveries.failed(),
        unresolved = summary.deliveries.unresolved.len(),
        "run complete"
    );
    Ok(())
}
