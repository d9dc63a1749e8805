use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use youtube_watcher::config;
use youtube_watcher::model::{container_video_id, map_video};
use youtube_watcher::paginate::Paginator;
use youtube_watcher::youtube::{Resource, YoutubeClient};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Walk the configured playlist and print each mapped video as a JSON line, without publishing"
)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Stop after this many playlist items
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let client = YoutubeClient::from_config(&cfg)?;

    let mut playlist = Paginator::new(&client, Resource::playlist_items(cfg.youtube.playlist_id.clone()));
    let mut seen = 0usize;
    while let Some(item) = playlist.next_item().await? {
        if args.limit.is_some_and(|limit| seen >= limit) {
            break;
        }
        seen += 1;
        let video_id = container_video_id(&item).context("malformed playlist item")?;
        let mut videos = Paginator::new(&client, Resource::videos(video_id));
        while let Some(video) = videos.next_item().await? {
            let event = map_video(&video).context("malformed video")?;
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    info!(items = seen, pages = playlist.pages_fetched(), "done");
    Ok(())
}
