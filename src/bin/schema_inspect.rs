use anyhow::Result;
use apache_avro::Schema;
use clap::Parser;
use std::path::PathBuf;

use youtube_watcher::config;
use youtube_watcher::registry::SchemaRegistryClient;

#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Subject to look up (defaults to schema_registry.subject)
    #[arg(long)]
    subject: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = config::load(Some(&args.config))?;
    let client = SchemaRegistryClient::from_config(&cfg)?;
    let subject = args.subject.unwrap_or_else(|| cfg.schema_registry.subject.clone());

    let registered = client.get_latest_schema(&subject).await?;
    println!("Subject: {}", registered.subject);
    println!("Version: {}", registered.version);
    println!("Schema ID: {}", registered.id);
    match &registered.schema {
        Schema::Record(record) => {
            println!("Fields:");
            for field in &record.fields {
                println!("  {} -> {}", field.name, field.schema.canonical_form());
            }
        }
        other => println!("Schema: {}", other.canonical_form()),
    }
    Ok(())
}
