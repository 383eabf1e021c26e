use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use vcomics::pipeline::{PipelineConfig, Services};
use vcomics::queue::SqliteStore;
use vcomics::{config, db, openai, stability, storage, worker};

#[derive(Debug, Parser)]
#[command(author, version, about)]
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
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/vcomics.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let storage_base =
        Url::parse(&cfg.storage.base_url).context("invalid storage.base_url")?;
    let services = Services {
        chat: Arc::new(openai::OpenAiClient::new(
            cfg.openai.api_key.clone(),
            cfg.openai.model.clone(),
        )),
        synthesis: Arc::new(stability::StabilityClient::new(cfg.stability.api_key.clone())),
        storage: Arc::new(storage::SupabaseStorage::new(
            storage_base,
            cfg.storage.api_key.clone(),
        )),
    };
    let pipeline_cfg = PipelineConfig::from_config(&cfg);
    let store = SqliteStore::new(pool);
    let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);

    info!("starting comic generation worker");
    loop {
        match worker::process_next_job(&store, &store, &services, &pipeline_cfg).await {
            Ok(processed) => {
                if !processed {
                    tokio::time::sleep(poll_sleep).await;
                }
            }
            Err(err) => {
                error!(?err, "worker error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
