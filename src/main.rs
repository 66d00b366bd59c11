//! WIDS Feature Pipeline - Main Entry Point

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wids_pipeline::cli::{Cli, Command, CursorAction};
use wids_pipeline::constants;
use wids_pipeline::logic::dataset::export_training;
use wids_pipeline::logic::sync::SyncCursor;
use wids_pipeline::pipeline;
use wids_pipeline::status::SharedStatus;
use wids_pipeline::Config;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| constants::DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;

    tracing::info!("{} v{} starting...", constants::APP_NAME, constants::APP_VERSION);
    config.log_summary();

    match cli.command() {
        Command::Run => {
            pipeline::run(config, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for ctrl-c");
                }
            })
            .await?;
        }
        Command::SyncOnce => {
            let index = pipeline::connect_index(&config).await?;
            let sync = pipeline::build_sync_loop(&config, index.clone(), SharedStatus::new())?;
            let report = sync.poll_once().await?;
            index.refresh().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::EnrichOnce { field } => {
            let index = pipeline::connect_index(&config).await?;
            let scanner = pipeline::build_scanner(&config, index, SharedStatus::new()).await;
            let report = scanner.scan_for_missing(field).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ExportTraining { out, limit } => {
            let index = pipeline::connect_index(&config).await?;
            let summary = export_training(index.as_ref(), &out, limit).await?;
            println!("exported {} records to {}", summary.records, out.display());
        }
        Command::Cursor { action } => {
            let store = pipeline::cursor_store(&config);
            match action {
                CursorAction::Show => match store.load()? {
                    Some(cursor) => println!("{}", serde_json::to_string_pretty(&cursor)?),
                    None => println!("no cursor at {}", store.path().display()),
                },
                CursorAction::Reset { to: None } => {
                    store.reset()?;
                    println!("cursor removed, next start looks back {}s", config.sync.initial_lookback_secs);
                }
                CursorAction::Reset { to: Some(ts) } => {
                    store.save(&SyncCursor::at(ts))?;
                    println!("cursor set to {}", ts);
                }
            }
        }
    }

    Ok(())
}
