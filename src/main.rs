use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quote_chart::{config::Cli, constants::DEFAULT_LOG_FILE, network, ui};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli)?;

    let stream_config = cli.stream_config().context("invalid stream configuration")?;
    let client = network::build_client(&stream_config).context("failed to build HTTP client")?;
    let title = cli.title();

    info!(symbol = %cli.symbol.trim(), url = %stream_config.url, "subscribing to quote stream");
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let subscription = network::subscribe(client, stream_config, events_tx);

    if cli.headless {
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        ctrlc::set_handler(move || {
            let _ = stop_tx.send(());
        })
        .context("failed to install Ctrl-C handler")?;

        let feed = ui::run_headless(title, events_rx, stop_rx).await?;
        subscription.close().await;
        info!(
            received = feed.stats().received,
            dropped = feed.stats().dropped,
            reconnects = feed.stats().reconnects,
            "quote feed stopped"
        );
    } else {
        let view = tokio::task::spawn_blocking(move || ui::run(title, events_rx))
            .await
            .context("terminal view panicked")?;
        subscription.close().await;
        view.context("terminal view failed")?;
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // the terminal chart owns stdout, so logs go to a file unless headless
    let log_path = cli
        .log_file
        .clone()
        .or_else(|| (!cli.headless).then(|| PathBuf::from(DEFAULT_LOG_FILE)));

    match log_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
    Ok(())
}
