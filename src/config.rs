//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_PATH_TEMPLATE,
    DEFAULT_RETRY_BASE_MS, DEFAULT_RETRY_MAX_MS,
};
use crate::error::ConfigError;
use crate::network::StreamConfig;

const SYMBOL_PLACEHOLDER: &str = "{symbol}";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "quote-chart",
    version,
    about = "Live mid-price chart of a quote, fed by a server-sent event stream"
)]
pub struct Cli {
    /// Quote symbol to chart
    pub symbol: String,

    /// Base URL of the quote stream server
    #[arg(long, env = "QUOTE_CHART_URL", default_value = DEFAULT_BASE_URL)]
    pub url: String,

    /// Stream endpoint path; `{symbol}` is replaced by the symbol
    #[arg(long, env = "QUOTE_CHART_PATH", default_value = DEFAULT_PATH_TEMPLATE)]
    pub path: String,

    /// Reconnect attempts after the stream drops (0 disables reconnecting)
    #[arg(long, env = "QUOTE_CHART_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    #[arg(long, default_value_t = DEFAULT_RETRY_BASE_MS)]
    pub retry_base_ms: u64,

    #[arg(long, default_value_t = DEFAULT_RETRY_MAX_MS)]
    pub retry_max_ms: u64,

    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,

    /// Log chart updates instead of drawing them in the terminal
    #[arg(long)]
    pub headless: bool,

    /// Write logs to this file (terminal mode logs to quote-chart.log by default)
    #[arg(long, env = "QUOTE_CHART_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn title(&self) -> String {
        format!("{} mid price", self.symbol.trim())
    }

    pub fn stream_config(&self) -> Result<StreamConfig, ConfigError> {
        if self.retry_base_ms > self.retry_max_ms {
            return Err(ConfigError::InvalidRetryDelays {
                base_ms: self.retry_base_ms,
                max_ms: self.retry_max_ms,
            });
        }

        Ok(StreamConfig {
            url: endpoint_url(&self.url, &self.path, &self.symbol)?,
            max_retries: self.max_retries,
            retry_base: Duration::from_millis(self.retry_base_ms),
            retry_max: Duration::from_millis(self.retry_max_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        })
    }
}

/// Stream address for one symbol.
pub fn endpoint_url(base: &str, template: &str, symbol: &str) -> Result<String, ConfigError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(ConfigError::EmptySymbol);
    }
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::InvalidUrl(base.to_string()));
    }
    if !template.contains(SYMBOL_PLACEHOLDER) {
        return Err(ConfigError::InvalidPathTemplate(template.to_string()));
    }

    let path = template
        .trim_start_matches('/')
        .replace(SYMBOL_PLACEHOLDER, &urlencoding::encode(symbol));
    Ok(format!("{}/{}", base.trim_end_matches('/'), path))
}
