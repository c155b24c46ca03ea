pub const WINDOW_CAPACITY: usize = 30;
pub const PLACEHOLDER_LABEL: &str = "0000-00-00 00:00:00";
pub const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const TICK_RATE_MS: u64 = 100; // key polling, not data pacing

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_PATH_TEMPLATE: &str = "stream/{symbol}";
pub const DEFAULT_LOG_FILE: &str = "quote-chart.log";

pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_RETRY_BASE_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
