//! Live mid-price chart of a quote symbol, fed by a server-sent event stream.
//!
//! Streamed messages arrive through a [`network::Subscription`], are decoded
//! into [`window::Observation`]s and kept in a fixed 30-entry
//! [`window::Window`] owned by [`app::SlidingWindowFeed`], which redraws its
//! [`app::ChartSurface`] after every change.

pub mod app;
pub mod config;
pub mod constants;
pub mod error;
pub mod network;
pub mod sse;
pub mod ui;
pub mod util;
pub mod window;

pub use app::{ChartSurface, ChartView, FeedStats, SlidingWindowFeed};
pub use error::{ConfigError, DecodeError, StreamError};
pub use network::{subscribe, FeedEvent, StreamConfig, StreamStatus, Subscription};
pub use window::{apply, Observation, Window};
