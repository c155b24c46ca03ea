//! Subscription to the server-sent quote stream.
//!
//! A background task owns the HTTP connection and forwards every `message`
//! event, together with connection status changes, to the feed over a
//! channel. The [`Subscription`] handle is the only way to stop it.

use std::fmt;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{StreamError, StreamResult};
use crate::sse::{SseDecoder, DEFAULT_EVENT_TYPE};

const LAST_EVENT_ID: &str = "Last-Event-ID";

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Fully resolved endpoint for one symbol
    pub url: String,
    /// Reconnect attempts after a failure; 0 never reconnects
    pub max_retries: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub connect_timeout: Duration,
}

/// Connection state as seen by the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStatus {
    Connecting { attempt: u32 },
    Connected,
    Reconnecting { attempt: u32, delay: Duration },
    Closed { reason: String },
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStatus::Connecting { attempt: 1 } => write!(f, "connecting"),
            StreamStatus::Connecting { attempt } => write!(f, "connecting (attempt {})", attempt),
            StreamStatus::Connected => write!(f, "live"),
            StreamStatus::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting in {:.1}s (retry {})", delay.as_secs_f64(), attempt)
            }
            StreamStatus::Closed { reason } => write!(f, "closed: {}", reason),
        }
    }
}

/// Everything the subscription task reports to the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Raw `data` of one `message` event
    Message(String),
    Status(StreamStatus),
}

/// Exponential reconnect delays: `base * 2^(attempt-1)`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_retries: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max,
            max_retries,
            attempt: 0,
        }
    }

    /// Replace the base delay, e.g. with the server's `retry:` hint.
    pub fn set_base(&mut self, base: Duration) {
        self.base = base;
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, or `None` once retries are used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        self.attempt += 1;
        let factor = 2u32.saturating_pow(self.attempt - 1);
        Some(self.base.saturating_mul(factor).min(self.max))
    }
}

/// Handle to a running stream subscription.
///
/// Dropping it aborts the task; [`Subscription::close`] stops it cleanly.
pub struct Subscription {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub fn build_client(config: &StreamConfig) -> StreamResult<Client> {
    Ok(Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()?)
}

/// Open the stream in a background task. Must be called within a tokio runtime.
pub fn subscribe(
    client: Client,
    config: StreamConfig,
    events: mpsc::UnboundedSender<FeedEvent>,
) -> Subscription {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_subscription(client, config, events, shutdown_rx));
    Subscription {
        shutdown,
        task: Some(task),
    }
}

async fn run_subscription(
    client: Client,
    config: StreamConfig,
    events: mpsc::UnboundedSender<FeedEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(config.retry_base, config.retry_max, config.max_retries);
    let mut decoder = SseDecoder::new();

    loop {
        let attempt = backoff.attempt() + 1;
        if events
            .send(FeedEvent::Status(StreamStatus::Connecting { attempt }))
            .is_err()
        {
            return;
        }

        let outcome = tokio::select! {
            res = stream_once(&client, &config, &mut decoder, &mut backoff, &events) => res,
            _ = shutdown.changed() => {
                close(&events, "subscription closed");
                return;
            }
        };

        let reason = match outcome {
            Ok(()) => {
                info!(url = %config.url, "quote stream ended by server");
                "stream ended by server".to_string()
            }
            Err(StreamError::ChannelClosed) => return,
            Err(err) => {
                warn!(url = %config.url, error = %err, "quote stream failed");
                err.to_string()
            }
        };

        if let Some(retry) = decoder.take_retry() {
            debug!(retry_ms = retry.as_millis() as u64, "server set reconnect delay");
            backoff.set_base(retry);
        }

        let Some(delay) = backoff.next_delay() else {
            close(&events, &reason);
            return;
        };

        let status = StreamStatus::Reconnecting {
            attempt: backoff.attempt(),
            delay,
        };
        if events.send(FeedEvent::Status(status)).is_err() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                close(&events, "subscription closed");
                return;
            }
        }
    }
}

fn close(events: &mpsc::UnboundedSender<FeedEvent>, reason: &str) {
    let _ = events.send(FeedEvent::Status(StreamStatus::Closed {
        reason: reason.to_string(),
    }));
}

/// One connection, from request to end of body.
async fn stream_once(
    client: &Client,
    config: &StreamConfig,
    decoder: &mut SseDecoder,
    backoff: &mut Backoff,
    events: &mpsc::UnboundedSender<FeedEvent>,
) -> StreamResult<()> {
    decoder.reset_connection();

    let mut request = client
        .get(&config.url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache");
    if let Some(id) = decoder.last_event_id().filter(|id| !id.is_empty()) {
        request = request.header(LAST_EVENT_ID, id);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status(status));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with("text/event-stream") {
        return Err(StreamError::ContentType(content_type));
    }

    info!(url = %config.url, "quote stream connected");
    events
        .send(FeedEvent::Status(StreamStatus::Connected))
        .map_err(|_| StreamError::ChannelClosed)?;

    let mut body = response.bytes_stream();
    let mut delivered = false;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for event in decoder.feed(&chunk) {
            if !delivered {
                delivered = true;
                backoff.reset();
            }
            if event.event != DEFAULT_EVENT_TYPE {
                debug!(event = %event.event, "ignoring non-message event");
                continue;
            }
            events
                .send(FeedEvent::Message(event.data))
                .map_err(|_| StreamError::ChannelClosed)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 5);
        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn zero_retries_never_reconnects() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 0);
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn reset_and_server_hint_restart_the_sequence() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 3);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        backoff.set_base(Duration::from_millis(250));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(250)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn large_attempt_counts_do_not_overflow() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 100);
        let last = std::iter::from_fn(|| backoff.next_delay()).last();
        assert_eq!(last, Some(Duration::from_secs(30)));
    }

    #[test]
    fn status_reads_well_in_a_status_bar() {
        assert_eq!(StreamStatus::Connecting { attempt: 1 }.to_string(), "connecting");
        assert_eq!(StreamStatus::Connected.to_string(), "live");
        let status = StreamStatus::Reconnecting {
            attempt: 2,
            delay: Duration::from_millis(1500),
        };
        assert_eq!(status.to_string(), "reconnecting in 1.5s (retry 2)");
    }
}
