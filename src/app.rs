use std::io;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::network::{FeedEvent, StreamStatus};
use crate::util::truncate_payload;
use crate::window::{Observation, Window};

// Counters shown next to the chart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedStats {
    pub received: u64,
    pub dropped: u64,
    pub reconnects: u64,
    pub last_update: Option<DateTime<Local>>,
    /// Highest value seen so far and the label it arrived with
    pub peak: Option<(f64, String)>,
}

/// What a chart surface gets to draw on each redraw.
pub struct ChartView<'a> {
    pub title: &'a str,
    pub window: &'a Window,
    pub stats: &'a FeedStats,
    pub status: &'a StreamStatus,
}

/// The drawing collaborator behind the feed.
pub trait ChartSurface {
    fn redraw(&mut self, view: &ChartView<'_>) -> io::Result<()>;
}

/// Owns the window for one symbol and redraws its chart on every change.
pub struct SlidingWindowFeed<C> {
    title: String,
    window: Window,
    stats: FeedStats,
    status: StreamStatus,
    chart: C,
}

impl<C: ChartSurface> SlidingWindowFeed<C> {
    pub fn new(title: impl Into<String>, chart: C) -> Self {
        Self {
            title: title.into(),
            window: Window::new(),
            stats: FeedStats::default(),
            status: StreamStatus::Connecting { attempt: 1 },
            chart,
        }
    }

    pub fn on_observation(&mut self, obs: Observation) -> io::Result<()> {
        if let Some(value) = obs.value {
            let is_peak = self.stats.peak.as_ref().map_or(true, |(peak, _)| value > *peak);
            if is_peak {
                self.stats.peak = Some((value, obs.time.clone()));
            }
        }

        self.window.push(obs);
        self.stats.received += 1;
        self.stats.last_update = Some(Local::now());
        self.redraw()
    }

    /// Decode a streamed message and apply it. Malformed messages are
    /// counted and logged, and leave the window as it was.
    pub fn on_message(&mut self, payload: &str) -> io::Result<()> {
        match Observation::decode(payload) {
            Ok(obs) => self.on_observation(obs),
            Err(err) => {
                self.stats.dropped += 1;
                warn!(
                    error = %err,
                    payload = %truncate_payload(payload),
                    "dropping malformed quote message"
                );
                Ok(())
            }
        }
    }

    pub fn on_status(&mut self, status: StreamStatus) -> io::Result<()> {
        if matches!(status, StreamStatus::Reconnecting { .. }) {
            self.stats.reconnects += 1;
        }
        match &status {
            StreamStatus::Closed { .. } => info!(title = %self.title, status = %status, "quote feed closed"),
            _ => debug!(title = %self.title, status = %status, "quote feed status"),
        }
        self.status = status;
        self.redraw()
    }

    pub fn handle(&mut self, event: FeedEvent) -> io::Result<()> {
        match event {
            FeedEvent::Message(payload) => self.on_message(&payload),
            FeedEvent::Status(status) => self.on_status(status),
        }
    }

    pub fn redraw(&mut self) -> io::Result<()> {
        let view = ChartView {
            title: &self.title,
            window: &self.window,
            stats: &self.stats,
            status: &self.status,
        };
        self.chart.redraw(&view)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    pub fn chart(&self) -> &C {
        &self.chart
    }

    pub fn chart_mut(&mut self) -> &mut C {
        &mut self.chart
    }
}
