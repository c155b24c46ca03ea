use chrono::{Local, TimeZone};
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

use crate::constants::{LABEL_FORMAT, PLACEHOLDER_LABEL, WINDOW_CAPACITY};
use crate::error::DecodeError;

/// One (timestamp, value) sample of the tracked quote.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub time: String,
    pub value: Option<f64>,
}

// {"time": "...", "value": 1.23 | null}
#[derive(Deserialize)]
struct PointPayload {
    time: String,
    #[serde(default)]
    value: Option<f64>,
}

// dxfeed Quote event, as relayed by quote streamers
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotePayload {
    #[serde(default)]
    event_time: Option<i64>,
    #[serde(default)]
    bid_time: Option<i64>,
    #[serde(default)]
    ask_time: Option<i64>,
    #[serde(default, deserialize_with = "quote_price")]
    bid_price: Option<f64>,
    #[serde(default, deserialize_with = "quote_price")]
    ask_price: Option<f64>,
}

// dxfeed sends non-finite prices as the strings "NaN", "Infinity", "-Infinity"
fn quote_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Number(f64),
        Text(String),
    }

    match Option::<Price>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Price::Number(v)) => Ok(Some(v)),
        Some(Price::Text(text)) => match text.as_str() {
            "NaN" => Ok(Some(f64::NAN)),
            "Infinity" => Ok(Some(f64::INFINITY)),
            "-Infinity" => Ok(Some(f64::NEG_INFINITY)),
            other => Err(de::Error::custom(format!("invalid quote price `{}`", other))),
        },
    }
}

impl QuotePayload {
    fn mid_price(&self) -> Option<f64> {
        match (self.bid_price, self.ask_price) {
            (Some(bid), Some(ask)) if bid.is_finite() && ask.is_finite() => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    fn timestamp_ms(&self) -> Option<i64> {
        self.event_time
            .filter(|&t| t > 0)
            .or_else(|| self.bid_time.max(self.ask_time).filter(|&t| t > 0))
    }
}

impl Observation {
    pub fn new(time: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            time: time.into(),
            value,
        }
    }

    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_LABEL, None)
    }

    /// Decode one streamed message.
    ///
    /// Accepts either a ready-made point (`{"time", "value"}`) or a quote
    /// event carrying `bidPrice`/`askPrice`, whose mid price becomes the value.
    pub fn decode(payload: &str) -> Result<Self, DecodeError> {
        let raw: Value = serde_json::from_str(payload)?;
        let Value::Object(fields) = &raw else {
            return Err(DecodeError::NotAnObject);
        };

        if fields.contains_key("time") {
            let point: PointPayload = serde_json::from_value(raw)?;
            return Ok(Self::new(point.time, point.value));
        }

        if fields.contains_key("bidPrice") || fields.contains_key("askPrice") {
            let quote: QuotePayload = serde_json::from_value(raw)?;
            let time = quote
                .timestamp_ms()
                .and_then(|ms| Local.timestamp_millis_opt(ms).single())
                .unwrap_or_else(Local::now)
                .format(LABEL_FORMAT)
                .to_string();
            return Ok(Self::new(time, quote.mid_price()));
        }

        Err(DecodeError::UnknownShape)
    }
}

/// Two parallel sequences of at most [`WINDOW_CAPACITY`] entries, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    labels: Vec<String>,
    values: Vec<Option<f64>>,
}

impl Default for Window {
    fn default() -> Self {
        Self::new()
    }
}

impl Window {
    /// A full window of placeholders, so the chart has its final shape from the start.
    pub fn new() -> Self {
        Self {
            labels: vec![PLACEHOLDER_LABEL.to_string(); WINDOW_CAPACITY],
            values: vec![None; WINDOW_CAPACITY],
        }
    }

    pub fn push(&mut self, obs: Observation) {
        if self.labels.len() >= WINDOW_CAPACITY {
            self.labels.remove(0);
            self.values.remove(0);
        }
        self.labels.push(obs.time);
        self.values.push(obs.value);
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        WINDOW_CAPACITY
    }

    pub fn latest(&self) -> Option<(&str, Option<f64>)> {
        let label = self.labels.last()?;
        let value = *self.values.last()?;
        Some((label.as_str(), value))
    }

    /// Index and value of every non-null entry.
    pub fn points(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
    }

    /// Number of entries holding a real observation rather than a placeholder.
    pub fn filled(&self) -> usize {
        self.labels
            .iter()
            .filter(|label| label.as_str() != PLACEHOLDER_LABEL)
            .count()
    }

    /// Lowest and highest non-null value, if any.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.points().fold(None, |acc, (_, v)| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// Transport-independent form of the window update.
pub fn apply(mut window: Window, obs: Observation) -> Window {
    window.push(obs);
    window
}
