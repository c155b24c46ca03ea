//! End-to-end tests: a local axum SSE server feeding a subscription, whose
//! events drive a `SlidingWindowFeed`.

use std::convert::Infallible;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use quote_chart::config::endpoint_url;
use quote_chart::network::{build_client, subscribe, FeedEvent};
use quote_chart::{ChartSurface, ChartView, SlidingWindowFeed, StreamConfig, StreamStatus};

#[derive(Default)]
struct Recorder {
    redraws: usize,
}

impl ChartSurface for Recorder {
    fn redraw(&mut self, _view: &ChartView<'_>) -> io::Result<()> {
        self.redraws += 1;
        Ok(())
    }
}

fn point(i: u32) -> String {
    format!(r#"{{"time":"2024-01-01 10:00:{:02}","value":{}}}"#, i % 60, i)
}

fn sse(events: Vec<Event>) -> Response {
    let items: Vec<Result<Event, Infallible>> = events.into_iter().map(Ok).collect();
    Sse::new(stream::iter(items)).into_response()
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn stream_config(base: &str, max_retries: u32) -> StreamConfig {
    StreamConfig {
        url: endpoint_url(base, "stream/{symbol}", "SPY").unwrap(),
        max_retries,
        retry_base: Duration::from_millis(10),
        retry_max: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(2),
    }
}

/// Subscribe and feed every event into a fresh feed until the subscription ends.
async fn run_feed(config: StreamConfig) -> SlidingWindowFeed<Recorder> {
    let client = build_client(&config).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = subscribe(client, config, tx);

    let mut feed = SlidingWindowFeed::new("SPY mid price", Recorder::default());
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = rx.recv().await {
            feed.handle(event).unwrap();
        }
    })
    .await
    .expect("subscription did not finish");

    subscription.close().await;
    feed
}

#[tokio::test]
async fn streamed_points_fill_a_sliding_window() {
    let router = Router::new().route(
        "/stream/:symbol",
        get(|| async { sse((1..=35).map(|i| Event::default().data(point(i))).collect()) }),
    );
    let base = serve(router).await;

    let feed = run_feed(stream_config(&base, 0)).await;

    let values: Vec<_> = feed.window().values().to_vec();
    let expected: Vec<_> = (6..=35).map(|i| Some(i as f64)).collect();
    assert_eq!(values, expected);
    assert_eq!(feed.window().labels()[0], "2024-01-01 10:00:06");
    assert_eq!(feed.stats().received, 35);
    assert!(feed.chart().redraws >= 35);
    assert_eq!(
        feed.status(),
        &StreamStatus::Closed {
            reason: "stream ended by server".to_string()
        }
    );
}

#[tokio::test]
async fn malformed_and_non_message_events_do_not_reach_the_window() {
    let router = Router::new().route(
        "/stream/:symbol",
        get(|| async {
            sse(vec![
                Event::default().data("garbage"),
                Event::default().data(point(1)),
                Event::default().event("heartbeat").data(point(99)),
                Event::default().data(point(2)),
            ])
        }),
    );
    let base = serve(router).await;

    let feed = run_feed(stream_config(&base, 0)).await;

    assert_eq!(feed.stats().received, 2);
    assert_eq!(feed.stats().dropped, 1);
    let tail: Vec<_> = feed.window().values()[28..].to_vec();
    assert_eq!(tail, vec![Some(1.0), Some(2.0)]);
}

#[tokio::test]
async fn reconnects_with_last_event_id() {
    type Seen = Arc<Mutex<Vec<Option<String>>>>;

    async fn handler(State(seen): State<Seen>, headers: HeaderMap) -> Response {
        let last_id = headers
            .get("last-event-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let connection = {
            let mut seen = seen.lock().unwrap();
            seen.push(last_id);
            seen.len()
        };
        match connection {
            1 => sse(vec![Event::default().id("7").data(point(1))]),
            2 => sse(vec![Event::default().data(point(2))]),
            _ => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }

    let seen: Seen = Arc::default();
    let router = Router::new()
        .route("/stream/:symbol", get(handler))
        .with_state(seen.clone());
    let base = serve(router).await;

    let feed = run_feed(stream_config(&base, 1)).await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], None);
    assert_eq!(seen[1].as_deref(), Some("7"));

    assert_eq!(feed.stats().received, 2);
    assert_eq!(feed.stats().reconnects, 2);
    match feed.status() {
        StreamStatus::Closed { reason } => assert!(reason.contains("503"), "{}", reason),
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn rejects_responses_that_are_not_event_streams() {
    let router = Router::new().route("/stream/:symbol", get(|| async { "hello" }));
    let base = serve(router).await;

    let feed = run_feed(stream_config(&base, 0)).await;

    assert_eq!(feed.stats().received, 0);
    match feed.status() {
        StreamStatus::Closed { reason } => assert!(reason.contains("text/plain"), "{}", reason),
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn unknown_symbol_endpoint_closes_the_feed() {
    let base = serve(Router::new()).await;

    let feed = run_feed(stream_config(&base, 0)).await;

    match feed.status() {
        StreamStatus::Closed { reason } => assert!(reason.contains("404"), "{}", reason),
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(feed.window().filled(), 0);
}

#[tokio::test]
async fn close_tears_down_an_open_stream() {
    let router = Router::new().route(
        "/stream/:symbol",
        get(|| async {
            let first: Result<Event, Infallible> = Ok(Event::default().data(point(1)));
            Sse::new(stream::iter(vec![first]).chain(stream::pending())).into_response()
        }),
    );
    let base = serve(router).await;

    let config = stream_config(&base, 5);
    let client = build_client(&config).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = subscribe(client, config, tx);

    let mut feed = SlidingWindowFeed::new("SPY mid price", Recorder::default());
    tokio::time::timeout(Duration::from_secs(10), async {
        while feed.stats().received == 0 {
            let event = rx.recv().await.expect("stream ended early");
            feed.handle(event).unwrap();
        }
    })
    .await
    .expect("no observation arrived");

    tokio::time::timeout(Duration::from_secs(2), subscription.close())
        .await
        .expect("close did not return");

    while let Some(event) = rx.recv().await {
        feed.handle(event).unwrap();
    }
    assert_eq!(
        feed.status(),
        &StreamStatus::Closed {
            reason: "subscription closed".to_string()
        }
    );
    assert_eq!(feed.window().latest(), Some(("2024-01-01 10:00:01", Some(1.0))));
    assert!(matches!(
        rx.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));
}

#[tokio::test]
async fn server_retry_field_sets_the_reconnect_delay() {
    type Connections = Arc<Mutex<u32>>;

    async fn handler(State(connections): State<Connections>) -> Response {
        let connection = {
            let mut count = connections.lock().unwrap();
            *count += 1;
            *count
        };
        if connection == 1 {
            sse(vec![Event::default()
                .retry(Duration::from_millis(40))
                .data(point(1))])
        } else {
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }

    let connections: Connections = Arc::default();
    let router = Router::new()
        .route("/stream/:symbol", get(handler))
        .with_state(connections.clone());
    let base = serve(router).await;

    let config = stream_config(&base, 1);
    let client = build_client(&config).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = subscribe(client, config, tx);

    let mut statuses = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = rx.recv().await {
            if let FeedEvent::Status(status) = event {
                statuses.push(status);
            }
        }
    })
    .await
    .expect("subscription did not finish");
    subscription.close().await;

    let reconnects: Vec<_> = statuses
        .iter()
        .filter(|s| matches!(s, StreamStatus::Reconnecting { .. }))
        .collect();
    assert_eq!(
        reconnects,
        vec![&StreamStatus::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(40)
        }]
    );
    match statuses.last() {
        Some(StreamStatus::Closed { reason }) => assert!(reason.contains("503"), "{}", reason),
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(*connections.lock().unwrap(), 2);
}
