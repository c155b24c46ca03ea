use std::{io, time::Duration};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as CanvasLine, Points},
        Block, BorderType, Borders, Paragraph,
    },
    Frame, Terminal,
};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::info;

use crate::app::{ChartSurface, ChartView, SlidingWindowFeed};
use crate::constants::{PLACEHOLDER_LABEL, TICK_RATE_MS};
use crate::network::{FeedEvent, StreamStatus};
use crate::util::{clock_label, format_count, format_price};
use crate::window::Window;

/// Line chart drawn on a ratatui terminal.
pub struct TerminalChart<B: Backend> {
    terminal: Terminal<B>,
}

impl<B: Backend> TerminalChart<B> {
    pub fn new(terminal: Terminal<B>) -> Self {
        Self { terminal }
    }

    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut Terminal<B> {
        &mut self.terminal
    }
}

impl<B: Backend> ChartSurface for TerminalChart<B> {
    fn redraw(&mut self, view: &ChartView<'_>) -> io::Result<()> {
        self.terminal.draw(|f| draw(f, view))?;
        Ok(())
    }
}

/// Headless surface: every redraw becomes a log line.
#[derive(Debug, Default)]
pub struct LogSurface {
    redraws: u64,
}

impl LogSurface {
    pub fn redraws(&self) -> u64 {
        self.redraws
    }
}

impl ChartSurface for LogSurface {
    fn redraw(&mut self, view: &ChartView<'_>) -> io::Result<()> {
        self.redraws += 1;
        let (time, value) = view.window.latest().unwrap_or((PLACEHOLDER_LABEL, None));
        info!(
            title = view.title,
            time,
            value = %format_price(value),
            points = view.window.filled(),
            status = %view.status,
            "chart updated"
        );
        Ok(())
    }
}

/// Run the terminal chart until the user quits. The terminal is restored
/// before any drawing error is returned.
pub fn run(title: String, events: mpsc::UnboundedReceiver<FeedEvent>) -> io::Result<()> {
    enable_raw_mode()?;
    let terminal = or_restore(enter_alternate_screen, restore_terminal)?;

    let mut feed = SlidingWindowFeed::new(title, TerminalChart::new(terminal));
    let res = run_feed_loop(&mut feed, events);

    let terminal = feed.chart_mut().terminal_mut();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn enter_alternate_screen() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

// best effort; the setup error is the one reported
fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

/// Run `setup`, calling `restore` to undo partial terminal changes if it fails.
fn or_restore<T>(setup: impl FnOnce() -> io::Result<T>, restore: impl FnOnce()) -> io::Result<T> {
    setup().map_err(|err| {
        restore();
        err
    })
}

fn run_feed_loop<B: Backend>(
    feed: &mut SlidingWindowFeed<TerminalChart<B>>,
    mut events: mpsc::UnboundedReceiver<FeedEvent>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(TICK_RATE_MS);
    feed.redraw()?;

    loop {
        loop {
            match events.try_recv() {
                Ok(event) => feed.handle(event)?,
                // a finished subscription leaves the last picture on screen
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if event::poll(tick_rate)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c') | KeyCode::Esc) {
                        return Ok(());
                    }
                }
                Event::Resize(..) => feed.redraw()?,
                _ => {}
            }
        }
    }
}

/// Drive a headless feed until the stream closes for good or `stop` fires.
pub async fn run_headless(
    title: String,
    mut events: mpsc::UnboundedReceiver<FeedEvent>,
    mut stop: mpsc::UnboundedReceiver<()>,
) -> io::Result<SlidingWindowFeed<LogSurface>> {
    let mut feed = SlidingWindowFeed::new(title, LogSurface::default());
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => feed.handle(event)?,
                None => break,
            },
            Some(()) = stop.recv() => {
                info!("interrupted, closing quote feed");
                break;
            }
        }
    }
    Ok(feed)
}

fn draw(f: &mut Frame, view: &ChartView<'_>) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),    // Chart box
            Constraint::Length(1), // Status bar
        ])
        .split(f.size());

    let chart_block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", view.title))
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(chart_block.clone(), main_chunks[0]);

    let inner_area = chart_block.inner(main_chunks[0]);
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(inner_area);

    let plot_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(panes[0]);

    draw_line_chart(f, view.window, plot_chunks[0]);
    draw_time_axis(f, view.window, plot_chunks[1]);
    draw_figures(f, view, panes[1]);
    draw_status_bar(f, view, main_chunks[1]);
}

fn draw_line_chart(f: &mut Frame, window: &Window, area: Rect) {
    let values = window.values();
    let points: Vec<(f64, f64)> = window.points().map(|(i, v)| (i as f64, v)).collect();
    let x_limit = window.capacity().saturating_sub(1).max(1) as f64;

    let canvas = Canvas::default()
        .marker(Marker::Braille)
        .x_bounds([0.0, x_limit])
        .y_bounds(y_bounds(window))
        .paint(|ctx| {
            // nulls break the line
            for (i, pair) in values.windows(2).enumerate() {
                if let [Some(y1), Some(y2)] = pair {
                    ctx.draw(&CanvasLine {
                        x1: i as f64,
                        y1: *y1,
                        x2: (i + 1) as f64,
                        y2: *y2,
                        color: Color::Green,
                    });
                }
            }
            ctx.draw(&Points {
                coords: &points,
                color: Color::LightGreen,
            });
        });
    f.render_widget(canvas, area);
}

fn draw_time_axis(f: &mut Frame, window: &Window, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let axis_style = Style::default().fg(Color::DarkGray);

    let first = window.labels().first().map_or("", |l| clock_label(l));
    let last = window.labels().last().map_or("", |l| clock_label(l));
    f.render_widget(Paragraph::new(first).style(axis_style), halves[0]);
    f.render_widget(
        Paragraph::new(last).style(axis_style).alignment(Alignment::Right),
        halves[1],
    );
}

fn draw_figures(f: &mut Frame, view: &ChartView<'_>, area: Rect) {
    let window = view.window;
    let stats = view.stats;
    let bounds = window.bounds();
    let label = Style::default().fg(Color::DarkGray);

    let peak = match &stats.peak {
        Some((value, at)) => format!("{} (@{})", format_price(Some(*value)), clock_label(at)),
        None => "-".to_string(),
    };

    let text = vec![
        Line::from(vec![
            Span::raw("● "),
            Span::styled(
                format_price(window.latest().and_then(|(_, v)| v)),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("  High: ", label),
            Span::raw(format_price(bounds.map(|(_, hi)| hi))),
        ]),
        Line::from(vec![
            Span::styled("  Low:  ", label),
            Span::raw(format_price(bounds.map(|(lo, _)| lo))),
        ]),
        Line::from(vec![Span::styled("  Peak: ", label), Span::raw(peak)]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Pts:  ", label),
            Span::raw(format!("{}/{}", window.filled(), window.capacity())),
        ]),
        Line::from(vec![
            Span::styled("  Recv: ", label),
            Span::raw(format_count(stats.received)),
        ]),
        Line::from(vec![
            Span::styled("  Drop: ", label),
            Span::raw(format_count(stats.dropped)),
        ]),
        Line::from(vec![
            Span::styled("  Rcon: ", label),
            Span::raw(format_count(stats.reconnects)),
        ]),
    ];
    f.render_widget(
        Paragraph::new(text).block(Block::default().style(Style::default().fg(Color::Green))),
        area,
    );
}

fn draw_status_bar(f: &mut Frame, view: &ChartView<'_>, area: Rect) {
    let (badge, badge_color) = match view.status {
        StreamStatus::Connected => (" LIVE ", Color::Green),
        StreamStatus::Connecting { .. } | StreamStatus::Reconnecting { .. } => (" WAIT ", Color::Yellow),
        StreamStatus::Closed { .. } => (" DOWN ", Color::Red),
    };
    let updated = view
        .stats
        .last_update
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    let status_content = Line::from(vec![
        Span::styled(
            badge,
            Style::default().bg(badge_color).fg(Color::Black).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" {}", view.status)),
        Span::raw(" | "),
        Span::styled("Updated: ", Style::default().fg(Color::DarkGray)),
        Span::raw(updated),
        Span::raw(" | Press 'q' to quit"),
    ]);

    let status_bar = Paragraph::new(status_content).style(Style::default().bg(Color::Rgb(20, 20, 20)));
    f.render_widget(status_bar, area);
}

/// Vertical range with a little headroom around the visible values.
fn y_bounds(window: &Window) -> [f64; 2] {
    match window.bounds() {
        None => [0.0, 1.0],
        Some((lo, hi)) => {
            let pad = ((hi - lo) * 0.1)
                .max(lo.abs().max(hi.abs()) * 0.001)
                .max(f64::EPSILON);
            [lo - pad, hi + pad]
        }
    }
}
