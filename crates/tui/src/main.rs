//! Status dashboard TUI.
//!
//! Terminal interface for watching Sources, Workers, and the Job queue.
//! Connects to the daemon's read-only status endpoint at
//! http://127.0.0.1:7879/status

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
    Frame, Terminal,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    io::{self, Stdout},
    time::{Duration, Instant},
};

// Hardcoded to the default `status_server.port`; if a deployment changes
// that port in its config file this won't follow it. No flag/config
// reading for it yet.
const STATUS_URL: &str = "http://127.0.0.1:7879/status";
const POLL_INTERVAL_MS: u64 = 1000;
const MAX_EVENT_LOG_ENTRIES: usize = 100;

// ============================================================================
// Data Models (mirroring the daemon's StatusSnapshot)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceJobCounts {
    pub source_id: i64,
    pub source_name: String,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    fn label(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: i64,
    pub source_id: i64,
    pub input_filename: String,
    pub status: JobStatus,
    pub progress: u8,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Running,
    Error,
}

impl WorkerStatus {
    fn label(self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Running => "running",
            WorkerStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub status: WorkerStatus,
    pub current_job_id: Option<i64>,
    pub max_concurrent_jobs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    pub sources: Vec<SourceJobCounts>,
    pub recent_jobs: Vec<Job>,
    pub active_workers: Vec<Worker>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self { sources: Vec::new(), recent_jobs: Vec::new(), active_workers: Vec::new() }
    }
}

// ============================================================================
// App State
// ============================================================================

pub struct App {
    pub snapshot: Option<StatusSnapshot>,
    pub event_log: VecDeque<String>,
    pub connected: bool,
    client: reqwest::Client,
}

impl App {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            event_log: VecDeque::with_capacity(MAX_EVENT_LOG_ENTRIES),
            connected: false,
            client: reqwest::Client::new(),
        }
    }

    pub fn log_event(&mut self, event: String) {
        if self.event_log.len() >= MAX_EVENT_LOG_ENTRIES {
            self.event_log.pop_front();
        }
        self.event_log.push_back(event);
    }

    pub async fn fetch_status(&mut self) {
        match self.client.get(STATUS_URL).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    match response.json::<StatusSnapshot>().await {
                        Ok(snapshot) => {
                            self.snapshot = Some(snapshot);
                            self.connected = true;
                        }
                        Err(e) => {
                            self.log_event(format!("JSON parse error: {}", e));
                            self.connected = false;
                        }
                    }
                } else {
                    self.log_event(format!("HTTP error: {}", response.status()));
                    self.connected = false;
                }
            }
            Err(e) => {
                if self.connected {
                    self.log_event(format!("Connection lost: {}", e));
                }
                self.connected = false;
            }
        }
    }
}

// ============================================================================
// Terminal Setup/Teardown
// ============================================================================

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}

// ============================================================================
// Widget Rendering
// ============================================================================

fn render_jobs_table(f: &mut Frame, area: Rect, app: &App) {
    let header_cells = ["ID", "Source", "File", "Status", "Progress", "Error"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows: Vec<Row> = if let Some(ref snapshot) = app.snapshot {
        snapshot
            .recent_jobs
            .iter()
            .map(|job| {
                Row::new(vec![
                    Cell::from(job.id.to_string()),
                    Cell::from(job.source_id.to_string()),
                    Cell::from(job.input_filename.clone()),
                    Cell::from(job.status.label()),
                    Cell::from(format!("{}%", job.progress)),
                    Cell::from(job.error_message.clone().unwrap_or_default()),
                ])
            })
            .collect()
    } else {
        vec![]
    };

    let widths = [
        Constraint::Length(6),
        Constraint::Length(8),
        Constraint::Length(24),
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Min(20),
    ];

    let title = if app.connected { " Jobs " } else { " Jobs (Disconnected) " };

    let table = Table::new(rows, widths).header(header).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, area);
}

fn render_sources_table(f: &mut Frame, area: Rect, app: &App) {
    let header_cells = ["Source", "Pending", "Processing", "Done", "Failed"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows: Vec<Row> = if let Some(ref snapshot) = app.snapshot {
        snapshot
            .sources
            .iter()
            .map(|s| {
                Row::new(vec![
                    Cell::from(s.source_name.clone()),
                    Cell::from(s.pending.to_string()),
                    Cell::from(s.processing.to_string()),
                    Cell::from(s.completed.to_string()),
                    Cell::from(s.failed.to_string()),
                ])
            })
            .collect()
    } else {
        vec![]
    };

    let widths = [
        Constraint::Length(16),
        Constraint::Length(10),
        Constraint::Length(12),
        Constraint::Length(8),
        Constraint::Length(8),
    ];

    let table = Table::new(rows, widths).header(header).block(Block::default().borders(Borders::ALL).title(" Sources "));
    f.render_widget(table, area);
}

fn render_workers_table(f: &mut Frame, area: Rect, app: &App) {
    let header_cells = ["Worker", "Status", "Slots", "Current Job"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows: Vec<Row> = if let Some(ref snapshot) = app.snapshot {
        snapshot
            .active_workers
            .iter()
            .map(|w| {
                Row::new(vec![
                    Cell::from(w.name.clone()),
                    Cell::from(w.status.label()),
                    Cell::from(w.max_concurrent_jobs.to_string()),
                    Cell::from(w.current_job_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())),
                ])
            })
            .collect()
    } else {
        vec![]
    };

    let widths = [
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(12),
    ];

    let table = Table::new(rows, widths).header(header).block(Block::default().borders(Borders::ALL).title(" Workers "));
    f.render_widget(table, area);
}

fn render_event_log(f: &mut Frame, area: Rect, app: &App) {
    let events: Vec<Line> = app
        .event_log
        .iter()
        .rev()
        .take(area.height as usize - 2)
        .map(|e| Line::from(e.as_str()))
        .collect();

    let paragraph = Paragraph::new(events).block(Block::default().borders(Borders::ALL).title(" Event Log ")).wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let status = if let Some(ref snapshot) = app.snapshot {
        let total_pending: i64 = snapshot.sources.iter().map(|s| s.pending).sum();
        let total_processing: i64 = snapshot.sources.iter().map(|s| s.processing).sum();
        let total_failed: i64 = snapshot.sources.iter().map(|s| s.failed).sum();
        format!(
            " Pending: {} | Processing: {} | Failed: {} | Workers: {} | Press 'q' to quit ",
            total_pending,
            total_processing,
            total_failed,
            snapshot.active_workers.len()
        )
    } else {
        " Connecting to daemon... | Press 'q' to quit ".to_string()
    };

    let paragraph = Paragraph::new(status).style(Style::default().fg(Color::White).bg(Color::DarkGray));
    f.render_widget(paragraph, area);
}

fn ui(f: &mut Frame, app: &App) {
    let size = f.area();

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(size);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(main_chunks[0]);

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(content_chunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Min(0)])
        .split(content_chunks[1]);

    render_jobs_table(f, left_chunks[0], app);
    render_event_log(f, left_chunks[1], app);
    render_sources_table(f, right_chunks[0], app);
    render_workers_table(f, right_chunks[1], app);
    render_status_bar(f, main_chunks[1], app);
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> io::Result<()> {
    let mut terminal = setup_terminal()?;

    let mut app = App::new();
    app.log_event("xdtop started".to_string());

    let result = run_app(&mut terminal, &mut app).await;

    restore_terminal(&mut terminal)?;

    result
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> io::Result<()> {
    let poll_interval = Duration::from_millis(POLL_INTERVAL_MS);
    let mut last_fetch = Instant::now() - poll_interval;

    loop {
        if last_fetch.elapsed() >= poll_interval {
            app.fetch_status().await;
            last_fetch = Instant::now();
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Esc => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
    }
}
