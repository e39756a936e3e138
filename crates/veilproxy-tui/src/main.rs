#![deny(unsafe_code)]

//! veilproxy TUI: interactive terminal control plane.

mod app;
mod keymap;
mod panels;

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Tabs},
};
use tracing::info;

use veilproxy_config::AppConfig;
use veilproxy_core::ipc::IpcClient;
use veilproxy_core::ipc::server::socket_path_from_config;

use app::{ALL_PANELS, App, Panel, Request};

/// Interval between daemon polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Watch and drive a running veilproxy daemon.
#[derive(Parser)]
#[command(name = "veilproxy-tui", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "veilproxy.toml")]
    config: PathBuf,

    /// Daemon socket; overrides the configured one.
    #[arg(short, long)]
    socket: Option<PathBuf>,
}

fn render(app: &App, frame: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // tabs
            Constraint::Min(1),    // main content
            Constraint::Length(3), // status bar
        ])
        .split(frame.area());

    let connection = if app.connected {
        Span::styled(" connected ", Style::default().fg(Color::Green))
    } else {
        Span::styled(" disconnected ", Style::default().fg(Color::Red))
    };
    let tabs = Tabs::new(
        ALL_PANELS
            .iter()
            .enumerate()
            .map(|(i, panel)| format!("{} {}", i + 1, panel.title())),
    )
    .select(app.active_panel.index())
    .highlight_style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )
    .block(
        Block::default()
            .title(" veilproxy ")
            .title(Line::from(connection).right_aligned())
            .borders(Borders::ALL),
    );
    frame.render_widget(tabs, chunks[0]);

    match app.active_panel {
        Panel::Dashboard => app.dashboard.render(frame, chunks[1]),
        Panel::Devices => app.devices.render(frame, chunks[1]),
        Panel::Verifications => app.verifications.render(frame, chunks[1]),
        Panel::Logs => app.logs.render(frame, chunks[1]),
    }

    let status_text = match &app.message {
        Some(message) => format!(" {message}  |{}", app.status_line()),
        None => app.status_line(),
    };
    let status = Paragraph::new(status_text)
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status, chunks[2]);
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, client: &IpcClient) -> Result<()> {
    let mut app = App::new();
    app.refresh(client).await;
    let mut last_poll = Instant::now();

    while !app.should_quit {
        terminal.draw(|frame| render(&app, frame))?;

        let timeout = POLL_INTERVAL.saturating_sub(last_poll.elapsed());
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            let action = app.keymap.resolve(key.code);
            if let Some(request) = app.handle_action(action) {
                app.perform(client, request).await;
            }
        }

        if last_poll.elapsed() >= POLL_INTERVAL {
            app.perform(client, Request::Refresh).await;
            last_poll = Instant::now();
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (best-effort)
    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)
            .await
            .unwrap_or_else(|_| AppConfig::default())
    } else {
        AppConfig::default()
    };
    let socket = cli
        .socket
        .unwrap_or_else(|| socket_path_from_config(&config));
    let client = IpcClient::new(&socket);

    info!(socket = %socket.display(), "Starting veilproxy TUI");

    // Set up terminal
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let result = run(&mut terminal, &client).await;

    // Restore terminal
    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    result
}
