//! Dashboard panel: daemon status and managed identities.

use std::time::Duration;

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};
use veilproxy_core::ipc::{ManagedIdentity, StatusResponse};

use super::PanelState;

/// Dashboard panel state: last daemon status plus the identity list.
#[derive(Default)]
pub struct DashboardPanel {
    pub status: Option<StatusResponse>,
    pub identities: Vec<ManagedIdentity>,
    /// Index into `identities` of the identity shown on the Devices panel.
    pub selected: usize,
    pub scroll_offset: usize,
}

impl DashboardPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the identity list, keeping the selection on the same user.
    pub fn set_identities(&mut self, identities: Vec<ManagedIdentity>) {
        let current = self.selected_identity().map(str::to_owned);
        self.identities = identities;
        self.selected = current
            .and_then(|user| self.identities.iter().position(|i| i.user_id == user))
            .unwrap_or(0);
    }

    pub fn selected_identity(&self) -> Option<&str> {
        self.identities
            .get(self.selected)
            .map(|identity| identity.user_id.as_str())
    }

    pub fn select_next(&mut self) {
        if !self.identities.is_empty() {
            self.selected = (self.selected + 1) % self.identities.len();
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(7), Constraint::Min(0)])
            .split(area);

        let status_text = match &self.status {
            Some(status) => vec![
                Line::from(vec![
                    Span::styled("Status: ", Style::default().fg(Color::Gray)),
                    Span::styled("running", Style::default().fg(Color::Green)),
                    Span::raw(format!("  pid {}", status.pid)),
                ]),
                Line::from(vec![
                    Span::styled("Uptime: ", Style::default().fg(Color::Gray)),
                    Span::raw(format_duration(Duration::from_secs(status.uptime_secs))),
                ]),
                Line::from(vec![
                    Span::styled("Version: ", Style::default().fg(Color::Gray)),
                    Span::raw(format!("{} ({})", status.version, status.git_hash)),
                ]),
                Line::from(vec![
                    Span::styled("Devices: ", Style::default().fg(Color::Gray)),
                    Span::raw(format!(
                        "{} cached, next command id {}",
                        status.cached_devices, status.next_correlation_id
                    )),
                ]),
                Line::from(vec![
                    Span::styled("Servers: ", Style::default().fg(Color::Gray)),
                    Span::raw(
                        status
                            .servers
                            .iter()
                            .map(|s| format!("{} {}", s.name, s.listen))
                            .collect::<Vec<_>>()
                            .join(", "),
                    ),
                ]),
            ],
            None => vec![Line::from(vec![
                Span::styled("Status: ", Style::default().fg(Color::Gray)),
                Span::styled("not connected", Style::default().fg(Color::Red)),
            ])],
        };
        let status = Paragraph::new(status_text)
            .block(Block::default().title(" Status ").borders(Borders::ALL));
        frame.render_widget(status, chunks[0]);

        let rows: Vec<Row> = self
            .identities
            .iter()
            .enumerate()
            .skip(self.scroll_offset)
            .map(|(index, identity)| {
                let marker = if index == self.selected { ">" } else { " " };
                let style = if index == self.selected {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    Cell::from(marker),
                    Cell::from(identity.user_id.as_str()),
                    Cell::from(identity.device_id.as_str()),
                ])
                .style(style)
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(2),
                Constraint::Min(20),
                Constraint::Length(14),
            ],
        )
        .header(
            Row::new(vec!["", "Identity", "Device"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().title(" Identities ").borders(Borders::ALL));
        frame.render_widget(table, chunks[1]);
    }
}

impl PanelState for DashboardPanel {
    fn scroll_down(&mut self, n: usize) {
        let max_offset = self.identities.len().saturating_sub(1);
        self.scroll_offset = self.scroll_offset.saturating_add(n).min(max_offset);
    }
    fn scroll_up(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }
    fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
    }
    fn scroll_to_bottom(&mut self) {
        self.scroll_offset = self.identities.len().saturating_sub(1);
    }
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
