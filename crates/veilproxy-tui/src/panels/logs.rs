//! Logs panel: the daemon's recent log entries.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem},
};
use veilproxy_core::ipc::LogEntry;

use super::PanelState;

/// Scrollable viewer of the daemon's log ring, with auto-follow.
pub struct LogsPanel {
    /// Snapshot of the daemon's entries (replaced on tick).
    entries: Vec<LogLine>,
    /// Scroll offset (0 = bottom/latest).
    scroll_offset: usize,
    /// Whether to auto-follow (stick to bottom).
    auto_follow: bool,
}

struct LogLine {
    elapsed: String,
    level: String,
    target: String,
    message: String,
}

impl LogsPanel {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            scroll_offset: 0,
            auto_follow: true,
        }
    }

    /// Replace the snapshot with the entries served by `/logs`.
    pub fn set_entries(&mut self, entries: Vec<LogEntry>) {
        self.entries = entries
            .into_iter()
            .map(|e| {
                let mut message = e.message;
                for (key, value) in &e.fields {
                    message.push_str(&format!(" {key}={value}"));
                }
                LogLine {
                    elapsed: format!("{:>8.2}s", e.elapsed_secs),
                    level: e.level,
                    target: e.target,
                    message,
                }
            })
            .collect();

        // If auto-following, keep scroll at bottom
        if self.auto_follow {
            self.scroll_offset = 0;
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let visible_height = area.height.saturating_sub(2) as usize; // minus borders

        if self.entries.is_empty() {
            let empty = ratatui::widgets::Paragraph::new("  (no log entries yet)")
                .style(Style::default().fg(Color::DarkGray))
                .block(Block::default().title(" Logs (0) ").borders(Borders::ALL));
            frame.render_widget(empty, area);
            return;
        }

        let total = self.entries.len();
        let skip = if total > visible_height + self.scroll_offset {
            total - visible_height - self.scroll_offset
        } else {
            0
        };

        let items: Vec<ListItem> = self
            .entries
            .iter()
            .skip(skip)
            .take(visible_height)
            .map(|entry| {
                let level_style = match entry.level.as_str() {
                    "ERROR" => Style::default().fg(Color::Red),
                    "WARN" => Style::default().fg(Color::Yellow),
                    "INFO" => Style::default().fg(Color::Green),
                    "DEBUG" => Style::default().fg(Color::Blue),
                    _ => Style::default().fg(Color::DarkGray),
                };

                let line = Line::from(vec![
                    Span::styled(
                        format!("{} ", entry.elapsed),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(format!("{:>5} ", entry.level), level_style),
                    Span::styled(
                        format!("{}: ", entry.target),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::raw(&entry.message),
                ]);
                ListItem::new(line)
            })
            .collect();

        let follow_indicator = if self.auto_follow { " [follow]" } else { "" };
        let title = format!(" Logs ({total}){follow_indicator} ");

        let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(list, area);
    }
}

impl Default for LogsPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelState for LogsPanel {
    fn scroll_down(&mut self, n: usize) {
        if self.scroll_offset >= n {
            self.scroll_offset -= n;
        } else {
            self.scroll_offset = 0;
            self.auto_follow = true;
        }
    }

    fn scroll_up(&mut self, n: usize) {
        self.auto_follow = false;
        let max_offset = self.entries.len().saturating_sub(1);
        self.scroll_offset = (self.scroll_offset + n).min(max_offset);
    }

    fn scroll_to_top(&mut self) {
        self.auto_follow = false;
        self.scroll_offset = self.entries.len().saturating_sub(1);
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
        self.auto_follow = true;
    }
}
