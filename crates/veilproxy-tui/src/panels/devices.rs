//! Devices panel: devices known to the selected identity.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};
use veilproxy_core::device::{Device, TrustState};

use super::PanelState;

#[derive(Default)]
pub struct DevicesPanel {
    identity: Option<String>,
    devices: Vec<Device>,
    scroll_offset: usize,
}

impl DevicesPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_devices(&mut self, identity: Option<String>, devices: Vec<Device>) {
        if identity != self.identity {
            self.scroll_offset = 0;
        }
        self.identity = identity;
        self.devices = devices;
        self.scroll_offset = self
            .scroll_offset
            .min(self.devices.len().saturating_sub(1));
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let Some(identity) = &self.identity else {
            let empty = Paragraph::new("  (no managed identity)")
                .style(Style::default().fg(Color::DarkGray))
                .block(Block::default().title(" Devices ").borders(Borders::ALL));
            frame.render_widget(empty, area);
            return;
        };

        let rows: Vec<Row> = self
            .devices
            .iter()
            .skip(self.scroll_offset)
            .map(|device| {
                Row::new(vec![
                    Cell::from(device.user_id.as_str()),
                    Cell::from(device.device_id.as_str()),
                    Cell::from(Span::styled(
                        device.trust_state.as_str(),
                        trust_style(device.trust_state),
                    )),
                    Cell::from(device.display_name.as_deref().unwrap_or("-")),
                ])
            })
            .collect();

        let title = format!(" Devices of {identity} ({}) ", self.devices.len());
        let table = Table::new(
            rows,
            [
                Constraint::Min(20),
                Constraint::Length(14),
                Constraint::Length(12),
                Constraint::Min(10),
            ],
        )
        .header(
            Row::new(vec!["User", "Device", "Trust", "Name"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(table, area);
    }
}

fn trust_style(state: TrustState) -> Style {
    match state {
        TrustState::Verified => Style::default().fg(Color::Green),
        TrustState::Blacklisted => Style::default().fg(Color::Red),
        TrustState::Ignored => Style::default().fg(Color::DarkGray),
        TrustState::Unverified => Style::default().fg(Color::Yellow),
    }
}

impl PanelState for DevicesPanel {
    fn scroll_down(&mut self, n: usize) {
        let max_offset = self.devices.len().saturating_sub(1);
        self.scroll_offset = self.scroll_offset.saturating_add(n).min(max_offset);
    }
    fn scroll_up(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }
    fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
    }
    fn scroll_to_bottom(&mut self) {
        self.scroll_offset = self.devices.len().saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> Device {
        Device {
            user_id: "bob".to_string(),
            device_id: id.to_string(),
            display_name: None,
            trust_state: TrustState::Unverified,
            ed25519: String::new(),
            curve25519: String::new(),
        }
    }

    #[test]
    fn test_scroll_clamped_to_devices() {
        let mut panel = DevicesPanel::new();
        panel.set_devices(Some("alice".into()), vec![device("A"), device("B")]);
        panel.scroll_down(10);
        assert_eq!(panel.scroll_offset, 1);
        panel.scroll_up(10);
        assert_eq!(panel.scroll_offset, 0);
    }

    #[test]
    fn test_switching_identity_resets_scroll() {
        let mut panel = DevicesPanel::new();
        panel.set_devices(Some("alice".into()), vec![device("A"), device("B")]);
        panel.scroll_to_bottom();
        panel.set_devices(Some("carol".into()), vec![device("A"), device("B")]);
        assert_eq!(panel.scroll_offset, 0);
    }

    #[test]
    fn test_shrinking_list_clamps_scroll() {
        let mut panel = DevicesPanel::new();
        panel.set_devices(Some("alice".into()), vec![device("A"), device("B"), device("C")]);
        panel.scroll_to_bottom();
        panel.set_devices(Some("alice".into()), vec![device("A")]);
        assert_eq!(panel.scroll_offset, 0);
        assert_eq!(panel.devices().len(), 1);
    }
}
