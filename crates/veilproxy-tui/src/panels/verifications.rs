//! Verifications panel: notification feed and open SAS transactions.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph},
};
use veilproxy_core::message::{Emoji, ResponseCode, SasTransaction};
use veilproxy_core::notification::{Notification, SequencedNotification};

use super::PanelState;

/// Feed lines kept in memory.
const FEED_CAPACITY: usize = 500;

/// A SAS transaction that has been offered but not finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVerification {
    pub tx: SasTransaction,
    /// Present once the short authentication string arrived.
    pub emoji: Option<Vec<Emoji>>,
}

struct FeedLine {
    seq: u64,
    style: Style,
    text: String,
}

pub struct VerificationsPanel {
    feed: Vec<FeedLine>,
    pending: Vec<PendingVerification>,
    last_seq: u64,
    scroll_offset: usize,
    auto_follow: bool,
}

impl VerificationsPanel {
    pub fn new() -> Self {
        Self {
            feed: Vec::new(),
            pending: Vec::new(),
            last_seq: 0,
            scroll_offset: 0,
            auto_follow: true,
        }
    }

    /// Highest sequence number seen so far.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Open transactions, oldest first.
    pub fn pending(&self) -> &[PendingVerification] {
        &self.pending
    }

    /// The transaction `a`/`c`/`x` act on.
    pub fn most_recent(&self) -> Option<&PendingVerification> {
        self.pending.last()
    }

    /// Apply polled notifications. Entries at or below `last_seq` are ignored.
    pub fn push(&mut self, entries: Vec<SequencedNotification>) {
        for entry in entries {
            if entry.seq <= self.last_seq {
                continue;
            }
            self.last_seq = entry.seq;
            self.track(&entry.notification);
            let (style, text) = describe(&entry.notification);
            self.feed.push(FeedLine {
                seq: entry.seq,
                style,
                text,
            });
        }

        if self.feed.len() > FEED_CAPACITY {
            let excess = self.feed.len() - FEED_CAPACITY;
            self.feed.drain(..excess);
        }
        if self.auto_follow {
            self.scroll_offset = 0;
        }
    }

    fn track(&mut self, notification: &Notification) {
        match notification {
            Notification::VerificationInvite(tx) => {
                if self.position(tx).is_none() {
                    self.pending.push(PendingVerification {
                        tx: tx.clone(),
                        emoji: None,
                    });
                }
            }
            Notification::VerificationString { tx, emoji } => match self.position(tx) {
                Some(index) => self.pending[index].emoji = Some(emoji.clone()),
                None => self.pending.push(PendingVerification {
                    tx: tx.clone(),
                    emoji: Some(emoji.clone()),
                }),
            },
            Notification::VerificationCancel { tx, .. } | Notification::VerificationDone(tx) => {
                if let Some(index) = self.position(tx) {
                    self.pending.remove(index);
                }
            }
            Notification::Response { .. } => {}
        }
    }

    fn position(&self, tx: &SasTransaction) -> Option<usize> {
        self.pending.iter().position(|p| p.tx == *tx)
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(6), Constraint::Min(0)])
            .split(area);

        let pending = match self.most_recent() {
            Some(open) => {
                let mut lines = vec![Line::from(format!(
                    "{} ↔ {} via {} (transaction {})",
                    open.tx.identity, open.tx.user_id, open.tx.device_id, open.tx.transaction_id
                ))];
                match &open.emoji {
                    Some(emoji) => {
                        lines.push(Line::from(
                            emoji
                                .iter()
                                .map(|e| format!("{} {}", e.symbol, e.description))
                                .collect::<Vec<_>>()
                                .join("  "),
                        ));
                        lines.push(Line::from(Span::styled(
                            "c:confirm  x:cancel",
                            Style::default().fg(Color::DarkGray),
                        )));
                    }
                    None => lines.push(Line::from(Span::styled(
                        "a:accept  x:cancel",
                        Style::default().fg(Color::DarkGray),
                    ))),
                }
                Paragraph::new(lines)
            }
            None => Paragraph::new("  (no open verification)")
                .style(Style::default().fg(Color::DarkGray)),
        };
        let title = format!(" Open verifications ({}) ", self.pending.len());
        frame.render_widget(
            pending.block(Block::default().title(title).borders(Borders::ALL)),
            chunks[0],
        );

        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = self.feed.len();
        let skip = total.saturating_sub(visible_height + self.scroll_offset);
        let items: Vec<ListItem> = self
            .feed
            .iter()
            .skip(skip)
            .take(visible_height)
            .map(|line| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{:>5} ", line.seq),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(line.text.as_str(), line.style),
                ]))
            })
            .collect();

        let title = format!(" Notifications ({total}) ");
        let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(list, chunks[1]);
    }
}

fn describe(notification: &Notification) -> (Style, String) {
    match notification {
        Notification::Response {
            id,
            identity,
            response,
        } => {
            let style = match response.code {
                ResponseCode::Ok => Style::default().fg(Color::Green),
                ResponseCode::Error => Style::default().fg(Color::Red),
                ResponseCode::Unsupported => Style::default().fg(Color::Yellow),
            };
            (style, format!("[{id}] {identity}: {}", response.message))
        }
        Notification::VerificationInvite(tx) => (
            Style::default().fg(Color::Cyan),
            format!(
                "{}: {} via {} wants to verify",
                tx.identity, tx.user_id, tx.device_id
            ),
        ),
        Notification::VerificationString { tx, .. } => (
            Style::default().fg(Color::Cyan),
            format!(
                "{}: short authentication string for {} via {}",
                tx.identity, tx.user_id, tx.device_id
            ),
        ),
        Notification::VerificationCancel { tx, reason, .. } => (
            Style::default().fg(Color::Red),
            format!(
                "{}: verification with {} via {} cancelled: {reason}",
                tx.identity, tx.user_id, tx.device_id
            ),
        ),
        Notification::VerificationDone(tx) => (
            Style::default().fg(Color::Green),
            format!(
                "{}: device {} of {} verified",
                tx.identity, tx.device_id, tx.user_id
            ),
        ),
    }
}

impl Default for VerificationsPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelState for VerificationsPanel {
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
        let max_offset = self.feed.len().saturating_sub(1);
        self.scroll_offset = (self.scroll_offset + n).min(max_offset);
    }

    fn scroll_to_top(&mut self) {
        self.auto_follow = false;
        self.scroll_offset = self.feed.len().saturating_sub(1);
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
        self.auto_follow = true;
    }
}
