//! Human-readable output for notifications, devices and logs.

use std::fmt::Write as _;

use veilproxy_core::device::Device;
use veilproxy_core::ipc::LogEntry;
use veilproxy_core::message::Emoji;
use veilproxy_core::notification::Notification;

/// Column width of one emoji and its description.
const SAS_COLUMN_WIDTH: usize = 12;

/// Terminal cells taken by an emoji glyph.
const EMOJI_WIDTH: usize = 2;

/// One line per notification; SAS strings span three lines.
pub fn notification(notification: &Notification) -> String {
    match notification {
        Notification::Response {
            id,
            identity,
            response,
        } => format!(
            "[{id}] {identity}: {code}: {message}",
            code = response.code,
            message = response.message
        ),
        Notification::VerificationInvite(tx) => format!(
            "{identity}: {user} via {device} wants to verify (transaction {txn})",
            identity = tx.identity,
            user = tx.user_id,
            device = tx.device_id,
            txn = tx.transaction_id
        ),
        Notification::VerificationString { tx, emoji } => format!(
            "Short authentication string for {identity} from {user} via {device}:\n{sas}",
            identity = tx.identity,
            user = tx.user_id,
            device = tx.device_id,
            sas = sas_columns(emoji)
        ),
        Notification::VerificationCancel { tx, reason, code } => format!(
            "{identity}: verification with {user} via {device} cancelled: {reason} ({code})",
            identity = tx.identity,
            user = tx.user_id,
            device = tx.device_id
        ),
        Notification::VerificationDone(tx) => format!(
            "{identity}: device {device} of {user} successfully verified",
            identity = tx.identity,
            user = tx.user_id,
            device = tx.device_id
        ),
    }
}

/// Emoji on the first line, descriptions centered beneath them.
pub fn sas_columns(emoji: &[Emoji]) -> String {
    let symbols: String = emoji.iter().map(|e| center_emoji(&e.symbol)).collect();
    let descriptions: String = emoji
        .iter()
        .map(|e| format!("{:^width$}", e.description, width = SAS_COLUMN_WIDTH))
        .collect();
    format!("{symbols}\n{descriptions}")
}

fn center_emoji(symbol: &str) -> String {
    let padding = SAS_COLUMN_WIDTH - EMOJI_WIDTH;
    let left = padding / 2;
    let mut cell = " ".repeat(left);
    cell.push_str(symbol);
    // Glyphs carrying VARIATION SELECTOR-16 render one cell short.
    if symbol.ends_with('\u{FE0F}') {
        cell.push(' ');
    }
    cell.push_str(&" ".repeat(padding - left));
    cell
}

pub fn device_table(devices: &[Device]) -> String {
    let mut out = String::new();
    for device in devices {
        let _ = writeln!(
            out,
            "  {user} {id:<12} {state:<11} {name}",
            user = device.user_id,
            id = device.device_id,
            state = device.trust_state,
            name = device.display_name.as_deref().unwrap_or("-")
        );
    }
    out
}

pub fn log_line(entry: &LogEntry) -> String {
    let mut line = format!(
        "{:>8.2}s {:>5} {}: {}",
        entry.elapsed_secs, entry.level, entry.target, entry.message
    );
    for (key, value) in &entry.fields {
        let _ = write!(line, " {key}={value}");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use veilproxy_core::correlation::CorrelationId;
    use veilproxy_core::message::{Reply, SasTransaction};

    #[test]
    fn test_emoji_cells_are_centered() {
        assert_eq!(center_emoji("🐶"), "     🐶     ");
    }

    #[test]
    fn test_variation_selector_emoji_gets_extra_space() {
        assert_eq!(center_emoji("☁\u{FE0F}"), "     ☁\u{FE0F}      ");
    }

    #[test]
    fn test_sas_columns() {
        let sas = sas_columns(&[Emoji::new("🐶", "Dog"), Emoji::new("🔑", "Key")]);
        assert_eq!(sas, "     🐶          🔑     \n    Dog         Key     ");
    }

    #[test]
    fn test_long_description_keeps_alignment() {
        let sas = sas_columns(&[Emoji::new("🎅", "Santa"), Emoji::new("☎\u{FE0F}", "Telephone")]);
        let descriptions = sas.lines().nth(1).unwrap();
        assert_eq!(descriptions, "   Santa     Telephone  ");
    }

    #[test]
    fn test_response_line() {
        let line = notification(&Notification::Response {
            id: CorrelationId(7),
            identity: "alice".into(),
            response: Reply::ok("Successfully exported keys"),
        });
        assert_eq!(line, "[7] alice: ok: Successfully exported keys");
    }

    #[test]
    fn test_verification_string_has_three_lines() {
        let text = notification(&Notification::VerificationString {
            tx: SasTransaction::new("alice", "bob", "DEV1", "txn"),
            emoji: vec![Emoji::new("🐶", "Dog")],
        });
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("Short authentication string for alice from bob via DEV1:"));
    }
}
