//! Core TUI application state and event handling.

use veilproxy_core::ipc::{IpcClient, IpcClientError};
use veilproxy_core::message::SasTransaction;

use crate::keymap::{Action, KeyMapper};
use crate::panels::{DashboardPanel, DevicesPanel, LogsPanel, PanelState, VerificationsPanel};

/// Log entries fetched per tick.
const LOG_TAIL: usize = 500;

/// Notifications fetched per tick.
const NOTIFICATION_BATCH: usize = 200;

/// The panels available in the TUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Dashboard,
    Devices,
    Verifications,
    Logs,
}

impl Panel {
    pub fn title(self) -> &'static str {
        match self {
            Panel::Dashboard => "Dashboard",
            Panel::Devices => "Devices",
            Panel::Verifications => "Verifications",
            Panel::Logs => "Logs",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Panel::Dashboard => 0,
            Panel::Devices => 1,
            Panel::Verifications => 2,
            Panel::Logs => 3,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Panel::Dashboard => Panel::Devices,
            Panel::Devices => Panel::Verifications,
            Panel::Verifications => Panel::Logs,
            Panel::Logs => Panel::Dashboard,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Panel::Dashboard => Panel::Logs,
            Panel::Devices => Panel::Dashboard,
            Panel::Verifications => Panel::Devices,
            Panel::Logs => Panel::Verifications,
        }
    }
}

pub const ALL_PANELS: [Panel; 4] = [
    Panel::Dashboard,
    Panel::Devices,
    Panel::Verifications,
    Panel::Logs,
];

/// A daemon call requested by a key press, run by the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Refresh,
    Accept(SasTransaction),
    Confirm(SasTransaction),
    Cancel(SasTransaction),
}

/// TUI application state.
pub struct App {
    /// Whether the application should quit.
    pub should_quit: bool,

    /// Currently selected panel.
    pub active_panel: Panel,

    /// Key mapper for vim-style bindings.
    pub keymap: KeyMapper,

    /// Whether the last poll reached the daemon.
    pub connected: bool,

    /// Transient message shown above the key help.
    pub message: Option<String>,

    pub dashboard: DashboardPanel,
    pub devices: DevicesPanel,
    pub verifications: VerificationsPanel,
    pub logs: LogsPanel,
}

impl App {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            active_panel: Panel::Dashboard,
            keymap: KeyMapper::new(),
            connected: false,
            message: None,
            dashboard: DashboardPanel::new(),
            devices: DevicesPanel::new(),
            verifications: VerificationsPanel::new(),
            logs: LogsPanel::new(),
        }
    }

    /// Process a resolved action, returning the daemon call it asks for.
    pub fn handle_action(&mut self, action: Action) -> Option<Request> {
        match action {
            Action::Quit => self.should_quit = true,
            Action::NextPanel => self.active_panel = self.active_panel.next(),
            Action::PrevPanel => self.active_panel = self.active_panel.prev(),
            Action::GoToPanel(n) => {
                if let Some(&panel) = ALL_PANELS.get(n) {
                    self.active_panel = panel;
                }
            }
            Action::ScrollDown => self.active_panel_state_mut().scroll_down(1),
            Action::ScrollUp => self.active_panel_state_mut().scroll_up(1),
            Action::HalfPageDown => self.active_panel_state_mut().scroll_down(10),
            Action::HalfPageUp => self.active_panel_state_mut().scroll_up(10),
            Action::ScrollToTop => self.active_panel_state_mut().scroll_to_top(),
            Action::ScrollToBottom => self.active_panel_state_mut().scroll_to_bottom(),
            Action::NextIdentity => {
                self.dashboard.select_next();
                return Some(Request::Refresh);
            }
            Action::Refresh => return Some(Request::Refresh),
            Action::AcceptVerification => return self.verification_request(Request::Accept),
            Action::ConfirmVerification => return self.verification_request(Request::Confirm),
            Action::CancelVerification => return self.verification_request(Request::Cancel),
            Action::None => {}
        }
        None
    }

    fn verification_request(&mut self, request: fn(SasTransaction) -> Request) -> Option<Request> {
        match self.verifications.most_recent() {
            Some(open) => Some(request(open.tx.clone())),
            None => {
                self.message = Some("No open verification".to_string());
                None
            }
        }
    }

    /// Run a request against the daemon.
    pub async fn perform(&mut self, client: &IpcClient, request: Request) {
        let issued = match &request {
            Request::Refresh => {
                self.refresh(client).await;
                return;
            }
            Request::Accept(tx) => {
                client
                    .accept_verification(&tx.identity, &tx.user_id, &tx.device_id)
                    .await
            }
            Request::Confirm(tx) => {
                client
                    .confirm_verification(&tx.identity, &tx.user_id, &tx.device_id)
                    .await
            }
            Request::Cancel(tx) => {
                client
                    .cancel_verification(&tx.identity, &tx.user_id, &tx.device_id)
                    .await
            }
        };
        self.message = Some(match issued {
            Ok(issued) => format!("Command {} sent", issued.id),
            Err(e) => format!("Request failed: {e}"),
        });
    }

    /// Tick: poll the daemon and update every panel.
    pub async fn refresh(&mut self, client: &IpcClient) {
        match self.poll(client).await {
            Ok(()) => self.connected = true,
            Err(e) => {
                self.connected = false;
                self.dashboard.status = None;
                self.message = Some(e.to_string());
            }
        }
    }

    async fn poll(&mut self, client: &IpcClient) -> Result<(), IpcClientError> {
        self.dashboard.status = Some(client.status().await?);
        self.dashboard.set_identities(client.list_users().await?);

        let identity = self.dashboard.selected_identity().map(str::to_owned);
        let devices = match &identity {
            Some(identity) => client.list_devices(identity).await?,
            None => Vec::new(),
        };
        self.devices.set_devices(identity, devices);

        let notifications = client
            .notifications(self.verifications.last_seq(), NOTIFICATION_BATCH)
            .await?;
        self.verifications.push(notifications.notifications);

        self.logs.set_entries(client.logs(LOG_TAIL).await?.entries);
        Ok(())
    }

    fn active_panel_state_mut(&mut self) -> &mut dyn PanelState {
        match self.active_panel {
            Panel::Dashboard => &mut self.dashboard,
            Panel::Devices => &mut self.devices,
            Panel::Verifications => &mut self.verifications,
            Panel::Logs => &mut self.logs,
        }
    }

    /// Get the status line text.
    pub fn status_line(&self) -> String {
        format!(
            " q:quit  Tab/l:next  h:prev  j/k:scroll  i:identity  a/c/x:accept/confirm/cancel  r:refresh  [{panel}]",
            panel = self.active_panel.title()
        )
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::Action;
    use pretty_assertions::assert_eq;
    use veilproxy_core::device::TrustState;
    use veilproxy_core::notification::{Notification, SequencedNotification};
    use veilproxy_test_utils::daemon::TestDaemon;
    use veilproxy_test_utils::fixtures::{ALICE, BOB, BOB_DEVICE};

    fn invite(seq: u64, txn: &str) -> SequencedNotification {
        SequencedNotification {
            seq,
            notification: Notification::VerificationInvite(SasTransaction::new(
                ALICE, BOB, BOB_DEVICE, txn,
            )),
        }
    }

    // ── Panel enum tests ──────────────────────────────────────────

    #[test]
    fn test_panel_titles() {
        assert_eq!(Panel::Dashboard.title(), "Dashboard");
        assert_eq!(Panel::Devices.title(), "Devices");
        assert_eq!(Panel::Verifications.title(), "Verifications");
        assert_eq!(Panel::Logs.title(), "Logs");
    }

    #[test]
    fn test_panel_indices_match_order() {
        for (i, panel) in ALL_PANELS.iter().enumerate() {
            assert_eq!(panel.index(), i);
        }
    }

    #[test]
    fn test_panel_next_prev_wrap() {
        for panel in ALL_PANELS {
            assert_eq!(panel.next().prev(), panel);
        }
        assert_eq!(Panel::Logs.next(), Panel::Dashboard);
        assert_eq!(Panel::Dashboard.prev(), Panel::Logs);
    }

    // ── Action handling ───────────────────────────────────────────

    #[test]
    fn test_quit_action() {
        let mut app = App::new();
        assert_eq!(app.handle_action(Action::Quit), None);
        assert!(app.should_quit);
    }

    #[test]
    fn test_goto_panel() {
        let mut app = App::new();

        app.handle_action(Action::GoToPanel(2));
        assert_eq!(app.active_panel, Panel::Verifications);

        // Out of bounds: no change
        app.handle_action(Action::GoToPanel(99));
        assert_eq!(app.active_panel, Panel::Verifications);
    }

    #[test]
    fn test_scroll_actions_no_panic() {
        let mut app = App::new();
        for i in 0..ALL_PANELS.len() {
            app.handle_action(Action::GoToPanel(i));
            app.handle_action(Action::ScrollDown);
            app.handle_action(Action::ScrollUp);
            app.handle_action(Action::HalfPageDown);
            app.handle_action(Action::HalfPageUp);
            app.handle_action(Action::ScrollToTop);
            app.handle_action(Action::ScrollToBottom);
        }
    }

    #[test]
    fn test_verification_keys_without_open_transaction() {
        let mut app = App::new();
        assert_eq!(app.handle_action(Action::AcceptVerification), None);
        assert_eq!(app.message.as_deref(), Some("No open verification"));
    }

    #[test]
    fn test_verification_keys_target_most_recent() {
        let mut app = App::new();
        app.verifications.push(vec![invite(1, "t1"), invite(2, "t2")]);

        match app.handle_action(Action::ConfirmVerification) {
            Some(Request::Confirm(tx)) => assert_eq!(tx.transaction_id, "t2"),
            other => panic!("unexpected request {other:?}"),
        }
        assert!(matches!(
            app.handle_action(Action::CancelVerification),
            Some(Request::Cancel(_))
        ));
    }

    #[test]
    fn test_refresh_and_identity_request_refresh() {
        let mut app = App::new();
        assert_eq!(app.handle_action(Action::Refresh), Some(Request::Refresh));
        assert_eq!(app.handle_action(Action::NextIdentity), Some(Request::Refresh));
    }

    #[test]
    fn test_status_line_contains_panel_name() {
        let mut app = App::new();
        assert!(app.status_line().contains("[Dashboard]"));

        app.handle_action(Action::NextPanel);
        assert!(app.status_line().contains("[Devices]"));
    }

    // ── Daemon polling ────────────────────────────────────────────

    #[tokio::test]
    async fn test_refresh_without_daemon_marks_disconnected() {
        let mut app = App::new();
        let client = IpcClient::new("/tmp/veilproxy-tui-test-missing.sock");
        app.refresh(&client).await;
        assert!(!app.connected);
        assert!(app.message.is_some());
    }

    #[test_log::test(tokio::test)]
    async fn test_refresh_populates_panels() {
        let daemon = TestDaemon::start().await;
        let client = daemon.client();
        let mut app = App::new();

        app.refresh(&client).await;
        assert!(app.connected);
        assert_eq!(app.dashboard.selected_identity(), Some(ALICE));
        assert_eq!(app.devices.devices().len(), 1);
        assert_eq!(app.devices.devices()[0].trust_state, TrustState::Unverified);

        client.verify_device(ALICE, BOB, BOB_DEVICE).await.unwrap();
        for _ in 0..100 {
            app.refresh(&client).await;
            if app.devices.devices()[0].trust_state == TrustState::Verified {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(app.devices.devices()[0].trust_state, TrustState::Verified);
        assert!(app.verifications.last_seq() >= 1);

        daemon.shutdown().await.unwrap();
    }
}
