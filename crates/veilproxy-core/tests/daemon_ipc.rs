//! The daemon served over its Unix socket, driven through `IpcClient`.

use std::time::Duration;

use pretty_assertions::assert_eq;

use veilproxy_core::device::TrustState;
use veilproxy_core::ipc::{IpcClient, IpcClientError, NotificationsResponse};
use veilproxy_core::message::ResponseCode;
use veilproxy_core::notification::Notification;
use veilproxy_test_utils::daemon::TestDaemon;
use veilproxy_test_utils::fixtures::{ALICE, BOB, BOB_DEVICE};

async fn wait_for_notifications(client: &IpcClient, count: usize) -> NotificationsResponse {
    for _ in 0..200 {
        let resp = client.notifications(0, 100).await.unwrap();
        if resp.notifications.len() >= count {
            return resp;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} notifications");
}

#[test_log::test(tokio::test)]
async fn verify_device_over_ipc() {
    let daemon = TestDaemon::start().await;
    let client = daemon.client();

    let users = client.list_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, ALICE);

    let issued = client.verify_device(ALICE, BOB, BOB_DEVICE).await.unwrap();
    let resp = wait_for_notifications(&client, 1).await;
    match &resp.notifications[0].notification {
        Notification::Response { id, response, .. } => {
            assert_eq!(*id, issued.id);
            assert_eq!(response.code, ResponseCode::Ok);
        }
        other => panic!("unexpected notification {other:?}"),
    }

    let devices = client.list_user_devices(ALICE, BOB).await.unwrap();
    assert_eq!(devices[0].trust_state, TrustState::Verified);

    daemon.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn key_commands_are_unsupported_by_the_local_core() {
    let daemon = TestDaemon::start().await;
    let client = daemon.client();

    client
        .export_keys(ALICE, "/tmp/keys.txt", "secret")
        .await
        .unwrap();
    let resp = wait_for_notifications(&client, 1).await;
    match &resp.notifications[0].notification {
        Notification::Response { response, .. } => {
            assert_eq!(response.code, ResponseCode::Unsupported);
        }
        other => panic!("unexpected notification {other:?}"),
    }

    daemon.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn missing_argument_is_a_client_error() {
    let daemon = TestDaemon::start().await;
    let client = daemon.client();

    let err = client.export_keys(ALICE, "", "secret").await.unwrap_err();
    assert!(matches!(err, IpcClientError::Daemon { status: 400, .. }));

    let status = client.status().await.unwrap();
    assert_eq!(status.next_correlation_id.get(), 0);

    daemon.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn stop_over_ipc_ends_the_daemon() {
    let daemon = TestDaemon::start().await;
    let client = daemon.client();

    assert!(client.stop().await.unwrap().acknowledged);
    daemon.shutdown().await.unwrap();
}
