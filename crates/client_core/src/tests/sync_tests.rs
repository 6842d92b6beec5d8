use super::*;
use crate::tests::{client_for, spawn_fake_server, unreachable_server_url, FakeServer};
use std::sync::atomic::Ordering;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for_state(
    rx: &mut watch::Receiver<SyncState>,
    predicate: impl FnMut(&SyncState) -> bool,
) -> SyncState {
    timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("state change in time")
        .expect("session alive")
        .clone()
}

fn parked(location: &str, user: &str, timestamp_raw: i64) -> ParkingStatus {
    ParkingStatus {
        location: location.into(),
        user: user.into(),
        timestamp: "19:30 19 ene".into(),
        timestamp_raw,
    }
}

#[tokio::test]
async fn starts_loading_then_shows_server_record() {
    let fake = FakeServer::default();
    *fake.status.lock().await = parked("Petroprix", "Celia", 1000);
    fake.set_read_delay(Duration::from_millis(50));
    let session = SyncSession::start(
        client_for(&spawn_fake_server(fake).await),
        Duration::from_secs(60),
    );
    let mut rx = session.subscribe();
    assert_eq!(session.state(), SyncState::Loading);

    let state = wait_for_state(&mut rx, |s| matches!(s, SyncState::Success(_))).await;
    assert_eq!(state.status(), Some(&parked("Petroprix", "Celia", 1000)));
}

#[tokio::test]
async fn picks_up_writes_from_other_clients() {
    let fake = FakeServer::default();
    let session = SyncSession::start(
        client_for(&spawn_fake_server(fake.clone()).await),
        Duration::from_millis(30),
    );
    let mut rx = session.subscribe();
    wait_for_state(&mut rx, |s| matches!(s, SyncState::Success(_))).await;

    *fake.status.lock().await = parked("Mercadona", "Víctor", 2000);
    let state = wait_for_state(&mut rx, |s| {
        s.status().map(|st| st.location.as_str()) == Some("Mercadona")
    })
    .await;
    assert_eq!(state.status().map(|s| s.timestamp_raw), Some(2000));
}

#[tokio::test]
async fn keeps_polling_when_every_fetch_fails() {
    let fake = FakeServer::default();
    fake.fail_reads.store(true, Ordering::SeqCst);
    let session = SyncSession::start(
        client_for(&spawn_fake_server(fake.clone()).await),
        Duration::from_millis(20),
    );
    let mut rx = session.subscribe();

    let state = wait_for_state(&mut rx, |s| matches!(s, SyncState::Error(_))).await;
    let SyncState::Error(message) = state else {
        panic!("expected error state");
    };
    assert!(message.contains("500"));

    let seen = fake.reads();
    sleep(Duration::from_millis(300)).await;
    assert!(
        fake.reads() >= seen + 3,
        "polling stalled after failures: {} -> {}",
        seen,
        fake.reads()
    );

    fake.fail_reads.store(false, Ordering::SeqCst);
    wait_for_state(&mut rx, |s| matches!(s, SyncState::Success(_))).await;
}

#[tokio::test]
async fn unreachable_server_surfaces_error_state() {
    let session = SyncSession::start(
        client_for(&unreachable_server_url().await),
        Duration::from_millis(50),
    );
    let mut rx = session.subscribe();
    let state = wait_for_state(&mut rx, |s| matches!(s, SyncState::Error(_))).await;
    assert!(state.status().is_none());
}

#[tokio::test]
async fn at_most_one_fetch_in_flight() {
    let fake = FakeServer::default();
    fake.set_read_delay(Duration::from_millis(200));
    let session = SyncSession::start(
        client_for(&spawn_fake_server(fake.clone()).await),
        Duration::from_millis(20),
    );

    sleep(Duration::from_millis(50)).await;
    assert!(!session.refresh_now(), "refresh should be skipped while in flight");

    sleep(Duration::from_millis(500)).await;
    assert_eq!(fake.max_concurrent_reads.load(Ordering::SeqCst), 1);
    assert!(
        fake.reads() <= 4,
        "skipped ticks must not queue up: {} reads",
        fake.reads()
    );
}

#[tokio::test]
async fn submit_location_reports_success_and_refreshes() {
    let fake = FakeServer::default();
    let session = SyncSession::start(
        client_for(&spawn_fake_server(fake.clone()).await),
        Duration::from_secs(60),
    );
    let mut rx = session.subscribe();
    wait_for_state(&mut rx, |s| matches!(s, SyncState::Success(_))).await;

    assert!(session.submit_location("Ballenoil", "Chema").await);
    let state = wait_for_state(&mut rx, |s| {
        s.status().map(|st| st.location.as_str()) == Some("Ballenoil")
    })
    .await;
    assert_eq!(state.status().map(|s| s.user.as_str()), Some("Chema"));
}

#[tokio::test]
async fn failed_submit_returns_false_and_keeps_state() {
    let fake = FakeServer::default();
    *fake.status.lock().await = parked("C/ Dobla", "Yoli", 10);
    fake.fail_writes.store(true, Ordering::SeqCst);
    let session = SyncSession::start(
        client_for(&spawn_fake_server(fake.clone()).await),
        Duration::from_secs(60),
    );
    let mut rx = session.subscribe();
    wait_for_state(&mut rx, |s| matches!(s, SyncState::Success(_))).await;

    assert!(!session.submit_location("Mercadona", "Celia").await);
    assert_eq!(session.state(), SyncState::Success(parked("C/ Dobla", "Yoli", 10)));
}

#[tokio::test]
async fn results_after_teardown_are_discarded() {
    let fake = FakeServer::default();
    *fake.status.lock().await = parked("Petroprix", "Celia", 1000);
    fake.set_read_delay(Duration::from_millis(200));
    let session = SyncSession::start(
        client_for(&spawn_fake_server(fake.clone()).await),
        Duration::from_secs(60),
    );
    let rx = session.subscribe();

    timeout(WAIT, async {
        while fake.reads() == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first fetch started");
    session.shutdown();

    sleep(Duration::from_millis(400)).await;
    assert_eq!(*rx.borrow(), SyncState::Loading);
    assert_eq!(fake.reads(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetch_result_is_published_before_next_fetch_may_start() {
    let fake = FakeServer::default();
    *fake.status.lock().await = parked("Petroprix", "Celia", 1000);
    let session = SyncSession::start(
        client_for(&spawn_fake_server(fake.clone()).await),
        Duration::from_secs(60),
    );
    let mut rx = session.subscribe();
    wait_for_state(&mut rx, |s| matches!(s, SyncState::Success(_))).await;

    *fake.status.lock().await = parked("Mercadona", "Víctor", 2000);
    timeout(WAIT, async {
        while !session.refresh_now() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("refresh started");

    timeout(WAIT, async {
        while !session.refresh_now() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("refresh finished");
    assert_eq!(
        session.state(),
        SyncState::Success(parked("Mercadona", "Víctor", 2000))
    );
}
