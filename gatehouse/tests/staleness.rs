//! Tests for overlapping session transitions

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{admin_claims, controller, identity, next, record};
use gatehouse::{AuthEvent, Claims, Error, MemoryIdentityProvider, SessionError, SubscribeOptions};

#[tokio::test(start_paused = true)]
async fn test_slow_sign_in_does_not_overwrite_newer_one() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let controller = controller(&provider);
    let mut snapshots = record(&controller, SubscribeOptions::default());

    let slow = identity("slow");
    provider.set_fetch_delay_for(&slow.uid, Duration::from_millis(100));

    provider.sign_in(slow, admin_claims());
    provider.sign_in(identity("fast"), Claims::new());

    let snapshot = next(&mut snapshots).await;
    assert_eq!(snapshot.identity().map(|i| i.uid.as_str()), Some("fast"));
    assert_eq!(snapshot.type_name(), Some("user"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(snapshots.try_recv().is_err());
    assert_eq!(
        controller
            .get_snapshot(None)
            .identity()
            .map(|i| i.uid.to_string()),
        Some("fast".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_during_resolution_wins() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let controller = controller(&provider);
    let mut snapshots = record(&controller, SubscribeOptions::default());

    let user = identity("gone");
    provider.set_fetch_delay_for(&user.uid, Duration::from_millis(100));
    provider.sign_in(user, admin_claims());
    provider.report_no_session();

    let snapshot = next(&mut snapshots).await;
    assert_eq!(snapshot.event(), AuthEvent::Unauthenticated);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(snapshots.try_recv().is_err());
    assert!(!controller.get_snapshot(None).logged_in());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_superseded_by_new_sign_in() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let controller = controller(&provider);
    let mut snapshots = record(&controller, SubscribeOptions::default());

    let first = identity("first");
    provider.sign_in(first.clone(), Claims::new());
    next(&mut snapshots).await;

    provider.set_fetch_delay_for(&first.uid, Duration::from_millis(100));
    let refresh = tokio::spawn({
        let controller = controller.clone();
        async move { controller.refresh_claims().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    provider.sign_in(identity("second"), admin_claims());
    let snapshot = next(&mut snapshots).await;
    assert_eq!(snapshot.identity().map(|i| i.uid.as_str()), Some("second"));

    let result = refresh.await.expect("Refresh task panicked");
    assert!(matches!(result, Err(Error::Session(SessionError::Superseded))));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(snapshots.try_recv().is_err());
    assert_eq!(controller.get_snapshot(None).type_name(), Some("admin"));
}

#[tokio::test(start_paused = true)]
async fn test_log_out_beats_in_flight_refresh() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let controller = controller(&provider);
    let mut snapshots = record(&controller, SubscribeOptions::default());

    let user = identity("leaving");
    provider.sign_in(user.clone(), Claims::new());
    next(&mut snapshots).await;

    provider.set_fetch_delay_for(&user.uid, Duration::from_millis(100));
    let refresh = tokio::spawn({
        let controller = controller.clone();
        async move { controller.refresh_claims().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    controller
        .log_out(Default::default())
        .await
        .expect("Failed to log out");

    let result = refresh.await.expect("Refresh task panicked");
    assert!(matches!(result, Err(Error::Session(SessionError::Superseded))));
    assert!(!controller.get_snapshot(None).logged_in());

    while let Ok(snapshot) = snapshots.try_recv() {
        assert_ne!(snapshot.event(), AuthEvent::ClaimsUpdated);
    }
}
