//! Tests for signing out through the session controller

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{admin_claims, controller, identity, next, record, resolver};
use gatehouse::{
    AuthEvent, Claims, Identity, IdentityProvider, LogOutOptions, MemoryIdentityProvider,
    ProviderError, SessionChanges, SessionController, SubscribeOptions,
};
use tokio::sync::mpsc;

/// Reports the sign-out to subscribers before `sign_out` returns, then
/// takes a while to finish.
struct SlowSignOutProvider {
    user: Identity,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Option<Identity>>>>,
}

impl SlowSignOutProvider {
    fn new(user: Identity) -> Self {
        Self {
            user,
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IdentityProvider for SlowSignOutProvider {
    fn subscribe(&self) -> SessionChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Some(self.user.clone()));
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    async fn fetch_claims(&self, _identity: &Identity) -> Result<Claims, ProviderError> {
        Ok(admin_claims())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        for tx in self.subscribers.lock().unwrap().iter() {
            let _ = tx.send(None);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_log_out_publishes_signed_out_snapshot() {
    let provider = Arc::new(MemoryIdentityProvider::with_session(
        identity("alice"),
        admin_claims(),
    ));
    let controller = controller(&provider);
    let mut snapshots = record(&controller, SubscribeOptions::default());
    assert_eq!(next(&mut snapshots).await.event(), AuthEvent::Authenticated);

    let snapshot = controller
        .log_out(LogOutOptions::default())
        .await
        .expect("Failed to log out");

    assert_eq!(snapshot.event(), AuthEvent::Unauthenticated);
    assert!(!snapshot.logged_in());
    assert!(!snapshot.has_checked_session());
    assert!(snapshot.claims().is_none());
    assert!(snapshot.model().is_none());
    assert!(provider.current().is_none());

    let published = next(&mut snapshots).await;
    assert_eq!(published.event(), AuthEvent::Unauthenticated);
    assert!(!published.has_checked_session());

    // Without cleanup, late subscribers still get a replay, and it is signed out.
    let mut late = record(&controller, SubscribeOptions::default());
    let replayed = late.try_recv().expect("Expected an immediate replay");
    assert!(!replayed.logged_in());
}

#[tokio::test]
async fn test_log_out_with_cleanup_drops_subscribers_and_replay() {
    let provider = Arc::new(MemoryIdentityProvider::with_session(
        identity("bob"),
        admin_claims(),
    ));
    let controller = controller(&provider);
    let mut before = record(&controller, SubscribeOptions::default());
    assert!(next(&mut before).await.logged_in());

    controller
        .log_out(LogOutOptions::cleanup())
        .await
        .expect("Failed to log out");

    // The pre-logout subscriber saw the sign-out and was then dropped.
    assert_eq!(next(&mut before).await.event(), AuthEvent::Unauthenticated);
    assert!(before.recv().await.is_none());

    // A new subscriber is not replayed the pre-logout snapshot.
    let mut after = record(&controller, SubscribeOptions::default());
    while let Ok(snapshot) = after.try_recv() {
        assert!(!snapshot.logged_in());
    }
}

#[tokio::test]
async fn test_log_out_resets_session_check() {
    let provider = Arc::new(MemoryIdentityProvider::with_session(
        identity("carol"),
        admin_claims(),
    ));
    let controller = controller(&provider);
    assert!(controller.wait_for_session_checked().await.logged_in());

    controller
        .log_out(LogOutOptions::default())
        .await
        .expect("Failed to log out");
    assert!(!controller.get_snapshot(None).has_checked_session());

    // The provider reports the sign-out too, which checks the session again.
    let snapshot = controller.wait_for_session_checked().await;
    assert!(snapshot.has_checked_session());
    assert!(!snapshot.logged_in());
}

#[tokio::test]
async fn test_log_out_failure_keeps_session() {
    let provider = Arc::new(MemoryIdentityProvider::with_session(
        identity("dave"),
        admin_claims(),
    ));
    let controller = controller(&provider);
    controller.wait_for_session_checked().await;

    provider.fail_sign_out(ProviderError::new("auth/network-request-failed", "offline"));
    let err = controller
        .log_out(LogOutOptions::cleanup())
        .await
        .unwrap_err();

    assert!(err.is_provider_error());
    assert_eq!(err.readable(), "auth/network-request-failed");
    assert!(controller.get_snapshot(None).logged_in());

    // The session is fully restored, not just the published snapshot.
    assert!(controller.wait_for_session_checked().await.logged_in());
    controller
        .refresh_claims()
        .await
        .expect("Failed to refresh claims after a failed log out");
}

#[tokio::test]
async fn test_sign_out_reported_before_provider_returns() {
    common::init_tracing();
    let provider = Arc::new(SlowSignOutProvider::new(identity("erin")));
    let controller: SessionController<common::Account> = SessionController::builder()
        .with_provider(provider)
        .with_resolver(resolver())
        .build()
        .expect("Failed to build controller");
    controller.start();
    assert!(controller.wait_for_session_checked().await.logged_in());

    let snapshot = controller
        .log_out(LogOutOptions::default())
        .await
        .expect("Failed to log out");
    assert!(!snapshot.logged_in());

    // The provider's report already checked the session; nothing else is coming.
    let checked = tokio::time::timeout(
        Duration::from_secs(2),
        controller.wait_for_session_checked(),
    )
    .await
    .expect("Session check never completed after log out");
    assert!(checked.has_checked_session());
    assert!(!checked.logged_in());
}
