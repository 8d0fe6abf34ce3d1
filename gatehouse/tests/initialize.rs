//! Tests for the initialize-once composition root

mod common;

use std::sync::Arc;

use common::{Account, admin_claims, identity, init_tracing, resolver};
use gatehouse::{Error, Gatehouse, MemoryIdentityProvider, SessionController, SessionError};

static AUTH: Gatehouse<Account> = Gatehouse::new();

#[tokio::test]
async fn test_initialize_only_once() {
    init_tracing();
    let gatehouse: Gatehouse<Account> = Gatehouse::new();
    assert!(matches!(
        gatehouse.get(),
        Err(Error::Session(SessionError::NotInitialized))
    ));

    let provider = Arc::new(MemoryIdentityProvider::with_session(
        identity("alice"),
        admin_claims(),
    ));
    let first = gatehouse.initialize(provider.clone(), Some(resolver()));

    let other = Arc::new(MemoryIdentityProvider::signed_out());
    let second = gatehouse.initialize(other, None);

    // The second call hands back the first controller, resolver included.
    assert!(second.resolver().is_some());
    let snapshot = second.wait_for_session_checked().await;
    assert_eq!(snapshot.type_name(), Some("admin"));
    assert_eq!(
        first.get_snapshot(None).identity(),
        snapshot.identity()
    );

    let fetched = gatehouse.get().expect("Controller should be initialized");
    assert!(fetched.get_snapshot(None).logged_in());
}

#[tokio::test]
async fn test_initialize_with_builder() {
    init_tracing();
    let gatehouse: Gatehouse<Account> = Gatehouse::new();

    let err = gatehouse
        .initialize_with(SessionController::builder())
        .unwrap_err();
    assert!(err.is_configuration_error());
    assert!(!gatehouse.is_initialized());

    let provider = Arc::new(MemoryIdentityProvider::signed_out());
    let controller = gatehouse
        .initialize_with(
            SessionController::builder()
                .with_provider(provider)
                .with_resolver(resolver()),
        )
        .expect("Failed to initialize");
    assert!(!controller.wait_for_session_checked().await.logged_in());

    // Later calls ignore the builder entirely, even an invalid one.
    let again = gatehouse
        .initialize_with(SessionController::builder())
        .expect("Repeat initialize should return the existing controller");
    assert!(again.resolver().is_some());
}

#[tokio::test]
async fn test_static_handle() {
    init_tracing();
    let provider = Arc::new(MemoryIdentityProvider::signed_out());
    let controller = AUTH.initialize(provider, Some(resolver()));
    controller.wait_for_session_checked().await;

    assert!(AUTH.is_initialized());
    assert!(!AUTH.get().expect("Controller should be initialized").get_snapshot(None).logged_in());
}
