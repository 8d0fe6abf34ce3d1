#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gatehouse::{
    AuthRoutes, ClaimValue, Claims, Identity, Matcher, MemoryIdentityProvider, ModelDefinition,
    ModelMap, ModelResolver, ResolverConfig, SessionController, SessionSnapshot,
    SubscribeOptions,
};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum Account {
    Admin(String),
    Member(String),
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn identity(uid: &str) -> Identity {
    Identity::builder()
        .uid(uid)
        .email(format!("{uid}@example.com"))
        .build()
        .expect("Failed to build identity")
}

pub fn admin_claims() -> Claims {
    Claims::new().with("role", "admin")
}

/// `admin` when the `role` claim is "admin", `user` otherwise.
pub fn resolver() -> ModelResolver<Account> {
    let models = ModelMap::new()
        .with(
            "admin",
            ModelDefinition::from_fn(|identity, _| Ok(Account::Admin(identity.uid.to_string())))
                .matcher(Matcher::predicate(|_, claims| {
                    claims.get("role").and_then(ClaimValue::as_str) == Some("admin")
                }))
                .routes(AuthRoutes::new().with_post_auth("/admin")),
        )
        .with(
            "user",
            ModelDefinition::from_fn(|identity, _| Ok(Account::Member(identity.uid.to_string())))
                .matcher(Matcher::always()),
        );
    ModelResolver::new(models, ResolverConfig::new()).expect("Failed to build resolver")
}

pub fn controller(
    provider: &Arc<MemoryIdentityProvider>,
) -> SessionController<Account> {
    init_tracing();
    let controller = SessionController::builder()
        .with_provider(provider.clone())
        .with_resolver(resolver())
        .build()
        .expect("Failed to build controller");
    controller.start();
    controller
}

pub type Snapshots = mpsc::UnboundedReceiver<SessionSnapshot<Account>>;

/// Forward every published snapshot into a channel.
pub fn record(controller: &SessionController<Account>, options: SubscribeOptions) -> Snapshots {
    let (tx, rx) = mpsc::unbounded_channel();
    controller.on_change(
        move |snapshot| {
            let _ = tx.send(snapshot.clone());
        },
        options,
    );
    rx
}

pub async fn next(snapshots: &mut Snapshots) -> SessionSnapshot<Account> {
    tokio::time::timeout(Duration::from_secs(5), snapshots.recv())
        .await
        .expect("Timed out waiting for a snapshot")
        .expect("Subscriber was dropped")
}
