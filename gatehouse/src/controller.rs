//! Session state controller
//!
//! [`SessionController`] listens to an [`IdentityProvider`], resolves the
//! user model for every session change and broadcasts the result as
//! immutable [`SessionSnapshot`]s.
//!
//! # Transitions
//!
//! Every transition takes a ticket when it starts. Claims fetching and model
//! resolution run without holding any lock; the result is committed under a
//! single commit lock that checks the ticket, swaps the current snapshot and
//! publishes it. A transition whose ticket has been superseded by a newer one
//! is discarded, so subscribers never see state older than what they have
//! already seen.
//!
//! Provider events are processed concurrently and the latest one wins.
//! Explicit calls ([`SessionController::refresh_claims`],
//! [`SessionController::set_override_type`]) take a ticket too and fail with
//! [`SessionError::Superseded`] if a newer transition commits first.
//! [`SessionController::log_out`] takes its ticket before asking the provider
//! to sign out. If the provider reports the sign-out before that call returns,
//! the report stands and `log_out` returns it.
//!
//! Subscribers run while the commit lock is held. They may read the
//! controller and register or remove subscribers, but should hand anything
//! slow off to a task.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use gatehouse_core::{
    AuthEvent, Claims, ConfigurationError, Error, Identity, IdentityProvider, ModelResolver,
    Resolved, RouteKind, SessionError, SessionSnapshot, SnapshotDraft, SubscribeOptions,
    SubscriberId, error::codes, registry::Registry,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::SessionConfig;
use crate::builder::SessionControllerBuilder;

/// Options for [`SessionController::log_out`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOutOptions {
    /// Drop every subscriber and the replay cache after publishing the
    /// signed-out snapshot.
    pub cleanup: bool,
}

impl LogOutOptions {
    pub fn cleanup() -> Self {
        Self { cleanup: true }
    }
}

/// The provider's latest view of the session, ahead of what has been committed.
#[derive(Default)]
struct Working {
    identity: Option<Identity>,
    has_checked_session: bool,
    generation: u64,
}

struct Inner<M: Send + Sync + 'static> {
    provider: Arc<dyn IdentityProvider>,
    resolver: Option<ModelResolver<M>>,
    config: SessionConfig,
    registry: Registry<SessionSnapshot<M>>,
    current: RwLock<SessionSnapshot<M>>,
    working: Mutex<Working>,
    commit_lock: Mutex<()>,
    checked: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

/// Tracks the authentication session and the user model derived from it.
///
/// Cloning is cheap; clones share the same state.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use gatehouse::{Claims, Identity, MemoryIdentityProvider, SessionController};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let identity = Identity::builder().uid("usr_1").build()?;
/// let provider = Arc::new(MemoryIdentityProvider::with_session(identity, Claims::new()));
///
/// let controller: SessionController<()> = SessionController::builder()
///     .with_provider(provider)
///     .build()?;
/// controller.start();
///
/// let snapshot = controller.wait_for_session_checked().await;
/// assert!(snapshot.logged_in());
/// # Ok(())
/// # }
/// ```
pub struct SessionController<M: Send + Sync + 'static> {
    inner: Arc<Inner<M>>,
}

impl<M: Send + Sync + 'static> Clone for SessionController<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Send + Sync + 'static> std::fmt::Debug for SessionController<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("snapshot", &*self.inner.current())
            .field("subscribers", &self.inner.registry.len())
            .field("started", &self.inner.started.load(Ordering::Acquire))
            .finish()
    }
}

impl<M: Send + Sync + 'static> SessionController<M> {
    pub fn builder() -> SessionControllerBuilder<M> {
        SessionControllerBuilder::new()
    }

    pub(crate) fn new(
        provider: Arc<dyn IdentityProvider>,
        resolver: Option<ModelResolver<M>>,
        config: SessionConfig,
    ) -> Self {
        let (checked, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                provider,
                resolver,
                config,
                registry: Registry::new(),
                current: RwLock::new(SessionSnapshot::unchecked()),
                working: Mutex::new(Working::default()),
                commit_lock: Mutex::new(()),
                checked,
                shutdown,
                listener: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Start listening for provider session changes.
    ///
    /// Must be called from within a Tokio runtime. Calling it again is a
    /// no-op that logs a warning.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("Session listener already started, will only start once");
            return;
        }

        let mut changes = self.inner.provider.subscribe();
        let mut shutdown = self.inner.shutdown.subscribe();
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = changes.recv() => match change {
                        Some(identity) => inner.session_changed(identity),
                        None => {
                            tracing::info!("Identity provider closed the session stream");
                            break;
                        }
                    },
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down session listener");
                        break;
                    }
                }
            }
        });

        *self.inner.listener() = Some(handle);
        tracing::info!(
            resolver = self.inner.resolver.is_some(),
            "Session listener started"
        );
    }

    /// Stop listening for provider session changes.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let handle = self.inner.listener().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Session listener ended abnormally");
            }
        }
    }

    /// Subscribe to session changes.
    ///
    /// The latest snapshot is replayed to the new subscriber right away unless
    /// `options.ignore_previous_calls` is set or replay is disabled in the
    /// [`SessionConfig`].
    pub fn on_change<F>(&self, callback: F, options: SubscribeOptions) -> SubscriberId
    where
        F: Fn(&SessionSnapshot<M>) + Send + Sync + 'static,
    {
        let options = if self.inner.config.replay_on_subscribe {
            options
        } else {
            options.ignore_previous_calls()
        };
        self.inner.registry.add(callback, options)
    }

    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        self.inner.registry.remove(id)
    }

    /// The current state, tagged with `event` (default [`AuthEvent::Snapshot`]).
    pub fn get_snapshot(&self, event: Option<AuthEvent>) -> SessionSnapshot<M> {
        self.inner.current().tagged(event.unwrap_or_default())
    }

    /// Navigation target for `kind` given the current session.
    pub fn path_for(&self, kind: RouteKind) -> Option<String> {
        self.inner
            .current()
            .path_for(kind, &self.inner.config.default_routes)
            .map(str::to_string)
    }

    pub fn resolver(&self) -> Option<&ModelResolver<M>> {
        self.inner.resolver.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Readable message for a provider error code. Unknown codes pass through.
    pub fn convert_error_code(&self, code: &str) -> String {
        codes::convert_error_code(code)
    }

    /// Set or clear the resolver's override type and re-resolve the model.
    ///
    /// Publishes and returns a [`AuthEvent::ModelUpdated`] snapshot. Without
    /// a signed-in identity the override is only stored and the current
    /// snapshot is returned unpublished.
    pub async fn set_override_type(
        &self,
        type_name: Option<&str>,
    ) -> Result<SessionSnapshot<M>, Error> {
        let resolver = self.inner.resolver.as_ref().ok_or_else(|| {
            ConfigurationError::MissingField("resolver".to_string())
        })?;
        let previous = resolver.override_type();
        resolver.set_override_type(type_name)?;

        let result = self.apply_override(resolver).await;
        if let Err(error) = &result {
            // A newer transition owns the session now; only our own failure rolls back.
            let superseded = matches!(error, Error::Session(SessionError::Superseded));
            if !superseded && resolver.override_type().as_deref() == type_name {
                tracing::warn!(
                    error = %error,
                    override_type = type_name,
                    "Failed to apply override type, restoring the previous one"
                );
                resolver.set_override_type(previous.as_deref())?;
            }
        }
        result
    }

    async fn apply_override(&self, resolver: &ModelResolver<M>) -> Result<SessionSnapshot<M>, Error> {
        let Some((ticket, identity)) = self.inner.begin_explicit() else {
            return Ok(self.get_snapshot(Some(AuthEvent::ModelUpdated)));
        };

        let claims = match self.inner.committed_claims(&identity) {
            Some(claims) => claims,
            None => self.inner.provider.fetch_claims(&identity).await?,
        };
        let resolved = resolver.resolve(&identity, &claims, None).await?;

        let draft = SnapshotDraft {
            identity: Some(identity),
            claims: Some(claims),
            ..SnapshotDraft::default()
        }
        .with_resolved(Some(resolved));

        Ok(self.inner.commit(ticket, draft, AuthEvent::ModelUpdated)?)
    }

    /// Fetch fresh claims for the signed-in identity and re-resolve the model.
    ///
    /// Publishes a [`AuthEvent::ClaimsUpdated`] snapshot and returns the claims.
    ///
    /// # Errors
    ///
    /// [`SessionError::AuthRequired`] if nobody is signed in.
    pub async fn refresh_claims(&self) -> Result<Claims, Error> {
        let Some((ticket, identity)) = self.inner.begin_explicit() else {
            return Err(SessionError::AuthRequired("refresh claims".to_string()).into());
        };

        let (claims, resolved) = self.inner.load(&identity).await?;
        let draft = SnapshotDraft {
            identity: Some(identity),
            claims: Some(claims.clone()),
            ..SnapshotDraft::default()
        }
        .with_resolved(resolved);

        self.inner.commit(ticket, draft, AuthEvent::ClaimsUpdated)?;
        Ok(claims)
    }

    /// Sign out through the provider and publish a signed-out snapshot.
    ///
    /// `has_checked_session` is reset before the provider is asked, so
    /// [`SessionController::wait_for_session_checked`] waits for the provider's
    /// report of the sign-out unless it has already arrived. If the provider
    /// fails, the session is kept as it was.
    pub async fn log_out(&self, options: LogOutOptions) -> Result<SessionSnapshot<M>, Error> {
        let (ticket, previous) = self.inner.begin_log_out();
        if let Err(error) = self.inner.provider.sign_out().await {
            self.inner.abort_log_out(ticket, previous);
            return Err(error.into());
        }

        let snapshot = match self.inner.commit(
            ticket,
            SnapshotDraft::signed_out(false),
            AuthEvent::Unauthenticated,
        ) {
            Ok(snapshot) => snapshot,
            Err(_) => self.inner.current().clone(),
        };

        if options.cleanup {
            self.inner.registry.cleanup();
        }

        Ok(snapshot)
    }

    /// Wait until the provider has reported a session state.
    ///
    /// Returns immediately if it already has.
    pub async fn wait_for_session_checked(&self) -> SessionSnapshot<M> {
        let mut checked = self.inner.checked.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = checked.wait_for(|checked| *checked).await;
        self.get_snapshot(Some(AuthEvent::AuthChecked))
    }
}

impl<M: Send + Sync + 'static> Inner<M> {
    fn working(&self) -> MutexGuard<'_, Working> {
        self.working.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit_guard(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listener(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> std::sync::RwLockReadGuard<'_, SessionSnapshot<M>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a provider event and take a ticket for it.
    fn observe(&self, identity: Option<Identity>) -> u64 {
        let mut working = self.working();
        working.identity = identity;
        working.has_checked_session = true;
        working.generation += 1;
        working.generation
    }

    /// Take a ticket for an explicit call on the signed-in identity.
    fn begin_explicit(&self) -> Option<(u64, Identity)> {
        let mut working = self.working();
        let identity = working.identity.clone()?;
        working.generation += 1;
        Some((working.generation, identity))
    }

    /// Forget the identity ahead of a provider sign-out.
    ///
    /// Returns the logout ticket and the state to restore if the sign-out fails.
    fn begin_log_out(&self) -> (u64, Working) {
        let _commit = self.commit_guard();
        let mut working = self.working();
        let previous = Working {
            identity: working.identity.take(),
            has_checked_session: working.has_checked_session,
            generation: working.generation,
        };
        working.has_checked_session = false;
        working.generation += 1;
        (working.generation, previous)
    }

    fn abort_log_out(&self, ticket: u64, previous: Working) {
        let _commit = self.commit_guard();
        let mut working = self.working();
        if working.generation != ticket {
            return;
        }
        tracing::debug!(ticket, "Sign-out failed, keeping the session");
        working.identity = previous.identity;
        working.has_checked_session = previous.has_checked_session;
    }

    /// Claims of the committed snapshot, if it belongs to `identity`.
    fn committed_claims(&self, identity: &Identity) -> Option<Claims> {
        let current = self.current();
        if current.identity() == Some(identity) {
            current.claims().cloned()
        } else {
            None
        }
    }

    fn session_changed(self: &Arc<Self>, identity: Option<Identity>) {
        let ticket = self.observe(identity.clone());
        match identity {
            None => {
                let _ = self.commit(ticket, SnapshotDraft::signed_out(true), AuthEvent::Unauthenticated);
            }
            Some(identity) => {
                tracing::debug!(user.id = %identity.uid, ticket, "Provider reported a session");
                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.signed_in(identity, ticket).await });
            }
        }
    }

    async fn signed_in(&self, identity: Identity, ticket: u64) {
        let (draft, event) = match self.load(&identity).await {
            Ok((claims, resolved)) => {
                let draft = SnapshotDraft {
                    identity: Some(identity),
                    claims: Some(claims),
                    ..SnapshotDraft::default()
                }
                .with_resolved(resolved);
                (draft, AuthEvent::Authenticated)
            }
            Err(error) => {
                let readable = report(&identity, &error);
                let draft = SnapshotDraft {
                    identity: Some(identity),
                    error: Some(readable),
                    ..SnapshotDraft::default()
                };
                (draft, AuthEvent::AuthError)
            }
        };
        let _ = self.commit(ticket, draft, event);
    }

    /// Fetch claims and, with a resolver configured, resolve the model.
    async fn load(&self, identity: &Identity) -> Result<(Claims, Option<Resolved<M>>), Error> {
        match &self.resolver {
            Some(resolver) => {
                let (claims, resolved) = resolver
                    .fetch_and_resolve(self.provider.as_ref(), identity, None)
                    .await?;
                Ok((claims, Some(resolved)))
            }
            None => Ok((self.provider.fetch_claims(identity).await?, None)),
        }
    }

    /// Publish `draft` if `ticket` is still the latest transition.
    fn commit(
        &self,
        ticket: u64,
        draft: SnapshotDraft<M>,
        event: AuthEvent,
    ) -> Result<SessionSnapshot<M>, SessionError> {
        let _commit = self.commit_guard();
        let latest = self.working().generation;
        if latest != ticket {
            tracing::debug!(ticket, latest, event = %event, "Discarding superseded transition");
            return Err(SessionError::Superseded);
        }
        Ok(self.publish(draft, event))
    }

    /// Swap in and broadcast a new snapshot. Callers hold the commit lock.
    fn publish(&self, draft: SnapshotDraft<M>, event: AuthEvent) -> SessionSnapshot<M> {
        let has_checked_session = self.working().has_checked_session;
        let snapshot = SnapshotDraft {
            has_checked_session,
            ..draft
        }
        .commit(event);

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();

        tracing::info!(
            event = %event,
            user.id = snapshot.identity().map(|i| i.uid.as_str()),
            model.type_name = snapshot.type_name(),
            logged_in = snapshot.logged_in(),
            "Session state changed"
        );

        self.checked.send_replace(has_checked_session);
        self.registry.run(snapshot.clone(), None);
        snapshot
    }
}

/// Log a failed sign-in and return the message for the `auth_error` snapshot.
fn report(identity: &Identity, error: &Error) -> String {
    match error {
        Error::Provider(e) => codes::log_error_code(&e.code),
        other => {
            tracing::warn!(user.id = %identity.uid, error = %other, "Failed to resolve user model");
            other.readable()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::MemoryIdentityProvider;

    fn controller() -> (Arc<MemoryIdentityProvider>, SessionController<String>) {
        let provider = Arc::new(MemoryIdentityProvider::new());
        let controller = SessionController::new(
            provider.clone(),
            None,
            SessionConfig::default(),
        );
        (provider, controller)
    }

    #[test]
    fn test_initial_snapshot_is_unchecked() {
        let (_, controller) = controller();
        let snapshot = controller.get_snapshot(None);
        assert_eq!(snapshot.event(), AuthEvent::Snapshot);
        assert!(!snapshot.logged_in());
        assert!(!snapshot.has_checked_session());
        assert_eq!(
            controller.get_snapshot(Some(AuthEvent::AuthChecked)).event(),
            AuthEvent::AuthChecked
        );
    }

    #[test]
    fn test_stale_ticket_is_discarded() {
        let (_, controller) = controller();
        let inner = &controller.inner;

        let first = inner.observe(None);
        let second = inner.observe(None);

        assert!(matches!(
            inner.commit(first, SnapshotDraft::signed_out(true), AuthEvent::Unauthenticated),
            Err(SessionError::Superseded)
        ));
        assert!(!controller.get_snapshot(None).has_checked_session());

        let snapshot = inner
            .commit(second, SnapshotDraft::signed_out(true), AuthEvent::Unauthenticated)
            .unwrap();
        assert!(snapshot.has_checked_session());
        assert_eq!(snapshot.event(), AuthEvent::Unauthenticated);
    }

    #[test]
    fn test_explicit_calls_need_an_identity() {
        let (_, controller) = controller();
        assert!(controller.inner.begin_explicit().is_none());

        let identity = Identity::builder().uid("usr_1").build().unwrap();
        let observed = controller.inner.observe(Some(identity.clone()));
        let (ticket, current) = controller.inner.begin_explicit().unwrap();
        assert_eq!(current, identity);
        assert_eq!(ticket, observed + 1);
    }

    #[test]
    fn test_convert_error_code() {
        let (_, controller) = controller();
        assert_eq!(controller.convert_error_code("auth/invalid-email"), "Invalid Email");
        assert_eq!(controller.convert_error_code("auth/quota-exceeded"), "auth/quota-exceeded");
    }

    #[tokio::test]
    async fn test_override_without_resolver() {
        let (_, controller) = controller();
        let err = controller.set_override_type(Some("admin")).await.unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_start_twice_and_shutdown() {
        let (provider, controller) = controller();
        controller.start();
        controller.start();

        provider.report_no_session();
        let snapshot = controller.wait_for_session_checked().await;
        assert!(!snapshot.logged_in());

        controller.shutdown().await;
        assert!(controller.inner.listener().is_none());
    }
}
