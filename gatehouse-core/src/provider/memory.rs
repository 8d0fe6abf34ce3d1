//! In-memory identity provider
//!
//! Holds the session, claims and subscribers in process. Useful for tests,
//! local development and applications whose sign-in happens elsewhere and is
//! pushed in with [`MemoryIdentityProvider::sign_in`].
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{IdentityProvider, SessionChanges};
use crate::{
    claims::Claims,
    error::ProviderError,
    identity::{Identity, UserId},
};

#[derive(Default)]
struct State {
    current: Option<Identity>,
    /// Whether the provider knows the session state yet.
    determined: bool,
    claims: HashMap<UserId, Claims>,
    subscribers: Vec<mpsc::UnboundedSender<Option<Identity>>>,
    fail_next_fetch: Option<ProviderError>,
    fail_sign_out: Option<ProviderError>,
    fetch_delays: HashMap<UserId, Duration>,
    fetch_count: usize,
}

impl State {
    fn broadcast(&mut self, change: Option<Identity>) {
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

#[derive(Default)]
pub struct MemoryIdentityProvider {
    state: Mutex<State>,
}

impl MemoryIdentityProvider {
    /// A provider that has not determined the session state yet.
    ///
    /// Subscribers receive nothing until [`MemoryIdentityProvider::sign_in`] or
    /// [`MemoryIdentityProvider::report_no_session`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that already has a signed-in session.
    pub fn with_session(identity: Identity, claims: Claims) -> Self {
        let provider = Self::new();
        {
            let mut state = provider.lock();
            state.claims.insert(identity.uid.clone(), claims);
            state.current = Some(identity);
            state.determined = true;
        }
        provider
    }

    /// A provider that has determined there is no session.
    pub fn signed_out() -> Self {
        let provider = Self::new();
        provider.lock().determined = true;
        provider
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sign `identity` in and notify subscribers.
    pub fn sign_in(&self, identity: Identity, claims: Claims) {
        let mut state = self.lock();
        tracing::debug!(user.id = %identity.uid, "Provider session started");
        state.claims.insert(identity.uid.clone(), claims);
        state.current = Some(identity.clone());
        state.determined = true;
        state.broadcast(Some(identity));
    }

    /// Report that there is no session and notify subscribers.
    pub fn report_no_session(&self) {
        let mut state = self.lock();
        state.current = None;
        state.determined = true;
        state.broadcast(None);
    }

    /// Replace the claims served for `uid` without emitting a session change.
    pub fn set_claims(&self, uid: &UserId, claims: Claims) {
        self.lock().claims.insert(uid.clone(), claims);
    }

    /// Make the next `fetch_claims` call fail with `error`.
    pub fn fail_next_fetch(&self, error: ProviderError) {
        self.lock().fail_next_fetch = Some(error);
    }

    /// Make the next `sign_out` call fail with `error`.
    pub fn fail_sign_out(&self, error: ProviderError) {
        self.lock().fail_sign_out = Some(error);
    }

    /// Delay every `fetch_claims` call for `uid` by `delay`.
    pub fn set_fetch_delay_for(&self, uid: &UserId, delay: Duration) {
        self.lock().fetch_delays.insert(uid.clone(), delay);
    }

    /// Number of `fetch_claims` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_count
    }

    pub fn current(&self) -> Option<Identity> {
        self.lock().current.clone()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    fn subscribe(&self) -> SessionChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        if state.determined {
            // The receiver is still in scope, so this cannot fail.
            let _ = tx.send(state.current.clone());
        }
        state.subscribers.push(tx);
        rx
    }

    async fn fetch_claims(&self, identity: &Identity) -> Result<Claims, ProviderError> {
        let delay = {
            let mut state = self.lock();
            state.fetch_count += 1;
            if let Some(error) = state.fail_next_fetch.take() {
                return Err(error);
            }
            state.fetch_delays.get(&identity.uid).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.lock()
            .claims
            .get(&identity.uid)
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(
                    "auth/user-not-found",
                    format!("no claims for user {}", identity.uid),
                )
            })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let mut state = self.lock();
        if let Some(error) = state.fail_sign_out.take() {
            return Err(error);
        }
        state.current = None;
        state.determined = true;
        state.broadcast(None);
        Ok(())
    }
}
