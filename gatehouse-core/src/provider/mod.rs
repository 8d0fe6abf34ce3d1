//! Identity provider abstraction
//!
//! The session controller never talks to an identity service directly. It
//! goes through [`IdentityProvider`], which reports session changes as a
//! stream and fetches claims on demand.
//!
//! A provider must report the current session state (an identity, or `None`)
//! to every new subscriber once it knows it, and again on every change after
//! that.
pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{claims::Claims, error::ProviderError, identity::Identity};

pub use memory::MemoryIdentityProvider;

/// Stream of session changes. `None` means signed out.
pub type SessionChanges = mpsc::UnboundedReceiver<Option<Identity>>;

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Start receiving session changes.
    fn subscribe(&self) -> SessionChanges;

    /// Fetch the current claims for `identity`.
    async fn fetch_claims(&self, identity: &Identity) -> Result<Claims, ProviderError>;

    /// End the provider session.
    ///
    /// Providers report the resulting sign-out through [`IdentityProvider::subscribe`]
    /// as well, but callers must not rely on that.
    async fn sign_out(&self) -> Result<(), ProviderError>;
}
