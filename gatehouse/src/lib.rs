//! # Gatehouse
//!
//! Gatehouse keeps track of a user's authentication session and derives an
//! application-specific user model from it. It sits between an identity
//! provider, which knows who is signed in, and the rest of your application,
//! which wants to know what kind of account that is.
//!
//! With Gatehouse you get:
//! - A single, coherent [`SessionSnapshot`] of the session at any time
//! - Ordered change notifications with replay for late subscribers
//! - Declarative or closure-based matching of identities onto model types
//! - Get-or-create model loading per type
//! - Navigation targets per model type for your router
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatehouse::{
//!     ClaimRule, Claims, Gatehouse, Identity, MatchPattern, Matcher, MemoryIdentityProvider,
//!     ModelDefinition, ModelMap, ModelResolver, ResolverConfig, SubscribeOptions,
//! };
//!
//! #[derive(Debug)]
//! enum Account {
//!     Admin(String),
//!     Member(String),
//! }
//!
//! static AUTH: Gatehouse<Account> = Gatehouse::new();
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let models = ModelMap::new()
//!         .with(
//!             "admin",
//!             ModelDefinition::from_fn(|identity, _| Ok(Account::Admin(identity.uid.to_string())))
//!                 .matcher(MatchPattern::new().claim("role", ClaimRule::contains("admin"))),
//!         )
//!         .with(
//!             "member",
//!             ModelDefinition::from_fn(|identity, _| Ok(Account::Member(identity.uid.to_string())))
//!                 .matcher(Matcher::always()),
//!         );
//!     let resolver = ModelResolver::new(models, ResolverConfig::new())?;
//!
//!     let provider = Arc::new(MemoryIdentityProvider::new());
//!     let session = AUTH.initialize(provider.clone(), Some(resolver));
//!
//!     session.on_change(
//!         |snapshot| println!("{}: {:?}", snapshot.event(), snapshot.model()),
//!         SubscribeOptions::default(),
//!     );
//!
//!     let identity = Identity::builder().uid("usr_1").build()?;
//!     provider.sign_in(identity, Claims::new().with("role", "admin"));
//!
//!     let snapshot = session.wait_for_session_checked().await;
//!     println!("logged in: {}", snapshot.logged_in());
//!     Ok(())
//! }
//! ```
use std::sync::{Arc, OnceLock};

pub mod builder;
pub mod controller;

pub use builder::SessionControllerBuilder;
pub use controller::{LogOutOptions, SessionController};

/// Re-export core types from gatehouse_core
///
/// These types are commonly used when working with the Gatehouse API.
pub use gatehouse_core::{
    AuthEvent, AuthRoutes, ClaimRule, ClaimValue, Claims, ConfigurationError, Error, FieldRule,
    Identity, IdentityField, IdentityProvider, MatchPattern, Matcher, MemoryIdentityProvider,
    ModelDefinition, ModelError, ModelMap, ModelResolver, ModelSource, ProviderError,
    ResolutionError, ResolverConfig, RouteKind, SessionChanges, SessionError, SessionSnapshot,
    SubscribeOptions, SubscriberId, UserId, convert_error_code,
};

/// The configuration for a session controller.
///
/// # Example
///
/// ```rust
/// use gatehouse::{AuthRoutes, SessionConfig};
///
/// let config = SessionConfig::default().with_default_routes(AuthRoutes::defaults().with_post_auth("/home"));
/// assert!(config.replay_on_subscribe);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Routes used when the resolved model type supplies none of its own
    pub default_routes: AuthRoutes,
    /// Replay the latest snapshot to new subscribers
    pub replay_on_subscribe: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_routes: AuthRoutes::defaults(),
            replay_on_subscribe: true,
        }
    }
}

impl SessionConfig {
    pub fn with_default_routes(mut self, routes: AuthRoutes) -> Self {
        self.default_routes = routes;
        self
    }

    pub fn replay_on_subscribe(mut self, enabled: bool) -> Self {
        self.replay_on_subscribe = enabled;
        self
    }
}

/// Owns the application's one session controller.
///
/// `Gatehouse` is meant to live in the composition root, often as a
/// `static`. The first [`Gatehouse::initialize`] builds and starts the
/// controller; later calls log a warning and hand back the same controller.
pub struct Gatehouse<M: Send + Sync + 'static> {
    controller: OnceLock<SessionController<M>>,
}

impl<M: Send + Sync + 'static> Default for Gatehouse<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send + Sync + 'static> Gatehouse<M> {
    pub const fn new() -> Self {
        Self {
            controller: OnceLock::new(),
        }
    }

    /// Build and start the session controller, once.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn initialize<P: IdentityProvider>(
        &self,
        provider: Arc<P>,
        resolver: Option<ModelResolver<M>>,
    ) -> SessionController<M> {
        let mut created = false;
        let controller = self.controller.get_or_init(|| {
            created = true;
            let controller =
                SessionController::new(provider, resolver, SessionConfig::default());
            controller.start();
            controller
        });
        if !created {
            warn_already_initialized();
        }
        controller.clone()
    }

    /// Like [`Gatehouse::initialize`], with full control over the configuration.
    ///
    /// The builder is only validated on the first call.
    pub fn initialize_with(
        &self,
        builder: SessionControllerBuilder<M>,
    ) -> Result<SessionController<M>, Error> {
        if let Some(existing) = self.controller.get() {
            warn_already_initialized();
            return Ok(existing.clone());
        }

        let controller = builder.build()?;
        match self.controller.set(controller.clone()) {
            Ok(()) => {
                controller.start();
                Ok(controller)
            }
            Err(_) => {
                warn_already_initialized();
                self.get().cloned()
            }
        }
    }

    /// The controller, if [`Gatehouse::initialize`] has been called.
    pub fn get(&self) -> Result<&SessionController<M>, Error> {
        self.controller
            .get()
            .ok_or_else(|| SessionError::NotInitialized.into())
    }

    pub fn is_initialized(&self) -> bool {
        self.controller.get().is_some()
    }
}

fn warn_already_initialized() {
    tracing::warn!("Session state already initialized, will only initialize once");
}
