//! Builder for [`SessionController`] instances
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gatehouse::{
//!     AuthRoutes, MemoryIdentityProvider, ModelDefinition, ModelMap, ModelResolver,
//!     ResolverConfig, SessionController,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let models = ModelMap::new().with(
//!     "member",
//!     ModelDefinition::from_fn(|identity, _| Ok(identity.uid.to_string())),
//! );
//! let resolver = ModelResolver::new(models, ResolverConfig::new().with_default_type("member"))?;
//!
//! let controller: SessionController<String> = SessionController::builder()
//!     .with_provider(Arc::new(MemoryIdentityProvider::new()))
//!     .with_resolver(resolver)
//!     .with_default_routes(AuthRoutes::defaults().with_post_auth("/home"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
use std::sync::Arc;

use gatehouse_core::{
    AuthRoutes, ConfigurationError, Error, IdentityProvider, ModelResolver,
};

use crate::{SessionConfig, SessionController};

/// Collects the parts of a [`SessionController`].
///
/// # Defaults
///
/// - Resolver: none; snapshots carry identity and claims only
/// - Default routes: [`AuthRoutes::defaults`]
/// - Replay on subscribe: enabled
pub struct SessionControllerBuilder<M: Send + Sync + 'static> {
    provider: Option<Arc<dyn IdentityProvider>>,
    resolver: Option<ModelResolver<M>>,
    config: SessionConfig,
}

impl<M: Send + Sync + 'static> Default for SessionControllerBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send + Sync + 'static> SessionControllerBuilder<M> {
    pub fn new() -> Self {
        Self {
            provider: None,
            resolver: None,
            config: SessionConfig::default(),
        }
    }

    /// Set the identity provider. Required.
    pub fn with_provider<P: IdentityProvider>(mut self, provider: Arc<P>) -> Self {
        self.provider = Some(provider as Arc<dyn IdentityProvider>);
        self
    }

    /// Set the identity provider from an already type-erased handle.
    pub fn with_shared_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_resolver(mut self, resolver: ModelResolver<M>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Routes used when the resolved model type supplies none of its own.
    pub fn with_default_routes(mut self, routes: AuthRoutes) -> Self {
        self.config.default_routes = routes;
        self
    }

    /// Whether new subscribers get the latest snapshot replayed.
    pub fn replay_on_subscribe(mut self, enabled: bool) -> Self {
        self.config.replay_on_subscribe = enabled;
        self
    }

    /// Build the controller. It does not listen until [`SessionController::start`] is called.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::MissingField`] if no provider was set.
    pub fn build(self) -> Result<SessionController<M>, Error> {
        let provider = self
            .provider
            .ok_or_else(|| ConfigurationError::MissingField("provider".to_string()))?;

        Ok(SessionController::new(provider, self.resolver, self.config))
    }
}
