//! Core types for the gatehouse project
//!
//! This crate contains the building blocks the session controller in the
//! `gatehouse` crate is assembled from:
//!
//! - [`Identity`] and [`Claims`], the provider's view of a signed-in user
//! - [`IdentityProvider`], the seam to the identity service
//! - [`Registry`], an ordered, replaying subscriber list
//! - [`ModelResolver`], which maps identities onto application user models
//! - [`SessionSnapshot`], the immutable session view handed to subscribers
//!
//! Most applications should depend on `gatehouse` instead and only reach in
//! here to implement an [`IdentityProvider`] or a [`ModelSource`].
pub mod claims;
pub mod error;
pub mod identity;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod routes;
pub mod snapshot;

pub use claims::{ClaimValue, Claims};
pub use error::{
    ConfigurationError, Error, ModelError, ProviderError, ResolutionError, SessionError,
    convert_error_code,
};
pub use identity::{Identity, IdentityField, UserId};
pub use provider::{IdentityProvider, MemoryIdentityProvider, SessionChanges};
pub use registry::{Registry, SideEffect, SubscribeOptions, SubscriberId, SubscriberMeta};
pub use resolver::{
    ClaimRule, FieldRule, MatchPattern, Matcher, ModelDefinition, ModelMap, ModelResolver,
    ModelSource, Resolved, ResolverConfig,
};
pub use routes::{AuthRoutes, RouteKind};
pub use snapshot::{AuthEvent, SessionSnapshot, SnapshotDraft};
