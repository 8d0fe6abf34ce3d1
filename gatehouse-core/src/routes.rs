//! Navigation targets exposed to routers
//!
//! Routing itself happens elsewhere. This module only carries the paths a
//! router needs: where to send users to sign in, where the public landing
//! page is, and where to go once authentication completes. A model type can
//! supply its own paths; anything it leaves out falls back to the configured
//! defaults.
use serde::{Deserialize, Serialize};

/// The kinds of navigation target a router can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteKind {
    /// Where users sign in
    Login,
    /// Where signed-out users land
    PublicLanding,
    /// Where users go after signing in
    PostAuth,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRoutes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_landing: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_auth: Option<String>,
}

impl AuthRoutes {
    /// An empty route set; every lookup falls through to the fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock defaults: `/login` for both sign-in and landing, `/` after sign-in.
    pub fn defaults() -> Self {
        Self {
            login: Some("/login".to_string()),
            public_landing: Some("/login".to_string()),
            post_auth: Some("/".to_string()),
        }
    }

    pub fn with_login(mut self, path: impl Into<String>) -> Self {
        self.login = Some(path.into());
        self
    }

    pub fn with_public_landing(mut self, path: impl Into<String>) -> Self {
        self.public_landing = Some(path.into());
        self
    }

    pub fn with_post_auth(mut self, path: impl Into<String>) -> Self {
        self.post_auth = Some(path.into());
        self
    }

    pub fn get(&self, kind: RouteKind) -> Option<&str> {
        match kind {
            RouteKind::Login => self.login.as_deref(),
            RouteKind::PublicLanding => self.public_landing.as_deref(),
            RouteKind::PostAuth => self.post_auth.as_deref(),
        }
    }

    /// Look up `kind` here, falling back to `fallback` when unset.
    pub fn path_for<'a>(&'a self, kind: RouteKind, fallback: &'a AuthRoutes) -> Option<&'a str> {
        self.get(kind).or_else(|| fallback.get(kind))
    }
}
