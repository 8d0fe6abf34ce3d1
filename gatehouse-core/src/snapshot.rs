//! Immutable session snapshots
//!
//! A [`SessionSnapshot`] is the point-in-time view of a session that gets
//! broadcast to subscribers. Snapshots are never updated in place: every
//! transition fills in a [`SnapshotDraft`] and commits it into a new snapshot.
//!
//! | Field                 | Type                 | Description                                          |
//! | --------------------- | -------------------- | ---------------------------------------------------- |
//! | `identity`            | `Option<Identity>`   | The signed-in principal, if any.                     |
//! | `model`               | `Option<Arc<M>>`     | The resolved user model, if resolution succeeded.    |
//! | `type_name`           | `Option<String>`     | The model type the identity resolved to.             |
//! | `claims`              | `Option<Claims>`     | The claims fetched for the identity.                 |
//! | `logged_in`           | `bool`               | `true` iff `identity` is present.                    |
//! | `has_checked_session` | `bool`               | Whether the provider has reported a session state.   |
//! | `event`               | `AuthEvent`          | What produced this snapshot.                         |
//! | `routes`              | `Option<AuthRoutes>` | Navigation targets of the resolved model type.       |
//! | `error`               | `Option<String>`     | Readable error for `auth_error` snapshots.           |
//! | `taken_at`            | `DateTime`           | When the snapshot was committed.                     |
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    claims::Claims,
    identity::Identity,
    resolver::Resolved,
    routes::{AuthRoutes, RouteKind},
};

/// Tags a snapshot with the kind of transition that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    Authenticated,
    Unauthenticated,
    AuthChecked,
    AuthError,
    ModelUpdated,
    ClaimsUpdated,
    /// Neutral tag for synchronous reads.
    #[default]
    Snapshot,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::Authenticated => "authenticated",
            AuthEvent::Unauthenticated => "unauthenticated",
            AuthEvent::AuthChecked => "auth_checked",
            AuthEvent::AuthError => "auth_error",
            AuthEvent::ModelUpdated => "model_updated",
            AuthEvent::ClaimsUpdated => "claims_updated",
            AuthEvent::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete state a transition wants to publish.
pub struct SnapshotDraft<M> {
    pub identity: Option<Identity>,
    pub claims: Option<Claims>,
    pub model: Option<Arc<M>>,
    pub type_name: Option<String>,
    pub routes: Option<AuthRoutes>,
    pub has_checked_session: bool,
    pub error: Option<String>,
}

impl<M> Default for SnapshotDraft<M> {
    fn default() -> Self {
        Self {
            identity: None,
            claims: None,
            model: None,
            type_name: None,
            routes: None,
            has_checked_session: false,
            error: None,
        }
    }
}

impl<M> SnapshotDraft<M> {
    /// A draft for a signed-out session.
    pub fn signed_out(has_checked_session: bool) -> Self {
        Self {
            has_checked_session,
            ..Self::default()
        }
    }

    /// Fill in the model fields from a resolution result.
    pub fn with_resolved(mut self, resolved: Option<Resolved<M>>) -> Self {
        match resolved {
            Some(resolved) => {
                self.model = Some(Arc::new(resolved.model));
                self.type_name = Some(resolved.type_name);
                self.routes = resolved.routes;
            }
            None => {
                self.model = None;
                self.type_name = None;
                self.routes = None;
            }
        }
        self
    }

    /// Freeze the draft into a snapshot.
    pub fn commit(self, event: AuthEvent) -> SessionSnapshot<M> {
        SessionSnapshot {
            logged_in: self.identity.is_some(),
            identity: self.identity,
            model: self.model,
            type_name: self.type_name,
            claims: self.claims,
            has_checked_session: self.has_checked_session,
            event,
            routes: self.routes,
            error: self.error,
            taken_at: Utc::now(),
        }
    }
}

/// An immutable view of the session at one point in time.
pub struct SessionSnapshot<M> {
    identity: Option<Identity>,
    model: Option<Arc<M>>,
    type_name: Option<String>,
    claims: Option<Claims>,
    logged_in: bool,
    has_checked_session: bool,
    event: AuthEvent,
    routes: Option<AuthRoutes>,
    error: Option<String>,
    taken_at: DateTime<Utc>,
}

impl<M> SessionSnapshot<M> {
    /// The state before the provider has reported anything.
    pub fn unchecked() -> Self {
        SnapshotDraft::signed_out(false).commit(AuthEvent::Snapshot)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn model(&self) -> Option<&Arc<M>> {
        self.model.as_ref()
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn has_checked_session(&self) -> bool {
        self.has_checked_session
    }

    pub fn event(&self) -> AuthEvent {
        self.event
    }

    pub fn routes(&self) -> Option<&AuthRoutes> {
        self.routes.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// The same state under a different event tag.
    pub fn tagged(&self, event: AuthEvent) -> Self {
        Self {
            event,
            ..self.clone()
        }
    }

    /// Navigation target for `kind`, preferring the model type's own routes.
    pub fn path_for<'a>(&'a self, kind: RouteKind, defaults: &'a AuthRoutes) -> Option<&'a str> {
        match &self.routes {
            Some(routes) => routes.path_for(kind, defaults),
            None => defaults.get(kind),
        }
    }
}

impl<M> Clone for SessionSnapshot<M> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            model: self.model.clone(),
            type_name: self.type_name.clone(),
            claims: self.claims.clone(),
            logged_in: self.logged_in,
            has_checked_session: self.has_checked_session,
            event: self.event,
            routes: self.routes.clone(),
            error: self.error.clone(),
            taken_at: self.taken_at,
        }
    }
}

impl<M> fmt::Debug for SessionSnapshot<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("identity", &self.identity)
            .field("type_name", &self.type_name)
            .field("has_model", &self.model.is_some())
            .field("claims", &self.claims)
            .field("logged_in", &self.logged_in)
            .field("has_checked_session", &self.has_checked_session)
            .field("event", &self.event)
            .field("routes", &self.routes)
            .field("error", &self.error)
            .field("taken_at", &self.taken_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::builder().uid("usr_1").build().unwrap()
    }

    #[test]
    fn test_unchecked_snapshot() {
        let snapshot: SessionSnapshot<String> = SessionSnapshot::unchecked();
        assert!(!snapshot.logged_in());
        assert!(!snapshot.has_checked_session());
        assert_eq!(snapshot.event(), AuthEvent::Snapshot);
        assert!(snapshot.model().is_none());
    }

    #[test]
    fn test_logged_in_follows_identity() {
        let draft: SnapshotDraft<String> = SnapshotDraft {
            identity: Some(identity()),
            has_checked_session: true,
            ..SnapshotDraft::default()
        };
        let snapshot = draft.commit(AuthEvent::Authenticated);
        assert!(snapshot.logged_in());
        assert_eq!(snapshot.event().to_string(), "authenticated");
    }

    #[test]
    fn test_with_resolved_fills_model_fields() {
        let resolved = Resolved {
            type_name: "admin".to_string(),
            model: "root".to_string(),
            routes: Some(AuthRoutes::new().with_post_auth("/admin")),
        };
        let snapshot = SnapshotDraft {
            identity: Some(identity()),
            ..SnapshotDraft::default()
        }
        .with_resolved(Some(resolved))
        .commit(AuthEvent::Authenticated);

        assert_eq!(snapshot.type_name(), Some("admin"));
        assert_eq!(snapshot.model().map(|m| m.as_str()), Some("root"));
        assert_eq!(
            snapshot.path_for(RouteKind::PostAuth, &AuthRoutes::defaults()),
            Some("/admin")
        );
        assert_eq!(
            snapshot.path_for(RouteKind::Login, &AuthRoutes::defaults()),
            Some("/login")
        );
    }

    #[test]
    fn test_tagged_keeps_state() {
        let snapshot: SessionSnapshot<String> =
            SnapshotDraft::signed_out(true).commit(AuthEvent::Unauthenticated);
        let tagged = snapshot.tagged(AuthEvent::AuthChecked);
        assert_eq!(tagged.event(), AuthEvent::AuthChecked);
        assert_eq!(tagged.taken_at(), snapshot.taken_at());
        assert!(tagged.has_checked_session());
    }

    #[test]
    fn test_event_serde() {
        assert_eq!(
            serde_json::to_string(&AuthEvent::ClaimsUpdated).unwrap(),
            "\"claims_updated\""
        );
    }
}
