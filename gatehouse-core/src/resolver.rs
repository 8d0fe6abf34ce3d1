//! User model resolution
//!
//! The [`ModelResolver`] turns an identity and its claims into an
//! application-specific user model. Applications describe their account types
//! in a [`ModelMap`]: an ordered list of type names, each with a [`Matcher`]
//! that decides whether it applies and a [`ModelSource`] that builds (or
//! looks up) the model.
//!
//! Resolution picks a type name in this order:
//!
//! 1. the override type, if one is set;
//! 2. the caller's hint, if its matcher accepts;
//! 3. the first type in map order whose matcher accepts;
//! 4. the default type, if configured.
//!
//! # Example
//!
//! ```rust
//! use gatehouse_core::claims::Claims;
//! use gatehouse_core::identity::Identity;
//! use gatehouse_core::resolver::{
//!     ClaimRule, MatchPattern, Matcher, ModelDefinition, ModelMap, ModelResolver, ResolverConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let models = ModelMap::new()
//!     .with(
//!         "admin",
//!         ModelDefinition::from_fn(|identity, _| Ok(format!("admin:{}", identity.uid)))
//!             .matcher(Matcher::pattern(MatchPattern::new().claim("role", ClaimRule::contains("admin")))),
//!     )
//!     .with(
//!         "user",
//!         ModelDefinition::from_fn(|identity, _| Ok(format!("user:{}", identity.uid))),
//!     );
//!
//! let resolver = ModelResolver::new(models, ResolverConfig::new().with_default_type("user"))?;
//!
//! let identity = Identity::builder().uid("usr_1").build()?;
//! let resolved = resolver.resolve(&identity, &Claims::new().with("role", "admin"), None).await?;
//! assert_eq!(resolved.type_name, "admin");
//! # Ok(())
//! # }
//! ```
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use regex::Regex;

use crate::{
    Error,
    claims::{ClaimValue, Claims},
    error::{ConfigurationError, ModelError, ResolutionError},
    identity::{Identity, IdentityField},
    provider::IdentityProvider,
    routes::AuthRoutes,
};

/// How a single identity field is tested.
#[derive(Debug, Clone)]
pub enum FieldRule {
    /// Substring containment
    Contains(String),
    /// Regular expression search
    Matches(Regex),
}

impl FieldRule {
    pub fn contains(text: impl Into<String>) -> Self {
        FieldRule::Contains(text.into())
    }

    /// Compile `pattern` into a [`FieldRule::Matches`].
    pub fn regex(pattern: &str) -> Result<Self, ConfigurationError> {
        compile(pattern).map(FieldRule::Matches)
    }

    pub fn test(&self, value: &str) -> bool {
        match self {
            FieldRule::Contains(text) => value.contains(text.as_str()),
            FieldRule::Matches(regex) => regex.is_match(value),
        }
    }
}

impl From<Regex> for FieldRule {
    fn from(regex: Regex) -> Self {
        FieldRule::Matches(regex)
    }
}

/// How a single claim is tested.
#[derive(Debug, Clone)]
pub enum ClaimRule {
    /// Substring containment against the claim's text form
    Contains(String),
    /// Regular expression search against the claim's text form
    Matches(Regex),
    /// Equality with a boolean claim
    Equals(bool),
}

impl ClaimRule {
    pub fn contains(text: impl Into<String>) -> Self {
        ClaimRule::Contains(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, ConfigurationError> {
        compile(pattern).map(ClaimRule::Matches)
    }

    pub fn equals(value: bool) -> Self {
        ClaimRule::Equals(value)
    }

    fn test(&self, type_name: &str, claim: &str, value: &ClaimValue) -> Result<bool, ResolutionError> {
        match (self, value) {
            (ClaimRule::Equals(expected), ClaimValue::Bool(actual)) => Ok(expected == actual),
            (ClaimRule::Equals(_), _) => Ok(false),
            (_, ClaimValue::Bool(_)) => Err(ResolutionError::InvalidMatcher {
                type_name: type_name.to_string(),
                reason: format!("claim \"{claim}\" is boolean and can only be compared for equality"),
            }),
            (ClaimRule::Contains(text), value) => Ok(value.to_string().contains(text.as_str())),
            (ClaimRule::Matches(regex), value) => Ok(regex.is_match(&value.to_string())),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigurationError> {
    Regex::new(pattern).map_err(|e| ConfigurationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// A declarative matcher over identity fields and claims.
///
/// Unset fields always pass. A field rule fails when the identity does not
/// carry that field, and a claim rule fails when the claim is absent. An
/// empty pattern matches every identity.
#[derive(Debug, Clone, Default)]
pub struct MatchPattern {
    email: Option<FieldRule>,
    phone_number: Option<FieldRule>,
    uid: Option<FieldRule>,
    tenant_id: Option<FieldRule>,
    claims: Vec<(String, ClaimRule)>,
}

impl MatchPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, rule: FieldRule) -> Self {
        self.email = Some(rule);
        self
    }

    pub fn phone_number(mut self, rule: FieldRule) -> Self {
        self.phone_number = Some(rule);
        self
    }

    pub fn uid(mut self, rule: FieldRule) -> Self {
        self.uid = Some(rule);
        self
    }

    pub fn tenant_id(mut self, rule: FieldRule) -> Self {
        self.tenant_id = Some(rule);
        self
    }

    pub fn claim(mut self, name: impl Into<String>, rule: ClaimRule) -> Self {
        self.claims.push((name.into(), rule));
        self
    }

    fn field_rule(&self, field: IdentityField) -> Option<&FieldRule> {
        match field {
            IdentityField::Email => self.email.as_ref(),
            IdentityField::PhoneNumber => self.phone_number.as_ref(),
            IdentityField::Uid => self.uid.as_ref(),
            IdentityField::TenantId => self.tenant_id.as_ref(),
        }
    }

    fn matches(
        &self,
        type_name: &str,
        identity: &Identity,
        claims: &Claims,
    ) -> Result<bool, ResolutionError> {
        for field in IdentityField::ALL {
            let Some(rule) = self.field_rule(field) else {
                continue;
            };
            match identity.field(field) {
                Some(value) if rule.test(value) => {}
                _ => return Ok(false),
            }
        }

        for (name, rule) in &self.claims {
            let Some(value) = claims.get(name) else {
                return Ok(false);
            };
            if !rule.test(type_name, name, value)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

pub type Predicate = Arc<dyn Fn(&Identity, &Claims) -> bool + Send + Sync>;

/// Decides whether a model definition applies to an identity.
#[derive(Clone)]
pub enum Matcher {
    Predicate(Predicate),
    Pattern(MatchPattern),
}

impl Matcher {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Identity, &Claims) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate(Arc::new(f))
    }

    pub fn pattern(pattern: MatchPattern) -> Self {
        Matcher::Pattern(pattern)
    }

    /// A matcher that accepts every identity.
    pub fn always() -> Self {
        Matcher::Pattern(MatchPattern::new())
    }

    pub fn evaluate(
        &self,
        type_name: &str,
        identity: &Identity,
        claims: &Claims,
    ) -> Result<bool, ResolutionError> {
        match self {
            Matcher::Predicate(f) => Ok(f(identity, claims)),
            Matcher::Pattern(pattern) => pattern.matches(type_name, identity, claims),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Predicate(_) => f.write_str("Matcher::Predicate(..)"),
            Matcher::Pattern(pattern) => f.debug_tuple("Matcher::Pattern").field(pattern).finish(),
        }
    }
}

impl From<MatchPattern> for Matcher {
    fn from(pattern: MatchPattern) -> Self {
        Matcher::Pattern(pattern)
    }
}

/// Builds and optionally looks up models of one type.
///
/// `create` is required. `get` is the get-or-create hook: when it returns
/// `Some`, `create` is not called. The resolver calls `get` on every
/// resolution and never caches results itself.
#[async_trait]
pub trait ModelSource<M: Send + 'static>: Send + Sync + 'static {
    async fn create(&self, identity: &Identity, claims: &Claims) -> Result<M, ModelError>;

    async fn get(&self, _identity: &Identity, _claims: &Claims) -> Result<Option<M>, ModelError> {
        Ok(None)
    }
}

/// A [`ModelSource`] backed by a plain closure.
pub struct FnSource<F>(F);

#[async_trait]
impl<M, F> ModelSource<M> for FnSource<F>
where
    M: Send + 'static,
    F: Fn(&Identity, &Claims) -> Result<M, ModelError> + Send + Sync + 'static,
{
    async fn create(&self, identity: &Identity, claims: &Claims) -> Result<M, ModelError> {
        (self.0)(identity, claims)
    }
}

/// One entry of a [`ModelMap`].
pub struct ModelDefinition<M: Send + 'static> {
    matcher: Option<Matcher>,
    source: Arc<dyn ModelSource<M>>,
    routes: Option<AuthRoutes>,
}

impl<M: Send + 'static> ModelDefinition<M> {
    /// A definition without a matcher. Add one with [`ModelDefinition::matcher`].
    pub fn new(source: impl ModelSource<M>) -> Self {
        Self {
            matcher: None,
            source: Arc::new(source),
            routes: None,
        }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Identity, &Claims) -> Result<M, ModelError> + Send + Sync + 'static,
    {
        Self::new(FnSource(f))
    }

    pub fn matcher(mut self, matcher: impl Into<Matcher>) -> Self {
        self.matcher = Some(matcher.into());
        self
    }

    pub fn routes(mut self, routes: AuthRoutes) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn has_matcher(&self) -> bool {
        self.matcher.is_some()
    }
}

impl<M: Send + 'static> fmt::Debug for ModelDefinition<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("matcher", &self.matcher)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

/// Ordered map of model type name to definition. First match wins.
pub struct ModelMap<M: Send + 'static> {
    entries: Vec<(String, ModelDefinition<M>)>,
}

impl<M: Send + 'static> Default for ModelMap<M> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<M: Send + 'static> ModelMap<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, type_name: impl Into<String>, definition: ModelDefinition<M>) -> Self {
        self.entries.push((type_name.into(), definition));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, type_name: &str) -> Option<&ModelDefinition<M>> {
        self.entries
            .iter()
            .find(|(name, _)| name == type_name)
            .map(|(_, definition)| definition)
    }

    fn contains(&self, type_name: &str) -> bool {
        self.get(type_name).is_some()
    }
}

/// Resolver configuration.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Used when no matcher accepts.
    pub default_type: Option<String>,
    /// Forces every resolution to this type until cleared.
    pub override_type: Option<String>,
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_type(mut self, type_name: impl Into<String>) -> Self {
        self.default_type = Some(type_name.into());
        self
    }

    pub fn with_override_type(mut self, type_name: impl Into<String>) -> Self {
        self.override_type = Some(type_name.into());
        self
    }
}

/// The outcome of a resolution.
#[derive(Debug, Clone)]
pub struct Resolved<M> {
    pub type_name: String,
    pub model: M,
    pub routes: Option<AuthRoutes>,
}

/// Matches identities against a [`ModelMap`] and produces their models.
pub struct ModelResolver<M: Send + 'static> {
    models: ModelMap<M>,
    default_type: Option<String>,
    override_type: RwLock<Option<String>>,
}

impl<M: Send + 'static> ModelResolver<M> {
    /// Validate `models` against `config` and build a resolver.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::DuplicateType`] if a type name appears twice
    /// - [`ConfigurationError::MultipleDefaultlessModels`] if more than one
    ///   definition has no matcher
    /// - [`ConfigurationError::MissingDefaultForDefaultlessModel`] if exactly
    ///   one definition has no matcher and no default type is configured
    /// - [`ConfigurationError::UnknownDefaultType`] if the default or override
    ///   type is not in the map
    pub fn new(models: ModelMap<M>, config: ResolverConfig) -> Result<Self, ConfigurationError> {
        for (index, (name, _)) in models.entries.iter().enumerate() {
            if models.entries[..index].iter().any(|(earlier, _)| earlier == name) {
                return Err(ConfigurationError::DuplicateType(name.clone()));
            }
        }

        let defaultless: Vec<&str> = models
            .entries
            .iter()
            .filter(|(_, definition)| !definition.has_matcher())
            .map(|(name, _)| name.as_str())
            .collect();

        match defaultless.as_slice() {
            [] => {}
            [name] if config.default_type.is_none() => {
                return Err(ConfigurationError::MissingDefaultForDefaultlessModel(
                    name.to_string(),
                ));
            }
            [_] => {}
            many => return Err(ConfigurationError::MultipleDefaultlessModels(many.len())),
        }

        for configured in [&config.default_type, &config.override_type]
            .into_iter()
            .flatten()
        {
            if !models.contains(configured) {
                return Err(ConfigurationError::UnknownDefaultType(configured.clone()));
            }
        }

        tracing::debug!(
            models = models.len(),
            default_type = config.default_type.as_deref(),
            "Model resolver configured"
        );

        Ok(Self {
            models,
            default_type: config.default_type,
            override_type: RwLock::new(config.override_type),
        })
    }

    pub fn default_type(&self) -> Option<&str> {
        self.default_type.as_deref()
    }

    pub fn override_type(&self) -> Option<String> {
        self.override_type
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set or clear the override type.
    pub fn set_override_type(&self, type_name: Option<&str>) -> Result<(), ResolutionError> {
        if let Some(name) = type_name {
            if !self.models.contains(name) {
                return Err(ResolutionError::UnknownType(name.to_string()));
            }
        }
        *self
            .override_type
            .write()
            .unwrap_or_else(PoisonError::into_inner) = type_name.map(str::to_string);
        tracing::info!(override_type = type_name, "Model override type changed");
        Ok(())
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.models.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn routes_for(&self, type_name: &str) -> Option<&AuthRoutes> {
        self.models.get(type_name).and_then(|d| d.routes.as_ref())
    }

    /// Pick the model type for an identity.
    pub fn find_match_type_name(
        &self,
        identity: &Identity,
        claims: &Claims,
        hint: Option<&str>,
    ) -> Result<String, ResolutionError> {
        if let Some(forced) = self.override_type() {
            return Ok(forced);
        }

        if let Some(hint) = hint {
            let definition = self
                .models
                .get(hint)
                .ok_or_else(|| ResolutionError::UnknownType(hint.to_string()))?;
            if let Some(matcher) = &definition.matcher {
                if matcher.evaluate(hint, identity, claims)? {
                    return Ok(hint.to_string());
                }
            }
        }

        for (name, definition) in &self.models.entries {
            if let Some(matcher) = &definition.matcher {
                if matcher.evaluate(name, identity, claims)? {
                    return Ok(name.clone());
                }
            }
        }

        match &self.default_type {
            Some(default_type) => Ok(default_type.clone()),
            None => Err(ResolutionError::NoModelFound(identity.uid.to_string())),
        }
    }

    /// Pick the model type for an identity and produce its model.
    pub async fn resolve(
        &self,
        identity: &Identity,
        claims: &Claims,
        hint: Option<&str>,
    ) -> Result<Resolved<M>, ResolutionError> {
        let type_name = self.find_match_type_name(identity, claims, hint)?;
        self.resolve_for_type(&type_name, identity, claims).await
    }

    /// Produce the model of a given type, skipping matching entirely.
    pub async fn resolve_for_type(
        &self,
        type_name: &str,
        identity: &Identity,
        claims: &Claims,
    ) -> Result<Resolved<M>, ResolutionError> {
        let definition = self
            .models
            .get(type_name)
            .ok_or_else(|| ResolutionError::UnknownType(type_name.to_string()))?;

        let model_error = |source| ResolutionError::Model {
            type_name: type_name.to_string(),
            source,
        };

        let model = match definition.source.get(identity, claims).await.map_err(model_error)? {
            Some(existing) => existing,
            None => definition
                .source
                .create(identity, claims)
                .await
                .map_err(model_error)?,
        };

        tracing::debug!(user.id = %identity.uid, model.type_name = type_name, "Resolved user model");

        Ok(Resolved {
            type_name: type_name.to_string(),
            model,
            routes: definition.routes.clone(),
        })
    }

    /// Fetch fresh claims from the provider, then resolve.
    pub async fn fetch_and_resolve(
        &self,
        provider: &dyn IdentityProvider,
        identity: &Identity,
        hint: Option<&str>,
    ) -> Result<(Claims, Resolved<M>), Error> {
        let claims = provider.fetch_claims(identity).await?;
        let resolved = self.resolve(identity, &claims, hint).await?;
        Ok((claims, resolved))
    }
}

impl<M: Send + 'static> fmt::Debug for ModelResolver<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelResolver")
            .field("models", &self.models.entries.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("default_type", &self.default_type)
            .finish_non_exhaustive()
    }
}
