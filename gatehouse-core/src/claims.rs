//! Claims attached to an identity's session token
//!
//! Claims are fetched from the identity provider alongside (and independently
//! of) the identity. They are treated as immutable once fetched and replaced
//! wholesale on refresh.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A single claim value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ClaimValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ClaimValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ClaimValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimValue::Bool(b) => write!(f, "{b}"),
            ClaimValue::Number(n) => write!(f, "{n}"),
            ClaimValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        ClaimValue::Bool(value)
    }
}

impl From<f64> for ClaimValue {
    fn from(value: f64) -> Self {
        ClaimValue::Number(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        ClaimValue::Number(value as f64)
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        ClaimValue::String(value.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        ClaimValue::String(value)
    }
}

/// The set of claims issued with a session token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(BTreeMap<String, ClaimValue>);

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a claim, consuming and returning the set.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClaimValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse the claims section of a decoded token payload.
    ///
    /// Only string, boolean and numeric members are kept. Nested objects,
    /// arrays and nulls are skipped.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ProviderError> {
        let serde_json::Value::Object(map) = value else {
            return Err(ProviderError::new(
                "auth/invalid-claims",
                "claims payload is not an object",
            ));
        };

        let claims = map
            .into_iter()
            .filter_map(|(name, value)| match value {
                serde_json::Value::Bool(b) => Some((name, ClaimValue::Bool(b))),
                serde_json::Value::Number(n) => n.as_f64().map(|n| (name, ClaimValue::Number(n))),
                serde_json::Value::String(s) => Some((name, ClaimValue::String(s))),
                _ => None,
            })
            .collect();

        Ok(Claims(claims))
    }
}

impl<K: Into<String>, V: Into<ClaimValue>> FromIterator<(K, V)> for Claims {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Claims(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claims_builder() {
        let claims = Claims::new().with("role", "admin").with("beta", true).with("level", 3i64);

        assert_eq!(claims.len(), 3);
        assert_eq!(claims.get("role").and_then(ClaimValue::as_str), Some("admin"));
        assert_eq!(claims.get("beta").and_then(ClaimValue::as_bool), Some(true));
        assert_eq!(claims.get("level").and_then(ClaimValue::as_f64), Some(3.0));
        assert!(claims.get("missing").is_none());
    }

    #[test]
    fn test_claims_from_json_skips_nested_values() {
        let claims = Claims::from_json(json!({
            "role": "editor",
            "admin": false,
            "auth_time": 1700000000,
            "provider_data": { "sign_in_method": "password" },
            "groups": ["a", "b"],
            "nothing": null
        }))
        .expect("Failed to parse claims");

        assert_eq!(claims.len(), 3);
        assert_eq!(claims.get("admin"), Some(&ClaimValue::Bool(false)));
        assert!(!claims.contains("provider_data"));
        assert!(!claims.contains("nothing"));
    }

    #[test]
    fn test_claims_from_json_rejects_non_object() {
        let err = Claims::from_json(json!(["role"])).unwrap_err();
        assert_eq!(err.code, "auth/invalid-claims");
    }

    #[test]
    fn test_claim_value_untagged_serde() {
        let claims: Claims = serde_json::from_value(json!({"a": true, "b": 1.5, "c": "x"})).unwrap();
        assert_eq!(claims.get("a"), Some(&ClaimValue::Bool(true)));
        assert_eq!(claims.get("b"), Some(&ClaimValue::Number(1.5)));
        assert_eq!(claims.get("c"), Some(&ClaimValue::String("x".to_string())));
    }

    #[test]
    fn test_claim_value_display() {
        assert_eq!(ClaimValue::from(42i64).to_string(), "42");
        assert_eq!(ClaimValue::from(true).to_string(), "true");
        assert_eq!(ClaimValue::from("gold").to_string(), "gold");
    }
}
