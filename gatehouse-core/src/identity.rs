//! Identities issued by the identity provider
//!
//! An [`Identity`] is the provider's view of a signed-in principal. It is
//! immutable for the lifetime of a sign-in and replaced wholesale when the
//! provider reports a different principal (or none at all).
//!
//! | Field          | Type             | Description                                  |
//! | -------------- | ---------------- | -------------------------------------------- |
//! | `uid`          | `UserId`         | The stable unique identifier for the user.   |
//! | `email`        | `Option<String>` | The email address, if the provider has one.  |
//! | `phone_number` | `Option<String>` | The phone number, if the provider has one.   |
//! | `tenant_id`    | `Option<String>` | The tenant the identity belongs to, if any.  |
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A unique, stable identifier for a specific user
/// This value should be treated as opaque
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: &str) -> Self {
        UserId(id.to_string())
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity fields a matcher pattern can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Email,
    PhoneNumber,
    Uid,
    TenantId,
}

impl IdentityField {
    pub const ALL: [IdentityField; 4] = [
        IdentityField::Email,
        IdentityField::PhoneNumber,
        IdentityField::Uid,
        IdentityField::TenantId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityField::Email => "email",
            IdentityField::PhoneNumber => "phoneNumber",
            IdentityField::Uid => "uid",
            IdentityField::TenantId => "tenantId",
        }
    }
}

impl std::fmt::Display for IdentityField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed-in principal as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl Identity {
    pub fn builder() -> IdentityBuilder {
        IdentityBuilder::default()
    }

    /// Read one of the matchable fields.
    pub fn field(&self, field: IdentityField) -> Option<&str> {
        match field {
            IdentityField::Email => self.email.as_deref(),
            IdentityField::PhoneNumber => self.phone_number.as_deref(),
            IdentityField::Uid => Some(self.uid.as_str()),
            IdentityField::TenantId => self.tenant_id.as_deref(),
        }
    }
}

#[derive(Default)]
pub struct IdentityBuilder {
    uid: Option<UserId>,
    email: Option<String>,
    phone_number: Option<String>,
    tenant_id: Option<String>,
}

impl IdentityBuilder {
    pub fn uid(mut self, uid: impl Into<UserId>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn build(self) -> Result<Identity, ConfigurationError> {
        Ok(Identity {
            uid: self
                .uid
                .ok_or_else(|| ConfigurationError::MissingField("uid".to_string()))?,
            email: self.email,
            phone_number: self.phone_number,
            tenant_id: self.tenant_id,
        })
    }
}
