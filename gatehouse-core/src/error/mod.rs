pub mod codes;

use thiserror::Error;

pub use codes::convert_error_code;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// An error reported by the identity provider.
///
/// `code` is the provider's machine readable code (e.g. `auth/user-not-found`),
/// `message` whatever free-form text came along with it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The human readable form of this error's code.
    pub fn readable(&self) -> String {
        convert_error_code(&self.code)
    }
}

/// An error raised by a model creator or getter.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model build failed: {0}")]
    Build(String),
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("No user model found for user {0}")]
    NoModelFound(String),

    #[error("Invalid matcher for model type \"{type_name}\": {reason}")]
    InvalidMatcher { type_name: String, reason: String },

    #[error("Unknown model type: {0}")]
    UnknownType(String),

    #[error("Model type \"{type_name}\" failed: {source}")]
    Model {
        type_name: String,
        #[source]
        source: ModelError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Only one model may omit a matcher, found {0}")]
    MultipleDefaultlessModels(usize),

    #[error("Model type \"{0}\" has no matcher but no default type is configured")]
    MissingDefaultForDefaultlessModel(String),

    #[error("Model type \"{0}\" is defined more than once")]
    DuplicateType(String),

    #[error("Configured type \"{0}\" is not defined in the model map")]
    UnknownDefaultType(String),

    #[error("Invalid pattern /{pattern}/: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot {0} when not authenticated")]
    AuthRequired(String),

    #[error("Transition superseded by a newer session change")]
    Superseded,

    #[error("Session state not initialized, call initialize first")]
    NotInitialized,
}

impl Error {
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Error::Provider(_))
    }

    pub fn is_resolution_error(&self) -> bool {
        matches!(self, Error::Resolution(_))
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, Error::Session(SessionError::AuthRequired(_)))
    }

    /// The text shown to a user for this error.
    ///
    /// Provider errors go through the error-code table, everything else uses
    /// its display form.
    pub fn readable(&self) -> String {
        match self {
            Error::Provider(e) => e.readable(),
            other => other.to_string(),
        }
    }
}
