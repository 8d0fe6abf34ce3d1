//! Provider error code table
//!
//! Identity providers report failures with stable codes such as
//! `auth/user-not-found`. This module turns the ones we know about into text
//! suitable for showing to a user. Codes that are not in the table pass
//! through unchanged.

/// Known provider error codes and their readable messages.
pub const ERROR_CODES: &[(&str, &str)] = &[
    ("auth/invalid-email", "Invalid Email"),
    ("auth/user-not-found", "User Not Found"),
    ("auth/wrong-password", "Password Invalid"),
    ("auth/email-already-in-use", "Email Already In Use"),
];

/// Convert a provider error code into a readable message.
///
/// # Example
///
/// ```rust
/// use gatehouse_core::error::convert_error_code;
///
/// assert_eq!(convert_error_code("auth/invalid-email"), "Invalid Email");
/// assert_eq!(convert_error_code("auth/too-many-requests"), "auth/too-many-requests");
/// ```
pub fn convert_error_code(code: &str) -> String {
    ERROR_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, readable)| (*readable).to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Log a provider error code in its readable form.
pub fn log_error_code(code: &str) -> String {
    let readable = convert_error_code(code);
    tracing::warn!(error.code = code, "{}", readable);
    readable
}
