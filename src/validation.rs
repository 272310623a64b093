use crate::ErrorKind;

/// Input rejected locally, before any network call is made.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The role session label is not acceptable to the storage endpoint.
    #[error("invalid session name: {0}")]
    InvalidSessionName(&'static str),

    /// No role ARN was given.
    #[error("role ARN cannot be empty")]
    EmptyRoleArn,

    /// The identity token to exchange is empty.
    #[error("web identity token cannot be empty")]
    EmptyToken,

    /// A duration string could not be parsed.
    #[error("invalid duration format: {0} (use format like '1h', '30m', or '3600')")]
    InvalidDuration(String),

    /// A duration is outside the accepted session lifetime.
    #[error("duration cannot {bound} (specified: {specified})")]
    DurationOutOfRange {
        /// The bound that was violated, e.g. `be less than 15 minutes`.
        bound: &'static str,
        /// The requested duration, formatted for humans.
        specified: String,
    },
}

impl ValidationError {
    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Check that `label` is usable as a role session name.
///
/// Labels must be non-empty, consist only of ASCII letters, digits and dashes, and must not start
/// or end with a dash.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidSessionName`] describing the first rule that is broken.
pub fn validate_session_label(label: &str) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::InvalidSessionName("session name cannot be empty"));
    }
    if label.starts_with('-') {
        return Err(ValidationError::InvalidSessionName(
            "session name cannot start with a dash",
        ));
    }
    if label.ends_with('-') {
        return Err(ValidationError::InvalidSessionName(
            "session name cannot end with a dash",
        ));
    }
    if !label.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'-') {
        return Err(ValidationError::InvalidSessionName(
            "session name can only contain alphanumeric characters (a-z, A-Z, 0-9) and dashes (-)",
        ));
    }
    Ok(())
}
