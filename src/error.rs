use std::{convert::Infallible, fmt, io, time::Duration};

use crate::{secret::EntropyUnavailable, ProviderRejection, ValidationError};

/// Broad categories of failure, for callers that branch on the cause rather than the message.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Missing or invalid configuration. Nothing was sent over the network.
    Configuration,
    /// A remote service answered with something that could not be understood.
    ProviderProtocol,
    /// A remote service explicitly refused the request.
    ProviderRejection,
    /// The request could not be delivered.
    Transport,
    /// The authorization callback failed the CSRF state check.
    SecurityViolation,
    /// The user did not complete authentication in time.
    TimeoutExceeded,
    /// Local input validation failed.
    Validation,
    /// A local resource was unavailable: randomness, callback ports, the prompt.
    LocalResource,
}

/// An error indicating missing or invalid configuration.
///
/// The error message should be sufficient to aid end-user debugging.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    pub(crate) fn new(error: impl Into<String>) -> Self {
        Self(error.into())
    }
}

/// A failure while obtaining an identity token from the provider.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No secure randomness for the PKCE verifier or CSRF state.
    #[error(transparent)]
    Entropy(#[from] EntropyUnavailable),

    /// A request to the provider could not be delivered.
    #[error("{0}")]
    Transport(String),

    /// The provider answered with a non-success status and no OIDC error.
    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        /// The endpoint that was called.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
        /// The response body, for diagnostics.
        body: String,
    },

    /// The provider's response could not be decoded or lacked required fields.
    #[error("{0}")]
    MalformedResponse(String),

    /// The provider returned an OIDC error.
    #[error(transparent)]
    Rejected(#[from] ProviderRejection),

    /// The provider URL cannot form a valid authorization URL.
    #[error("invalid identity provider URL '{url}': {source}")]
    InvalidProviderUrl {
        /// The configured provider URL.
        url: String,
        /// Why it could not be parsed.
        source: url::ParseError,
    },

    /// Neither callback port could be bound.
    #[error("both callback ports ({primary} and {fallback}) are in use, please free one of them")]
    NoCallbackPortAvailable {
        /// The port tried first.
        primary: u16,
        /// The port tried second.
        fallback: u16,
    },

    /// The callback listener failed.
    #[error("callback server error: {0}")]
    CallbackServer(#[source] io::Error),

    /// The user did not complete authentication before the deadline.
    #[error("authentication timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    /// The callback `state` did not match the value sent with the authorization request.
    #[error("security error: state parameter mismatch")]
    StateMismatch,

    /// The provider reported success but sent no access token.
    #[error("no access token received")]
    MissingAccessToken,

    /// The verification prompt failed.
    #[error("verification prompt failed: {0}")]
    Prompt(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AuthError {
    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Status { .. } | Self::MalformedResponse(_) | Self::MissingAccessToken => {
                ErrorKind::ProviderProtocol
            }
            Self::Rejected(_) => ErrorKind::ProviderRejection,
            Self::InvalidProviderUrl { .. } => ErrorKind::Configuration,
            Self::Entropy(_)
            | Self::NoCallbackPortAvailable { .. }
            | Self::CallbackServer(_)
            | Self::Prompt(_) => ErrorKind::LocalResource,
            Self::TimedOut(_) => ErrorKind::TimeoutExceeded,
            Self::StateMismatch => ErrorKind::SecurityViolation,
        }
    }

    pub(crate) fn prompt<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Prompt(Box::new(error))
    }
}

/// A failure while exchanging an identity token for credentials.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, thiserror::Error)]
pub enum AssumeRoleError {
    /// The request was rejected locally before being sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The endpoint returned an error code.
    #[error("{message}")]
    Rejected {
        /// The raw error code, e.g. `AccessDenied`.
        code: String,
        /// The translated message.
        message: String,
    },

    /// The endpoint could not be reached.
    #[error("{0}")]
    Transport(String),

    /// The endpoint's response could not be used.
    #[error("{0}")]
    MalformedResponse(String),
}

impl AssumeRoleError {
    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(error) => error.kind(),
            Self::Rejected { .. } => ErrorKind::ProviderRejection,
            Self::Transport(_) => ErrorKind::Transport,
            Self::MalformedResponse(_) => ErrorKind::ProviderProtocol,
        }
    }
}

/// The authentication method that failed, used to prefix [`Error::Auth`] messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Device authorization grant.
    Device,
    /// Authorization code grant with PKCE.
    Browser,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Device => "device",
            Self::Browser => "browser",
        })
    }
}

/// An error indicating either misconfiguration or a failure while obtaining credentials.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration was missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Input was rejected before any request was made.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The HTTP client could not be constructed.
    #[error("failed to initialise HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// Obtaining an identity token failed.
    #[error("{method} authentication failed: {source}")]
    Auth {
        /// The flow that failed.
        method: AuthMethod,
        /// What went wrong.
        source: AuthError,
    },

    /// Exchanging the identity token failed.
    #[error("AssumeRoleWithWebIdentity failed: {0}")]
    AssumeRole(#[from] AssumeRoleError),
}

impl Error {
    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Validation(error) => error.kind(),
            Self::HttpClient(_) => ErrorKind::LocalResource,
            Self::Auth { source, .. } => source.kind(),
            Self::AssumeRole(error) => error.kind(),
        }
    }
}

impl From<Infallible> for Error {
    fn from(error: Infallible) -> Self {
        match error {}
    }
}
