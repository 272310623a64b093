use std::{convert::Infallible, sync::Arc};

use crate::{
    heartbeat::Silent, transport, validate_session_label, AccessToken, AssumeFlow, Error,
    FlowSettings, OidcProvider, ProfileSource, Progress, SessionDuration, VerificationPrompt,
};

/// Builder for [`AssumeFlow`].
///
/// This allows aspects of the authentication flow to be configured.
///
/// # Example
///
/// ```
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::convert::Infallible;
///
/// use radosgw_assume::{AssumeConfig, AssumeFlowBuilder, AuthConfig, OidcProvider};
///
/// let flow = AssumeFlowBuilder::new()
///     // use hard-coded configuration instead of loading from a profile
///     .config(AssumeConfig {
///         endpoint_url: "https://rgw.example.com".to_string(),
///         role_arn: "arn:aws:iam:::role/S3Access".to_string(),
///         auth: AuthConfig::Device(OidcProvider::new(
///             "https://idp.example.com/realms/ceph",
///             "radosgw",
///             "openid",
///         )),
///         tls_verify: true,
///         session_label: "ops".to_string(),
///     })
///     // request credentials valid for two hours
///     .session_duration("2h".parse()?)
///     .verification_prompt(|verification| async move {
///         eprintln!("{verification}");
///         Ok::<_, Infallible>(())
///     })
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[allow(clippy::module_name_repetitions)]
pub struct AssumeFlowBuilder<S = ProfileSource, V = NoPrompt> {
    config_source: S,
    verification_prompt: V,
    settings: FlowSettings,
    session_duration: SessionDuration,
    session_label: Option<String>,
    progress: Arc<dyn Progress>,
}

/// Placeholder for a builder whose verification prompt has not been set yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl AssumeFlowBuilder<ProfileSource, NoPrompt> {
    /// Construct an [`AssumeFlow`] builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for AssumeFlowBuilder<ProfileSource, NoPrompt> {
    fn default() -> Self {
        Self {
            config_source: ProfileSource::default(),
            verification_prompt: NoPrompt,
            settings: FlowSettings::default(),
            session_duration: SessionDuration::DEFAULT,
            session_label: None,
            progress: Arc::new(Silent),
        }
    }
}

impl<S, V> AssumeFlowBuilder<S, V> {
    /// Set the configuration source.
    ///
    /// By default, configuration is sourced from AWS shared config (located with
    /// `AWS_CONFIG_FILE` and `AWS_PROFILE`).
    #[must_use]
    pub fn config<NewS>(self, config_source: NewS) -> AssumeFlowBuilder<NewS, V>
    where
        NewS: ConfigSource,
    {
        AssumeFlowBuilder {
            config_source,
            verification_prompt: self.verification_prompt,
            settings: self.settings,
            session_duration: self.session_duration,
            session_label: self.session_label,
            progress: self.progress,
        }
    }

    /// Set the verification prompt handler.
    ///
    /// The device and browser flows need the user to act in a browser; the prompt tells them how.
    /// It is not called for token authentication.
    #[must_use]
    pub fn verification_prompt<NewV>(self, verification_prompt: NewV) -> AssumeFlowBuilder<S, NewV>
    where
        NewV: VerificationPrompt,
    {
        AssumeFlowBuilder {
            config_source: self.config_source,
            verification_prompt,
            settings: self.settings,
            session_duration: self.session_duration,
            session_label: self.session_label,
            progress: self.progress,
        }
    }

    /// Override timings, callback ports and browser launching.
    #[must_use]
    pub fn settings(self, settings: FlowSettings) -> Self {
        Self { settings, ..self }
    }

    /// Set the requested credential lifetime. Defaults to one hour.
    #[must_use]
    pub fn session_duration(self, session_duration: SessionDuration) -> Self {
        Self {
            session_duration,
            ..self
        }
    }

    /// Override the role session name chosen by the configuration source.
    #[must_use]
    pub fn session_label(self, label: impl Into<String>) -> Self {
        Self {
            session_label: Some(label.into()),
            ..self
        }
    }

    /// Report progress while waiting for the user. Silent by default.
    #[must_use]
    pub fn progress(self, progress: impl Progress + 'static) -> Self {
        Self {
            progress: Arc::new(progress),
            ..self
        }
    }
}

impl<S, V> AssumeFlowBuilder<S, V>
where
    S: ConfigSource,
    S::Error: Into<Error>,
    V: VerificationPrompt,
{
    /// Build an [`AssumeFlow`] with the given configuration.
    ///
    /// Nothing is sent over the network.
    ///
    /// # Errors
    ///
    /// Returns any error encountered when loading the [`ConfigSource`], an invalid session label,
    /// or a failure to initialise the HTTP client.
    pub async fn build(self) -> Result<AssumeFlow<V>, Error> {
        let mut config = self.config_source.load().await.map_err(Into::into)?;
        if let Some(label) = self.session_label {
            config.session_label = label;
        }
        validate_session_label(&config.session_label)?;

        let http = transport::http_client(config.tls_verify).map_err(Error::HttpClient)?;

        Ok(AssumeFlow::build(
            config,
            http,
            self.verification_prompt,
            self.settings,
            self.session_duration,
            self.progress,
        ))
    }
}

/// A source of flow configuration.
///
/// This trait is more intended to facilitate precise error handling in
/// [`AssumeFlowBuilder::build`], but it could also be used to implement alternative configuration
/// sources.
pub trait ConfigSource {
    /// The future returned by the config source.
    type Future: std::future::Future<Output = Result<AssumeConfig, Self::Error>>;

    /// The error that might occur when sourcing the configuration.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the configuration.
    fn load(self) -> Self::Future;
}

/// How the identity token is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// OAuth 2.0 device authorization grant.
    Device(OidcProvider),

    /// OAuth 2.0 authorization code grant with PKCE and a loopback redirect.
    Browser(OidcProvider),

    /// A token obtained elsewhere.
    Token(AccessToken),
}

/// Everything needed to obtain credentials for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeConfig {
    /// The RadosGW endpoint serving STS.
    pub endpoint_url: String,

    /// The role to assume.
    pub role_arn: String,

    /// How to obtain the identity token.
    pub auth: AuthConfig,

    /// Whether TLS certificates are verified, for both the identity provider and RadosGW.
    pub tls_verify: bool,

    /// The role session name.
    pub session_label: String,
}

impl ConfigSource for AssumeConfig {
    type Future = futures::future::Ready<Result<Self, Self::Error>>;

    type Error = Infallible;

    fn load(self) -> Self::Future {
        futures::future::ready(Ok(self))
    }
}
