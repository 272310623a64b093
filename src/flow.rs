use std::{fmt, sync::Arc};

use url::Url;

use crate::{
    builder::NoPrompt, error::AuthMethod, AssumeConfig, AssumeFlowBuilder,
    AssumedCredentials, AuthConfig, BrowserAuthenticator, DeviceAuthenticator, Error,
    FlowSettings, Progress, SessionDuration, StsClient,
};

/// A configured flow that obtains an identity token and exchanges it for RadosGW credentials.
///
/// A default flow can be constructed with [`new`](Self::new).
#[allow(clippy::module_name_repetitions)]
pub struct AssumeFlow<V> {
    config: AssumeConfig,
    http: reqwest::Client,
    sts_client: StsClient,
    verification_prompt: V,
    settings: FlowSettings,
    session_duration: SessionDuration,
    progress: Arc<dyn Progress>,
}

impl AssumeFlow<NoPrompt> {
    /// Construct a builder for a flow.
    ///
    /// Use this to override the default flow configuration.
    #[must_use]
    pub fn builder() -> AssumeFlowBuilder {
        AssumeFlowBuilder::default()
    }
}

impl<V> AssumeFlow<V>
where
    V: VerificationPrompt,
{
    /// Create a flow for the profile selected by `AWS_PROFILE` in the AWS shared config file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use std::convert::Infallible;
    ///
    /// let flow = radosgw_assume::AssumeFlow::new(|verification| async move {
    ///     eprintln!("{verification}");
    ///     Ok::<_, Infallible>(())
    /// }).await?;
    ///
    /// let credentials = flow.authenticate().await?;
    /// # Ok(()) }
    /// ```
    ///
    /// # Errors
    ///
    /// An error is returned if the profile cannot be loaded or is incomplete.
    pub async fn new(verification_prompt: V) -> Result<Self, Error> {
        AssumeFlowBuilder::default()
            .verification_prompt(verification_prompt)
            .build()
            .await
    }

    pub(crate) fn build(
        config: AssumeConfig,
        http: reqwest::Client,
        verification_prompt: V,
        settings: FlowSettings,
        session_duration: SessionDuration,
        progress: Arc<dyn Progress>,
    ) -> Self {
        Self {
            sts_client: StsClient::with_http_client(config.endpoint_url.clone(), http.clone()),
            config,
            http,
            verification_prompt,
            settings,
            session_duration,
            progress,
        }
    }

    /// The configuration this flow runs with.
    #[must_use]
    pub fn config(&self) -> &AssumeConfig {
        &self.config
    }

    /// Obtain an identity token and exchange it for credentials.
    ///
    /// # Errors
    ///
    /// An error is returned if the authentication flow or the role assumption fails. See
    /// [`Error`] for details of possible errors.
    pub async fn authenticate(&self) -> Result<AssumedCredentials, Error> {
        let token = match &self.config.auth {
            AuthConfig::Device(provider) => {
                DeviceAuthenticator::new(self.http.clone(), provider.clone(), self.settings.clone())
                    .authenticate(self.verification_prompt.clone(), Arc::clone(&self.progress))
                    .await
                    .map_err(|source| Error::Auth {
                        method: AuthMethod::Device,
                        source,
                    })?
            }
            AuthConfig::Browser(provider) => {
                BrowserAuthenticator::new(self.http.clone(), provider.clone(), self.settings.clone())
                    .authenticate(self.verification_prompt.clone(), Arc::clone(&self.progress))
                    .await
                    .map_err(|source| Error::Auth {
                        method: AuthMethod::Browser,
                        source,
                    })?
            }
            AuthConfig::Token(token) => token.clone(),
        };

        let credentials = self
            .sts_client
            .assume(
                &self.config.role_arn,
                &token,
                &self.config.session_label,
                self.session_duration,
            )
            .await?;
        Ok(credentials)
    }
}

impl<V> fmt::Debug for AssumeFlow<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AssumeFlow")
            .field("config", &self.config)
            .field("sts_client", &self.sts_client)
            .field("settings", &self.settings)
            .field("session_duration", &self.session_duration)
            .field("verification_prompt", &"_")
            .finish_non_exhaustive()
    }
}

/// What the user must do to complete authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Verification {
    /// Visit `verification_uri` on any device and enter `user_code`.
    DeviceCode {
        /// Where to enter the code.
        verification_uri: Url,
        /// The code to enter.
        user_code: String,
        /// A URL with the code already filled in, if the provider offers one.
        verification_uri_complete: Option<Url>,
    },

    /// Sign in at `authorization_url` in a browser on this machine.
    Browser {
        /// The provider's authorization URL, including PKCE challenge and state.
        authorization_url: Url,
        /// Whether the URL was already opened in the default browser.
        browser_opened: bool,
    },
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DeviceCode {
                verification_uri,
                user_code,
                verification_uri_complete,
            } => {
                write!(f, "Go to {verification_uri} and enter code {user_code}")?;
                if let Some(complete) = verification_uri_complete {
                    write!(f, " (or open {complete})")?;
                }
                Ok(())
            }
            Self::Browser {
                authorization_url,
                browser_opened: true,
            } => write!(f, "Complete sign-in in the browser window at {authorization_url}"),
            Self::Browser {
                authorization_url, ..
            } => write!(f, "Open {authorization_url} in your browser to sign in"),
        }
    }
}

/// A verification prompt.
///
/// The device and browser flows require users to sign in with the identity provider in a
/// browser. There are many ways to tell them how depending on the context, so verification
/// prompts are modelled with this trait. The prompt should present the instructions and return;
/// the flow does the waiting.
///
/// The trait is implemented for async functions with a single [`Verification`] argument and
/// returning `Result<(), E>`, so a trivial prompt could look like:
///
/// ```
/// use std::convert::Infallible;
///
/// use radosgw_assume::VerificationPrompt;
///
/// fn prompt() -> impl VerificationPrompt {
///     |verification| async move {
///         eprintln!("{verification}");
///         Ok::<_, Infallible>(())
///     }
/// }
/// ```
pub trait VerificationPrompt: Clone + Send + Sync {
    /// The future returned by the prompt.
    type Future: std::future::Future<Output = Result<(), Self::Error>> + Send;

    /// An error that could occur when attempting to prompt.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Present `verification` to the user.
    fn prompt(self, verification: Verification) -> Self::Future;
}

impl<F, Fut, E> VerificationPrompt for F
where
    F: FnOnce(Verification) -> Fut + Clone + Send + Sync,
    Fut: std::future::Future<Output = Result<(), E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Future = Fut;
    type Error = E;

    fn prompt(self, verification: Verification) -> Fut {
        self(verification)
    }
}
