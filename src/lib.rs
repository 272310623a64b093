#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, clippy::pedantic)]

//! Temporary RadosGW credentials from an OIDC identity provider.
//!
//! An identity token is obtained with the OAuth 2.0 device authorization grant, the
//! authorization code grant with PKCE (via a loopback redirect), or supplied directly. It is then
//! exchanged for temporary S3 credentials with RadosGW's STS `AssumeRoleWithWebIdentity`.
//!
//! See [`assume`] for the main entrypoint to the crate.
//!
//! ```no_run
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::convert::Infallible;
//!
//! let credentials = radosgw_assume::assume(|verification| async move {
//!     eprintln!("{verification}");
//!     Ok::<_, Infallible>(())
//! }).await?;
//!
//! print!("{}", credentials.shell_exports(None));
//! # Ok(()) }
//! ```

mod browser;
mod builder;
mod credentials;
mod device;
pub mod duration;
mod error;
mod flow;
mod heartbeat;
mod oidc;
mod profile;
pub mod provider_error;
pub mod secret;
mod settings;
mod sts;
mod transport;
mod validation;

pub use crate::{
    browser::BrowserAuthenticator,
    builder::{AssumeConfig, AssumeFlowBuilder, AuthConfig, ConfigSource, NoPrompt},
    credentials::{AssumedCredentials, ShellExports},
    device::DeviceAuthenticator,
    duration::SessionDuration,
    error::{AssumeRoleError, AuthError, AuthMethod, ConfigError, Error, ErrorKind},
    flow::{AssumeFlow, Verification, VerificationPrompt},
    heartbeat::{Progress, Silent},
    oidc::{AccessToken, OidcProvider},
    profile::{list_profiles, EnvSource, ProfileSource, ENV_SESSION_LABEL},
    provider_error::ProviderRejection,
    secret::{CsrfState, PkceChallenge},
    settings::FlowSettings,
    sts::StsClient,
    transport::http_client,
    validation::{validate_session_label, ValidationError},
};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Obtain credentials for the profile selected by `AWS_PROFILE` with the given
/// `verification_prompt`.
///
/// The prompt is called once with instructions for the user when the profile uses the device or
/// browser flow; the flow then waits (up to one minute by default) for the user to sign in.
/// Credentials are requested for one hour and the session is named after the profile.
///
/// Configuration is sourced from AWS shared config (located with `AWS_CONFIG_FILE` and
/// `AWS_PROFILE`). For more flexible configuration see [`AssumeFlowBuilder`].
///
/// # Errors
///
/// An error is returned if the profile cannot be loaded or is incomplete, if authentication with
/// the identity provider fails, or if RadosGW refuses to assume the role. [`Error::kind`]
/// separates these cases.
pub async fn assume<V: VerificationPrompt>(
    verification_prompt: V,
) -> Result<AssumedCredentials, Error> {
    AssumeFlow::new(verification_prompt)
        .await?
        .authenticate()
        .await
}
