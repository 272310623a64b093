//! OAuth 2.0 device authorization grant.

use std::{sync::Arc, time::Duration};

use tokio::time::{self, Instant};
use tracing::debug;

use crate::{
    heartbeat::{Heartbeat, Progress},
    oidc::{self, next_interval, DeviceAuthorization, DevicePoll},
    AccessToken, AuthError, FlowSettings, OidcProvider, Verification, VerificationPrompt,
};

/// Obtains an identity token with the device authorization grant.
///
/// The user is shown a verification URL and a user code, and completes authentication on any
/// device while this side polls the token endpoint.
pub struct DeviceAuthenticator {
    client: oidc::Client,
    settings: FlowSettings,
}

impl DeviceAuthenticator {
    /// Create an authenticator for `provider`, sending requests with `http`.
    #[must_use]
    pub fn new(http: reqwest::Client, provider: OidcProvider, settings: FlowSettings) -> Self {
        Self {
            client: oidc::Client::new(http, provider),
            settings,
        }
    }

    /// Run the flow to completion.
    ///
    /// Registers a device code, hands the verification details to `prompt`, then polls until
    /// the provider grants a token, rejects the request, or the authentication deadline passes.
    /// `progress` ticks while polling and is finished before this returns.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] on any provider, transport or prompt failure, or
    /// [`AuthError::TimedOut`] when the deadline passes.
    pub async fn authenticate<V: VerificationPrompt>(
        &self,
        prompt: V,
        progress: Arc<dyn Progress>,
    ) -> Result<AccessToken, AuthError> {
        let authorization = self.client.start_device_authorization().await?;
        debug!(
            user_code = %authorization.user_code,
            expires_in = authorization.expires_in.map(|expires_in| expires_in.as_secs()),
            interval = authorization.interval.map(|interval| interval.as_secs()),
            "device authorization started"
        );

        prompt
            .prompt(Verification::DeviceCode {
                verification_uri: authorization.verification_uri.clone(),
                user_code: authorization.user_code.clone(),
                verification_uri_complete: authorization.verification_uri_complete.clone(),
            })
            .await
            .map_err(AuthError::prompt)?;

        let heartbeat = Heartbeat::start(self.settings.progress_interval, progress);
        let deadline = Instant::now() + self.settings.auth_timeout;
        let result = time::timeout_at(deadline, self.poll(&authorization)).await;
        heartbeat.stop().await;

        result.unwrap_or_else(|_| Err(AuthError::TimedOut(self.settings.auth_timeout)))
    }

    async fn poll(&self, authorization: &DeviceAuthorization) -> Result<AccessToken, AuthError> {
        let mut interval = authorization
            .interval
            .unwrap_or(self.settings.default_poll_interval);
        let mut attempts = 0u32;

        loop {
            time::sleep(interval).await;
            attempts += 1;

            match self.client.poll_device_token(&authorization.device_code).await? {
                DevicePoll::Authorized(token) => {
                    debug!(attempts, "device authorization granted");
                    return Ok(token);
                }
                DevicePoll::Pending => debug!(attempts, "authorization pending"),
                DevicePoll::SlowDown => {
                    interval = next_interval(interval, self.settings.slow_down_step);
                    debug!(
                        attempts,
                        interval_ms = duration_ms(interval),
                        "provider asked to slow down"
                    );
                }
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
