//! Cleaned up STS API, as served by RadosGW.

use std::{error::Error as StdError, fmt};

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::assume_role_with_web_identity::AssumeRoleWithWebIdentityOutput,
};
use aws_smithy_types::retry::RetryConfig;
use chrono::{TimeZone, Utc};
use tracing::debug;

use crate::{
    transport::{self, Failure, ReqwestConnector},
    validate_session_label, AccessToken, AssumeRoleError, AssumedCredentials, SessionDuration,
    ValidationError,
};

// RadosGW ignores the region, but the SDK requires one to sign and route requests.
const PLACEHOLDER_REGION: &str = "us-east-1";

/// Exchanges identity tokens for temporary credentials with `AssumeRoleWithWebIdentity`.
///
/// Requests are anonymous: the endpoint authenticates the caller by the web identity token alone.
/// Retries are disabled so that every failure is reported as it happened.
pub struct StsClient {
    inner: aws_sdk_sts::Client,
    endpoint: String,
}

impl StsClient {
    /// Create a client for `endpoint` (e.g. `https://rgw.example.com`).
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be initialised.
    pub fn new(endpoint: impl Into<String>, tls_verify: bool) -> Result<Self, reqwest::Error> {
        Ok(Self::with_http_client(
            endpoint,
            transport::http_client(tls_verify)?,
        ))
    }

    /// Create a client for `endpoint` that sends requests with `http`.
    pub fn with_http_client(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        let endpoint = endpoint.into();
        let sdk_config = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(PLACEHOLDER_REGION))
            .endpoint_url(endpoint.clone())
            .retry_config(RetryConfig::disabled())
            .http_client(ReqwestConnector::new(http))
            .build();

        Self {
            inner: aws_sdk_sts::Client::new(&sdk_config),
            endpoint,
        }
    }

    /// The endpoint requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Assume `role_arn` with `token`, naming the session `session_label`.
    ///
    /// The label, role ARN and token are checked before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`AssumeRoleError::Validation`] for bad input, otherwise a translated rejection,
    /// transport or response error.
    pub async fn assume(
        &self,
        role_arn: &str,
        token: &AccessToken,
        session_label: &str,
        duration: SessionDuration,
    ) -> Result<AssumedCredentials, AssumeRoleError> {
        validate_session_label(session_label)?;
        if role_arn.trim().is_empty() {
            return Err(ValidationError::EmptyRoleArn.into());
        }
        if token.secret().is_empty() {
            return Err(ValidationError::EmptyToken.into());
        }

        debug!(
            endpoint = %self.endpoint,
            role_arn,
            session_label,
            duration = %duration,
            "assuming role with web identity"
        );

        let output = self
            .inner
            .assume_role_with_web_identity()
            .role_arn(role_arn)
            .role_session_name(session_label)
            .web_identity_token(token.secret())
            .duration_seconds(i32::try_from(duration.as_secs()).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|error| self.translate_error(error, role_arn))?;

        self.credentials(&output, session_label)
    }

    fn credentials(
        &self,
        output: &AssumeRoleWithWebIdentityOutput,
        session_label: &str,
    ) -> Result<AssumedCredentials, AssumeRoleError> {
        macro_rules! invalid_res {
            ($msg:literal) => {
                AssumeRoleError::MalformedResponse(
                    concat!("invalid AssumeRoleWithWebIdentity response: ", $msg).to_string(),
                )
            };
        }

        let credentials = output
            .credentials()
            .ok_or_else(|| invalid_res!("missing Credentials"))?;
        let non_empty = |value: &str| Some(value.to_string()).filter(|value| !value.is_empty());
        let expiration = credentials.expiration();

        Ok(AssumedCredentials {
            access_key_id: non_empty(credentials.access_key_id())
                .ok_or_else(|| invalid_res!("missing AccessKeyId"))?,
            secret_access_key: non_empty(credentials.secret_access_key())
                .ok_or_else(|| invalid_res!("missing SecretAccessKey"))?,
            session_token: non_empty(credentials.session_token())
                .ok_or_else(|| invalid_res!("missing SessionToken"))?,
            expiration: Utc
                .timestamp_opt(expiration.secs(), expiration.subsec_nanos())
                .single()
                .ok_or_else(|| invalid_res!("Expiration is out of range"))?,
            assumed_principal_arn: output
                .assumed_role_user()
                .and_then(|user| non_empty(user.arn())),
            endpoint: self.endpoint.clone(),
            session_label: session_label.to_string(),
        })
    }

    fn translate_error<E, R>(&self, error: SdkError<E, R>, role_arn: &str) -> AssumeRoleError
    where
        E: ProvideErrorMetadata + StdError + 'static,
        R: fmt::Debug + 'static,
    {
        match &error {
            SdkError::ServiceError(context) => {
                let code = context.err().code().unwrap_or("Unknown");
                AssumeRoleError::Rejected {
                    code: code.to_string(),
                    message: service_error_message(code, context.err().message(), role_arn),
                }
            }
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
                let failure = match &error {
                    SdkError::TimeoutError(_) => Failure::Timeout,
                    _ => transport::classify(&error),
                };
                AssumeRoleError::Transport(
                    transport::describe(failure, "STS", &self.endpoint)
                        .unwrap_or_else(|| self.fallback_message(&error, role_arn)),
                )
            }
            SdkError::ResponseError(_) => AssumeRoleError::MalformedResponse(format!(
                "unreadable response from '{}': {}",
                self.endpoint,
                DisplayErrorContext(&error)
            )),
            _ => AssumeRoleError::Transport(self.fallback_message(&error, role_arn)),
        }
    }

    fn fallback_message(&self, error: &(dyn StdError + 'static), role_arn: &str) -> String {
        format!(
            "failed to assume role '{role_arn}' via endpoint '{}': {}",
            self.endpoint,
            DisplayErrorContext(error)
        )
    }
}

impl fmt::Debug for StsClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StsClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// The message for an error code returned by the role-assumption endpoint.
fn service_error_message(code: &str, message: Option<&str>, role_arn: &str) -> String {
    match code {
        "AccessDenied" => format!(
            "access denied: cannot assume role '{role_arn}' - common causes: OIDC token expired, \
             token claims don't match role trust policy, or identity provider not authorized for \
             this role"
        ),
        "InvalidIdentityToken" => "invalid identity token: the OIDC token is malformed or cannot \
                                   be validated - ensure the token is properly formatted and the \
                                   OIDC provider is correctly configured in RadosGW"
            .to_string(),
        "ExpiredToken" | "ExpiredTokenException" => {
            "expired token: the OIDC token has expired - authenticate again to obtain a fresh token"
                .to_string()
        }
        "IDPRejectedClaim" => format!(
            "claim rejected: the identity provider token carries a claim that role '{role_arn}' \
             does not accept - check the role trust policy conditions"
        ),
        "PackedPolicyTooLarge" => {
            "policy too large: the session policy exceeds the maximum allowed size".to_string()
        }
        "MalformedPolicyDocument" => format!(
            "malformed policy: the role '{role_arn}' has an invalid trust policy document"
        ),
        "IDPCommunicationError" => "IDP communication error: RadosGW could not communicate with \
                                    the identity provider - check network connectivity and OIDC \
                                    provider URL configuration"
            .to_string(),
        _ => match message.filter(|message| !message.is_empty()) {
            Some(message) => format!("STS error [{code}]: {message}"),
            None => format!("STS error [{code}]: assume role failed for '{role_arn}'"),
        },
    }
}
