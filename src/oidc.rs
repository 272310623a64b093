//! Cleaned up OIDC provider API.
//!
//! Covers the three endpoints the flows need under `{provider}/protocol/openid-connect/`:
//! `auth/device`, `auth` and `token`.

use std::{fmt, time::Duration};

use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::{
    provider_error::TranslateContext,
    secret::{CsrfState, PkceChallenge},
    transport, AuthError, ProviderRejection,
};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";

/// An OIDC identity provider and the client registered with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OidcProvider {
    url: String,
    client_id: String,
    scope: String,
}

impl OidcProvider {
    /// Describe a provider by its base URL (e.g. `https://idp.example.com/realms/ceph`).
    pub fn new(
        url: impl Into<String>,
        client_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            scope: scope.into(),
        }
    }

    /// The provider base URL, without a trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The OIDC client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The requested scope.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/protocol/openid-connect/{path}", self.url)
    }

    pub(crate) fn translate_context(&self) -> TranslateContext<'_> {
        TranslateContext {
            provider_url: &self.url,
            client_id: &self.client_id,
            scope: &self.scope,
        }
    }
}

/// A bearer identity token.
///
/// The token is not printed in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token obtained elsewhere.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"<redacted>").finish()
    }
}

pub(crate) struct Client {
    http: reqwest::Client,
    provider: OidcProvider,
}

impl Client {
    pub(crate) fn new(http: reqwest::Client, provider: OidcProvider) -> Self {
        Self { http, provider }
    }

    pub(crate) fn provider(&self) -> &OidcProvider {
        &self.provider
    }

    pub(crate) async fn start_device_authorization(&self) -> Result<DeviceAuthorization, AuthError> {
        let endpoint = self.provider.endpoint("auth/device");
        let (status, body) = self
            .post_form(
                &endpoint,
                &[
                    ("client_id", self.provider.client_id.as_str()),
                    ("scope", self.provider.scope.as_str()),
                ],
            )
            .await?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<TokenResponse>(&body) {
                Ok(TokenResponse {
                    error: Some(code),
                    error_description,
                    ..
                }) if !code.is_empty() => self.rejection(code, error_description).into(),
                _ => status_error(endpoint, status, &body),
            });
        }

        serde_json::from_slice::<DeviceAuthorizationResponse>(&body)
            .map_err(|error| {
                AuthError::MalformedResponse(format!(
                    "failed to parse device authorization response: {error}"
                ))
            })?
            .try_into()
            .map_err(AuthError::MalformedResponse)
    }

    pub(crate) async fn poll_device_token(&self, device_code: &str) -> Result<DevicePoll, AuthError> {
        let outcome = self
            .request_token(&[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", self.provider.client_id.as_str()),
                ("device_code", device_code),
            ])
            .await?;

        match outcome {
            TokenOutcome::Granted(token) => Ok(DevicePoll::Authorized(token)),
            TokenOutcome::Rejected { code, .. } if code == "authorization_pending" => {
                Ok(DevicePoll::Pending)
            }
            TokenOutcome::Rejected { code, .. } if code == "slow_down" => Ok(DevicePoll::SlowDown),
            TokenOutcome::Rejected { code, description } => {
                Err(self.rejection(code, description).into())
            }
        }
    }

    pub(crate) fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &CsrfState,
        pkce: &PkceChallenge,
    ) -> Result<Url, AuthError> {
        let mut url =
            Url::parse(&self.provider.endpoint("auth")).map_err(|source| {
                AuthError::InvalidProviderUrl {
                    url: self.provider.url.clone(),
                    source,
                }
            })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.provider.scope)
            .append_pair("state", state.as_str())
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", PkceChallenge::METHOD);
        Ok(url)
    }

    pub(crate) async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        pkce: &PkceChallenge,
    ) -> Result<AccessToken, AuthError> {
        let outcome = self
            .request_token(&[
                ("grant_type", AUTHORIZATION_CODE_GRANT),
                ("client_id", self.provider.client_id.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("code_verifier", pkce.verifier()),
            ])
            .await?;

        match outcome {
            TokenOutcome::Granted(token) => Ok(token),
            TokenOutcome::Rejected { code, description } => {
                Err(self.rejection(code, description).into())
            }
        }
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenOutcome, AuthError> {
        let endpoint = self.provider.endpoint("token");
        let (status, body) = self.post_form(&endpoint, form).await?;

        match serde_json::from_slice::<TokenResponse>(&body) {
            Ok(response) => response.into_outcome(status, || status_error(endpoint, status, &body)),
            Err(_) if !status.is_success() => Err(status_error(endpoint, status, &body)),
            Err(error) => Err(AuthError::MalformedResponse(format!(
                "failed to parse token response: {error}"
            ))),
        }
    }

    async fn post_form(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> Result<(StatusCode, Vec<u8>), AuthError> {
        let response = self
            .http
            .post(endpoint)
            .form(form)
            .send()
            .await
            .map_err(|error| transport_error(endpoint, &error))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| transport_error(endpoint, &error))?;
        debug!(endpoint, %status, "identity provider responded");
        Ok((status, body.to_vec()))
    }

    fn rejection(&self, code: String, description: Option<String>) -> ProviderRejection {
        ProviderRejection::new(code, description, &self.provider.translate_context())
    }
}

fn transport_error(endpoint: &str, error: &reqwest::Error) -> AuthError {
    let failure = transport::classify(error);
    AuthError::Transport(
        transport::describe(failure, "identity provider", endpoint)
            .unwrap_or_else(|| format!("request to '{endpoint}' failed: {error}")),
    )
}

fn status_error(endpoint: String, status: StatusCode, body: &[u8]) -> AuthError {
    AuthError::Status {
        endpoint,
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

/// One answer from the token endpoint while polling a device code.
#[derive(Debug)]
pub(crate) enum DevicePoll {
    Authorized(AccessToken),
    Pending,
    SlowDown,
}

/// The interval to use after a `slow_down`.
pub(crate) fn next_interval(current: Duration, step: Duration) -> Duration {
    current.saturating_add(step)
}

#[derive(Debug)]
enum TokenOutcome {
    Granted(AccessToken),
    Rejected {
        code: String,
        description: Option<String>,
    },
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_outcome(
        self,
        status: StatusCode,
        status_error: impl FnOnce() -> AuthError,
    ) -> Result<TokenOutcome, AuthError> {
        if let Some(code) = self.error.filter(|code| !code.is_empty()) {
            return Ok(TokenOutcome::Rejected {
                code,
                description: self.error_description,
            });
        }
        if !status.is_success() {
            return Err(status_error());
        }
        match self.access_token.filter(|token| !token.is_empty()) {
            Some(token) => {
                debug!(
                    token_type = self.token_type.as_deref().unwrap_or("unknown"),
                    expires_in = self.expires_in,
                    "received access token"
                );
                Ok(TokenOutcome::Granted(AccessToken(token)))
            }
            None => Err(AuthError::MissingAccessToken),
        }
    }
}

/// The provider's answer to a device authorization request.
#[derive(Debug)]
pub(crate) struct DeviceAuthorization {
    pub(crate) device_code: String,
    pub(crate) user_code: String,
    pub(crate) verification_uri: Url,
    pub(crate) verification_uri_complete: Option<Url>,
    pub(crate) expires_in: Option<Duration>,
    /// `None` when the provider gave no interval, or zero.
    pub(crate) interval: Option<Duration>,
}

#[derive(serde::Deserialize)]
struct DeviceAuthorizationResponse {
    device_code: Option<String>,
    user_code: Option<String>,
    verification_uri: Option<String>,
    verification_uri_complete: Option<String>,
    expires_in: Option<u64>,
    interval: Option<u64>,
}

impl TryFrom<DeviceAuthorizationResponse> for DeviceAuthorization {
    type Error = String;

    fn try_from(res: DeviceAuthorizationResponse) -> Result<Self, Self::Error> {
        macro_rules! invalid_res {
            ($msg:literal) => {
                concat!("invalid device authorization response: ", $msg)
            };
        }

        let non_empty = |value: Option<String>| value.filter(|value| !value.is_empty());

        Ok(Self {
            device_code: non_empty(res.device_code).ok_or(invalid_res!("missing device_code"))?,
            user_code: non_empty(res.user_code).ok_or(invalid_res!("missing user_code"))?,
            verification_uri: non_empty(res.verification_uri)
                .ok_or(invalid_res!("missing verification_uri"))?
                .parse()
                .map_err(|error| {
                    format!(
                        invalid_res!("verification_uri is not a valid URL ({})"),
                        error
                    )
                })?,
            verification_uri_complete: non_empty(res.verification_uri_complete)
                .map(|uri| uri.parse())
                .transpose()
                .map_err(|error| {
                    format!(
                        invalid_res!("verification_uri_complete is not a valid URL ({})"),
                        error
                    )
                })?,
            expires_in: res.expires_in.map(Duration::from_secs),
            interval: res
                .interval
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_response(json: &str) -> Result<DeviceAuthorization, String> {
        serde_json::from_str::<DeviceAuthorizationResponse>(json)
            .unwrap()
            .try_into()
    }

    fn outcome(status: u16, json: &str) -> Result<TokenOutcome, AuthError> {
        serde_json::from_str::<TokenResponse>(json)
            .unwrap()
            .into_outcome(StatusCode::from_u16(status).unwrap(), || {
                AuthError::Status {
                    endpoint: "token".to_string(),
                    status,
                    body: json.to_string(),
                }
            })
    }

    #[test]
    fn provider_endpoints_ignore_trailing_slash() {
        let provider = OidcProvider::new("https://idp.example.com/realms/ceph/", "rgw", "openid");
        assert_eq!(provider.url(), "https://idp.example.com/realms/ceph");
        assert_eq!(
            provider.endpoint("token"),
            "https://idp.example.com/realms/ceph/protocol/openid-connect/token"
        );
    }

    #[test]
    fn device_authorization_requires_codes_and_uri() {
        let ok = device_response(
            r#"{"device_code":"d1","user_code":"U1","verification_uri":"https://idp/device",
                "verification_uri_complete":"https://idp/device?user_code=U1",
                "expires_in":600,"interval":0}"#,
        )
        .unwrap();
        assert_eq!(ok.device_code, "d1");
        assert_eq!(ok.user_code, "U1");
        assert_eq!(ok.verification_uri.as_str(), "https://idp/device");
        assert!(ok.verification_uri_complete.is_some());
        assert_eq!(ok.expires_in, Some(Duration::from_secs(600)));
        assert_eq!(ok.interval, None);

        for (json, missing) in [
            (r#"{"user_code":"U1","verification_uri":"https://idp/device"}"#, "device_code"),
            (r#"{"device_code":"d1","user_code":"","verification_uri":"https://idp/device"}"#, "user_code"),
            (r#"{"device_code":"d1","user_code":"U1"}"#, "verification_uri"),
        ] {
            let error = device_response(json).unwrap_err();
            assert!(error.contains(&format!("missing {missing}")), "{error}");
        }

        let error = device_response(r#"{"device_code":"d","user_code":"u","verification_uri":"not a url"}"#)
            .unwrap_err();
        assert!(error.contains("not a valid URL"), "{error}");
    }

    #[test]
    fn token_response_outcomes() {
        assert!(matches!(
            outcome(200, r#"{"access_token":"tok","token_type":"Bearer","expires_in":300}"#),
            Ok(TokenOutcome::Granted(token)) if token.secret() == "tok"
        ));
        assert!(matches!(
            outcome(400, r#"{"error":"authorization_pending"}"#),
            Ok(TokenOutcome::Rejected { code, description: None }) if code == "authorization_pending"
        ));
        assert!(matches!(
            outcome(200, r#"{"error":"access_denied","error_description":"no"}"#),
            Ok(TokenOutcome::Rejected { code, .. }) if code == "access_denied"
        ));
        assert!(matches!(
            outcome(200, r#"{"access_token":""}"#),
            Err(AuthError::MissingAccessToken)
        ));
        assert!(matches!(
            outcome(200, r#"{}"#),
            Err(AuthError::MissingAccessToken)
        ));
        assert!(matches!(
            outcome(502, r#"{"access_token":"tok"}"#),
            Err(AuthError::Status { status: 502, .. })
        ));
    }

    #[test]
    fn slow_down_grows_interval() {
        let step = Duration::from_secs(5);
        let first = next_interval(Duration::from_secs(5), step);
        let second = next_interval(first, step);
        assert_eq!(first, Duration::from_secs(10));
        assert_eq!(second, Duration::from_secs(15));
    }

    #[test]
    fn access_token_debug_is_redacted() {
        let token = AccessToken::new("eyJhbGciOi.secret");
        assert!(!format!("{token:?}").contains("secret"));
        assert_eq!(token.secret(), "eyJhbGciOi.secret");
    }

    #[test]
    fn authorization_url_carries_pkce_and_state() {
        let client = Client::new(
            reqwest::Client::new(),
            OidcProvider::new("https://idp.example.com/realms/ceph", "rgw", "openid email"),
        );
        let state = CsrfState::generate().unwrap();
        let pkce = PkceChallenge::generate().unwrap();
        let url = client
            .authorization_url("http://localhost:8080/callback", &state, &pkce)
            .unwrap();

        assert_eq!(
            url.path(),
            "/realms/ceph/protocol/openid-connect/auth"
        );
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "rgw");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080/callback");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email");
        assert_eq!(pairs["state"], state.as_str());
        assert_eq!(pairs["code_challenge"], pkce.challenge());
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert!(!pairs.contains_key("code_verifier"));
    }
}
