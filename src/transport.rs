//! HTTP plumbing shared by the identity provider and role-assumption clients.
//!
//! Both clients run on one `reqwest` stack so a single TLS switch governs every request. The
//! role-assumption SDK reaches it through [`ReqwestConnector`].

use std::{error::Error as StdError, io};

use aws_smithy_runtime_api::client::{
    http::{
        HttpClient, HttpConnector, HttpConnectorFuture, HttpConnectorSettings, SharedHttpConnector,
    },
    orchestrator::{HttpRequest, HttpResponse},
    result::ConnectorError,
    runtime_components::RuntimeComponents,
};
use aws_smithy_runtime_api::http::StatusCode;
use aws_smithy_types::body::SdkBody;
use tracing::warn;

use crate::USER_AGENT;

/// Build the HTTP client used for all outbound requests.
///
/// Certificate verification is only disabled when `tls_verify` is explicitly `false`.
///
/// # Errors
///
/// Fails if the TLS backend cannot be initialised.
pub fn http_client(tls_verify: bool) -> Result<reqwest::Client, reqwest::Error> {
    if !tls_verify {
        warn!("TLS certificate verification is disabled");
    }
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(!tls_verify)
        .build()
}

/// Serves the AWS SDK's HTTP layer with a `reqwest` client.
#[derive(Debug, Clone)]
pub(crate) struct ReqwestConnector {
    client: reqwest::Client,
}

impl ReqwestConnector {
    pub(crate) fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(client: reqwest::Client, request: HttpRequest) -> Result<HttpResponse, ConnectorError> {
        let method = reqwest::Method::from_bytes(request.method().as_bytes())
            .map_err(|error| ConnectorError::other(error.into(), None))?;
        let mut builder = client.request(method, request.uri());
        for (name, value) in request.headers().iter() {
            if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name, value);
        }
        let body = request.body().bytes().ok_or_else(|| {
            ConnectorError::other("streaming request bodies are not supported".into(), None)
        })?;

        let response = builder
            .body(body.to_vec())
            .send()
            .await
            .map_err(connector_error)?;

        let status = StatusCode::try_from(response.status().as_u16())
            .map_err(|error| ConnectorError::other(error.into(), None))?;
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let bytes = response.bytes().await.map_err(connector_error)?;

        let mut converted = HttpResponse::new(status, SdkBody::from(bytes));
        for (name, value) in headers {
            converted
                .headers_mut()
                .try_append(name, value)
                .map_err(|error| ConnectorError::other(error.into(), None))?;
        }
        Ok(converted)
    }
}

fn connector_error(error: reqwest::Error) -> ConnectorError {
    if error.is_timeout() {
        ConnectorError::timeout(error.into())
    } else if error.is_connect() {
        ConnectorError::io(error.into())
    } else {
        ConnectorError::other(error.into(), None)
    }
}

impl HttpConnector for ReqwestConnector {
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
        HttpConnectorFuture::new(Self::send(self.client.clone(), request))
    }
}

impl HttpClient for ReqwestConnector {
    fn http_connector(
        &self,
        _: &HttpConnectorSettings,
        _: &RuntimeComponents,
    ) -> SharedHttpConnector {
        SharedHttpConnector::new(self.clone())
    }
}

/// The transport failures that get a specific message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    ConnectionRefused,
    UnknownHost,
    Certificate,
    Timeout,
    Other,
}

/// Classify a transport error by walking its source chain.
///
/// Typed predicates from `reqwest` and `io::ErrorKind` are consulted first; the lowercased text
/// of the chain is only matched when none of them are conclusive.
pub(crate) fn classify(error: &(dyn StdError + 'static)) -> Failure {
    let mut text = String::new();
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(error) = error.downcast_ref::<reqwest::Error>() {
            if error.is_timeout() {
                return Failure::Timeout;
            }
        }
        if let Some(error) = error.downcast_ref::<io::Error>() {
            match error.kind() {
                io::ErrorKind::ConnectionRefused => return Failure::ConnectionRefused,
                io::ErrorKind::TimedOut => return Failure::Timeout,
                _ => {}
            }
        }
        text.push_str(&error.to_string().to_lowercase());
        text.push('\n');
        current = error.source();
    }

    let contains_any = |needles: &[&str]| needles.iter().any(|needle| text.contains(needle));
    if contains_any(&["connection refused"]) {
        Failure::ConnectionRefused
    } else if contains_any(&[
        "no such host",
        "dns error",
        "failed to lookup address",
        "name or service not known",
    ]) {
        Failure::UnknownHost
    } else if contains_any(&["certificate", "x509"]) {
        Failure::Certificate
    } else if contains_any(&["timeout", "timed out", "deadline exceeded"]) {
        Failure::Timeout
    } else {
        Failure::Other
    }
}

/// The actionable message for `failure` against `endpoint`, if there is one.
pub(crate) fn describe(failure: Failure, service: &str, endpoint: &str) -> Option<String> {
    let message = match failure {
        Failure::ConnectionRefused => format!(
            "connection refused: cannot connect to {service} endpoint '{endpoint}' - verify the \
             endpoint URL is correct and the service is running"
        ),
        Failure::UnknownHost => format!(
            "unknown host: cannot resolve {service} endpoint '{endpoint}' - check the endpoint URL \
             for typos"
        ),
        Failure::Certificate => format!(
            "TLS certificate error: cannot verify certificate for '{endpoint}' - use \
             radosgw_ssl_verify=false if using self-signed certificates"
        ),
        Failure::Timeout => format!(
            "connection timeout: {service} endpoint '{endpoint}' did not respond in time - check \
             network connectivity"
        ),
        Failure::Other => return None,
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct Wrapped {
        message: &'static str,
        source: Option<io::Error>,
    }

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.source
                .as_ref()
                .map(|error| error as &(dyn StdError + 'static))
        }
    }

    fn wrapped(message: &'static str, source: Option<io::Error>) -> Wrapped {
        Wrapped { message, source }
    }

    #[test]
    fn io_kinds_win_over_text() {
        let error = wrapped(
            "certificate lookalike",
            Some(io::Error::from(io::ErrorKind::ConnectionRefused)),
        );
        assert_eq!(classify(&error), Failure::ConnectionRefused);

        let error = wrapped("error sending request", Some(io::ErrorKind::TimedOut.into()));
        assert_eq!(classify(&error), Failure::Timeout);
    }

    #[test]
    fn falls_back_to_chain_text() {
        let cases = [
            ("dial tcp: lookup rgw.invalid: no such host", Failure::UnknownHost),
            ("dns error: failed to lookup address information", Failure::UnknownHost),
            ("invalid peer certificate: UnknownIssuer", Failure::Certificate),
            ("x509: certificate signed by unknown authority", Failure::Certificate),
            ("context deadline exceeded", Failure::Timeout),
            ("Connection Refused by peer", Failure::ConnectionRefused),
            ("something else entirely", Failure::Other),
        ];
        for (message, expected) in cases {
            assert_eq!(classify(&wrapped(message, None)), expected, "{message}");
        }
    }

    #[test]
    fn matches_text_deeper_in_the_chain() {
        let error = wrapped(
            "dispatch failure",
            Some(io::Error::other("tls handshake: invalid peer certificate")),
        );
        assert_eq!(classify(&error), Failure::Certificate);
    }

    #[test]
    fn describes_known_failures() {
        let endpoint = "https://rgw.example.com";
        assert!(describe(Failure::ConnectionRefused, "STS", endpoint)
            .unwrap()
            .starts_with("connection refused: cannot connect to STS endpoint"));
        assert!(describe(Failure::UnknownHost, "STS", endpoint)
            .unwrap()
            .contains("check the endpoint URL for typos"));
        assert!(describe(Failure::Certificate, "STS", endpoint)
            .unwrap()
            .contains("radosgw_ssl_verify=false"));
        assert!(describe(Failure::Timeout, "identity provider", endpoint)
            .unwrap()
            .contains("did not respond in time"));
        assert_eq!(describe(Failure::Other, "STS", endpoint), None);
    }
}
