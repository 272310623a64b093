//! Translation of OAuth 2.0 / OIDC error codes into guidance an operator can act on.

use std::fmt;

/// What the translator may mention about the failing request.
#[derive(Debug, Clone, Copy)]
pub struct TranslateContext<'a> {
    /// The identity provider base URL.
    pub provider_url: &'a str,
    /// The OIDC client ID that was presented.
    pub client_id: &'a str,
    /// The requested scope.
    pub scope: &'a str,
}

const NO_DESCRIPTION: &str = "no description provided by the identity provider";

/// Turn a provider `error` code and optional `error_description` into a diagnostic message.
///
/// Known codes produce a message naming the likely cause and the relevant configuration; the
/// provider's description, when present, is appended verbatim. Unknown codes render as
/// `authentication error [<code>]: <description>`.
#[must_use]
pub fn translate(code: &str, description: Option<&str>, context: &TranslateContext<'_>) -> String {
    let TranslateContext {
        provider_url,
        client_id,
        scope,
    } = *context;
    let description = description.filter(|desc| !desc.trim().is_empty());

    let guidance = match code {
        "invalid_request" => format!(
            "invalid request: the identity provider at '{provider_url}' rejected the request as \
             malformed or missing a required parameter"
        ),
        "invalid_client" => format!(
            "invalid client: client ID '{client_id}' is not recognized by '{provider_url}' - \
             check radosgw_oidc_client_id"
        ),
        "invalid_grant" => "invalid grant: the authorization code or device code is invalid or \
                            expired - start the authentication again"
            .to_string(),
        "unauthorized_client" => format!(
            "unauthorized client: client '{client_id}' is not permitted to use this grant type - \
             enable it for the client at '{provider_url}'"
        ),
        "unsupported_grant_type" => format!(
            "unsupported grant type: the identity provider at '{provider_url}' does not support \
             this flow - try a different radosgw_oidc_auth_type"
        ),
        "invalid_scope" => format!(
            "invalid scope: scope '{scope}' is unknown or not allowed for client '{client_id}' - \
             check radosgw_oidc_scope"
        ),
        "access_denied" => "access denied: the user or the identity provider denied the \
                            authorization request"
            .to_string(),
        "expired_token" => "expired token: the device code expired before authorization \
                            completed - start the authentication again"
            .to_string(),
        "server_error" => format!(
            "server error: the identity provider at '{provider_url}' encountered an internal error \
             - try again later"
        ),
        "temporarily_unavailable" => format!(
            "temporarily unavailable: the identity provider at '{provider_url}' is overloaded or \
             under maintenance - try again later"
        ),
        _ => {
            return format!(
                "authentication error [{code}]: {}",
                description.unwrap_or(NO_DESCRIPTION)
            )
        }
    };

    match description {
        Some(description) => format!("{guidance} ({description})"),
        None => guidance,
    }
}

/// An explicit error returned by the identity provider.
///
/// The `Display` output is the translated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRejection {
    /// The raw `error` code.
    pub code: String,
    /// The raw `error_description`, if any.
    pub description: Option<String>,
    message: String,
}

impl ProviderRejection {
    /// Translate `code` and `description` within `context`.
    #[must_use]
    pub fn new(code: String, description: Option<String>, context: &TranslateContext<'_>) -> Self {
        let message = translate(&code, description.as_deref(), context);
        Self {
            code,
            description,
            message,
        }
    }

    /// The translated message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderRejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderRejection {}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const CONTEXT: TranslateContext<'static> = TranslateContext {
        provider_url: "https://idp.example.com/realms/ceph",
        client_id: "radosgw",
        scope: "openid profile",
    };

    #[test]
    fn every_known_code_has_a_distinct_keyword_message() {
        let cases = [
            ("invalid_request", "malformed"),
            ("invalid_client", "not recognized"),
            ("invalid_grant", "invalid or expired"),
            ("unauthorized_client", "not permitted"),
            ("unsupported_grant_type", "does not support"),
            ("invalid_scope", "openid profile"),
            ("access_denied", "denied"),
            ("expired_token", "expired before"),
            ("server_error", "internal error"),
            ("temporarily_unavailable", "try again later"),
        ];

        let mut seen = HashSet::new();
        for (code, keyword) in cases {
            let message = translate(code, None, &CONTEXT);
            assert!(message.contains(keyword), "{code}: {message}");
            assert!(!message.contains("authentication error ["), "{code}: {message}");
            assert!(seen.insert(message), "{code} message is not distinct");
        }
    }

    #[test]
    fn known_codes_reference_context() {
        assert!(translate("invalid_client", None, &CONTEXT).contains("'radosgw'"));
        assert!(translate("server_error", None, &CONTEXT).contains(CONTEXT.provider_url));
    }

    #[test]
    fn known_codes_append_description() {
        let message = translate("access_denied", Some("User said no"), &CONTEXT);
        assert!(message.ends_with("(User said no)"), "{message}");
    }

    #[test]
    fn unknown_code_keeps_description_verbatim() {
        assert_eq!(
            translate("custom_error", Some("Something odd happened"), &CONTEXT),
            "authentication error [custom_error]: Something odd happened"
        );
    }

    #[test]
    fn description_whitespace_is_preserved() {
        assert_eq!(
            translate("custom_error", Some("  padded detail\n"), &CONTEXT),
            "authentication error [custom_error]:   padded detail\n"
        );
        assert!(translate("access_denied", Some(" no "), &CONTEXT).ends_with("( no )"));
    }

    #[test]
    fn unknown_code_without_description_falls_back() {
        for description in [None, Some(""), Some("   ")] {
            assert_eq!(
                translate("weird", description, &CONTEXT),
                "authentication error [weird]: no description provided by the identity provider"
            );
        }
    }

    #[test]
    fn rejection_displays_translation() {
        let rejection = ProviderRejection::new(
            "invalid_grant".to_string(),
            Some("Code not valid".to_string()),
            &CONTEXT,
        );
        assert_eq!(rejection.code, "invalid_grant");
        assert_eq!(rejection.to_string(), rejection.message());
        assert!(rejection.to_string().contains("Code not valid"));
    }
}
