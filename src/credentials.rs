use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// Temporary credentials returned by the role-assumption endpoint.
///
/// The fields of this struct are obviously pretty sensitive, and should be handled with care.
/// The secret and session token are not printed in `Debug` output.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, PartialEq, Eq)]
pub struct AssumedCredentials {
    /// The access key ID.
    pub access_key_id: String,

    /// The secret access key.
    pub secret_access_key: String,

    /// The session token.
    pub session_token: String,

    /// When the credentials expire.
    pub expiration: DateTime<Utc>,

    /// The ARN of the assumed role session, if the endpoint returned one.
    pub assumed_principal_arn: Option<String>,

    /// The endpoint the credentials are valid for.
    pub endpoint: String,

    /// The role session name the credentials were issued under.
    pub session_label: String,
}

impl AssumedCredentials {
    /// The expiration as RFC 3339 with second precision, e.g. `2024-05-01T12:00:00Z`.
    #[must_use]
    pub fn expiration_rfc3339(&self) -> String {
        self.expiration.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Shell `export` statements for these credentials, one per line.
    ///
    /// `AWS_PROFILE` is only exported when `profile` is given.
    #[must_use]
    pub fn shell_exports<'a>(&'a self, profile: Option<&'a str>) -> ShellExports<'a> {
        ShellExports {
            credentials: self,
            profile,
        }
    }
}

impl fmt::Debug for AssumedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AssumedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .field("assumed_principal_arn", &self.assumed_principal_arn)
            .field("endpoint", &self.endpoint)
            .field("session_label", &self.session_label)
            .finish_non_exhaustive()
    }
}

/// Display adapter returned by [`AssumedCredentials::shell_exports`].
pub struct ShellExports<'a> {
    credentials: &'a AssumedCredentials,
    profile: Option<&'a str>,
}

impl fmt::Display for ShellExports<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let credentials = self.credentials;
        let expiration = credentials.expiration_rfc3339();

        writeln!(f, "export AWS_ACCESS_KEY_ID={}", credentials.access_key_id)?;
        writeln!(f, "export AWS_SECRET_ACCESS_KEY={}", credentials.secret_access_key)?;
        writeln!(f, "export AWS_SESSION_TOKEN='{}'", credentials.session_token)?;
        if let Some(profile) = self.profile {
            writeln!(f, "export AWS_PROFILE={profile}")?;
        }
        writeln!(f, "export AWS_CREDENTIAL_EXPIRATION={expiration}")?;
        writeln!(f, "export AWS_SESSION_EXPIRATION={expiration}")
    }
}
