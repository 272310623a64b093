use std::{
    collections::HashMap,
    env, io,
    path::{Path, PathBuf},
};

use futures::future::{BoxFuture, Ready};
use tokio::fs;
use tracing::debug;

use crate::{AccessToken, AssumeConfig, AuthConfig, ConfigError, ConfigSource, OidcProvider};

const AWS_CONFIG_FILE: &str = "AWS_CONFIG_FILE";
const AWS_CONFIG_FILE_DEFAULT: &[&str] = &[".aws", "config"];

const AWS_PROFILE: &str = "AWS_PROFILE";
const AWS_PROFILE_DEFAULT: &str = "default";

const RADOSGW_OIDC_TOKEN: &str = "RADOSGW_OIDC_TOKEN";

const DEFAULT_AUTH_TYPE: &str = "device";
const DEFAULT_SCOPE: &str = "openid";

/// Session label used for configuration taken from the environment.
pub const ENV_SESSION_LABEL: &str = "env";

/// A reference to a profile in AWS shared configuration.
///
/// The default profile source uses the `AWS_CONFIG_FILE` and `AWS_PROFILE` environment variables,
/// but this can be overridden with [`with_config_file`](Self::with_config_file) and
/// [`with_profile`](Self::with_profile). The profile name becomes the role session name.
///
/// Recognised keys are `endpoint_url`, `role_arn`, `radosgw_oidc_provider`,
/// `radosgw_oidc_client_id`, `radosgw_oidc_auth_type`, `radosgw_oidc_scope`,
/// `radosgw_oidc_token`, `radosgw_ssl_verify` and `source_profile`.
///
/// # Example
///
/// ```no_run
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::convert::Infallible;
///
/// use radosgw_assume::{AssumeFlow, ProfileSource};
///
/// let my_profile = ProfileSource::default()
///     .with_config_file(".myconfig")
///     .with_profile("storage-admin");
///
/// let flow = AssumeFlow::builder()
///     .config(my_profile)
///     .verification_prompt(|verification| async move {
///         eprintln!("{verification}");
///         Ok::<_, Infallible>(())
///     })
///     .build()
///     .await?;
/// # Ok(()) }
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Default)]
pub struct ProfileSource {
    config_file: Option<PathBuf>,
    profile: Option<String>,
}

impl ProfileSource {
    /// Set the location of the AWS shared config file.
    #[must_use]
    pub fn with_config_file(self, path: impl Into<PathBuf>) -> Self {
        Self {
            config_file: Some(path.into()),
            ..self
        }
    }

    /// Set the profile.
    #[must_use]
    pub fn with_profile(self, name: impl Into<String>) -> Self {
        Self {
            profile: Some(name.into()),
            ..self
        }
    }

    /// The profile that will be loaded: the one set with [`with_profile`](Self::with_profile),
    /// else `AWS_PROFILE`, else `default`.
    ///
    /// # Errors
    ///
    /// Fails if `AWS_PROFILE` is not valid UTF-8.
    pub fn profile_name(&self) -> Result<String, ConfigError> {
        self.profile.clone().map_or_else(get_profile_from_env, Ok)
    }
}

impl ConfigSource for ProfileSource {
    type Future = BoxFuture<'static, Result<AssumeConfig, Self::Error>>;

    type Error = ConfigError;

    fn load(self) -> Self::Future {
        Box::pin(async move {
            let profile = self.profile_name()?;
            let path = self.config_file.map_or_else(get_config_file_from_env, Ok)?;
            let env_token = read_env(RADOSGW_OIDC_TOKEN).map_err(|error| {
                ConfigError::new(format!(
                    "invalid token in environment variable {RADOSGW_OIDC_TOKEN}: {error}"
                ))
            })?;

            let profiles = parse_config(&read_config(&path).await?);
            resolve_profile(&profiles, &profile, &path)?.into_config(&profile, env_token)
        })
    }
}

/// List the profiles in `config_file` that are set up for RadosGW, in file order.
///
/// A profile qualifies when it has an `endpoint_url` and either `radosgw_oidc_provider` or
/// `role_arn`. When `config_file` is `None` it is located as for [`ProfileSource`].
///
/// # Errors
///
/// Fails if the config file cannot be located or read.
pub async fn list_profiles(config_file: Option<PathBuf>) -> Result<Vec<String>, ConfigError> {
    let path = config_file.map_or_else(get_config_file_from_env, Ok)?;
    Ok(radosgw_profiles(&parse_config(&read_config(&path).await?)))
}

/// Configuration from environment variables.
///
/// `AWS_ENDPOINT_URL` is always required. `RADOSGW_OIDC_PROVIDER` and `RADOSGW_OIDC_CLIENT_ID`
/// are required unless `RADOSGW_OIDC_AUTH_TYPE` is `token`, in which case `RADOSGW_OIDC_TOKEN`
/// is. `RADOSGW_OIDC_SCOPE`, `RADOSGW_SSL_VERIFY` and `RADOSGW_ROLE_ARN` are optional here, but
/// a role ARN is needed to assume a role. The session label is `env`.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    /// Capture the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Use the given variables instead of the process environment.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).filter(|value| !value.is_empty()).cloned()
    }

    fn resolve(&self) -> Result<AssumeConfig, ConfigError> {
        let endpoint_url = self.var("AWS_ENDPOINT_URL").ok_or_else(|| {
            ConfigError::new("AWS_ENDPOINT_URL environment variable is required")
        })?;
        let auth_type = self.var("RADOSGW_OIDC_AUTH_TYPE");

        if auth_type.as_deref() != Some("token") {
            if self.var("RADOSGW_OIDC_PROVIDER").is_none() {
                return Err(ConfigError::new(
                    "RADOSGW_OIDC_PROVIDER environment variable is required (not needed for \
                     auth_type=token)",
                ));
            }
            if self.var("RADOSGW_OIDC_CLIENT_ID").is_none() {
                return Err(ConfigError::new(
                    "RADOSGW_OIDC_CLIENT_ID environment variable is required (not needed for \
                     auth_type=token)",
                ));
            }
        }

        ProfileSettings {
            endpoint_url: Some(endpoint_url),
            role_arn: self.var("RADOSGW_ROLE_ARN"),
            oidc_provider: self.var("RADOSGW_OIDC_PROVIDER"),
            oidc_client_id: self.var("RADOSGW_OIDC_CLIENT_ID"),
            oidc_auth_type: auth_type,
            oidc_scope: self.var("RADOSGW_OIDC_SCOPE"),
            oidc_token: None,
            ssl_verify: self.var("RADOSGW_SSL_VERIFY"),
            source_profile: None,
        }
        .into_config(ENV_SESSION_LABEL, self.var(RADOSGW_OIDC_TOKEN))
    }
}

impl ConfigSource for EnvSource {
    type Future = Ready<Result<AssumeConfig, Self::Error>>;

    type Error = ConfigError;

    fn load(self) -> Self::Future {
        futures::future::ready(self.resolve())
    }
}

/// The RadosGW keys of one profile section. Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ProfileSettings {
    endpoint_url: Option<String>,
    role_arn: Option<String>,
    oidc_provider: Option<String>,
    oidc_client_id: Option<String>,
    oidc_auth_type: Option<String>,
    oidc_scope: Option<String>,
    oidc_token: Option<String>,
    ssl_verify: Option<String>,
    source_profile: Option<String>,
}

impl ProfileSettings {
    fn set(&mut self, key: &str, value: &str) {
        let slot = match key {
            "endpoint_url" => &mut self.endpoint_url,
            "role_arn" => &mut self.role_arn,
            "radosgw_oidc_provider" => &mut self.oidc_provider,
            "radosgw_oidc_client_id" => &mut self.oidc_client_id,
            "radosgw_oidc_auth_type" => &mut self.oidc_auth_type,
            "radosgw_oidc_scope" => &mut self.oidc_scope,
            "radosgw_oidc_token" => &mut self.oidc_token,
            "radosgw_ssl_verify" => &mut self.ssl_verify,
            "source_profile" => &mut self.source_profile,
            _ => return,
        };
        *slot = Some(value.to_string()).filter(|value| !value.is_empty());
    }

    fn is_radosgw(&self) -> bool {
        self.endpoint_url.is_some() && (self.oidc_provider.is_some() || self.role_arn.is_some())
    }

    /// Values from `self` win; anything missing comes from `base`.
    fn overlay(self, base: &Self) -> Self {
        Self {
            endpoint_url: self.endpoint_url.or_else(|| base.endpoint_url.clone()),
            role_arn: self.role_arn.or_else(|| base.role_arn.clone()),
            oidc_provider: self.oidc_provider.or_else(|| base.oidc_provider.clone()),
            oidc_client_id: self.oidc_client_id.or_else(|| base.oidc_client_id.clone()),
            oidc_auth_type: self.oidc_auth_type.or_else(|| base.oidc_auth_type.clone()),
            oidc_scope: self.oidc_scope.or_else(|| base.oidc_scope.clone()),
            oidc_token: self.oidc_token.or_else(|| base.oidc_token.clone()),
            ssl_verify: self.ssl_verify.or_else(|| base.ssl_verify.clone()),
            source_profile: None,
        }
    }

    fn into_config(
        self,
        session_label: &str,
        env_token: Option<String>,
    ) -> Result<AssumeConfig, ConfigError> {
        let endpoint_url = self.endpoint_url.ok_or_else(|| {
            ConfigError::new("missing required 'endpoint_url' in profile configuration")
        })?;
        let role_arn = self
            .role_arn
            .ok_or_else(|| ConfigError::new("no role_arn specified in profile configuration"))?;
        let tls_verify = self.ssl_verify.as_deref().map_or(true, parse_ssl_verify);
        let scope = self.oidc_scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string());

        let provider = || -> Result<OidcProvider, ConfigError> {
            let url = self.oidc_provider.clone().ok_or_else(|| {
                ConfigError::new(
                    "missing required field 'radosgw_oidc_provider' in profile configuration",
                )
            })?;
            let client_id = self.oidc_client_id.clone().ok_or_else(|| {
                ConfigError::new(
                    "missing required field 'radosgw_oidc_client_id' in profile configuration",
                )
            })?;
            Ok(OidcProvider::new(url, client_id, scope.clone()))
        };

        let auth = match self.oidc_auth_type.as_deref().unwrap_or(DEFAULT_AUTH_TYPE) {
            "device" => AuthConfig::Device(provider()?),
            "browser" => AuthConfig::Browser(provider()?),
            "token" => AuthConfig::Token(AccessToken::new(
                env_token.or(self.oidc_token.clone()).ok_or_else(|| {
                    ConfigError::new(
                        "RADOSGW_OIDC_TOKEN environment variable or radosgw_oidc_token is \
                         required for token auth type",
                    )
                })?,
            )),
            other => {
                return Err(ConfigError::new(format!(
                    "unsupported auth type: {other} (supported: device, browser, token)"
                )))
            }
        };

        Ok(AssumeConfig {
            endpoint_url,
            role_arn,
            auth,
            tls_verify,
            session_label: session_label.to_string(),
        })
    }
}

/// `false` and `0` (any case) disable verification; anything else enables it.
fn parse_ssl_verify(value: &str) -> bool {
    !(value.eq_ignore_ascii_case("false") || value == "0")
}

fn resolve_profile(
    profiles: &[(String, ProfileSettings)],
    name: &str,
    path: &Path,
) -> Result<ProfileSettings, ConfigError> {
    let settings = find_profile(profiles, name, path)?;
    match settings.source_profile.clone() {
        Some(source) if source != name => {
            debug!(profile = name, source_profile = %source, "resolving source profile");
            let base = find_profile(profiles, &source, path).map_err(|error| {
                ConfigError::new(format!(
                    "failed to resolve source profile '{source}': {error}"
                ))
            })?;
            Ok(settings.overlay(&base))
        }
        _ => Ok(settings),
    }
}

fn find_profile(
    profiles: &[(String, ProfileSettings)],
    name: &str,
    path: &Path,
) -> Result<ProfileSettings, ConfigError> {
    profiles
        .iter()
        .find(|(profile, _)| profile == name)
        .map(|(_, settings)| settings.clone())
        .ok_or_else(|| {
            let available = radosgw_profiles(profiles);
            ConfigError::new(format!(
                "profile '{name}' not found in config file {}. Available RadosGW profiles: {}",
                path.display(),
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            ))
        })
}

fn radosgw_profiles(profiles: &[(String, ProfileSettings)]) -> Vec<String> {
    profiles
        .iter()
        .filter(|(_, settings)| settings.is_radosgw())
        .map(|(name, _)| name.clone())
        .collect()
}

fn get_config_file_from_env() -> Result<PathBuf, ConfigError> {
    read_env(AWS_CONFIG_FILE)
        .map_err(|error| {
            ConfigError::new(format!(
                "invalid path in environment variable {AWS_CONFIG_FILE}: {error}",
            ))
        })?
        .map(PathBuf::from)
        .map_or_else(
            || {
                let mut path = dirs_next::home_dir()
                    .ok_or_else(|| ConfigError::new("could not determine home directory"))?;
                for segment in AWS_CONFIG_FILE_DEFAULT {
                    path.push(segment);
                }
                Ok(path)
            },
            Ok,
        )
}

fn get_profile_from_env() -> Result<String, ConfigError> {
    Ok(read_env(AWS_PROFILE)
        .map_err(|error| {
            ConfigError::new(format!(
                "invalid profile name in environment variable {AWS_PROFILE}: {error}",
            ))
        })?
        .unwrap_or_else(|| AWS_PROFILE_DEFAULT.to_string()))
}

fn read_env(name: &str) -> Result<Option<String>, String> {
    env::var(name)
        .map(|value| Some(value).filter(|value| !value.is_empty()))
        .or_else(|error| match error {
            env::VarError::NotPresent => Ok(None),
            env::VarError::NotUnicode(data) => Err(format!("{data:?} contains invalid UTF-8")),
        })
}

fn parse_profile_name(line: &str) -> Option<&str> {
    line.strip_prefix('[')
        .and_then(|line| line.strip_suffix(']'))
        .map(|name| {
            let name = name.trim();
            name.strip_prefix("profile ").map_or(name, str::trim)
        })
}

/// Parse every section of an AWS config file, in file order.
fn parse_config(config: &str) -> Vec<(String, ProfileSettings)> {
    let mut profiles: Vec<(String, ProfileSettings)> = Vec::new();

    for line in config.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = parse_profile_name(line) {
            profiles.push((name.to_string(), ProfileSettings::default()));
        } else if let Some((_, settings)) = profiles.last_mut() {
            if let Some((key, value)) = line.split_once('=') {
                settings.set(key.trim(), value.trim());
            }
        }
    }

    profiles
}

async fn read_config(path: &Path) -> Result<String, ConfigError> {
    read_file(path).await.map_err(|error| {
        ConfigError::new(format!(
            "unable to read config file {}: {error}",
            path.display()
        ))
    })
}

async fn read_file(path: &Path) -> Result<String, io::Error> {
    let meta = fs::metadata(path).await?;
    if !meta.is_file() {
        return Err(io::Error::other("not a file"));
    }
    fs::read_to_string(path).await
}
