//! Credential resolution: command-line flag, then environment, then the
//! selected profile and its keyring token.
//!
//! Flags and environment variables arrive merged in
//! [`CredentialOverrides`]; clap fills a field from its environment variable
//! when the flag is absent.

use tracing::debug;

use super::{Config, ConfigError, Profile, Result};
use crate::api::{self, Auth, LighthouseClient};

/// Credential values given on the command line or in the environment.
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    pub profile: Option<String>,
    pub account: Option<String>,
    pub token: Option<String>,
    /// Send the token as Basic Auth user name.
    pub token_basic: bool,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Fully resolved connection details.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub account: String,
    pub host: String,
    pub auth: Auth,
    /// The profile the values came from, if any.
    pub profile: Option<String>,
}

impl Credentials {
    /// Build an API client for these credentials.
    pub fn client(&self) -> api::Result<LighthouseClient> {
        LighthouseClient::with_host(&self.account, &self.host, self.auth.clone())
    }
}

/// Resolve credentials, reading profile tokens from the OS keyring.
pub fn resolve_credentials(config: &Config, overrides: &CredentialOverrides) -> Result<Credentials> {
    resolve_with(config, overrides, api::get_token)
}

fn resolve_with<F>(config: &Config, overrides: &CredentialOverrides, keyring: F) -> Result<Credentials>
where
    F: FnOnce(&str) -> api::Result<String>,
{
    let profile: Option<&Profile> = match &overrides.profile {
        Some(name) => Some(
            config
                .get_profile(name)
                .ok_or_else(|| ConfigError::ProfileNotFound(name.clone()))?,
        ),
        None => config.get_default_profile(),
    };

    let account = overrides
        .account
        .clone()
        .or_else(|| profile.map(|p| p.account.clone()))
        .filter(|a| !a.is_empty())
        .ok_or_else(|| {
            ConfigError::MissingCredentials(
                "no account given; pass --account, set LH_ACCOUNT or configure a profile".to_string(),
            )
        })?;

    let as_basic = overrides.token_basic || profile.is_some_and(|p| p.token_as_basic_auth);
    let email = overrides
        .email
        .clone()
        .or_else(|| profile.and_then(|p| p.email.clone()));

    let auth = if let Some(token) = overrides.token.as_deref().filter(|t| !t.is_empty()) {
        debug!("Using token from command line or environment");
        token_auth(token, as_basic)
    } else if let (Some(email), Some(password)) = (email.as_deref(), overrides.password.as_deref()) {
        debug!("Using email/password authentication");
        Auth::basic(email, password)
    } else if let Some(profile) = profile {
        debug!(profile = %profile.name, "Using token from keyring");
        let token = keyring(&profile.name).map_err(|e| {
            ConfigError::MissingCredentials(format!(
                "no token for profile '{}' ({}); run 'lh login'",
                profile.name, e
            ))
        })?;
        token_auth(&token, as_basic)
    } else {
        return Err(ConfigError::MissingCredentials(
            "no token given; pass --token, set LH_TOKEN or run 'lh login'".to_string(),
        ));
    };

    Ok(Credentials {
        account,
        host: config.settings.host.clone(),
        auth,
        profile: profile.map(|p| p.name.clone()),
    })
}

fn token_auth(token: &str, as_basic: bool) -> Auth {
    if as_basic {
        Auth::token_basic(token)
    } else {
        Auth::token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;

    fn config() -> Config {
        let mut config = Config::default();
        config.upsert_profile(Profile::new("work".into(), "acme".into(), Some("dev@acme.com".into())));
        let mut oss = Profile::new("oss".into(), "rails".into(), None);
        oss.token_as_basic_auth = true;
        config.upsert_profile(oss);
        config
    }

    fn no_keyring(_: &str) -> api::Result<String> {
        Err(ApiError::Keyring("no entry".into()))
    }

    #[test]
    fn test_flag_token_wins_over_keyring() {
        let overrides = CredentialOverrides {
            token: Some("flag".into()),
            ..Default::default()
        };
        let creds = resolve_with(&config(), &overrides, |_| panic!("keyring must not be read")).unwrap();
        assert_eq!(creds.account, "acme");
        assert!(matches!(creds.auth, Auth::Token(ref t) if t == "flag"));
        assert_eq!(creds.profile.as_deref(), Some("work"));
    }

    #[test]
    fn test_keyring_used_for_selected_profile() {
        let overrides = CredentialOverrides {
            profile: Some("oss".into()),
            ..Default::default()
        };
        let creds = resolve_with(&config(), &overrides, |name| {
            assert_eq!(name, "oss");
            Ok("stored".into())
        })
        .unwrap();
        assert_eq!(creds.account, "rails");
        assert!(matches!(creds.auth, Auth::TokenBasic(_)));
    }

    #[test]
    fn test_email_password_with_profile_email() {
        let overrides = CredentialOverrides {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let creds = resolve_with(&config(), &overrides, no_keyring).unwrap();
        assert_eq!(creds.auth.email(), Some("dev@acme.com"));
    }

    #[test]
    fn test_missing_account() {
        let overrides = CredentialOverrides {
            token: Some("t".into()),
            ..Default::default()
        };
        let err = resolve_with(&Config::default(), &overrides, no_keyring).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials(_)));
    }

    #[test]
    fn test_missing_keyring_token() {
        let err = resolve_with(&config(), &CredentialOverrides::default(), no_keyring).unwrap_err();
        assert!(err.to_string().contains("lh login"));
    }

    #[test]
    fn test_unknown_profile() {
        let overrides = CredentialOverrides {
            profile: Some("ghost".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_with(&config(), &overrides, no_keyring),
            Err(ConfigError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_client_targets_account_host() {
        let overrides = CredentialOverrides {
            account: Some("beta".into()),
            token: Some("t".into()),
            ..Default::default()
        };
        let creds = resolve_with(&Config::default(), &overrides, no_keyring).unwrap();
        assert_eq!(creds.client().unwrap().base_url(), "https://beta.lighthouseapp.com");
    }
}
