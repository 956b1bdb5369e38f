//! Lighthouse profile configuration.

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};

/// A Lighthouse profile configuration.
///
/// Profiles store the account a set of credentials belongs to.
/// API tokens are stored separately in the OS keychain for security.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// The name of this profile.
    ///
    /// Must be non-empty and unique across all profiles.
    pub name: String,

    /// The Lighthouse account, the `acme` in `acme.lighthouseapp.com`.
    pub account: String,

    /// Email address for password authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Send the token as the Basic Auth user name instead of the
    /// `X-LighthouseToken` header.
    #[serde(default)]
    pub token_as_basic_auth: bool,
}

impl Profile {
    /// Create a new profile.
    pub fn new(name: String, account: String, email: Option<String>) -> Self {
        Self {
            name,
            account,
            email,
            token_as_basic_auth: false,
        }
    }

    /// Validate this profile.
    ///
    /// Checks that:
    /// - The name is non-empty and has no whitespace
    /// - The account is a bare subdomain
    /// - The email, when present, looks like an address
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError::ValidationError` with details if validation fails.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "profile name cannot be empty".to_string(),
            ));
        }

        if self.name.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "profile name '{}' cannot contain whitespace",
                self.name
            )));
        }

        if self.account.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': account cannot be empty",
                self.name
            )));
        }

        if !self
            .account
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': account '{}' must be the subdomain only (e.g. 'acme')",
                self.name, self.account
            )));
        }

        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(ConfigError::ValidationError(format!(
                    "profile '{}': '{}' does not appear to be a valid email address",
                    self.name, email
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work() -> Profile {
        Profile::new(
            "work".to_string(),
            "acme".to_string(),
            Some("user@acme.com".to_string()),
        )
    }

    #[test]
    fn test_valid_profile() {
        assert!(work().validate().is_ok());
        assert!(Profile::new("oss".into(), "my-team".into(), None).validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let profile = Profile { name: String::new(), ..work() };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("name cannot be empty"));
    }

    #[test]
    fn test_whitespace_name_rejected() {
        let profile = Profile { name: "my work".to_string(), ..work() };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("cannot contain whitespace"));
    }

    #[test]
    fn test_empty_account_rejected() {
        let profile = Profile { account: String::new(), ..work() };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("account cannot be empty"));
    }

    #[test]
    fn test_full_host_as_account_rejected() {
        let profile = Profile { account: "acme.lighthouseapp.com".to_string(), ..work() };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("subdomain only"));
    }

    #[test]
    fn test_invalid_email_rejected() {
        let profile = Profile { email: Some("not-an-email".to_string()), ..work() };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("valid email"));
    }

    #[test]
    fn test_profile_serialization() {
        let profile = work();
        let toml_str = toml::to_string(&profile).unwrap();
        let parsed: Profile = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, profile);

        let bare: Profile = toml::from_str("name = \"x\"\naccount = \"y\"").unwrap();
        assert_eq!(bare.email, None);
        assert!(!bare.token_as_basic_auth);
    }
}
