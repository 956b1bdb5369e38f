//! Authentication handling for the Lighthouse API.
//!
//! Lighthouse accepts an API token either in the `X-LighthouseToken` header
//! or as the user name of HTTP Basic Auth (with the literal password `x`),
//! and plain email/password Basic Auth. Tokens can be kept in the OS keyring
//! per profile.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};

use super::error::{ApiError, Result};

/// The keyring service name for Lighthouse tokens.
const KEYRING_SERVICE: &str = "lighthouse";

/// Header carrying a Lighthouse API token.
pub const TOKEN_HEADER: &str = "X-LighthouseToken";

/// Password paired with a token when the token is sent as Basic Auth.
const TOKEN_BASIC_PASSWORD: &str = "x";

/// Authentication credentials for Lighthouse.
#[derive(Clone)]
pub enum Auth {
    /// Token sent in the `X-LighthouseToken` header.
    Token(String),
    /// Token sent as the Basic Auth user name.
    TokenBasic(String),
    /// Email and password sent as Basic Auth.
    Basic {
        /// The account email address.
        email: String,
        /// The Base64-encoded authorization header value.
        auth_header: String,
    },
}

impl Auth {
    /// Token authentication using the `X-LighthouseToken` header.
    pub fn token(token: &str) -> Self {
        Auth::Token(token.to_string())
    }

    /// Token authentication using Basic Auth.
    pub fn token_basic(token: &str) -> Self {
        Auth::TokenBasic(build_basic_header(token, TOKEN_BASIC_PASSWORD))
    }

    /// Email/password Basic Auth.
    ///
    /// The password is immediately encoded and the raw password is not stored.
    pub fn basic(email: &str, password: &str) -> Self {
        Auth::Basic {
            email: email.to_string(),
            auth_header: build_basic_header(email, password),
        }
    }

    /// Create token authentication from a profile using the OS keyring.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be retrieved from the keyring.
    pub fn from_keyring(profile_name: &str, as_basic: bool) -> Result<Self> {
        let token = get_token(profile_name)?;
        Ok(if as_basic {
            Self::token_basic(&token)
        } else {
            Self::token(&token)
        })
    }

    /// The header name and value to attach to every request.
    pub fn header(&self) -> Result<(HeaderName, HeaderValue)> {
        let (name, value) = match self {
            Auth::Token(token) => (HeaderName::from_static("x-lighthousetoken"), token.as_str()),
            Auth::TokenBasic(header) => (AUTHORIZATION, header.as_str()),
            Auth::Basic { auth_header, .. } => (AUTHORIZATION, auth_header.as_str()),
        };

        let mut value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::InvalidCredentials(format!("invalid characters: {}", e)))?;
        value.set_sensitive(true);
        Ok((name, value))
    }

    /// Get the email address, for email/password credentials.
    pub fn email(&self) -> Option<&str> {
        match self {
            Auth::Basic { email, .. } => Some(email),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Token(_) => f.write_str("Auth::Token(..)"),
            Auth::TokenBasic(_) => f.write_str("Auth::TokenBasic(..)"),
            Auth::Basic { email, .. } => f.debug_struct("Auth::Basic").field("email", email).finish(),
        }
    }
}

/// Build a Basic Auth header value.
///
/// Encodes "user:password" in Base64 and prepends "Basic ".
fn build_basic_header(user: &str, password: &str) -> String {
    let credentials = format!("{}:{}", user, password);
    let encoded = BASE64.encode(credentials.as_bytes());
    format!("Basic {}", encoded)
}

/// Store an API token in the OS keyring.
///
/// # Errors
///
/// Returns an error if the token cannot be stored in the keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, profile_name)
        .map_err(|e| ApiError::Keyring(format!("failed to create keyring entry: {}", e)))?;

    entry
        .set_password(token)
        .map_err(|e| ApiError::Keyring(format!("failed to store token: {}", e)))?;

    Ok(())
}

/// Retrieve an API token from the OS keyring.
///
/// # Errors
///
/// Returns an error if the token cannot be retrieved from the keyring.
pub fn get_token(profile_name: &str) -> Result<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, profile_name)
        .map_err(|e| ApiError::Keyring(format!("failed to access keyring: {}", e)))?;

    entry
        .get_password()
        .map_err(|e| ApiError::Keyring(format!("failed to retrieve token: {}", e)))
}

/// Delete an API token from the OS keyring.
pub fn delete_token(profile_name: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, profile_name)
        .map_err(|e| ApiError::Keyring(format!("failed to access keyring: {}", e)))?;

    entry
        .delete_password()
        .map_err(|e| ApiError::Keyring(format!("failed to delete token: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_basic(header: &str) -> String {
        let encoded = header.strip_prefix("Basic ").unwrap();
        String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn test_build_basic_header() {
        let header = build_basic_header("user@example.com", "secret");
        assert!(header.starts_with("Basic "));
        assert_eq!(decode_basic(&header), "user@example.com:secret");
    }

    #[test]
    fn test_token_header() {
        let (name, value) = Auth::token("abc123").header().unwrap();
        assert_eq!(name.as_str(), "x-lighthousetoken");
        assert_eq!(value.to_str().unwrap(), "abc123");
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_token_basic_uses_literal_password() {
        let (name, value) = Auth::token_basic("abc123").header().unwrap();
        assert_eq!(name, AUTHORIZATION);
        assert_eq!(decode_basic(value.to_str().unwrap()), "abc123:x");
    }

    #[test]
    fn test_basic_auth() {
        let auth = Auth::basic("user@example.com", "hunter2");
        assert_eq!(auth.email(), Some("user@example.com"));
        let (_, value) = auth.header().unwrap();
        assert_eq!(decode_basic(value.to_str().unwrap()), "user@example.com:hunter2");
    }

    #[test]
    fn test_header_rejects_control_characters() {
        let err = Auth::token("abc\n123").header().unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials(_)));
        assert!(!err.to_string().contains("abc"));
    }

    #[test]
    fn test_auth_does_not_expose_secrets() {
        let debug_output = format!("{:?}", Auth::token("secret_token"));
        assert!(!debug_output.contains("secret_token"));

        let debug_output = format!("{:?}", Auth::basic("user@example.com", "hunter2"));
        assert!(!debug_output.contains("hunter2"));
        assert!(debug_output.contains("user@example.com"));
    }
}
