//! Centralized error type for the command-line tools.
//!
//! Each layer has its own `thiserror` enum; [`AppError`] aggregates them so
//! the binaries can print a user-facing message and a hint before exiting.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::migrate::MigrateError;

/// The main application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration-related errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// API-related errors.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Account export errors.
    #[error("{0}")]
    Export(#[from] ExportError),

    /// GitLab migration errors.
    #[error("{0}")]
    Migrate(#[from] MigrateError),

    /// IO errors (file system, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with a message.
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        AppError::Other(msg.into())
    }

    /// Get a user-friendly message for display, without technical detail.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => match e {
                ConfigError::NoConfigDir => {
                    "Could not find configuration directory. Please check your system settings."
                        .to_string()
                }
                ConfigError::CreateDirError(_) => {
                    "Could not create configuration directory. Check file permissions.".to_string()
                }
                ConfigError::ReadError(_) => {
                    "Could not read configuration file. Please check the file exists and is readable.".to_string()
                }
                ConfigError::WriteError(_) => {
                    "Could not save configuration. Please check file permissions.".to_string()
                }
                ConfigError::ParseError(_) => {
                    "Configuration file is invalid. Please check the file format.".to_string()
                }
                ConfigError::SerializeError(_) => {
                    "Could not save configuration. Internal error.".to_string()
                }
                ConfigError::ValidationError(msg) => format!("Configuration error: {}", msg),
                ConfigError::ProfileNotFound(name) => format!("Profile '{}' not found.", name),
                ConfigError::MissingCredentials(msg) => format!("No credentials: {}", msg),
            },
            AppError::Api(e) => api_message(e),
            AppError::Export(e) => match e {
                ExportError::Api(api) => format!("Export failed: {}", api_message(api)),
                ExportError::Io(_) => "Could not write the export file. Check the output directory.".to_string(),
                ExportError::Json(_) => "Could not encode exported data.".to_string(),
            },
            AppError::Migrate(e) => match e {
                MigrateError::Archive(msg) => format!("The export archive could not be read: {}", msg),
                MigrateError::Status { status: 401, .. } => {
                    "GitLab rejected the API token.".to_string()
                }
                MigrateError::Status { status: 403, .. } => {
                    "GitLab denied access. An administrator token is required.".to_string()
                }
                MigrateError::Status { status, message } => format!("GitLab error {}: {}", status, message),
                MigrateError::Network(_) => {
                    "Could not connect to GitLab. Please check the base URL and network.".to_string()
                }
                MigrateError::Io(_) => "A file operation failed. Please check file permissions.".to_string(),
                MigrateError::Json(e) => format!("Invalid JSON input: {}", e),
                MigrateError::InvalidOptions(msg) => msg.clone(),
            },
            AppError::Io(_) => "A file operation failed. Please check file permissions.".to_string(),
            AppError::Other(msg) => msg.clone(),
        }
    }

    /// Check if this error is critical, meaning nothing can work until the
    /// user fixes configuration or credentials.
    pub fn is_critical(&self) -> bool {
        match self {
            AppError::Config(_) => true,
            AppError::Api(e) => {
                e.is_unauthorized() || matches!(e, ApiError::Keyring(_) | ApiError::InvalidCredentials(_))
            }
            AppError::Export(ExportError::Api(e)) => e.is_unauthorized(),
            AppError::Migrate(MigrateError::Status { status, .. }) => matches!(status, 401 | 403),
            AppError::Migrate(MigrateError::InvalidOptions(_)) => true,
            _ => false,
        }
    }

    /// Get a suggested action for the user.
    pub fn suggested_action(&self) -> Option<&'static str> {
        match self {
            AppError::Config(ConfigError::NoConfigDir) | AppError::Config(ConfigError::ReadError(_)) => {
                Some("Set LH_CONFIG to the path of a configuration file.")
            }
            AppError::Config(ConfigError::MissingCredentials(_)) | AppError::Api(ApiError::Keyring(_)) => {
                Some("Run 'lh login' or pass --token / --email and --password.")
            }
            AppError::Api(ApiError::InvalidCredentials(_))
            | AppError::Export(ExportError::Api(ApiError::InvalidCredentials(_))) => {
                Some("Check the token, email and password for stray spaces or line breaks, then run 'lh login' again.")
            }
            AppError::Api(e) if e.is_unauthorized() => {
                Some("Check your API token in your Lighthouse profile, then run 'lh login' again.")
            }
            AppError::Api(ApiError::Network(_)) => Some("Check your internet connection and account name."),
            AppError::Migrate(MigrateError::Status { status: 401 | 403, .. }) => {
                Some("Use a personal access token of a GitLab administrator with the api and sudo scopes.")
            }
            AppError::Migrate(MigrateError::Network(_)) => {
                Some("Check --base-url; use --insecure for self-signed certificates.")
            }
            _ => None,
        }
    }
}

fn api_message(e: &ApiError) -> String {
    match e {
        ApiError::UnexpectedStatus { status: 401, .. } => {
            "Authentication failed. Please check your API token or email and password.".to_string()
        }
        ApiError::UnexpectedStatus { status: 403, .. } => {
            "Access denied. You don't have permission to access this resource.".to_string()
        }
        ApiError::UnexpectedStatus { status: 404, .. } => "The requested resource does not exist.".to_string(),
        ApiError::UnexpectedStatus {
            message: Some(message), ..
        } => format!("Lighthouse rejected the request: {}", message),
        ApiError::UnexpectedStatus { status, .. } if *status >= 500 => {
            "Lighthouse server error. Please try again later.".to_string()
        }
        ApiError::UnexpectedStatus { status, .. } => format!("Unexpected response status {}.", status),
        ApiError::NotFound(what) => format!("Not found: {}.", what),
        ApiError::Network(_) => "Connection failed. Please check your internet connection.".to_string(),
        ApiError::InvalidUrl(_) => "Invalid Lighthouse account or URL.".to_string(),
        ApiError::InvalidCredentials(_) => {
            "The stored credentials contain characters that cannot be sent to Lighthouse.".to_string()
        }
        ApiError::Keyring(_) => {
            "Could not access secure storage. Please log in again.".to_string()
        }
        ApiError::Decode(_) => "Unexpected response from Lighthouse. Please try again.".to_string(),
        ApiError::InvalidTicketNumber(number) => format!("'{}' is not a ticket number.", number),
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, AppError>;
