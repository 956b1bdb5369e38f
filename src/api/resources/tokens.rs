//! API token introspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_default;
use crate::api::client::LighthouseClient;
use crate::api::error::Result;
use crate::api::service::{Resource, ResourceService};

/// An API token and what it grants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    #[serde(deserialize_with = "null_default")]
    pub account: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub note: String,
    #[serde(deserialize_with = "null_default")]
    pub project_id: u64,
    pub read_only: bool,
    #[serde(deserialize_with = "null_default")]
    pub token: String,
    #[serde(deserialize_with = "null_default")]
    pub user_id: u64,
}

impl Resource for Token {
    const KEY: &'static str = "token";
    const COLLECTION_KEY: &'static str = "tokens";
    const KIND: &'static str = "token";
}

/// Access to `/tokens`.
#[derive(Debug, Clone)]
pub struct Tokens {
    service: ResourceService<Token>,
}

impl Tokens {
    pub(crate) fn new(client: LighthouseClient) -> Self {
        Self {
            service: ResourceService::new(client, "/tokens"),
        }
    }

    pub async fn get(&self, token: &str) -> Result<Token> {
        self.service.get_by_key(&urlencoding::encode(token)).await
    }
}
