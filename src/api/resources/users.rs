//! Users and the authenticated user's profile.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::null_default;
use super::projects::Membership;
use crate::api::client::LighthouseClient;
use crate::api::envelope;
use crate::api::error::Result;
use crate::api::service::{Named, Resource, ResourceService};

/// A Lighthouse user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: u64,
    #[serde(deserialize_with = "null_default")]
    pub job: String,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub website: String,
    #[serde(deserialize_with = "null_default")]
    pub avatar_url: String,
}

impl Resource for User {
    const KEY: &'static str = "user";
    const COLLECTION_KEY: &'static str = "users";
    const KIND: &'static str = "user";
}

impl Named for User {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// The fields of a user accepted on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserView {
    pub name: String,
    pub job: String,
    pub website: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            job: user.job.clone(),
            website: user.website.clone(),
        }
    }
}

/// Access to `/users`. Users cannot be listed, created or deleted.
#[derive(Debug, Clone)]
pub struct Users {
    service: ResourceService<User>,
}

impl Users {
    pub(crate) fn new(client: LighthouseClient) -> Self {
        Self {
            service: ResourceService::new(client, "/users"),
        }
    }

    pub async fn get(&self, id: u64) -> Result<User> {
        self.service.get_by_key(&id.to_string()).await
    }

    /// Update a user. Only the fields of [`UserView`] are sent.
    pub async fn update(&self, user: &User) -> Result<()> {
        self.service
            .update(&user.id.to_string(), &UserView::from(user))
            .await
    }

    /// Every membership of a user across the account.
    pub async fn memberships(&self, id: u64) -> Result<Vec<Membership>> {
        self.service
            .get_sub_collection(&id.to_string(), "memberships", "membership")
            .await
    }
}

/// Access to `/profile.json`.
#[derive(Debug, Clone)]
pub struct Profiles {
    client: LighthouseClient,
}

impl Profiles {
    pub(crate) fn new(client: LighthouseClient) -> Self {
        Self { client }
    }

    /// The user owning the credentials.
    pub async fn get(&self) -> Result<User> {
        let body = self
            .client
            .request_bytes(Method::GET, "/profile.json", None, StatusCode::OK)
            .await?;
        envelope::unwrap_one(User::KEY, &body)
    }
}
