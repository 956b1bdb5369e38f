//! Source-control changesets linked to a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::null_default;
use crate::api::client::LighthouseClient;
use crate::api::error::Result;
use crate::api::service::{Resource, ResourceService};

/// A commit recorded against a project, addressed by revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Changeset {
    #[serde(deserialize_with = "null_default")]
    pub body: String,
    #[serde(deserialize_with = "null_default")]
    pub body_html: String,
    pub changed_at: Option<DateTime<Utc>>,
    /// `[operation, path]` pairs as sent by the server.
    pub changes: Value,
    pub project_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub revision: String,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    #[serde(deserialize_with = "null_default")]
    pub user_id: u64,
}

impl Resource for Changeset {
    const KEY: &'static str = "changeset";
    const COLLECTION_KEY: &'static str = "changesets";
    const KIND: &'static str = "changeset";
}

/// The fields of a changeset accepted on create.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangesetView {
    pub body: String,
    pub changed_at: Option<DateTime<Utc>>,
    pub changes: Value,
    pub revision: String,
    pub title: String,
    pub user_id: u64,
}

impl From<&Changeset> for ChangesetView {
    fn from(changeset: &Changeset) -> Self {
        Self {
            body: changeset.body.clone(),
            changed_at: changeset.changed_at,
            changes: changeset.changes.clone(),
            revision: changeset.revision.clone(),
            title: changeset.title.clone(),
            user_id: changeset.user_id,
        }
    }
}

/// Access to `/projects/<id>/changesets`.
#[derive(Debug, Clone)]
pub struct Changesets {
    service: ResourceService<Changeset>,
}

impl Changesets {
    pub(crate) fn new(client: LighthouseClient, project_id: u64) -> Self {
        Self {
            service: ResourceService::new(client, format!("/projects/{}/changesets", project_id)),
        }
    }

    pub async fn list(&self) -> Result<Vec<Changeset>> {
        self.service.list(Vec::new()).await
    }

    pub async fn get(&self, revision: &str) -> Result<Changeset> {
        self.service.get_by_key(&urlencoding::encode(revision)).await
    }

    pub async fn new_template(&self) -> Result<Changeset> {
        self.service.new_template().await
    }

    pub async fn create(&self, changeset: &Changeset) -> Result<Changeset> {
        self.service.create(&ChangesetView::from(changeset)).await
    }

    pub async fn delete(&self, revision: &str) -> Result<()> {
        self.service.delete_by_key(&urlencoding::encode(revision)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Auth;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_changesets_by_revision() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/2/changesets/a1b2c3.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "changeset": {"revision": "a1b2c3", "title": "Fix build",
                              "changes": [["M", "src/lib.rs"]], "user_id": 5}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/projects/2/changesets/a1b2c3.json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        let changesets = client.changesets(2);
        let changeset = changesets.get("a1b2c3").await.unwrap();
        assert_eq!(changeset.changes[0][1], "src/lib.rs");
        changesets.delete(&changeset.revision).await.unwrap();
    }
}
