//! Project milestones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_default;
use crate::api::client::LighthouseClient;
use crate::api::error::Result;
use crate::api::service::{Named, Resource, ResourceService};

/// A milestone of a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Milestone {
    pub attachments_count: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub due_on: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub goals: String,
    #[serde(deserialize_with = "null_default")]
    pub goals_html: String,
    pub id: u64,
    pub max_points: u32,
    pub open_tickets_count: u32,
    #[serde(deserialize_with = "null_default")]
    pub permalink: String,
    pub points_closed: u32,
    pub points_open: u32,
    pub position: u32,
    pub project_id: u64,
    pub tickets_count: u32,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
    #[serde(deserialize_with = "null_default")]
    pub user_name: String,
}

impl Resource for Milestone {
    const KEY: &'static str = "milestone";
    const COLLECTION_KEY: &'static str = "milestones";
    const KIND: &'static str = "milestone";
}

impl Named for Milestone {
    const PAGED_LOOKUP: bool = true;

    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.title
    }
}

/// The fields of a milestone accepted on create and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MilestoneView {
    pub goals: String,
    pub title: String,
    pub due_on: Option<DateTime<Utc>>,
}

impl From<&Milestone> for MilestoneView {
    fn from(milestone: &Milestone) -> Self {
        Self {
            goals: milestone.goals.clone(),
            title: milestone.title.clone(),
            due_on: milestone.due_on,
        }
    }
}

/// Access to `/projects/<id>/milestones`.
#[derive(Debug, Clone)]
pub struct Milestones {
    service: ResourceService<Milestone>,
}

impl Milestones {
    pub(crate) fn new(client: LighthouseClient, project_id: u64) -> Self {
        Self {
            service: ResourceService::new(client, format!("/projects/{}/milestones", project_id)),
        }
    }

    /// One page of milestones; `None` lets the server pick the first page.
    pub async fn list(&self, page: Option<u32>) -> Result<Vec<Milestone>> {
        let query = page
            .filter(|p| *p > 0)
            .map(|p| vec![("page", p.to_string())])
            .unwrap_or_default();
        self.service.list(query).await
    }

    /// Every milestone, page by page until an empty page.
    pub async fn list_all(&self) -> Result<Vec<Milestone>> {
        self.service.list_all(Vec::new()).await
    }

    /// Get a milestone by ID, or by case-insensitive title across all pages.
    pub async fn get(&self, id_or_title: &str) -> Result<Milestone> {
        self.service.get(id_or_title).await
    }

    pub async fn new_template(&self) -> Result<Milestone> {
        self.service.new_template().await
    }

    pub async fn create(&self, milestone: &Milestone) -> Result<Milestone> {
        self.service.create(&MilestoneView::from(milestone)).await
    }

    pub async fn update(&self, milestone: &Milestone) -> Result<()> {
        self.service
            .update(&milestone.id.to_string(), &MilestoneView::from(milestone))
            .await
    }

    /// Mark a milestone completed.
    pub async fn close(&self, id_or_title: &str) -> Result<()> {
        let id = self.service.resolve_id(id_or_title).await?;
        self.service.put_action(&id.to_string(), "close").await
    }

    /// Reopen a completed milestone.
    pub async fn open(&self, id_or_title: &str) -> Result<()> {
        let id = self.service.resolve_id(id_or_title).await?;
        self.service.put_action(&id.to_string(), "open").await
    }

    pub async fn delete(&self, id_or_title: &str) -> Result<()> {
        self.service.delete(id_or_title).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Auth;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(ids: std::ops::Range<u64>) -> serde_json::Value {
        let items: Vec<_> = ids
            .map(|id| json!({"milestone": {"id": id, "title": format!("Release {}", id)}}))
            .collect();
        json!({ "milestones": items })
    }

    async fn paged_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/1/milestones.json"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(1..31)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/1/milestones.json"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(31..36)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/1/milestones.json"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"milestones": []})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_list_all_walks_pages() {
        let server = paged_server().await;
        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        let all = client.milestones(1).list_all().await.unwrap();
        assert_eq!(all.len(), 35);
        assert_eq!(all.last().map(|m| m.id), Some(35));
    }

    #[tokio::test]
    async fn test_close_by_title_on_second_page() {
        let server = paged_server().await;
        Mock::given(method("PUT"))
            .and(path("/projects/1/milestones/33/close.json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        client.milestones(1).close("release 33").await.unwrap();
    }

    #[tokio::test]
    async fn test_open_by_id_skips_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/projects/1/milestones/8/open.json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        client.milestones(1).open("8").await.unwrap();
    }
}
