//! Projects and project memberships.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::null_default;
use super::users::User;
use crate::api::client::LighthouseClient;
use crate::api::error::Result;
use crate::api::service::{Named, Resource, ResourceService};

/// Completed onboarding steps of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Todos {
    pub projects: bool,
    pub tickets: bool,
    pub milestones: bool,
}

/// A list of state names, sent by the server as one comma-separated string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatesList(pub Vec<String>);

impl Serialize for StatesList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.join(","))
    }
}

impl<'de> Deserialize<'de> for StatesList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(StatesList(
            raw.split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }
}

/// A Lighthouse project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub archived: bool,
    /// State definitions, one `name/color # comment` per line.
    #[serde(deserialize_with = "null_default")]
    pub closed_states: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub default_assigned_user_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub default_milestone_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub default_ticket_text: String,
    #[serde(deserialize_with = "null_default")]
    pub description: String,
    #[serde(deserialize_with = "null_default")]
    pub description_html: String,
    pub enable_points: bool,
    pub hidden: bool,
    pub id: u64,
    #[serde(deserialize_with = "null_default")]
    pub license: String,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub open_states: String,
    pub open_tickets_count: u32,
    pub oss_readonly: bool,
    #[serde(deserialize_with = "null_default")]
    pub permalink: String,
    #[serde(deserialize_with = "null_default")]
    pub points_scale: String,
    pub public: bool,
    pub send_changesets_to_events: bool,
    pub todos_completed: Todos,
    /// Kept verbatim; the server does not always send RFC 3339 here.
    #[serde(deserialize_with = "null_default")]
    pub updated_at: String,
    pub open_states_list: StatesList,
    pub closed_states_list: StatesList,
}

impl Resource for Project {
    const KEY: &'static str = "project";
    const COLLECTION_KEY: &'static str = "projects";
    const KIND: &'static str = "project";
}

impl Named for Project {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// The fields of a project accepted on create and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectView {
    pub archived: bool,
    pub name: String,
    pub public: bool,
}

impl From<&Project> for ProjectView {
    fn from(project: &Project) -> Self {
        Self {
            archived: project.archived,
            name: project.name.clone(),
            public: project.public,
        }
    }
}

/// A user's membership in a project or account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Membership {
    pub id: u64,
    pub user_id: u64,
    pub user: Option<User>,
    #[serde(deserialize_with = "null_default")]
    pub account: String,
    #[serde(deserialize_with = "null_default")]
    pub project_id: u64,
}

/// Access to `/projects`.
#[derive(Debug, Clone)]
pub struct Projects {
    service: ResourceService<Project>,
}

impl Projects {
    pub(crate) fn new(client: LighthouseClient) -> Self {
        Self {
            service: ResourceService::new(client, "/projects"),
        }
    }

    pub async fn list(&self) -> Result<Vec<Project>> {
        self.service.list(Vec::new()).await
    }

    /// Get a project by ID, or by case-insensitive name.
    pub async fn get(&self, id_or_name: &str) -> Result<Project> {
        self.service.get(id_or_name).await
    }

    pub async fn get_by_id(&self, id: u64) -> Result<Project> {
        self.service.get_by_key(&id.to_string()).await
    }

    /// Resolve a project ID from an ID or name.
    pub async fn resolve_id(&self, id_or_name: &str) -> Result<u64> {
        self.service.resolve_id(id_or_name).await
    }

    pub async fn new_template(&self) -> Result<Project> {
        self.service.new_template().await
    }

    /// Create a project. Only the fields of [`ProjectView`] are sent.
    pub async fn create(&self, project: &Project) -> Result<Project> {
        self.service.create(&ProjectView::from(project)).await
    }

    /// Update a project. Only the fields of [`ProjectView`] are sent.
    pub async fn update(&self, project: &Project) -> Result<()> {
        self.service
            .update(&project.id.to_string(), &ProjectView::from(project))
            .await
    }

    pub async fn delete(&self, id_or_name: &str) -> Result<()> {
        self.service.delete(id_or_name).await
    }

    /// Members of a project given by ID or name.
    pub async fn memberships(&self, id_or_name: &str) -> Result<Vec<Membership>> {
        let id = self.service.resolve_id(id_or_name).await?;
        self.memberships_by_id(id).await
    }

    pub async fn memberships_by_id(&self, id: u64) -> Result<Vec<Membership>> {
        self.service
            .get_sub_collection(&id.to_string(), "memberships", "membership")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Auth;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> LighthouseClient {
        LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap()
    }

    #[test]
    fn test_states_list_wire_format() {
        let project: Project = serde_json::from_value(json!({
            "id": 1,
            "name": "web",
            "open_states_list": "new,open",
            "closed_states_list": "resolved,hold,invalid",
            "default_milestone_id": null,
            "description": null
        }))
        .unwrap();
        assert_eq!(project.open_states_list.0, vec!["new", "open"]);
        assert_eq!(project.closed_states_list.0.len(), 3);
        assert_eq!(project.default_milestone_id, 0);

        let value = serde_json::to_value(&project).unwrap();
        assert_eq!(value["open_states_list"], "new,open");
    }

    #[test]
    fn test_empty_states_list() {
        let list: StatesList = serde_json::from_str(r#""""#).unwrap();
        assert!(list.0.is_empty());
        let list: StatesList = serde_json::from_str("null").unwrap();
        assert!(list.0.is_empty());
    }

    #[tokio::test]
    async fn test_create_then_get_by_returned_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects.json"))
            .and(body_json(json!({"project": {"archived": false, "name": "web", "public": true}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "project": {"id": 42, "name": "web", "public": true, "archived": false}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/42.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "project": {"id": 42, "name": "web", "public": true, "archived": false}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let projects = client(&server).await.projects();
        let draft = Project {
            name: "web".to_string(),
            public: true,
            description: "ignored on create".to_string(),
            ..Default::default()
        };
        let created = projects.create(&draft).await.unwrap();
        let fetched = projects.get(&created.id.to_string()).await.unwrap();

        assert_eq!(ProjectView::from(&fetched), ProjectView::from(&draft));
    }

    #[tokio::test]
    async fn test_delete_by_name_is_case_insensitive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projects": [
                    {"project": {"id": 1, "name": "Backend"}},
                    {"project": {"id": 2, "name": "Website"}}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/projects/2.json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let projects = client(&server).await.projects();
        projects.delete("wEbSiTe").await.unwrap();

        let err = projects.delete("mobile").await.unwrap_err();
        assert_eq!(err.to_string(), "no such project \"mobile\"");
    }

    #[tokio::test]
    async fn test_memberships() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/7/memberships.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "memberships": [
                    {"membership": {"id": 3, "user_id": 11, "account": "acme",
                                    "user": {"id": 11, "name": "Ada"}}}
                ]
            })))
            .mount(&server)
            .await;

        let members = client(&server).await.projects().memberships("7").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, 11);
        assert_eq!(members[0].user.as_ref().map(|u| u.name.as_str()), Some("Ada"));
    }
}
