//! Minimal GitLab REST v4 client covering what the migration needs.
//!
//! Every request carries the `PRIVATE-TOKEN` header; requests made on behalf
//! of another user add a `Sudo` header with that user's GitLab ID, which
//! requires an administrator token.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{MigrateError, Result};
use crate::api::pagination::collect_pages;
use crate::api::resources::null_default;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const SUDO_HEADER: &str = "Sudo";
const PER_PAGE: u32 = 100;

/// Access level granted to migrated group and project members.
pub const MAINTAINER_ACCESS: u32 = 40;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Internal,
    Public,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitLabUser {
    pub id: u64,
    #[serde(deserialize_with = "null_default")]
    pub username: String,
    #[serde(deserialize_with = "null_default")]
    pub email: String,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub projects_limit: u32,
    #[serde(deserialize_with = "null_default")]
    pub is_admin: bool,
    #[serde(deserialize_with = "null_default")]
    pub can_create_group: bool,
    #[serde(deserialize_with = "null_default")]
    pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub id: u64,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub path: String,
    #[serde(deserialize_with = "null_default")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GitLabProject {
    pub id: u64,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub path_with_namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GitLabMilestone {
    pub id: u64,
    pub iid: u64,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub id: u64,
    pub iid: u64,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
}

/// A file uploaded to a project; `markdown` links it from notes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectFile {
    #[serde(deserialize_with = "null_default")]
    pub alt: String,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
    #[serde(deserialize_with = "null_default")]
    pub markdown: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateUserOptions {
    pub email: String,
    pub password: String,
    pub username: String,
    pub name: String,
    pub projects_limit: u32,
    pub admin: bool,
    pub can_create_group: bool,
    pub skip_confirmation: bool,
    pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateGroupOptions {
    pub name: String,
    pub path: String,
    pub description: String,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddMemberOptions {
    pub user_id: u64,
    pub access_level: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateProjectOptions {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_id: Option<u64>,
    pub description: String,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateLabelOptions {
    pub name: String,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateMilestoneOptions {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateMilestoneOptions {
    pub state_event: String,
}

/// Issue fields shared by create and update.
///
/// `assignee_ids: Some(vec![0])` and `milestone_id: Some(0)` clear the
/// assignee and milestone; `None` leaves them unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateIssueOptions {
    pub iid: u64,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<u64>,
    #[serde(serialize_with = "join_labels")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateIssueOptions {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<u64>,
    #[serde(serialize_with = "join_labels")]
    pub labels: Vec<String>,
    pub state_event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateNoteOptions {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// GitLab takes labels as one comma-separated string.
fn join_labels<S: Serializer>(labels: &[String], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&labels.join(","))
}

/// The GitLab API client.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    client: Client,
    /// `<base>/api/v4`, without trailing slash.
    api_url: String,
    token: String,
}

impl GitLabClient {
    /// Create a client for the GitLab instance at `base_url`.
    ///
    /// With `insecure`, TLS certificates are not verified.
    pub fn new(base_url: &str, token: &str, insecure: bool) -> Result<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        reqwest::Url::parse(&base)
            .map_err(|e| MigrateError::InvalidOptions(format!("invalid base URL {:?}: {}", base, e)))?;

        let client = Client::builder()
            .user_agent(concat!("lhtogitlab/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(insecure)
            .build()?;

        Ok(Self {
            client,
            api_url: format!("{}api/v4", base),
            token: token.to_string(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn request(&self, method: Method, path: &str, sudo: Option<u64>) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.api_url, path))
            .header(TOKEN_HEADER, &self.token);
        if let Some(user_id) = sudo {
            request = request.header(SUDO_HEADER, user_id.to_string());
        }
        request
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!("Error response body: {}", body);
        Err(MigrateError::Status {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or_else(|| status.to_string()),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = Self::check(request.send().await?).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        collect_pages(|page| {
            let request = self
                .request(Method::GET, path, None)
                .query(&[("per_page", PER_PAGE), ("page", page)]);
            self.send_json(request)
        })
        .await
    }

    /// The owner of the API token.
    pub async fn current_user(&self) -> Result<GitLabUser> {
        self.send_json(self.request(Method::GET, "/user", None)).await
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.list_all("/groups").await
    }

    pub async fn delete_group(&self, id: u64) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/groups/{}", id), None))
            .await
    }

    pub async fn list_projects(&self) -> Result<Vec<GitLabProject>> {
        self.list_all("/projects").await
    }

    pub async fn delete_project(&self, id: u64) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/projects/{}", id), None))
            .await
    }

    pub async fn list_users(&self) -> Result<Vec<GitLabUser>> {
        self.list_all("/users").await
    }

    pub async fn delete_user(&self, id: u64) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/users/{}", id), None))
            .await
    }

    #[instrument(skip_all, fields(username = %opts.username))]
    pub async fn create_user(&self, opts: &CreateUserOptions) -> Result<GitLabUser> {
        self.send_json(self.request(Method::POST, "/users", None).json(opts))
            .await
    }

    #[instrument(skip_all, fields(group = %opts.name))]
    pub async fn create_group(&self, opts: &CreateGroupOptions) -> Result<Group> {
        self.send_json(self.request(Method::POST, "/groups", None).json(opts))
            .await
    }

    pub async fn add_group_member(&self, group_id: u64, opts: &AddMemberOptions) -> Result<()> {
        let path = format!("/groups/{}/members", group_id);
        self.send_empty(self.request(Method::POST, &path, None).json(opts))
            .await
    }

    #[instrument(skip_all, fields(project = %opts.name))]
    pub async fn create_project(&self, opts: &CreateProjectOptions) -> Result<GitLabProject> {
        self.send_json(self.request(Method::POST, "/projects", None).json(opts))
            .await
    }

    pub async fn create_label(&self, project_id: u64, opts: &CreateLabelOptions) -> Result<()> {
        let path = format!("/projects/{}/labels", project_id);
        self.send_empty(self.request(Method::POST, &path, None).json(opts))
            .await
    }

    pub async fn add_project_member(&self, project_id: u64, opts: &AddMemberOptions) -> Result<()> {
        let path = format!("/projects/{}/members", project_id);
        self.send_empty(self.request(Method::POST, &path, None).json(opts))
            .await
    }

    pub async fn create_milestone(
        &self,
        project_id: u64,
        opts: &CreateMilestoneOptions,
        sudo: Option<u64>,
    ) -> Result<GitLabMilestone> {
        let path = format!("/projects/{}/milestones", project_id);
        self.send_json(self.request(Method::POST, &path, sudo).json(opts))
            .await
    }

    pub async fn update_milestone(
        &self,
        project_id: u64,
        milestone_id: u64,
        opts: &UpdateMilestoneOptions,
        sudo: Option<u64>,
    ) -> Result<()> {
        let path = format!("/projects/{}/milestones/{}", project_id, milestone_id);
        self.send_empty(self.request(Method::PUT, &path, sudo).json(opts))
            .await
    }

    #[instrument(skip(self, opts, sudo), fields(iid = opts.iid))]
    pub async fn create_issue(
        &self,
        project_id: u64,
        opts: &CreateIssueOptions,
        sudo: Option<u64>,
    ) -> Result<Issue> {
        let path = format!("/projects/{}/issues", project_id);
        self.send_json(self.request(Method::POST, &path, sudo).json(opts))
            .await
    }

    /// Subscribe the `sudo` user to an issue. Already being subscribed
    /// (304 Not Modified) counts as success.
    pub async fn subscribe_to_issue(&self, project_id: u64, iid: u64, sudo: Option<u64>) -> Result<()> {
        let path = format!("/projects/{}/issues/{}/subscribe", project_id, iid);
        let response = self.request(Method::POST, &path, sudo).send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    pub async fn update_issue(
        &self,
        project_id: u64,
        iid: u64,
        opts: &UpdateIssueOptions,
        sudo: Option<u64>,
    ) -> Result<()> {
        let path = format!("/projects/{}/issues/{}", project_id, iid);
        self.send_empty(self.request(Method::PUT, &path, sudo).json(opts))
            .await
    }

    /// Upload a file to a project as multipart part `file`.
    #[instrument(skip(self, sudo), fields(file = %file.display()))]
    pub async fn upload_file(&self, project_id: u64, file: &Path, sudo: Option<u64>) -> Result<ProjectFile> {
        let data = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let form = Form::new().part("file", Part::bytes(data).file_name(file_name));

        let path = format!("/projects/{}/uploads", project_id);
        self.send_json(self.request(Method::POST, &path, sudo).multipart(form))
            .await
    }

    pub async fn create_issue_note(
        &self,
        project_id: u64,
        iid: u64,
        opts: &CreateNoteOptions,
        sudo: Option<u64>,
    ) -> Result<()> {
        let path = format!("/projects/{}/issues/{}/notes", project_id, iid);
        self.send_empty(self.request(Method::POST, &path, sudo).json(opts))
            .await
    }
}

/// Pull the message out of a GitLab error body.
///
/// GitLab sends `{"message": "..."}`, `{"message": {"field": ["..."]}}` or
/// `{"error": "..."}`.
fn error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    match json.get("message").or_else(|| json.get("error"))? {
        Value::String(s) => Some(s.clone()),
        Value::Object(fields) => {
            let parts: Vec<String> = fields
                .iter()
                .map(|(field, msgs)| match msgs {
                    Value::Array(list) => {
                        let words: Vec<&str> = list.iter().filter_map(Value::as_str).collect();
                        format!("{} {}", field, words.join(", "))
                    }
                    other => format!("{} {}", field, other),
                })
                .collect();
            Some(parts.join("; "))
        }
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GitLabClient {
        GitLabClient::new(&server.uri(), "secret", false).unwrap()
    }

    #[test]
    fn test_api_url_gets_trailing_slash() {
        let client = GitLabClient::new("https://gitlab.example.com", "t", false).unwrap();
        assert_eq!(client.api_url(), "https://gitlab.example.com/api/v4");
        let client = GitLabClient::new("https://gitlab.example.com/", "t", true).unwrap();
        assert_eq!(client.api_url(), "https://gitlab.example.com/api/v4");
    }

    #[test]
    fn test_issue_options_encoding() {
        let opts = CreateIssueOptions {
            iid: 12,
            title: "Login".to_string(),
            assignee_ids: Some(vec![0]),
            labels: vec!["ui".to_string(), "lh::open".to_string()],
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&opts).unwrap(),
            json!({
                "iid": 12,
                "title": "Login",
                "description": "",
                "assignee_ids": [0],
                "labels": "ui,lh::open"
            })
        );
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(r#"{"message":"403 Forbidden"}"#).as_deref(), Some("403 Forbidden"));
        assert_eq!(
            error_message(r#"{"message":{"name":["has already been taken"]}}"#).as_deref(),
            Some("name has already been taken")
        );
        assert_eq!(error_message("<html>"), None);
    }

    #[tokio::test]
    async fn test_current_user_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .and(header("PRIVATE-TOKEN", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "username": "root", "email": null})))
            .expect(1)
            .mount(&server)
            .await;

        let me = client(&server).current_user().await.unwrap();
        assert_eq!(me.username, "root");
        assert_eq!(me.email, "");
    }

    #[tokio::test]
    async fn test_list_walks_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/groups"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/groups"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let groups = client(&server).list_groups().await.unwrap();
        assert_eq!(groups.iter().map(|g| g.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_sudo_header_and_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/3/milestones"))
            .and(header("Sudo", "9"))
            .and(body_json(json!({"title": "Launch", "description": "", "start_date": "2020-01-02"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "title is taken"})))
            .mount(&server)
            .await;

        let opts = CreateMilestoneOptions {
            title: "Launch".to_string(),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 2),
            ..Default::default()
        };
        let err = client(&server).create_milestone(3, &opts, Some(9)).await.unwrap_err();
        match err {
            MigrateError::Status { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "title is taken");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_not_modified_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/3/issues/12/subscribe"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        client(&server).subscribe_to_issue(3, 12, Some(4)).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_file_returns_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/3/uploads"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "alt": "trace",
                "url": "/uploads/abc/trace.log",
                "markdown": "[trace.log](/uploads/abc/trace.log)"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("trace.log");
        std::fs::write(&file, b"boom").unwrap();

        let uploaded = client(&server).upload_file(3, &file, None).await.unwrap();
        assert_eq!(uploaded.markdown, "[trace.log](/uploads/abc/trace.log)");
    }
}
