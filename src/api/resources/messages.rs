//! Project messages and their comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_default;
use crate::api::client::LighthouseClient;
use crate::api::error::Result;
use crate::api::service::{Named, Resource, ResourceService};

/// A message posted to a project; comments share the same shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub all_attachments_count: u32,
    pub attachments_count: u32,
    #[serde(deserialize_with = "null_default")]
    pub body: String,
    #[serde(deserialize_with = "null_default")]
    pub body_html: String,
    pub comments_count: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub id: u64,
    pub integer: u64,
    #[serde(deserialize_with = "null_default")]
    pub milestone_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub parent_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub permalink: String,
    pub project_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    #[serde(deserialize_with = "null_default")]
    pub token: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub user_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub user_name: String,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
    #[serde(deserialize_with = "null_default")]
    pub comments: Vec<Message>,
}

impl Resource for Message {
    const KEY: &'static str = "message";
    const COLLECTION_KEY: &'static str = "messages";
    const KIND: &'static str = "message";
}

impl Named for Message {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.title
    }
}

/// The fields of a message accepted on create and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageView {
    pub body: String,
    pub title: String,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            body: message.body.clone(),
            title: message.title.clone(),
        }
    }
}

/// The fields of a comment accepted on create.
pub type CommentView = MessageView;

/// Access to `/projects/<id>/messages`.
#[derive(Debug, Clone)]
pub struct Messages {
    service: ResourceService<Message>,
}

impl Messages {
    pub(crate) fn new(client: LighthouseClient, project_id: u64) -> Self {
        Self {
            service: ResourceService::new(client, format!("/projects/{}/messages", project_id)),
        }
    }

    pub async fn list(&self) -> Result<Vec<Message>> {
        self.service.list(Vec::new()).await
    }

    pub async fn get(&self, id_or_title: &str) -> Result<Message> {
        self.service.get(id_or_title).await
    }

    pub async fn new_template(&self) -> Result<Message> {
        self.service.new_template().await
    }

    pub async fn create(&self, message: &Message) -> Result<Message> {
        self.service.create(&MessageView::from(message)).await
    }

    pub async fn update(&self, message: &Message) -> Result<()> {
        self.service
            .update(&message.id.to_string(), &MessageView::from(message))
            .await
    }

    /// Post a comment on a message and return the updated parent message.
    pub async fn create_comment(&self, id_or_title: &str, comment: &Message) -> Result<Message> {
        let id = self.service.resolve_id(id_or_title).await?;
        self.service
            .create_nested(&id.to_string(), "comments", "comment", &CommentView::from(comment))
            .await
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
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_comment_by_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/4/messages.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"message": {"id": 17, "title": "Welcome"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/4/messages/17/comments.json"))
            .and(body_json(json!({"comment": {"body": "Thanks!", "title": ""}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": {
                    "id": 17,
                    "title": "Welcome",
                    "comments_count": 1,
                    "comments": [{"id": 18, "parent_id": 17, "body": "Thanks!"}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        let comment = Message {
            body: "Thanks!".to_string(),
            ..Default::default()
        };
        let parent = client.messages(4).create_comment("welcome", &comment).await.unwrap();
        assert_eq!(parent.id, 17);
        assert_eq!(parent.comments.len(), 1);
        assert_eq!(parent.comments[0].parent_id, 17);
    }

    #[tokio::test]
    async fn test_create_expects_created_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/4/messages.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": {"id": 1}})))
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        let err = client.messages(4).create(&Message::default()).await.unwrap_err();
        assert_eq!(err.status(), Some(200));
    }
}
