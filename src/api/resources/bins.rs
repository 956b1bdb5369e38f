//! Ticket bins (saved ticket searches).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_default;
use crate::api::client::LighthouseClient;
use crate::api::error::Result;
use crate::api::service::{Named, Resource, ResourceService};

/// A saved ticket query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bin {
    pub default: bool,
    pub id: u64,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    pub position: u32,
    pub project_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub query: String,
    pub shared: bool,
    pub tickets_count: u32,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub user_id: u64,
    pub global: bool,
}

impl Resource for Bin {
    const KEY: &'static str = "ticket_bin";
    const COLLECTION_KEY: &'static str = "ticket_bins";
    const KIND: &'static str = "bin";
}

impl Named for Bin {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// The fields of a bin accepted on create and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BinView {
    pub default: bool,
    pub name: String,
    pub query: String,
}

impl From<&Bin> for BinView {
    fn from(bin: &Bin) -> Self {
        Self {
            default: bin.default,
            name: bin.name.clone(),
            query: bin.query.clone(),
        }
    }
}

/// Access to `/projects/<id>/bins`.
#[derive(Debug, Clone)]
pub struct Bins {
    service: ResourceService<Bin>,
}

impl Bins {
    pub(crate) fn new(client: LighthouseClient, project_id: u64) -> Self {
        Self {
            service: ResourceService::new(client, format!("/projects/{}/bins", project_id)),
        }
    }

    pub async fn list(&self) -> Result<Vec<Bin>> {
        self.service.list(Vec::new()).await
    }

    pub async fn get(&self, id_or_name: &str) -> Result<Bin> {
        self.service.get(id_or_name).await
    }

    pub async fn new_template(&self) -> Result<Bin> {
        self.service.new_template().await
    }

    pub async fn create(&self, bin: &Bin) -> Result<Bin> {
        self.service.create(&BinView::from(bin)).await
    }

    pub async fn update(&self, bin: &Bin) -> Result<()> {
        self.service.update(&bin.id.to_string(), &BinView::from(bin)).await
    }

    pub async fn delete(&self, id_or_name: &str) -> Result<()> {
        self.service.delete(id_or_name).await
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
    async fn test_bins_use_ticket_bin_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/3/bins.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ticket_bins": [
                    {"ticket_bin": {"id": 1, "name": "Open", "query": "state:open"}},
                    {"ticket_bin": {"id": 2, "name": "Mine", "query": "responsible:me"}}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/3/bins.json"))
            .and(body_json(json!({"ticket_bin": {"default": false, "name": "Late", "query": "due:past"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "ticket_bin": {"id": 9, "name": "Late", "query": "due:past", "project_id": 3}
            })))
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        let bins = client.bins(3);

        let mine = bins.get("MINE").await.unwrap();
        assert_eq!(mine.id, 2);

        let draft = Bin {
            name: "Late".to_string(),
            query: "due:past".to_string(),
            ..Default::default()
        };
        let created = bins.create(&draft).await.unwrap();
        assert_eq!(created.id, 9);
        assert_eq!(created.project_id, 3);
    }
}
