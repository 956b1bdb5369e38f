//! The account's subscription plan.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::client::LighthouseClient;
use crate::api::envelope;
use crate::api::error::Result;

/// The account plan. Only the account owner may read it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub free: bool,
    pub ssl: bool,
    /// Plan limits and flags not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Access to `/plan.json`.
#[derive(Debug, Clone)]
pub struct Plans {
    client: LighthouseClient,
}

impl Plans {
    pub(crate) fn new(client: LighthouseClient) -> Self {
        Self { client }
    }

    pub async fn get(&self) -> Result<Plan> {
        let body = self
            .client
            .request_bytes(Method::GET, "/plan.json", None, StatusCode::OK)
            .await?;
        envelope::unwrap_one("plan", &body)
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
    async fn test_plan_keeps_unknown_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plan.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "plan": {"free": false, "ssl": true, "projects": 20}
            })))
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        let plan = client.plans().get().await.unwrap();
        assert!(plan.ssl);
        assert_eq!(plan.extra.get("projects"), Some(&json!(20)));

        let round = serde_json::to_value(&plan).unwrap();
        assert_eq!(round["projects"], 20);
    }

    #[tokio::test]
    async fn test_plan_forbidden_for_non_owner() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plan.json"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        let err = client.plans().get().await.unwrap_err();
        assert!(err.is_unauthorized());
    }
}
