//! Lighthouse API transport.
//!
//! This module provides the client every resource service goes through. It
//! attaches credentials, issues a single request per call (no retries),
//! optionally holds requests back to a client-side rate limit and classifies
//! unexpected status codes as API errors.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, multipart::Form, Client, Method, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::auth::Auth;
use super::error::{ApiError, Result};
use super::resources::{
    Bins, Changesets, Messages, Milestones, Plans, Profiles, Projects, Tickets, Tokens, Users,
};

/// Default Lighthouse host; accounts live at `https://<account>.<host>`.
pub const DEFAULT_HOST: &str = "lighthouseapp.com";

/// A client-side limit on API requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Sustained requests per second.
    pub per_second: NonZeroU32,
    /// Requests that may go out back to back before the rate applies.
    pub burst: NonZeroU32,
}

impl RateLimit {
    /// A limit of `per_second` requests; 0 means unlimited. A burst of 0
    /// is treated as 1.
    pub fn new(per_second: u32, burst: u32) -> Option<Self> {
        let per_second = NonZeroU32::new(per_second)?;
        Some(Self {
            per_second,
            burst: NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN),
        })
    }

    fn quota(&self) -> Quota {
        Quota::per_second(self.per_second).allow_burst(self.burst)
    }
}

/// A limiter shared by every clone of a client.
#[derive(Clone)]
struct SharedLimiter {
    limit: RateLimit,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl fmt::Debug for SharedLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedLimiter").field("limit", &self.limit).finish()
    }
}

/// The Lighthouse API client.
///
/// Cheap to clone: the underlying HTTP connection pool and the rate limiter
/// are shared.
#[derive(Debug, Clone)]
pub struct LighthouseClient {
    /// The HTTP client.
    client: Client,
    /// The base URL for the account, without trailing slash.
    base_url: String,
    /// Authentication credentials.
    auth: Auth,
    limiter: Option<SharedLimiter>,
}

impl LighthouseClient {
    /// Create a client for `https://<account>.lighthouseapp.com`.
    pub fn new(account: &str, auth: Auth) -> Result<Self> {
        Self::with_host(account, DEFAULT_HOST, auth)
    }

    /// Create a client for `https://<account>.<host>`.
    pub fn with_host(account: &str, host: &str, auth: Auth) -> Result<Self> {
        if account.is_empty() || account.contains(|c: char| c == '/' || c == '.' || c.is_whitespace()) {
            return Err(ApiError::InvalidUrl(format!("invalid account name {:?}", account)));
        }
        Self::with_base_url(&format!("https://{}.{}", account, host), auth)
    }

    /// Create a client with an explicit base URL.
    ///
    /// Use this for testing or self-hosted proxies.
    pub fn with_base_url(base_url: &str, auth: Auth) -> Result<Self> {
        let client = Self::build_http_client()?;
        let base_url = normalize_base_url(base_url);
        reqwest::Url::parse(&base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            auth,
            limiter: None,
        })
    }

    /// Hold requests back to `limit`; `None` removes any limit.
    pub fn with_rate_limit(mut self, limit: Option<RateLimit>) -> Self {
        self.limiter = limit.map(|limit| SharedLimiter {
            limit,
            limiter: Arc::new(RateLimiter::direct(limit.quota())),
        });
        self
    }

    /// Build the HTTP client. Default timeouts apply.
    fn build_http_client() -> Result<Client> {
        Client::builder()
            .user_agent(concat!("lighthouse-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Network)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a path against the base URL. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Verify the credentials by fetching the profile of the authenticated user.
    #[instrument(skip(self))]
    pub async fn validate_connection(&self) -> Result<super::resources::User> {
        let user = self.profiles().get().await.map_err(|e| {
            warn!("Connection validation failed: {}", e);
            e
        })?;
        info!("Connected as user: {}", user.name);
        Ok(user)
    }

    /// Issue one request with credentials attached and return the raw response.
    ///
    /// A JSON `body` is sent with `Content-Type: application/json`.
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn round_trip(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        self.send(method, path, body.map(Body::Json)).await
    }

    /// Issue one multipart request with credentials attached.
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn round_trip_multipart(&self, method: Method, path: &str, form: Form) -> Result<Response> {
        self.send(method, path, Some(Body::Multipart(form))).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<Body<'_>>) -> Result<Response> {
        let url = self.url(path);
        let (auth_name, auth_value) = self.auth.header()?;

        if let Some(shared) = &self.limiter {
            shared.limiter.until_ready().await;
        }

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(auth_name, auth_value)
            .header(header::ACCEPT, "application/json");

        request = match body {
            Some(Body::Json(value)) => request.json(value),
            Some(Body::Multipart(form)) => request.multipart(form),
            None => request,
        };

        let response = request.send().await?;
        debug!(status = %response.status(), "{} {}", method, url);
        Ok(response)
    }

    /// Fail unless `response` has status `want`.
    ///
    /// On mismatch, the body is inspected for a JSON error message; the
    /// resulting error always carries the status code.
    pub async fn check_response(response: Response, want: StatusCode) -> Result<Response> {
        let status = response.status();
        if status == want {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("Error response body: {}", body);
        Err(ApiError::from_status(status, want, error_message(&body)))
    }

    /// Issue a request, check the status and read the whole body.
    pub(crate) async fn request_bytes(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        want: StatusCode,
    ) -> Result<Vec<u8>> {
        let response = self.round_trip(method, path, body).await?;
        let response = Self::check_response(response, want).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Projects of the account.
    pub fn projects(&self) -> Projects {
        Projects::new(self.clone())
    }

    /// Tickets of a project.
    pub fn tickets(&self, project_id: u64) -> Tickets {
        Tickets::new(self.clone(), project_id)
    }

    /// Milestones of a project.
    pub fn milestones(&self, project_id: u64) -> Milestones {
        Milestones::new(self.clone(), project_id)
    }

    /// Messages of a project.
    pub fn messages(&self, project_id: u64) -> Messages {
        Messages::new(self.clone(), project_id)
    }

    /// Ticket bins of a project.
    pub fn bins(&self, project_id: u64) -> Bins {
        Bins::new(self.clone(), project_id)
    }

    /// Changesets of a project.
    pub fn changesets(&self, project_id: u64) -> Changesets {
        Changesets::new(self.clone(), project_id)
    }

    /// Users of the account.
    pub fn users(&self) -> Users {
        Users::new(self.clone())
    }

    /// Profile of the authenticated user.
    pub fn profiles(&self) -> Profiles {
        Profiles::new(self.clone())
    }

    /// API token information.
    pub fn tokens(&self) -> Tokens {
        Tokens::new(self.clone())
    }

    /// Account plan.
    pub fn plans(&self) -> Plans {
        Plans::new(self.clone())
    }
}

/// Request payload accepted by [`LighthouseClient::send`].
enum Body<'a> {
    Json(&'a Value),
    Multipart(Form),
}

/// Extract a human-readable message from a Lighthouse error body.
///
/// Handles `{"errors": [[field, msg], ...]}`, `{"errors": {field: [msg]}}`,
/// `{"errors": ["msg"]}`, `{"error": "msg"}` and `{"message": "msg"}`.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;

    if let Some(errors) = json.get("errors") {
        let parts: Vec<String> = match errors {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Array(pair) => {
                        let words: Vec<&str> = pair.iter().filter_map(|v| v.as_str()).collect();
                        (!words.is_empty()).then(|| words.join(" "))
                    }
                    _ => None,
                })
                .collect(),
            Value::Object(fields) => fields
                .iter()
                .map(|(field, msgs)| match msgs {
                    Value::Array(list) => {
                        let list: Vec<&str> = list.iter().filter_map(|v| v.as_str()).collect();
                        format!("{} {}", field, list.join(", "))
                    }
                    Value::String(s) => format!("{} {}", field, s),
                    other => format!("{} {}", field, other),
                })
                .collect(),
            Value::String(s) => vec![s.clone()],
            _ => Vec::new(),
        };
        if !parts.is_empty() {
            return Some(parts.join("; "));
        }
    }

    ["error", "message"]
        .iter()
        .find_map(|key| json.get(*key).and_then(|v| v.as_str()).map(str::to_string))
}

/// Normalize the base URL by removing trailing slashes.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');

    if !url.starts_with("https://") && !url.contains("localhost") && !url.contains("127.0.0.1") {
        warn!("URL does not use HTTPS: {}. Credentials will be sent in the clear.", url);
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::TOKEN_HEADER;
    use wiremock::matchers::{body_json, header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_normalize_base_url_removes_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://acme.lighthouseapp.com///"),
            "https://acme.lighthouseapp.com"
        );
    }

    #[test]
    fn test_account_base_url() {
        let client = LighthouseClient::new("acme", Auth::token("t")).unwrap();
        assert_eq!(client.base_url(), "https://acme.lighthouseapp.com");
    }

    #[test]
    fn test_invalid_account_rejected() {
        assert!(LighthouseClient::new("", Auth::token("t")).is_err());
        assert!(LighthouseClient::new("acme.evil", Auth::token("t")).is_err());
    }

    #[test]
    fn test_url_resolution() {
        let client = LighthouseClient::with_base_url("http://localhost:1234/", Auth::token("t")).unwrap();
        assert_eq!(client.url("/projects.json"), "http://localhost:1234/projects.json");
        assert_eq!(client.url("plan.json"), "http://localhost:1234/plan.json");
        assert_eq!(
            client.url("https://cdn.example.com/a.png"),
            "https://cdn.example.com/a.png"
        );
    }

    #[test]
    fn test_error_message_pairs() {
        let body = r#"{"errors":[["title","can't be blank"],["state","is invalid"]]}"#;
        assert_eq!(
            error_message(body).as_deref(),
            Some("title can't be blank; state is invalid")
        );
    }

    #[test]
    fn test_error_message_object_and_plain() {
        assert_eq!(
            error_message(r#"{"errors":{"name":["is taken"]}}"#).as_deref(),
            Some("name is taken")
        );
        assert_eq!(error_message(r#"{"error":"Not Found"}"#).as_deref(), Some("Not Found"));
        assert_eq!(error_message("<html>oops</html>"), None);
        assert_eq!(error_message(""), None);
    }

    #[tokio::test]
    async fn test_round_trip_sends_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plan.json"))
            .and(header_is(TOKEN_HEADER, "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"plan": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("secret")).unwrap();
        let response = client.round_trip(Method::GET, "/plan.json", None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_round_trip_sends_json_body() {
        let server = MockServer::start().await;
        let payload = serde_json::json!({"project": {"name": "web"}});
        Mock::given(method("POST"))
            .and(path("/projects.json"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();
        let response = client
            .round_trip(Method::POST, "/projects.json", Some(&payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_rate_limit_zero_is_unlimited() {
        assert_eq!(RateLimit::new(0, 5), None);
        let limit = RateLimit::new(2, 0).unwrap();
        assert_eq!(limit.per_second.get(), 2);
        assert_eq!(limit.burst.get(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"projects": []})))
            .expect(4)
            .mount(&server)
            .await;

        // 20 per second with no burst: one request every 50ms after the first.
        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t"))
            .unwrap()
            .with_rate_limit(RateLimit::new(20, 1));
        let shared = client.clone();

        let started = std::time::Instant::now();
        client.round_trip(Method::GET, "/projects.json", None).await.unwrap();
        shared.round_trip(Method::GET, "/projects.json", None).await.unwrap();
        client.round_trip(Method::GET, "/projects.json", None).await.unwrap();
        shared.round_trip(Method::GET, "/projects.json", None).await.unwrap();
        assert!(
            started.elapsed() >= std::time::Duration::from_millis(140),
            "requests were not spaced: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_check_response_404_vs_500() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken.json"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "kaboom"})),
            )
            .mount(&server)
            .await;

        let client = LighthouseClient::with_base_url(&server.uri(), Auth::token("t")).unwrap();

        let missing = client.round_trip(Method::GET, "/missing.json", None).await.unwrap();
        let missing = LighthouseClient::check_response(missing, StatusCode::OK)
            .await
            .unwrap_err();
        let broken = client.round_trip(Method::GET, "/broken.json", None).await.unwrap();
        let broken = LighthouseClient::check_response(broken, StatusCode::OK)
            .await
            .unwrap_err();

        assert_eq!(missing.status(), Some(404));
        assert_eq!(broken.status(), Some(500));
        match broken {
            ApiError::UnexpectedStatus { message, .. } => assert_eq!(message.as_deref(), Some("kaboom")),
            other => panic!("Expected UnexpectedStatus, got {:?}", other),
        }
    }
}
