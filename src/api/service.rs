//! Generic CRUD service shared by every Lighthouse resource.
//!
//! A resource lives under a base path (`/projects`, `/projects/7/tickets`,
//! ...). The collection is `<base>.json`, a member is `<base>/<key>.json`.
//! Bodies are wrapped in the resource's envelope key.

use std::marker::PhantomData;

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use super::client::LighthouseClient;
use super::envelope;
use super::error::{ApiError, Result};
use super::pagination::collect_pages;

/// A Lighthouse resource with its JSON envelope keys.
pub trait Resource: DeserializeOwned {
    /// Singular envelope key, e.g. `ticket_bin`.
    const KEY: &'static str;
    /// Collection envelope key, e.g. `ticket_bins`.
    const COLLECTION_KEY: &'static str;
    /// Human-readable kind used in lookup errors.
    const KIND: &'static str;
}

/// A resource addressable by integer ID or by a case-insensitive name/title.
pub trait Named: Resource {
    /// Whether a name lookup must walk every page of the collection.
    const PAGED_LOOKUP: bool = false;

    /// The numeric identifier used in member paths.
    fn id(&self) -> u64;

    /// The name or title matched by lookups.
    fn name(&self) -> &str;
}

/// Parse an identifier that may be an integer ID or a name.
pub fn parse_id(id_or_name: &str) -> Option<u64> {
    id_or_name.trim().parse().ok()
}

/// Find the first item whose name matches `name` case-insensitively.
pub fn find_by_name<R: Named>(items: Vec<R>, name: &str) -> Result<R> {
    let lower = name.to_lowercase();
    items
        .into_iter()
        .find(|item| item.name().to_lowercase() == lower)
        .ok_or_else(|| ApiError::NotFound(format!("no such {} {:?}", R::KIND, name)))
}

/// CRUD operations for one resource kind under one base path.
#[derive(Debug, Clone)]
pub struct ResourceService<R> {
    client: LighthouseClient,
    base_path: String,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Resource> ResourceService<R> {
    /// Create a service rooted at `base_path` (no trailing `.json`).
    pub fn new(client: LighthouseClient, base_path: impl Into<String>) -> Self {
        Self {
            client,
            base_path: base_path.into(),
            _marker: PhantomData,
        }
    }

    /// The underlying transport.
    pub fn client(&self) -> &LighthouseClient {
        &self.client
    }

    /// The base path of this resource.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Path of the collection, `<base>.json`.
    pub fn collection_path(&self) -> String {
        format!("{}.json", self.base_path)
    }

    /// Path of a member, `<base>/<key>.json`.
    pub fn member_path(&self, key: &str) -> String {
        format!("{}/{}.json", self.base_path, key)
    }

    /// Path of a member sub-resource, `<base>/<key>/<sub>.json`.
    pub fn sub_path(&self, key: &str, sub: &str) -> String {
        format!("{}/{}/{}.json", self.base_path, key, sub)
    }

    /// GET the collection with optional query parameters and flatten it.
    #[instrument(skip(self), fields(kind = R::KIND))]
    pub async fn list(&self, query: Vec<(&'static str, String)>) -> Result<Vec<R>> {
        let path = with_query(&self.collection_path(), &query);
        let body = self
            .client
            .request_bytes(Method::GET, &path, None, StatusCode::OK)
            .await?;
        let items = envelope::unwrap_many(R::COLLECTION_KEY, R::KEY, &body)?;
        debug!("Listed {} {}", items.len(), R::COLLECTION_KEY);
        Ok(items)
    }

    /// GET every page of the collection, stopping at the first empty page.
    ///
    /// `query` must not contain `page`; it is added per request.
    pub async fn list_all(&self, query: Vec<(&'static str, String)>) -> Result<Vec<R>> {
        collect_pages(|page| {
            let mut query = query.clone();
            query.push(("page", page.to_string()));
            self.list(query)
        })
        .await
    }

    /// GET a member by its path key (ID, number, revision, `new`).
    #[instrument(skip(self), fields(kind = R::KIND))]
    pub async fn get_by_key(&self, key: &str) -> Result<R> {
        let body = self
            .client
            .request_bytes(Method::GET, &self.member_path(key), None, StatusCode::OK)
            .await?;
        envelope::unwrap_one(R::KEY, &body)
    }

    /// GET the server's blank template for a new member.
    pub async fn new_template(&self) -> Result<R> {
        self.get_by_key("new").await
    }

    /// POST a create view and decode the created record. Expects 201.
    #[instrument(skip(self, view), fields(kind = R::KIND))]
    pub async fn create<V: Serialize>(&self, view: &V) -> Result<R> {
        let payload = envelope::wrap(R::KEY, view)?;
        let body = self
            .client
            .request_bytes(
                Method::POST,
                &self.collection_path(),
                Some(&payload),
                StatusCode::CREATED,
            )
            .await?;
        envelope::unwrap_one(R::KEY, &body)
    }

    /// PUT an update view to a member. Expects 200; the body is ignored.
    #[instrument(skip(self, view), fields(kind = R::KIND))]
    pub async fn update<V: Serialize>(&self, key: &str, view: &V) -> Result<()> {
        let payload = envelope::wrap(R::KEY, view)?;
        self.client
            .request_bytes(Method::PUT, &self.member_path(key), Some(&payload), StatusCode::OK)
            .await?;
        Ok(())
    }

    /// DELETE a member by path key. Expects 200.
    #[instrument(skip(self), fields(kind = R::KIND))]
    pub async fn delete_by_key(&self, key: &str) -> Result<()> {
        self.client
            .request_bytes(Method::DELETE, &self.member_path(key), None, StatusCode::OK)
            .await?;
        Ok(())
    }

    /// PUT to a body-less member action such as `close` or `open`.
    pub async fn put_action(&self, key: &str, action: &str) -> Result<()> {
        self.client
            .request_bytes(Method::PUT, &self.sub_path(key, action), None, StatusCode::OK)
            .await?;
        Ok(())
    }

    /// POST a view wrapped in `envelope_key` to `<base>/<key>/<sub>.json`,
    /// expecting 201, and decode the returned parent record.
    pub async fn create_nested<V: Serialize>(
        &self,
        key: &str,
        sub: &str,
        envelope_key: &str,
        view: &V,
    ) -> Result<R> {
        let payload = envelope::wrap(envelope_key, view)?;
        let body = self
            .client
            .request_bytes(
                Method::POST,
                &self.sub_path(key, sub),
                Some(&payload),
                StatusCode::CREATED,
            )
            .await?;
        envelope::unwrap_one(R::KEY, &body)
    }

    /// GET a member sub-collection, e.g. project memberships.
    pub async fn get_sub_collection<T: DeserializeOwned>(
        &self,
        key: &str,
        sub: &str,
        item_key: &str,
    ) -> Result<Vec<T>> {
        let body = self
            .client
            .request_bytes(Method::GET, &self.sub_path(key, sub), None, StatusCode::OK)
            .await?;
        envelope::unwrap_many(sub, item_key, &body)
    }
}

impl<R: Named> ResourceService<R> {
    /// Get by integer ID, or by case-insensitive name when the identifier is
    /// not an integer.
    pub async fn get(&self, id_or_name: &str) -> Result<R> {
        match parse_id(id_or_name) {
            Some(id) => self.get_by_key(&id.to_string()).await,
            None => self.find(id_or_name).await,
        }
    }

    /// List (all pages when the resource requires it) and match by name.
    pub async fn find(&self, name: &str) -> Result<R> {
        let items = if R::PAGED_LOOKUP {
            self.list_all(Vec::new()).await?
        } else {
            self.list(Vec::new()).await?
        };
        find_by_name(items, name)
    }

    /// Resolve an ID-or-name to a numeric ID, listing only for names.
    pub async fn resolve_id(&self, id_or_name: &str) -> Result<u64> {
        match parse_id(id_or_name) {
            Some(id) => Ok(id),
            None => Ok(self.find(id_or_name).await?.id()),
        }
    }

    /// Delete by ID, or by name via list + case-insensitive match.
    pub async fn delete(&self, id_or_name: &str) -> Result<()> {
        let id = self.resolve_id(id_or_name).await?;
        self.delete_by_key(&id.to_string()).await
    }
}

/// Append URL-encoded query parameters to a path.
pub(crate) fn with_query(path: &str, query: &[(&'static str, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let encoded: Vec<String> = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    format!("{}?{}", path, encoded.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Thing {
        id: u64,
        name: String,
    }

    impl Resource for Thing {
        const KEY: &'static str = "thing";
        const COLLECTION_KEY: &'static str = "things";
        const KIND: &'static str = "thing";
    }

    impl Named for Thing {
        fn id(&self) -> u64 {
            self.id
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn things() -> Vec<Thing> {
        vec![
            Thing { id: 1, name: "Alpha".to_string() },
            Thing { id: 2, name: "Beta".to_string() },
        ]
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42"), Some(42));
        assert_eq!(parse_id(" 7 "), Some(7));
        assert_eq!(parse_id("web"), None);
        assert_eq!(parse_id("-3"), None);
    }

    #[test]
    fn test_find_by_name_is_case_insensitive() {
        let found = find_by_name(things(), "bEtA").unwrap();
        assert_eq!(found.id, 2);
    }

    #[test]
    fn test_find_by_name_miss() {
        let err = find_by_name(things(), "gamma").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.to_string(), "no such thing \"gamma\"");
    }

    #[test]
    fn test_with_query_encodes_values() {
        assert_eq!(with_query("/t.json", &[]), "/t.json");
        assert_eq!(
            with_query("/t.json", &[("q", "state:open tagged:ui".to_string()), ("page", "2".to_string())]),
            "/t.json?q=state%3Aopen%20tagged%3Aui&page=2"
        );
    }
}
