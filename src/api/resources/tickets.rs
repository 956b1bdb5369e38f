//! Project tickets, their version history and attachments.

use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{is_zero, null_default};
use crate::api::client::LighthouseClient;
use crate::api::envelope;
use crate::api::error::{ApiError, Result};
use crate::api::service::{Resource, ResourceService};

/// Page size used by the server when no limit is given.
pub const DEFAULT_LIMIT: u32 = 30;
/// Largest page size the server accepts.
pub const MAX_LIMIT: u32 = 100;

/// Parse a ticket number, optionally prefixed with `#`.
pub fn parse_ticket_number(number: &str) -> Result<u64> {
    let trimmed = number.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    digits
        .parse()
        .map_err(|_| ApiError::InvalidTicketNumber(number.to_string()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub id: u64,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
}

/// Wire wrapper `{"tag": {...}}` used in a ticket's `tags` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub tag: Tag,
}

/// A file attached to a ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub attachment_file_processing: bool,
    #[serde(deserialize_with = "null_default")]
    pub code: String,
    #[serde(deserialize_with = "null_default")]
    pub content_type: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub filename: String,
    #[serde(deserialize_with = "null_default")]
    pub height: u32,
    pub id: u64,
    pub project_id: u64,
    pub size: u64,
    #[serde(deserialize_with = "null_default")]
    pub uploader_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub width: u32,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
}

/// Wire wrapper `{"attachment": {...}}` used in a ticket's `attachments` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentEntry {
    pub attachment: Attachment,
}

/// A tag with its usage count, sent as a `["name", count]` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, u64)", into = "(String, u64)")]
pub struct AlphabeticalTag {
    pub tag: String,
    pub count: u64,
}

impl From<(String, u64)> for AlphabeticalTag {
    fn from((tag, count): (String, u64)) -> Self {
        Self { tag, count }
    }
}

impl From<AlphabeticalTag> for (String, u64) {
    fn from(tag: AlphabeticalTag) -> Self {
        (tag.tag, tag.count)
    }
}

/// Attributes changed by a ticket version, holding their previous values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffableAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_user: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// One entry of a ticket's history; the first is the ticket as created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketVersion {
    #[serde(deserialize_with = "null_default")]
    pub assigned_user_id: u64,
    pub attachments_count: u32,
    #[serde(deserialize_with = "null_default")]
    pub body: String,
    #[serde(deserialize_with = "null_default")]
    pub body_html: String,
    pub closed: bool,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub creator_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diffable_attributes: Option<DiffableAttributes>,
    #[serde(deserialize_with = "null_default")]
    pub importance: i64,
    #[serde(deserialize_with = "null_default")]
    pub milestone_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub milestone_order: i64,
    pub number: u64,
    #[serde(deserialize_with = "null_default")]
    pub permalink: String,
    pub project_id: u64,
    pub spam: bool,
    #[serde(deserialize_with = "null_default")]
    pub state: String,
    #[serde(deserialize_with = "null_default")]
    pub tag: String,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub user_id: u64,
    pub version: u32,
    #[serde(deserialize_with = "null_default")]
    pub watchers_ids: Vec<u64>,
    #[serde(deserialize_with = "null_default")]
    pub user_name: String,
    #[serde(deserialize_with = "null_default")]
    pub creator_name: String,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
    #[serde(deserialize_with = "null_default")]
    pub priority: i64,
    #[serde(deserialize_with = "null_default")]
    pub state_color: String,
}

/// A ticket, addressed by its per-project number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Ticket {
    #[serde(deserialize_with = "null_default")]
    pub assigned_user_id: u64,
    pub attachments_count: u32,
    #[serde(deserialize_with = "null_default")]
    pub body: String,
    #[serde(deserialize_with = "null_default")]
    pub body_html: String,
    pub closed: bool,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub creator_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub importance: i64,
    pub milestone_due_on: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub milestone_id: u64,
    #[serde(deserialize_with = "null_default")]
    pub milestone_order: i64,
    pub number: u64,
    #[serde(deserialize_with = "null_default")]
    pub permalink: String,
    pub project_id: u64,
    pub spam: bool,
    #[serde(deserialize_with = "null_default")]
    pub state: String,
    #[serde(deserialize_with = "null_default")]
    pub tag: String,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub user_id: u64,
    pub version: u32,
    #[serde(deserialize_with = "null_default")]
    pub watchers_ids: Vec<u64>,
    #[serde(deserialize_with = "null_default")]
    pub user_name: String,
    #[serde(deserialize_with = "null_default")]
    pub creator_name: String,
    #[serde(deserialize_with = "null_default")]
    pub assigned_user_name: String,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
    #[serde(deserialize_with = "null_default")]
    pub milestone_title: String,
    #[serde(deserialize_with = "null_default")]
    pub priority: i64,
    #[serde(deserialize_with = "null_default")]
    pub importance_name: String,
    #[serde(deserialize_with = "null_default")]
    pub original_body: String,
    #[serde(deserialize_with = "null_default")]
    pub latest_body: String,
    #[serde(deserialize_with = "null_default")]
    pub original_body_html: String,
    #[serde(deserialize_with = "null_default")]
    pub state_color: String,
    #[serde(deserialize_with = "null_default")]
    pub tags: Vec<TagEntry>,
    #[serde(deserialize_with = "null_default")]
    pub alphabetical_tags: Vec<AlphabeticalTag>,
    #[serde(deserialize_with = "null_default")]
    pub versions: Vec<TicketVersion>,
    #[serde(deserialize_with = "null_default")]
    pub attachments: Vec<AttachmentEntry>,
}

impl Ticket {
    /// Names of the ticket's tags, in server order.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|entry| entry.tag.name.as_str())
    }

    /// The ticket's attachments without their wire wrappers.
    pub fn attachment_list(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().map(|entry| &entry.attachment)
    }
}

impl Resource for Ticket {
    const KEY: &'static str = "ticket";
    const COLLECTION_KEY: &'static str = "tickets";
    const KIND: &'static str = "ticket";
}

/// The fields of a ticket sent on create.
///
/// Unset state, assignee and milestone are left out so the server applies
/// the project defaults. `notify_all` and `multiple_watchers` control who
/// is notified of the change; they are not part of the ticket record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TicketView {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub assigned_user_id: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub milestone_id: u64,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_all: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub multiple_watchers: Vec<u64>,
}

impl From<&Ticket> for TicketView {
    fn from(ticket: &Ticket) -> Self {
        TicketUpdateView::from(ticket).into()
    }
}

impl From<TicketUpdateView> for TicketView {
    fn from(view: TicketUpdateView) -> Self {
        Self {
            title: view.title,
            body: view.body,
            state: view.state,
            assigned_user_id: view.assigned_user_id,
            milestone_id: view.milestone_id,
            tag: view.tag,
            notify_all: view.notify_all,
            multiple_watchers: view.multiple_watchers,
        }
    }
}

/// The fields of a ticket sent on update.
///
/// Every ticket field is sent, so an assignee or milestone of 0 clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TicketUpdateView {
    pub title: String,
    pub body: String,
    pub state: String,
    pub assigned_user_id: u64,
    pub milestone_id: u64,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_all: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub multiple_watchers: Vec<u64>,
}

impl From<&Ticket> for TicketUpdateView {
    fn from(ticket: &Ticket) -> Self {
        Self {
            title: ticket.title.clone(),
            body: ticket.body.clone(),
            state: ticket.state.clone(),
            assigned_user_id: ticket.assigned_user_id,
            milestone_id: ticket.milestone_id,
            tag: ticket.tag.clone(),
            notify_all: None,
            multiple_watchers: Vec::new(),
        }
    }
}

/// Options for listing tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketListOptions {
    /// Search query, e.g. `state:open responsible:me`. Sorted by last
    /// update by default.
    pub query: String,
    /// Tickets per page; 0 uses [`DEFAULT_LIMIT`], at most [`MAX_LIMIT`].
    pub limit: u32,
    /// Page to return; 0 means the first.
    pub page: u32,
}

impl TicketListOptions {
    fn to_query(&self, with_page: bool) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if !self.query.is_empty() {
            query.push(("q", self.query.clone()));
        }
        if self.limit > 0 {
            query.push(("limit", self.limit.min(MAX_LIMIT).to_string()));
        }
        if with_page && self.page > 0 {
            query.push(("page", self.page.to_string()));
        }
        query
    }
}

/// Options for a keyword bulk edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkEditOptions {
    /// Any ticket search query; `all` or a single number also work.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub query: String,
    /// Keyword commands applied to every matching ticket.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command: String,
    /// Token of a user with access to the destination project, required
    /// when the command moves tickets between projects or accounts.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub migration_token: String,
}

/// Access to `/projects/<id>/tickets`.
#[derive(Debug, Clone)]
pub struct Tickets {
    service: ResourceService<Ticket>,
    project_id: u64,
}

impl Tickets {
    pub(crate) fn new(client: LighthouseClient, project_id: u64) -> Self {
        Self {
            service: ResourceService::new(client, format!("/projects/{}/tickets", project_id)),
            project_id,
        }
    }

    pub async fn list(&self, opts: &TicketListOptions) -> Result<Vec<Ticket>> {
        self.service.list(opts.to_query(true)).await
    }

    /// Every ticket matching `opts`, page by page. `opts.page` is ignored.
    pub async fn list_all(&self, opts: &TicketListOptions) -> Result<Vec<Ticket>> {
        self.service.list_all(opts.to_query(false)).await
    }

    /// Get a ticket by number string, e.g. `12` or `#12`.
    pub async fn get(&self, number: &str) -> Result<Ticket> {
        self.get_by_number(parse_ticket_number(number)?).await
    }

    pub async fn get_by_number(&self, number: u64) -> Result<Ticket> {
        self.service.get_by_key(&number.to_string()).await
    }

    pub async fn new_template(&self) -> Result<Ticket> {
        self.service.new_template().await
    }

    pub async fn create(&self, ticket: &Ticket) -> Result<Ticket> {
        self.create_view(&TicketView::from(ticket)).await
    }

    /// Create a ticket from an explicit view, e.g. to set notification flags.
    pub async fn create_view(&self, view: &TicketView) -> Result<Ticket> {
        self.service.create(view).await
    }

    pub async fn update(&self, ticket: &Ticket) -> Result<()> {
        self.update_view(ticket.number, &TicketUpdateView::from(ticket)).await
    }

    pub async fn update_view(&self, number: u64, view: &TicketUpdateView) -> Result<()> {
        self.service.update(&number.to_string(), view).await
    }

    /// Delete a ticket by number string, e.g. `12` or `#12`.
    pub async fn delete(&self, number: &str) -> Result<()> {
        self.delete_by_number(parse_ticket_number(number)?).await
    }

    pub async fn delete_by_number(&self, number: u64) -> Result<()> {
        self.service.delete_by_key(&number.to_string()).await
    }

    /// Download an attachment from its absolute URL.
    #[instrument(skip(self, attachment), fields(filename = %attachment.filename))]
    pub async fn get_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        let response = self
            .service
            .client()
            .round_trip(Method::GET, &attachment.url, None)
            .await?;
        let response = LighthouseClient::check_response(response, StatusCode::OK).await?;
        let bytes = response.bytes().await?;
        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    /// Attach a file to a ticket.
    ///
    /// Sends a multipart PUT with the file under `ticket[attachment][]` and
    /// the ticket update envelope as a `json` part.
    #[instrument(skip(self, ticket, data), fields(number = ticket.number))]
    pub async fn add_attachment(&self, ticket: &Ticket, filename: &str, data: Vec<u8>) -> Result<()> {
        let base_name = std::path::Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(filename)
            .to_string();
        let payload = envelope::wrap(Ticket::KEY, &TicketUpdateView::from(ticket))?;

        let form = Form::new()
            .part("ticket[attachment][]", Part::bytes(data).file_name(base_name))
            .part(
                "json",
                Part::text(payload.to_string()).mime_str("application/json")?,
            );

        let path = self.service.member_path(&ticket.number.to_string());
        let response = self
            .service
            .client()
            .round_trip_multipart(Method::PUT, &path, form)
            .await?;
        LighthouseClient::check_response(response, StatusCode::OK).await?;
        Ok(())
    }

    /// Apply keyword commands to every ticket matching a query.
    pub async fn bulk_edit(&self, opts: &BulkEditOptions) -> Result<()> {
        let body = serde_json::to_value(opts)?;
        self.service
            .client()
            .request_bytes(
                Method::POST,
                &format!("/projects/{}/bulk_edit.json", self.project_id),
                Some(&body),
                StatusCode::OK,
            )
            .await?;
        Ok(())
    }
}
