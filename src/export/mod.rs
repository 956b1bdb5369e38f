//! Account export into a `.tar.gz` archive.
//!
//! Layout, under `<account>/`:
//!
//! ```text
//! plan.json
//! profile.json
//! users/<id-name>/{user.json,memberships.json}
//! projects/<id-permalink>/
//!     project.json
//!     memberships.json
//!     bins/<id-name.json>
//!     changesets/<revision.json>
//!     messages/<id-permalink.json>
//!     milestones/<id-permalink.json>
//!     tickets/<number-permalink>/{ticket.json,<attachments>}
//! ```
//!
//! Every path component derived from server data goes through [`safe_name`].

mod archive;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use archive::ArchiveWriter;

use crate::api::resources::{Project, TicketListOptions, MAX_LIMIT};
use crate::api::{ApiError, LighthouseClient};

/// Longest path component produced by [`safe_name`].
const SAFE_NAME_MAX: usize = 20;

static UNSAFE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^-a-z0-9_]+").expect("Invalid regex"));
static DASH_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("Invalid regex"));

/// Errors that abort an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to write archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Turn arbitrary text into a short filesystem-safe path component.
///
/// Truncates to 20 characters, lowercases, trims, replaces runs of
/// characters outside `[-a-z0-9_]` with `-`, collapses `-` runs and drops
/// trailing `-`.
pub fn safe_name(name: &str) -> String {
    let truncated: String = name.chars().take(SAFE_NAME_MAX).collect();
    let lowered = truncated.trim().to_lowercase();
    let replaced = UNSAFE_RUN.replace_all(&lowered, "-");
    let collapsed = DASH_RUN.replace_all(&replaced, "-");
    collapsed.trim_end_matches('-').to_string()
}

/// Archive file name, `<account>_<YYYY-MM-DD>.tar.gz`.
pub fn archive_file_name(account: &str, date: NaiveDate) -> String {
    format!("{}_{}.tar.gz", account, date.format("%Y-%m-%d"))
}

/// Counts of what an export wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub projects: usize,
    pub tickets: usize,
    pub attachments: usize,
    pub users: usize,
}

/// Walks an account through the API and writes it into an archive.
pub struct Exporter {
    client: LighthouseClient,
    account: String,
    attachments: bool,
}

impl Exporter {
    pub fn new(client: LighthouseClient, account: impl Into<String>) -> Self {
        Self {
            client,
            account: account.into(),
            attachments: false,
        }
    }

    /// Also download every ticket attachment.
    pub fn with_attachments(mut self, attachments: bool) -> Self {
        self.attachments = attachments;
        self
    }

    /// Export into `<output_dir>/<account>_<today>.tar.gz` and return its path.
    pub async fn export_to_dir(&self, output_dir: &Path) -> Result<(PathBuf, ExportSummary)> {
        let name = archive_file_name(&self.account, chrono::Local::now().date_naive());
        let path = output_dir.join(name);
        info!(path = %path.display(), "Writing export file");

        let file = File::create(&path)?;
        let mut archive = ArchiveWriter::new(BufWriter::new(file));
        let summary = self.write(&mut archive).await?;
        archive.finish()?.flush()?;

        Ok((path, summary))
    }

    /// Write the whole account into `archive`. The caller finishes it.
    #[instrument(skip_all, fields(account = %self.account))]
    pub async fn write<W: Write>(&self, archive: &mut ArchiveWriter<W>) -> Result<ExportSummary> {
        let base = self.account.clone();
        let mut summary = ExportSummary::default();
        archive.write_dir(&base)?;

        // Only the account owner may read the plan.
        match self.client.plans().get().await {
            Ok(plan) => archive.write_json(&format!("{}/plan.json", base), &plan)?,
            Err(e) => warn!("Skipping plan: {}", e),
        }
        match self.client.profiles().get().await {
            Ok(profile) => archive.write_json(&format!("{}/profile.json", base), &profile)?,
            Err(e) => warn!("Skipping profile: {}", e),
        }

        let projects = self.client.projects().list().await?;
        let mut members: BTreeMap<u64, String> = BTreeMap::new();

        let projects_base = format!("{}/projects", base);
        archive.write_dir(&projects_base)?;
        for project in &projects {
            let project_members = self.write_project(archive, &projects_base, project, &mut summary).await?;
            members.extend(project_members);
        }
        summary.projects = projects.len();

        let users_base = format!("{}/users", base);
        archive.write_dir(&users_base)?;
        for (id, name) in &members {
            let user_base = format!("{}/{}", users_base, safe_name(&format!("{}-{}", id, name)));
            debug!(user_id = id, "Exporting user");
            let user = self.client.users().get(*id).await?;
            let memberships = self.client.users().memberships(*id).await?;
            archive.write_dir(&user_base)?;
            archive.write_json(&format!("{}/user.json", user_base), &user)?;
            archive.write_json(&format!("{}/memberships.json", user_base), &memberships)?;
        }
        summary.users = members.len();

        info!(
            projects = summary.projects,
            tickets = summary.tickets,
            attachments = summary.attachments,
            users = summary.users,
            "Export complete"
        );
        Ok(summary)
    }

    /// Write one project; returns the `(id, name)` of its members.
    async fn write_project<W: Write>(
        &self,
        archive: &mut ArchiveWriter<W>,
        projects_base: &str,
        project: &Project,
        summary: &mut ExportSummary,
    ) -> Result<Vec<(u64, String)>> {
        info!(project = %project.name, "Exporting project");
        let base = format!(
            "{}/{}",
            projects_base,
            safe_name(&format!("{}-{}", project.id, project.permalink))
        );
        archive.write_dir(&base)?;
        archive.write_json(&format!("{}/project.json", base), project)?;

        let memberships = self.client.projects().memberships_by_id(project.id).await?;
        archive.write_json(&format!("{}/memberships.json", base), &memberships)?;
        let members = memberships
            .iter()
            .map(|m| {
                let name = m.user.as_ref().map(|u| u.name.clone()).unwrap_or_default();
                (m.user_id, name)
            })
            .filter(|(id, _)| *id != 0)
            .collect();

        let dir = format!("{}/bins", base);
        archive.write_dir(&dir)?;
        for bin in self.client.bins(project.id).list().await? {
            let name = safe_name(&format!("{}-{}.json", bin.id, bin.name));
            archive.write_json(&format!("{}/{}", dir, name), &bin)?;
        }

        let dir = format!("{}/changesets", base);
        archive.write_dir(&dir)?;
        for changeset in self.client.changesets(project.id).list().await? {
            let name = safe_name(&format!("{}.json", changeset.revision));
            archive.write_json(&format!("{}/{}", dir, name), &changeset)?;
        }

        let dir = format!("{}/messages", base);
        archive.write_dir(&dir)?;
        for message in self.client.messages(project.id).list().await? {
            let name = safe_name(&format!("{}-{}.json", message.id, message.permalink));
            archive.write_json(&format!("{}/{}", dir, name), &message)?;
        }

        let dir = format!("{}/milestones", base);
        archive.write_dir(&dir)?;
        for milestone in self.client.milestones(project.id).list_all().await? {
            let name = safe_name(&format!("{}-{}.json", milestone.id, milestone.permalink));
            archive.write_json(&format!("{}/{}", dir, name), &milestone)?;
        }

        let dir = format!("{}/tickets", base);
        archive.write_dir(&dir)?;
        let tickets = self.client.tickets(project.id);
        let mut opts = TicketListOptions {
            limit: MAX_LIMIT,
            ..Default::default()
        };
        for page in 1.. {
            opts.page = page;
            let batch = tickets.list(&opts).await?;
            if batch.is_empty() {
                break;
            }
            for ticket in &batch {
                let ticket_base = format!(
                    "{}/{}",
                    dir,
                    safe_name(&format!("{}-{}", ticket.number, ticket.permalink))
                );
                archive.write_dir(&ticket_base)?;
                archive.write_json(&format!("{}/ticket.json", ticket_base), ticket)?;
                summary.tickets += 1;

                if !self.attachments {
                    continue;
                }
                for attachment in ticket.attachment_list() {
                    let data = tickets.get_attachment(attachment).await?;
                    let file_name = Path::new(&attachment.filename)
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("attachment");
                    archive.write_file(&format!("{}/{}", ticket_base, file_name), &data)?;
                    summary.attachments += 1;
                }
            }
        }

        Ok(members)
    }
}
