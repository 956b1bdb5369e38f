//! Migration of a Lighthouse export into GitLab.
//!
//! The migrator replays an [`ExportArchive`] against the GitLab API in a fixed
//! order: users, groups, then per project its labels, members, milestones and
//! tickets with their full history. Failures on individual items are logged
//! and skipped; failing to read inputs or to reach GitLab at all is fatal.

pub mod archive;
pub mod gitlab;
pub mod mapping;
pub mod state;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use archive::{ExportArchive, ExportedAttachment, ExportedProject, ExportedTicket, ExportedUser};
pub use gitlab::GitLabClient;
pub use state::MigrationState;

use gitlab::{AddMemberOptions, CreateGroupOptions, GitLabUser, ProjectFile, Visibility, MAINTAINER_ACCESS};

/// Errors that stop a migration.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("invalid export archive: {0}")]
    Archive(String),

    #[error("GitLab API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidOptions(String),
}

pub type Result<T> = std::result::Result<T, MigrateError>;

/// Default password for created users.
pub const DEFAULT_PASSWORD: &str = "changeme";
/// Default scope of state labels.
pub const DEFAULT_STATE_KEY: &str = "lh";

/// Settings of one migration run.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// JSON file mapping Lighthouse user IDs to GitLab users.
    pub users_path: PathBuf,
    /// Optional JSON file of groups to create.
    pub groups_path: Option<PathBuf>,
    /// Password for every created user.
    pub password: String,
    /// Only migrate the project with this name.
    pub project: Option<String>,
    /// Only migrate milestones with this title.
    pub milestone: Option<String>,
    /// Only migrate the ticket with this number; 0 migrates all.
    pub number: u64,
    /// Scope of state labels, `<key>::<state>`.
    pub state_key: String,
}

impl MigrateOptions {
    pub fn new(users_path: impl Into<PathBuf>) -> Self {
        Self {
            users_path: users_path.into(),
            groups_path: None,
            password: DEFAULT_PASSWORD.to_string(),
            project: None,
            milestone: None,
            number: 0,
            state_key: DEFAULT_STATE_KEY.to_string(),
        }
    }

    /// Reject empty required settings.
    pub fn validate(&self) -> Result<()> {
        if self.users_path.as_os_str().is_empty() {
            return Err(MigrateError::InvalidOptions("a users mapping file is required".into()));
        }
        if self.password.is_empty() {
            return Err(MigrateError::InvalidOptions("the user password must not be empty".into()));
        }
        if self.state_key.is_empty() {
            return Err(MigrateError::InvalidOptions("the state label key must not be empty".into()));
        }
        Ok(())
    }

    fn wants_project(&self, name: &str) -> bool {
        self.project.as_deref().map_or(true, |p| p.eq_ignore_ascii_case(name))
    }

    fn wants_milestone(&self, title: &str) -> bool {
        self.milestone.as_deref().map_or(true, |m| m.eq_ignore_ascii_case(title))
    }

    fn wants_ticket(&self, number: u64) -> bool {
        self.number == 0 || self.number == number
    }
}

/// An entry of the groups file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GroupSpec {
    pub name: String,
    pub path: String,
    pub description: String,
    /// Lighthouse project names placed in the group.
    pub projects: Vec<String>,
    /// Lighthouse user names added as maintainers.
    pub members: Vec<String>,
}

/// Counts of what a run created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub users: usize,
    pub groups: usize,
    pub projects: usize,
    pub milestones: usize,
    pub issues: usize,
    pub warnings: usize,
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .map_err(|e| MigrateError::InvalidOptions(format!("cannot open {}: {}", path.display(), e)))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Load the users mapping file, `{"<lighthouse id>": {gitlab user}}`.
pub fn load_user_mapping(path: &Path) -> Result<HashMap<u64, GitLabUser>> {
    let raw: HashMap<String, GitLabUser> = read_json_file(path)?;
    raw.into_iter()
        .map(|(id, user)| {
            id.trim()
                .parse()
                .map(|id| (id, user))
                .map_err(|_| MigrateError::InvalidOptions(format!("invalid Lighthouse user ID {:?} in {}", id, path.display())))
        })
        .collect()
}

pub fn load_groups(path: &Path) -> Result<Vec<GroupSpec>> {
    read_json_file(path)
}

/// Drives one migration run.
pub struct Migrator {
    gitlab: GitLabClient,
    options: MigrateOptions,
    state: MigrationState,
    summary: MigrationSummary,
}

impl Migrator {
    pub fn new(gitlab: GitLabClient, options: MigrateOptions) -> Self {
        Self {
            gitlab,
            options,
            state: MigrationState::default(),
            summary: MigrationSummary::default(),
        }
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    fn warn(&mut self, what: std::fmt::Arguments<'_>, err: &MigrateError) {
        warn!("{}: {}", what, err);
        self.summary.warnings += 1;
    }

    /// Delete every group, every project and every user except `root` and
    /// the owner of the API token.
    #[instrument(skip(gitlab))]
    pub async fn delete_all(gitlab: &GitLabClient) -> Result<()> {
        let me = gitlab.current_user().await?;

        for group in gitlab.list_groups().await? {
            info!("Deleting group {}", group.name);
            gitlab.delete_group(group.id).await?;
        }
        for project in gitlab.list_projects().await? {
            info!("Deleting project {}", project.name);
            gitlab.delete_project(project.id).await?;
        }
        for user in gitlab.list_users().await? {
            if user.username == "root" || user.username == me.username {
                continue;
            }
            info!("Deleting user {}", user.username);
            gitlab.delete_user(user.id).await?;
        }
        Ok(())
    }

    /// Migrate everything in `archive` that passes the filters.
    #[instrument(skip_all)]
    pub async fn run(mut self, archive: &ExportArchive) -> Result<MigrationSummary> {
        self.options.validate()?;

        let me = self.gitlab.current_user().await?;
        info!("Migrating as GitLab user {}", me.username);

        self.state = MigrationState::with_user_mapping(load_user_mapping(&self.options.users_path)?);
        let groups = match &self.options.groups_path {
            Some(path) => load_groups(path)?,
            None => Vec::new(),
        };

        self.migrate_users(&archive.users).await?;
        self.migrate_groups(&groups).await;

        for project in &archive.projects {
            if !self.options.wants_project(&project.project.name) {
                continue;
            }
            self.migrate_project(project).await;
        }

        info!(
            users = self.summary.users,
            groups = self.summary.groups,
            projects = self.summary.projects,
            milestones = self.summary.milestones,
            issues = self.summary.issues,
            warnings = self.summary.warnings,
            "Migration complete"
        );
        Ok(self.summary)
    }

    async fn migrate_users(&mut self, users: &[ExportedUser]) -> Result<()> {
        for exported in users {
            let lh = &exported.user;
            let Some(opts) = mapping::create_user_options(lh.id, &self.state, &self.options.password) else {
                continue;
            };
            info!("Creating user {}", opts.username);
            match self.gitlab.create_user(&opts).await {
                Ok(user) => {
                    self.state.map_user(lh.id, &lh.name, user);
                    self.summary.users += 1;
                }
                Err(e) => self.warn(format_args!("Unable to create user {}", lh.name), &e),
            }
        }

        // Users that already existed are matched by display name.
        for user in self.gitlab.list_users().await? {
            if let Some(exported) = users.iter().find(|u| u.user.name == user.name) {
                debug!("Matched existing user {} to {}", user.username, exported.user.name);
                self.state.map_user(exported.user.id, &exported.user.name, user);
            }
        }
        Ok(())
    }

    async fn migrate_groups(&mut self, groups: &[GroupSpec]) {
        for entry in groups {
            info!("Creating group {}", entry.name);
            let opts = CreateGroupOptions {
                name: entry.name.clone(),
                path: entry.path.clone(),
                description: entry.description.clone(),
                visibility: Visibility::Private,
            };
            let group = match self.gitlab.create_group(&opts).await {
                Ok(group) => group,
                Err(e) => {
                    self.warn(format_args!("Unable to create group {}", entry.name), &e);
                    continue;
                }
            };
            self.summary.groups += 1;

            for project in &entry.projects {
                self.state.map_group(mapping::sanitize_project_name(project), group.clone());
            }
            for member in &entry.members {
                let Some(user) = self.state.user_by_name(member) else {
                    continue;
                };
                let opts = AddMemberOptions {
                    user_id: user.id,
                    access_level: MAINTAINER_ACCESS,
                };
                if let Err(e) = self.gitlab.add_group_member(group.id, &opts).await {
                    self.warn(format_args!("Unable to add {} to group {}", member, entry.name), &e);
                }
            }
        }
    }

    async fn migrate_project(&mut self, exported: &ExportedProject) {
        let lh = &exported.project;
        let opts = mapping::create_project_options(lh, &self.state);
        info!("Creating project {}", opts.name);
        let project = match self.gitlab.create_project(&opts).await {
            Ok(project) => project,
            Err(e) => {
                self.warn(format_args!("Unable to create project {}", lh.name), &e);
                return;
            }
        };
        self.state.map_project(lh.id, project.clone());
        self.summary.projects += 1;

        for label in mapping::project_labels(lh, &self.options.state_key) {
            if let Err(e) = self.gitlab.create_label(project.id, &label).await {
                self.warn(format_args!("Unable to create label {} in project {}", label.name, lh.name), &e);
            }
        }

        for membership in &exported.memberships {
            let Some(opts) = mapping::member_options(membership.user_id, &self.state) else {
                continue;
            };
            if let Err(e) = self.gitlab.add_project_member(project.id, &opts).await {
                self.warn(
                    format_args!("Unable to add user {} to project {}", membership.user_id, lh.name),
                    &e,
                );
            }
        }

        for milestone in &exported.milestones {
            if self.options.wants_milestone(&milestone.title) {
                self.migrate_milestone(project.id, &lh.name, milestone).await;
            }
        }

        for ticket in &exported.tickets {
            if self.options.wants_ticket(ticket.ticket.number) {
                self.migrate_ticket(project.id, &lh.name, ticket).await;
            }
        }
    }

    async fn migrate_milestone(
        &mut self,
        project_id: u64,
        project_name: &str,
        milestone: &crate::api::resources::Milestone,
    ) {
        let sudo = self.state.sudo_for_name(&milestone.user_name);
        let opts = mapping::create_milestone_options(milestone);
        info!("Creating milestone {}", opts.title);
        let created = match self.gitlab.create_milestone(project_id, &opts, sudo).await {
            Ok(created) => created,
            Err(e) => {
                self.warn(
                    format_args!("Unable to create milestone {} in project {}", milestone.title, project_name),
                    &e,
                );
                return;
            }
        };
        self.state.map_milestone(milestone.id, created.clone());
        self.summary.milestones += 1;

        let update = mapping::update_milestone_options(milestone);
        if let Err(e) = self.gitlab.update_milestone(project_id, created.id, &update, sudo).await {
            self.warn(
                format_args!("Unable to update milestone {} in project {}", milestone.title, project_name),
                &e,
            );
        }
    }

    async fn migrate_ticket(&mut self, project_id: u64, project_name: &str, exported: &ExportedTicket) {
        let ticket = &exported.ticket;
        let key = self.options.state_key.clone();
        let opts = mapping::create_issue_options(ticket, &self.state, &key);
        info!("Creating issue {}", opts.iid);
        let issue = match self
            .gitlab
            .create_issue(project_id, &opts, self.state.sudo_for(ticket.creator_id))
            .await
        {
            Ok(issue) => issue,
            Err(e) => {
                self.warn(
                    format_args!("Unable to create issue {} in project {}", ticket.number, project_name),
                    &e,
                );
                return;
            }
        };
        self.summary.issues += 1;

        for &watcher in &ticket.watchers_ids {
            let sudo = self.state.sudo_for(watcher);
            if let Err(e) = self.gitlab.subscribe_to_issue(project_id, issue.iid, sudo).await {
                self.warn(
                    format_args!("Unable to subscribe user {} to issue {}", watcher, issue.iid),
                    &e,
                );
            }
        }

        for version in &ticket.versions {
            let sudo = self.state.sudo_for(version.user_id);
            let update = mapping::update_issue_options(version, &self.state, &key);
            if let Err(e) = self.gitlab.update_issue(project_id, issue.iid, &update, sudo).await {
                self.warn(format_args!("Unable to update issue {}", issue.iid), &e);
            }

            let mut uploads: Vec<ProjectFile> = Vec::new();
            for attachment in &exported.attachments {
                if !mapping::attached_in(&attachment.attachment, version) {
                    continue;
                }
                let uploader = self.state.sudo_for(attachment.attachment.uploader_id);
                match self.gitlab.upload_file(project_id, &attachment.path, uploader).await {
                    Ok(file) => uploads.push(file),
                    Err(e) => self.warn(
                        format_args!(
                            "Unable to upload {} for issue {}",
                            attachment.attachment.filename, issue.iid
                        ),
                        &e,
                    ),
                }
            }

            let creation = mapping::is_creation_version(version, ticket);
            if let Some(note) = mapping::issue_note_options(version, creation, &uploads) {
                if let Err(e) = self.gitlab.create_issue_note(project_id, issue.iid, &note, sudo).await {
                    self.warn(format_args!("Unable to create note on issue {}", issue.iid), &e);
                }
            }
        }
    }
}
