//! Translation of Lighthouse records into GitLab request options.
//!
//! Nothing here talks to the network; ID remapping goes through the
//! [`MigrationState`] passed in.

use once_cell::sync::Lazy;
use regex::Regex;

use super::gitlab::{
    AddMemberOptions, CreateIssueOptions, CreateLabelOptions, CreateMilestoneOptions, CreateNoteOptions,
    CreateProjectOptions, CreateUserOptions, ProjectFile, UpdateIssueOptions, UpdateMilestoneOptions,
    Visibility, MAINTAINER_ACCESS,
};
use super::state::MigrationState;
use crate::api::resources::{Attachment, Milestone, Project, Ticket, TicketVersion};

/// Label color used when a state definition has no usable color.
pub const DEFAULT_LABEL_COLOR: &str = "#428BCA";

/// Comments Lighthouse puts in its default state definitions.
const HELP_COMMENTS: &[&str] = &[
    "You can add comments here",
    "if you want to.",
    "You can customize colors",
    "with 3 or 6 character hex codes",
    "'A30' expands to 'AA3300'",
];

static STATE_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<name>[^/]+)/(?P<color>[0-9a-fA-F]+)\s*(#\s*(?P<description>.*)\s*)?$")
        .expect("Invalid regex")
});

// At least two characters, so `a@b@c` is left alone.
static CODE_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([^@\s][^@\r\n]*[^@\s])@").expect("Invalid regex"));

/// Convert Lighthouse markup to GitLab markdown.
///
/// `@@@` fences become ```` ``` ```` and `@code@` spans become `` `code` ``.
/// Blank text is returned unchanged.
pub fn to_gitlab_markdown(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    let fenced = text.replace("@@@", "```");
    CODE_SPAN.replace_all(&fenced, "`$1`").into_owned()
}

/// GitLab rejects `'` in project names.
pub fn sanitize_project_name(name: &str) -> String {
    name.replace('\'', "")
}

/// Scoped label for a ticket state, e.g. `lh::open`.
pub fn state_label(state_key: &str, state: &str) -> String {
    format!("{}::{}", state_key, state)
}

/// Labels for every `name/color # comment` line of a state definition.
/// Lines that do not match are skipped.
pub fn state_labels(definitions: &str, state_key: &str) -> Vec<CreateLabelOptions> {
    definitions
        .lines()
        .filter_map(|line| STATE_DEFINITION.captures(line))
        .map(|caps| {
            let name = caps.name("name").map_or("", |m| m.as_str().trim());
            let color = caps
                .name("color")
                .and_then(|m| expand_color(m.as_str()))
                .unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string());
            let description = caps
                .name("description")
                .map(|m| m.as_str().trim())
                .filter(|d| !d.is_empty() && !HELP_COMMENTS.contains(d))
                .unwrap_or_default();

            CreateLabelOptions {
                name: state_label(state_key, name),
                color,
                description: description.to_string(),
            }
        })
        .collect()
}

/// `abc` → `#aabbcc`, `aabbcc` → `#aabbcc`; any other length is unusable.
fn expand_color(hex: &str) -> Option<String> {
    match hex.len() {
        3 => Some(hex.chars().fold(String::from("#"), |mut acc, c| {
            acc.push(c);
            acc.push(c);
            acc
        })),
        6 => Some(format!("#{}", hex)),
        _ => None,
    }
}

/// Open state labels followed by closed state labels.
pub fn project_labels(project: &Project, state_key: &str) -> Vec<CreateLabelOptions> {
    let mut labels = state_labels(&project.open_states, state_key);
    labels.extend(state_labels(&project.closed_states, state_key));
    labels
}

/// Split a version's space-separated tag string, honouring double quotes
/// (`ui "needs review"`). Falls back to plain whitespace splitting.
pub fn split_tags(tag: &str) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .from_reader(tag.as_bytes());

    let fields: Vec<String> = match reader.records().next() {
        Some(Ok(record)) => record.iter().map(str::to_string).collect(),
        _ => tag.split_whitespace().map(str::to_string).collect(),
    };
    fields.into_iter().filter(|f| !f.is_empty()).collect()
}

/// Tag names plus the scoped state label.
pub fn ticket_labels(ticket: &Ticket, state_key: &str) -> Vec<String> {
    let mut labels: Vec<String> = ticket.tag_names().map(str::to_string).collect();
    labels.push(state_label(state_key, &ticket.state));
    labels
}

pub fn version_labels(version: &TicketVersion, state_key: &str) -> Vec<String> {
    let mut labels = split_tags(&version.tag);
    labels.push(state_label(state_key, &version.state));
    labels
}

/// `Some([0])` unassigns; an unmapped user leaves the assignee unset.
fn assignee_ids(lh_user_id: u64, state: &MigrationState) -> Option<Vec<u64>> {
    if lh_user_id == 0 {
        return Some(vec![0]);
    }
    state.user(lh_user_id).map(|u| vec![u.id])
}

/// `Some(0)` clears the milestone; an unmapped milestone leaves it unset.
fn milestone_id(lh_milestone_id: u64, state: &MigrationState) -> Option<u64> {
    if lh_milestone_id == 0 {
        return Some(0);
    }
    state.milestone(lh_milestone_id).map(|m| m.id)
}

/// Options for a user listed in the users mapping file, `None` otherwise.
pub fn create_user_options(lh_id: u64, state: &MigrationState, password: &str) -> Option<CreateUserOptions> {
    let user = state.user(lh_id)?;
    Some(CreateUserOptions {
        email: user.email.clone(),
        password: password.to_string(),
        username: user.username.clone(),
        name: user.name.clone(),
        projects_limit: user.projects_limit,
        admin: user.is_admin,
        can_create_group: user.can_create_group,
        skip_confirmation: true,
        external: user.external,
    })
}

pub fn create_project_options(project: &Project, state: &MigrationState) -> CreateProjectOptions {
    let name = sanitize_project_name(&project.name);
    CreateProjectOptions {
        namespace_id: state.group_for(&name).map(|g| g.id),
        name,
        description: to_gitlab_markdown(&project.description),
        visibility: Visibility::Private,
    }
}

/// Maintainer membership for a mapped Lighthouse user.
pub fn member_options(lh_user_id: u64, state: &MigrationState) -> Option<AddMemberOptions> {
    state.user(lh_user_id).map(|u| AddMemberOptions {
        user_id: u.id,
        access_level: MAINTAINER_ACCESS,
    })
}

/// The milestone starts when it was created; a due date is only kept when
/// it lies after that.
pub fn create_milestone_options(milestone: &Milestone) -> CreateMilestoneOptions {
    let due_date = milestone
        .due_on
        .filter(|due| milestone.created_at.map_or(true, |created| *due > created))
        .map(|due| due.date_naive());

    CreateMilestoneOptions {
        title: milestone.title.clone(),
        description: to_gitlab_markdown(&milestone.goals),
        start_date: milestone.created_at.map(|created| created.date_naive()),
        due_date,
    }
}

pub fn update_milestone_options(milestone: &Milestone) -> UpdateMilestoneOptions {
    let state_event = if milestone.completed_at.is_some() {
        "close"
    } else {
        "activate"
    };
    UpdateMilestoneOptions {
        state_event: state_event.to_string(),
    }
}

/// The issue keeps the ticket's number as IID. When the ticket has a
/// history, the first version's assignee, milestone and labels win.
pub fn create_issue_options(ticket: &Ticket, state: &MigrationState, state_key: &str) -> CreateIssueOptions {
    let mut opts = CreateIssueOptions {
        iid: ticket.number,
        title: ticket.title.clone(),
        description: to_gitlab_markdown(&ticket.body),
        assignee_ids: assignee_ids(ticket.assigned_user_id, state),
        milestone_id: milestone_id(ticket.milestone_id, state),
        labels: ticket_labels(ticket, state_key),
        created_at: ticket.created_at,
    };

    if let Some(first) = ticket.versions.first() {
        let update = update_issue_options(first, state, state_key);
        opts.assignee_ids = update.assignee_ids;
        opts.milestone_id = update.milestone_id;
        opts.labels = update.labels;
    }

    opts
}

pub fn update_issue_options(version: &TicketVersion, state: &MigrationState, state_key: &str) -> UpdateIssueOptions {
    UpdateIssueOptions {
        title: version.title.clone(),
        assignee_ids: assignee_ids(version.assigned_user_id, state),
        milestone_id: milestone_id(version.milestone_id, state),
        labels: version_labels(version, state_key),
        state_event: if version.closed { "close" } else { "reopen" }.to_string(),
        updated_at: version.updated_at,
    }
}

/// Whether `version` is the one the ticket was created with. Its body is
/// already the issue description.
pub fn is_creation_version(version: &TicketVersion, ticket: &Ticket) -> bool {
    matches!((version.created_at, ticket.created_at), (Some(v), Some(t)) if v == t)
}

/// Whether `attachment` was added by `version`.
pub fn attached_in(attachment: &Attachment, version: &TicketVersion) -> bool {
    matches!((attachment.created_at, version.created_at), (Some(a), Some(v)) if a == v)
}

/// Note for a version: its body (unless it is the creation version) and
/// links to the files uploaded with it. `None` when there is nothing to say.
pub fn issue_note_options(
    version: &TicketVersion,
    creation_version: bool,
    uploads: &[ProjectFile],
) -> Option<CreateNoteOptions> {
    let mut parts = Vec::with_capacity(uploads.len() + 1);
    if !creation_version {
        let body = to_gitlab_markdown(&version.body);
        if !body.is_empty() {
            parts.push(body);
        }
    }
    parts.extend(uploads.iter().map(|u| u.markdown.clone()));

    let body = parts.join("\n\n");
    if body.trim().is_empty() {
        return None;
    }
    Some(CreateNoteOptions {
        body,
        created_at: version.created_at,
    })
}
