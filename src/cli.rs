use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};

use lighthouse::api::RateLimit;
use lighthouse::config::CredentialOverrides;

#[derive(Parser, Debug)]
#[command(name = "lh")]
#[command(version)]
#[command(about = "Command-line client for the Lighthouse issue tracker")]
#[command(long_about = "
lh talks to the Lighthouse API of one account. Results are printed to
stdout as JSON; logs go to stderr.

Credentials come from --token (or LH_TOKEN), --email and --password, or
the token stored for a profile by 'lh login'.

Example usage:
  lh login --account acme --token 0123abcd
  lh -p web list tickets --query 'state:open'
  lh -p web create ticket --title 'Login fails' --tags 'ui bug'
  lh export --attachments
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Profile from the configuration file
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Lighthouse account name (https://<account>.lighthouseapp.com)
    #[arg(short, long, env = "LH_ACCOUNT", global = true)]
    pub account: Option<String>,

    /// API token
    #[arg(short, long, env = "LH_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Send the token as Basic Auth user name instead of a header
    #[arg(long, global = true)]
    pub token_basic: bool,

    /// Email for email/password authentication
    #[arg(short, long, env = "LH_EMAIL", global = true)]
    pub email: Option<String>,

    /// Password for email/password authentication
    #[arg(long, env = "LH_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Project ID or name for project-scoped commands
    #[arg(short, long, env = "LH_PROJECT", global = true)]
    pub project: Option<String>,

    /// Maximum API requests per second; 0 disables the limit
    #[arg(short, long, env = "LH_RATE", default_value_t = 0, global = true)]
    pub rate: u32,

    /// Requests allowed back to back before --rate applies
    #[arg(short, long, env = "LH_BURST", default_value_t = 1, global = true)]
    pub burst: u32,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl GlobalArgs {
    pub fn rate_limit(&self) -> Option<RateLimit> {
        RateLimit::new(self.rate, self.burst)
    }

    pub fn overrides(&self) -> CredentialOverrides {
        CredentialOverrides {
            profile: self.profile.clone(),
            account: self.account.clone(),
            token: self.token.clone(),
            token_basic: self.token_basic,
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Get a single resource
    Get {
        #[command(subcommand)]
        resource: GetCommand,
    },
    /// List resources
    List {
        #[command(subcommand)]
        resource: ListCommand,
    },
    /// Create a resource
    Create {
        #[command(subcommand)]
        resource: CreateCommand,
    },
    /// Update a resource
    Update {
        #[command(subcommand)]
        resource: UpdateCommand,
    },
    /// Delete a resource
    Delete {
        #[command(subcommand)]
        resource: DeleteCommand,
    },
    /// Open or close milestones (requires -p)
    Milestone {
        #[command(subcommand)]
        action: MilestoneCommand,
    },
    /// Bulk edit tickets or attach files (requires -p)
    Ticket {
        #[command(subcommand)]
        action: TicketCommand,
    },
    /// Comment on messages (requires -p)
    Message {
        #[command(subcommand)]
        action: MessageCommand,
    },
    /// Export the whole account to <account>_<date>.tar.gz
    ///
    /// Large accounts can run into the server's API request limit; use -r
    /// and -b to rate limit requests.
    Export(ExportArgs),
    /// Show information about an API token
    Token {
        /// Token to inspect; defaults to --token
        #[arg(value_name = "TOKEN")]
        api_token: Option<String>,
    },
    /// Verify a token and store it in the OS keyring for a profile
    Login(LoginArgs),
    /// Remove a profile's token from the OS keyring
    Logout,
}

#[derive(Subcommand, Debug)]
pub enum GetCommand {
    /// Get a project by ID or name
    Project { id_or_name: String },
    /// Get a ticket by number, e.g. 12 or #12 (requires -p)
    Ticket { number: String },
    /// Get a milestone by ID or title (requires -p)
    Milestone { id_or_title: String },
    /// Get a message by ID or title (requires -p)
    Message { id_or_title: String },
    /// Get a ticket bin by ID or name (requires -p)
    Bin { id_or_name: String },
    /// Get a changeset by revision (requires -p)
    Changeset { revision: String },
    /// Get a user by ID
    User { id: u64 },
    /// Get the authenticated user's profile
    Profile,
    /// Get the account plan (account owner only)
    Plan,
    /// Get the server's blank template for a new resource
    New {
        #[arg(value_enum)]
        kind: TemplateKind,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Project,
    Ticket,
    Milestone,
    Message,
    Bin,
    Changeset,
}

#[derive(Subcommand, Debug)]
pub enum ListCommand {
    /// List projects
    Projects,
    /// List tickets (requires -p)
    Tickets(TicketQueryArgs),
    /// List milestones (requires -p)
    Milestones {
        /// Page to fetch
        #[arg(long)]
        page: Option<u32>,
        /// Fetch every page
        #[arg(long, conflicts_with = "page")]
        all: bool,
    },
    /// List messages (requires -p)
    Messages,
    /// List ticket bins (requires -p)
    Bins,
    /// List changesets (requires -p)
    Changesets,
    /// List project memberships (requires -p) or a user's memberships
    Memberships {
        /// List this user's memberships instead of the project's
        #[arg(long)]
        user: Option<u64>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TicketQueryArgs {
    /// Search query, e.g. 'state:open responsible:me'
    #[arg(long, short = 'q', default_value = "")]
    pub query: String,
    /// Tickets per page (at most 100)
    #[arg(long, default_value_t = 0)]
    pub limit: u32,
    /// Page to fetch
    #[arg(long, default_value_t = 0)]
    pub page: u32,
    /// Fetch every page
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TicketFields {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long)]
    pub state: Option<String>,
    /// Assigned user ID; 0 unassigns
    #[arg(long)]
    pub assigned_user: Option<u64>,
    /// Milestone ID or title
    #[arg(long)]
    pub milestone: Option<String>,
    /// Space-separated tags
    #[arg(long)]
    pub tags: Option<String>,
    /// Notify every project member
    #[arg(long)]
    pub notify_all: bool,
    /// Users to notify, by ID
    #[arg(long, value_delimiter = ',')]
    pub watchers: Vec<u64>,
}

#[derive(Subcommand, Debug)]
pub enum CreateCommand {
    /// Create a project
    Project {
        #[arg(long)]
        name: String,
        #[arg(long)]
        public: bool,
    },
    /// Create a ticket (requires -p)
    Ticket(TicketFields),
    /// Create a milestone (requires -p)
    Milestone {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        goals: String,
        /// Due date, YYYY-MM-DD
        #[arg(long)]
        due_on: Option<NaiveDate>,
    },
    /// Create a message (requires -p)
    Message {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Create a ticket bin (requires -p)
    Bin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        query: String,
        /// Make this the project's default bin
        #[arg(long)]
        default: bool,
    },
    /// Record a changeset (requires -p)
    Changeset {
        #[arg(long)]
        revision: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        /// When the change was made, RFC 3339
        #[arg(long)]
        changed_at: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 0)]
        user_id: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum UpdateCommand {
    /// Update a project
    Project {
        id_or_name: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        public: Option<bool>,
        #[arg(long)]
        archived: Option<bool>,
    },
    /// Update a ticket (requires -p)
    Ticket {
        number: String,
        #[command(flatten)]
        fields: TicketFields,
    },
    /// Update a milestone (requires -p)
    Milestone {
        id_or_title: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        goals: Option<String>,
        #[arg(long)]
        due_on: Option<NaiveDate>,
    },
    /// Update a message (requires -p)
    Message {
        id_or_title: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Update a ticket bin (requires -p)
    Bin {
        id_or_name: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        default: Option<bool>,
    },
    /// Update a user
    User {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        job: Option<String>,
        #[arg(long)]
        website: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DeleteCommand {
    /// Delete a project by ID or name
    Project { id_or_name: String },
    /// Delete a ticket by number (requires -p)
    Ticket { number: String },
    /// Delete a milestone by ID or title (requires -p)
    Milestone { id_or_title: String },
    /// Delete a message by ID or title (requires -p)
    Message { id_or_title: String },
    /// Delete a ticket bin by ID or name (requires -p)
    Bin { id_or_name: String },
    /// Delete a changeset by revision (requires -p)
    Changeset { revision: String },
}

#[derive(Subcommand, Debug)]
pub enum MilestoneCommand {
    /// Reopen a completed milestone
    Open { id_or_title: String },
    /// Mark a milestone completed
    Close { id_or_title: String },
}

#[derive(Subcommand, Debug)]
pub enum TicketCommand {
    /// Apply keyword commands to every ticket matching a query
    BulkEdit {
        /// Ticket search query; 'all' or a number also work
        #[arg(long, short = 'q')]
        query: String,
        /// Keyword commands, e.g. 'state:resolved milestone:none'
        #[arg(long)]
        command: String,
        /// Token with access to the destination when moving tickets
        #[arg(long, default_value = "")]
        migration_token: String,
    },
    /// Attach a file to a ticket
    Attach { number: String, file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum MessageCommand {
    /// Comment on a message
    Comment {
        id_or_title: String,
        #[arg(long)]
        body: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Include ticket attachments
    #[arg(long)]
    pub attachments: bool,

    /// Directory to write the archive into
    #[arg(long, short = 'o', default_value = ".")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Profile name to save; defaults to the account name
    #[arg(long = "name")]
    pub name: Option<String>,

    /// Make this the default profile
    #[arg(long)]
    pub default: bool,
}
