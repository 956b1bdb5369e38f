//! lh - command-line client for the Lighthouse issue tracker.
//!
//! Results are printed to stdout as pretty JSON; logs and status lines go
//! to stderr.

mod cli;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, error, info};

use lighthouse::api::resources::{
    Bin, BulkEditOptions, Changeset, Message, Milestone, Project, TicketListOptions, TicketUpdateView,
    TicketView,
};
use lighthouse::api::{self, Auth, LighthouseClient};
use lighthouse::config::{resolve_credentials, Config, Profile};
use lighthouse::error::{AppError, Result};
use lighthouse::export::Exporter;
use lighthouse::logging;

use cli::{
    Cli, Commands, CreateCommand, DeleteCommand, GetCommand, GlobalArgs, ListCommand, LoginArgs,
    MessageCommand, MilestoneCommand, TemplateKind, TicketCommand, TicketFields, UpdateCommand,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load().map_err(|e| report(e.into()))?;
    logging::init(cli.global.verbose, config.settings.log_dir.as_deref())?;
    debug!(command = ?cli.command, "Starting");

    run(cli, config).await.map_err(report)
}

/// Turn an application error into the message `main` exits with.
fn report(err: AppError) -> anyhow::Error {
    error!("{}", err);
    let mut message = err.user_message();
    if let Some(action) = err.suggested_action() {
        message = format!("{}\nhint: {}", message, action);
    }
    anyhow::Error::new(err).context(message)
}

async fn run(cli: Cli, mut config: Config) -> Result<()> {
    match &cli.command {
        Commands::Login(args) => return login(&cli.global, &mut config, args).await,
        Commands::Logout => return logout(&cli.global, &config),
        _ => {}
    }

    let credentials = resolve_credentials(&config, &cli.global.overrides())?;
    let session = Session {
        client: credentials.client()?.with_rate_limit(cli.global.rate_limit()),
        account: credentials.account,
        project: cli.global.project.clone(),
    };

    match cli.command {
        Commands::Get { resource } => session.get(resource).await,
        Commands::List { resource } => session.list(resource).await,
        Commands::Create { resource } => session.create(resource).await,
        Commands::Update { resource } => session.update(resource).await,
        Commands::Delete { resource } => session.delete(resource).await,
        Commands::Milestone { action } => {
            let milestones = session.client.milestones(session.project_id().await?);
            match action {
                MilestoneCommand::Open { id_or_title } => {
                    milestones.open(&id_or_title).await?;
                    eprintln!("Opened milestone {}", id_or_title);
                }
                MilestoneCommand::Close { id_or_title } => {
                    milestones.close(&id_or_title).await?;
                    eprintln!("Closed milestone {}", id_or_title);
                }
            }
            Ok(())
        }
        Commands::Ticket { action } => {
            let tickets = session.client.tickets(session.project_id().await?);
            match action {
                TicketCommand::BulkEdit {
                    query,
                    command,
                    migration_token,
                } => {
                    tickets
                        .bulk_edit(&BulkEditOptions {
                            query,
                            command,
                            migration_token,
                        })
                        .await?;
                    eprintln!("Bulk edit accepted");
                }
                TicketCommand::Attach { number, file } => {
                    let ticket = tickets.get(&number).await?;
                    let data = tokio::fs::read(&file).await?;
                    tickets
                        .add_attachment(&ticket, &file.to_string_lossy(), data)
                        .await?;
                    eprintln!("Attached {} to ticket #{}", file.display(), ticket.number);
                }
            }
            Ok(())
        }
        Commands::Message { action } => {
            let messages = session.client.messages(session.project_id().await?);
            match action {
                MessageCommand::Comment { id_or_title, body } => {
                    let comment = Message {
                        body,
                        ..Default::default()
                    };
                    print_json(&messages.create_comment(&id_or_title, &comment).await?)
                }
            }
        }
        Commands::Export(args) => {
            let exporter = Exporter::new(session.client.clone(), session.account.clone())
                .with_attachments(args.attachments);
            let (path, summary) = exporter.export_to_dir(&args.output).await?;
            eprintln!(
                "Exported {} projects, {} tickets, {} attachments and {} users",
                summary.projects, summary.tickets, summary.attachments, summary.users
            );
            println!("{}", path.display());
            Ok(())
        }
        Commands::Token { api_token } => {
            let token = api_token
                .or_else(|| cli.global.token.clone())
                .ok_or_else(|| AppError::other("no token given; pass it as an argument or with --token"))?;
            print_json(&session.client.tokens().get(&token).await?)
        }
        Commands::Login(_) | Commands::Logout => Ok(()),
    }
}

/// Verify a token, store it in the keyring and save the profile.
async fn login(global: &GlobalArgs, config: &mut Config, args: &LoginArgs) -> Result<()> {
    let existing = global.profile.as_deref().and_then(|name| config.get_profile(name)).cloned();

    let account = global
        .account
        .clone()
        .or_else(|| existing.as_ref().map(|p| p.account.clone()))
        .ok_or_else(|| AppError::other("no account given; pass --account or set LH_ACCOUNT"))?;
    let token = global
        .token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::other("no token given; pass --token or set LH_TOKEN"))?;
    let name = args
        .name
        .clone()
        .or_else(|| global.profile.clone())
        .unwrap_or_else(|| account.clone());

    let auth = if global.token_basic {
        Auth::token_basic(&token)
    } else {
        Auth::token(&token)
    };
    let client = LighthouseClient::with_host(&account, &config.settings.host, auth)?;
    let user = client.validate_connection().await?;
    info!(user = %user.name, "Token accepted");

    let mut profile = existing.unwrap_or_else(|| Profile::new(name.clone(), account.clone(), None));
    profile.name = name.clone();
    profile.account = account;
    if global.email.is_some() {
        profile.email = global.email.clone();
    }
    profile.token_as_basic_auth = global.token_basic;
    profile.validate()?;

    api::store_token(&name, &token)?;
    config.upsert_profile(profile);
    if args.default || config.settings.default_profile.is_none() {
        config.settings.default_profile = Some(name.clone());
    }
    config.save()?;

    eprintln!("Logged in as {} (profile '{}')", user.name, name);
    Ok(())
}

/// Remove the selected profile's token from the keyring.
fn logout(global: &GlobalArgs, config: &Config) -> Result<()> {
    let name = match &global.profile {
        Some(name) => name.clone(),
        None => config
            .get_default_profile()
            .map(|p| p.name.clone())
            .ok_or_else(|| AppError::other("no profile to log out of; pass --profile"))?,
    };
    api::delete_token(&name)?;
    eprintln!("Removed the token of profile '{}'", name);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::other(format!("could not encode output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn midnight_utc(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

/// An authenticated client plus the project named on the command line.
struct Session {
    client: LighthouseClient,
    account: String,
    project: Option<String>,
}

impl Session {
    async fn project_id(&self) -> Result<u64> {
        let project = self.project.as_deref().ok_or_else(|| {
            AppError::other("this command needs a project; pass --project or set LH_PROJECT")
        })?;
        Ok(self.client.projects().resolve_id(project).await?)
    }

    /// Resolve a milestone ID or title to its ID.
    async fn milestone_id(&self, project_id: u64, id_or_title: &str) -> Result<u64> {
        Ok(self.client.milestones(project_id).get(id_or_title).await?.id)
    }

    /// Apply the given ticket fields on top of `view`.
    async fn apply_ticket_fields(
        &self,
        project_id: u64,
        view: &mut TicketUpdateView,
        fields: TicketFields,
    ) -> Result<()> {
        if let Some(title) = fields.title {
            view.title = title;
        }
        if let Some(body) = fields.body {
            view.body = body;
        }
        if let Some(state) = fields.state {
            view.state = state;
        }
        if let Some(user) = fields.assigned_user {
            view.assigned_user_id = user;
        }
        if let Some(milestone) = fields.milestone {
            view.milestone_id = self.milestone_id(project_id, &milestone).await?;
        }
        if let Some(tags) = fields.tags {
            view.tag = tags;
        }
        if fields.notify_all {
            view.notify_all = Some(true);
        }
        view.multiple_watchers = fields.watchers;
        Ok(())
    }

    async fn get(&self, resource: GetCommand) -> Result<()> {
        match resource {
            GetCommand::Project { id_or_name } => print_json(&self.client.projects().get(&id_or_name).await?),
            GetCommand::Ticket { number } => {
                print_json(&self.client.tickets(self.project_id().await?).get(&number).await?)
            }
            GetCommand::Milestone { id_or_title } => {
                print_json(&self.client.milestones(self.project_id().await?).get(&id_or_title).await?)
            }
            GetCommand::Message { id_or_title } => {
                print_json(&self.client.messages(self.project_id().await?).get(&id_or_title).await?)
            }
            GetCommand::Bin { id_or_name } => {
                print_json(&self.client.bins(self.project_id().await?).get(&id_or_name).await?)
            }
            GetCommand::Changeset { revision } => {
                print_json(&self.client.changesets(self.project_id().await?).get(&revision).await?)
            }
            GetCommand::User { id } => print_json(&self.client.users().get(id).await?),
            GetCommand::Profile => print_json(&self.client.profiles().get().await?),
            GetCommand::Plan => print_json(&self.client.plans().get().await?),
            GetCommand::New { kind } => self.template(kind).await,
        }
    }

    async fn template(&self, kind: TemplateKind) -> Result<()> {
        match kind {
            TemplateKind::Project => print_json(&self.client.projects().new_template().await?),
            TemplateKind::Ticket => print_json(&self.client.tickets(self.project_id().await?).new_template().await?),
            TemplateKind::Milestone => {
                print_json(&self.client.milestones(self.project_id().await?).new_template().await?)
            }
            TemplateKind::Message => {
                print_json(&self.client.messages(self.project_id().await?).new_template().await?)
            }
            TemplateKind::Bin => print_json(&self.client.bins(self.project_id().await?).new_template().await?),
            TemplateKind::Changeset => {
                print_json(&self.client.changesets(self.project_id().await?).new_template().await?)
            }
        }
    }

    async fn list(&self, resource: ListCommand) -> Result<()> {
        match resource {
            ListCommand::Projects => print_json(&self.client.projects().list().await?),
            ListCommand::Tickets(args) => {
                let tickets = self.client.tickets(self.project_id().await?);
                let opts = TicketListOptions {
                    query: args.query,
                    limit: args.limit,
                    page: args.page,
                };
                if args.all {
                    print_json(&tickets.list_all(&opts).await?)
                } else {
                    print_json(&tickets.list(&opts).await?)
                }
            }
            ListCommand::Milestones { page, all } => {
                let milestones = self.client.milestones(self.project_id().await?);
                if all {
                    print_json(&milestones.list_all().await?)
                } else {
                    print_json(&milestones.list(page).await?)
                }
            }
            ListCommand::Messages => print_json(&self.client.messages(self.project_id().await?).list().await?),
            ListCommand::Bins => print_json(&self.client.bins(self.project_id().await?).list().await?),
            ListCommand::Changesets => {
                print_json(&self.client.changesets(self.project_id().await?).list().await?)
            }
            ListCommand::Memberships { user: Some(id) } => print_json(&self.client.users().memberships(id).await?),
            ListCommand::Memberships { user: None } => {
                print_json(&self.client.projects().memberships_by_id(self.project_id().await?).await?)
            }
        }
    }

    async fn create(&self, resource: CreateCommand) -> Result<()> {
        match resource {
            CreateCommand::Project { name, public } => {
                let project = Project {
                    name,
                    public,
                    ..Default::default()
                };
                print_json(&self.client.projects().create(&project).await?)
            }
            CreateCommand::Ticket(fields) => {
                if fields.title.as_deref().map_or(true, str::is_empty) {
                    return Err(AppError::other("a ticket needs a --title"));
                }
                let pid = self.project_id().await?;
                let mut view = TicketUpdateView::default();
                self.apply_ticket_fields(pid, &mut view, fields).await?;
                print_json(&self.client.tickets(pid).create_view(&TicketView::from(view)).await?)
            }
            CreateCommand::Milestone { title, goals, due_on } => {
                let milestone = Milestone {
                    title,
                    goals,
                    due_on: due_on.and_then(midnight_utc),
                    ..Default::default()
                };
                print_json(&self.client.milestones(self.project_id().await?).create(&milestone).await?)
            }
            CreateCommand::Message { title, body } => {
                let message = Message {
                    title,
                    body,
                    ..Default::default()
                };
                print_json(&self.client.messages(self.project_id().await?).create(&message).await?)
            }
            CreateCommand::Bin { name, query, default } => {
                let bin = Bin {
                    name,
                    query,
                    default,
                    ..Default::default()
                };
                print_json(&self.client.bins(self.project_id().await?).create(&bin).await?)
            }
            CreateCommand::Changeset {
                revision,
                title,
                body,
                changed_at,
                user_id,
            } => {
                let changeset = Changeset {
                    revision,
                    title,
                    body,
                    changed_at: changed_at.or_else(|| Some(Utc::now())),
                    user_id,
                    ..Default::default()
                };
                print_json(&self.client.changesets(self.project_id().await?).create(&changeset).await?)
            }
        }
    }

    async fn update(&self, resource: UpdateCommand) -> Result<()> {
        match resource {
            UpdateCommand::Project {
                id_or_name,
                name,
                public,
                archived,
            } => {
                let mut project = self.client.projects().get(&id_or_name).await?;
                if let Some(name) = name {
                    project.name = name;
                }
                if let Some(public) = public {
                    project.public = public;
                }
                if let Some(archived) = archived {
                    project.archived = archived;
                }
                self.client.projects().update(&project).await?;
                print_json(&project)
            }
            UpdateCommand::Ticket { number, fields } => {
                let pid = self.project_id().await?;
                let tickets = self.client.tickets(pid);
                let ticket = tickets.get(&number).await?;
                let mut view = TicketUpdateView::from(&ticket);
                self.apply_ticket_fields(pid, &mut view, fields).await?;
                tickets.update_view(ticket.number, &view).await?;
                print_json(&tickets.get_by_number(ticket.number).await?)
            }
            UpdateCommand::Milestone {
                id_or_title,
                title,
                goals,
                due_on,
            } => {
                let milestones = self.client.milestones(self.project_id().await?);
                let mut milestone = milestones.get(&id_or_title).await?;
                if let Some(title) = title {
                    milestone.title = title;
                }
                if let Some(goals) = goals {
                    milestone.goals = goals;
                }
                if let Some(due_on) = due_on {
                    milestone.due_on = midnight_utc(due_on);
                }
                milestones.update(&milestone).await?;
                print_json(&milestone)
            }
            UpdateCommand::Message {
                id_or_title,
                title,
                body,
            } => {
                let messages = self.client.messages(self.project_id().await?);
                let mut message = messages.get(&id_or_title).await?;
                if let Some(title) = title {
                    message.title = title;
                }
                if let Some(body) = body {
                    message.body = body;
                }
                messages.update(&message).await?;
                print_json(&message)
            }
            UpdateCommand::Bin {
                id_or_name,
                name,
                query,
                default,
            } => {
                let bins = self.client.bins(self.project_id().await?);
                let mut bin = bins.get(&id_or_name).await?;
                if let Some(name) = name {
                    bin.name = name;
                }
                if let Some(query) = query {
                    bin.query = query;
                }
                if let Some(default) = default {
                    bin.default = default;
                }
                bins.update(&bin).await?;
                print_json(&bin)
            }
            UpdateCommand::User { id, name, job, website } => {
                let mut user = self.client.users().get(id).await?;
                if let Some(name) = name {
                    user.name = name;
                }
                if let Some(job) = job {
                    user.job = job;
                }
                if let Some(website) = website {
                    user.website = website;
                }
                self.client.users().update(&user).await?;
                print_json(&user)
            }
        }
    }

    async fn delete(&self, resource: DeleteCommand) -> Result<()> {
        let what = match resource {
            DeleteCommand::Project { id_or_name } => {
                self.client.projects().delete(&id_or_name).await?;
                format!("project {}", id_or_name)
            }
            DeleteCommand::Ticket { number } => {
                self.client.tickets(self.project_id().await?).delete(&number).await?;
                format!("ticket {}", number)
            }
            DeleteCommand::Milestone { id_or_title } => {
                self.client.milestones(self.project_id().await?).delete(&id_or_title).await?;
                format!("milestone {}", id_or_title)
            }
            DeleteCommand::Message { id_or_title } => {
                self.client.messages(self.project_id().await?).delete(&id_or_title).await?;
                format!("message {}", id_or_title)
            }
            DeleteCommand::Bin { id_or_name } => {
                self.client.bins(self.project_id().await?).delete(&id_or_name).await?;
                format!("bin {}", id_or_name)
            }
            DeleteCommand::Changeset { revision } => {
                self.client.changesets(self.project_id().await?).delete(&revision).await?;
                format!("changeset {}", revision)
            }
        };
        eprintln!("Deleted {}", what);
        Ok(())
    }
}
