//! lhtogitlab - import a Lighthouse export archive into GitLab.
//!
//! Needs a GitLab administrator token with the `api` and `sudo` scopes so
//! that milestones, issues and notes can be created as their original
//! authors.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::{error, info, warn};

use lighthouse::error::AppError;
use lighthouse::logging;
use lighthouse::migrate::{
    self, ExportArchive, GitLabClient, MigrateOptions, Migrator, DEFAULT_PASSWORD, DEFAULT_STATE_KEY,
};

#[derive(Parser, Debug)]
#[command(name = "lhtogitlab")]
#[command(version)]
#[command(about = "Migrate a Lighthouse export archive into GitLab")]
#[command(long_about = "
Reads an archive written by 'lh export' and recreates its users, projects,
milestones and tickets in GitLab. Ticket versions become issue updates and
notes, attachments are uploaded, and ticket states become scoped labels.

Example usage:
  lhtogitlab --token glpat-xxxx --base-url https://gitlab.example.com \\
      --users users.json acme_2024-03-09.tar.gz
")]
struct Args {
    /// GitLab personal access token of an administrator
    #[arg(long)]
    token: String,

    /// GitLab base URL, e.g. https://gitlab.example.com
    #[arg(long)]
    base_url: String,

    /// JSON file mapping Lighthouse user IDs to GitLab users
    #[arg(long, required_unless_present = "delete")]
    users: Option<PathBuf>,

    /// JSON file of groups to create
    #[arg(long)]
    groups: Option<PathBuf>,

    /// Password for every created user
    #[arg(long, default_value = DEFAULT_PASSWORD)]
    password: String,

    /// Only migrate the project with this name
    #[arg(long)]
    project: Option<String>,

    /// Only migrate milestones with this title
    #[arg(long)]
    milestone: Option<String>,

    /// Only migrate the ticket with this number; 0 migrates all
    #[arg(long, default_value_t = 0)]
    number: u64,

    /// Scope of the state labels, as in '<key>::open'
    #[arg(long, default_value = DEFAULT_STATE_KEY)]
    state_key: String,

    /// Delete every group, project and user (except root and the token
    /// owner) instead of migrating
    #[arg(long)]
    delete: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Export archive written by 'lh export'
    archive: PathBuf,
}

impl Args {
    fn options(&self) -> MigrateOptions {
        MigrateOptions {
            groups_path: self.groups.clone(),
            password: self.password.clone(),
            project: self.project.clone(),
            milestone: self.milestone.clone(),
            number: self.number,
            state_key: self.state_key.clone(),
            ..MigrateOptions::new(self.users.clone().unwrap_or_default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.verbose, None)?;

    run(args).await.map_err(|e| {
        let err = AppError::from(e);
        error!("{}", err);
        let mut message = err.user_message();
        if let Some(action) = err.suggested_action() {
            message = format!("{}\nhint: {}", message, action);
        }
        anyhow::Error::new(err).context(message)
    })
}

async fn run(args: Args) -> migrate::Result<()> {
    let options = args.options();
    if !args.delete {
        options.validate()?;
    }
    let gitlab = GitLabClient::new(&args.base_url, &args.token, args.insecure)?;

    let Some(archive) = ExportArchive::open_until(&args.archive, interrupted()).await? else {
        warn!("Interrupted while extracting {}", args.archive.display());
        std::process::exit(1);
    };
    info!(
        users = archive.users.len(),
        projects = archive.projects.len(),
        "Loaded export archive"
    );

    let outcome = tokio::select! {
        result = execute(gitlab, options, &archive, args.delete) => Some(result),
        () = interrupted() => None,
    };

    match outcome {
        Some(result) => {
            let closed = archive.close();
            result?;
            closed
        }
        None => {
            warn!("Interrupted, removing {}", archive.path().display());
            if let Err(e) = archive.close() {
                error!("Could not remove the extracted archive: {}", e);
            }
            std::process::exit(1);
        }
    }
}

/// Completes on Ctrl-C; never completes if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn execute(
    gitlab: GitLabClient,
    options: MigrateOptions,
    archive: &ExportArchive,
    delete: bool,
) -> migrate::Result<()> {
    if delete {
        warn!("Deleting all groups, projects and users on {}", gitlab.api_url());
        Migrator::delete_all(&gitlab).await?;
        eprintln!("GitLab instance emptied");
        return Ok(());
    }

    let summary = Migrator::new(gitlab, options).run(archive).await?;
    eprintln!(
        "Migrated {} users, {} groups, {} projects, {} milestones and {} issues ({} warnings)",
        summary.users, summary.groups, summary.projects, summary.milestones, summary.issues, summary.warnings
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from([
            "lhtogitlab",
            "--token",
            "t",
            "--base-url",
            "https://gitlab.example.com",
            "--users",
            "users.json",
            "acme.tar.gz",
        ])
        .unwrap();

        let options = args.options();
        assert_eq!(options.users_path, PathBuf::from("users.json"));
        assert_eq!(options.password, "changeme");
        assert_eq!(options.state_key, "lh");
        assert_eq!(options.number, 0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_users_required_unless_deleting() {
        let base = ["lhtogitlab", "--token", "t", "--base-url", "https://gitlab.example.com"];

        let mut missing = base.to_vec();
        missing.push("acme.tar.gz");
        assert!(Args::try_parse_from(&missing).is_err());

        let mut delete = base.to_vec();
        delete.extend(["--delete", "acme.tar.gz"]);
        let args = Args::try_parse_from(&delete).unwrap();
        assert!(args.delete);
        assert!(args.users.is_none());
    }

    #[test]
    fn test_filters() {
        let args = Args::try_parse_from([
            "lhtogitlab",
            "--token",
            "t",
            "--base-url",
            "https://gitlab.example.com",
            "--users",
            "users.json",
            "--project",
            "Web",
            "--number",
            "12",
            "--state-key",
            "status",
            "acme.tar.gz",
        ])
        .unwrap();

        let options = args.options();
        assert_eq!(options.project.as_deref(), Some("Web"));
        assert_eq!(options.number, 12);
        assert_eq!(options.state_key, "status");
    }
}
