//! Reads an account export produced by `lh export`.
//!
//! The archive is unpacked into a temporary directory that lives as long as
//! the [`ExportArchive`]; attachments are uploaded straight from there.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{MigrateError, Result};
use crate::api::resources::{Attachment, Membership, Milestone, Project, Ticket, User};

const TEMP_PREFIX: &str = "lhtogitlab";

/// A user with their account memberships.
#[derive(Debug, Clone)]
pub struct ExportedUser {
    pub user: User,
    pub memberships: Vec<Membership>,
}

/// A ticket attachment present in the archive.
#[derive(Debug, Clone)]
pub struct ExportedAttachment {
    pub attachment: Attachment,
    /// Location of the extracted file.
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExportedTicket {
    pub ticket: Ticket,
    pub attachments: Vec<ExportedAttachment>,
}

#[derive(Debug, Clone)]
pub struct ExportedProject {
    pub project: Project,
    /// One membership per user.
    pub memberships: Vec<Membership>,
    /// Sorted by ID.
    pub milestones: Vec<Milestone>,
    /// Sorted by number.
    pub tickets: Vec<ExportedTicket>,
}

/// An unpacked export archive.
#[derive(Debug)]
pub struct ExportArchive {
    dir: TempDir,
    /// Sorted by ID.
    pub users: Vec<ExportedUser>,
    /// Sorted by ID.
    pub projects: Vec<ExportedProject>,
}

impl ExportArchive {
    /// Unpack `path` into a fresh temporary directory and load it.
    ///
    /// The directory is removed again if loading fails.
    pub fn open(path: &Path) -> Result<Self> {
        let dir = extraction_dir()?;
        unpack(path, dir.path(), &AtomicBool::new(false))?;
        Self::load(dir)
    }

    /// Like [`open`](Self::open), but gives up once `shutdown` completes.
    ///
    /// Extraction runs on a blocking thread and stops at the next entry
    /// after `shutdown`; the directory is then removed and `None` returned.
    pub async fn open_until<F>(path: &Path, shutdown: F) -> Result<Option<Self>>
    where
        F: Future<Output = ()>,
    {
        Self::extract_until(path.to_path_buf(), extraction_dir()?, shutdown).await
    }

    async fn extract_until<F>(path: PathBuf, dir: TempDir, shutdown: F) -> Result<Option<Self>>
    where
        F: Future<Output = ()>,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut task = tokio::task::spawn_blocking({
            let cancel = Arc::clone(&cancel);
            let dest = dir.path().to_path_buf();
            move || unpack(&path, &dest, &cancel)
        });

        let finished = tokio::select! {
            biased;
            () = shutdown => None,
            joined = &mut task => Some(joined),
        };

        match finished {
            Some(joined) => {
                joined.map_err(|e| MigrateError::Archive(e.to_string()))??;
                Self::load(dir).map(Some)
            }
            None => {
                cancel.store(true, Ordering::Relaxed);
                // The blocking thread writes into `dir` until it sees the flag.
                let _ = task.await;
                warn!(dir = %dir.path().display(), "Extraction interrupted");
                dir.close()?;
                Ok(None)
            }
        }
    }

    /// Load an already unpacked export from `dir`.
    pub fn load(dir: TempDir) -> Result<Self> {
        let users = read_users(dir.path())?;
        let projects = read_projects(dir.path())?;
        info!(users = users.len(), projects = projects.len(), "Loaded export");
        Ok(Self { dir, users, projects })
    }

    /// The extraction directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the extraction directory now, reporting failures.
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

fn extraction_dir() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?)
}

/// Unpack the gzipped tar at `path` into `dest`, checking `cancel` before
/// each entry.
fn unpack(path: &Path, dest: &Path, cancel: &AtomicBool) -> Result<()> {
    info!(archive = %path.display(), dir = %dest.display(), "Extracting export");
    let archive_error = |e: std::io::Error| MigrateError::Archive(format!("{}: {}", path.display(), e));

    let file = File::open(path).map_err(archive_error)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_overwrite(true);
    for entry in archive.entries().map_err(archive_error)? {
        if cancel.load(Ordering::Relaxed) {
            debug!("Extraction cancelled");
            return Ok(());
        }
        entry.map_err(archive_error)?.unpack_in(dest).map_err(archive_error)?;
    }
    Ok(())
}

/// Entries at exactly `depth` below `root`, sorted by path.
fn entries_at(root: &Path, depth: usize) -> Result<Vec<walkdir::DirEntry>> {
    let entries = WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .sort_by_file_name()
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(std::io::Error::from)?;
    Ok(entries)
}

/// Directories matching `<root>/*/<kind>/*`.
fn kind_dirs(root: &Path, kind: &str) -> Result<Vec<PathBuf>> {
    Ok(entries_at(root, 3)?
        .into_iter()
        .filter(|e| e.file_type().is_dir())
        .filter(|e| e.path().parent().and_then(Path::file_name) == Some(OsStr::new(kind)))
        .map(walkdir::DirEntry::into_path)
        .collect())
}

/// Regular files directly inside `dir`, sorted by name.
fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    Ok(entries_at(dir, 1)?
        .into_iter()
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| MigrateError::Archive(format!("{}: {}", path.display(), e)))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| MigrateError::Archive(format!("{}: {}", path.display(), e)))
}

/// Like [`read_json`], but a missing file yields `None`.
fn read_optional_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if path.is_file() {
        read_json(path).map(Some)
    } else {
        Ok(None)
    }
}

fn read_users(root: &Path) -> Result<Vec<ExportedUser>> {
    let mut users = Vec::new();
    for dir in kind_dirs(root, "users")? {
        let user: User = read_json(&dir.join("user.json"))?;
        let memberships = read_optional_json(&dir.join("memberships.json"))?.unwrap_or_default();
        debug!(user_id = user.id, "Read user");
        users.push(ExportedUser { user, memberships });
    }
    users.sort_by_key(|u| u.user.id);
    Ok(users)
}

fn read_projects(root: &Path) -> Result<Vec<ExportedProject>> {
    let mut projects = Vec::new();
    for dir in kind_dirs(root, "projects")? {
        let project: Project = read_json(&dir.join("project.json"))?;
        debug!(project = %project.name, "Read project");

        let memberships: Vec<Membership> =
            read_optional_json(&dir.join("memberships.json"))?.unwrap_or_default();

        let mut milestones = Vec::new();
        for path in files_in(&dir.join("milestones"))? {
            milestones.push(read_json::<Milestone>(&path)?);
        }
        milestones.sort_by_key(|m| m.id);

        let mut tickets = Vec::new();
        let tickets_dir = dir.join("tickets");
        if tickets_dir.is_dir() {
            for entry in entries_at(&tickets_dir, 1)? {
                if entry.file_type().is_dir() {
                    tickets.push(read_ticket(entry.path())?);
                }
            }
        }
        tickets.sort_by_key(|t| t.ticket.number);

        projects.push(ExportedProject {
            project,
            memberships: unique_by_user(memberships),
            milestones,
            tickets,
        });
    }
    projects.sort_by_key(|p| p.project.id);
    Ok(projects)
}

fn read_ticket(dir: &Path) -> Result<ExportedTicket> {
    let ticket: Ticket = read_json(&dir.join("ticket.json"))?;
    let by_name: HashMap<&str, &Attachment> = ticket
        .attachment_list()
        .map(|a| (a.filename.as_str(), a))
        .collect();

    let mut attachments = Vec::new();
    for path in files_in(dir)? {
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };
        if name == "ticket.json" {
            continue;
        }
        if let Some(attachment) = by_name.get(name) {
            attachments.push(ExportedAttachment {
                attachment: (*attachment).clone(),
                path: path.clone(),
            });
        }
    }

    Ok(ExportedTicket { ticket, attachments })
}

/// Keep the first membership of each user.
fn unique_by_user(memberships: Vec<Membership>) -> Vec<Membership> {
    let mut seen = HashSet::new();
    memberships
        .into_iter()
        .filter(|m| seen.insert(m.user_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::resources::{AttachmentEntry, TicketVersion};
    use crate::export::ArchiveWriter;

    fn membership(id: u64, user_id: u64) -> Membership {
        Membership {
            id,
            user_id,
            ..Default::default()
        }
    }

    fn write_sample(path: &Path) {
        let mut writer = ArchiveWriter::new(File::create(path).unwrap());
        writer.write_dir("acme").unwrap();
        writer.write_dir("acme/users/9-ada").unwrap();
        writer
            .write_json("acme/users/9-ada/user.json", &User { id: 9, name: "Ada".to_string(), ..Default::default() })
            .unwrap();
        writer
            .write_json("acme/users/2-bob/user.json", &User { id: 2, name: "Bob".to_string(), ..Default::default() })
            .unwrap();

        let project = Project {
            id: 1,
            name: "Web".to_string(),
            ..Default::default()
        };
        writer.write_json("acme/projects/1-web/project.json", &project).unwrap();
        writer
            .write_json(
                "acme/projects/1-web/memberships.json",
                &vec![membership(1, 9), membership(2, 2), membership(3, 9)],
            )
            .unwrap();
        for id in [7u64, 3] {
            let milestone = Milestone { id, ..Default::default() };
            writer
                .write_json(&format!("acme/projects/1-web/milestones/{}-m-json", id), &milestone)
                .unwrap();
        }

        let attachment = Attachment {
            id: 4,
            filename: "trace.log".to_string(),
            ..Default::default()
        };
        let ticket = Ticket {
            number: 12,
            attachments: vec![AttachmentEntry { attachment }],
            versions: vec![TicketVersion::default()],
            ..Default::default()
        };
        writer.write_json("acme/projects/1-web/tickets/12-login/ticket.json", &ticket).unwrap();
        writer.write_file("acme/projects/1-web/tickets/12-login/trace.log", b"boom").unwrap();
        writer.write_file("acme/projects/1-web/tickets/12-login/stray.txt", b"?").unwrap();
        let ticket = Ticket { number: 5, ..Default::default() };
        writer.write_json("acme/projects/1-web/tickets/5-other/ticket.json", &ticket).unwrap();

        writer.finish().unwrap();
    }

    #[test]
    fn test_reads_what_the_exporter_writes() {
        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("acme_2024-01-01.tar.gz");
        write_sample(&path);

        let archive = ExportArchive::open(&path).unwrap();

        let user_ids: Vec<u64> = archive.users.iter().map(|u| u.user.id).collect();
        assert_eq!(user_ids, vec![2, 9]);
        assert!(archive.users[0].memberships.is_empty());

        assert_eq!(archive.projects.len(), 1);
        let project = &archive.projects[0];
        assert_eq!(project.project.name, "Web");
        assert_eq!(
            project.memberships.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(
            project.milestones.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![3, 7]
        );
        assert_eq!(
            project.tickets.iter().map(|t| t.ticket.number).collect::<Vec<_>>(),
            vec![5, 12]
        );

        let ticket = &project.tickets[1];
        assert_eq!(ticket.attachments.len(), 1);
        assert_eq!(ticket.attachments[0].attachment.id, 4);
        assert_eq!(std::fs::read(&ticket.attachments[0].path).unwrap(), b"boom");
        assert!(ticket.attachments[0].path.starts_with(archive.path()));
    }

    #[test]
    fn test_close_removes_extraction_dir() {
        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("export.tar.gz");
        write_sample(&path);

        let archive = ExportArchive::open(&path).unwrap();
        let dir = archive.path().to_path_buf();
        assert!(dir.exists());
        archive.close().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_shutdown_during_extraction_removes_dir() {
        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("export.tar.gz");
        write_sample(&path);
        let parent = tempfile::tempdir().unwrap();
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(parent.path())
            .unwrap();
        let extracted = dir.path().to_path_buf();

        let archive = ExportArchive::extract_until(path, dir, std::future::ready(()))
            .await
            .unwrap();
        assert!(archive.is_none());
        assert!(!extracted.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_open_until_loads_without_shutdown() {
        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("export.tar.gz");
        write_sample(&path);

        let archive = ExportArchive::open_until(&path, std::future::pending())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(archive.users.len(), 2);
        assert_eq!(archive.projects.len(), 1);
        archive.close().unwrap();
    }

    #[test]
    fn test_cancelled_unpack_writes_nothing() {
        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("export.tar.gz");
        write_sample(&path);
        let dest = tempfile::tempdir().unwrap();

        unpack(&path, dest.path(), &AtomicBool::new(true)).unwrap();
        assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_archive_is_archive_error() {
        let err = ExportArchive::open(Path::new("/nonexistent/export.tar.gz")).unwrap_err();
        assert!(matches!(err, MigrateError::Archive(_)));
    }

    #[test]
    fn test_unique_by_user_keeps_first() {
        let unique = unique_by_user(vec![membership(1, 5), membership(2, 6), membership(3, 5)]);
        assert_eq!(unique.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 2]);
    }
}
