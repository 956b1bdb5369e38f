//! Gzip-compressed tar writer for export archives.

use std::io::{self, Write};

use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use tar::{Builder, EntryType, Header};
use tracing::trace;

use super::Result;

/// Mode of directory entries.
const DIR_MODE: u32 = 0o755;
/// Mode of file entries.
const FILE_MODE: u32 = 0o644;
/// Owner and group of every entry.
const OWNER_ID: u64 = 1000;

/// Writes directory, file and JSON entries into a `.tar.gz` stream.
pub struct ArchiveWriter<W: Write> {
    builder: Builder<GzEncoder<W>>,
    mtime: u64,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        let mtime = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        Self {
            builder: Builder::new(GzEncoder::new(writer, Compression::default())),
            mtime,
        }
    }

    fn header(&self, entry_type: EntryType, mode: u32, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_uid(OWNER_ID);
        header.set_gid(OWNER_ID);
        header.set_size(size);
        header.set_mtime(self.mtime);
        header
    }

    /// Add a directory entry.
    pub fn write_dir(&mut self, path: &str) -> io::Result<()> {
        trace!(path, "Writing directory entry");
        let mut header = self.header(EntryType::Directory, DIR_MODE, 0);
        let path = format!("{}/", path.trim_end_matches('/'));
        self.builder.append_data(&mut header, path, io::empty())
    }

    /// Add a regular file entry.
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        trace!(path, size = data.len(), "Writing file entry");
        let mut header = self.header(EntryType::Regular, FILE_MODE, data.len() as u64);
        self.builder.append_data(&mut header, path, data)
    }

    /// Add a file holding `value` as pretty-printed JSON.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, path: &str, value: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)?;
        self.write_file(path, &data)?;
        Ok(())
    }

    /// Write the tar trailer, flush the gzip stream and return the writer.
    pub fn finish(self) -> io::Result<W> {
        self.builder.into_inner()?.finish()
    }
}
