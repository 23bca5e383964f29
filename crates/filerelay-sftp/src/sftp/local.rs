// ── Local filesystem endpoint ────────────────────────────────────────────────

use crate::sftp::endpoint::{EntryInfo, FileEndpoint};
use crate::sftp::error::{TransferError, TransferResult};
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::fs::{self, Metadata, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct LocalEndpoint;

impl LocalEndpoint {
    pub fn new() -> Self {
        Self
    }
}

fn io_err(op: &str, path: &str, e: std::io::Error) -> TransferError {
    TransferError::from(e).context(format!("{} '{}'", op, path))
}

fn entry_from_metadata(name: String, path: String, meta: &Metadata) -> EntryInfo {
    EntryInfo {
        name,
        path,
        is_dir: meta.is_dir(),
        is_file: meta.is_file(),
        size: meta.len(),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    }
}

impl FileEndpoint for LocalEndpoint {
    fn describe(&self) -> String {
        "local".to_string()
    }

    fn ensure_connected(&mut self) -> TransferResult<()> {
        Ok(())
    }

    fn list(&self, dir: &str) -> TransferResult<Vec<EntryInfo>> {
        let rd = fs::read_dir(dir).map_err(|e| io_err("list", dir, e))?;
        let mut entries = Vec::new();
        for entry in rd {
            let entry = entry.map_err(|e| io_err("list", dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "." || name == ".." {
                continue;
            }
            let path = self.join(dir, &name);
            // Follow symlinks; a dangling link is skipped.
            let Ok(meta) = fs::metadata(entry.path()) else {
                continue;
            };
            entries.push(entry_from_metadata(name, path, &meta));
        }
        Ok(entries)
    }

    fn stat(&self, path: &str) -> TransferResult<Option<EntryInfo>> {
        match fs::metadata(path) {
            Ok(meta) => {
                let name = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(Some(entry_from_metadata(name, path.to_string(), &meta)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("stat", path, e)),
        }
    }

    fn create_dir_all(&self, dir: &str) -> TransferResult<()> {
        fs::create_dir_all(dir).map_err(|e| io_err("create directory", dir, e))
    }

    fn rename(&self, from: &str, to: &str) -> TransferResult<()> {
        fs::rename(from, to)
            .map_err(|e| TransferError::from(e).context(format!("rename '{}' to '{}'", from, to)))
    }

    fn remove_file(&self, path: &str) -> TransferResult<()> {
        fs::remove_file(path).map_err(|e| io_err("delete", path, e))
    }

    fn remove_dir(&self, path: &str) -> TransferResult<()> {
        fs::remove_dir(path).map_err(|e| io_err("remove directory", path, e))
    }

    fn set_modified(&self, path: &str, modified: DateTime<Utc>) -> TransferResult<()> {
        let ft = FileTime::from_unix_time(modified.timestamp(), modified.timestamp_subsec_nanos());
        filetime::set_file_mtime(path, ft).map_err(|e| io_err("set modified time of", path, e))
    }

    fn open_read(&self, path: &str) -> TransferResult<Box<dyn Read + '_>> {
        let file = fs::File::open(path).map_err(|e| io_err("open", path, e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &str, append: bool) -> TransferResult<Box<dyn Write + '_>> {
        let mut opts = OpenOptions::new();
        opts.create(true);
        if append {
            opts.append(true);
        } else {
            opts.write(true).truncate(true);
        }
        let file = opts.open(path).map_err(|e| io_err("open for writing", path, e))?;
        Ok(Box::new(file))
    }

    fn read_tail(&self, path: &str, len: u64) -> TransferResult<Vec<u8>> {
        let mut file = fs::File::open(path).map_err(|e| io_err("open", path, e))?;
        let size = file.metadata().map_err(|e| io_err("stat", path, e))?.len();
        file.seek(SeekFrom::Start(size.saturating_sub(len)))
            .map_err(|e| io_err("seek", path, e))?;
        let mut tail = Vec::with_capacity(len as usize);
        file.read_to_end(&mut tail).map_err(|e| io_err("read", path, e))?;
        Ok(tail)
    }

    fn truncate(&self, path: &str, len: u64) -> TransferResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| io_err("open for writing", path, e))?;
        file.set_len(len).map_err(|e| io_err("truncate", path, e))
    }

    fn separator(&self) -> char {
        std::path::MAIN_SEPARATOR
    }
}
