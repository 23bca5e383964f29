// ── SFTP endpoint (ssh2) ─────────────────────────────────────────────────────

use crate::sftp::auth::authenticate;
use crate::sftp::endpoint::{split_path, EntryInfo, FileEndpoint};
use crate::sftp::error::{TransferError, TransferResult};
use crate::sftp::fingerprint::{self, HostKey, Verification};
use crate::sftp::types::ConnectionSpec;
use crate::sftp::workdir::WorkDir;
use chrono::{DateTime, TimeZone, Utc};
use filerelay_core::{connect_tcp, resolve_first};
use log::{debug, info, warn};
use ssh2::{FileStat, HashType, MethodType, OpenFlags, OpenType, Session, Sftp};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

/// Remote endpoint over one SSH session with an SFTP channel. Connects
/// lazily on the first [`FileEndpoint::ensure_connected`] and reconnects when
/// the session stops answering.
pub struct SftpEndpoint<'w> {
    conn: ConnectionSpec,
    workdir: &'w WorkDir,
    session: Option<Session>,
    sftp: Option<Sftp>,
}

fn sftp_err(op: &str, path: &str, e: ssh2::Error) -> TransferError {
    TransferError::from(e).context(format!("{} '{}'", op, path))
}

fn mtime_to_utc(mtime: Option<u64>) -> Option<DateTime<Utc>> {
    mtime.and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
}

fn entry_from_stat(name: String, path: String, stat: &FileStat) -> EntryInfo {
    EntryInfo {
        name,
        path,
        is_dir: stat.is_dir(),
        is_file: stat.is_file(),
        size: stat.size.unwrap_or(0),
        modified: mtime_to_utc(stat.mtime),
    }
}

impl<'w> SftpEndpoint<'w> {
    pub fn new(conn: ConnectionSpec, workdir: &'w WorkDir) -> Self {
        Self {
            conn,
            workdir,
            session: None,
            sftp: None,
        }
    }

    // ── Connect ──────────────────────────────────────────────────────────────

    pub fn connect(&mut self) -> TransferResult<()> {
        let host = self.conn.address.trim().to_string();
        let port = self.conn.port;
        let timeout = Duration::from_secs(self.conn.connection_timeout_secs.max(1));
        info!("SFTP connecting to {}:{}", host, port);

        let addr = resolve_first(&host, port).map_err(TransferError::connection)?;
        let tcp = connect_tcp(addr, timeout).map_err(TransferError::connection)?;

        let mut session = Session::new().map_err(|e| {
            TransferError::connection(format!("Failed to create SSH session: {}", e))
        })?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));

        let host_key_algorithm = self
            .conn
            .host_key_algorithm
            .as_deref()
            .filter(|a| !a.trim().is_empty());
        if let Some(alg) = host_key_algorithm {
            session.method_pref(MethodType::HostKey, alg.trim()).map_err(|e| {
                TransferError::connection(format!(
                    "Unsupported host key algorithm '{}': {}",
                    alg, e
                ))
            })?;
        }

        session.handshake().map_err(|e| {
            TransferError::connection(format!("SSH handshake with {} failed: {}", addr, e))
        })?;

        self.verify_host_key(&session)?;
        authenticate(&session, &self.conn, self.workdir)?;

        if self.conn.keepalive_interval_secs > 0 {
            session.set_keepalive(true, self.conn.keepalive_interval_secs);
        }

        let sftp = session.sftp().map_err(|e| {
            TransferError::connection(format!("Failed to open SFTP channel: {}", e))
        })?;

        info!("SFTP session established to {}:{}", host, port);
        self.session = Some(session);
        self.sftp = Some(sftp);
        Ok(())
    }

    fn verify_host_key(&self, session: &Session) -> TransferResult<()> {
        let Some(expected) = self.conn.server_fingerprint.as_deref() else {
            return Ok(());
        };
        let (raw, _kind) = session.host_key().ok_or_else(|| {
            TransferError::connection("key exchange negotiation failed: no host key received")
        })?;
        let md5 = session
            .host_key_hash(HashType::Md5)
            .and_then(|h| <[u8; 16]>::try_from(h).ok());
        let key = HostKey::new(raw.to_vec(), md5);

        match fingerprint::verify(expected, &key) {
            Verification::Trusted => {
                debug!("Host key of {} trusted ({})", self.conn.address, key.md5_colon_hex());
                Ok(())
            }
            Verification::Rejected(reason) => {
                warn!("Host key of {} rejected: {}", self.conn.address, reason);
                Err(TransferError::connection(format!(
                    "key exchange negotiation failed: {}",
                    reason
                )))
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.sftp = None;
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "filerelay done", None);
        }
    }

    /// Keepalive plus a cheap SFTP round-trip.
    fn is_alive(&self) -> bool {
        match (&self.session, &self.sftp) {
            (Some(session), Some(sftp)) => {
                session.keepalive_send().is_ok() && sftp.realpath(Path::new(".")).is_ok()
            }
            _ => false,
        }
    }

    fn sftp(&self) -> TransferResult<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| TransferError::connection("SFTP session is not connected"))
    }
}

impl Drop for SftpEndpoint<'_> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl FileEndpoint for SftpEndpoint<'_> {
    fn describe(&self) -> String {
        format!("sftp://{}@{}:{}", self.conn.user_name, self.conn.address, self.conn.port)
    }

    fn ensure_connected(&mut self) -> TransferResult<()> {
        if self.is_alive() {
            return Ok(());
        }
        if self.session.is_some() {
            warn!("SFTP connection to {} lost, reconnecting", self.conn.address);
            self.disconnect();
        }
        self.connect()
    }

    fn list(&self, dir: &str) -> TransferResult<Vec<EntryInfo>> {
        let raw = self
            .sftp()?
            .readdir(Path::new(dir))
            .map_err(|e| sftp_err("list", dir, e))?;
        Ok(raw
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().to_string();
                if name == "." || name == ".." {
                    return None;
                }
                let full = self.join(dir, &name);
                Some(entry_from_stat(name, full, &stat))
            })
            .collect())
    }

    fn stat(&self, path: &str) -> TransferResult<Option<EntryInfo>> {
        match self.sftp()?.stat(Path::new(path)) {
            Ok(stat) => {
                let (_, name) = split_path(path);
                Ok(Some(entry_from_stat(name.to_string(), path.to_string(), &stat)))
            }
            Err(e) => {
                let err = sftp_err("stat", path, e);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn create_dir_all(&self, dir: &str) -> TransferResult<()> {
        let sftp = self.sftp()?;
        let mut current = if dir.starts_with('/') { String::from("/") } else { String::new() };
        for part in dir.split('/').filter(|p| !p.is_empty()) {
            current = self.join(&current, part);
            if self.stat(&current)?.is_none() {
                sftp.mkdir(Path::new(&current), 0o755)
                    .map_err(|e| sftp_err("create directory", &current, e))?;
                debug!("SFTP mkdir {}", current);
            }
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> TransferResult<()> {
        self.sftp()?
            .rename(Path::new(from), Path::new(to), None)
            .map_err(|e| TransferError::from(e).context(format!("rename '{}' to '{}'", from, to)))
    }

    fn remove_file(&self, path: &str) -> TransferResult<()> {
        self.sftp()?
            .unlink(Path::new(path))
            .map_err(|e| sftp_err("delete", path, e))
    }

    fn remove_dir(&self, path: &str) -> TransferResult<()> {
        self.sftp()?
            .rmdir(Path::new(path))
            .map_err(|e| sftp_err("remove directory", path, e))
    }

    fn set_modified(&self, path: &str, modified: DateTime<Utc>) -> TransferResult<()> {
        let secs = modified.timestamp().max(0) as u64;
        let stat = FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: None,
            atime: Some(secs),
            mtime: Some(secs),
        };
        self.sftp()?
            .setstat(Path::new(path), stat)
            .map_err(|e| sftp_err("set modified time of", path, e))
    }

    fn open_read(&self, path: &str) -> TransferResult<Box<dyn Read + '_>> {
        let file = self
            .sftp()?
            .open(Path::new(path))
            .map_err(|e| sftp_err("open", path, e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &str, append: bool) -> TransferResult<Box<dyn Write + '_>> {
        let sftp = self.sftp()?;
        let flags = if append {
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND
        } else {
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE
        };
        let mut file = sftp
            .open_mode(Path::new(path), flags, 0o644, OpenType::File)
            .map_err(|e| sftp_err("open for writing", path, e))?;
        if append {
            // Not every server honours the append flag; write from the current end.
            let size = file.stat().map_err(|e| sftp_err("stat", path, e))?.size.unwrap_or(0);
            file.seek(SeekFrom::Start(size))
                .map_err(|e| TransferError::from(e).context(format!("seek '{}'", path)))?;
        }
        Ok(Box::new(file))
    }

    fn read_tail(&self, path: &str, len: u64) -> TransferResult<Vec<u8>> {
        let mut file = self
            .sftp()?
            .open(Path::new(path))
            .map_err(|e| sftp_err("open", path, e))?;
        let size = file.stat().map_err(|e| sftp_err("stat", path, e))?.size.unwrap_or(0);
        file.seek(SeekFrom::Start(size.saturating_sub(len)))
            .map_err(|e| TransferError::from(e).context(format!("seek '{}'", path)))?;
        let mut tail = Vec::with_capacity(len as usize);
        file.read_to_end(&mut tail)
            .map_err(|e| TransferError::from(e).context(format!("read '{}'", path)))?;
        Ok(tail)
    }

    fn truncate(&self, path: &str, len: u64) -> TransferResult<()> {
        let stat = FileStat {
            size: Some(len),
            uid: None,
            gid: None,
            perm: None,
            atime: None,
            mtime: None,
        };
        self.sftp()?
            .setstat(Path::new(path), stat)
            .map_err(|e| sftp_err("truncate", path, e))
    }
}
