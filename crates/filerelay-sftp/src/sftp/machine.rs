// ── Single-file transfer state machine ───────────────────────────────────────
//
// lock source → resolve destination → check destination → put / append →
// preserve mtime → source post-operation → cleanup, with restoration of every
// tracked rename and partial write when any step fails.

use crate::sftp::endpoint::{has_separator, split_path, EndpointRef, FileEndpoint};
use crate::sftp::error::{TransferError, TransferResult};
use crate::sftp::macros::MacroEngine;
use crate::sftp::types::*;
use filerelay_core::OperationLog;
use log::{debug, info, warn};
use std::io::{ErrorKind, Read, Write};
use tokio_util::sync::CancellationToken;

/// Suffix of lock and temporary names: `<uuid>.8CO`.
pub const TEMP_SUFFIX: &str = ".8CO";

pub fn temp_name() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), TEMP_SUFFIX)
}

pub fn is_temp_name(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}

/// Everything one item needs besides its endpoints. Shared across the batch.
pub struct TransferContext<'a> {
    pub source: &'a SourceSpec,
    pub destination: &'a DestinationSpec,
    pub options: &'a TransferOptions,
    pub macros: &'a MacroEngine,
    /// Destination directory after macro expansion.
    pub destination_directory: &'a str,
    pub buffer_size: usize,
    pub cancel: &'a CancellationToken,
    pub log: &'a OperationLog,
}

// ── Tracked state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum DestinationTemp {
    /// New content being written under a temporary name.
    Staged(String),
    /// The pre-existing destination moved aside while appending.
    RenamedOriginal(String),
}

#[derive(Debug)]
struct Tracked {
    phase: TransferPhase,
    source_current: String,
    destination: Option<String>,
    destination_temp: Option<DestinationTemp>,
    destination_existed: bool,
    /// The pre-existing destination was deleted to make room for the new one.
    destination_deleted: bool,
    /// Destination written in place (no temporary name).
    destination_in_place: bool,
    /// Size of the existing destination before appending to it.
    destination_original_size: Option<u64>,
    /// Final destination name holds this run's content.
    destination_committed: bool,
    /// Every temporary name this run created, per side.
    source_temps: Vec<String>,
    destination_temps: Vec<String>,
}

impl Tracked {
    fn new(item: &TransferItem) -> Self {
        Self {
            phase: TransferPhase::RenameSourceLock,
            source_current: item.path.clone(),
            destination: None,
            destination_temp: None,
            destination_existed: false,
            destination_deleted: false,
            destination_in_place: false,
            destination_original_size: None,
            destination_committed: false,
            source_temps: Vec::new(),
            destination_temps: Vec::new(),
        }
    }
}

// ── Machine ──────────────────────────────────────────────────────────────────

pub struct SingleTransfer<'a, S: FileEndpoint, D: FileEndpoint> {
    source: &'a S,
    destination: &'a D,
    ctx: &'a TransferContext<'a>,
}

impl<'a, S, D> SingleTransfer<'a, S, D>
where
    S: FileEndpoint,
    D: FileEndpoint,
{
    pub fn new(source: &'a S, destination: &'a D, ctx: &'a TransferContext<'a>) -> Self {
        Self {
            source,
            destination,
            ctx,
        }
    }

    /// Run the full protocol for one item. Never panics and never returns an
    /// error: failures are captured in the result after restoration.
    pub fn transfer_one(&self, item: &TransferItem) -> SingleTransferResult {
        let mut st = Tracked::new(item);
        match self.run(item, &mut st) {
            Ok(result) => result,
            Err(err) => self.fail(item, &mut st, err),
        }
    }

    fn run(&self, item: &TransferItem, st: &mut Tracked) -> TransferResult<SingleTransferResult> {
        let src = EndpointRef::Source(self.source);
        let opts = self.ctx.options;
        let mut warnings = Vec::new();

        if self.ctx.cancel.is_cancelled() {
            return Err(TransferError::cancelled());
        }

        // 1. Source lock
        if opts.rename_source_file_before_transfer {
            st.phase = TransferPhase::RenameSourceLock;
            let lock = self.source.join(&item.directory, &temp_name());
            st.source_temps.push(lock.clone());
            self.source.rename(&item.path, &lock)?;
            debug!("Locked {} as {} on {}", item.path, lock, src);
            st.source_current = lock;
        }

        // 2. Destination path
        st.phase = TransferPhase::CheckDestinationExists;
        let dest_path = self.resolve_destination(item)?;
        st.destination = Some(dest_path.clone());

        // 3. Conflict handling and content transfer
        let exists = self.destination.exists(&dest_path)?;
        st.destination_existed = exists;
        match (exists, self.ctx.destination.action) {
            (true, DestinationAction::Error) => {
                return Err(TransferError::conflict(format!(
                    "destination file already exists: '{}'",
                    dest_path
                )));
            }
            (true, DestinationAction::Append) => self.append(st, &dest_path)?,
            (true, DestinationAction::Overwrite) | (false, _) => self.put(st, &dest_path, exists)?,
        }

        // 4. Modified time
        if opts.preserve_last_modified {
            st.phase = TransferPhase::PreserveModifiedTime;
            let modified = match item.modified {
                Some(m) => Some(m),
                None => self.source.stat(&st.source_current)?.and_then(|e| e.modified),
            };
            if let Some(m) = modified {
                self.destination.set_modified(&dest_path, m)?;
            }
        }

        // 5. Source post-operation
        self.source_operation(item, st, &mut warnings)?;

        // 6. Cleanup
        st.phase = TransferPhase::Cleanup;
        self.cleanup(st, &mut warnings);

        let line = format!("Transferred '{}' to '{}'", item.path, dest_path);
        info!("{}", line);
        self.ctx.log.push(line);

        Ok(SingleTransferResult {
            file_name: item.name.clone(),
            success: true,
            action_skipped: false,
            error_list: Vec::new(),
            warnings,
            transferred_file: Some(item.name.clone()),
            transferred_file_path: Some(item.path.clone()),
            transferred_destination_path: Some(dest_path),
            error: None,
        })
    }

    fn resolve_destination(&self, item: &TransferItem) -> TransferResult<String> {
        let name = self.ctx.macros.expand(&self.ctx.destination.file_name, &item.name)?;
        if has_separator(&name) {
            Ok(name)
        } else {
            Ok(self.destination.join(self.ctx.destination_directory, &name))
        }
    }

    fn put(&self, st: &mut Tracked, dest_path: &str, exists: bool) -> TransferResult<()> {
        st.phase = TransferPhase::PutFile;
        if !self.ctx.options.rename_destination_file_during_transfer {
            st.destination_in_place = true;
            self.copy(&st.source_current, dest_path, false, &[])?;
            st.destination_committed = true;
            return Ok(());
        }

        let (dir, _) = split_path(dest_path);
        let temp = self.destination.join(dir, &temp_name());
        st.destination_temps.push(temp.clone());
        st.destination_temp = Some(DestinationTemp::Staged(temp.clone()));
        self.copy(&st.source_current, &temp, false, &[])?;

        if exists {
            st.phase = TransferPhase::DeleteDestination;
            self.destination.remove_file(dest_path)?;
            st.destination_deleted = true;
        }

        st.phase = TransferPhase::RenameDestinationLock;
        self.destination.rename(&temp, dest_path)?;
        st.destination_temp = None;
        st.destination_committed = true;
        Ok(())
    }

    fn append(&self, st: &mut Tracked, dest_path: &str) -> TransferResult<()> {
        let target = if self.ctx.options.rename_destination_file_during_transfer {
            st.phase = TransferPhase::RenameDestinationLock;
            let (dir, _) = split_path(dest_path);
            let temp = self.destination.join(dir, &temp_name());
            st.destination_temps.push(temp.clone());
            self.destination.rename(dest_path, &temp)?;
            st.destination_temp = Some(DestinationTemp::RenamedOriginal(temp.clone()));
            temp
        } else {
            st.destination_in_place = true;
            dest_path.to_string()
        };

        st.phase = TransferPhase::AppendFile;
        let size = self.destination.stat(&target)?.map(|e| e.size).unwrap_or(0);
        st.destination_original_size = Some(size);
        let separator = self.append_separator(&target, size)?;
        self.copy(&st.source_current, &target, true, &separator)?;

        if target != dest_path {
            st.phase = TransferPhase::RenameDestinationLock;
            self.destination.rename(&target, dest_path)?;
            st.destination_temp = None;
        }
        st.destination_committed = true;
        Ok(())
    }

    /// Line separator to write before appended content, if the existing
    /// content is non-empty and does not already end in a line break.
    fn append_separator(&self, target: &str, size: u64) -> TransferResult<Vec<u8>> {
        let dest = self.ctx.destination;
        if !dest.add_new_line || size == 0 {
            return Ok(Vec::new());
        }
        let tail = self.destination.read_tail(target, dest.encoding.tail_len())?;
        if dest.encoding.ends_with_line_break(&tail) {
            return Ok(Vec::new());
        }
        Ok(dest.encoding.encode(dest.line_separator.as_str()))
    }

    /// Chunked copy, checking the cancellation token before every chunk.
    fn copy(&self, from: &str, to: &str, append: bool, prefix: &[u8]) -> TransferResult<u64> {
        let mut reader = self.source.open_read(from)?;
        let mut writer = self.destination.open_write(to, append)?;
        let write_err =
            |e: std::io::Error| TransferError::from(e).context(format!("write '{}'", to));

        if !prefix.is_empty() {
            writer.write_all(prefix).map_err(write_err)?;
        }

        let mut buf = vec![0u8; self.ctx.buffer_size.max(1)];
        let mut total = prefix.len() as u64;
        loop {
            if self.ctx.cancel.is_cancelled() {
                return Err(TransferError::cancelled());
            }
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(TransferError::from(e).context(format!("read '{}'", from)));
                }
            };
            writer.write_all(&buf[..n]).map_err(write_err)?;
            total += n as u64;
        }
        writer.flush().map_err(write_err)?;
        debug!("Copied {} bytes from {} to {}", total, from, to);
        Ok(total)
    }

    fn source_operation(
        &self,
        item: &TransferItem,
        st: &mut Tracked,
        warnings: &mut Vec<String>,
    ) -> TransferResult<()> {
        let spec = self.ctx.source;
        match spec.operation {
            SourceOperation::Delete => {
                st.phase = TransferPhase::SourceOperationDelete;
                self.source.remove_file(&st.source_current)?;
                // Nothing left to restore on the source side.
                st.source_current.clear();
            }
            SourceOperation::Rename => {
                st.phase = TransferPhase::SourceOperationRename;
                let template = spec.file_name_after_transfer.as_deref().unwrap_or("");
                if template.trim().is_empty() {
                    return Err(TransferError::invalid_input(
                        "Source operation Rename needs a file name after transfer",
                    ));
                }
                let new_name = self.ctx.macros.expand(template, &item.name)?;
                let target = if has_separator(&new_name) {
                    new_name
                } else {
                    self.source.join(&item.directory, &new_name)
                };
                self.source.rename(&st.source_current, &target)?;
                st.source_current = target.clone();
                if !self.source.exists(&target)? {
                    let note = format!(
                        "Source file '{}' was renamed to '{}' but can no longer be found",
                        item.path, target
                    );
                    warn!("{}", note);
                    self.ctx.log.push(note.clone());
                    warnings.push(note);
                }
            }
            SourceOperation::Move => {
                st.phase = TransferPhase::SourceOperationMove;
                let template = spec.directory_to_move_after_transfer.as_deref().unwrap_or("");
                if template.trim().is_empty() {
                    return Err(TransferError::invalid_input(
                        "Source operation Move needs a directory to move to",
                    ));
                }
                let dir = self.ctx.macros.expand_directory(template)?;
                if !self.source.exists(&dir)? {
                    return Err(TransferError::not_found(format!(
                        "Directory '{}' to move the source file to does not exist",
                        dir
                    )));
                }
                let target = self.source.join(&dir, &item.name);
                self.source.rename(&st.source_current, &target)?;
                st.source_current = target;
            }
            SourceOperation::Nothing => {
                if st.source_current != item.path {
                    st.phase = TransferPhase::SourceOperationRestore;
                    self.source.rename(&st.source_current, &item.path)?;
                    st.source_current = item.path.clone();
                }
            }
        }
        Ok(())
    }

    /// Remove temporary names that are still present after a successful run.
    /// Failures become warnings; the transfer itself already succeeded.
    fn cleanup(&self, st: &Tracked, warnings: &mut Vec<String>) {
        for temp in st.source_temps.iter().filter(|t| **t != st.source_current) {
            remove_leftover(EndpointRef::Source(self.source), temp, warnings);
        }
        for temp in &st.destination_temps {
            remove_leftover(EndpointRef::Destination(self.destination), temp, warnings);
        }
    }

    // ── Failure & restoration ────────────────────────────────────────────────

    fn fail(
        &self,
        item: &TransferItem,
        st: &mut Tracked,
        err: TransferError,
    ) -> SingleTransferResult {
        let dst = EndpointRef::Destination(self.destination);
        let mut notes: Vec<String> = Vec::new();
        let dest_display = st
            .destination
            .clone()
            .unwrap_or_else(|| self.ctx.destination_directory.to_string());

        match st.destination_temp.take() {
            // The old destination is gone; the staged copy is the only one left.
            Some(DestinationTemp::Staged(temp)) if st.destination_deleted => {
                match self.destination.rename(&temp, &dest_display) {
                    Ok(()) => notes.push(format!(
                        "Transferred content was moved from '{}' to '{}'.",
                        temp, dest_display
                    )),
                    Err(e) => notes.push(format!(
                        "Transferred content remains in temporary file '{}': {}.",
                        temp, e.message
                    )),
                }
            }
            Some(DestinationTemp::Staged(temp)) => match self.destination.remove_file(&temp) {
                Ok(()) => notes.push(format!("Temporary file '{}' was removed.", temp)),
                Err(e) if e.is_not_found() => {}
                Err(e) => notes.push(format!(
                    "Temporary file '{}' could not be removed: {}.",
                    temp, e.message
                )),
            },
            Some(DestinationTemp::RenamedOriginal(temp)) => {
                let intact = self.truncate_append(st, &temp, &mut notes);
                match self.destination.rename(&temp, &dest_display) {
                    Ok(()) if intact => notes.push(format!(
                        "Destination file '{}' was restored from '{}'.",
                        dest_display, temp
                    )),
                    Ok(()) => notes.push(format!(
                        "Destination file '{}' was renamed back from '{}'.",
                        dest_display, temp
                    )),
                    Err(e) => notes.push(format!(
                        "Destination file '{}' could not be restored from '{}': {}.",
                        dest_display, temp, e.message
                    )),
                }
            }
            None => {}
        }

        let wrote_new_file =
            (st.destination_in_place || st.destination_committed) && !st.destination_existed;
        let interrupted_in_place_append = st.destination_existed
            && st.destination_in_place
            && !st.destination_committed
            && st.destination_original_size.is_some();
        if wrote_new_file {
            match self.destination.remove_file(&dest_display) {
                Ok(()) => notes.push(format!(
                    "Destination file '{}' written by this transfer was removed.",
                    dest_display
                )),
                Err(e) if e.is_not_found() => {}
                Err(e) => notes.push(format!(
                    "Destination file '{}' could not be removed: {}.",
                    dest_display, e.message
                )),
            }
        } else if interrupted_in_place_append {
            if self.truncate_append(st, &dest_display, &mut notes) {
                notes.push(format!(
                    "Destination file '{}' was truncated back to its original {} bytes.",
                    dest_display,
                    st.destination_original_size.unwrap_or(0)
                ));
            }
        } else if st.destination_existed && (st.destination_committed || st.destination_in_place) {
            notes.push(format!(
                "Destination file '{}' was already modified and was left in place.",
                dest_display
            ));
        }

        if !st.source_current.is_empty() && st.source_current != item.path {
            match self.source.rename(&st.source_current, &item.path) {
                Ok(()) => notes.push(format!("Source file '{}' was restored.", item.path)),
                Err(e) => notes.push(format!(
                    "Source file '{}' could not be restored from '{}': {}.",
                    item.path, st.source_current, e.message
                )),
            }
        }

        let mut message = format!(
            "Failure in {}: File '{}' could not be transferred to '{}'. Error: {}.",
            st.phase,
            item.name,
            dest_display,
            err.message.trim_end_matches('.')
        );
        for note in &notes {
            message.push(' ');
            message.push_str(note);
        }

        warn!("{} ({})", message, dst);
        let err = err.with_phase(st.phase).with_file(item.path.clone());
        self.ctx.log.push(message.clone());

        SingleTransferResult {
            file_name: item.name.clone(),
            success: false,
            action_skipped: false,
            error_list: vec![message],
            warnings: Vec::new(),
            transferred_file: None,
            transferred_file_path: None,
            transferred_destination_path: None,
            error: Some(err),
        }
    }

    /// Cut an interrupted append back to the size the file had before it.
    /// Returns false, with a note, when the appended bytes stay behind.
    fn truncate_append(&self, st: &Tracked, path: &str, notes: &mut Vec<String>) -> bool {
        let Some(size) = st.destination_original_size else {
            return true;
        };
        match self.destination.truncate(path, size) {
            Ok(()) => true,
            Err(e) => {
                notes.push(format!(
                    "Appended data remains in '{}'; truncating to {} bytes failed: {}.",
                    path, size, e.message
                ));
                false
            }
        }
    }
}

fn remove_leftover(ep: EndpointRef<'_>, path: &str, warnings: &mut Vec<String>) {
    let endpoint = ep.endpoint();
    match endpoint.exists(path) {
        Ok(false) => {}
        Ok(true) => match endpoint.remove_file(path) {
            Ok(()) => debug!("Removed leftover {} on {}", path, ep),
            Err(e) => {
                let note = format!(
                    "Temporary file '{}' could not be removed: {}",
                    path, e.message
                );
                warn!("{} ({})", note, ep);
                warnings.push(note);
            }
        },
        Err(e) => warn!("Could not check for {} on {}: {}", path, ep, e),
    }
}

/// Result recorded for an item never started because the run was cancelled.
pub fn cancelled_result(item: &TransferItem) -> SingleTransferResult {
    SingleTransferResult {
        file_name: item.name.clone(),
        success: false,
        error_list: vec![format!(
            "File '{}' was not transferred: {}",
            item.name,
            TransferError::cancelled().message
        )],
        error: Some(TransferError::cancelled().with_file(item.path.clone())),
        ..Default::default()
    }
}
