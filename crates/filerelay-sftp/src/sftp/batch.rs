// ── Batch orchestration ──────────────────────────────────────────────────────

use crate::sftp::aggregate::aggregate;
use crate::sftp::endpoint::{split_path, EndpointRef, FileEndpoint};
use crate::sftp::error::{TransferError, TransferResult};
use crate::sftp::machine::{cancelled_result, is_temp_name, SingleTransfer, TransferContext};
use crate::sftp::macros::{FileMask, MacroContext, MacroEngine};
use crate::sftp::types::*;
use filerelay_core::{OperationLog, DEFAULT_LOG_CAPACITY};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

// ── Enumeration ──────────────────────────────────────────────────────────────

/// Which files to pick up on an endpoint.
#[derive(Debug, Clone, Copy)]
pub struct SourceQuery<'q> {
    pub directory: &'q str,
    pub mask: &'q str,
    /// Explicit paths; when set, `directory` and `mask` are ignored.
    pub file_paths: Option<&'q [String]>,
    pub recursive: bool,
}

impl<'q> SourceQuery<'q> {
    pub fn from_source(spec: &'q SourceSpec, directory: &'q str) -> Self {
        Self {
            directory,
            mask: &spec.file_name,
            file_paths: spec.file_paths.as_deref(),
            recursive: spec.include_subdirectories,
        }
    }

    /// Key used for the single result produced when nothing was found.
    pub fn label(&self) -> &'q str {
        if self.file_paths.is_some() {
            "filePaths"
        } else {
            self.mask
        }
    }

    pub fn not_found_message(&self) -> String {
        match self.file_paths {
            Some(paths) => format!(
                "No source files found from the {} given file paths.",
                paths.len()
            ),
            None => format!(
                "No source files found from directory '{}' with file mask '{}'.",
                self.directory, self.mask
            ),
        }
    }
}

/// List candidate files. A missing source directory yields no files.
pub fn enumerate<E: FileEndpoint>(
    ep: &E,
    query: &SourceQuery<'_>,
    cancel: &CancellationToken,
    log: &OperationLog,
) -> TransferResult<Vec<TransferItem>> {
    if let Some(paths) = query.file_paths {
        return enumerate_paths(ep, paths, log);
    }

    let mask = FileMask::new(if query.mask.is_empty() { "*" } else { query.mask })?;
    let mut items = Vec::new();
    let mut pending = vec![query.directory.to_string()];

    while let Some(dir) = pending.pop() {
        if cancel.is_cancelled() {
            return Err(TransferError::cancelled());
        }
        let entries = match ep.list(&dir) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => {
                let line = format!("Source directory '{}' does not exist", dir);
                info!("{}", line);
                log.push(line);
                continue;
            }
            Err(e) => return Err(e),
        };

        for entry in entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            if entry.is_dir {
                if query.recursive {
                    pending.push(entry.path);
                }
                continue;
            }
            if !entry.is_file {
                continue;
            }
            if is_temp_name(&entry.name) {
                debug!("Skipping in-flight file {}", entry.path);
                continue;
            }
            if !mask.matches(&entry.name) {
                continue;
            }
            items.push(TransferItem {
                name: entry.name,
                path: entry.path,
                directory: dir.clone(),
                size: entry.size,
                modified: entry.modified,
            });
        }
    }

    items.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Found {} file(s) in {}", items.len(), query.directory);
    Ok(items)
}

fn enumerate_paths<E: FileEndpoint>(
    ep: &E,
    paths: &[String],
    log: &OperationLog,
) -> TransferResult<Vec<TransferItem>> {
    let mut items = Vec::new();
    for path in paths.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        match ep.stat(path)? {
            Some(entry) if entry.is_file => {
                let (dir, name) = split_path(path);
                items.push(TransferItem {
                    name: name.to_string(),
                    path: path.to_string(),
                    directory: dir.to_string(),
                    size: entry.size,
                    modified: entry.modified,
                });
            }
            Some(_) => {
                let line = format!("Path '{}' is not a file and was skipped", path);
                warn!("{}", line);
                log.push(line);
            }
            None => {
                let line = format!("File '{}' was not found", path);
                warn!("{}", line);
                log.push(line);
            }
        }
    }
    Ok(items)
}

/// Single result standing in for the batch when no source files exist.
pub fn no_files_result(
    action: NotFoundAction,
    label: &str,
    message: String,
    log: &OperationLog,
) -> SingleTransferResult {
    match action {
        NotFoundAction::Error => {
            warn!("{}", message);
            log.push(message.clone());
            SingleTransferResult {
                file_name: label.to_string(),
                success: false,
                error_list: vec![message],
                ..Default::default()
            }
        }
        NotFoundAction::Info => {
            info!("{}", message);
            log.push(message.clone());
            SingleTransferResult {
                file_name: label.to_string(),
                success: true,
                action_skipped: true,
                warnings: vec![message],
                ..Default::default()
            }
        }
        NotFoundAction::Ignore => {
            debug!("{}", message);
            SingleTransferResult {
                file_name: label.to_string(),
                success: true,
                action_skipped: true,
                warnings: vec![message],
                ..Default::default()
            }
        }
    }
}

/// Apply `throw_error_on_fail` to a finished batch.
pub fn finish(result: BatchResult, throw_error_on_fail: bool) -> TransferResult<BatchResult> {
    if throw_error_on_fail && !result.success {
        return Err(TransferError::batch_failed(result.user_result_message));
    }
    Ok(result)
}

/// Reject post-operation settings that can never succeed.
pub fn validate_source(spec: &SourceSpec) -> TransferResult<()> {
    let missing = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").is_empty();
    match spec.operation {
        SourceOperation::Rename if missing(&spec.file_name_after_transfer) => {
            Err(TransferError::invalid_input(
                "Source operation Rename needs a file name after transfer",
            ))
        }
        SourceOperation::Move if missing(&spec.directory_to_move_after_transfer) => Err(
            TransferError::invalid_input("Source operation Move needs a directory to move to"),
        ),
        _ => Ok(()),
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

pub struct BatchOrchestrator<'a, S: FileEndpoint, D: FileEndpoint> {
    source: &'a mut S,
    destination: &'a mut D,
    cancel: CancellationToken,
}

impl<'a, S: FileEndpoint, D: FileEndpoint> BatchOrchestrator<'a, S, D> {
    pub fn new(source: &'a mut S, destination: &'a mut D, cancel: CancellationToken) -> Self {
        Self {
            source,
            destination,
            cancel,
        }
    }

    fn reconnect(&mut self) -> TransferResult<()> {
        self.source.ensure_connected().map_err(|e| {
            TransferError::connection(e.message)
                .context(format!("Connection to {} failed", EndpointRef::Source(&*self.source)))
        })?;
        self.destination.ensure_connected().map_err(|e| {
            TransferError::connection(e.message).context(format!(
                "Connection to {} failed",
                EndpointRef::Destination(&*self.destination)
            ))
        })
    }

    /// Run one batch: enumerate, resolve the destination, transfer every
    /// item in order and aggregate.
    pub fn run(&mut self, spec: &BatchSpec) -> TransferResult<BatchResult> {
        let opts = &spec.options;
        let log = if opts.operation_log {
            OperationLog::new(DEFAULT_LOG_CAPACITY)
        } else {
            OperationLog::disabled()
        };

        validate_source(&spec.source)?;
        let macros = MacroEngine::new(MacroContext::new(
            &spec.info.transfer_name,
            &spec.info.transfer_id,
        ));
        let source_dir = macros.expand_directory(&spec.source.directory)?;
        let destination_dir = macros.expand_directory(&spec.destination.directory)?;

        self.reconnect()?;
        log.push(format!(
            "Batch '{}' ({}) from {} to {}",
            spec.info.transfer_name,
            spec.info.transfer_id,
            EndpointRef::Source(&*self.source),
            EndpointRef::Destination(&*self.destination)
        ));

        let query = SourceQuery::from_source(&spec.source, &source_dir);
        let items = enumerate(&*self.source, &query, &self.cancel, &log)?;

        if items.is_empty() {
            let result = no_files_result(
                spec.source.not_found_action,
                query.label(),
                query.not_found_message(),
                &log,
            );
            return finish(aggregate(&[result], &log), opts.throw_error_on_fail);
        }

        self.ensure_destination_directory(
            &destination_dir,
            opts.create_destination_directories,
            &log,
        )?;

        let buffer_size = spec.connection.buffer_size_bytes();
        let mut results = Vec::with_capacity(items.len());
        for item in &items {
            if self.cancel.is_cancelled() {
                results.push(cancelled_result(item));
                continue;
            }
            self.reconnect()?;

            let ctx = TransferContext {
                source: &spec.source,
                destination: &spec.destination,
                options: opts,
                macros: &macros,
                destination_directory: &destination_dir,
                buffer_size,
                cancel: &self.cancel,
                log: &log,
            };
            let result =
                SingleTransfer::new(&*self.source, &*self.destination, &ctx).transfer_one(item);
            results.push(result);
        }

        let result = aggregate(&results, &log);
        info!(
            "Batch '{}' finished: {} transferred, {} failed",
            spec.info.transfer_name, result.successful_transfer_count, result.failed_transfer_count
        );
        finish(result, opts.throw_error_on_fail)
    }

    fn ensure_destination_directory(
        &self,
        dir: &str,
        create: bool,
        log: &OperationLog,
    ) -> TransferResult<()> {
        if dir.is_empty() || self.destination.exists(dir)? {
            return Ok(());
        }
        if !create {
            return Err(TransferError::not_found(format!(
                "Destination directory '{}' does not exist",
                dir
            )));
        }
        self.destination.create_dir_all(dir)?;
        let line = format!("Created destination directory '{}'", dir);
        info!("{}", line);
        log.push(line);
        Ok(())
    }
}
