// ── Connectors ───────────────────────────────────────────────────────────────
//
// Host-facing entry points.  Each one validates its request, then runs the
// blocking engine on a worker thread under a child cancellation token that a
// timer task cancels when the overall timeout elapses.

use crate::sftp::auth::validate_connection;
use crate::sftp::batch::{enumerate, no_files_result, BatchOrchestrator, SourceQuery};
use crate::sftp::endpoint::{split_path, FileEndpoint};
use crate::sftp::error::{TransferError, TransferResult};
use crate::sftp::local::LocalEndpoint;
use crate::sftp::machine::{SingleTransfer, TransferContext};
use crate::sftp::macros::{is_file_mask, MacroContext, MacroEngine};
use crate::sftp::remote::SftpEndpoint;
use crate::sftp::types::*;
use crate::sftp::workdir::WorkDir;
use filerelay_core::{OperationLog, DEFAULT_LOG_CAPACITY};
use log::{info, warn};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ── Blocking runner ──────────────────────────────────────────────────────────

/// Run `job` on the blocking pool. The job receives a child of `cancel`
/// that is also cancelled once `timeout_secs` elapse.
pub async fn run_blocking<T, F>(
    timeout_secs: Option<u64>,
    cancel: CancellationToken,
    job: F,
) -> TransferResult<T>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> TransferResult<T> + Send + 'static,
{
    let token = cancel.child_token();

    let timer = timeout_secs.filter(|s| *s > 0).map(|secs| {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    warn!("Operation timed out after {}s, cancelling", secs);
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        })
    });

    let job_token = token.clone();
    let outcome = tokio::task::spawn_blocking(move || job(job_token)).await;

    if let Some(timer) = timer {
        timer.abort();
    }
    outcome.map_err(|e| TransferError::unknown(format!("Transfer worker failed: {}", e)))?
}

fn release(workdir: WorkDir) {
    // Failures are already logged by cleanup.
    let _ = workdir.cleanup();
}

// ── Upload / download ────────────────────────────────────────────────────────

/// Local source → SFTP destination.
pub async fn upload_files(
    spec: BatchSpec,
    cancel: CancellationToken,
) -> TransferResult<BatchResult> {
    validate_connection(&spec.connection)?;
    info!("Upload '{}' ({}) started", spec.info.transfer_name, spec.info.transfer_id);

    run_blocking(spec.options.timeout_secs, cancel, move |token| {
        let workdir = WorkDir::create(spec.info.work_directory.as_deref())?;
        let outcome = {
            let mut source = LocalEndpoint::new();
            let mut destination = SftpEndpoint::new(spec.connection.clone(), &workdir);
            BatchOrchestrator::new(&mut source, &mut destination, token).run(&spec)
        };
        release(workdir);
        outcome
    })
    .await
}

/// SFTP source → local destination.
pub async fn download_files(
    spec: BatchSpec,
    cancel: CancellationToken,
) -> TransferResult<BatchResult> {
    validate_connection(&spec.connection)?;
    info!("Download '{}' ({}) started", spec.info.transfer_name, spec.info.transfer_id);

    run_blocking(spec.options.timeout_secs, cancel, move |token| {
        let workdir = WorkDir::create(spec.info.work_directory.as_deref())?;
        let outcome = {
            let mut source = SftpEndpoint::new(spec.connection.clone(), &workdir);
            let mut destination = LocalEndpoint::new();
            BatchOrchestrator::new(&mut source, &mut destination, token).run(&spec)
        };
        release(workdir);
        outcome
    })
    .await
}

// ── Write ────────────────────────────────────────────────────────────────────

/// Write text content to one remote file.
pub async fn write_file(
    request: WriteRequest,
    cancel: CancellationToken,
) -> TransferResult<WriteResult> {
    validate_connection(&request.connection)?;
    info!("Write to '{}' started", request.path);

    run_blocking(request.options.timeout_secs, cancel, move |token| {
        let workdir = WorkDir::create(request.info.work_directory.as_deref())?;
        let outcome = {
            let mut destination = SftpEndpoint::new(request.connection.clone(), &workdir);
            write_content(&mut destination, &request, &workdir, &token)
        };
        release(workdir);
        outcome
    })
    .await
}

/// Stage the encoded content in the work directory and push it through the
/// single-file state machine as one item.
pub fn write_content<D: FileEndpoint>(
    destination: &mut D,
    request: &WriteRequest,
    workdir: &WorkDir,
    cancel: &CancellationToken,
) -> TransferResult<WriteResult> {
    let opts = &request.options;
    let macros = MacroEngine::new(MacroContext::new(
        &request.info.transfer_name,
        &request.info.transfer_id,
    ));

    let (dir_template, name_template) = split_path(request.path.trim());
    if name_template.is_empty() {
        return Err(TransferError::invalid_input(format!(
            "Path '{}' does not name a file",
            request.path
        )));
    }
    if is_file_mask(name_template) {
        return Err(TransferError::invalid_input(format!(
            "File masks cannot be used in the write path '{}'",
            request.path
        )));
    }
    let directory = macros.expand_directory(dir_template)?;
    let name = macros.expand_directory(name_template)?;

    destination.ensure_connected()?;
    if !directory.is_empty() && !destination.exists(&directory)? {
        if !opts.create_destination_directories {
            return Err(TransferError::not_found(format!(
                "Destination directory '{}' does not exist",
                directory
            )));
        }
        destination.create_dir_all(&directory)?;
    }

    let target = destination.join(&directory, &name);
    let appending = opts.action == DestinationAction::Append && destination.exists(&target)?;
    let bytes = opts
        .encoding
        .encode_with_bom(&request.content, opts.enable_bom && !appending);
    let staged = workdir.stage("content", &bytes)?;

    let item = TransferItem {
        name: name.clone(),
        path: staged.to_string_lossy().to_string(),
        directory: workdir.path().to_string_lossy().to_string(),
        size: bytes.len() as u64,
        modified: None,
    };
    let source_spec = SourceSpec::default();
    let destination_spec = DestinationSpec {
        directory: directory.clone(),
        file_name: name,
        action: opts.action,
        add_new_line: opts.add_new_line,
        line_separator: opts.line_separator,
        encoding: opts.encoding,
    };
    let options = TransferOptions {
        rename_source_file_before_transfer: false,
        rename_destination_file_during_transfer: opts.rename_destination_file_during_transfer,
        create_destination_directories: opts.create_destination_directories,
        ..TransferOptions::default()
    };
    let log = OperationLog::new(DEFAULT_LOG_CAPACITY);
    let ctx = TransferContext {
        source: &source_spec,
        destination: &destination_spec,
        options: &options,
        macros: &macros,
        destination_directory: &directory,
        buffer_size: request.connection.buffer_size_bytes(),
        cancel,
        log: &log,
    };

    let local = LocalEndpoint::new();
    let result = SingleTransfer::new(&local, &*destination, &ctx).transfer_one(&item);
    if !result.success {
        let message = result.error_list.join("\n");
        return Err(match result.error {
            Some(err) => TransferError { message, ..err },
            None => TransferError::operation(message),
        });
    }

    let path = result.transferred_destination_path.unwrap_or(target);
    let size_in_bytes = destination
        .stat(&path)?
        .map(|e| e.size)
        .unwrap_or(bytes.len() as u64);
    info!("Wrote {} bytes to {}", size_in_bytes, path);
    Ok(WriteResult {
        path,
        size_in_bytes,
    })
}

// ── Delete files ─────────────────────────────────────────────────────────────

/// Delete remote files matching a mask or an explicit path list.
pub async fn delete_files(
    request: DeleteFilesRequest,
    cancel: CancellationToken,
) -> TransferResult<DeleteResult> {
    validate_connection(&request.connection)?;
    info!("Delete files in '{}' ({}) started", request.directory, request.file_mask);

    run_blocking(request.timeout_secs, cancel, move |token| {
        let workdir = WorkDir::create(request.info.work_directory.as_deref())?;
        let outcome = {
            let mut endpoint = SftpEndpoint::new(request.connection.clone(), &workdir);
            delete_matching(&mut endpoint, &request, &token)
        };
        release(workdir);
        outcome
    })
    .await
}

pub fn delete_matching<E: FileEndpoint>(
    endpoint: &mut E,
    request: &DeleteFilesRequest,
    cancel: &CancellationToken,
) -> TransferResult<DeleteResult> {
    let macros = MacroEngine::new(MacroContext::new(
        &request.info.transfer_name,
        &request.info.transfer_id,
    ));
    let directory = macros.expand_directory(&request.directory)?;
    let log = OperationLog::new(DEFAULT_LOG_CAPACITY);

    endpoint.ensure_connected()?;
    let query = SourceQuery {
        directory: &directory,
        mask: &request.file_mask,
        file_paths: request.file_paths.as_deref(),
        recursive: request.include_subdirectories,
    };
    let items = enumerate(&*endpoint, &query, cancel, &log)?;

    if items.is_empty() {
        let result = no_files_result(
            request.not_found_action,
            query.label(),
            query.not_found_message(),
            &log,
        );
        if !result.success && request.throw_error_on_fail {
            return Err(TransferError::not_found(result.error_list.join("\n")));
        }
        return Ok(DeleteResult {
            success: result.success,
            action_skipped: result.action_skipped,
            files: Vec::new(),
            errors: result.error_list,
        });
    }

    let mut files = Vec::new();
    let mut errors = Vec::new();
    for item in &items {
        if cancel.is_cancelled() {
            errors.push(format!(
                "File '{}' was not deleted: {}",
                item.path,
                TransferError::cancelled().message
            ));
            continue;
        }
        match endpoint.remove_file(&item.path) {
            Ok(()) => {
                info!("Deleted {}", item.path);
                files.push(DeletedEntry {
                    name: item.name.clone(),
                    path: item.path.clone(),
                    size_in_bytes: item.size,
                });
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", item.path, e);
                errors.push(format!(
                    "File '{}' could not be deleted: {}",
                    item.path, e.message
                ));
            }
        }
    }

    if !errors.is_empty() && request.throw_error_on_fail {
        return Err(TransferError::batch_failed(format!(
            "{} Errors: {}.",
            errors.len(),
            errors.join(".\n")
        )));
    }
    Ok(DeleteResult {
        success: errors.is_empty(),
        action_skipped: false,
        files,
        errors,
    })
}

// ── Delete directory ─────────────────────────────────────────────────────────

/// Delete a remote directory, optionally with everything below it.
pub async fn delete_directory(
    request: DeleteDirectoryRequest,
    cancel: CancellationToken,
) -> TransferResult<DeleteResult> {
    validate_connection(&request.connection)?;
    info!("Delete directory '{}' started", request.directory);

    run_blocking(request.timeout_secs, cancel, move |token| {
        let workdir = WorkDir::create(request.info.work_directory.as_deref())?;
        let outcome = {
            let mut endpoint = SftpEndpoint::new(request.connection.clone(), &workdir);
            delete_tree(&mut endpoint, &request, &token)
        };
        release(workdir);
        outcome
    })
    .await
}

pub fn delete_tree<E: FileEndpoint>(
    endpoint: &mut E,
    request: &DeleteDirectoryRequest,
    cancel: &CancellationToken,
) -> TransferResult<DeleteResult> {
    let macros = MacroEngine::new(MacroContext::new(
        &request.info.transfer_name,
        &request.info.transfer_id,
    ));
    let directory = macros.expand_directory(request.directory.trim())?;
    if directory.is_empty() || directory == "/" {
        return Err(TransferError::invalid_input(format!(
            "Refusing to delete directory '{}'",
            request.directory
        )));
    }

    endpoint.ensure_connected()?;
    match endpoint.stat(&directory)? {
        None => {
            return Err(TransferError::not_found(format!(
                "Directory '{}' does not exist",
                directory
            )))
        }
        Some(entry) if !entry.is_dir => {
            return Err(TransferError::invalid_input(format!(
                "'{}' is not a directory",
                directory
            )))
        }
        Some(_) => {}
    }

    let mut files = Vec::new();
    remove_dir(&*endpoint, &directory, request.recursive, cancel, &mut files)?;
    Ok(DeleteResult {
        success: true,
        files,
        ..Default::default()
    })
}

fn remove_dir<E: FileEndpoint>(
    endpoint: &E,
    dir: &str,
    recursive: bool,
    cancel: &CancellationToken,
    deleted: &mut Vec<DeletedEntry>,
) -> TransferResult<()> {
    if cancel.is_cancelled() {
        return Err(TransferError::cancelled());
    }
    if recursive {
        for entry in endpoint.list(dir)? {
            if entry.is_dir {
                remove_dir(endpoint, &entry.path, true, cancel, deleted)?;
            } else {
                endpoint.remove_file(&entry.path)?;
                deleted.push(DeletedEntry {
                    name: entry.name,
                    path: entry.path,
                    size_in_bytes: entry.size,
                });
            }
        }
    }
    endpoint.remove_dir(dir).map_err(|e| {
        if recursive {
            e
        } else {
            e.context("directory may not be empty; set recursive to delete its contents")
        }
    })?;
    info!("Removed directory {}", dir);
    let (_, name) = split_path(dir.trim_end_matches(['/', '\\']));
    deleted.push(DeletedEntry {
        name: name.to_string(),
        path: dir.to_string(),
        size_in_bytes: 0,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn s(p: &Path) -> String {
        p.to_string_lossy().to_string()
    }

    fn conn() -> ConnectionSpec {
        ConnectionSpec {
            address: "sftp.example.com".into(),
            user_name: "demo".into(),
            password: Some("pw".into()),
            ..Default::default()
        }
    }

    fn write_request(path: String, content: &str, options: WriteOptions) -> WriteRequest {
        WriteRequest {
            path,
            content: content.into(),
            connection: conn(),
            options,
            info: RunInfo::default(),
        }
    }

    // ── run_blocking ────────────────────────────────────────────────────

    #[tokio::test]
    async fn run_blocking_returns_job_result() {
        let v = run_blocking(None, CancellationToken::new(), |_| Ok(41 + 1))
            .await
            .unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test]
    async fn run_blocking_timeout_cancels_job_token() {
        let err = run_blocking(Some(1), CancellationToken::new(), |token| {
            while !token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err::<(), _>(TransferError::cancelled())
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn run_blocking_follows_parent_cancel() {
        let parent = CancellationToken::new();
        parent.cancel();
        let seen = run_blocking(None, parent, |token| Ok(token.is_cancelled()))
            .await
            .unwrap();
        assert!(seen);
    }

    // ── Validation before I/O ───────────────────────────────────────────

    #[tokio::test]
    async fn upload_rejects_invalid_connection_without_io() {
        let spec = BatchSpec {
            connection: ConnectionSpec {
                address: String::new(),
                ..conn()
            },
            ..Default::default()
        };
        let err = upload_files(spec, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, crate::sftp::error::TransferErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn download_rejects_missing_password() {
        let spec = BatchSpec {
            connection: ConnectionSpec {
                password: None,
                ..conn()
            },
            ..Default::default()
        };
        let err = download_files(spec, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, crate::sftp::error::TransferErrorKind::InvalidInput);
    }

    // ── Write ───────────────────────────────────────────────────────────

    fn write_local(
        wd: &WorkDir,
        target: &str,
        content: &str,
        options: WriteOptions,
    ) -> TransferResult<WriteResult> {
        let request = write_request(target.to_string(), content, options);
        write_content(&mut LocalEndpoint::new(), &request, wd, &CancellationToken::new())
    }

    #[test]
    fn write_then_append_twice_yields_single_separator() {
        let tmp = tempfile::tempdir().unwrap();
        let wd = WorkDir::create(tmp.path().to_str()).unwrap();
        let target = s(&tmp.path().join("out.log"));

        let first = write_local(&wd, &target, "first", WriteOptions::default()).unwrap();
        assert_eq!(first.size_in_bytes, 5);

        let append = WriteOptions {
            action: DestinationAction::Append,
            add_new_line: true,
            ..Default::default()
        };
        let second = write_local(&wd, &target, "second", append).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "first\nsecond");
        assert_eq!(second.size_in_bytes, 12);
        assert_eq!(second.path, target);
    }

    #[test]
    fn write_conflict_fails_and_keeps_file() {
        let tmp = tempfile::tempdir().unwrap();
        let wd = WorkDir::create(tmp.path().to_str()).unwrap();
        let target = s(&tmp.path().join("out.txt"));
        fs::write(&target, "old").unwrap();

        let err = write_local(&wd, &target, "new", WriteOptions::default()).unwrap_err();
        assert!(err.message.contains("destination file already exists"));
        assert_eq!(err.kind, crate::sftp::error::TransferErrorKind::Conflict);
        assert_eq!(err.phase, Some(TransferPhase::CheckDestinationExists));
        assert!(err.file.as_deref().unwrap_or_default().contains("content_"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
    }

    #[test]
    fn write_with_bom_and_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let wd = WorkDir::create(tmp.path().to_str()).unwrap();
        let target = s(&tmp.path().join("new/dir/out.txt"));

        let err = write_local(&wd, &target, "x", WriteOptions::default()).unwrap_err();
        assert!(err.is_not_found());

        let opts = WriteOptions {
            create_destination_directories: true,
            enable_bom: true,
            ..Default::default()
        };
        write_local(&wd, &target, "x", opts).unwrap();
        assert_eq!(fs::read(&target).unwrap(), vec![0xEF, 0xBB, 0xBF, b'x']);
    }

    #[test]
    fn write_rejects_masks() {
        let tmp = tempfile::tempdir().unwrap();
        let wd = WorkDir::create(tmp.path().to_str()).unwrap();
        let target = s(&tmp.path().join("*.txt"));
        let err = write_local(&wd, &target, "x", WriteOptions::default()).unwrap_err();
        assert_eq!(err.kind, crate::sftp::error::TransferErrorKind::InvalidInput);
    }

    // ── Delete ──────────────────────────────────────────────────────────

    fn delete_request(dir: String, mask: &str) -> DeleteFilesRequest {
        DeleteFilesRequest {
            directory: dir,
            file_mask: mask.into(),
            file_paths: None,
            include_subdirectories: false,
            not_found_action: NotFoundAction::Error,
            connection: conn(),
            throw_error_on_fail: true,
            timeout_secs: None,
            info: RunInfo::default(),
        }
    }

    fn delete_local(req: &DeleteFilesRequest) -> TransferResult<DeleteResult> {
        delete_matching(&mut LocalEndpoint::new(), req, &CancellationToken::new())
    }

    /// Local endpoint whose deletes of `locked` fail.
    struct Locked {
        inner: LocalEndpoint,
        locked: String,
    }

    impl FileEndpoint for Locked {
        fn describe(&self) -> String {
            "locked".into()
        }
        fn ensure_connected(&mut self) -> TransferResult<()> {
            Ok(())
        }
        fn list(&self, dir: &str) -> TransferResult<Vec<crate::sftp::endpoint::EntryInfo>> {
            self.inner.list(dir)
        }
        fn stat(&self, path: &str) -> TransferResult<Option<crate::sftp::endpoint::EntryInfo>> {
            self.inner.stat(path)
        }
        fn create_dir_all(&self, dir: &str) -> TransferResult<()> {
            self.inner.create_dir_all(dir)
        }
        fn rename(&self, from: &str, to: &str) -> TransferResult<()> {
            self.inner.rename(from, to)
        }
        fn remove_file(&self, path: &str) -> TransferResult<()> {
            if path.ends_with(&self.locked) {
                return Err(TransferError::operation("permission denied"));
            }
            self.inner.remove_file(path)
        }
        fn remove_dir(&self, path: &str) -> TransferResult<()> {
            self.inner.remove_dir(path)
        }
        fn set_modified(
            &self,
            path: &str,
            modified: chrono::DateTime<chrono::Utc>,
        ) -> TransferResult<()> {
            self.inner.set_modified(path, modified)
        }
        fn open_read(&self, path: &str) -> TransferResult<Box<dyn std::io::Read + '_>> {
            self.inner.open_read(path)
        }
        fn open_write(
            &self,
            path: &str,
            append: bool,
        ) -> TransferResult<Box<dyn std::io::Write + '_>> {
            self.inner.open_write(path, append)
        }
        fn read_tail(&self, path: &str, len: u64) -> TransferResult<Vec<u8>> {
            self.inner.read_tail(path, len)
        }
        fn truncate(&self, path: &str, len: u64) -> TransferResult<()> {
            self.inner.truncate(path, len)
        }
    }

    #[test]
    fn delete_matching_removes_only_matches() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.csv"), "12").unwrap();
        fs::write(tmp.path().join("b.txt"), "1").unwrap();

        let res = delete_local(&delete_request(s(tmp.path()), "*.csv")).unwrap();
        assert!(res.success);
        assert!(!res.action_skipped);
        assert!(res.errors.is_empty());
        assert_eq!(res.files.len(), 1);
        assert_eq!(res.files[0].name, "a.csv");
        assert_eq!(res.files[0].size_in_bytes, 2);
        assert!(!tmp.path().join("a.csv").exists());
        assert!(tmp.path().join("b.txt").exists());
    }

    #[test]
    fn delete_matching_not_found_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let mut req = delete_request(s(tmp.path()), "*.csv");
        let err = delete_local(&req).unwrap_err();
        assert!(err.is_not_found());

        req.throw_error_on_fail = false;
        let res = delete_local(&req).unwrap();
        assert!(!res.success);
        assert!(!res.action_skipped);
        assert_eq!(res.errors.len(), 1);
        assert!(res.errors[0].contains("*.csv"), "{:?}", res.errors);

        req.not_found_action = NotFoundAction::Info;
        let res = delete_local(&req).unwrap();
        assert!(res.success);
        assert!(res.action_skipped);
        assert!(res.files.is_empty());
        assert!(res.errors.is_empty());
    }

    #[test]
    fn delete_matching_reports_failed_deletes() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.csv"), "1").unwrap();
        fs::write(tmp.path().join("b.csv"), "2").unwrap();
        let mut ep = Locked {
            inner: LocalEndpoint::new(),
            locked: "b.csv".into(),
        };

        let mut req = delete_request(s(tmp.path()), "*.csv");
        let err = delete_matching(&mut ep, &req, &CancellationToken::new()).unwrap_err();
        assert_eq!(err.kind, crate::sftp::error::TransferErrorKind::BatchFailed);
        assert!(err.message.starts_with("1 Errors: "));

        fs::write(tmp.path().join("a.csv"), "1").unwrap();
        req.throw_error_on_fail = false;
        let res = delete_matching(&mut ep, &req, &CancellationToken::new()).unwrap();
        assert!(!res.success);
        assert_eq!(res.files.len(), 1);
        assert_eq!(res.files[0].name, "a.csv");
        assert_eq!(res.errors.len(), 1);
        assert!(res.errors[0].contains("b.csv"));
        assert!(res.errors[0].contains("permission denied"));
        assert!(tmp.path().join("b.csv").exists());
    }

    fn delete_dir_local(req: &DeleteDirectoryRequest) -> TransferResult<DeleteResult> {
        delete_tree(&mut LocalEndpoint::new(), req, &CancellationToken::new())
    }

    #[test]
    fn delete_tree_recursive_and_not() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("victim");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("sub/b.txt"), "bb").unwrap();

        let mut req = DeleteDirectoryRequest {
            directory: s(&root),
            recursive: false,
            connection: conn(),
            timeout_secs: None,
            info: RunInfo::default(),
        };
        let err = delete_dir_local(&req).unwrap_err();
        assert!(err.message.contains("recursive"));
        assert!(root.exists());

        req.recursive = true;
        let res = delete_dir_local(&req).unwrap();
        assert!(res.success);
        assert!(!root.exists());
        let mut names: Vec<&str> = res.files.iter().map(|f| f.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub", "victim"]);
    }

    #[test]
    fn delete_tree_refuses_root_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f");
        fs::write(&file, "x").unwrap();
        let mut req = DeleteDirectoryRequest {
            directory: "/".into(),
            recursive: true,
            connection: conn(),
            timeout_secs: None,
            info: RunInfo::default(),
        };
        assert!(delete_dir_local(&req).is_err());
        req.directory = s(&file);
        let err = delete_dir_local(&req).unwrap_err();
        assert_eq!(err.kind, crate::sftp::error::TransferErrorKind::InvalidInput);
    }
}
