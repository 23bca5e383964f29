//! Round trips against a live SFTP server.
//!
//! Run with `--features sftp-e2e` and set `FILERELAY_E2E_HOST`,
//! `FILERELAY_E2E_USER`, `FILERELAY_E2E_PASSWORD` and optionally
//! `FILERELAY_E2E_PORT` / `FILERELAY_E2E_DIR` (defaults to `upload`).
#![cfg(feature = "sftp-e2e")]

use filerelay_sftp::sftp::*;
use std::fs;
use tokio_util::sync::CancellationToken;

fn connection() -> ConnectionSpec {
    let var = |k: &str| std::env::var(k).unwrap_or_else(|_| panic!("{} must be set", k));
    ConnectionSpec {
        address: var("FILERELAY_E2E_HOST"),
        port: std::env::var("FILERELAY_E2E_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(22),
        user_name: var("FILERELAY_E2E_USER"),
        password: Some(var("FILERELAY_E2E_PASSWORD")),
        connection_timeout_secs: 15,
        ..Default::default()
    }
}

fn remote_dir() -> String {
    let base = std::env::var("FILERELAY_E2E_DIR").unwrap_or_else(|_| "upload".into());
    format!("{}/{}", base, uuid::Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_upload_write_download_delete() {
    let remote = remote_dir();
    let local = tempfile::tempdir().unwrap();
    let out = local.path().join("out");
    let back = local.path().join("back");
    fs::create_dir_all(&out).unwrap();
    fs::create_dir_all(&back).unwrap();
    fs::write(out.join("a.txt"), "hello").unwrap();

    let upload = BatchSpec {
        source: SourceSpec {
            directory: out.to_string_lossy().to_string(),
            ..Default::default()
        },
        destination: DestinationSpec {
            directory: remote.clone(),
            ..Default::default()
        },
        connection: connection(),
        options: TransferOptions {
            create_destination_directories: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = upload_files(upload, CancellationToken::new()).await.unwrap();
    assert_eq!(result.transferred_file_names, vec!["a.txt"]);

    let write = WriteRequest {
        path: format!("{}/a.txt", remote),
        content: " world".into(),
        connection: connection(),
        options: WriteOptions {
            action: DestinationAction::Append,
            ..Default::default()
        },
        info: RunInfo::default(),
    };
    let written = write_file(write, CancellationToken::new()).await.unwrap();
    assert_eq!(written.size_in_bytes, 11);

    let download = BatchSpec {
        source: SourceSpec {
            directory: remote.clone(),
            operation: SourceOperation::Delete,
            ..Default::default()
        },
        destination: DestinationSpec {
            directory: back.to_string_lossy().to_string(),
            ..Default::default()
        },
        connection: connection(),
        ..Default::default()
    };
    let result = download_files(download, CancellationToken::new()).await.unwrap();
    assert!(result.success);
    assert_eq!(fs::read_to_string(back.join("a.txt")).unwrap(), "hello world");

    let removed = delete_directory(
        DeleteDirectoryRequest {
            directory: remote,
            recursive: true,
            connection: connection(),
            timeout_secs: None,
            info: RunInfo::default(),
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(!removed.files.is_empty());
}

#[tokio::test]
async fn test_wrong_fingerprint_is_rejected() {
    let mut conn = connection();
    conn.server_fingerprint = Some("00:11:22:33:44:55:66:77:88:99:aa:bb:cc:dd:ee:ff".into());
    let request = DeleteFilesRequest {
        directory: remote_dir(),
        file_mask: "*".into(),
        file_paths: None,
        include_subdirectories: false,
        not_found_action: NotFoundAction::Ignore,
        connection: conn,
        throw_error_on_fail: true,
        timeout_secs: None,
        info: RunInfo::default(),
    };
    let err = delete_files(request, CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind, TransferErrorKind::Connection);
    assert!(err.message.contains("fingerprint mismatch"));
}
