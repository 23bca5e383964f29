// ── filerelay-sftp / sftp module ──────────────────────────────────────────────
//
//   • types / error       request, result and error types
//   • macros              `%Token%` and file-mask expansion
//   • fingerprint         host key pinning
//   • auth                authentication modes and prompt responder
//   • endpoint            blocking endpoint trait, local and SFTP impls
//   • machine             per-file transfer state machine
//   • batch / aggregate   enumeration, orchestration, result folding
//   • tasks               async connectors

pub mod aggregate;
pub mod auth;
pub mod batch;
pub mod encoding;
pub mod endpoint;
pub mod error;
pub mod fingerprint;
pub mod local;
pub mod machine;
pub mod macros;
pub mod remote;
pub mod tasks;
pub mod types;
pub mod workdir;

pub use aggregate::aggregate;
pub use auth::respond_to_prompts;
pub use batch::BatchOrchestrator;
pub use encoding::FileEncoding;
pub use endpoint::{EndpointRef, EntryInfo, FileEndpoint, Side};
pub use error::{TransferError, TransferErrorKind, TransferResult};
pub use fingerprint::{verify as verify_fingerprint, HostKey, Verification};
pub use local::LocalEndpoint;
pub use machine::{SingleTransfer, TransferContext, TEMP_SUFFIX};
pub use macros::{FileMask, MacroContext, MacroEngine};
pub use remote::SftpEndpoint;
pub use tasks::{delete_directory, delete_files, download_files, upload_files, write_file};
pub use types::*;
pub use workdir::WorkDir;
