// ── Types ─────────────────────────────────────────────────────────────────────

use crate::sftp::encoding::FileEncoding;
use crate::sftp::error::TransferError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_sftp_port() -> u16 {
    22
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_mask() -> String {
    "*".to_string()
}
fn default_buffer_size_kb() -> u32 {
    32
}
fn default_connection_timeout_secs() -> u64 {
    60
}
fn default_transfer_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Policies ─────────────────────────────────────────────────────────────────

/// What to do when the source yields no files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotFoundAction {
    #[default]
    Error,
    Info,
    Ignore,
}

/// What happens to the source file after a successful transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SourceOperation {
    Delete,
    Rename,
    Move,
    #[default]
    Nothing,
}

/// Conflict action applied when the destination file already exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DestinationAction {
    #[default]
    Error,
    Overwrite,
    Append,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LineSeparator {
    #[default]
    Lf,
    CrLf,
}

impl LineSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineSeparator::Lf => "\n",
            LineSeparator::CrLf => "\r\n",
        }
    }
}

// ── Source / Destination ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    #[serde(default)]
    pub directory: String,
    /// File name or mask (`*`, `?`, or a `<regex>` prefixed expression).
    #[serde(default = "default_mask")]
    pub file_name: String,
    /// Explicit paths; when set, `directory` and `file_name` are ignored.
    #[serde(default)]
    pub file_paths: Option<Vec<String>>,
    #[serde(default = "default_false")]
    pub include_subdirectories: bool,
    #[serde(default)]
    pub not_found_action: NotFoundAction,
    #[serde(default)]
    pub operation: SourceOperation,
    #[serde(default)]
    pub file_name_after_transfer: Option<String>,
    #[serde(default)]
    pub directory_to_move_after_transfer: Option<String>,
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self {
            directory: String::new(),
            file_name: default_mask(),
            file_paths: None,
            include_subdirectories: false,
            not_found_action: NotFoundAction::default(),
            operation: SourceOperation::default(),
            file_name_after_transfer: None,
            directory_to_move_after_transfer: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSpec {
    #[serde(default)]
    pub directory: String,
    /// Name template; empty keeps the source file name.
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub action: DestinationAction,
    /// Prefix appended content with a line separator when needed.
    #[serde(default = "default_false")]
    pub add_new_line: bool,
    #[serde(default)]
    pub line_separator: LineSeparator,
    #[serde(default)]
    pub encoding: FileEncoding,
}

// ── Connection & Authentication ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticationMode {
    #[default]
    Password,
    PrivateKeyFile,
    PrivateKeyString,
    UsernamePasswordPrivateKeyFile,
    UsernamePasswordPrivateKeyString,
    KeyboardInteractive,
    PasswordOrKeyboardInteractive,
}

/// One configured keyboard-interactive answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub prompt: String,
    pub response: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSpec {
    pub address: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub authentication: AuthenticationMode,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_file: Option<String>,
    #[serde(default)]
    pub private_key_string: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    #[serde(default)]
    pub prompt_responses: Vec<PromptResponse>,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    /// 0 disables keepalive messages.
    #[serde(default)]
    pub keepalive_interval_secs: u32,
    #[serde(default = "default_buffer_size_kb")]
    pub buffer_size_kb: u32,
    /// Expected host key fingerprint (MD5 or SHA-256, hex or Base64).
    #[serde(default)]
    pub server_fingerprint: Option<String>,
    /// Forced host key algorithm, e.g. `ssh-ed25519`.
    #[serde(default)]
    pub host_key_algorithm: Option<String>,
}

impl Default for ConnectionSpec {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: default_sftp_port(),
            user_name: String::new(),
            authentication: AuthenticationMode::default(),
            password: None,
            private_key_file: None,
            private_key_string: None,
            private_key_passphrase: None,
            prompt_responses: Vec::new(),
            connection_timeout_secs: default_connection_timeout_secs(),
            keepalive_interval_secs: 0,
            buffer_size_kb: default_buffer_size_kb(),
            server_fingerprint: None,
            host_key_algorithm: None,
        }
    }
}

// Credentials must never end up in logs.
impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user_name", &self.user_name)
            .field("authentication", &self.authentication)
            .field("private_key_file", &self.private_key_file)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("keepalive_interval_secs", &self.keepalive_interval_secs)
            .field("buffer_size_kb", &self.buffer_size_kb)
            .field("server_fingerprint", &self.server_fingerprint)
            .field("host_key_algorithm", &self.host_key_algorithm)
            .finish_non_exhaustive()
    }
}

impl ConnectionSpec {
    pub fn buffer_size_bytes(&self) -> usize {
        self.buffer_size_kb.max(1) as usize * 1024
    }
}

// ── Options / Run info ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOptions {
    #[serde(default = "default_true")]
    pub throw_error_on_fail: bool,
    #[serde(default = "default_true")]
    pub rename_source_file_before_transfer: bool,
    #[serde(default = "default_true")]
    pub rename_destination_file_during_transfer: bool,
    #[serde(default = "default_false")]
    pub create_destination_directories: bool,
    #[serde(default = "default_false")]
    pub preserve_last_modified: bool,
    #[serde(default = "default_true")]
    pub operation_log: bool,
    /// Overall wall-clock limit for the run.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            throw_error_on_fail: true,
            rename_source_file_before_transfer: true,
            rename_destination_file_during_transfer: true,
            create_destination_directories: false,
            preserve_last_modified: false,
            operation_log: true,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    #[serde(default)]
    pub transfer_name: String,
    #[serde(default = "default_transfer_id")]
    pub transfer_id: String,
    /// Root for the temporary local work directory; the OS temp dir when unset.
    #[serde(default)]
    pub work_directory: Option<String>,
}

impl Default for RunInfo {
    fn default() -> Self {
        Self {
            transfer_name: String::new(),
            transfer_id: default_transfer_id(),
            work_directory: None,
        }
    }
}

/// Full configuration of one batch invocation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchSpec {
    #[serde(default)]
    pub source: SourceSpec,
    #[serde(default)]
    pub destination: DestinationSpec,
    #[serde(default)]
    pub connection: ConnectionSpec,
    #[serde(default)]
    pub options: TransferOptions,
    #[serde(default)]
    pub info: RunInfo,
}

// ── Per-file state ───────────────────────────────────────────────────────────

/// One file discovered on the source endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferItem {
    pub name: String,
    pub path: String,
    /// Directory the file lives in on the source endpoint.
    pub directory: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Step of the single-file state machine, used for error attribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferPhase {
    RenameSourceLock,
    CheckDestinationExists,
    PutFile,
    AppendFile,
    RenameDestinationLock,
    DeleteDestination,
    PreserveModifiedTime,
    SourceOperationMove,
    SourceOperationRename,
    SourceOperationDelete,
    SourceOperationRestore,
    Cleanup,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SingleTransferResult {
    /// Key used to group errors; the source file name.
    pub file_name: String,
    pub success: bool,
    pub action_skipped: bool,
    pub error_list: Vec<String>,
    /// Non-fatal notes (e.g. renamed source no longer found).
    pub warnings: Vec<String>,
    pub transferred_file: Option<String>,
    pub transferred_file_path: Option<String>,
    pub transferred_destination_path: Option<String>,
    /// Attributed cause of a failure (kind, phase and file).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransferError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success: bool,
    pub action_skipped: bool,
    pub user_result_message: String,
    pub successful_transfer_count: usize,
    pub failed_transfer_count: usize,
    pub transferred_file_names: Vec<String>,
    pub transfer_errors: BTreeMap<String, Vec<String>>,
    pub transferred_file_paths: Vec<String>,
    pub transferred_destination_file_paths: Vec<String>,
    pub operations_log: Vec<String>,
}

// ── Write connector ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOptions {
    #[serde(default)]
    pub action: DestinationAction,
    #[serde(default = "default_false")]
    pub add_new_line: bool,
    #[serde(default)]
    pub line_separator: LineSeparator,
    #[serde(default)]
    pub encoding: FileEncoding,
    #[serde(default = "default_false")]
    pub enable_bom: bool,
    #[serde(default = "default_false")]
    pub create_destination_directories: bool,
    #[serde(default = "default_true")]
    pub rename_destination_file_during_transfer: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            action: DestinationAction::default(),
            add_new_line: false,
            line_separator: LineSeparator::default(),
            encoding: FileEncoding::default(),
            enable_bom: false,
            create_destination_directories: false,
            rename_destination_file_during_transfer: true,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    /// Full remote path; macros are expanded in the directory and name parts.
    pub path: String,
    pub content: String,
    pub connection: ConnectionSpec,
    #[serde(default)]
    pub options: WriteOptions,
    #[serde(default)]
    pub info: RunInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub path: String,
    pub size_in_bytes: u64,
}

// ── Delete connectors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFilesRequest {
    #[serde(default)]
    pub directory: String,
    #[serde(default = "default_mask")]
    pub file_mask: String,
    #[serde(default)]
    pub file_paths: Option<Vec<String>>,
    #[serde(default = "default_false")]
    pub include_subdirectories: bool,
    #[serde(default)]
    pub not_found_action: NotFoundAction,
    pub connection: ConnectionSpec,
    #[serde(default = "default_true")]
    pub throw_error_on_fail: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub info: RunInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDirectoryRequest {
    pub directory: String,
    #[serde(default = "default_false")]
    pub recursive: bool,
    pub connection: ConnectionSpec,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub info: RunInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeletedEntry {
    pub name: String,
    pub path: String,
    pub size_in_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub success: bool,
    /// Nothing matched and the not-found policy is Info or Ignore.
    pub action_skipped: bool,
    pub files: Vec<DeletedEntry>,
    /// Failures not raised because `throw_error_on_fail` is off.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
