//! # filerelay – SFTP
//!
//! Policy-driven SFTP file transfer engine providing:
//!   • Batch upload and download with mask, regex or explicit-path selection
//!   • Lock renaming of source files and temporary destination names
//!   • Conflict actions (error / overwrite / append) with restoration on failure
//!   • Source post-operations (delete / rename / move / nothing)
//!   • `%Macro%` and `*` mask renaming of files and directories
//!   • Host key fingerprint pinning (MD5 / SHA-256, hex or Base64)
//!   • Password, key, combined and keyboard-interactive authentication
//!   • Single-file text writes and remote file / directory deletion
//!   • Overall timeouts through a shared cancellation token

pub mod sftp;
