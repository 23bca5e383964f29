// ── Authentication ───────────────────────────────────────────────────────────

use crate::sftp::error::{TransferError, TransferResult};
use crate::sftp::types::{AuthenticationMode, ConnectionSpec, PromptResponse};
use crate::sftp::workdir::WorkDir;
use log::{debug, info};
use ssh2::Session;
use std::path::PathBuf;

// ── Validation ───────────────────────────────────────────────────────────────

fn require<'a>(
    value: &'a Option<String>,
    what: &str,
    mode: AuthenticationMode,
) -> TransferResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(TransferError::invalid_input(format!(
            "{} is required for authentication mode {:?}",
            what, mode
        ))),
    }
}

/// Reject connection settings that can never work, before any I/O.
pub fn validate_connection(conn: &ConnectionSpec) -> TransferResult<()> {
    if conn.address.trim().is_empty() {
        return Err(TransferError::invalid_input("Host address is required"));
    }
    if conn.user_name.trim().is_empty() {
        return Err(TransferError::invalid_input("User name is required"));
    }
    if conn.buffer_size_kb == 0 {
        return Err(TransferError::invalid_input("Buffer size must be greater than zero"));
    }

    let mode = conn.authentication;
    match mode {
        AuthenticationMode::Password | AuthenticationMode::PasswordOrKeyboardInteractive => {
            require(&conn.password, "Password", mode)?;
        }
        AuthenticationMode::PrivateKeyFile => {
            require(&conn.private_key_file, "Private key file", mode)?;
        }
        AuthenticationMode::PrivateKeyString => {
            require(&conn.private_key_string, "Private key string", mode)?;
        }
        AuthenticationMode::UsernamePasswordPrivateKeyFile => {
            require(&conn.password, "Password", mode)?;
            require(&conn.private_key_file, "Private key file", mode)?;
        }
        AuthenticationMode::UsernamePasswordPrivateKeyString => {
            require(&conn.password, "Password", mode)?;
            require(&conn.private_key_string, "Private key string", mode)?;
        }
        AuthenticationMode::KeyboardInteractive => {
            let no_password = conn.password.as_deref().unwrap_or("").is_empty();
            if conn.prompt_responses.is_empty() && no_password {
                return Err(TransferError::invalid_input(
                    "Keyboard-interactive authentication needs prompt responses or a password",
                ));
            }
        }
    }
    Ok(())
}

/// Expand a leading `~/` against the user's home directory.
pub fn resolve_key_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ── Keyboard-interactive ─────────────────────────────────────────────────────

fn normalize_prompt(prompt: &str) -> String {
    prompt.trim().trim_end_matches(':').trim().to_lowercase()
}

/// Answer every server prompt from the configured table. A prompt mentioning
/// "password" falls back to `password` when the table has no entry for it.
/// Any prompt left unanswered fails the whole exchange.
pub fn respond_to_prompts(
    prompts: &[&str],
    table: &[PromptResponse],
    password: Option<&str>,
) -> TransferResult<Vec<String>> {
    prompts
        .iter()
        .map(|prompt| {
            let key = normalize_prompt(prompt);
            if let Some(entry) = table.iter().find(|r| normalize_prompt(&r.prompt) == key) {
                return Ok(entry.response.clone());
            }
            match password {
                Some(pw) if key.contains("password") => Ok(pw.to_string()),
                _ => Err(TransferError::connection(format!(
                    "No response configured for keyboard-interactive prompt '{}'",
                    prompt.trim()
                ))),
            }
        })
        .collect()
}

/// Adapter from the libssh2 callback to [`respond_to_prompts`]. libssh2 gives
/// the callback no error channel, so a failure is stashed and answered with
/// empty strings.
struct PromptResponder<'a> {
    table: &'a [PromptResponse],
    password: Option<&'a str>,
    error: Option<TransferError>,
}

impl ssh2::KeyboardInteractivePrompt for PromptResponder<'_> {
    fn prompt(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt],
    ) -> Vec<String> {
        let texts: Vec<&str> = prompts.iter().map(|p| p.text.as_ref()).collect();
        match respond_to_prompts(&texts, self.table, self.password) {
            Ok(answers) => answers,
            Err(e) => {
                self.error = Some(e);
                vec![String::new(); prompts.len()]
            }
        }
    }
}

// ── Session authentication ───────────────────────────────────────────────────

fn auth_failed(step: &str, e: impl std::fmt::Display) -> TransferError {
    TransferError::connection(format!("{} authentication failed: {}", step, e))
}

fn password_auth(session: &Session, conn: &ConnectionSpec) -> TransferResult<()> {
    let password = conn.password.as_deref().unwrap_or("");
    session
        .userauth_password(&conn.user_name, password)
        .map_err(|e| auth_failed("Password", e))
}

fn key_file_auth(session: &Session, conn: &ConnectionSpec) -> TransferResult<()> {
    let path = resolve_key_path(conn.private_key_file.as_deref().unwrap_or(""));
    session
        .userauth_pubkey_file(
            &conn.user_name,
            None,
            &path,
            conn.private_key_passphrase.as_deref(),
        )
        .map_err(|e| auth_failed("Public-key (file)", e))
}

fn key_string_auth(
    session: &Session,
    conn: &ConnectionSpec,
    workdir: &WorkDir,
) -> TransferResult<()> {
    // libssh2 only loads keys from disk; stage the key and remove it right away.
    let key = conn.private_key_string.as_deref().unwrap_or("");
    let staged = workdir.stage("key", key.as_bytes())?;
    let result = session.userauth_pubkey_file(
        &conn.user_name,
        None,
        &staged,
        conn.private_key_passphrase.as_deref(),
    );
    let _ = std::fs::remove_file(&staged);
    result.map_err(|e| auth_failed("Public-key (memory)", e))
}

fn keyboard_interactive_auth(session: &Session, conn: &ConnectionSpec) -> TransferResult<()> {
    let mut responder = PromptResponder {
        table: &conn.prompt_responses,
        password: conn.password.as_deref(),
        error: None,
    };
    let result = session.userauth_keyboard_interactive(&conn.user_name, &mut responder);
    if let Some(err) = responder.error {
        return Err(err);
    }
    result.map_err(|e| auth_failed("Keyboard-interactive", e))
}

/// Run `first`, then `second` unless the session is already authenticated.
///
/// An error from `first` does not end the exchange: libssh2 reports a
/// partially successful method (`AuthenticationMethods publickey,password`)
/// as a failure, and the server still expects the second method.
fn two_step(
    first: impl FnOnce() -> TransferResult<()>,
    second: impl FnOnce() -> TransferResult<()>,
    authenticated: impl Fn() -> bool,
) -> TransferResult<()> {
    if let Err(e) = first() {
        debug!("First authentication step not accepted: {}", e.message);
    }
    if authenticated() {
        return Ok(());
    }
    second()
}

/// Run the exchange selected by `conn.authentication` on a handshaken session.
pub fn authenticate(
    session: &Session,
    conn: &ConnectionSpec,
    workdir: &WorkDir,
) -> TransferResult<()> {
    let mode = conn.authentication;
    debug!("Authenticating {} with {:?}", conn.user_name, mode);

    match mode {
        AuthenticationMode::Password => password_auth(session, conn)?,
        AuthenticationMode::PrivateKeyFile => key_file_auth(session, conn)?,
        AuthenticationMode::PrivateKeyString => key_string_auth(session, conn, workdir)?,
        AuthenticationMode::UsernamePasswordPrivateKeyFile => two_step(
            || key_file_auth(session, conn),
            || password_auth(session, conn),
            || session.authenticated(),
        )?,
        AuthenticationMode::UsernamePasswordPrivateKeyString => two_step(
            || key_string_auth(session, conn, workdir),
            || password_auth(session, conn),
            || session.authenticated(),
        )?,
        AuthenticationMode::KeyboardInteractive => keyboard_interactive_auth(session, conn)?,
        AuthenticationMode::PasswordOrKeyboardInteractive => two_step(
            || password_auth(session, conn),
            || keyboard_interactive_auth(session, conn),
            || session.authenticated(),
        )?,
    }

    if !session.authenticated() {
        return Err(TransferError::connection(format!(
            "Authentication failed for {}: server did not accept {:?}",
            conn.user_name, mode
        )));
    }
    info!(
        "Authenticated to {} as {} via {:?}",
        conn.address, conn.user_name, mode
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn table() -> Vec<PromptResponse> {
        vec![
            PromptResponse {
                prompt: "Verification code:".into(),
                response: "123456".into(),
            },
            PromptResponse {
                prompt: "  Token ".into(),
                response: "abc".into(),
            },
        ]
    }

    #[test]
    fn prompts_match_trimmed_case_insensitive() {
        let answers =
            respond_to_prompts(&["verification CODE", "token:"], &table(), None).unwrap();
        assert_eq!(answers, vec!["123456", "abc"]);
    }

    #[test]
    fn password_prompt_uses_configured_password() {
        let answers = respond_to_prompts(&["Password: "], &table(), Some("s3cret")).unwrap();
        assert_eq!(answers, vec!["s3cret"]);
    }

    #[test]
    fn table_wins_over_password_fallback() {
        let table = vec![PromptResponse {
            prompt: "Password".into(),
            response: "from-table".into(),
        }];
        let answers = respond_to_prompts(&["password:"], &table, Some("pw")).unwrap();
        assert_eq!(answers, vec!["from-table"]);
    }

    #[test]
    fn unanswered_prompt_fails() {
        let err = respond_to_prompts(&["Favourite colour?"], &table(), Some("pw")).unwrap_err();
        assert!(err.message.contains("Favourite colour?"));
    }

    #[test]
    fn no_prompts_no_answers() {
        assert!(respond_to_prompts(&[], &[], None).unwrap().is_empty());
    }

    fn conn(mode: AuthenticationMode) -> ConnectionSpec {
        ConnectionSpec {
            address: "sftp.example.com".into(),
            user_name: "demo".into(),
            authentication: mode,
            ..Default::default()
        }
    }

    #[test]
    fn validation_requires_mode_credentials() {
        assert!(validate_connection(&conn(AuthenticationMode::Password)).is_err());
        assert!(validate_connection(&conn(AuthenticationMode::PrivateKeyFile)).is_err());
        assert!(validate_connection(&conn(AuthenticationMode::KeyboardInteractive)).is_err());

        let mut c = conn(AuthenticationMode::UsernamePasswordPrivateKeyString);
        c.password = Some("pw".into());
        assert!(validate_connection(&c).is_err());
        c.private_key_string = Some("KEY".into());
        assert!(validate_connection(&c).is_ok());
    }

    #[test]
    fn validation_rejects_missing_host_and_zero_buffer() {
        let mut c = conn(AuthenticationMode::Password);
        c.password = Some("pw".into());
        assert!(validate_connection(&c).is_ok());

        c.buffer_size_kb = 0;
        assert!(validate_connection(&c).is_err());

        let mut c = conn(AuthenticationMode::Password);
        c.password = Some("pw".into());
        c.address = " ".into();
        assert!(validate_connection(&c).is_err());
    }

    #[test]
    fn second_step_runs_after_partial_first_step() {
        let authenticated = Cell::new(false);
        let calls = Cell::new(0);
        let result = two_step(
            || {
                calls.set(calls.get() + 1);
                Err(TransferError::connection("publickey: partial success"))
            },
            || {
                calls.set(calls.get() + 1);
                authenticated.set(true);
                Ok(())
            },
            || authenticated.get(),
        );
        assert!(result.is_ok());
        assert_eq!(calls.get(), 2);
        assert!(authenticated.get());
    }

    #[test]
    fn second_step_skipped_once_authenticated() {
        let second_ran = Cell::new(false);
        two_step(
            || Ok(()),
            || {
                second_ran.set(true);
                Ok(())
            },
            || true,
        )
        .unwrap();
        assert!(!second_ran.get());
    }

    #[test]
    fn second_step_error_is_returned() {
        let err = two_step(
            || Err(TransferError::connection("key rejected")),
            || Err(TransferError::connection("password rejected")),
            || false,
        )
        .unwrap_err();
        assert_eq!(err.message, "password rejected");
    }

    #[test]
    fn tilde_expands_to_home() {
        let p = resolve_key_path("~/.ssh/id_ed25519");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(p, home.join(".ssh/id_ed25519"));
        }
        assert_eq!(resolve_key_path("/etc/key"), PathBuf::from("/etc/key"));
    }
}
