use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::ErrorKind;
use std::process::{Command, Stdio};

use crate::cfg::Config;
use crate::errors::SyncError;
use crate::hosting::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    VaultSession,
    /// Platform-scoped; a token resolved for one platform is never reused
    /// for another.
    HostToken(Platform),
}

#[derive(Clone)]
pub struct Credential {
    pub kind: CredentialKind,
    pub resolved_at: DateTime<Utc>,
    value: String,
}

impl Credential {
    fn new(kind: CredentialKind, value: String) -> Self {
        Credential {
            kind,
            resolved_at: Utc::now(),
            value,
        }
    }

    /// The raw token. Only for injection at the point of use; never log it.
    pub fn expose(&self) -> &str {
        &self.value
    }

    #[cfg(test)]
    pub(crate) fn for_tests(kind: CredentialKind, value: String) -> Self {
        Credential::new(kind, value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("resolved_at", &self.resolved_at)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Resolves vault sessions and host tokens for one process invocation.
/// Created once per run and passed by reference; the only shared state is
/// the session token exported back into the process environment after a
/// successful unlock.
pub struct CredentialResolver {
    vault_cli: String,
    session_env: String,
    interactive: bool,
}

impl CredentialResolver {
    pub fn new(config: &Config, interactive: bool) -> Self {
        CredentialResolver {
            vault_cli: config.vault.cli.clone(),
            session_env: config.vault.session_env.clone(),
            interactive,
        }
    }

    /// Environment-provided session first (trusted unchanged), interactive
    /// unlock otherwise. A successful unlock exports the session so later
    /// resolutions in this process are free.
    pub fn vault_session(&self) -> Result<Credential> {
        if let Ok(session) = std::env::var(&self.session_env) {
            if !session.trim().is_empty() {
                return Ok(Credential::new(CredentialKind::VaultSession, session));
            }
        }

        // Unlock needs an attended terminal for the master password prompt
        if !self.interactive || !console::user_attended() {
            return Err(SyncError::NotAuthenticated(format!(
                "no vault session configured (set {} or run an interactive command)",
                self.session_env
            ))
            .into());
        }

        let token = self.unlock()?;
        std::env::set_var(&self.session_env, &token);

        Ok(Credential::new(CredentialKind::VaultSession, token))
    }

    /// The unlock prompt goes straight to the terminal; only the returned
    /// token is captured.
    fn unlock(&self) -> Result<String> {
        let output = Command::new(&self.vault_cli)
            .args(["unlock", "--raw"])
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SyncError::UpstreamUnavailable(format!(
                    "vault CLI '{}' not found in PATH",
                    self.vault_cli
                )),
                _ => SyncError::UpstreamUnavailable(format!(
                    "failed to run vault CLI '{}': {}",
                    self.vault_cli, e
                )),
            })?;

        if !output.status.success() {
            return Err(
                SyncError::NotAuthenticated("vault rejected the unlock attempt".to_string()).into(),
            );
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(
                SyncError::NotAuthenticated("vault unlock returned no session token".to_string())
                    .into(),
            );
        }

        Ok(token)
    }

    /// First non-empty variable from the platform's ordered list wins. No
    /// interactive fallback for host tokens.
    pub fn host_token(&self, platform: Platform) -> Result<Credential> {
        for name in platform.token_env_vars() {
            if let Ok(value) = std::env::var(name) {
                if !value.trim().is_empty() {
                    return Ok(Credential::new(
                        CredentialKind::HostToken(platform),
                        value.trim().to_string(),
                    ));
                }
            }
        }

        Err(SyncError::NotAuthenticated(format!(
            "no {} token configured (set {})",
            platform,
            platform.token_env_vars().join(" or ")
        ))
        .into())
    }
}
