/// Vault access
///
/// The vault itself is an external service reached through its CLI with a
/// session token. Items are read-only projections fetched on demand; nothing
/// is cached across invocations, so a rotated secret is never served stale.
pub mod query;

use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::process::Command;
use std::time::Duration;

use crate::errors::SyncError;
use crate::vcs::run_with_timeout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultItem {
    pub id: String,
    pub name: String,
    /// Custom field name → value
    pub fields: BTreeMap<String, String>,
    pub notes: Option<String>,
}

pub trait VaultClient {
    /// Server-side filtered search. `Ok(None)` means the client cannot
    /// filter this query shape server-side and the caller should fall back
    /// to listing and filtering locally.
    fn search_items(&self, query: &str) -> Result<Option<Vec<VaultItem>>>;

    fn list_items(&self) -> Result<Vec<VaultItem>>;

    fn get_item(&self, id: &str) -> Result<VaultItem>;

    /// The item's primary login password — a distinct vault concept from
    /// custom fields. `Ok(None)` when the item has none.
    fn get_password(&self, id: &str) -> Result<Option<String>>;
}

/// Shell-out implementation against the Bitwarden-style CLI. The session
/// token is passed per invocation and never written anywhere.
pub struct BwCli {
    cli: String,
    session: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct BwItem {
    id: String,
    name: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    fields: Option<Vec<BwField>>,
    #[serde(default)]
    login: Option<BwLogin>,
}

#[derive(Debug, Deserialize)]
struct BwField {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BwLogin {
    #[serde(default)]
    username: Option<String>,
}

impl BwItem {
    fn into_item(self) -> VaultItem {
        let mut fields = BTreeMap::new();

        for field in self.fields.unwrap_or_default() {
            if let (Some(name), Some(value)) = (field.name, field.value) {
                fields.insert(name, value);
            }
        }

        // Login username surfaces as a regular field unless one shadows it
        if let Some(login) = self.login {
            if let Some(username) = login.username {
                fields.entry("username".to_string()).or_insert(username);
            }
        }

        VaultItem {
            id: self.id,
            name: self.name,
            fields,
            notes: self.notes.filter(|n| !n.is_empty()),
        }
    }
}

impl BwCli {
    pub fn new(cli: &str, session: &str, timeout: Duration) -> Self {
        BwCli {
            cli: cli.to_string(),
            session: session.to_string(),
            timeout,
        }
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.cli);
        cmd.args(args).args(["--session", &self.session]);

        let output = run_with_timeout(cmd, self.timeout).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SyncError::UpstreamUnavailable(format!(
                "vault CLI '{}' not found in PATH",
                self.cli
            )),
            ErrorKind::TimedOut => SyncError::UpstreamUnavailable(format!(
                "vault CLI timed out after {}s",
                self.timeout.as_secs()
            )),
            _ => SyncError::UpstreamUnavailable(format!("failed to run vault CLI: {}", e)),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lowered = stderr.to_lowercase();

            if lowered.contains("unauthorized")
                || lowered.contains("locked")
                || lowered.contains("not logged in")
            {
                return Err(SyncError::NotAuthenticated(
                    "vault session rejected; unlock again".to_string(),
                )
                .into());
            }

            bail!("vault CLI '{} {}' failed: {}", self.cli, args.join(" "), stderr.trim());
        }

        Ok(output.stdout)
    }
}

fn is_infrastructure_error(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<SyncError>(),
        Some(SyncError::NotAuthenticated(_)) | Some(SyncError::UpstreamUnavailable(_))
    )
}

impl VaultClient for BwCli {
    fn search_items(&self, query: &str) -> Result<Option<Vec<VaultItem>>> {
        // The CLI's --search treats whitespace and glob characters as its
        // own query syntax; those shapes go through the local filter instead.
        if query.is_empty() || query.chars().any(|c| c.is_whitespace() || "*?[]".contains(c)) {
            return Ok(None);
        }

        let stdout = self.run(&["list", "items", "--search", query])?;
        let items: Vec<BwItem> = serde_json::from_slice(&stdout)?;
        Ok(Some(items.into_iter().map(BwItem::into_item).collect()))
    }

    fn list_items(&self) -> Result<Vec<VaultItem>> {
        let stdout = self.run(&["list", "items"])?;
        let items: Vec<BwItem> = serde_json::from_slice(&stdout)?;
        Ok(items.into_iter().map(BwItem::into_item).collect())
    }

    fn get_item(&self, id: &str) -> Result<VaultItem> {
        let stdout = self.run(&["get", "item", id]).map_err(|e| {
            if is_infrastructure_error(&e) {
                e
            } else {
                SyncError::NotFound(format!("vault item '{}'", id)).into()
            }
        })?;
        let item: BwItem = serde_json::from_slice(&stdout)?;
        Ok(item.into_item())
    }

    fn get_password(&self, id: &str) -> Result<Option<String>> {
        match self.run(&["get", "password", id]) {
            Ok(stdout) => {
                let password = String::from_utf8_lossy(&stdout).trim_end().to_string();
                Ok((!password.is_empty()).then_some(password))
            }
            // An item without a primary password is a normal case, not a
            // failure; session and reachability problems still propagate.
            Err(e) if is_infrastructure_error(&e) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

/// In-memory vault for tests; lets the query and materializer layers run
/// without a live vault.
#[cfg(test)]
pub mod testing {
    use super::*;

    pub struct MemoryVault {
        pub items: Vec<VaultItem>,
        pub passwords: BTreeMap<String, String>,
        /// When false, search_items reports the query shape unsupported.
        pub server_search: bool,
    }

    impl MemoryVault {
        pub fn new(items: Vec<VaultItem>) -> Self {
            MemoryVault {
                items,
                passwords: BTreeMap::new(),
                server_search: true,
            }
        }

        pub fn with_password(mut self, id: &str, password: &str) -> Self {
            self.passwords.insert(id.to_string(), password.to_string());
            self
        }
    }

    impl VaultClient for MemoryVault {
        fn search_items(&self, query: &str) -> Result<Option<Vec<VaultItem>>> {
            if !self.server_search {
                return Ok(None);
            }
            let needle = query.to_lowercase();
            Ok(Some(
                self.items
                    .iter()
                    .filter(|i| i.name.to_lowercase().contains(&needle))
                    .cloned()
                    .collect(),
            ))
        }

        fn list_items(&self) -> Result<Vec<VaultItem>> {
            Ok(self.items.clone())
        }

        fn get_item(&self, id: &str) -> Result<VaultItem> {
            self.items
                .iter()
                .find(|i| i.id == id)
                .cloned()
                .ok_or_else(|| SyncError::NotFound(format!("vault item '{}'", id)).into())
        }

        fn get_password(&self, id: &str) -> Result<Option<String>> {
            Ok(self.passwords.get(id).cloned())
        }
    }

    pub fn item(id: &str, name: &str, fields: &[(&str, &str)]) -> VaultItem {
        VaultItem {
            id: id.to_string(),
            name: name.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bw_item_parsing() {
        let json = r#"{
            "id": "abc-123",
            "name": "prod-db",
            "notes": "primary database",
            "login": {"username": "admin"},
            "fields": [
                {"name": "HOST", "value": "db.internal"},
                {"name": "PORT", "value": "5432"},
                {"name": null, "value": "orphan"}
            ]
        }"#;

        let item: BwItem = serde_json::from_str(json).unwrap();
        let item = item.into_item();

        assert_eq!(item.id, "abc-123");
        assert_eq!(item.name, "prod-db");
        assert_eq!(item.fields.get("HOST").map(String::as_str), Some("db.internal"));
        assert_eq!(item.fields.get("PORT").map(String::as_str), Some("5432"));
        assert_eq!(item.fields.get("username").map(String::as_str), Some("admin"));
        assert_eq!(item.notes.as_deref(), Some("primary database"));
        // Nameless fields are dropped
        assert_eq!(item.fields.len(), 3);
    }

    #[test]
    fn test_bw_item_minimal() {
        let json = r#"{"id": "x", "name": "bare"}"#;
        let item: BwItem = serde_json::from_str(json).unwrap();
        let item = item.into_item();

        assert!(item.fields.is_empty());
        assert!(item.notes.is_none());
    }

    #[test]
    fn test_custom_field_shadows_login_username() {
        let json = r#"{
            "id": "x",
            "name": "svc",
            "login": {"username": "from-login"},
            "fields": [{"name": "username", "value": "from-field"}]
        }"#;

        let item: BwItem = serde_json::from_str(json).unwrap();
        let item = item.into_item();
        assert_eq!(item.fields.get("username").map(String::as_str), Some("from-field"));
    }
}
