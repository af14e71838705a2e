use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::ui;
use crate::vault::query::QueryEngine;
use crate::vault::{VaultClient, VaultItem};

/// Logical keys extracted from every matching item, in output order.
pub const CONVENTIONAL_KEYS: &[&str] = &[
    "PASSWORD", "API_KEY", "TOKEN", "USERNAME", "HOST", "URL", "DB", "DATABASE", "PORT",
];

#[derive(Debug, Default)]
pub struct BuildReport {
    pub items_matched: usize,
    pub entries_written: usize,
}

/// Materialize a secrets file from every vault item whose name or custom
/// field names match `pattern` (case-insensitive substring).
///
/// The file is built in a same-directory temp file created with owner-only
/// permissions before any secret is written, then renamed into place, so a
/// reader of `output` only ever sees a complete file. Zero matches leave
/// `output` untouched; silently emptying a populated secrets file would be
/// worse than doing nothing.
pub fn build<C: VaultClient>(
    client: &C,
    pattern: &str,
    output: &Path,
    interactive: bool,
) -> Result<BuildReport> {
    let engine = QueryEngine::new(client);

    let all = client.list_items()?;
    let matched: Vec<&VaultItem> = all.iter().filter(|i| matches_pattern(i, pattern)).collect();

    if matched.is_empty() {
        return Ok(BuildReport::default());
    }

    let dir = output.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(".vaultsync-env")
        .tempfile_in(dir.unwrap_or_else(|| Path::new(".")))
        .context("Failed to create temporary env file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
    }

    let mut report = BuildReport {
        items_matched: matched.len(),
        entries_written: 0,
    };

    for item in &matched {
        let prefix = env_key(&item.name);
        for key in CONVENTIONAL_KEYS {
            if let Some(value) = engine.logical_value(item, key)? {
                writeln!(tmp, "{}_{}={}", prefix, key, value)?;
                report.entries_written += 1;
            }
        }
    }

    tmp.flush()?;
    tmp.persist(output)
        .with_context(|| format!("Failed to move env file into {}", output.display()))?;

    if interactive {
        // The one deliberate secret-surfacing path, for operator review
        ui::section(&format!("Contents of {}:", output.display()));
        print!("{}", fs::read_to_string(output)?);
    }

    Ok(report)
}

fn matches_pattern(item: &VaultItem, pattern: &str) -> bool {
    let needle = pattern.to_lowercase();
    item.name.to_lowercase().contains(&needle)
        || item
            .fields
            .keys()
            .any(|k| k.to_lowercase().contains(&needle))
}

/// Sanitize an item name into an environment-variable prefix.
pub fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::testing::{item, MemoryVault};
    use tempfile::TempDir;

    fn vault() -> MemoryVault {
        MemoryVault::new(vec![
            item(
                "1",
                "prod-db",
                &[("HOST", "db.internal"), ("PORT", "5432"), ("username", "admin")],
            ),
            item("2", "billing-api", &[("API_KEY", "key-abc")]),
            item("3", "unrelated", &[("color", "blue")]),
        ])
        .with_password("1", "pgpass")
    }

    #[test]
    fn test_env_key_sanitization() {
        assert_eq!(env_key("prod-db"), "PROD_DB");
        assert_eq!(env_key("My Service 2"), "MY_SERVICE_2");
        assert_eq!(env_key("already_OK"), "ALREADY_OK");
    }

    #[test]
    fn test_build_writes_matched_entries() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("secrets.env");

        let report = build(&vault(), "db", &output, false).unwrap();
        assert_eq!(report.items_matched, 1);

        let contents = fs::read_to_string(&output).unwrap();
        assert!(contents.contains("PROD_DB_HOST=db.internal"));
        assert!(contents.contains("PROD_DB_PORT=5432"));
        assert!(contents.contains("PROD_DB_USERNAME=admin"));
        // Primary password fills the PASSWORD slot when no field shadows it
        assert!(contents.contains("PROD_DB_PASSWORD=pgpass"));
        assert!(!contents.contains("billing"));
        assert_eq!(report.entries_written, contents.lines().count());
    }

    #[test]
    fn test_build_matches_on_field_names_too() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("secrets.env");

        // "api_key" matches billing-api through its field name
        let report = build(&vault(), "api_key", &output, false).unwrap();
        assert_eq!(report.items_matched, 1);

        let contents = fs::read_to_string(&output).unwrap();
        assert!(contents.contains("BILLING_API_API_KEY=key-abc"));
    }

    #[test]
    fn test_build_no_matches_is_a_noop() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("secrets.env");

        let report = build(&vault(), "nonexistent-service", &output, false).unwrap();
        assert_eq!(report.items_matched, 0);
        assert_eq!(report.entries_written, 0);
        assert!(!output.exists());
    }

    #[test]
    fn test_build_no_matches_keeps_previous_file() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("secrets.env");
        fs::write(&output, "KEEP=me\n").unwrap();

        build(&vault(), "nonexistent-service", &output, false).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "KEEP=me\n");
    }

    #[test]
    fn test_build_overwrites_wholesale() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("secrets.env");
        fs::write(&output, "STALE=entry\n").unwrap();

        build(&vault(), "db", &output, false).unwrap();
        let contents = fs::read_to_string(&output).unwrap();
        assert!(!contents.contains("STALE"));
    }

    #[test]
    fn test_build_leaves_no_temp_files_behind() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("secrets.env");

        build(&vault(), "db", &output, false).unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".vaultsync-env"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_build_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let output = temp.path().join("secrets.env");

        build(&vault(), "db", &output, false).unwrap();
        let mode = fs::metadata(&output).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
