use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::scan;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub vault: VaultConfig,

    #[serde(default)]
    pub github: PlatformConfig,

    #[serde(default)]
    pub gitlab: PlatformConfig,

    #[serde(default)]
    pub mirror: MirrorConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub env: EnvConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Timeout applied to every external call (vault CLI, API fetch, clone,
    /// push). A timed-out call is treated like the corresponding failure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault CLI binary name
    #[serde(default = "default_vault_cli")]
    pub cli: String,

    /// Environment variable holding the unlocked session token
    #[serde(default = "default_session_env")]
    pub session_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub username: Option<String>,

    /// API base override (e.g. self-hosted instances)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Worker pool size for batch mirroring; 1 means sequential
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Destination namespace when not given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_owner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_deny_terms")]
    pub deny_terms: Vec<String>,

    #[serde(default = "default_token_threshold")]
    pub token_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Default output path for materialized secrets files
    #[serde(default = "default_env_output")]
    pub output: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            general: GeneralConfig::default(),
            vault: VaultConfig::default(),
            github: PlatformConfig::default(),
            gitlab: PlatformConfig::default(),
            mirror: MirrorConfig::default(),
            scan: ScanConfig::default(),
            env: EnvConfig::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            cli: default_vault_cli(),
            session_env: default_session_env(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            username: None,
            api_base: None,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        MirrorConfig {
            jobs: default_jobs(),
            dest_owner: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            deny_terms: default_deny_terms(),
            token_threshold: default_token_threshold(),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            output: default_env_output(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_vault_cli() -> String {
    "bw".to_string()
}

fn default_session_env() -> String {
    "BW_SESSION".to_string()
}

fn default_jobs() -> usize {
    1
}

fn default_deny_terms() -> Vec<String> {
    scan::DEFAULT_DENY_TERMS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_token_threshold() -> usize {
    scan::DEFAULT_TOKEN_THRESHOLD
}

fn default_env_output() -> String {
    "~/.vaultsync/secrets.env".to_string()
}

impl Config {
    pub fn env_output_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.env.output).to_string())
    }
}

pub fn init(config_path: PathBuf, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let config = Config::default();

    let toml_string = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    fs::write(&config_path, toml_string).context("Failed to write config file")?;

    Ok(())
}

pub fn load(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        anyhow::bail!(
            "Config not found at {}. Run 'vaultsync init' first.",
            config_path.display()
        );
    }

    let contents = fs::read_to_string(config_path).context("Failed to read config file")?;
    let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

    Ok(config)
}

/// Load the config if present, otherwise fall back to defaults. Most
/// commands work out of the box without an `init`.
pub fn load_or_default(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        load(config_path)
    } else {
        Ok(Config::default())
    }
}

pub fn save(config_path: &Path, config: &Config) -> Result<()> {
    let toml_string = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(config_path, toml_string).context("Failed to write config file")?;
    Ok(())
}

pub fn edit(config_path: &Path) -> Result<()> {
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    Ok(())
}

pub fn check_exists(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        Ok(())
    } else {
        anyhow::bail!("Config file not found")
    }
}
