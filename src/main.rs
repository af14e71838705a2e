mod cfg;
mod creds;
mod envfile;
mod errors;
mod hosting;
mod mirror;
mod scan;
mod ui;
mod vault;
mod vcs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::creds::CredentialResolver;
use crate::errors::SyncError;
use crate::hosting::Platform;
use crate::mirror::{MirrorJob, SyncEngine, SystemGit};
use crate::scan::Scanner;
use crate::vault::query::QueryEngine;
use crate::vault::{BwCli, VaultClient};

/// Vaultsync - materialize secrets from a vault and mirror repositories across hosting platforms
#[derive(Parser)]
#[command(name = "vaultsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (defaults to ~/.vaultsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init {
        /// Force initialization even if config exists
        #[arg(short, long)]
        force: bool,
    },

    /// Materialize secrets files from the vault
    #[command(subcommand)]
    Env(EnvCommands),

    /// Query the vault directly
    #[command(subcommand)]
    Vault(VaultCommands),

    /// List repositories on a hosting platform
    Repos {
        /// Account whose repositories to list
        owner: String,

        /// Platform (github, gitlab)
        #[arg(short, long, default_value = "github")]
        platform: String,
    },

    /// Mirror all of an account's repositories to another platform
    Mirror {
        /// Source account
        owner: String,

        /// Source platform (github, gitlab)
        #[arg(long, default_value = "github")]
        from: String,

        /// Destination platform (github, gitlab)
        #[arg(long, default_value = "gitlab")]
        to: String,

        /// Destination namespace (defaults to config, then the source owner)
        #[arg(long)]
        dest_owner: Option<String>,

        /// Worker pool size (1 = sequential)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Only mirror the first N repositories
        #[arg(long)]
        limit: Option<usize>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Copy a file into the current repository and commit it, gated by the secret scanner
    Land {
        /// File to commit
        file: PathBuf,

        /// Repository subdirectory to place it in
        dest: String,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,

        /// Commit even if the scanner flags the file
        #[arg(short, long)]
        force: bool,
    },

    /// Scan a file with the secret heuristics and report the verdict
    Scan {
        /// File to scan
        file: PathBuf,
    },

    /// Run diagnostics and check external tools
    Doctor,

    /// Edit or view configuration
    Config {
        /// Open config in editor
        #[arg(long)]
        edit: bool,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
enum VaultCommands {
    /// Search items by name
    Find {
        /// Case-insensitive substring matched against item names
        query: String,
    },

    /// Print one field of an item
    Field {
        /// Item id
        id: String,

        /// Field name (the primary password backs PASSWORD when no custom
        /// field matches)
        name: String,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    /// Build a secrets file from vault items matching a pattern
    Build {
        /// Case-insensitive substring matched against item and field names
        pattern: String,

        /// Output path (defaults to the configured env output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the resulting file for verification
        #[arg(short, long)]
        interactive: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }

    ui::init();

    let config_path = cli.config.unwrap_or_else(|| {
        dirs::home_dir()
            .expect("Could not find home directory")
            .join(".vaultsync")
            .join("config.toml")
    });

    let result = match cli.command {
        Commands::Init { force } => cmd_init(config_path, force),
        Commands::Env(subcmd) => cmd_env(config_path, subcmd),
        Commands::Vault(subcmd) => cmd_vault(config_path, subcmd),
        Commands::Repos { owner, platform } => cmd_repos(config_path, owner, platform),
        Commands::Mirror {
            owner,
            from,
            to,
            dest_owner,
            jobs,
            limit,
            yes,
        } => cmd_mirror(config_path, owner, from, to, dest_owner, jobs, limit, yes),
        Commands::Land {
            file,
            dest,
            message,
            force,
        } => cmd_land(config_path, file, dest, message, force),
        Commands::Scan { file } => cmd_scan(config_path, file),
        Commands::Doctor => cmd_doctor(config_path),
        Commands::Config { edit, show } => cmd_config(config_path, edit, show),
    };

    if let Err(e) = result {
        ui::error(&format!("Error: {:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_init(config_path: PathBuf, force: bool) -> Result<()> {
    ui::info("Initializing vaultsync...");
    cfg::init(config_path, force)?;
    ui::success("Vaultsync initialized successfully!");
    ui::hint("Set BW_SESSION plus GITHUB_TOKEN/GITLAB_TOKEN in your environment to get started");
    Ok(())
}

fn cmd_env(config_path: PathBuf, subcmd: EnvCommands) -> Result<()> {
    let config = cfg::load_or_default(&config_path)?;

    match subcmd {
        EnvCommands::Build {
            pattern,
            output,
            interactive,
        } => {
            let output = output.unwrap_or_else(|| config.env_output_path());

            // Operator-driven command, so interactive unlock is allowed
            let resolver = CredentialResolver::new(&config, true);
            let session = resolver.vault_session()?;

            let client = BwCli::new(
                &config.vault.cli,
                session.expose(),
                Duration::from_secs(config.general.timeout_secs),
            );

            ui::info(&format!("Querying vault for items matching '{}'", pattern));
            let report = envfile::build(&client, &pattern, &output, interactive)?;

            if report.items_matched == 0 {
                ui::info(&format!(
                    "No vault items matched '{}' - {} left untouched",
                    pattern,
                    output.display()
                ));
            } else {
                ui::success(&format!(
                    "Wrote {} entries from {} items to {}",
                    report.entries_written,
                    report.items_matched,
                    output.display()
                ));
            }
        }
    }

    Ok(())
}

fn cmd_vault(config_path: PathBuf, subcmd: VaultCommands) -> Result<()> {
    let config = cfg::load_or_default(&config_path)?;

    let resolver = CredentialResolver::new(&config, true);
    let session = resolver.vault_session()?;

    let client = BwCli::new(
        &config.vault.cli,
        session.expose(),
        Duration::from_secs(config.general.timeout_secs),
    );
    let engine = QueryEngine::new(&client);

    match subcmd {
        VaultCommands::Find { query } => {
            let items = engine.find(&query)?;

            let rows = items
                .iter()
                .map(|i| vec![i.id.clone(), i.name.clone()])
                .collect();
            ui::print_table(&["id", "name"], rows);

            ui::info(&format!("{} items", items.len()));
        }
        VaultCommands::Field { id, name } => {
            let item = client.get_item(&id)?;

            match engine.logical_value(&item, &name)? {
                Some(value) => println!("{}", value),
                None => ui::info(&format!("Item '{}' has no field '{}'", item.name, name)),
            }
        }
    }

    Ok(())
}

fn cmd_repos(config_path: PathBuf, owner: String, platform: String) -> Result<()> {
    let config = cfg::load_or_default(&config_path)?;
    let platform = Platform::from_str(&platform)?;

    let resolver = CredentialResolver::new(&config, false);
    let token = match resolver.host_token(platform) {
        Ok(cred) => Some(cred),
        Err(_) => {
            ui::warn(&format!(
                "No {} token configured (set {}); listing public repositories only",
                platform,
                platform.token_env_vars().join(" or ")
            ));
            None
        }
    };

    ui::info(&format!("Listing {} repositories for {}", platform, owner));
    let enumerator = hosting::enumerator_for(platform, &config, token.as_ref())?;
    let repos = enumerator.list_user_repos(&owner)?;

    let rows = repos
        .iter()
        .map(|r| vec![r.full_name.clone(), r.clone_url.clone()])
        .collect();
    ui::print_table(&["repository", "clone url"], rows);

    ui::info(&format!("{} repositories", repos.len()));
    Ok(())
}

fn cmd_mirror(
    config_path: PathBuf,
    owner: String,
    from: String,
    to: String,
    dest_owner: Option<String>,
    jobs: Option<usize>,
    limit: Option<usize>,
    yes: bool,
) -> Result<()> {
    let config = cfg::load_or_default(&config_path)?;
    let from = Platform::from_str(&from)?;
    let to = Platform::from_str(&to)?;

    if from == to {
        anyhow::bail!("Source and destination platform are the same");
    }

    let resolver = CredentialResolver::new(&config, false);

    // Nothing downstream works without a destination credential
    let dest_token = resolver.host_token(to)?;

    let source_token = match resolver.host_token(from) {
        Ok(cred) => Some(cred),
        Err(_) => {
            ui::warn(&format!(
                "No {} token configured; mirroring public repositories only",
                from
            ));
            None
        }
    };

    ui::info(&format!("Enumerating {} repositories for {}", from, owner));
    let enumerator = hosting::enumerator_for(from, &config, source_token.as_ref())?;
    let mut repos = enumerator.list_user_repos(&owner)?;

    if let Some(limit) = limit {
        repos.truncate(limit);
    }

    if repos.is_empty() {
        ui::info("Nothing to mirror");
        return Ok(());
    }

    let dest_owner = dest_owner
        .or_else(|| config.mirror.dest_owner.clone())
        .unwrap_or_else(|| owner.clone());

    let jobs_n = jobs.unwrap_or(config.mirror.jobs).max(1);

    ui::info(&format!(
        "Mirroring {} repositories to {}/{} ({} worker{})",
        repos.len(),
        to,
        dest_owner,
        jobs_n,
        if jobs_n == 1 { "" } else { "s" }
    ));

    if !yes
        && !ui::prompt_confirm(
            &format!("Mirror {} repositories to {}?", repos.len(), to),
            true,
        )
    {
        anyhow::bail!("Mirror cancelled");
    }

    vcs::check_git()?;

    let mirror_jobs: Vec<MirrorJob> = repos
        .into_iter()
        .map(|r| MirrorJob::new(r, to, &dest_owner))
        .collect();

    let transport = SystemGit {
        timeout: Duration::from_secs(config.general.timeout_secs),
    };
    let engine = SyncEngine::new(&transport, source_token.as_ref(), &dest_token);

    let pb = ui::progress_bar(mirror_jobs.len() as u64, "Mirroring repositories");
    let report = engine.run_batch(mirror_jobs, jobs_n, Some(&pb));
    pb.finish_and_clear();

    report.print_summary();

    let failed = report.failed();
    if failed > 0 {
        return Err(SyncError::PartialBatchFailure {
            failed,
            total: report.jobs.len(),
        }
        .into());
    }

    ui::success(&format!("Mirrored {} repositories", report.succeeded()));
    Ok(())
}

fn cmd_land(
    config_path: PathBuf,
    file: PathBuf,
    dest: String,
    message: Option<String>,
    force: bool,
) -> Result<()> {
    let config = cfg::load_or_default(&config_path)?;
    let scanner = Scanner::from_config(&config)?;

    vcs::check_git()?;

    let committed = vcs::commit_file(
        &scanner,
        &file,
        &dest,
        message,
        force,
        Duration::from_secs(config.general.timeout_secs),
    )?;

    ui::success(&format!("Committed {}", committed.display()));
    Ok(())
}

fn cmd_scan(config_path: PathBuf, file: PathBuf) -> Result<()> {
    let config = cfg::load_or_default(&config_path)?;
    let scanner = Scanner::from_config(&config)?;

    let verdict = scanner.scan_file(&file)?;
    match verdict.reason() {
        None => {
            ui::success(&format!("{}: clean", file.display()));
            Ok(())
        }
        Some(reason) => Err(SyncError::SecretDetected { path: file, reason }.into()),
    }
}

fn cmd_doctor(config_path: PathBuf) -> Result<()> {
    ui::info("Running diagnostics...");

    let config = cfg::load_or_default(&config_path)?;
    let resolver = CredentialResolver::new(&config, false);

    let checks = vec![
        ("Git installed", vcs::check_git()),
        ("Vault CLI installed", check_vault_cli(&config)),
        ("Config file exists", cfg::check_exists(&config_path)),
        (
            "Vault session configured",
            resolver.vault_session().map(|_| ()),
        ),
        (
            "GitHub token configured",
            resolver.host_token(Platform::GitHub).map(|_| ()),
        ),
        (
            "GitLab token configured",
            resolver.host_token(Platform::GitLab).map(|_| ()),
        ),
    ];

    let mut has_issues = false;
    for (check, result) in checks {
        match result {
            Ok(_) => ui::success(&format!("✓ {}", check)),
            Err(e) => {
                has_issues = true;
                ui::error(&format!("✗ {}: {:#}", check, e));
            }
        }
    }

    if !has_issues {
        ui::success("All checks passed!");
    } else {
        ui::hint("Tokens come from the environment: BW_SESSION, GITHUB_TOKEN/GH_TOKEN, GITLAB_TOKEN/GL_TOKEN");
    }

    Ok(())
}

fn check_vault_cli(config: &cfg::Config) -> Result<()> {
    which::which(&config.vault.cli)
        .with_context(|| format!("{} not found in PATH", config.vault.cli))?;
    Ok(())
}

fn cmd_config(config_path: PathBuf, edit: bool, show: bool) -> Result<()> {
    if edit {
        cfg::edit(&config_path)?;
        ui::success("Configuration edited");
    } else if show {
        let config = cfg::load_or_default(&config_path)?;
        println!("{}", toml::to_string_pretty(&config)?);
    } else {
        ui::hint("Use --edit to modify or --show to view the configuration");
    }

    Ok(())
}
