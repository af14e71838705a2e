//! Vaultsync - vault-backed secrets materialization and repository mirroring.
//!
//! This library provides the core functionality for vaultsync, including:
//! - Credential resolution (vault sessions, host tokens)
//! - Vault item queries and env file materialization
//! - Repository enumeration across hosting platforms
//! - Full-mirror repository synchronization
//! - Secret scanning and gated commits

pub mod cfg;
pub mod creds;
pub mod envfile;
pub mod errors;
pub mod hosting;
pub mod mirror;
pub mod scan;
pub mod ui;
pub mod vault;
pub mod vcs;
