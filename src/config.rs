//! Layered configuration: compiled-in defaults, overridden by an optional
//! TOML file (`folioblocks.toml`), overridden by environment variables
//! (`FOLIOBLOCKS_*`), overridden in turn by CLI flags. The file layer is
//! merged in by setting process environment variables for any field the
//! file sets and the environment doesn't already override; `clap`'s derive
//! API then resolves the env/CLI layers directly via `#[arg(env = ...)]`.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::CoreError;
use crate::models::NodeRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleArg {
    Master,
    Miner,
}

impl From<RoleArg> for NodeRole {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Master => NodeRole::Master,
            RoleArg::Miner => NodeRole::ArchivalMiner,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "folioblocks-node",
    about = "FolioBlocks blockchain backend node service",
    long_about = "Backend component of the FolioBlocks credential-verification blockchain system.",
    after_help = "Arguments are intended for debugging and development; production deployments should rely on the config file."
)]
pub struct Config {
    /// Role this node runs as.
    #[arg(long, env = "FOLIOBLOCKS_ROLE", value_enum)]
    pub role: RoleArg,

    /// Address to bind the HTTP server to.
    #[arg(long, env = "FOLIOBLOCKS_HOST", default_value = "127.0.0.1")]
    pub bind_address: String,

    /// Port to bind the HTTP server to.
    #[arg(long, env = "FOLIOBLOCKS_PORT", default_value_t = 5000)]
    pub bind_port: u16,

    /// Directory holding the sealed chain file and relational database.
    #[arg(long, env = "FOLIOBLOCKS_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Path to the `.env`-style key file (AUTH_KEY / SECRET_KEY / …).
    #[arg(long, env = "FOLIOBLOCKS_KEY_FILE", default_value = "./data/.env")]
    pub key_file: PathBuf,

    /// Number of leading zero hex digits a valid block hash must exhibit.
    #[arg(long, env = "FOLIOBLOCKS_DIFFICULTY", default_value_t = 4)]
    pub difficulty: usize,

    /// Maximum number of archival miners the Master admits at once.
    #[arg(long, env = "FOLIOBLOCKS_MASTER_NODE_LIMIT", default_value_t = 4)]
    pub master_node_limit: usize,

    /// Seconds between block-sealing scheduler ticks.
    #[arg(long, env = "FOLIOBLOCKS_BLOCK_TIMER_SECONDS", default_value_t = 7)]
    pub block_timer_seconds: u64,

    /// `tracing` env-filter directive, e.g. `info` or `folioblocks=debug`.
    #[arg(long, env = "FOLIOBLOCKS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Disable logging to a rotating file in `data_dir/logs`; log to stderr only.
    #[arg(long, env = "FOLIOBLOCKS_NO_LOG_FILE", default_value_t = false)]
    pub no_log_file: bool,

    /// Number of retry attempts for outbound peer calls before marking a
    /// miner unreachable.
    #[arg(long, env = "FOLIOBLOCKS_PEER_RETRY_BUDGET", default_value_t = 4)]
    pub peer_retry_budget: usize,
}

/// Optional `folioblocks.toml` overlay. Every field is optional so a file
/// may set only the values it cares about.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct FileConfig {
    role: Option<RoleArg>,
    bind_address: Option<String>,
    bind_port: Option<u16>,
    data_dir: Option<PathBuf>,
    key_file: Option<PathBuf>,
    difficulty: Option<usize>,
    master_node_limit: Option<usize>,
    block_timer_seconds: Option<u64>,
    log_level: Option<String>,
    no_log_file: Option<bool>,
    peer_retry_budget: Option<usize>,
}

/// Reads `path` if it exists and sets a `FOLIOBLOCKS_*` environment variable
/// for each field it defines, skipping any variable already set so the
/// environment always outranks the file. No-op if `path` doesn't exist.
pub fn apply_file_overlay(path: &Path) -> Result<(), CoreError> {
    if !path.is_file() {
        return Ok(());
    }

    let raw = std::fs::read_to_string(path)?;
    let file: FileConfig = toml::from_str(&raw)
        .map_err(|e| CoreError::Configuration(format!("invalid {}: {e}", path.display())))?;

    if let Some(role) = file.role {
        let value = match role {
            RoleArg::Master => "master",
            RoleArg::Miner => "miner",
        };
        set_if_absent("FOLIOBLOCKS_ROLE", value);
    }
    if let Some(v) = &file.bind_address {
        set_if_absent("FOLIOBLOCKS_HOST", v);
    }
    if let Some(v) = file.bind_port {
        set_if_absent("FOLIOBLOCKS_PORT", &v.to_string());
    }
    if let Some(v) = &file.data_dir {
        set_if_absent("FOLIOBLOCKS_DATA_DIR", &v.display().to_string());
    }
    if let Some(v) = &file.key_file {
        set_if_absent("FOLIOBLOCKS_KEY_FILE", &v.display().to_string());
    }
    if let Some(v) = file.difficulty {
        set_if_absent("FOLIOBLOCKS_DIFFICULTY", &v.to_string());
    }
    if let Some(v) = file.master_node_limit {
        set_if_absent("FOLIOBLOCKS_MASTER_NODE_LIMIT", &v.to_string());
    }
    if let Some(v) = file.block_timer_seconds {
        set_if_absent("FOLIOBLOCKS_BLOCK_TIMER_SECONDS", &v.to_string());
    }
    if let Some(v) = &file.log_level {
        set_if_absent("FOLIOBLOCKS_LOG_LEVEL", v);
    }
    if let Some(v) = file.no_log_file {
        set_if_absent("FOLIOBLOCKS_NO_LOG_FILE", &v.to_string());
    }
    if let Some(v) = file.peer_retry_budget {
        set_if_absent("FOLIOBLOCKS_PEER_RETRY_BUDGET", &v.to_string());
    }

    Ok(())
}

fn set_if_absent(key: &str, value: &str) {
    if std::env::var_os(key).is_none() {
        // SAFETY: called once during startup before any other code path
        // reads or writes the process environment.
        unsafe { std::env::set_var(key, value) };
    }
}

impl Config {
    pub fn chain_file_path(&self) -> PathBuf {
        self.data_dir.join("folioblocks-chain.json")
    }

    pub fn db_file_path(&self) -> PathBuf {
        self.data_dir.join("folioblocks-node.db")
    }

    pub fn node_role(&self) -> NodeRole {
        self.role.into()
    }
}
