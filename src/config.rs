//! Configuration: the tracked environment snapshot and launch settings.
//!
//! The environment is captured once at startup into an explicit snapshot
//! and injected into the sequencer, so a missing variable is a visible
//! `None` instead of an ad-hoc `env::var` failure mid-sequence.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variables the bootstrap tracks and echoes.
pub const TRACKED_VARS: [&str; 5] = [
    "PORT",
    "DB_SERVER",
    "DB_DATABASE",
    "DB_USERNAME",
    "DB_DRIVER",
];

/// Read-only snapshot of the tracked environment variables.
///
/// Order is fixed (the order of [`TRACKED_VARS`]) so banner output is
/// deterministic across runs.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: Vec<(String, Option<String>)>,
}

impl EnvSnapshot {
    /// Capture the tracked variables from the process environment.
    pub fn capture() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a snapshot from an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let vars = TRACKED_VARS
            .iter()
            .map(|&name| (name.to_string(), lookup(name)))
            .collect();
        Self { vars }
    }

    /// Value of a tracked variable, if set and non-empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
            .filter(|v| !v.is_empty())
    }

    /// Iterate (name, value) pairs; an unset variable yields "".
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.vars
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_deref().unwrap_or("")))
    }

    pub fn port(&self) -> Option<&str> {
        self.get("PORT")
    }
}

/// Settings for the server launch step.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchConfig {
    /// The server command, without the entry point (e.g. "streamlit run").
    #[serde(default = "default_command")]
    pub command: String,
    /// Application entry point appended after the command.
    #[serde(default = "default_entry")]
    pub entry: String,
    /// Extra arguments inserted before the port/address flags.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Flag that carries the port value.
    #[serde(default = "default_port_flag")]
    pub port_flag: String,
    /// Flag that carries the bind address.
    #[serde(default = "default_address_flag")]
    pub address_flag: String,
    /// Bind address passed to the server.
    #[serde(default = "default_address")]
    pub address: String,
    /// Port used when PORT is unset or empty.
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// Whether to echo the tracked environment variables before launch.
    #[serde(default)]
    pub verify_env: bool,
}

fn default_command() -> String {
    "streamlit run".to_string()
}
fn default_entry() -> String {
    "main.py".to_string()
}
fn default_port_flag() -> String {
    "--server.port".to_string()
}
fn default_address_flag() -> String {
    "--server.address".to_string()
}
fn default_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8501
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            entry: default_entry(),
            extra_args: Vec::new(),
            port_flag: default_port_flag(),
            address_flag: default_address_flag(),
            address: default_address(),
            default_port: default_port(),
            verify_env: false,
        }
    }
}

/// Top-level configuration file structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub launch: LaunchConfig,
}

impl Config {
    /// Load configuration from the default path (./bootstrap.toml) when
    /// present, falling back to built-in defaults.
    pub fn load() -> Result<Self> {
        let path = Path::new("bootstrap.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }
}
