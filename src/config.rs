//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::engine::{EngineConfig, DEFAULT_MAX_SEQUENCE_LENGTH, DEFAULT_SEQUENCE_DELAY};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Time allowed between combos of a sequence
    pub sequence_delay: Duration,

    /// Longest accepted combo sequence
    pub max_sequence_length: usize,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("APPTIVATOR_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").context("HOME is not set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("apptivator")
            }
        };

        let socket_path = lookup("APPTIVATOR_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let sequence_delay = parse_var::<u64, _>(&lookup, "APPTIVATOR_SEQUENCE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SEQUENCE_DELAY);

        let max_sequence_length =
            parse_var::<usize, _>(&lookup, "APPTIVATOR_MAX_SEQUENCE_LENGTH")?
                .unwrap_or(DEFAULT_MAX_SEQUENCE_LENGTH);
        if max_sequence_length == 0 {
            bail!("APPTIVATOR_MAX_SEQUENCE_LENGTH must be at least 1");
        }

        Ok(Self {
            socket_path,
            data_dir,
            sequence_delay,
            max_sequence_length,
        })
    }

    /// Engine tunables
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            sequence_delay: self.sequence_delay,
            max_sequence_length: self.max_sequence_length,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}
