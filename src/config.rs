//! Launcher and runtime environment variables.
//!
//! The configuration is read once, when an [`Environment`](crate::Environment)
//! is built, and never changes afterwards. Every value is optional; unset or
//! unparsable variables fall back to their defaults.
//!
//! # Environment Variables
//!
//! | Field | Variables (first set wins) | Description |
//! |-------|----------------------------|-------------|
//! | `device_direct` | `FERRODIST_DEVICE_DIRECT`, `OMPI_MCA_opal_cuda_support` | Transport can read device memory directly |
//! | `launcher_rank` | `FERRODIST_RANK`, `OMPI_COMM_WORLD_RANK`, `PMI_RANK`, `SLURM_PROCID` | Rank assigned by the job launcher |
//! | `launcher_size` | `FERRODIST_SIZE`, `OMPI_COMM_WORLD_SIZE`, `PMI_SIZE`, `SLURM_NTASKS` | Job size assigned by the launcher |

use std::env;
use std::sync::OnceLock;

use crate::Environment;

const DEVICE_DIRECT_VARS: &[&str] = &["FERRODIST_DEVICE_DIRECT", "OMPI_MCA_opal_cuda_support"];
const RANK_VARS: &[&str] = &["FERRODIST_RANK", "OMPI_COMM_WORLD_RANK", "PMI_RANK", "SLURM_PROCID"];
const SIZE_VARS: &[&str] = &["FERRODIST_SIZE", "OMPI_COMM_WORLD_SIZE", "PMI_SIZE", "SLURM_NTASKS"];

/// Process-wide runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Whether the transport accepts device-resident buffers without host staging.
    pub device_direct: bool,
    /// Rank reported by the job launcher, if any.
    pub launcher_rank: Option<i32>,
    /// Number of ranks reported by the job launcher, if any.
    pub launcher_size: Option<i32>,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |names: &[&str]| names.iter().find_map(|name| lookup(name));
        Config {
            device_direct: first(DEVICE_DIRECT_VARS)
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            launcher_rank: first(RANK_VARS).and_then(|v| v.trim().parse().ok()),
            launcher_size: first(SIZE_VARS).and_then(|v| v.trim().parse().ok()),
        }
    }

    /// Whether a launcher assigned this process its rank.
    pub fn is_launched(&self) -> bool {
        self.launcher_rank.is_some()
    }
}

/// Parse a boolean flag: `1/true/yes/on` or `0/false/no/off`, case-insensitive.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whether the transport can read device memory directly.
///
/// Answers from the installed [`Environment`]'s configuration. Before one is
/// installed, the flag is read from the process environment on first use and
/// cached.
pub fn device_direct() -> bool {
    static FROM_ENV: OnceLock<bool> = OnceLock::new();
    match Environment::global() {
        Ok(env) => env.device_direct(),
        Err(_) => *FROM_ENV.get_or_init(|| Config::from_env().device_direct),
    }
}
