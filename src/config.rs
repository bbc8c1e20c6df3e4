//! Runtime configuration, read from the environment.
//!
//! Deliberately small: there is no config file and no CLI surface (out
//! of scope), just a handful of env vars with sane defaults, in the
//! style of `xtask`'s own environment-driven config.

use std::path::PathBuf;

/// Default shared-memory region size: generous enough for a long
/// session without requiring an operator to size it up front.
pub const DEFAULT_REGION_SIZE: u64 = 64 * 1024 * 1024;

const DEFAULT_REGION_PATH: &str = "/tmp/ctxtrace.log";

/// `CTXTRACE_REGION_PATH`: where the shared log is created. Must not
/// already exist.
const REGION_PATH_VAR: &str = "CTXTRACE_REGION_PATH";

/// `CTXTRACE_REGION_SIZE`: total size in bytes of the shared log region.
const REGION_SIZE_VAR: &str = "CTXTRACE_REGION_SIZE";

/// `CTXTRACE_PROC_ROOT`: root of the `/proc`-shaped tree to resolve
/// identities against. Exists so tests (and, in principle, containers
/// with `/proc` bind-mounted elsewhere) can override it.
const PROC_ROOT_VAR: &str = "CTXTRACE_PROC_ROOT";

#[derive(Debug, Clone)]
pub struct Config {
    pub region_path: PathBuf,
    pub region_size: u64,
    pub proc_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region_path: PathBuf::from(DEFAULT_REGION_PATH),
            region_size: DEFAULT_REGION_SIZE,
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl Config {
    /// Builds a config from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(REGION_PATH_VAR) {
            config.region_path = PathBuf::from(path);
        }
        if let Ok(size) = std::env::var(REGION_SIZE_VAR) {
            match size.parse() {
                Ok(n) => config.region_size = n,
                Err(_) => log::warn!(
                    "ignoring unparseable {REGION_SIZE_VAR}={size:?}, using default {}",
                    config.region_size
                ),
            }
        }
        if let Ok(root) = std::env::var(PROC_ROOT_VAR) {
            config.proc_root = PathBuf::from(root);
        }

        config
    }
}
