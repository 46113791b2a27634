//! Locating and loading staysearch.toml.

use runtime::Config;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "staysearch.toml";

/// Load configuration, then overlay the process environment.
///
/// An explicit path must exist. The default path is optional and falls
/// back to built-in defaults.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    load_with(explicit, |key| std::env::var(key).ok())
}

fn load_with(explicit: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let config = match explicit {
        Some(path) if !path.exists() => {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        Some(path) => Config::load(path)?,
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if path.exists() {
                Config::load(&path)?
            } else {
                Config::default()
            }
        }
    };
    Ok(config.apply_env(env))
}

/// Human-readable name of the configuration source, for `--verbose` output.
pub fn describe(explicit: Option<&Path>) -> String {
    match explicit {
        Some(path) => path.display().to_string(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => DEFAULT_CONFIG_FILE.to_string(),
        None => "built-in defaults".to_string(),
    }
}
