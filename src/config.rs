//! Configuration file loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tailcast_common::config::Config;

/// Searched in order when no `--config` is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 4] = [
    "./tailcast.toml",
    "./config.toml",
    "~/.config/tailcast/config.toml",
    "/etc/tailcast/config.toml",
];

/// Load and parse a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    Ok(config)
}

/// Load config from `custom_path`, the first existing default location, or
/// fall back to built-in defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {}", path.display());
            return load_config(path);
        }
    }

    Ok(Config::default())
}

fn expand_paths(config: &mut Config) {
    if let Some(dir) = config.recording.directory.take() {
        let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
        config.recording.directory = Some(PathBuf::from(expanded));
    }
}
