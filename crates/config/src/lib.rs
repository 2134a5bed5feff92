//! Shared directory and settings-file helpers for Meridian
//!
//! Settings live as JSON files under the platform config directory
//! (`~/.config/meridian/` on Linux); per-account cache databases live under
//! the platform data directory (`~/.local/share/meridian/`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

const APP_DIR: &str = "meridian";

/// Platform config directory for Meridian settings files
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_DIR))
}

/// Platform data directory holding the per-account cache databases
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|base| base.join(APP_DIR))
}

/// Load a JSON settings file from the config directory
///
/// A missing file is `Ok(None)`, so callers fall back to their defaults;
/// a file that exists but fails to read or parse is an error.
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<Option<T>> {
    let Some(path) = config_dir().map(|dir| dir.join(filename)) else {
        return Ok(None);
    };

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Create the data directory if missing and return its path
pub fn ensure_data_dir() -> Result<PathBuf> {
    let dir = data_dir().context("Could not determine data directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}
