//! Config file location and loading

use anyhow::{bail, Context, Result};
use rvoip_dialer_core::DialerConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `<config dir>/rvoip/dialer.toml`, falling back to the working directory
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rvoip")
        .join("dialer.toml")
}

/// Load `path`, or defaults when the file does not exist
pub fn load(path: &Path) -> Result<DialerConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(DialerConfig::default());
    }
    let config = DialerConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    debug!(path = %path.display(), service_url = %config.service_url, "config loaded");
    Ok(config)
}

/// Write `config` to `path`, creating parent directories
pub fn write(path: &Path, config: &DialerConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, config.to_toml_string()?).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
