//! Config command

use anyhow::Result;
use colored::Colorize;
use rvoip_dialer_core::DialerConfig;
use std::path::Path;

use super::Output;
use crate::settings;

pub fn show(config: &DialerConfig, out: &Output) -> Result<()> {
    if out.is_json() {
        return out.print_json(config);
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// Write a default config file to `path`
pub fn init(path: &Path, force: bool) -> Result<()> {
    settings::write(path, &DialerConfig::default(), force)?;
    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}
