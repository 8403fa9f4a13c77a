//! Subcommand implementations

pub mod config;
pub mod history;
pub mod login;
pub mod score;
pub mod status;
pub mod token;

use anyhow::Result;
use serde::Serialize;

/// Where command results go
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// First few characters of a token, enough to tell two apart
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if prefix.len() < token.len() {
        format!("{}…", prefix)
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact() {
        assert_eq!(redact("eyJhbGciOiJIUzI1NiJ9.payload"), "eyJhbGci…");
        assert_eq!(redact("short"), "short");
        assert_eq!(redact(""), "");
    }
}
