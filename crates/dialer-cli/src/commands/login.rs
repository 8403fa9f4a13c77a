//! Login and logout

use anyhow::Result;
use colored::Colorize;
use rvoip_dialer_core::phone::format_number;
use rvoip_dialer_core::{CredentialProvider, HttpCredentialProvider, OperatorIdentity};
use serde_json::json;
use tracing::info;

use super::{redact, Output};

/// Log `name` in and fetch its first token
pub async fn execute(provider: &HttpCredentialProvider, name: &str, out: &Output) -> Result<()> {
    info!(operator = %name, server = provider.base_url(), "logging in");

    let record = provider.login(name).await?;
    let grant = provider.get_credential(name).await?;
    let identity = OperatorIdentity::from_login(&record, grant);

    if out.is_json() {
        return out.print_json(&json!({
            "operator": record,
            "identity": identity.identity,
            "phoneNumber": identity.phone_number,
            "token": redact(identity.token()),
            "issuedAt": identity.credential.issued_at,
        }));
    }

    println!("{} Logged in as {}", "✓".green(), identity.name.bold());
    println!(
        "  Number:   {}",
        identity.phone_number.as_deref().map(format_number).unwrap_or_else(|| "-".to_string())
    );
    println!("  Identity: {}", identity.identity.as_deref().unwrap_or("-"));
    if let Some(status) = &record.status {
        println!("  Status:   {}", status);
    }
    println!("  Token:    {}", redact(identity.token()));
    Ok(())
}

pub async fn logout(provider: &HttpCredentialProvider, name: &str, out: &Output) -> Result<()> {
    info!(operator = %name, server = provider.base_url(), "logging out");
    provider.logout(name).await?;

    if out.is_json() {
        return out.print_json(&json!({ "success": true, "clientName": name }));
    }
    println!("{} Logged out {}", "✓".green(), name.bold());
    Ok(())
}
