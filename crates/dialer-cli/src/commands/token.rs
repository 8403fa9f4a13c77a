//! Token command - fetch a fresh access token

use anyhow::Result;
use rvoip_dialer_core::{CredentialProvider, HttpCredentialProvider};
use serde_json::json;
use tracing::info;

use super::{redact, Output};

pub async fn execute(provider: &HttpCredentialProvider, name: &str, show: bool, out: &Output) -> Result<()> {
    info!(operator = %name, "requesting access token");
    let grant = provider.get_credential(name).await?;
    let token = if show { grant.token.clone() } else { redact(&grant.token) };

    if out.is_json() {
        return out.print_json(&json!({
            "token": token,
            "identity": grant.identity,
            "number": grant.number,
        }));
    }

    println!("{}", token);
    if let Some(identity) = &grant.identity {
        println!("  identity: {}", identity);
    }
    Ok(())
}
