//! Status command - operator availability as the server sees it

use anyhow::Result;
use colored::Colorize;
use rvoip_dialer_core::{CredentialProvider, HttpCredentialProvider, OperatorStatus};
use std::time::Duration;
use tracing::info;

use super::Output;

pub async fn execute(provider: &HttpCredentialProvider, name: &str, refresh: u64, out: &Output) -> Result<()> {
    if refresh > 0 {
        info!(operator = %name, refresh, "polling operator status (Ctrl+C to stop)");
    }

    loop {
        let status = provider.get_call_status(name).await?;
        if out.is_json() {
            out.print_json(&status)?;
        } else {
            print_status(&status);
        }

        if refresh == 0 {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(refresh)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("status polling stopped");
                break;
            }
        }
    }
    Ok(())
}

fn availability(status: &OperatorStatus) -> colored::ColoredString {
    if status.is_busy {
        "busy".yellow()
    } else if status.is_available {
        "available".green()
    } else {
        "unavailable".red()
    }
}

fn print_status(status: &OperatorStatus) {
    println!("{} {}", status.client_name.bold(), availability(status));
    println!("  Status: {}", status.status);
    if let Some(number) = &status.number {
        println!("  Number: {}", number);
    }
    if let Some(sid) = &status.current_call_sid {
        println!("  Call:   {}", sid);
    }
}
