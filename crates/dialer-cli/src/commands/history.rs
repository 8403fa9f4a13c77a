//! History command - recent calls for an operator

use anyhow::Result;
use rvoip_dialer_core::call::format_duration;
use rvoip_dialer_core::phone::format_number;
use rvoip_dialer_core::{CallHistoryEntry, CredentialProvider, HttpCredentialProvider};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::info;

use super::Output;

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Call SID")]
    call_sid: String,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Started")]
    started: String,
}

impl From<&CallHistoryEntry> for HistoryRow {
    fn from(entry: &CallHistoryEntry) -> Self {
        Self {
            call_sid: entry.call_sid.clone(),
            direction: entry.direction.clone().unwrap_or_else(|| "-".to_string()),
            from: format_number(&entry.from),
            to: format_number(&entry.to),
            status: entry.status.clone(),
            duration: format_duration(entry.duration),
            started: entry
                .start_time
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub async fn execute(provider: &HttpCredentialProvider, name: &str, limit: usize, out: &Output) -> Result<()> {
    info!(operator = %name, limit, "fetching call history");
    let history = provider.get_call_history(name, limit).await?;

    if out.is_json() {
        return out.print_json(&history);
    }
    if history.is_empty() {
        println!("No calls for {}", name);
        return Ok(());
    }
    println!("{}", render(&history));
    Ok(())
}

fn render(history: &[CallHistoryEntry]) -> String {
    let rows: Vec<HistoryRow> = history.iter().map(HistoryRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
