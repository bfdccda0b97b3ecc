//! Endpoint listing command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct EndpointsResponse {
    endpoints: Vec<EndpointInfo>,
}

#[derive(Deserialize)]
struct EndpointInfo {
    address: String,
    transport: String,
    locality: String,
    phase: String,
    status: Option<String>,
    detail: Option<String>,
    alerting: bool,
    attempts: u32,
    down_for_secs: Option<u64>,
    last_seen_secs: u64,
    last_success_secs: u64,
    next_connect_in_secs: Option<u64>,
}

pub async fn cmd_endpoints(port: u16, down_only: bool) -> Result<()> {
    let url = format!("{}/endpoints?down={}", base_url(port), down_only);
    let resp: EndpointsResponse = get_json(&url).await?;

    if resp.endpoints.is_empty() {
        if down_only {
            println!("All endpoints are online.");
        } else {
            println!("No endpoints monitored yet.");
        }
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    if down_only {
        println!("  Down Endpoints ({})", resp.endpoints.len());
    } else {
        println!("  Endpoints ({})", resp.endpoints.len());
    }
    println!("═══════════════════════════════════════");

    for e in &resp.endpoints {
        let marker = if e.alerting { "!" } else { " " };
        println!("{} ┌─ {} ({})", marker, e.address, e.transport);
        println!("  │  locality     : {}", if e.locality.is_empty() { "-" } else { &e.locality });
        println!("  │  phase        : {}", e.phase);
        println!("  │  status       : {}", e.status.as_deref().unwrap_or("-"));
        if let Some(detail) = &e.detail {
            println!("  │  detail       : {}", detail);
        }
        println!("  │  attempts     : {}", e.attempts);
        if let Some(down) = e.down_for_secs {
            println!("  │  down for     : {}", format_secs(down));
        }
        if let Some(next) = e.next_connect_in_secs {
            println!("  │  next connect : in {}", format_secs(next));
        }
        println!("  │  last seen    : {} ago", format_secs(e.last_seen_secs));
        println!("  └─ last success : {} ago", format_secs(e.last_success_secs));
    }

    Ok(())
}

/// `3725` → `1h 2m 5s`.
pub fn format_secs(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{}s", s),
        (0, _) => format!("{}m {}s", m, s),
        _ => format!("{}h {}m {}s", h, m, s),
    }
}
