//! Daemon status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    uptime_secs: u64,
    monitors: PhaseCounts,
    alerting: usize,
}

#[derive(Deserialize)]
struct PhaseCounts {
    total: usize,
    idle: usize,
    connecting: usize,
    authenticating: usize,
    online: usize,
    retrying: usize,
    removing: usize,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;
    let m = &resp.monitors;

    println!("═══════════════════════════════════════");
    println!("  Beacon Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Uptime           : {}", super::endpoints::format_secs(resp.uptime_secs));
    println!("  Endpoints        : {}", m.total);
    println!("  Online           : {}", m.online);
    println!("  Alerting         : {}", resp.alerting);
    println!();
    println!("  idle {} · connecting {} · authenticating {} · retrying {} · removing {}",
        m.idle, m.connecting, m.authenticating, m.retrying, m.removing);

    Ok(())
}
