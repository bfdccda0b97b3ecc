use std::time::{Duration, Instant};

use anyhow::Result;
use beacon_core::StatusCode;
use beacon_services::SessionEvent;

use crate::*;

/// Serve the API for `h` on an ephemeral port and return its base URL.
async fn serve(h: &Harness) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let app = beacon_api::router(beacon_api::ApiState::new(h.ctx.registry.clone()));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://127.0.0.1:{}/api", port))
}

async fn get(url: &str) -> Result<serde_json::Value> {
    Ok(reqwest::get(url).await?.error_for_status()?.json().await?)
}

/// One endpoint online, one failing: the API reflects both.
#[tokio::test]
async fn test_api_reports_registry() -> Result<()> {
    let h = Harness::new(30);
    let up = record("10.4.0.1", 27017);
    let down = record("10.4.0.2", 27017);
    let t0 = Instant::now();
    h.reconciler().reconcile(&[up.clone(), down.clone()], t0);

    let t1 = t0 + Duration::from_secs(2);
    h.tick_all(t1);
    h.sessions.emit(&up, SessionEvent::Connected(StatusCode::Ok));
    h.sessions.emit(&down, SessionEvent::Disconnected(StatusCode::Refused));
    h.tick_all(t1);
    h.sessions.emit(&up, SessionEvent::Authenticated(StatusCode::Ok));
    h.tick_all(t1);

    let base = serve(&h).await?;

    let status = get(&format!("{}/status", base)).await?;
    assert_eq!(status["monitors"]["total"], 2);
    assert_eq!(status["monitors"]["online"], 1);
    assert_eq!(status["monitors"]["retrying"], 1);

    let all = get(&format!("{}/endpoints", base)).await?;
    assert_eq!(all["endpoints"].as_array().unwrap().len(), 2);

    let failing = get(&format!("{}/endpoints?down=true", base)).await?;
    let failing = failing["endpoints"].as_array().unwrap();
    assert_eq!(failing.len(), 1);
    assert_eq!(failing[0]["address"], "10.4.0.2:27017");
    assert_eq!(failing[0]["phase"], "retrying");
    assert_eq!(failing[0]["status"], "reconnecting");
    assert!(failing[0]["detail"]
        .as_str()
        .unwrap()
        .starts_with("refused, reconnecting in"));
    assert_eq!(failing[0]["transport"], "tcp");

    Ok(())
}
