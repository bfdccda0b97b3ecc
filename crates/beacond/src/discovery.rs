//! HTTP discovery client.
//!
//! `GET <url>?locality=<id>` returning
//! `{"endpoints":[{"endpoint":"host:port","locality":"ams","type":"websockets"}]}`.
//! Entries whose address does not parse are skipped.

use async_trait::async_trait;
use serde::Deserialize;

use beacon_core::config::DiscoveryConfig;
use beacon_core::{EndpointRecord, Transport};
use beacon_services::{DiscoveryError, DiscoverySource};

#[derive(Deserialize)]
struct ListResponse {
    #[serde(alias = "serverlist")]
    endpoints: Vec<ListEntry>,
}

#[derive(Deserialize)]
struct ListEntry {
    endpoint: String,
    #[serde(default, alias = "dc")]
    locality: String,
    #[serde(default, rename = "type")]
    kind: String,
}

pub struct HttpDiscovery {
    client: reqwest::Client,
    url: String,
}

impl HttpDiscovery {
    pub fn new(config: &DiscoveryConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    fn locality_url(&self, locality: u32) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}locality={}", self.url, sep, locality)
    }
}

#[async_trait]
impl DiscoverySource for HttpDiscovery {
    async fn fetch(&self, locality: u32) -> Result<Vec<EndpointRecord>, DiscoveryError> {
        let resp = self
            .client
            .get(self.locality_url(locality))
            .send()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status(status.as_u16()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;
        parse_list(&body)
    }
}

/// Parse a discovery response body, skipping unusable entries.
pub fn parse_list(body: &str) -> Result<Vec<EndpointRecord>, DiscoveryError> {
    let list: ListResponse =
        serde_json::from_str(body).map_err(|e| DiscoveryError::Malformed(e.to_string()))?;

    let mut records = Vec::with_capacity(list.endpoints.len());
    for entry in list.endpoints {
        let transport = match entry.kind.as_str() {
            "websockets" | "websocket" | "ws" => Transport::WebSocket,
            _ => Transport::Tcp,
        };
        match EndpointRecord::parse(&entry.endpoint, &entry.locality, transport) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(endpoint = %entry.endpoint, error = %e, "skipping discovery entry"),
        }
    }
    Ok(records)
}
