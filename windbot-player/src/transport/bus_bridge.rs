//! HTTP bus bridge client
//!
//! The bridge accepts `POST <base>/api/can` with
//! `{"interface": "can0", "id": 40, "data": "<base64 payload>"}` and forwards
//! the payload onto the named bus interface.

use super::{BusAddress, FrameSink};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Keep-alive connections kept for the replay burst
const POOL_IDLE_PER_HOST: usize = 16;

#[derive(Debug, Serialize)]
struct BusMessage<'a> {
    interface: &'a str,
    id: u32,
    data: String,
}

/// Pooled HTTP client for the bus bridge
pub struct BusBridgeClient {
    client: Client,
    endpoint: String,
}

impl BusBridgeClient {
    /// Create a client with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(POOL_IDLE_PER_HOST)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = format!("{}/api/can", base_url.trim_end_matches('/'));
        info!("Bus bridge endpoint {} (timeout {:?})", endpoint, timeout);
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl FrameSink for BusBridgeClient {
    async fn send_frame(&self, address: &BusAddress, data: &[u8]) -> Result<()> {
        let message = BusMessage {
            interface: &address.interface,
            id: address.id,
            data: base64::engine::general_purpose::STANDARD.encode(data),
        };

        let response = self.client.post(&self.endpoint).json(&message).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "Bus bridge returned {} for {}",
                status, address
            )));
        }
        debug!(address = %address, "Frame delivered");
        Ok(())
    }
}

/// Logs frames instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSink;

#[async_trait]
impl FrameSink for DryRunSink {
    async fn send_frame(&self, address: &BusAddress, data: &[u8]) -> Result<()> {
        debug!("[dry run] frame {} {:?}", address, data);
        Ok(())
    }
}
