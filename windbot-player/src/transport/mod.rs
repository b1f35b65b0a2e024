//! Transport adapters
//!
//! The replay loop only sees two narrow interfaces: [`FrameSink`] for hand
//! frames and [`AirSupply`] for the pump. Which concrete adapters back them is
//! decided once, in [`Transports::from_config`], from the `dry_run` flag and
//! the configured air-supply transport.
//!
//! Delivery is best-effort: adapters use short timeouts and report failures as
//! [`Error::Transport`](crate::Error::Transport); the caller logs and moves on.

pub mod air_supply;
pub mod bus_bridge;

pub use air_supply::{BusAirSupply, DryRunAirSupply, SerialAirSupply};
pub use bus_bridge::{BusBridgeClient, DryRunSink};

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use windbot_common::config::{parse_device_id, AirTransport, HandsConfig, RigConfig};
use windbot_common::fingering::Hand;
use windbot_common::sequence::SequenceFrame;

/// Physical destination of a frame on the bus bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusAddress {
    pub interface: String,
    pub id: u32,
}

impl BusAddress {
    pub fn new(interface: impl Into<String>, id: u32) -> Self {
        Self {
            interface: interface.into(),
            id,
        }
    }
}

impl std::fmt::Display for BusAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/0x{:X}", self.interface, self.id)
    }
}

/// Destination for control frames
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, address: &BusAddress, data: &[u8]) -> Result<()>;
}

/// Binary on/off air-supply actuator
#[async_trait]
pub trait AirSupply: Send + Sync {
    async fn set(&self, on: bool) -> Result<()>;
}

/// Adapters bound for one process, plus the hand → interface routing
#[derive(Clone)]
pub struct Transports {
    pub frames: Arc<dyn FrameSink>,
    pub air: Arc<dyn AirSupply>,
    interfaces: [String; 2],
}

impl Transports {
    pub fn new(frames: Arc<dyn FrameSink>, air: Arc<dyn AirSupply>, hands: &HandsConfig) -> Self {
        Self {
            frames,
            air,
            interfaces: [
                hands.address(Hand::Left).interface.clone(),
                hands.address(Hand::Right).interface.clone(),
            ],
        }
    }

    /// Select adapters from configuration
    ///
    /// `dry_run` replaces everything with logging adapters; otherwise frames go
    /// to the bus bridge and the air supply uses the configured transport.
    pub async fn from_config(config: &RigConfig) -> Result<Self> {
        if config.dry_run {
            info!("Dry run: frames and air commands are logged, not sent");
            return Ok(Self::new(
                Arc::new(DryRunSink),
                Arc::new(DryRunAirSupply),
                &config.hands,
            ));
        }

        let bridge = Arc::new(BusBridgeClient::new(
            &config.bus_bridge_url,
            Duration::from_millis(config.playback.bridge_timeout_ms),
        )?);

        let air: Arc<dyn AirSupply> = match config.air_supply.transport {
            AirTransport::Serial => Arc::new(SerialAirSupply::open(&config.air_supply.port_name).await?),
            AirTransport::Bus => {
                let id = parse_device_id(&config.air_supply.bus_id).ok_or_else(|| {
                    Error::InvalidState(format!("Invalid air supply id '{}'", config.air_supply.bus_id))
                })?;
                Arc::new(BusAirSupply::new(
                    bridge.clone(),
                    BusAddress::new(config.air_supply.bus_interface.clone(), id),
                ))
            }
        };

        Ok(Self::new(bridge, air, &config.hands))
    }

    /// Resolve a sequence frame's logical hand and id to a bus address
    pub fn address(&self, frame: &SequenceFrame) -> Result<BusAddress> {
        let id = parse_device_id(&frame.id)
            .ok_or_else(|| Error::Transport(format!("Invalid device id '{}' in frame", frame.id)))?;
        let interface = match frame.hand {
            Hand::Left => &self.interfaces[0],
            Hand::Right => &self.interfaces[1],
        };
        Ok(BusAddress::new(interface.clone(), id))
    }
}
