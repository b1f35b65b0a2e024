//! Air-supply adapters
//!
//! The pump controller is either a text-command device on its own serial line
//! (`manual`, `on`, `off`, newline terminated) or a board on the frame bus that
//! takes an 8-byte frame whose first byte is 1 (on) or 0 (off).

use super::{AirSupply, BusAddress, FrameSink};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Device nodes tried when the configured port cannot be opened
pub const FALLBACK_PORTS: [&str; 2] = ["/dev/ttyUSB1", "/dev/ttyUSB2"];

const BUS_FRAME_LEN: usize = 8;

/// Pump controller on a serial line
///
/// The line settings (9600 8N1) are applied outside the process, e.g. by the
/// udev rule that creates the device node; this adapter only writes commands.
pub struct SerialAirSupply {
    port: Mutex<File>,
    path: PathBuf,
}

impl SerialAirSupply {
    /// Open the configured port, falling back to [`FALLBACK_PORTS`]
    ///
    /// On success the controller is put into manual mode with the air off.
    pub async fn open(port_name: &str) -> Result<Self> {
        let mut last_error = match Self::open_port(port_name).await {
            Ok(file) => return Self::init(file, PathBuf::from(port_name)).await,
            Err(e) => e,
        };

        for candidate in FALLBACK_PORTS.iter().filter(|p| **p != port_name) {
            match Self::open_port(candidate).await {
                Ok(file) => {
                    warn!(
                        "Air supply port {} unavailable, using {} instead",
                        port_name, candidate
                    );
                    return Self::init(file, PathBuf::from(candidate)).await;
                }
                Err(e) => last_error = e,
            }
        }

        Err(Error::Transport(format!(
            "Cannot open air supply port {} or fallbacks: {}",
            port_name, last_error
        )))
    }

    /// Wrap an already-open device or pipe
    pub async fn from_file(file: File, path: PathBuf) -> Result<Self> {
        Self::init(file, path).await
    }

    async fn open_port(path: &str) -> std::io::Result<File> {
        OpenOptions::new().write(true).open(path).await
    }

    async fn init(file: File, path: PathBuf) -> Result<Self> {
        let supply = Self {
            port: Mutex::new(file),
            path,
        };
        supply.send_command("manual").await?;
        supply.send_command("off").await?;
        info!("Air supply controller ready on {}", supply.path.display());
        Ok(supply)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn send_command(&self, command: &str) -> Result<()> {
        let mut line = command.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        let mut port = self.port.lock().await;
        port.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Transport(format!("Air supply write to {} failed: {}", self.path.display(), e)))?;
        port.flush()
            .await
            .map_err(|e| Error::Transport(format!("Air supply flush failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl AirSupply for SerialAirSupply {
    async fn set(&self, on: bool) -> Result<()> {
        self.send_command(if on { "on" } else { "off" }).await
    }
}

/// Pump board reached through the frame sink
pub struct BusAirSupply {
    sink: Arc<dyn FrameSink>,
    address: BusAddress,
}

impl BusAirSupply {
    pub fn new(sink: Arc<dyn FrameSink>, address: BusAddress) -> Self {
        Self { sink, address }
    }

    /// Pump frame: byte 0 carries the state, the rest is zero
    pub fn frame(on: bool) -> [u8; BUS_FRAME_LEN] {
        let mut data = [0u8; BUS_FRAME_LEN];
        data[0] = u8::from(on);
        data
    }
}

#[async_trait]
impl AirSupply for BusAirSupply {
    async fn set(&self, on: bool) -> Result<()> {
        self.sink.send_frame(&self.address, &Self::frame(on)).await
    }
}

/// Logs air commands instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunAirSupply;

#[async_trait]
impl AirSupply for DryRunAirSupply {
    async fn set(&self, on: bool) -> Result<()> {
        debug!("[dry run] air {}", if on { "on" } else { "off" });
        Ok(())
    }
}
