//! [`BridgeConfig`] – endpoint addresses, image geometry and timing for one
//! session.  All values are fixed for the session lifetime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BridgeError, FIELD_BYTES, RAW_CHANNELS, TelemetryLayout};

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_BYTES: usize = 65_507;

/// Upper bound on a raw camera frame (256 MiB).
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Session configuration shared by every channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Address the telemetry and image endpoints bind to, and the host that
    /// receives motor commands.
    #[serde(default = "default_host")]
    pub host: String,

    /// UDP port on `host` that motor commands are sent to.
    #[serde(default = "default_motor_port")]
    pub motor_port: u16,

    /// UDP port telemetry datagrams arrive on.
    #[serde(default = "default_telemetry_port")]
    pub telemetry_port: u16,

    /// TCP port the camera stream connects to.
    #[serde(default = "default_image_port")]
    pub image_port: u16,

    #[serde(default = "default_image_rows")]
    pub image_rows: usize,

    #[serde(default = "default_image_cols")]
    pub image_cols: usize,

    /// Length of the demand vector trailing each telemetry packet.
    #[serde(default = "default_demand_count")]
    pub demand_count: usize,

    /// Read timeout armed after the first telemetry packet.
    #[serde(default = "default_telemetry_timeout_ms")]
    pub telemetry_timeout_ms: u64,

    /// Read timeout armed once the image client connects.
    #[serde(default = "default_image_timeout_ms")]
    pub image_timeout_ms: u64,

    /// Delay after each telemetry iteration.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_motor_port() -> u16 {
    5000
}
fn default_telemetry_port() -> u16 {
    5001
}
fn default_image_port() -> u16 {
    5002
}
fn default_image_rows() -> usize {
    480
}
fn default_image_cols() -> usize {
    640
}
fn default_demand_count() -> usize {
    crate::DEFAULT_DEMAND_COUNT
}
fn default_telemetry_timeout_ms() -> u64 {
    100
}
fn default_image_timeout_ms() -> u64 {
    1000
}
fn default_pacing_ms() -> u64 {
    1
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            motor_port: default_motor_port(),
            telemetry_port: default_telemetry_port(),
            image_port: default_image_port(),
            image_rows: default_image_rows(),
            image_cols: default_image_cols(),
            demand_count: default_demand_count(),
            telemetry_timeout_ms: default_telemetry_timeout_ms(),
            image_timeout_ms: default_image_timeout_ms(),
            pacing_ms: default_pacing_ms(),
        }
    }
}

impl BridgeConfig {
    /// Check the configuration for values the protocol cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.host.trim().is_empty() {
            return Err(BridgeError::Config("host must not be empty".to_string()));
        }
        if self.image_rows == 0 || self.image_cols == 0 {
            return Err(BridgeError::Config(format!(
                "image dimensions must be non-zero, got {}x{}",
                self.image_rows, self.image_cols
            )));
        }
        match self.checked_frame_bytes() {
            Some(n) if n <= MAX_FRAME_BYTES => {}
            _ => {
                return Err(BridgeError::Config(format!(
                    "a {}x{} frame exceeds the {} byte limit",
                    self.image_rows, self.image_cols, MAX_FRAME_BYTES
                )));
            }
        }
        let packet = self
            .demand_count
            .checked_add(crate::HEADER_FIELDS)
            .and_then(|fields| fields.checked_mul(FIELD_BYTES));
        if !matches!(packet, Some(n) if n <= MAX_DATAGRAM_BYTES) {
            return Err(BridgeError::Config(format!(
                "demand_count {} does not fit in a single datagram",
                self.demand_count
            )));
        }
        if self.telemetry_timeout_ms == 0 || self.image_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "read timeouts must be greater than zero".to_string(),
            ));
        }
        if self.motor_port == 0 {
            return Err(BridgeError::Config(
                "motor_port must name a concrete destination port".to_string(),
            ));
        }
        if self.telemetry_port == self.motor_port {
            return Err(BridgeError::Config(format!(
                "telemetry_port and motor_port must differ (both {})",
                self.motor_port
            )));
        }
        Ok(())
    }

    pub fn telemetry_layout(&self) -> TelemetryLayout {
        TelemetryLayout::new(self.demand_count)
    }

    /// Size of one raw RGBA frame on the wire.
    ///
    /// Only meaningful after [`validate`][Self::validate] has succeeded.
    pub fn frame_bytes(&self) -> usize {
        self.image_rows * self.image_cols * RAW_CHANNELS
    }

    fn checked_frame_bytes(&self) -> Option<usize> {
        self.image_rows
            .checked_mul(self.image_cols)?
            .checked_mul(RAW_CHANNELS)
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_timeout_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}
