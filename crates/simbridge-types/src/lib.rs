//! Shared data model for the simulator bridge.
//!
//! Every crate in the workspace speaks in these types: the telemetry packet
//! the simulator sends, the motor command the controller answers with, the
//! camera frame handed to the image sink, and the [`BridgeError`] taxonomy.

use std::fmt;
use std::ops::Index;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod config;

pub use config::BridgeConfig;

// ────────────────────────────────────────────────────────────────────────────
// Wire constants
// ────────────────────────────────────────────────────────────────────────────

/// Width of every numeric field on the wire (IEEE-754 binary64).
pub const FIELD_BYTES: usize = 8;

/// Number of kinematic state values in a telemetry packet.
pub const STATE_LEN: usize = 12;

/// Fields that precede the demand vector: `time` plus the 12 state values.
pub const HEADER_FIELDS: usize = 1 + STATE_LEN;

/// Number of motors in a [`MotorCommand`].
pub const MOTOR_COUNT: usize = 4;

/// Size of an encoded [`MotorCommand`] datagram.
pub const MOTOR_BYTES: usize = MOTOR_COUNT * FIELD_BYTES;

/// Demand vector length used by the stock simulator.
pub const DEFAULT_DEMAND_COUNT: usize = 4;

/// Bytes per pixel in the raw camera stream (RGBA).
pub const RAW_CHANNELS: usize = 4;

/// Bytes per pixel after the alpha channel is dropped.
pub const FRAME_CHANNELS: usize = 3;

// State vector indices (Bouabdallah 2004).
pub const STATE_X: usize = 0;
pub const STATE_DX: usize = 1;
pub const STATE_Y: usize = 2;
pub const STATE_DY: usize = 3;
pub const STATE_Z: usize = 4;
pub const STATE_DZ: usize = 5;
pub const STATE_PHI: usize = 6;
pub const STATE_DPHI: usize = 7;
pub const STATE_THETA: usize = 8;
pub const STATE_DTHETA: usize = 9;
pub const STATE_PSI: usize = 10;
pub const STATE_DPSI: usize = 11;

// ────────────────────────────────────────────────────────────────────────────
// Telemetry
// ────────────────────────────────────────────────────────────────────────────

/// The 12-value kinematic state of the vehicle.
///
/// Order: X, dX, Y, dY, Z, dZ, roll (φ), dφ, pitch (θ), dθ, yaw (ψ), dψ.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleState(pub [f64; STATE_LEN]);

impl VehicleState {
    pub fn x(&self) -> f64 {
        self.0[STATE_X]
    }
    pub fn dx(&self) -> f64 {
        self.0[STATE_DX]
    }
    pub fn y(&self) -> f64 {
        self.0[STATE_Y]
    }
    pub fn dy(&self) -> f64 {
        self.0[STATE_DY]
    }
    pub fn z(&self) -> f64 {
        self.0[STATE_Z]
    }
    pub fn dz(&self) -> f64 {
        self.0[STATE_DZ]
    }
    pub fn phi(&self) -> f64 {
        self.0[STATE_PHI]
    }
    pub fn dphi(&self) -> f64 {
        self.0[STATE_DPHI]
    }
    pub fn theta(&self) -> f64 {
        self.0[STATE_THETA]
    }
    pub fn dtheta(&self) -> f64 {
        self.0[STATE_DTHETA]
    }
    pub fn psi(&self) -> f64 {
        self.0[STATE_PSI]
    }
    pub fn dpsi(&self) -> f64 {
        self.0[STATE_DPSI]
    }

    /// Borrow the raw state array.
    pub fn as_array(&self) -> &[f64; STATE_LEN] {
        &self.0
    }
}

impl Index<usize> for VehicleState {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

/// One periodic state report from the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPacket {
    /// Simulation time in seconds.  Negative means the session has ended.
    pub time: f64,
    pub state: VehicleState,
    /// Externally supplied set-points, consumed only by the control policy.
    pub demand: Vec<f64>,
}

impl TelemetryPacket {
    /// `true` when this packet is the end-of-session sentinel (`time < 0`).
    pub fn is_sentinel(&self) -> bool {
        self.time < 0.0
    }
}

/// Agreed shape of a telemetry datagram: `[time, state(12), demand(k)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryLayout {
    demand_count: usize,
}

impl TelemetryLayout {
    pub fn new(demand_count: usize) -> Self {
        Self { demand_count }
    }

    pub fn demand_count(&self) -> usize {
        self.demand_count
    }

    /// Total number of f64 fields in one packet.
    pub fn field_count(&self) -> usize {
        HEADER_FIELDS + self.demand_count
    }

    /// Exact datagram size in bytes.
    pub fn packet_bytes(&self) -> usize {
        self.field_count() * FIELD_BYTES
    }
}

impl Default for TelemetryLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DEMAND_COUNT)
    }
}

/// Four motor values sent back to the simulator once per accepted packet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorCommand(pub [f64; MOTOR_COUNT]);

impl MotorCommand {
    /// Command every motor to the same `level`.
    pub fn uniform(level: f64) -> Self {
        Self([level; MOTOR_COUNT])
    }

    pub fn values(&self) -> &[f64; MOTOR_COUNT] {
        &self.0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Images
// ────────────────────────────────────────────────────────────────────────────

/// Byte order of the three colour channels delivered to an image sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Same order as the wire (alpha removed).
    #[default]
    Rgb,
    /// First and third channel swapped, as expected by BGR-native toolkits.
    Bgr,
}

/// A decoded 3-channel camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub rows: usize,
    pub cols: usize,
    /// Row-major pixel data, 3 bytes per pixel.
    pub data: Vec<u8>,
}

impl ImageFrame {
    /// Return the pixel at (`row`, `col`), or `None` when out of bounds.
    pub fn pixel(&self, row: usize, col: usize) -> Option<[u8; FRAME_CHANNELS]> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let at = (row * self.cols + col) * FRAME_CHANNELS;
        let px = self.data.get(at..at + FRAME_CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Session bookkeeping
// ────────────────────────────────────────────────────────────────────────────

/// Which of the two protocol channels an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Telemetry,
    Image,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Telemetry => write!(f, "telemetry"),
            ChannelKind::Image => write!(f, "image"),
        }
    }
}

/// Why a channel stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The simulator sent a packet with negative time.
    Sentinel,
    /// No data arrived within the armed read timeout.
    Timeout,
    /// The socket reported an error.
    TransportError(String),
    /// The image client closed its end of the connection.
    PeerClosed,
    /// The shared `done` flag was already set when the channel looked.
    Stopped,
}

/// Counters collected by the telemetry channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub packets_received: u64,
    pub commands_sent: u64,
    pub malformed_discarded: u64,
    pub send_failures: u64,
    pub termination: Option<Termination>,
}

/// Counters collected by the image channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageStats {
    pub frames_delivered: u64,
    pub bytes_received: u64,
    pub termination: Option<Termination>,
}

/// Summary of one simulator session, produced when the session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub telemetry: TelemetryStats,
    pub image: ImageStats,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type spanning wire-format problems, transport failures and setup.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Format Error: expected {expected} bytes, got {actual}")]
    Format { expected: usize, actual: usize },

    #[error("Transport Timeout on {channel} channel after {waited_ms} ms")]
    TransportTimeout { channel: ChannelKind, waited_ms: u64 },

    #[error("Transport Error on {channel} channel: {details}")]
    Transport { channel: ChannelKind, details: String },

    #[error("Endpoint Setup Failed for {endpoint}: {details}")]
    Setup { endpoint: String, details: String },

    #[error("Config Error: {0}")]
    Config(String),
}
