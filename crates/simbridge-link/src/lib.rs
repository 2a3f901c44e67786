//! `simbridge-link` – the protocol engine.
//!
//! Moves bytes between the simulator and the two callbacks without caring
//! what the bytes mean.
//!
//! # Modules
//!
//! - [`codec`] – fixed-layout little-endian encoding of telemetry packets,
//!   motor commands and raw camera frames.
//! - [`session_state`] – [`SessionState`]: the single `done` flag shared by
//!   both channels.
//! - [`telemetry_channel`] – [`TelemetryChannel`]: UDP receive → policy →
//!   UDP respond loop, armed with a read timeout after the first packet.
//! - [`image_channel`] – [`ImageChannel`]: single-client TCP listener that
//!   reassembles fixed-size frames and feeds the image sink.

pub mod codec;
pub mod image_channel;
mod net;
pub mod session_state;
pub mod telemetry_channel;

pub use image_channel::{ImageChannel, LISTEN_BACKLOG};
pub use session_state::SessionState;
pub use telemetry_channel::TelemetryChannel;
