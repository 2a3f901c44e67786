//! `simbridge-policy` – the two pluggable callbacks of a bridge session.
//!
//! The protocol engine in `simbridge-link` never knows what the controller
//! does with the data it receives.  It only talks to these traits:
//!
//! - [`policy`] – [`ControlPolicy`][policy::ControlPolicy]: turns one
//!   telemetry sample into four motor values.  [`HoverPolicy`][policy::HoverPolicy]
//!   is the stock implementation.
//! - [`sink`] – [`ImageSink`][sink::ImageSink]: receives every decoded camera
//!   frame.  [`NullSink`][sink::NullSink] and
//!   [`FrameLogSink`][sink::FrameLogSink] are provided.
//!
//! Both traits are also implemented for plain closures.

pub mod policy;
pub mod sink;

pub use policy::{ControlPolicy, DEFAULT_HOVER_LEVEL, HoverPolicy};
pub use sink::{FrameLogSink, ImageSink, NullSink};
