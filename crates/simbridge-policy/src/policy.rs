//! [`ControlPolicy`] – the motor-command callback.
//!
//! The telemetry channel calls [`ControlPolicy::compute_motors`] exactly once
//! per accepted telemetry packet and sends the result straight back to the
//! simulator, so implementations should return quickly.

use simbridge_types::{MotorCommand, VehicleState};

/// Level commanded to every motor by [`HoverPolicy::default`].
pub const DEFAULT_HOVER_LEVEL: f64 = 0.6;

/// Computes motor values from the latest telemetry sample.
///
/// Runs on the telemetry task, hence the `Send` bound.
pub trait ControlPolicy: Send {
    /// Compute the motor command for simulation time `time`.
    ///
    /// `demand` has the configured demand length (4 for the stock simulator).
    fn compute_motors(&mut self, time: f64, state: &VehicleState, demand: &[f64]) -> MotorCommand;
}

impl<F> ControlPolicy for F
where
    F: FnMut(f64, &VehicleState, &[f64]) -> MotorCommand + Send,
{
    fn compute_motors(&mut self, time: f64, state: &VehicleState, demand: &[f64]) -> MotorCommand {
        self(time, state, demand)
    }
}

/// Ignores its inputs and holds every motor at a constant level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoverPolicy {
    level: f64,
}

impl HoverPolicy {
    pub fn new(level: f64) -> Self {
        Self { level }
    }

    pub fn level(&self) -> f64 {
        self.level
    }
}

impl Default for HoverPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HOVER_LEVEL)
    }
}

impl ControlPolicy for HoverPolicy {
    fn compute_motors(&mut self, _time: f64, _state: &VehicleState, _demand: &[f64]) -> MotorCommand {
        MotorCommand::uniform(self.level)
    }
}
