//! [`Session`] – one simulator connection lifecycle.
//!
//! A session binds every endpoint up front, then [`Session::start`] runs the
//! telemetry channel as a spawned Tokio task and the image channel on the
//! caller's task.  It returns once both channels have terminated.  There is
//! no retry: a new simulator run needs a new `Session`.
//!
//! # Example
//!
//! ```rust,no_run
//! use simbridge_policy::{HoverPolicy, NullSink};
//! use simbridge_runtime::Session;
//! use simbridge_types::BridgeConfig;
//!
//! # async fn demo() -> Result<(), simbridge_types::BridgeError> {
//! let session = Session::bind(BridgeConfig::default(), HoverPolicy::default(), NullSink).await?;
//! let handle = session.handle();
//! let report = session.start().await;
//! assert!(handle.is_done());
//! println!("{} motor commands sent", report.telemetry.commands_sent);
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use simbridge_link::{ImageChannel, SessionState, TelemetryChannel};
use simbridge_policy::{ControlPolicy, ImageSink};
use simbridge_types::{BridgeConfig, BridgeError, SessionReport, TelemetryStats, Termination};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// Addresses the session's listening endpoints ended up bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionAddrs {
    pub telemetry: SocketAddr,
    pub image: SocketAddr,
}

/// Cloneable lifecycle handle: query or request termination from anywhere,
/// including a signal handler thread.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    state: Arc<SessionState>,
}

impl SessionHandle {
    /// Non-blocking: `true` once either channel or [`stop`][Self::stop] has
    /// ended the session.
    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Request cooperative termination.  Returns `true` for the call that
    /// actually ended the session; repeated calls have no effect.
    pub fn stop(&self) -> bool {
        let first = self.state.finish();
        if first {
            info!("session stop requested");
        }
        first
    }
}

/// A bound, not yet started, bridge session.
pub struct Session<P, S> {
    id: Uuid,
    state: Arc<SessionState>,
    telemetry_grace: Duration,
    telemetry: TelemetryChannel<P>,
    image: ImageChannel<S>,
}

impl<P, S> Session<P, S>
where
    P: ControlPolicy + 'static,
    S: ImageSink,
{
    /// Validate `config` and bind the telemetry, motor and image endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] for an invalid configuration and
    /// [`BridgeError::Setup`] when an endpoint cannot be bound.
    pub async fn bind(config: BridgeConfig, policy: P, sink: S) -> Result<Self, BridgeError> {
        config.validate()?;

        let state = Arc::new(SessionState::new());
        let telemetry = TelemetryChannel::bind(&config, policy, Arc::clone(&state)).await?;
        let image = ImageChannel::bind(&config, sink, Arc::clone(&state)).await?;
        let id = Uuid::new_v4();
        let telemetry_grace = config.telemetry_timeout() + config.pacing();

        info!(
            session = %id,
            host = %config.host,
            telemetry_port = config.telemetry_port,
            motor_port = config.motor_port,
            image_port = config.image_port,
            rows = config.image_rows,
            cols = config.image_cols,
            "session bound; waiting for the simulator"
        );

        Ok(Self {
            id,
            state,
            telemetry_grace,
            telemetry,
            image,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn local_addrs(&self) -> Result<SessionAddrs, BridgeError> {
        Ok(SessionAddrs {
            telemetry: self.telemetry.local_addr()?,
            image: self.image.local_addr()?,
        })
    }

    /// Run the session to completion.
    ///
    /// Blocks the calling task on the image channel; the telemetry channel
    /// runs concurrently on its own task.  Once the image channel has ended,
    /// the telemetry task gets one read timeout plus pacing to finish before
    /// it is aborted, so a stop is honoured while the simulator still sends.
    /// Termination is not an error: the report records why each channel
    /// stopped.
    pub async fn start(self) -> SessionReport {
        let span = info_span!("session", id = %self.id);
        let Self {
            id,
            state: _,
            telemetry_grace,
            telemetry,
            image,
        } = self;

        async move {
            let started_at = Utc::now();

            let mut telemetry_task = tokio::spawn(telemetry.run().in_current_span());
            let image = image.run().await;

            // `done` is set by now.  A silent simulator ends the telemetry
            // channel within its read timeout; one that keeps streaming never
            // does, since the channel does not poll `done` while streaming.
            let joined = tokio::time::timeout(telemetry_grace, &mut telemetry_task).await;
            let telemetry = match joined {
                Ok(Ok(stats)) => stats,
                Ok(Err(e)) => {
                    warn!(error = %e, "telemetry task failed");
                    TelemetryStats {
                        termination: Some(Termination::TransportError(e.to_string())),
                        ..Default::default()
                    }
                }
                Err(_) => {
                    telemetry_task.abort();
                    // Wait for the cancelled task so its sockets are closed on return.
                    let _ = telemetry_task.await;
                    info!(
                        grace_ms = telemetry_grace.as_millis() as u64,
                        "telemetry still streaming after session end; channel aborted"
                    );
                    TelemetryStats {
                        termination: Some(Termination::Stopped),
                        ..Default::default()
                    }
                }
            };

            let report = SessionReport {
                id,
                started_at,
                ended_at: Utc::now(),
                telemetry,
                image,
            };
            info!(
                commands_sent = report.telemetry.commands_sent,
                frames_delivered = report.image.frames_delivered,
                "session finished"
            );
            report
        }
        .instrument(span)
        .await
    }
}
