//! [`TelemetryChannel`] – receive telemetry, compute, respond with motors.
//!
//! # State machine
//!
//! | Phase | Read | Leaves on |
//! |---|---|---|
//! | `AwaitingFirst` | no timeout | first datagram → `Streaming`; session stopped → terminated |
//! | `Streaming` | armed timeout (100 ms default) | sentinel, timeout or socket error → terminated |
//!
//! Termination is the return of [`TelemetryChannel::run`], which consumes the
//! channel and closes both sockets.
//!
//! Each accepted packet produces exactly one motor datagram, sent before the
//! next packet is read.  Malformed datagrams are logged and skipped.  Once
//! streaming, the read timeout is the channel's only cancellation mechanism:
//! it does not poll the shared `done` flag.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use simbridge_policy::ControlPolicy;
use simbridge_types::config::MAX_DATAGRAM_BYTES;
use simbridge_types::{
    BridgeConfig, BridgeError, ChannelKind, TelemetryLayout, TelemetryStats, Termination,
};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::codec::{decode_telemetry, encode_motors};
use crate::net::{resolve, setup_error};
use crate::session_state::SessionState;

/// Read mode of a running telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TelemetryPhase {
    AwaitingFirst,
    Streaming,
}

/// Owns the inbound telemetry socket and the outbound motor socket.
pub struct TelemetryChannel<P> {
    socket: UdpSocket,
    motor_socket: UdpSocket,
    motor_addr: SocketAddr,
    layout: TelemetryLayout,
    read_timeout: Duration,
    pacing: Duration,
    policy: P,
    session: Arc<SessionState>,
    phase: TelemetryPhase,
    stats: TelemetryStats,
}

impl<P: ControlPolicy> TelemetryChannel<P> {
    /// Bind the telemetry socket on `host:telemetry_port` and prepare the
    /// motor socket that sends to `host:motor_port`.
    ///
    /// The motor socket is bound to `host` with an ephemeral port so motor
    /// datagrams leave from the same interface telemetry arrives on.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Setup`] if either address cannot be resolved or
    /// a socket cannot be bound.
    pub async fn bind(
        config: &BridgeConfig,
        policy: P,
        session: Arc<SessionState>,
    ) -> Result<Self, BridgeError> {
        let listen_addr = resolve(&config.host, config.telemetry_port).await?;
        let motor_addr = resolve(&config.host, config.motor_port).await?;

        let socket = UdpSocket::bind(listen_addr)
            .await
            .map_err(|e| setup_error(&listen_addr.to_string(), e))?;

        let motor_local = SocketAddr::new(motor_addr.ip(), 0);
        let motor_socket = UdpSocket::bind(motor_local)
            .await
            .map_err(|e| setup_error(&motor_addr.to_string(), e))?;

        Ok(Self {
            socket,
            motor_socket,
            motor_addr,
            layout: config.telemetry_layout(),
            read_timeout: config.telemetry_timeout(),
            pacing: config.pacing(),
            policy,
            session,
            phase: TelemetryPhase::AwaitingFirst,
            stats: TelemetryStats::default(),
        })
    }

    /// Address the telemetry socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        self.socket
            .local_addr()
            .map_err(|e| setup_error("telemetry socket", e))
    }

    /// Run until the channel terminates, then return its counters.
    ///
    /// Always leaves the shared `done` flag set, including when the policy
    /// panics or the task is aborted.
    pub async fn run(mut self) -> TelemetryStats {
        let _finish = FinishOnDrop(Arc::clone(&self.session));
        // Sized for any datagram so oversized packets are seen at full length
        // and rejected, rather than truncated to a valid width.
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];

        info!(
            addr = ?self.socket.local_addr().ok(),
            motors = %self.motor_addr,
            "telemetry channel waiting for simulator"
        );

        let termination = loop {
            let len = match self.receive(&mut buf).await {
                Ok(len) => len,
                Err(termination) => break termination,
            };
            if let Some(termination) = self.handle_datagram(&buf[..len]).await {
                break termination;
            }
            tokio::time::sleep(self.pacing).await;
        };

        self.terminate(termination)
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Termination> {
        match self.phase {
            TelemetryPhase::AwaitingFirst => {
                let session = Arc::clone(&self.session);
                let received = tokio::select! {
                    res = self.socket.recv_from(buf) => Some(res),
                    _ = session.wait() => None,
                };
                match received {
                    Some(Ok((len, peer))) => {
                        info!(peer = %peer, timeout_ms = self.read_timeout.as_millis() as u64, "telemetry running");
                        self.phase = TelemetryPhase::Streaming;
                        Ok(len)
                    }
                    Some(Err(e)) => Err(Termination::TransportError(e.to_string())),
                    None => Err(Termination::Stopped),
                }
            }
            TelemetryPhase::Streaming => {
                match tokio::time::timeout(self.read_timeout, self.socket.recv_from(buf)).await {
                    Ok(Ok((len, _))) => Ok(len),
                    Ok(Err(e)) => Err(Termination::TransportError(e.to_string())),
                    Err(_) => Err(Termination::Timeout),
                }
            }
        }
    }

    /// Decode, consult the policy and respond.  Returns `Some` when the
    /// datagram ends the session.
    async fn handle_datagram(&mut self, bytes: &[u8]) -> Option<Termination> {
        self.stats.packets_received += 1;

        let packet = match decode_telemetry(bytes, &self.layout) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed_discarded += 1;
                warn!(error = %e, "discarding malformed telemetry packet");
                return None;
            }
        };

        if packet.is_sentinel() {
            return Some(Termination::Sentinel);
        }

        let command = self
            .policy
            .compute_motors(packet.time, &packet.state, &packet.demand);
        let datagram = encode_motors(&command);

        match self.motor_socket.send_to(&datagram, self.motor_addr).await {
            Ok(_) => self.stats.commands_sent += 1,
            Err(e) => {
                // The transport is lossy anyway; this control cycle is skipped.
                self.stats.send_failures += 1;
                warn!(error = %e, motors = %self.motor_addr, "motor command not sent");
            }
        }
        None
    }

    fn terminate(mut self, termination: Termination) -> TelemetryStats {
        let first = self.session.finish();

        match &termination {
            Termination::Sentinel => info!("simulator ended the session"),
            Termination::Timeout => {
                let err = BridgeError::TransportTimeout {
                    channel: ChannelKind::Telemetry,
                    waited_ms: self.read_timeout.as_millis() as u64,
                };
                info!(reason = %err, "simulator stopped sending telemetry")
            }
            Termination::TransportError(details) => {
                let err = BridgeError::Transport {
                    channel: ChannelKind::Telemetry,
                    details: details.clone(),
                };
                warn!(error = %err, "telemetry socket failed")
            }
            Termination::PeerClosed | Termination::Stopped => {
                debug!("telemetry channel stopped by session")
            }
        }
        if first {
            info!(channel = "telemetry", "session done");
        }

        self.stats.termination = Some(termination);
        // Both sockets close when `self` drops here.
        self.stats
    }
}

struct FinishOnDrop(Arc<SessionState>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.finish();
    }
}
