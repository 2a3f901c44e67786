//! [`ImageChannel`] – single-client camera stream receiver.
//!
//! The simulator connects once and streams an unbounded sequence of raw RGBA
//! frames, each exactly `rows * cols * 4` bytes with no header.  Frame
//! boundaries are purely positional, so the channel accumulates reads until a
//! whole frame is buffered; a single read never crosses into the next frame.
//!
//! # State machine
//!
//! `Listening` → (one client accepted) → `Connected` → (read error, read
//! timeout, peer close, or `done` observed before a read) → `Terminated`.
//! The phases are the stages of [`ImageChannel::run`]: the accept, the frame
//! loop, and the return that consumes the channel.  There is no
//! reconnection: the listener is closed right after the accept.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use simbridge_policy::ImageSink;
use simbridge_types::{BridgeConfig, BridgeError, ChannelKind, ImageStats, Termination};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info, trace, warn};

use crate::codec::strip_alpha;
use crate::net::{resolve, setup_error};
use crate::session_state::SessionState;

/// Listen backlog: the protocol serves exactly one client.
pub const LISTEN_BACKLOG: u32 = 1;

/// Owns the image listener and, once accepted, the client connection.
pub struct ImageChannel<S> {
    listener: Option<TcpListener>,
    rows: usize,
    cols: usize,
    frame_bytes: usize,
    read_timeout: Duration,
    sink: S,
    session: Arc<SessionState>,
    stats: ImageStats,
}

impl<S: ImageSink> ImageChannel<S> {
    /// Bind and listen on `host:image_port` with a backlog of one.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Setup`] if the address cannot be resolved or the
    /// listener cannot be created.
    pub async fn bind(
        config: &BridgeConfig,
        sink: S,
        session: Arc<SessionState>,
    ) -> Result<Self, BridgeError> {
        let addr = resolve(&config.host, config.image_port).await?;
        let endpoint = addr.to_string();

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| setup_error(&endpoint, e))?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| setup_error(&endpoint, e))?;
        socket.bind(addr).map_err(|e| setup_error(&endpoint, e))?;
        let listener = socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| setup_error(&endpoint, e))?;

        Ok(Self {
            listener: Some(listener),
            rows: config.image_rows,
            cols: config.image_cols,
            frame_bytes: config.frame_bytes(),
            read_timeout: config.image_timeout(),
            sink,
            session,
            stats: ImageStats::default(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        match &self.listener {
            Some(listener) => listener
                .local_addr()
                .map_err(|e| setup_error("image listener", e)),
            None => Err(BridgeError::Setup {
                endpoint: "image listener".to_string(),
                details: "listener already closed".to_string(),
            }),
        }
    }

    /// Accept the client and deliver frames until the channel terminates.
    pub async fn run(mut self) -> ImageStats {
        let termination = match self.accept().await {
            Ok(stream) => self.stream_frames(stream).await,
            Err(termination) => termination,
        };
        self.terminate(termination)
    }

    async fn accept(&mut self) -> Result<TcpStream, Termination> {
        let Some(listener) = self.listener.take() else {
            return Err(Termination::Stopped);
        };
        let session = Arc::clone(&self.session);

        let accepted = tokio::select! {
            res = listener.accept() => Some(res),
            _ = session.wait() => None,
        };
        // Single client: refuse anything that arrives after this point.
        drop(listener);

        match accepted {
            Some(Ok((stream, peer))) => {
                info!(peer = %peer, "image client connected");
                Ok(stream)
            }
            Some(Err(e)) => Err(Termination::TransportError(e.to_string())),
            None => Err(Termination::Stopped),
        }
    }

    async fn stream_frames(&mut self, mut stream: TcpStream) -> Termination {
        let order = self.sink.channel_order();
        let mut buf = vec![0u8; self.frame_bytes];
        let mut filled = 0;

        loop {
            if self.session.is_done() {
                return Termination::Stopped;
            }

            let read = tokio::time::timeout(self.read_timeout, stream.read(&mut buf[filled..])).await;
            let n = match read {
                Err(_) => return Termination::Timeout,
                Ok(Err(e)) => return Termination::TransportError(e.to_string()),
                Ok(Ok(0)) => {
                    if filled > 0 {
                        debug!(filled, "dropping incomplete trailing frame");
                    }
                    return Termination::PeerClosed;
                }
                Ok(Ok(n)) => n,
            };

            self.stats.bytes_received += n as u64;
            filled += n;
            if filled < self.frame_bytes {
                trace!(filled, frame_bytes = self.frame_bytes, "partial frame");
                continue;
            }
            filled = 0;

            // `buf` is allocated at `frame_bytes` and only handed over when full.
            let frame = strip_alpha(self.rows, self.cols, &buf, order);
            self.sink.consume(&frame);
            self.stats.frames_delivered += 1;
        }
    }

    fn terminate(mut self, termination: Termination) -> ImageStats {
        let first = self.session.finish();

        match &termination {
            Termination::Timeout => {
                let err = BridgeError::TransportTimeout {
                    channel: ChannelKind::Image,
                    waited_ms: self.read_timeout.as_millis() as u64,
                };
                info!(reason = %err, "simulator stopped sending frames")
            }
            Termination::TransportError(details) => {
                let err = BridgeError::Transport {
                    channel: ChannelKind::Image,
                    details: details.clone(),
                };
                warn!(error = %err, "image connection failed")
            }
            Termination::PeerClosed => info!("image client disconnected"),
            Termination::Stopped | Termination::Sentinel => {
                debug!("image channel stopped by session")
            }
        }
        if first {
            info!(channel = "image", "session done");
        }

        self.stats.termination = Some(termination);
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simbridge_policy::NullSink;
    use simbridge_types::ImageFrame;
    use tokio::io::AsyncWriteExt;

    const ROWS: usize = 8;
    const COLS: usize = 8;
    const FRAME: usize = ROWS * COLS * 4;

    fn config(image_timeout_ms: u64) -> BridgeConfig {
        BridgeConfig {
            host: "127.0.0.1".to_string(),
            image_port: 0,
            image_rows: ROWS,
            image_cols: COLS,
            image_timeout_ms,
            ..Default::default()
        }
    }

    /// A frame whose pixel at (r, c) is (r, c, r + c, 255).
    fn gradient_frame() -> Vec<u8> {
        let mut rgba = Vec::with_capacity(FRAME);
        for r in 0..ROWS {
            for c in 0..COLS {
                rgba.extend_from_slice(&[r as u8, c as u8, (r + c) as u8, 255]);
            }
        }
        rgba
    }

    #[tokio::test]
    async fn alpha_dropped_and_position_preserved() {
        let session = Arc::new(SessionState::new());
        let mut frames: Vec<ImageFrame> = Vec::new();
        let channel = ImageChannel::bind(
            &config(500),
            |f: &ImageFrame| frames.push(f.clone()),
            Arc::clone(&session),
        )
        .await
        .unwrap();
        let addr = channel.local_addr().unwrap();

        let mut rgba = vec![0u8; FRAME];
        let at = (2 * COLS + 5) * 4;
        rgba[at..at + 4].copy_from_slice(&[10, 20, 30, 255]);

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&rgba).await.unwrap();
        });

        let stats = channel.run().await;
        client.await.unwrap();

        assert_eq!(stats.termination, Some(Termination::PeerClosed));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].pixel(2, 5), Some([10, 20, 30]));
        assert_eq!(frames[0].pixel(2, 4), Some([0, 0, 0]));
        assert!(session.is_done());
    }

    #[tokio::test]
    async fn frame_split_across_reads_is_delivered_once() {
        let session = Arc::new(SessionState::new());
        let mut frames: Vec<ImageFrame> = Vec::new();
        let channel = ImageChannel::bind(
            &config(500),
            |f: &ImageFrame| frames.push(f.clone()),
            Arc::clone(&session),
        )
        .await
        .unwrap();
        let addr = channel.local_addr().unwrap();

        let rgba = gradient_frame();
        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&rgba[..FRAME - 100]).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            stream.write_all(&rgba[FRAME - 100..]).await.unwrap();
        });

        let stats = channel.run().await;
        client.await.unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(stats.frames_delivered, 1);
        assert_eq!(stats.bytes_received, FRAME as u64);
        let frame = &frames[0];
        for r in 0..ROWS {
            for c in 0..COLS {
                assert_eq!(frame.pixel(r, c), Some([r as u8, c as u8, (r + c) as u8]));
            }
        }
    }

    #[tokio::test]
    async fn back_to_back_frames_split_positionally() {
        let session = Arc::new(SessionState::new());
        let mut count = 0u32;
        let channel = ImageChannel::bind(&config(500), |_: &ImageFrame| count += 1, session)
            .await
            .unwrap();
        let addr = channel.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut burst = gradient_frame();
            burst.extend(gradient_frame());
            // Half of a third frame, then hang up.
            burst.extend_from_slice(&gradient_frame()[..FRAME / 2]);
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&burst).await.unwrap();
        });

        let stats = channel.run().await;
        client.await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(stats.frames_delivered, 2);
        assert_eq!(stats.termination, Some(Termination::PeerClosed));
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let session = Arc::new(SessionState::new());
        let channel = ImageChannel::bind(&config(200), NullSink, Arc::clone(&session))
            .await
            .unwrap();
        let addr = channel.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(800)).await;
            drop(stream);
        });

        let started = std::time::Instant::now();
        let stats = channel.run().await;
        assert_eq!(stats.termination, Some(Termination::Timeout));
        assert!(started.elapsed() < Duration::from_millis(700));
        assert!(session.is_done());
        client.await.unwrap();
    }

    #[tokio::test]
    async fn done_flag_observed_between_frames() {
        let session = Arc::new(SessionState::new());
        let channel = ImageChannel::bind(&config(1000), NullSink, Arc::clone(&session))
            .await
            .unwrap();
        let addr = channel.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let frame = gradient_frame();
            while stream.write_all(&frame).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let stopper = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.finish();
        });

        let stats = tokio::time::timeout(Duration::from_secs(2), channel.run())
            .await
            .expect("channel must stop once done is set");
        assert_eq!(stats.termination, Some(Termination::Stopped));
        assert!(stats.frames_delivered > 0);
        client.await.unwrap();
    }

    #[tokio::test]
    async fn stop_while_listening_ends_channel() {
        let session = Arc::new(SessionState::new());
        let channel = ImageChannel::bind(&config(1000), NullSink, Arc::clone(&session))
            .await
            .unwrap();
        assert!(channel.listener.is_some());

        session.finish();
        let stats = tokio::time::timeout(Duration::from_millis(500), channel.run())
            .await
            .expect("stop must wake the accept");
        assert_eq!(stats.termination, Some(Termination::Stopped));
        assert_eq!(stats.frames_delivered, 0);
    }

    #[tokio::test]
    async fn second_client_is_refused() {
        let session = Arc::new(SessionState::new());
        let channel = ImageChannel::bind(&config(1000), NullSink, Arc::clone(&session))
            .await
            .unwrap();
        let addr = channel.local_addr().unwrap();
        let task = tokio::spawn(channel.run());

        let first = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Either the connect is refused outright or the connection is dead.
        if let Ok(mut second) = TcpStream::connect(addr).await {
            let mut byte = [0u8; 1];
            let read = tokio::time::timeout(Duration::from_secs(1), second.read(&mut byte)).await;
            assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))));
        }

        drop(first);
        let stats = task.await.unwrap();
        assert_eq!(stats.termination, Some(Termination::PeerClosed));
    }
}
