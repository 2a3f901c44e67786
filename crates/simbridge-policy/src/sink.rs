//! [`ImageSink`] – the camera-frame callback.

use simbridge_types::{ChannelOrder, ImageFrame};
use tracing::debug;

/// Receives every complete camera frame, alpha channel already removed.
///
/// The image channel runs on the task that started the session, so sinks do
/// not need to be `Send`.
pub trait ImageSink {
    fn consume(&mut self, frame: &ImageFrame);

    /// Channel order this sink expects.  Defaults to [`ChannelOrder::Rgb`].
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }
}

impl<F> ImageSink for F
where
    F: FnMut(&ImageFrame),
{
    fn consume(&mut self, frame: &ImageFrame) {
        self(frame)
    }
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ImageSink for NullSink {
    fn consume(&mut self, _frame: &ImageFrame) {}
}

/// Debug sink that logs the size and mean intensity of every `every`-th frame.
#[derive(Debug, Clone)]
pub struct FrameLogSink {
    every: u64,
    seen: u64,
}

impl FrameLogSink {
    /// Log one frame out of every `every` (values below 1 are treated as 1).
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }

    /// Number of frames consumed so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

impl Default for FrameLogSink {
    fn default() -> Self {
        Self::new(30)
    }
}

impl ImageSink for FrameLogSink {
    fn consume(&mut self, frame: &ImageFrame) {
        self.seen += 1;
        if (self.seen - 1) % self.every != 0 {
            return;
        }
        debug!(
            frame = self.seen,
            rows = frame.rows,
            cols = frame.cols,
            mean_intensity = mean_intensity(frame),
            "camera frame"
        );
    }
}

/// Average byte value over all channels, `0.0` for an empty frame.
pub fn mean_intensity(frame: &ImageFrame) -> f64 {
    if frame.data.is_empty() {
        return 0.0;
    }
    let sum: u64 = frame.data.iter().map(|&b| u64::from(b)).sum();
    sum as f64 / frame.data.len() as f64
}
