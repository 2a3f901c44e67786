//! Wire codec.
//!
//! Every numeric field is an IEEE-754 binary64 in little-endian byte order,
//! regardless of the host.  Telemetry datagrams are
//! `[time, state(12), demand(k)]`, motor datagrams are `[m1, m2, m3, m4]`, and
//! camera frames are `rows * cols` RGBA pixels with no header.

use simbridge_types::{
    BridgeError, ChannelOrder, FIELD_BYTES, FRAME_CHANNELS, HEADER_FIELDS, ImageFrame,
    MOTOR_BYTES, MOTOR_COUNT, MotorCommand, RAW_CHANNELS, STATE_LEN, TelemetryLayout,
    TelemetryPacket, VehicleState,
};

/// Decode one telemetry datagram.
///
/// # Errors
///
/// Returns [`BridgeError::Format`] when `bytes` is not a whole number of
/// fields or does not match the width agreed in `layout`.
pub fn decode_telemetry(
    bytes: &[u8],
    layout: &TelemetryLayout,
) -> Result<TelemetryPacket, BridgeError> {
    let expected = layout.packet_bytes();
    if bytes.len() % FIELD_BYTES != 0 || bytes.len() != expected {
        return Err(BridgeError::Format {
            expected,
            actual: bytes.len(),
        });
    }

    let fields: Vec<f64> = bytes.chunks_exact(FIELD_BYTES).map(read_f64).collect();
    let mut state = [0.0; STATE_LEN];
    state.copy_from_slice(&fields[1..HEADER_FIELDS]);

    Ok(TelemetryPacket {
        time: fields[0],
        state: VehicleState(state),
        demand: fields[HEADER_FIELDS..].to_vec(),
    })
}

/// Encode a telemetry packet.  Used by simulator-side harnesses.
pub fn encode_telemetry(packet: &TelemetryPacket) -> Vec<u8> {
    let mut out = Vec::with_capacity((HEADER_FIELDS + packet.demand.len()) * FIELD_BYTES);
    out.extend_from_slice(&packet.time.to_le_bytes());
    for v in packet.state.as_array().iter().chain(packet.demand.iter()) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Encode a motor command into its 32-byte datagram.
pub fn encode_motors(command: &MotorCommand) -> [u8; MOTOR_BYTES] {
    let mut out = [0u8; MOTOR_BYTES];
    for (chunk, v) in out.chunks_exact_mut(FIELD_BYTES).zip(command.values()) {
        chunk.copy_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode a motor datagram.  Used by simulator-side harnesses.
///
/// # Errors
///
/// Returns [`BridgeError::Format`] unless `bytes` is exactly 32 bytes long.
pub fn decode_motors(bytes: &[u8]) -> Result<MotorCommand, BridgeError> {
    if bytes.len() != MOTOR_BYTES {
        return Err(BridgeError::Format {
            expected: MOTOR_BYTES,
            actual: bytes.len(),
        });
    }
    let mut values = [0.0; MOTOR_COUNT];
    for (v, chunk) in values.iter_mut().zip(bytes.chunks_exact(FIELD_BYTES)) {
        *v = read_f64(chunk);
    }
    Ok(MotorCommand(values))
}

/// Turn one raw RGBA frame into a 3-channel [`ImageFrame`].
///
/// The alpha byte of every pixel is dropped and the remaining bytes are
/// emitted in `order`.
///
/// # Errors
///
/// Returns [`BridgeError::Format`] when `rgba` is not exactly
/// `rows * cols * 4` bytes.
pub fn decode_frame(
    rows: usize,
    cols: usize,
    rgba: &[u8],
    order: ChannelOrder,
) -> Result<ImageFrame, BridgeError> {
    let pixels = rows.checked_mul(cols);
    let expected = pixels.and_then(|p| p.checked_mul(RAW_CHANNELS));
    if expected != Some(rgba.len()) {
        return Err(BridgeError::Format {
            expected: expected.unwrap_or(usize::MAX),
            actual: rgba.len(),
        });
    }

    Ok(strip_alpha(rows, cols, rgba, order))
}

/// Infallible core of [`decode_frame`] for buffers already known to hold
/// exactly `rows * cols * 4` bytes.
pub(crate) fn strip_alpha(
    rows: usize,
    cols: usize,
    rgba: &[u8],
    order: ChannelOrder,
) -> ImageFrame {
    debug_assert_eq!(rgba.len(), rows * cols * RAW_CHANNELS);
    let mut data = Vec::with_capacity(rgba.len() / RAW_CHANNELS * FRAME_CHANNELS);
    for px in rgba.chunks_exact(RAW_CHANNELS) {
        match order {
            ChannelOrder::Rgb => data.extend_from_slice(&px[..FRAME_CHANNELS]),
            ChannelOrder::Bgr => data.extend_from_slice(&[px[2], px[1], px[0]]),
        }
    }
    ImageFrame { rows, cols, data }
}

// Callers hand in chunks from `chunks_exact(FIELD_BYTES)`.
fn read_f64(chunk: &[u8]) -> f64 {
    let mut raw = [0u8; FIELD_BYTES];
    raw.copy_from_slice(chunk);
    f64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet(demand: Vec<f64>) -> TelemetryPacket {
        let mut state = [0.0; STATE_LEN];
        for (i, v) in state.iter_mut().enumerate() {
            *v = i as f64 * 0.5;
        }
        TelemetryPacket {
            time: 3.25,
            state: VehicleState(state),
            demand,
        }
    }

    #[test]
    fn telemetry_fields_land_in_order() {
        let packet = sample_packet(vec![0.1, 0.2, 0.3, 0.4]);
        let bytes = encode_telemetry(&packet);
        assert_eq!(bytes.len(), 136);

        let decoded = decode_telemetry(&bytes, &TelemetryLayout::default()).unwrap();
        assert_eq!(decoded.time, 3.25);
        assert_eq!(decoded.state.dpsi(), 5.5);
        assert_eq!(decoded.demand, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn telemetry_width_follows_layout() {
        let packet = sample_packet(vec![7.0, 8.0]);
        let bytes = encode_telemetry(&packet);
        let decoded = decode_telemetry(&bytes, &TelemetryLayout::new(2)).unwrap();
        assert_eq!(decoded.demand, vec![7.0, 8.0]);

        // The same bytes are malformed under the default 4-value layout.
        let err = decode_telemetry(&bytes, &TelemetryLayout::default()).unwrap_err();
        assert_eq!(
            err,
            BridgeError::Format {
                expected: 136,
                actual: 120
            }
        );
    }

    #[test]
    fn telemetry_rejects_partial_field() {
        let err = decode_telemetry(&[0u8; 137], &TelemetryLayout::default()).unwrap_err();
        assert!(matches!(err, BridgeError::Format { actual: 137, .. }));
        assert!(decode_telemetry(&[], &TelemetryLayout::default()).is_err());
    }

    #[test]
    fn byte_order_is_little_endian() {
        let bytes = encode_motors(&MotorCommand([1.0, 0.0, 0.0, -2.0]));
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0xf0, 0x3f]);
        assert_eq!(&bytes[24..], &[0, 0, 0, 0, 0, 0, 0x00, 0xc0]);

        let mut time = [0u8; 136];
        time[..8].copy_from_slice(&[0, 0, 0, 0, 0, 0, 0xf0, 0xbf]);
        let packet = decode_telemetry(&time, &TelemetryLayout::default()).unwrap();
        assert_eq!(packet.time, -1.0);
        assert!(packet.is_sentinel());
    }

    #[test]
    fn motors_are_thirty_two_bytes() {
        let bytes = encode_motors(&MotorCommand::uniform(0.6));
        assert_eq!(bytes.len(), 32);
        assert_eq!(decode_motors(&bytes).unwrap(), MotorCommand::uniform(0.6));
        assert!(decode_motors(&bytes[..31]).is_err());
    }

    #[test]
    fn frame_drops_alpha_in_place() {
        // 2x3 frame, pixel (1, 2) carries (10, 20, 30, 255).
        let mut rgba = vec![0u8; 2 * 3 * 4];
        let at = (3 + 2) * 4;
        rgba[at..at + 4].copy_from_slice(&[10, 20, 30, 255]);

        let frame = decode_frame(2, 3, &rgba, ChannelOrder::Rgb).unwrap();
        assert_eq!(frame.data.len(), 18);
        assert_eq!(frame.pixel(1, 2), Some([10, 20, 30]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn frame_bgr_swaps_outer_channels() {
        let frame = decode_frame(1, 1, &[10, 20, 30, 255], ChannelOrder::Bgr).unwrap();
        assert_eq!(frame.pixel(0, 0), Some([30, 20, 10]));
    }

    #[test]
    fn frame_length_must_match_geometry() {
        let err = decode_frame(2, 2, &[0u8; 15], ChannelOrder::Rgb).unwrap_err();
        assert_eq!(
            err,
            BridgeError::Format {
                expected: 16,
                actual: 15
            }
        );
    }
}
