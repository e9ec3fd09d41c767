//! Binary frame wire format.
//!
//! ```text
//! +--------+----------------+--------------------+---------------------+
//! | opts   | pin (optional) | timestamp          | pixels              |
//! | 1 byte | 4 bytes ASCII, | 8 bytes LE, ms     | 3 bytes each, R G B |
//! |        | space padded   | 0 = show on arrival|                     |
//! +--------+----------------+--------------------+---------------------+
//! ```
//!
//! Bit 0 of the options byte asks the client to clear its frame buffer.
//! The pin field is only present in the per-pin variant used by Pi clients.

use thiserror::Error;

use crate::color::RgbColor;
use crate::render::RenderedFrame;

pub const OPTION_CLEAR_BUFFER: u8 = 0x01;
pub const PIN_LEN: usize = 4;
pub const TIMESTAMP_LEN: usize = 8;
pub const BYTES_PER_PIXEL: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid pin identifier {0:?}: must be 1-4 ASCII characters")]
    InvalidPin(String),

    #[error("frame too short: {0} bytes")]
    Truncated(usize),

    #[error("pixel payload of {0} bytes is not a multiple of 3")]
    RaggedPixels(usize),
}

/// Per-send encoding options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameEncodeOptions {
    pub clear_buffer: bool,
    /// Pin identifier; `Some` selects the per-pin wire variant
    pub pin: Option<String>,
}

/// A frame as read back off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub clear_buffer: bool,
    pub pin: Option<String>,
    pub timestamp_ms: u64,
    pub pixels: Vec<RgbColor>,
}

fn encode_pin(pin: &str) -> Result<[u8; PIN_LEN], CodecError> {
    if pin.is_empty() || pin.len() > PIN_LEN || !pin.is_ascii() {
        return Err(CodecError::InvalidPin(pin.to_string()));
    }
    let mut out = [b' '; PIN_LEN];
    out[..pin.len()].copy_from_slice(pin.as_bytes());
    Ok(out)
}

/// Encode a rendered frame.
pub fn encode(frame: &RenderedFrame, options: &FrameEncodeOptions) -> Result<Vec<u8>, CodecError> {
    encode_pixels(frame.timestamp_ms, &frame.pixels, options)
}

/// Encode a timestamp and pixel list.
pub fn encode_pixels(
    timestamp_ms: u64,
    pixels: &[RgbColor],
    options: &FrameEncodeOptions,
) -> Result<Vec<u8>, CodecError> {
    let pin = options.pin.as_deref().map(encode_pin).transpose()?;

    let header = 1 + pin.map_or(0, |_| PIN_LEN) + TIMESTAMP_LEN;
    let mut out = Vec::with_capacity(header + pixels.len() * BYTES_PER_PIXEL);

    out.push(if options.clear_buffer {
        OPTION_CLEAR_BUFFER
    } else {
        0
    });
    if let Some(pin) = pin {
        out.extend_from_slice(&pin);
    }
    out.extend_from_slice(&timestamp_ms.to_le_bytes());
    for p in pixels {
        out.extend_from_slice(&[p.r, p.g, p.b]);
    }
    Ok(out)
}

/// Decode a frame; `with_pin` selects the per-pin variant.
pub fn decode(bytes: &[u8], with_pin: bool) -> Result<DecodedFrame, CodecError> {
    let header = 1 + if with_pin { PIN_LEN } else { 0 } + TIMESTAMP_LEN;
    if bytes.len() < header {
        return Err(CodecError::Truncated(bytes.len()));
    }

    let clear_buffer = bytes[0] & OPTION_CLEAR_BUFFER != 0;
    let mut pos = 1;

    let pin = if with_pin {
        let raw = &bytes[pos..pos + PIN_LEN];
        pos += PIN_LEN;
        let pin = String::from_utf8_lossy(raw).trim_end().to_string();
        if pin.is_empty() {
            return Err(CodecError::InvalidPin(pin));
        }
        Some(pin)
    } else {
        None
    };

    let mut ts = [0u8; TIMESTAMP_LEN];
    ts.copy_from_slice(&bytes[pos..pos + TIMESTAMP_LEN]);
    pos += TIMESTAMP_LEN;

    let payload = &bytes[pos..];
    if payload.len() % BYTES_PER_PIXEL != 0 {
        return Err(CodecError::RaggedPixels(payload.len()));
    }
    let pixels = payload
        .chunks_exact(BYTES_PER_PIXEL)
        .map(|c| RgbColor::new(c[0], c[1], c[2]))
        .collect();

    Ok(DecodedFrame {
        clear_buffer,
        pin,
        timestamp_ms: u64::from_le_bytes(ts),
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_frame() -> RenderedFrame {
        RenderedFrame {
            timestamp_ms: 1727921898452,
            strip_uuid: Uuid::nil(),
            pixels: vec![
                RgbColor::new(0, 0, 255),
                RgbColor::new(0, 255, 0),
                RgbColor::new(255, 0, 0),
                RgbColor::new(128, 127, 200),
            ],
            sequence_number: 1,
        }
    }

    #[test]
    fn test_encode_without_pin() {
        let bytes = encode(&sample_frame(), &FrameEncodeOptions::default()).unwrap();
        assert_eq!(bytes.len(), 21);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..9], &1727921898452u64.to_le_bytes());
        assert_eq!(
            &bytes[9..],
            &[0, 0, 255, 0, 255, 0, 255, 0, 0, 128, 127, 200]
        );
    }

    #[test]
    fn test_encode_with_pin_and_clear() {
        let opts = FrameEncodeOptions {
            clear_buffer: true,
            pin: Some("18".into()),
        };
        let bytes = encode(&sample_frame(), &opts).unwrap();
        assert_eq!(bytes.len(), 25);
        assert_eq!(bytes[0], OPTION_CLEAR_BUFFER);
        assert_eq!(&bytes[1..5], b"18  ");

        let decoded = decode(&bytes, true).unwrap();
        assert!(decoded.clear_buffer);
        assert_eq!(decoded.pin.as_deref(), Some("18"));
        assert_eq!(decoded.timestamp_ms, 1727921898452);
        assert_eq!(decoded.pixels, sample_frame().pixels);
    }

    #[test]
    fn test_invalid_pins() {
        for pin in ["", "12345", "é"] {
            let opts = FrameEncodeOptions {
                clear_buffer: false,
                pin: Some(pin.into()),
            };
            assert_eq!(
                encode(&sample_frame(), &opts),
                Err(CodecError::InvalidPin(pin.into()))
            );
        }
    }

    #[test]
    fn test_immediate_timestamp() {
        let bytes = encode_pixels(0, &[RgbColor::WHITE], &FrameEncodeOptions::default()).unwrap();
        assert_eq!(decode(&bytes, false).unwrap().timestamp_ms, 0);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(decode(&[0; 5], false), Err(CodecError::Truncated(5)));
        assert_eq!(decode(&[0; 11], false), Err(CodecError::RaggedPixels(2)));
    }
}
