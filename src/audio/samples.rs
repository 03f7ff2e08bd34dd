//! # PCM Sample Conversion
//!
//! Converts raw linear-PCM payload bytes into normalized `f32` samples in the
//! range [-1.0, 1.0], the format playback consumes.
//!
//! ## Supported widths:
//! - **16-bit**: little-endian signed integers, scaled by `1 / 32768`
//! - **8-bit**: unsigned bytes centred on 128, scaled by `1 / 128`
//!
//! Anything else is rejected rather than guessed at, so a mislabelled payload
//! is dropped instead of being played back as noise.

use crate::error::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;

/// Decode `payload` according to `bits_per_sample`.
///
/// ## Edge cases:
/// - Empty payload returns an empty vector, never an error
/// - 16-bit payload of odd length: the trailing byte cannot form a sample and
///   is dropped
pub fn decode_pcm(payload: &[u8], bits_per_sample: u16) -> Result<Vec<f32>, DecodeError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    match bits_per_sample {
        16 => Ok(decode_pcm16(payload)),
        8 => Ok(decode_pcm8(payload)),
        other => Err(DecodeError::UnsupportedSampleWidth {
            bits_per_sample: other,
        }),
    }
}

fn decode_pcm16(payload: &[u8]) -> Vec<f32> {
    if payload.len() % 2 != 0 {
        warn!(len = payload.len(), "16-bit PCM payload has odd length, dropping last byte");
    }

    payload
        .chunks_exact(2)
        .map(|pair| LittleEndian::read_i16(pair) as f32 / 32768.0)
        .collect()
}

fn decode_pcm8(payload: &[u8]) -> Vec<f32> {
    payload
        .iter()
        .map(|&byte| (byte as f32 - 128.0) / 128.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{pcm16_bytes, ContainerBuilder};
    use crate::audio::wav::WavFormatDecoder;

    fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
        samples
            .iter()
            .map(|&s| (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16)
            .collect()
    }

    #[test]
    fn test_pcm16_normalization() {
        let bytes = pcm16_bytes(&[0, 16384, -16384, 32767, -32768]);
        let samples = decode_pcm(&bytes, 16).unwrap();

        assert_eq!(samples, vec![0.0, 0.5, -0.5, 32767.0 / 32768.0, -1.0]);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_pcm16_odd_length_drops_trailing_byte() {
        let mut bytes = pcm16_bytes(&[1000, -1000]);
        bytes.push(0x7f);

        let samples = decode_pcm(&bytes, 16).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1], -1000.0 / 32768.0);
    }

    #[test]
    fn test_pcm8_normalization() {
        let samples = decode_pcm(&[0, 64, 128, 192, 255], 8).unwrap();
        assert_eq!(samples, vec![-1.0, -0.5, 0.0, 0.5, 127.0 / 128.0]);
    }

    #[test]
    fn test_empty_payload_is_not_an_error() {
        assert_eq!(decode_pcm(&[], 16).unwrap(), Vec::<f32>::new());
        assert_eq!(decode_pcm(&[], 8).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn test_unsupported_widths() {
        for bits in [0, 4, 12, 24, 32] {
            assert_eq!(
                decode_pcm(&[0; 12], bits),
                Err(DecodeError::UnsupportedSampleWidth { bits_per_sample: bits })
            );
        }
    }

    #[test]
    fn test_container_round_trip_within_one_lsb() {
        let originals: Vec<f32> = (0..500).map(|i| ((i as f32) * 0.013).sin() * 0.9).collect();
        let bytes = ContainerBuilder::pcm16(44100, &float_to_pcm16(&originals)).build();

        let (header, range) = WavFormatDecoder::default().decode(&bytes, 44100).unwrap();
        let decoded = decode_pcm(&bytes[range], header.bits_per_sample).unwrap();

        assert_eq!(decoded.len(), originals.len());
        for (original, decoded) in originals.iter().zip(&decoded) {
            assert!(
                (original - decoded).abs() <= 1.0 / 32768.0,
                "{original} vs {decoded}"
            );
        }
    }
}
