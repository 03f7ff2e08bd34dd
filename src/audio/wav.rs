//! # RIFF/WAVE Header Decoding
//!
//! Every data chunk from the conversational service starts with its own
//! RIFF/WAVE header. Those headers are written for a whole file but arrive
//! attached to a *piece* of it, so they are routinely inconsistent with the
//! bytes we actually hold. This decoder walks the layout defensively instead
//! of assuming the canonical 44-byte header.
//!
//! ## Binary Layout (all integers little-endian):
//! ```text
//! 0   "RIFF"          4   riff size (u32)     8   "WAVE"
//! 12  "fmt "          16  fmt size (u32)      20  format code (u16, 1 = PCM)
//! 22  channels (u16)  24  sample rate (u32)   28  byte rate (u32)
//! 32  block align     34  bits per sample     36+ ... "data", size (i32), samples
//! ```
//!
//! ## Tolerated damage:
//! - **Missing "fmt " tag**: degraded mode. Scan for "data" and assume mono
//!   16-bit at the transport's sample rate.
//! - **Variable fmt size / padding**: the "data" tag is found by scanning, not
//!   by a fixed offset.
//! - **Declared payload size wrong**: corrected to the bytes actually present
//!   (lenient policy) or rejected (strict policy).

use crate::error::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use std::ops::Range;
use tracing::{debug, warn};

/// Shortest input that can hold a canonical header.
pub const MIN_HEADER_LEN: usize = 44;

const RIFF_TAG: &[u8; 4] = b"RIFF";
const WAVE_TAG: &[u8; 4] = b"WAVE";
const FMT_TAG: &[u8; 4] = b"fmt ";
const DATA_TAG: &[u8; 4] = b"data";

const WAVE_TAG_OFFSET: usize = 8;
const FMT_TAG_OFFSET: usize = 12;
const FMT_BODY_OFFSET: usize = 20;
/// End of a minimal 16-byte PCM fmt body.
const MIN_FMT_END: usize = 36;
/// Tag plus size field.
const SUB_CHUNK_HEADER_LEN: usize = 8;

pub const FORMAT_PCM: u16 = 1;

/// What to do when the declared payload size disagrees with the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizePolicy {
    /// Substitute the number of bytes actually available.
    #[default]
    Lenient,
    /// Reject the chunk with `DecodeError::InconsistentSize`.
    Strict,
}

/// Decoded header fields for one chunk. Built per chunk and dropped as soon as
/// the payload is converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHeader {
    pub container_id: [u8; 4],
    pub riff_size: u32,
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub byte_rate: u32,
    pub block_align: u16,
    /// Byte offset of the first sample.
    pub payload_offset: usize,
    /// Payload length after reconciliation; always fits the input.
    pub payload_size: usize,
    /// Set when the declared payload size was replaced by the available length.
    pub size_corrected: bool,
    /// Set when the header was synthesized because the "fmt " tag was missing.
    pub degraded: bool,
}

impl AudioHeader {
    pub fn payload_range(&self) -> Range<usize> {
        self.payload_offset..self.payload_offset + self.payload_size
    }

    /// Playback duration of the payload described by this header.
    pub fn duration_seconds(&self) -> f64 {
        let bytes_per_frame = self.channels as usize * (self.bits_per_sample as usize / 8);
        if bytes_per_frame == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        let frames = self.payload_size / bytes_per_frame;
        frames as f64 / self.sample_rate as f64
    }
}

/// Parses the header embedded in a response chunk.
#[derive(Debug, Clone, Default)]
pub struct WavFormatDecoder {
    size_policy: SizePolicy,
}

impl WavFormatDecoder {
    pub fn new(size_policy: SizePolicy) -> Self {
        Self { size_policy }
    }

    /// Decode the header of `bytes` and locate the sample payload.
    ///
    /// `fallback_sample_rate` is used only in degraded mode, when the format
    /// sub-chunk cannot be found.
    ///
    /// ## Returns:
    /// - **Ok((header, range))**: `range` always lies within `bytes`
    /// - **Err(DecodeError)**: a typed reason; no partially filled header is
    ///   ever returned
    pub fn decode(
        &self,
        bytes: &[u8],
        fallback_sample_rate: u32,
    ) -> Result<(AudioHeader, Range<usize>), DecodeError> {
        if bytes.len() < MIN_HEADER_LEN {
            return Err(DecodeError::TooShort {
                len: bytes.len(),
                min: MIN_HEADER_LEN,
            });
        }

        expect_tag(bytes, 0, RIFF_TAG, "RIFF")?;
        expect_tag(bytes, WAVE_TAG_OFFSET, WAVE_TAG, "WAVE")?;

        let riff_size = LittleEndian::read_u32(&bytes[4..8]);

        let header = if &bytes[FMT_TAG_OFFSET..FMT_TAG_OFFSET + 4] == FMT_TAG {
            self.decode_standard(bytes, riff_size)?
        } else {
            warn!(
                found = %tag_string(&bytes[FMT_TAG_OFFSET..FMT_TAG_OFFSET + 4]),
                "Expected 'fmt ' sub-chunk, falling back to degraded decoding"
            );
            self.decode_degraded(bytes, riff_size, fallback_sample_rate)?
        };

        let range = header.payload_range();
        debug_assert!(range.end <= bytes.len());
        Ok((header, range))
    }

    fn decode_standard(&self, bytes: &[u8], riff_size: u32) -> Result<AudioHeader, DecodeError> {
        let fmt_size = LittleEndian::read_u32(&bytes[16..20]);
        let format_tag = LittleEndian::read_u16(&bytes[20..22]);
        let channels = LittleEndian::read_u16(&bytes[22..24]);
        let sample_rate = LittleEndian::read_u32(&bytes[24..28]);
        let byte_rate = LittleEndian::read_u32(&bytes[28..32]);
        let block_align = LittleEndian::read_u16(&bytes[32..34]);
        let bits_per_sample = LittleEndian::read_u16(&bytes[34..36]);

        debug!(
            format_tag,
            channels, sample_rate, bits_per_sample, fmt_size, "Parsed fmt sub-chunk"
        );

        if format_tag != FORMAT_PCM {
            return Err(DecodeError::UnsupportedFormat {
                format_code: format_tag,
            });
        }

        let fmt_end = usize::try_from(fmt_size)
            .map(|size| FMT_BODY_OFFSET.saturating_add(size))
            .unwrap_or(usize::MAX);

        // A garbage fmt size can push the scan past the real "data" tag.
        let data_pos = find_chunk(bytes, DATA_TAG, fmt_end)
            .or_else(|| {
                (fmt_end != MIN_FMT_END)
                    .then(|| find_chunk(bytes, DATA_TAG, MIN_FMT_END))
                    .flatten()
            })
            .ok_or(DecodeError::MissingDataChunk {
                searched_from: fmt_end.min(MIN_FMT_END),
            })?;

        let (payload_offset, payload_size, size_corrected) =
            self.reconcile_payload(bytes, data_pos)?;

        Ok(AudioHeader {
            container_id: *RIFF_TAG,
            riff_size,
            format_tag,
            channels,
            sample_rate,
            bits_per_sample,
            byte_rate,
            block_align,
            payload_offset,
            payload_size,
            size_corrected,
            degraded: false,
        })
    }

    fn decode_degraded(
        &self,
        bytes: &[u8],
        riff_size: u32,
        fallback_sample_rate: u32,
    ) -> Result<AudioHeader, DecodeError> {
        let data_pos =
            find_chunk(bytes, DATA_TAG, FMT_TAG_OFFSET).ok_or(DecodeError::MissingDataChunk {
                searched_from: FMT_TAG_OFFSET,
            })?;

        let (payload_offset, payload_size, size_corrected) =
            self.reconcile_payload(bytes, data_pos)?;

        debug!(
            data_pos,
            payload_size,
            sample_rate = fallback_sample_rate,
            "Degraded decode: assuming mono 16-bit PCM"
        );

        Ok(AudioHeader {
            container_id: *RIFF_TAG,
            riff_size,
            format_tag: FORMAT_PCM,
            channels: 1,
            sample_rate: fallback_sample_rate,
            bits_per_sample: 16,
            byte_rate: fallback_sample_rate.saturating_mul(2),
            block_align: 2,
            payload_offset,
            payload_size,
            size_corrected,
            degraded: true,
        })
    }

    /// Read the declared size at `data_pos + 4` and fit it to the input.
    fn reconcile_payload(
        &self,
        bytes: &[u8],
        data_pos: usize,
    ) -> Result<(usize, usize, bool), DecodeError> {
        // find_chunk guarantees the tag and size field are in bounds.
        let declared = LittleEndian::read_i32(&bytes[data_pos + 4..data_pos + 8]) as i64;
        let payload_offset = data_pos + SUB_CHUNK_HEADER_LEN;
        let available = bytes.len() - payload_offset;

        if declared > 0 && declared as u64 <= available as u64 {
            return Ok((payload_offset, declared as usize, false));
        }

        match self.size_policy {
            SizePolicy::Lenient => {
                warn!(
                    declared,
                    available, "Invalid data size in header, using actual payload length"
                );
                Ok((payload_offset, available, true))
            }
            SizePolicy::Strict => Err(DecodeError::InconsistentSize { declared, available }),
        }
    }
}

/// Find the first occurrence of `tag` at or after `start`.
///
/// Scans byte-by-byte so padding or unknown sub-chunks in between are skipped.
/// Only positions that leave room for the 4-byte size field that follows a
/// tag are considered, so callers can read it without further checks.
pub fn find_chunk(bytes: &[u8], tag: &[u8; 4], start: usize) -> Option<usize> {
    let last = bytes.len().checked_sub(SUB_CHUNK_HEADER_LEN)?;
    if start > last {
        return None;
    }
    (start..=last).find(|&i| &bytes[i..i + 4] == tag)
}

fn expect_tag(
    bytes: &[u8],
    offset: usize,
    tag: &[u8; 4],
    name: &'static str,
) -> Result<(), DecodeError> {
    let found = &bytes[offset..offset + 4];
    if found == tag {
        return Ok(());
    }
    Err(DecodeError::InvalidContainer {
        expected: name,
        found: tag_string(found),
        offset,
    })
}

fn tag_string(tag: &[u8]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{pcm16_bytes, tone, ContainerBuilder};

    fn decoder() -> WavFormatDecoder {
        WavFormatDecoder::default()
    }

    #[test]
    fn test_canonical_header_fields_recovered() {
        let samples = tone(50);
        let bytes = ContainerBuilder::pcm16(24000, &samples).build();

        let (header, range) = decoder().decode(&bytes, 44100).unwrap();

        assert_eq!(&header.container_id, b"RIFF");
        assert_eq!(header.riff_size as usize, bytes.len() - 8);
        assert_eq!(header.format_tag, 1);
        assert_eq!(header.channels, 1);
        assert_eq!(header.sample_rate, 24000);
        assert_eq!(header.byte_rate, 48000);
        assert_eq!(header.block_align, 2);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.payload_offset, 44);
        assert_eq!(header.payload_size, 100);
        assert!(!header.size_corrected);
        assert!(!header.degraded);
        assert_eq!(&bytes[range], pcm16_bytes(&samples).as_slice());
    }

    #[test]
    fn test_stereo_8bit_fields_recovered() {
        let mut builder = ContainerBuilder::pcm8(8000, vec![128; 40]);
        builder.channels = 2;
        let bytes = builder.build();

        let (header, _) = decoder().decode(&bytes, 44100).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.bits_per_sample, 8);
        assert_eq!(header.block_align, 2);
        assert_eq!(header.byte_rate, 16000);
        assert_eq!(header.payload_size, 40);
    }

    #[test]
    fn test_short_input_rejected_for_every_length() {
        let full = ContainerBuilder::pcm16(44100, &tone(10)).build();
        for len in 0..MIN_HEADER_LEN {
            let result = decoder().decode(&full[..len], 44100);
            assert_eq!(
                result,
                Err(DecodeError::TooShort { len, min: MIN_HEADER_LEN }),
                "length {len}"
            );
        }
    }

    #[test]
    fn test_invalid_container_tags() {
        let mut bytes = ContainerBuilder::pcm16(44100, &tone(10)).build();
        bytes[0..4].copy_from_slice(b"RIFX");
        assert!(matches!(
            decoder().decode(&bytes, 44100),
            Err(DecodeError::InvalidContainer { expected: "RIFF", offset: 0, .. })
        ));

        let mut bytes = ContainerBuilder::pcm16(44100, &tone(10)).build();
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(matches!(
            decoder().decode(&bytes, 44100),
            Err(DecodeError::InvalidContainer { expected: "WAVE", offset: 8, .. })
        ));
    }

    #[test]
    fn test_degraded_mode_uses_sample_rate_hint() {
        let samples = tone(30);
        let mut builder = ContainerBuilder::pcm16(48000, &samples);
        builder.fmt_tag = *b"junk";
        let bytes = builder.build();

        let (header, range) = decoder().decode(&bytes, 22050).unwrap();

        assert!(header.degraded);
        assert_eq!(header.sample_rate, 22050);
        assert_eq!(header.channels, 1);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(&bytes[range], pcm16_bytes(&samples).as_slice());
    }

    #[test]
    fn test_degraded_mode_without_data_chunk() {
        let mut bytes = vec![0u8; 64];
        bytes[0..4].copy_from_slice(b"RIFF");
        bytes[8..12].copy_from_slice(b"WAVE");
        bytes[12..16].copy_from_slice(b"JUNK");

        assert_eq!(
            decoder().decode(&bytes, 44100),
            Err(DecodeError::MissingDataChunk { searched_from: 12 })
        );
    }

    #[test]
    fn test_missing_data_chunk_in_standard_layout() {
        let mut bytes = ContainerBuilder::pcm16(44100, &tone(20)).build();
        bytes[36..40].copy_from_slice(b"list");

        assert!(matches!(
            decoder().decode(&bytes, 44100),
            Err(DecodeError::MissingDataChunk { .. })
        ));
    }

    #[test]
    fn test_oversized_declared_size_is_corrected() {
        let mut builder = ContainerBuilder::pcm16(44100, &tone(50));
        builder.declared_data_size = Some(999_999);
        let bytes = builder.build();

        let (header, range) = decoder().decode(&bytes, 44100).unwrap();

        assert_eq!(header.payload_size, 100);
        assert!(header.size_corrected);
        assert_eq!(range.end, bytes.len());
    }

    #[test]
    fn test_non_positive_declared_size_is_corrected() {
        for declared in [0, -1, i32::MIN] {
            let mut builder = ContainerBuilder::pcm16(44100, &tone(8));
            builder.declared_data_size = Some(declared);
            let bytes = builder.build();

            let (header, _) = decoder().decode(&bytes, 44100).unwrap();
            assert_eq!(header.payload_size, 16, "declared {declared}");
            assert!(header.size_corrected);
        }
    }

    #[test]
    fn test_smaller_declared_size_is_honoured() {
        let mut builder = ContainerBuilder::pcm16(44100, &tone(50));
        builder.declared_data_size = Some(40);
        let bytes = builder.build();

        let (header, range) = decoder().decode(&bytes, 44100).unwrap();
        assert_eq!(header.payload_size, 40);
        assert!(!header.size_corrected);
        assert_eq!(range, 44..84);
    }

    #[test]
    fn test_strict_policy_rejects_inconsistent_size() {
        let mut builder = ContainerBuilder::pcm16(44100, &tone(50));
        builder.declared_data_size = Some(999_999);
        let bytes = builder.build();

        let strict = WavFormatDecoder::new(SizePolicy::Strict);
        assert_eq!(
            strict.decode(&bytes, 44100),
            Err(DecodeError::InconsistentSize {
                declared: 999_999,
                available: 100
            })
        );
    }

    #[test]
    fn test_non_pcm_format_rejected() {
        let mut builder = ContainerBuilder::pcm16(44100, &tone(10));
        builder.format_code = 3;
        let bytes = builder.build();

        assert_eq!(
            decoder().decode(&bytes, 44100),
            Err(DecodeError::UnsupportedFormat { format_code: 3 })
        );
    }

    #[test]
    fn test_data_found_after_extended_fmt_and_padding() {
        let samples = tone(12);
        let mut builder = ContainerBuilder::pcm16(16000, &samples);
        builder.fmt_extra = vec![0, 0];
        builder.padding = b"LIST\x04\x00\x00\x00INFO\x00".to_vec();
        let bytes = builder.build();

        let (header, range) = decoder().decode(&bytes, 44100).unwrap();
        assert_eq!(header.sample_rate, 16000);
        assert_eq!(header.payload_offset, 44 + 2 + 13);
        assert_eq!(&bytes[range], pcm16_bytes(&samples).as_slice());
    }

    #[test]
    fn test_garbage_fmt_size_falls_back_to_minimal_fmt_end() {
        let samples = tone(12);
        let mut bytes = ContainerBuilder::pcm16(16000, &samples).build();
        bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());

        let (header, range) = decoder().decode(&bytes, 44100).unwrap();
        assert_eq!(header.payload_offset, 44);
        assert_eq!(&bytes[range], pcm16_bytes(&samples).as_slice());
    }

    #[test]
    fn test_find_chunk_bounds() {
        let bytes = b"xxxxdata\x00\x00\x00\x00";
        assert_eq!(find_chunk(bytes, b"data", 0), Some(4));
        assert_eq!(find_chunk(bytes, b"data", 5), None);
        assert_eq!(find_chunk(bytes, b"data", 1000), None);
        // Tag present but no room for its size field.
        assert_eq!(find_chunk(b"xxxxdata", b"data", 0), None);
        assert_eq!(find_chunk(b"", b"data", 0), None);
    }

    #[test]
    fn test_payload_range_always_in_bounds_for_mangled_input() {
        let base = ContainerBuilder::pcm16(44100, &tone(40)).build();
        let mut state: u32 = 0x1234_5678;
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            state
        };

        for _ in 0..2000 {
            let mut bytes = base.clone();
            let len = 44 + (next() as usize % (bytes.len() - 43));
            bytes.truncate(len);
            for _ in 0..4 {
                let idx = 12 + next() as usize % (bytes.len() - 12);
                bytes[idx] = next() as u8;
            }

            if let Ok((header, range)) = decoder().decode(&bytes, 44100) {
                assert!(range.end <= bytes.len());
                assert_eq!(range, header.payload_range());
            }
        }
    }

    #[test]
    fn test_duration_seconds() {
        let bytes = ContainerBuilder::pcm16(8000, &vec![0; 4000]).build();
        let (header, _) = decoder().decode(&bytes, 44100).unwrap();
        assert!((header.duration_seconds() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_decodes_container_from_independent_encoder() {
        let samples = tone(64);
        let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, 1, 22050, 16);
        let mut cursor = std::io::Cursor::new(Vec::new());
        wav::write(header, &wav::BitDepth::Sixteen(samples.clone()), &mut cursor).unwrap();
        let bytes = cursor.into_inner();

        let (decoded, range) = decoder().decode(&bytes, 44100).unwrap();
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.bits_per_sample, 16);
        assert!(!decoded.degraded);
        assert_eq!(&bytes[range], pcm16_bytes(&samples).as_slice());
    }
}
