//! Builders for synthetic RIFF/WAVE response chunks used across the audio tests.

/// Assembles a container byte-for-byte, with knobs for each kind of damage the
/// decoder is expected to tolerate.
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    pub fmt_tag: [u8; 4],
    pub format_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub fmt_extra: Vec<u8>,
    pub padding: Vec<u8>,
    pub declared_data_size: Option<i32>,
    pub riff_size: Option<u32>,
    pub payload: Vec<u8>,
}

impl ContainerBuilder {
    pub fn pcm16(sample_rate: u32, samples: &[i16]) -> Self {
        Self {
            fmt_tag: *b"fmt ",
            format_code: 1,
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            fmt_extra: Vec::new(),
            padding: Vec::new(),
            declared_data_size: None,
            riff_size: None,
            payload: pcm16_bytes(samples),
        }
    }

    pub fn pcm8(sample_rate: u32, payload: Vec<u8>) -> Self {
        Self {
            bits_per_sample: 8,
            payload,
            ..Self::pcm16(sample_rate, &[])
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let block_align = self.channels * (self.bits_per_sample / 8);
        let byte_rate = self.sample_rate * block_align as u32;
        let fmt_size = 16 + self.fmt_extra.len() as u32;
        let data_size = self
            .declared_data_size
            .unwrap_or(self.payload.len() as i32);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&self.fmt_tag);
        out.extend_from_slice(&fmt_size.to_le_bytes());
        out.extend_from_slice(&self.format_code.to_le_bytes());
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        out.extend_from_slice(&self.fmt_extra);
        out.extend_from_slice(&self.padding);
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_size.to_le_bytes());
        out.extend_from_slice(&self.payload);

        let riff_size = self.riff_size.unwrap_or(out.len() as u32 - 8);
        out[4..8].copy_from_slice(&riff_size.to_le_bytes());
        out
    }
}

pub fn pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Deterministic test tone, amplitude 10000.
pub fn tone(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| ((i as f32 * 0.05).sin() * 10000.0) as i16)
        .collect()
}

/// A complete 16-bit mono data chunk carrying `samples`.
pub fn pcm16_chunk(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    ContainerBuilder::pcm16(sample_rate, samples).build()
}
