//! Minimal RIFF/WAVE intake for the CLI and the HTTP surface.
//!
//! Only the encodings the service accepts: 16-bit PCM and 32-bit IEEE
//! float, mono or stereo. Stereo is averaged down to mono. No resampling;
//! callers check the sample rate against the extractor's configured rate.

use anyhow::{Context, Result, bail};

const CODEC_PCM: u16 = 1;
const CODEC_FLOAT: u16 = 3;

/// Decoded audio: samples already mono, scaled to [-1, 1].
#[derive(Debug)]
pub struct WavAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

struct Format {
    codec: u16,
    channels: u16,
    sample_rate: u32,
}

/// Parses a RIFF/WAVE buffer.
///
/// Layout: `RIFF` header, then a sequence of `[4B id][4B size][data]`
/// chunks, word-aligned (odd sizes carry one pad byte). Chunks other than
/// `fmt ` and `data` (LIST, fact, cue ...) are skipped. All multi-byte
/// fields are little-endian.
pub fn decode(bytes: &[u8]) -> Result<WavAudio> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        bail!("not a RIFF/WAVE file");
    }

    let mut fmt: Option<Format> = None;
    let mut data: Option<&[u8]> = None;

    let mut off = 12usize;
    while off + 8 <= bytes.len() {
        let id = &bytes[off..off + 4];
        let size = u32::from_le_bytes([
            bytes[off + 4],
            bytes[off + 5],
            bytes[off + 6],
            bytes[off + 7],
        ]) as usize;
        let start = off + 8;
        // Streaming writers declare oversized lengths; clamp to the buffer.
        let end = start.saturating_add(size).min(bytes.len());

        match id {
            b"fmt " => fmt = Some(parse_fmt(&bytes[start..end])?),
            b"data" => data = Some(&bytes[start..end]),
            _ => {}
        }
        off = start.saturating_add(size + (size & 1));
    }

    let fmt = fmt.context("missing fmt chunk")?;
    let data = data.context("missing data chunk")?;

    Ok(WavAudio {
        samples: decode_samples(&fmt, data),
        sample_rate: fmt.sample_rate,
    })
}

fn parse_fmt(chunk: &[u8]) -> Result<Format> {
    if chunk.len() < 16 {
        bail!("fmt chunk too short: {} bytes", chunk.len());
    }
    let codec = u16::from_le_bytes([chunk[0], chunk[1]]);
    let channels = u16::from_le_bytes([chunk[2], chunk[3]]);
    let sample_rate = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
    let bits = u16::from_le_bytes([chunk[14], chunk[15]]);

    match (codec, bits) {
        (CODEC_PCM, 16) | (CODEC_FLOAT, 32) => {}
        _ => bail!(
            "unsupported encoding: format {} at {} bits (want PCM16 or float32)",
            codec,
            bits
        ),
    }
    if channels == 0 || channels > 2 {
        bail!("unsupported channel count {} (want mono or stereo)", channels);
    }
    if sample_rate == 0 {
        bail!("sample rate is zero");
    }
    Ok(Format {
        codec,
        channels,
        sample_rate,
    })
}

fn decode_samples(fmt: &Format, data: &[u8]) -> Vec<f32> {
    let interleaved: Vec<f32> = match fmt.codec {
        CODEC_PCM => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect(),
        _ => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    };
    if fmt.channels == 2 {
        interleaved
            .chunks_exact(2)
            .map(|pair| (pair[0] + pair[1]) * 0.5)
            .collect()
    } else {
        interleaved
    }
}
