use std::f64::consts::PI;

use crate::{ExtractError, Extractor};

/// Configures the spectral embedding extractor.
///
/// Defaults target 16kHz mono speech: 25ms frames with 10ms shift and
/// 256 mel-spaced analysis bands between 60 Hz and Nyquist - 200 Hz.
#[derive(Debug, Clone)]
pub struct SpectralConfig {
    /// Input sample rate in Hz (default: 16000).
    pub sample_rate: usize,
    /// Number of mel-spaced analysis bands; equals the embedding
    /// dimension (default: 256).
    pub num_bands: usize,
    /// Frame length in samples (default: 400 = 25ms @ 16kHz).
    pub frame_length: usize,
    /// Frame shift in samples (default: 160 = 10ms @ 16kHz).
    pub frame_shift: usize,
    /// Low cutoff frequency for the band centers (default: 60 Hz).
    pub low_freq: f64,
    /// High cutoff frequency, negative = offset from Nyquist
    /// (default: -200).
    pub high_freq: f64,
    /// Floor for log energy (default: 1e-10).
    pub energy_floor: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            num_bands: 256,
            frame_length: 400, // 25ms @ 16kHz
            frame_shift: 160,  // 10ms @ 16kHz
            low_freq: 60.0,
            high_freq: -200.0, // Nyquist - 200 = 7800 Hz for 16kHz
            energy_floor: 1e-10,
        }
    }
}

/// Deterministic spectral embedding extractor.
///
/// Per frame: Hann window, then Goertzel band power at each mel-spaced
/// center frequency. Band log-energies are averaged over all frames and
/// the result is L2-normalized. No randomness and no model state, so the
/// same clip always maps to the same vector.
///
/// This is a long-term spectral profile, not a trained voiceprint; it
/// separates voices by pitch and timbre well enough to drive a registry
/// but carries no robustness to channel or noise conditions.
pub struct SpectralExtractor {
    cfg: SpectralConfig,
    /// Precomputed band center frequencies in Hz, mel-spaced.
    centers: Vec<f64>,
    /// Precomputed Hann window of `cfg.frame_length` samples.
    window: Vec<f64>,
}

impl SpectralExtractor {
    /// Creates an extractor, validating the config.
    pub fn new(cfg: SpectralConfig) -> Result<Self, ExtractError> {
        if cfg.sample_rate == 0 {
            return Err(ExtractError::Config("sample_rate must be > 0".into()));
        }
        if cfg.num_bands == 0 {
            return Err(ExtractError::Config("num_bands must be > 0".into()));
        }
        if cfg.frame_length == 0 || cfg.frame_shift == 0 {
            return Err(ExtractError::Config(
                "frame_length and frame_shift must be > 0".into(),
            ));
        }
        let high = resolve_high_freq(&cfg);
        if cfg.low_freq < 0.0 || high <= cfg.low_freq {
            return Err(ExtractError::Config(format!(
                "invalid band range: {} .. {high} Hz",
                cfg.low_freq
            )));
        }
        let centers = band_centers(cfg.num_bands, cfg.low_freq, high);
        let window = hann_window(cfg.frame_length);
        Ok(Self { cfg, centers, window })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &SpectralConfig {
        &self.cfg
    }

    /// Sample rate the extractor expects, in Hz.
    pub fn sample_rate(&self) -> usize {
        self.cfg.sample_rate
    }
}

impl Default for SpectralExtractor {
    fn default() -> Self {
        let cfg = SpectralConfig::default();
        let high = resolve_high_freq(&cfg);
        let centers = band_centers(cfg.num_bands, cfg.low_freq, high);
        let window = hann_window(cfg.frame_length);
        Self { cfg, centers, window }
    }
}

impl Extractor for SpectralExtractor {
    fn extract(&self, samples: &[f32]) -> Result<Vec<f32>, ExtractError> {
        if samples.len() < self.cfg.frame_length {
            return Err(ExtractError::AudioTooShort {
                min_samples: self.cfg.frame_length,
                got_samples: samples.len(),
            });
        }
        if let Some(i) = samples.iter().position(|s| !s.is_finite()) {
            return Err(ExtractError::InvalidAudio(format!(
                "non-finite sample at index {i}"
            )));
        }

        let num_frames = (samples.len() - self.cfg.frame_length) / self.cfg.frame_shift + 1;
        let mut acc = vec![0.0f64; self.cfg.num_bands];
        let mut frame = vec![0.0f64; self.cfg.frame_length];

        for f in 0..num_frames {
            let offset = f * self.cfg.frame_shift;
            for (i, w) in self.window.iter().enumerate() {
                frame[i] = samples[offset + i] as f64 * w;
            }
            for (b, &freq) in self.centers.iter().enumerate() {
                let mut power = goertzel_power(&frame, self.cfg.sample_rate, freq);
                if power < self.cfg.energy_floor {
                    power = self.cfg.energy_floor;
                }
                acc[b] += power.ln();
            }
        }

        let scale = 1.0 / num_frames as f64;
        let mut embedding: Vec<f32> = acc.iter().map(|&e| (e * scale) as f32).collect();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.cfg.num_bands
    }
}

/// L2-normalizes a vector to unit length in-place.
/// Uses f64 intermediate precision.
pub fn l2_normalize(v: &mut [f32]) {
    let mut norm: f64 = 0.0;
    for &x in v.iter() {
        norm += (x as f64) * (x as f64);
    }
    norm = norm.sqrt();
    if norm > 0.0 {
        let scale = (1.0 / norm) as f32;
        for x in v.iter_mut() {
            *x *= scale;
        }
    }
}

fn resolve_high_freq(cfg: &SpectralConfig) -> f64 {
    if cfg.high_freq <= 0.0 {
        cfg.sample_rate as f64 / 2.0 + cfg.high_freq
    } else {
        cfg.high_freq
    }
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0)
}

/// Mel-spaced band center frequencies: `n` interior points of a
/// uniform mel grid over `[low, high]`.
fn band_centers(n: usize, low: f64, high: f64) -> Vec<f64> {
    let mel_low = hz_to_mel(low);
    let mel_high = hz_to_mel(high);
    (0..n)
        .map(|i| {
            let mel = mel_low + (i + 1) as f64 * (mel_high - mel_low) / (n + 1) as f64;
            mel_to_hz(mel)
        })
        .collect()
}

fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Goertzel filter power of `frame` at `freq` Hz.
/// Single-bin DFT magnitude squared, O(frame) per band.
fn goertzel_power(frame: &[f64], sample_rate: usize, freq: f64) -> f64 {
    let omega = 2.0 * PI * freq / sample_rate as f64;
    let coeff = 2.0 * omega.cos();
    let mut s_prev = 0.0f64;
    let mut s_prev2 = 0.0f64;
    for &x in frame {
        let s = x + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }
    s_prev * s_prev + s_prev2 * s_prev2 - coeff * s_prev * s_prev2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tone(freq_hz: f64, n_samples: usize, sample_rate: usize) -> Vec<f32> {
        (0..n_samples)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (0.5 * (freq_hz * 2.0 * PI * t).sin()) as f32
            })
            .collect()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f64 {
        let mut dot = 0.0f64;
        let mut na = 0.0f64;
        let mut nb = 0.0f64;
        for (&x, &y) in a.iter().zip(b.iter()) {
            dot += x as f64 * y as f64;
            na += x as f64 * x as f64;
            nb += y as f64 * y as f64;
        }
        dot / (na.sqrt() * nb.sqrt())
    }

    #[test]
    fn config_default() {
        let cfg = SpectralConfig::default();
        assert_eq!(cfg.sample_rate, 16000);
        assert_eq!(cfg.num_bands, 256);
        assert_eq!(cfg.frame_length, 400);
        assert_eq!(cfg.frame_shift, 160);
    }

    #[test]
    fn rejects_zero_bands() {
        let cfg = SpectralConfig {
            num_bands: 0,
            ..SpectralConfig::default()
        };
        assert!(matches!(
            SpectralExtractor::new(cfg),
            Err(ExtractError::Config(_))
        ));
    }

    #[test]
    fn rejects_inverted_band_range() {
        let cfg = SpectralConfig {
            low_freq: 8000.0,
            high_freq: 4000.0,
            ..SpectralConfig::default()
        };
        assert!(matches!(
            SpectralExtractor::new(cfg),
            Err(ExtractError::Config(_))
        ));
    }

    #[test]
    fn too_short_fails() {
        let ex = SpectralExtractor::default();
        // 100 samples, need 400 for one frame.
        let err = ex.extract(&vec![0.0f32; 100]).unwrap_err();
        match err {
            ExtractError::AudioTooShort {
                min_samples,
                got_samples,
            } => {
                assert_eq!(min_samples, 400);
                assert_eq!(got_samples, 100);
            }
            other => panic!("expected AudioTooShort, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_finite_samples() {
        let ex = SpectralExtractor::default();
        let mut samples = vec![0.0f32; 800];
        samples[123] = f32::NAN;
        assert!(matches!(
            ex.extract(&samples),
            Err(ExtractError::InvalidAudio(_))
        ));
    }

    #[test]
    fn dimension_matches_bands() {
        let cfg = SpectralConfig {
            num_bands: 32,
            ..SpectralConfig::default()
        };
        let ex = SpectralExtractor::new(cfg).unwrap();
        assert_eq!(ex.dimension(), 32);
        let emb = ex.extract(&make_tone(440.0, 1600, 16000)).unwrap();
        assert_eq!(emb.len(), 32);
    }

    #[test]
    fn silence_gives_uniform_unit_vector() {
        let ex = SpectralExtractor::default();
        // All-zero frames floor to the same log energy in every band,
        // so after normalization every component is 1/sqrt(n).
        let emb = ex.extract(&vec![0.0f32; 1600]).unwrap();
        let norm: f64 = emb.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        let first = emb[0];
        assert!(emb.iter().all(|&x| (x - first).abs() < 1e-6));
    }

    #[test]
    fn deterministic() {
        let ex = SpectralExtractor::default();
        let audio = make_tone(330.0, 16000, 16000);
        let a = ex.extract(&audio).unwrap();
        let b = ex.extract(&audio).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_tones_diverge() {
        let ex = SpectralExtractor::default();
        let a = ex.extract(&make_tone(220.0, 16000, 16000)).unwrap();
        let b = ex.extract(&make_tone(1760.0, 16000, 16000)).unwrap();
        let sim = cosine(&a, &b);
        assert!(sim < 0.999, "tones an octave apart should differ, sim={sim}");

        // Same tone re-extracted stays at similarity 1.
        let a2 = ex.extract(&make_tone(220.0, 16000, 16000)).unwrap();
        let self_sim = cosine(&a, &a2);
        assert!((self_sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn band_centers_span_range() {
        let centers = band_centers(16, 100.0, 8000.0);
        assert_eq!(centers.len(), 16);
        assert!(centers[0] > 100.0);
        assert!(centers[15] < 8000.0);
        // Strictly increasing.
        assert!(centers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn mel_hz_roundtrip() {
        for &hz in &[0.0, 100.0, 440.0, 1000.0, 8000.0] {
            let mel = hz_to_mel(hz);
            let back = mel_to_hz(mel);
            assert!((hz - back).abs() < 1e-6, "roundtrip failed for {hz}: got {back}");
        }
    }

    #[test]
    fn goertzel_peaks_at_target_freq() {
        let sr = 16000;
        let frame: Vec<f64> = (0..400)
            .map(|i| (1000.0 * 2.0 * PI * i as f64 / sr as f64).sin())
            .collect();
        let on_target = goertzel_power(&frame, sr, 1000.0);
        let off_target = goertzel_power(&frame, sr, 3000.0);
        assert!(
            on_target > off_target * 10.0,
            "expected a sharp peak: on={on_target} off={off_target}"
        );
    }

    #[test]
    fn l2_normalize_unit() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero() {
        let mut v = vec![0.0f32, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
