//! Log mel filterbank feature extraction.
//!
//! The arithmetic here is parity-sensitive: other implementations of the
//! same pipeline must reproduce these features bit-for-bit within float
//! tolerance, so accumulation is done in `f64` in ascending index order and
//! the processing order is fixed: decode, pre-emphasis over the whole
//! signal, per-frame window/FFT/power/mel/log.

use std::f64::consts::PI;

/// Mel filterbank extraction parameters.
#[derive(Debug, Clone)]
pub struct FbankConfig {
    /// Input sample rate in Hz.
    pub sample_rate: usize,
    /// Mel channel count.
    pub num_mels: usize,
    /// Frame length in samples (400 = 25 ms @ 16 kHz).
    pub frame_length: usize,
    /// Frame shift in samples (160 = 10 ms @ 16 kHz).
    pub frame_shift: usize,
    /// Pre-emphasis coefficient.
    pub pre_emphasis: f64,
    /// Floor applied to mel energies before the log.
    pub energy_floor: f64,
}

impl Default for FbankConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            num_mels: 80,
            frame_length: 400,
            frame_shift: 160,
            pre_emphasis: 0.97,
            energy_floor: 1e-10,
        }
    }
}

/// Extracts log mel filterbank features from PCM16 little-endian audio.
///
/// Returns `[num_frames][num_mels]` energies, or `None` when the audio is
/// shorter than one frame (or the config is degenerate).
pub fn compute_fbank(audio: &[u8], cfg: &FbankConfig) -> Option<Vec<Vec<f32>>> {
    if cfg.frame_length == 0 || cfg.frame_shift == 0 || cfg.num_mels == 0 || cfg.sample_rate == 0 {
        return None;
    }

    let n_samples = audio.len() / 2;
    if n_samples < cfg.frame_length {
        return None;
    }
    let mut samples = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let s = i16::from_le_bytes([audio[2 * i], audio[2 * i + 1]]);
        samples.push(s as f64);
    }

    // Pre-emphasis over the whole signal, descending so each step reads the
    // original previous sample.
    if cfg.pre_emphasis > 0.0 {
        for i in (1..samples.len()).rev() {
            samples[i] -= cfg.pre_emphasis * samples[i - 1];
        }
        samples[0] *= 1.0 - cfg.pre_emphasis;
    }

    let num_frames = (n_samples - cfg.frame_length) / cfg.frame_shift + 1;
    let fft_size = next_pow2(cfg.frame_length);
    let half_fft = fft_size / 2 + 1;

    let window = hamming_window(cfg.frame_length);
    let filterbank = mel_filterbank(cfg.num_mels, fft_size, cfg.sample_rate);

    let mut features = Vec::with_capacity(num_frames);
    let mut fft_buf = vec![(0.0f64, 0.0f64); fft_size];
    let mut power = vec![0.0f64; half_fft];

    for f in 0..num_frames {
        let offset = f * cfg.frame_shift;

        for slot in fft_buf.iter_mut() {
            *slot = (0.0, 0.0);
        }
        for i in 0..cfg.frame_length {
            fft_buf[i] = (samples[offset + i] * window[i], 0.0);
        }

        fft(&mut fft_buf);

        for (k, slot) in power.iter_mut().enumerate() {
            let (re, im) = fft_buf[k];
            *slot = re * re + im * im;
        }

        let mut frame = vec![0.0f32; cfg.num_mels];
        for (m, filter) in filterbank.iter().enumerate() {
            let mut energy = 0.0f64;
            for (k, &w) in filter.iter().enumerate() {
                energy += w * power[k];
            }
            if energy < cfg.energy_floor {
                energy = cfg.energy_floor;
            }
            frame[m] = energy.ln() as f32;
        }
        features.push(frame);
    }

    Some(features)
}

/// Cepstral mean and variance normalization: per mel bin over all frames,
/// subtract the mean and divide by the standard deviation (floored at
/// 1e-10).
pub fn cmvn(features: &mut [Vec<f32>]) {
    if features.is_empty() {
        return;
    }
    let num_mels = features[0].len();
    let t = features.len() as f64;

    for m in 0..num_mels {
        let mut sum = 0.0f64;
        for frame in features.iter() {
            sum += frame[m] as f64;
        }
        let mean = sum / t;

        let mut var_sum = 0.0f64;
        for frame in features.iter() {
            let d = frame[m] as f64 - mean;
            var_sum += d * d;
        }
        let mut std = (var_sum / t).sqrt();
        if std < 1e-10 {
            std = 1e-10;
        }

        for frame in features.iter_mut() {
            frame[m] = ((frame[m] as f64 - mean) / std) as f32;
        }
    }
}

/// Scales `v` to unit L2 length in place. Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let mut norm = 0.0f64;
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

fn next_pow2(n: usize) -> usize {
    let mut p = 1;
    while p < n {
        p <<= 1;
    }
    p
}

fn hamming_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filters spanning 0 Hz to Nyquist: `[num_mels][half_fft]`.
fn mel_filterbank(num_mels: usize, fft_size: usize, sample_rate: usize) -> Vec<Vec<f64>> {
    let half_fft = fft_size / 2 + 1;
    let mel_high = hz_to_mel(sample_rate as f64 / 2.0);

    let bin_of = |idx: usize| -> usize {
        let mel = idx as f64 * mel_high / (num_mels + 1) as f64;
        let hz = mel_to_hz(mel);
        let bin = (hz * fft_size as f64 / sample_rate as f64).floor() as isize;
        bin.clamp(0, half_fft as isize - 1) as usize
    };

    let mut fb = Vec::with_capacity(num_mels);
    for m in 0..num_mels {
        let left = bin_of(m);
        let center = bin_of(m + 1);
        let right = bin_of(m + 2);

        let mut filter = vec![0.0f64; half_fft];
        if center > left {
            for k in left..=center {
                filter[k] = (k - left) as f64 / (center - left) as f64;
            }
        }
        if right > center {
            for k in center..=right {
                filter[k] = (right - k) as f64 / (right - center) as f64;
            }
        }
        fb.push(filter);
    }
    fb
}

/// In-place radix-2 Cooley-Tukey FFT over `(re, im)` pairs. The length must
/// be a power of two.
fn fft(x: &mut [(f64, f64)]) {
    let n = x.len();
    if n <= 1 {
        return;
    }

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            x.swap(i, j);
        }
    }

    let mut size = 2;
    while size <= n {
        let half = size / 2;
        let angle = -2.0 * PI / size as f64;
        let wn = (angle.cos(), angle.sin());
        let mut start = 0;
        while start < n {
            let mut w = (1.0f64, 0.0f64);
            for k in 0..half {
                let a = x[start + k];
                let b = x[start + k + half];
                let t = (w.0 * b.0 - w.1 * b.1, w.0 * b.1 + w.1 * b.0);
                x[start + k] = (a.0 + t.0, a.1 + t.1);
                x[start + k + half] = (a.0 - t.0, a.1 - t.1);
                w = (w.0 * wn.0 - w.1 * wn.1, w.0 * wn.1 + w.1 * wn.0);
            }
            start += size;
        }
        size <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_pcm(freq_hz: f64, n_samples: usize, amplitude: f64) -> Vec<u8> {
        let mut audio = vec![0u8; n_samples * 2];
        for i in 0..n_samples {
            let t = i as f64 / 16_000.0;
            let s = (amplitude * (freq_hz * 2.0 * PI * t).sin()) as i16;
            audio[2 * i..2 * i + 2].copy_from_slice(&s.to_le_bytes());
        }
        audio
    }

    #[test]
    fn too_short_audio_is_none() {
        let cfg = FbankConfig::default();
        assert!(compute_fbank(&vec![0u8; 2 * 399], &cfg).is_none());
        assert!(compute_fbank(&[], &cfg).is_none());
    }

    #[test]
    fn frame_count_and_shape() {
        let cfg = FbankConfig::default();
        // 800 samples: (800 - 400) / 160 + 1 = 3 frames.
        let features = compute_fbank(&vec![0u8; 1600], &cfg).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].len(), 80);
    }

    #[test]
    fn tone_produces_varied_energies() {
        let cfg = FbankConfig::default();
        let audio = sine_pcm(440.0, 6400, 16_000.0);
        let features = compute_fbank(&audio, &cfg).unwrap();
        // (6400 - 400) / 160 + 1
        assert_eq!(features.len(), 38);

        let frame = &features[10];
        assert!(frame.windows(2).any(|w| (w[0] - w[1]).abs() > 0.01));
    }

    #[test]
    fn silence_hits_energy_floor() {
        let cfg = FbankConfig::default();
        let features = compute_fbank(&vec![0u8; 1600], &cfg).unwrap();
        let expected = (1e-10f64).ln() as f32;
        for frame in &features {
            for &v in frame {
                assert!((v - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn cmvn_zero_mean_unit_std() {
        let cfg = FbankConfig::default();
        let audio = sine_pcm(440.0, 6400, 16_000.0);
        let mut features = compute_fbank(&audio, &cfg).unwrap();
        cmvn(&mut features);

        let t = features.len() as f64;
        for m in 0..80 {
            let mean: f64 = features.iter().map(|f| f[m] as f64).sum::<f64>() / t;
            let var: f64 = features
                .iter()
                .map(|f| {
                    let d = f[m] as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / t;
            assert!(mean.abs() < 1e-5, "mel {m} mean {mean}");
            assert!((var.sqrt() - 1.0).abs() < 1e-5, "mel {m} std {}", var.sqrt());
        }
    }

    #[test]
    fn l2_normalize_basics() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0f32; 4];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
    }

    #[test]
    fn fft_impulse_is_flat() {
        let mut buf = vec![(0.0, 0.0); 8];
        buf[0] = (1.0, 0.0);
        fft(&mut buf);
        for (re, im) in &buf {
            assert!((re - 1.0).abs() < 1e-12);
            assert!(im.abs() < 1e-12);
        }
    }

    #[test]
    fn fft_parseval() {
        let n = 16;
        let mut buf: Vec<(f64, f64)> = (0..n)
            .map(|i| ((2.0 * PI * i as f64 / n as f64).sin(), 0.0))
            .collect();
        let time_energy: f64 = buf.iter().map(|(r, i)| r * r + i * i).sum();
        fft(&mut buf);
        let freq_energy: f64 = buf.iter().map(|(r, i)| r * r + i * i).sum();
        assert!((time_energy * n as f64 - freq_energy).abs() < 1e-8);
    }

    #[test]
    fn mel_hz_round_trip() {
        for &hz in &[0.0, 100.0, 440.0, 1000.0, 8000.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((hz - back).abs() < 1e-6);
        }
    }

    #[test]
    fn deterministic_across_runs() {
        let cfg = FbankConfig::default();
        let audio = sine_pcm(440.0, 6400, 16_000.0);
        let a = compute_fbank(&audio, &cfg).unwrap();
        let b = compute_fbank(&audio, &cfg).unwrap();
        assert_eq!(a, b);
    }
}
