//! Spectral feature extraction.
//!
//! Turns a mono analysis window into the fixed 58-value vector the
//! classifier was fitted on: six (mean, variance) spectral statistic
//! pairs followed by 20 cepstral coefficient (mean, variance) pairs,
//! zero padded to the schema width.

use std::sync::Arc;

use lazy_static::lazy_static;
use rustdct::{DctPlanner, TransformType2And3};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::audio::decoder::TARGET_SAMPLE_RATE;

/// STFT frame length in samples.
pub const FRAME_SIZE: usize = 2048;

/// STFT hop length in samples.
pub const HOP_SIZE: usize = 512;

/// Magnitude spectrum bins per frame (`FRAME_SIZE / 2 + 1`).
const N_BINS: usize = FRAME_SIZE / 2 + 1;

/// Mel filterbank resolution feeding the cepstral transform.
const N_MELS: usize = 128;

/// Cepstral coefficients kept per frame.
const N_MFCC: usize = 20;

/// Pitch classes in the chromagram.
const N_CHROMA: usize = 12;

/// Fraction of total spectral magnitude below the roll-off frequency.
const ROLLOFF_FRACTION: f32 = 0.85;

/// Floor applied before the dB log so silent mel bands stay finite.
const POWER_FLOOR: f32 = 1e-10;

/// Width of the feature vector the artifacts expect.
pub const FEATURE_DIM: usize = 58;

/// Version of the feature layout below. Bump when the field list or
/// analysis parameters change; persisted artifacts carry the width
/// this version defines.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Ordered field layout of the 58-value vector. Slots past the
/// computed statistics are reserved zero padding.
pub const FEATURE_FIELDS: [&str; FEATURE_DIM] = [
    "chroma_stft_mean",
    "chroma_stft_var",
    "rms_mean",
    "rms_var",
    "spectral_centroid_mean",
    "spectral_centroid_var",
    "spectral_bandwidth_mean",
    "spectral_bandwidth_var",
    "rolloff_mean",
    "rolloff_var",
    "zero_crossing_rate_mean",
    "zero_crossing_rate_var",
    "mfcc1_mean",
    "mfcc1_var",
    "mfcc2_mean",
    "mfcc2_var",
    "mfcc3_mean",
    "mfcc3_var",
    "mfcc4_mean",
    "mfcc4_var",
    "mfcc5_mean",
    "mfcc5_var",
    "mfcc6_mean",
    "mfcc6_var",
    "mfcc7_mean",
    "mfcc7_var",
    "mfcc8_mean",
    "mfcc8_var",
    "mfcc9_mean",
    "mfcc9_var",
    "mfcc10_mean",
    "mfcc10_var",
    "mfcc11_mean",
    "mfcc11_var",
    "mfcc12_mean",
    "mfcc12_var",
    "mfcc13_mean",
    "mfcc13_var",
    "mfcc14_mean",
    "mfcc14_var",
    "mfcc15_mean",
    "mfcc15_var",
    "mfcc16_mean",
    "mfcc16_var",
    "mfcc17_mean",
    "mfcc17_var",
    "mfcc18_mean",
    "mfcc18_var",
    "mfcc19_mean",
    "mfcc19_var",
    "mfcc20_mean",
    "mfcc20_var",
    "reserved_1",
    "reserved_2",
    "reserved_3",
    "reserved_4",
    "reserved_5",
    "reserved_6",
];

lazy_static! {
    static ref HANN_WINDOW: Vec<f32> = (0..FRAME_SIZE)
        .map(|i| {
            let t = 2.0 * std::f32::consts::PI * i as f32 / FRAME_SIZE as f32;
            0.5 * (1.0 - t.cos())
        })
        .collect();

    /// Center frequency of each FFT bin in Hz.
    static ref BIN_FREQS: Vec<f32> = (0..N_BINS)
        .map(|i| i as f32 * TARGET_SAMPLE_RATE as f32 / FRAME_SIZE as f32)
        .collect();

    /// `N_MELS x N_BINS` triangular mel filterbank, area normalized.
    static ref MEL_FILTERBANK: Vec<Vec<f32>> = mel_filterbank();

    /// FFT bin index to pitch class, bin 0 excluded.
    static ref BIN_PITCH_CLASS: Vec<usize> = (1..N_BINS)
        .map(|i| {
            let midi = 69.0 + 12.0 * (BIN_FREQS[i] / 440.0).log2();
            (midi.round() as i64).rem_euclid(12) as usize
        })
        .collect();
}

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("empty signal")]
    EmptySignal,
    #[error("non-finite value at feature index {0}")]
    NonFinite(usize),
}

/// A validated 58-value feature vector. Construction guarantees the
/// schema width and that every value is finite.
#[derive(Debug, Clone)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Pads or truncates `values` to [`FEATURE_DIM`] and checks
    /// finiteness. A width other than the schema's is logged because
    /// it points at an extraction bug, not bad input.
    pub fn assemble(mut values: Vec<f32>) -> Result<FeatureVector, FeatureError> {
        if values.len() != FEATURE_DIM {
            log::warn!(
                "Feature vector width {} != schema width {}, adjusting",
                values.len(),
                FEATURE_DIM
            );
        }
        values.resize(FEATURE_DIM, 0.0);
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(FeatureError::NonFinite(idx));
        }
        Ok(FeatureVector(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Stateless extractor holding the planned FFT and DCT transforms.
pub struct FeatureExtractor {
    fft: Arc<dyn Fft<f32>>,
    dct: Arc<dyn TransformType2And3<f32>>,
}

impl FeatureExtractor {
    pub fn new() -> FeatureExtractor {
        FeatureExtractor {
            fft: FftPlanner::new().plan_fft_forward(FRAME_SIZE),
            dct: DctPlanner::new().plan_dct2(N_MELS),
        }
    }

    /// Computes the 58-value vector from a mono window at
    /// [`TARGET_SAMPLE_RATE`]. Signals shorter than one frame are
    /// zero padded to a single frame.
    pub fn extract(&self, samples: &[f32]) -> Result<FeatureVector, FeatureError> {
        if samples.is_empty() {
            return Err(FeatureError::EmptySignal);
        }

        let mut chroma_series = Vec::new();
        let mut rms_series = Vec::new();
        let mut centroid_series = Vec::new();
        let mut bandwidth_series = Vec::new();
        let mut rolloff_series = Vec::new();
        let mut zcr_series = Vec::new();
        let mut mfcc_series: Vec<Vec<f32>> = vec![Vec::new(); N_MFCC];

        let mut frame = vec![0.0f32; FRAME_SIZE];
        let mut start = 0;
        loop {
            let end = (start + FRAME_SIZE).min(samples.len());
            frame[..end - start].copy_from_slice(&samples[start..end]);
            frame[end - start..].fill(0.0);

            rms_series.push(rms(&frame));
            zcr_series.push(zero_crossing_rate(&frame));

            let magnitude = self.magnitude_spectrum(&frame);
            let (centroid, bandwidth) = centroid_bandwidth(&magnitude);
            centroid_series.push(centroid);
            bandwidth_series.push(bandwidth);
            rolloff_series.push(rolloff(&magnitude));
            chroma_series.extend(chroma_frame(&magnitude));

            let mel_db = mel_energies_db(&magnitude);
            let coeffs = self.cepstral_coefficients(mel_db);
            for (band, &c) in coeffs.iter().enumerate() {
                mfcc_series[band].push(c);
            }

            start += HOP_SIZE;
            if start + FRAME_SIZE > samples.len() {
                break;
            }
        }

        let mut values = Vec::with_capacity(FEATURE_DIM);
        for series in [
            &chroma_series,
            &rms_series,
            &centroid_series,
            &bandwidth_series,
            &rolloff_series,
            &zcr_series,
        ] {
            let (mean, var) = mean_var(series);
            values.push(mean);
            values.push(var);
        }
        for band in &mfcc_series {
            let (mean, var) = mean_var(band);
            values.push(mean);
            values.push(var);
        }

        FeatureVector::assemble(values)
    }

    /// Windowed magnitude spectrum of one frame, `N_BINS` values.
    fn magnitude_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(HANN_WINDOW.iter())
            .map(|(&x, &w)| Complex::new(x * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);
        buffer[..N_BINS].iter().map(|c| c.norm()).collect()
    }

    /// Mel energies -> dB -> orthonormal DCT-II, first [`N_MFCC`]
    /// coefficients.
    fn cepstral_coefficients(&self, mut mel_db: Vec<f32>) -> Vec<f32> {
        self.dct.process_dct2(&mut mel_db);
        // Orthonormal scaling matching the transform the artifacts
        // were fitted with.
        let n = N_MELS as f32;
        mel_db[0] *= (1.0 / n).sqrt();
        for v in mel_db.iter_mut().skip(1) {
            *v *= (2.0 / n).sqrt();
        }
        mel_db.truncate(N_MFCC);
        mel_db
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        FeatureExtractor::new()
    }
}

fn rms(frame: &[f32]) -> f32 {
    let sum_sq: f32 = frame.iter().map(|&x| x * x).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

fn zero_crossing_rate(frame: &[f32]) -> f32 {
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / frame.len() as f32
}

/// Magnitude-weighted mean frequency and the spread around it.
fn centroid_bandwidth(magnitude: &[f32]) -> (f32, f32) {
    let total: f32 = magnitude.iter().sum();
    if total <= 0.0 {
        return (0.0, 0.0);
    }
    let centroid: f32 = magnitude
        .iter()
        .zip(BIN_FREQS.iter())
        .map(|(&m, &f)| m * f)
        .sum::<f32>()
        / total;
    let spread: f32 = magnitude
        .iter()
        .zip(BIN_FREQS.iter())
        .map(|(&m, &f)| m * (f - centroid) * (f - centroid))
        .sum::<f32>()
        / total;
    (centroid, spread.sqrt())
}

/// Lowest frequency below which [`ROLLOFF_FRACTION`] of the total
/// magnitude lies.
fn rolloff(magnitude: &[f32]) -> f32 {
    let total: f32 = magnitude.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let threshold = ROLLOFF_FRACTION * total;
    let mut cumulative = 0.0;
    for (i, &m) in magnitude.iter().enumerate() {
        cumulative += m;
        if cumulative >= threshold {
            return BIN_FREQS[i];
        }
    }
    BIN_FREQS[N_BINS - 1]
}

/// Per-frame chromagram column: bin energies pooled by pitch class,
/// normalized by the column maximum.
fn chroma_frame(magnitude: &[f32]) -> [f32; N_CHROMA] {
    let mut chroma = [0.0f32; N_CHROMA];
    for (i, &m) in magnitude.iter().enumerate().skip(1) {
        chroma[BIN_PITCH_CLASS[i - 1]] += m * m;
    }
    let max = chroma.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        for v in chroma.iter_mut() {
            *v /= max;
        }
    }
    chroma
}

/// Mel band energies of one frame in dB.
fn mel_energies_db(magnitude: &[f32]) -> Vec<f32> {
    let power: Vec<f32> = magnitude.iter().map(|&m| m * m).collect();
    MEL_FILTERBANK
        .iter()
        .map(|filter| {
            let energy: f32 = filter
                .iter()
                .zip(power.iter())
                .map(|(&w, &p)| w * p)
                .sum();
            10.0 * energy.max(POWER_FLOOR).log10()
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank over the analysis band, with each filter
/// scaled to unit area so wider high-frequency triangles do not
/// dominate the cepstrum.
fn mel_filterbank() -> Vec<Vec<f32>> {
    let nyquist = TARGET_SAMPLE_RATE as f32 / 2.0;
    let mel_max = hz_to_mel(nyquist);
    let points: Vec<f32> = (0..N_MELS + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (N_MELS + 1) as f32))
        .collect();

    let mut filterbank = Vec::with_capacity(N_MELS);
    for m in 0..N_MELS {
        let (lower, center, upper) = (points[m], points[m + 1], points[m + 2]);
        let norm = 2.0 / (upper - lower);
        let filter: Vec<f32> = BIN_FREQS
            .iter()
            .map(|&f| {
                let w = if f <= lower || f >= upper {
                    0.0
                } else if f <= center {
                    (f - lower) / (center - lower)
                } else {
                    (upper - f) / (upper - center)
                };
                w * norm
            })
            .collect();
        filterbank.push(filter);
    }
    filterbank
}

/// Population mean and variance with f64 accumulation.
fn mean_var(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean as f32, var as f32)
}
