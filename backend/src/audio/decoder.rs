//! Audio decoding for the analysis window.
//!
//! Decodes the first seconds of an uploaded file to mono f32 PCM with
//! symphonia, then resamples to the analysis rate with rubato. Only the
//! analysis window is decoded; packets past it are never read.

use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Analysis sample rate in Hz. Artifacts were fitted on features
/// extracted at this rate.
pub const TARGET_SAMPLE_RATE: u32 = 22_050;

/// Length of the analysis window in seconds.
pub const ANALYSIS_SECONDS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to open audio file: {0}")]
    Open(#[from] std::io::Error),
    #[error("unrecognized audio format: {0}")]
    Probe(symphonia::core::errors::Error),
    #[error("no audio track found")]
    NoTrack,
    #[error("sample rate unknown")]
    UnknownSampleRate,
    #[error("failed to decode packet: {0}")]
    Decode(symphonia::core::errors::Error),
    #[error("resampling failed: {0}")]
    Resample(String),
    #[error("decoded stream contained no samples")]
    Empty,
}

/// Decodes up to the first [`ANALYSIS_SECONDS`] of `path` to mono
/// samples at [`TARGET_SAMPLE_RATE`] Hz.
///
/// Shorter files yield shorter sample vectors; that is not an error.
/// Any probe or packet failure fails the whole decode, there is no
/// partial result.
pub fn decode_window(path: &Path) -> Result<Vec<f32>, DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(DecodeError::Probe)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::UnknownSampleRate)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(DecodeError::Decode)?;

    let window_frames = source_rate as usize * ANALYSIS_SECONDS;
    let mut mono: Vec<f32> = Vec::with_capacity(window_frames);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channel_count = 1usize;

    loop {
        if mono.len() >= window_frames {
            break;
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(DecodeError::Decode(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet).map_err(DecodeError::Decode)?;

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channel_count = spec.channels.count().max(1);
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            for frame in buf.samples().chunks_exact(channel_count) {
                mono.push(frame.iter().sum::<f32>() / channel_count as f32);
            }
        }
    }

    mono.truncate(window_frames);
    if mono.is_empty() {
        return Err(DecodeError::Empty);
    }

    log::debug!(
        "Decoded {} mono frames at {} Hz from {}",
        mono.len(),
        source_rate,
        path.display()
    );

    if source_rate == TARGET_SAMPLE_RATE {
        return Ok(mono);
    }

    let mut resampled = resample_mono(mono, source_rate)?;
    resampled.truncate(TARGET_SAMPLE_RATE as usize * ANALYSIS_SECONDS);
    Ok(resampled)
}

/// Single-pass sinc resample of a mono signal to [`TARGET_SAMPLE_RATE`].
fn resample_mono(samples: Vec<f32>, source_rate: u32) -> Result<Vec<f32>, DecodeError> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = TARGET_SAMPLE_RATE as f64 / source_rate as f64;
    let num_frames = samples.len();

    // Chunk size equals the input length so one process() call covers
    // the whole window.
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let output = resampler
        .process(&[samples], None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    output.into_iter().next().ok_or(DecodeError::Empty)
}
