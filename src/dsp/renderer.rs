//! Offline renderer — runs a snippet without a host and encodes the result as WAV.

use crate::config::EngineConfig;
use crate::error::RenderError;

use super::engine::Engine;

/// Longest offline render, in frames.
pub const MAX_RENDER_FRAMES: usize = 1 << 26;

/// Render `seconds` of `source` to mono f64 samples on a fresh engine.
pub fn render_samples(source: &str, config: EngineConfig, seconds: f64) -> Result<Vec<f64>, RenderError> {
    let mut engine = Engine::new(config);
    let frames = (seconds * engine.sample_rate()).round();
    if !(0.0..=MAX_RENDER_FRAMES as f64).contains(&frames) {
        return Err(RenderError::InvalidDuration(seconds));
    }
    engine.load(source)?;
    Ok(engine.render(frames as usize))
}

/// Render `seconds` of `source` to a 16-bit mono WAV file as bytes.
pub fn render_wav(source: &str, sample_rate: u32, seconds: f64) -> Result<Vec<u8>, RenderError> {
    let config = EngineConfig::with_sample_rate(f64::from(sample_rate));
    let samples = render_samples(source, config, seconds)?;
    Ok(encode_wav(&to_pcm_i16(&samples), sample_rate, 1))
}

/// Convert to 16-bit PCM, clipping at full scale.
pub fn to_pcm_i16(samples: &[f64]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32767.0).round().clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINE: &str = "this.t += 1/44100\nreturn Math.sin(2 * Math.PI * 440 * this.t)";

    #[test]
    fn wav_header_valid() {
        let wav = render_wav(SINE, 44100, 0.01).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 44100);

        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 1);
    }

    #[test]
    fn wav_size_correct() {
        let wav = render_wav("return 0", 22050, 0.5).unwrap();
        // 11025 frames * 2 bytes
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 22050);
        assert_eq!(wav.len(), 44 + 22050);
    }

    #[test]
    fn rendered_sine_is_audible() {
        let wav = render_wav(SINE, 44100, 0.05).unwrap();
        let has_nonzero = wav[44..]
            .chunks_exact(2)
            .any(|pair| i16::from_le_bytes([pair[0], pair[1]]) != 0);
        assert!(has_nonzero, "Rendered WAV should contain non-silent audio");
    }

    #[test]
    fn compile_errors_propagate() {
        assert!(render_wav("return )", 44100, 0.1).is_err());
    }

    #[test]
    fn unrenderable_durations_are_rejected() {
        for seconds in [f64::INFINITY, f64::NAN, -1.0, 1e9] {
            let err = render_wav(SINE, 44100, seconds).unwrap_err();
            assert!(matches!(err, RenderError::InvalidDuration(_)), "{seconds}: {err}");
        }
        assert!(render_samples("return 1", EngineConfig::default(), 0.0).unwrap().is_empty());
    }

    #[test]
    fn pcm_conversion_clips() {
        assert_eq!(to_pcm_i16(&[0.0, 1.0, -1.0, 4.0, -4.0]), vec![0, 32767, -32767, 32767, -32768]);
    }
}
