use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::BufWriter;
use std::path::Path;

/// Read a WAV file as mono f32 samples at its native rate.
///
/// Returns the samples and the file's sample rate.
pub fn read_wav_mono(path: impl AsRef<Path>) -> crate::Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path.as_ref())
        .map_err(|e| crate::AudioError::Wav(format!("failed to open wav: {e}")))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| crate::AudioError::Wav(format!("failed to read sample: {e}")))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| crate::AudioError::Wav(format!("failed to read sample: {e}")))?
        }
    };

    let mono = crate::downmix(&interleaved, channels).into_owned();
    Ok((mono, spec.sample_rate))
}

/// Write mono f32 samples as a 16-bit PCM WAV file.
pub fn write_wav_mono(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
) -> crate::Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let file = std::fs::File::create(path.as_ref())
        .map_err(|e| crate::AudioError::Wav(format!("failed to create file: {e}")))?;
    let mut writer = WavWriter::new(BufWriter::new(file), spec)
        .map_err(|e| crate::AudioError::Wav(format!("failed to create wav writer: {e}")))?;

    for &sample in samples {
        let int_sample = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer
            .write_sample(int_sample)
            .map_err(|e| crate::AudioError::Wav(format!("failed to write sample: {e}")))?;
    }

    writer
        .finalize()
        .map_err(|e| crate::AudioError::Wav(format!("failed to finalize wav: {e}")))?;

    Ok(())
}
