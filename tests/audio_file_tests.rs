// Integration tests for WAV input
//
// Fixtures are generated with hound into a temporary directory.

use anyhow::Result;
use notebook_voice::audio::AudioFile;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_wav_i16(dir: &Path, name: &str, rate: u32, channels: u16, frames: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for i in 0..frames {
        for ch in 0..channels {
            // Left channel positive, right channel negative
            let value: i16 = if ch == 0 { 16384 } else { -16384 };
            let sample = if i % 2 == 0 { value } else { value / 2 };
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(path)
}

fn write_wav_f32(dir: &Path, name: &str, rate: u32, samples: &[f32]) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav_i16(dir.path(), "mono.wav", 16000, 1, 8000)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 8000);
    assert!((audio.duration_seconds - 0.5).abs() < 1e-9);
    assert!(audio.path.contains("mono.wav"));
    Ok(())
}

#[test]
fn test_audio_file_samples_are_normalized() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav_i16(dir.path(), "mono.wav", 16000, 1, 4)?;

    let audio = AudioFile::open(&path)?;

    assert!((audio.samples[0] - 16384.0 / 32767.0).abs() < 1e-6);
    assert!((audio.samples[1] - 8192.0 / 32767.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_stereo_downmix_to_mono() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav_i16(dir.path(), "stereo.wav", 48000, 2, 480)?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.channels, 2);
    assert!((audio.duration_seconds - 0.01).abs() < 1e-9);

    let mono = audio.to_mono();
    assert_eq!(mono.len(), 480);
    // Opposite channels nearly cancel (asymmetric scaling leaves a residue)
    assert!(mono.iter().all(|s| s.abs() < 1e-3));
    Ok(())
}

#[test]
fn test_resample_to_mono_target_rate() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav_i16(dir.path(), "stereo.wav", 48000, 2, 48000)?;

    let audio = AudioFile::open(&path)?;
    let samples = audio.resample_to_mono(16000);

    assert_eq!(samples.len(), 16000);
    Ok(())
}

#[test]
fn test_float_wav_is_supported() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav_f32(dir.path(), "float.wav", 24000, &[0.5, -0.25, 1.0])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.samples, vec![0.5, -0.25, 1.0]);
    assert_eq!(audio.sample_rate, 24000);
    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");
    let result = AudioFile::open(&path);

    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_unsupported_bit_depth_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("eight-bit.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 8,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    writer.write_sample(12i8)?;
    writer.finalize()?;

    assert!(AudioFile::open(&path).is_err());
    Ok(())
}
