use std::path::Path;
use std::time::Duration;

use thiserror::Error;

const WAVEFORM_SAMPLE_RATE: &str = "8000";

#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("ffmpeg timed out")]
    Timeout,
    #[error("ffmpeg exited with a failure status")]
    Failed,
    #[error("failed to launch ffmpeg: {0}")]
    Spawn(std::io::Error),
}

/// Decodes `path` to mono 16-bit PCM at a low sample rate via `ffmpeg`, then
/// downsamples further into `peak_count` normalized peak magnitudes.
pub async fn generate_peaks(path: &Path, peak_count: usize, timeout: Duration) -> Result<Vec<f32>, WaveformError> {
    let mut command = tokio::process::Command::new("ffmpeg");
    command
    .arg("-v")
    .arg("error")
    .arg("-i")
    .arg(path)
    .arg("-ac")
    .arg("1")
    .arg("-ar")
    .arg(WAVEFORM_SAMPLE_RATE)
    .arg("-f")
    .arg("s16le")
    .arg("-")
    .stdout(std::process::Stdio::piped())
    .stderr(std::process::Stdio::null());

    let child = command.spawn().map_err(WaveformError::Spawn)?;
    let output = tokio::time::timeout(timeout, child.wait_with_output()).await.map_err(|_| WaveformError::Timeout)?.map_err(WaveformError::Spawn)?;
    if !output.status.success() {
        return Err(WaveformError::Failed);
    }

    let samples: Vec<i16> = output.stdout.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect();
    if samples.is_empty() {
        return Ok(vec![0.0; peak_count]);
    }

    let chunk_size = (samples.len() / peak_count.max(1)).max(1);
    let peaks = samples
    .chunks(chunk_size)
    .take(peak_count)
    .map(|chunk| chunk.iter().map(|s| (*s as f32 / i16::MAX as f32).abs()).fold(0.0f32, f32::max))
    .collect();
    Ok(peaks)
}

