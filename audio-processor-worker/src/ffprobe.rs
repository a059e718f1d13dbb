use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe timed out")]
    Timeout,
    #[error("ffprobe exited with a failure status")]
    Failed,
    #[error("failed to launch ffprobe: {0}")]
    Spawn(std::io::Error),
    #[error("ffprobe output was not valid json: {0}")]
    Malformed(serde_json::Error),
    #[error("no audio stream present")]
    NoAudioStream,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    codec_long_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_from_str")]
    sample_rate: Option<i32>,
    channels: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_from_str")]
    bit_rate: Option<i64>,
    bits_per_raw_sample: Option<String>,
    #[serde(default)]
    tags: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default, deserialize_with = "de_opt_from_str")]
    duration: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_from_str")]
    bit_rate: Option<i64>,
    #[serde(default)]
    tags: Option<serde_json::Value>,
}

fn de_opt_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
D: serde::Deserializer<'de>,
T: std::str::FromStr,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub duration_seconds: f64,
    pub sample_rate: i32,
    pub channels: i32,
    pub bitrate: Option<i32>,
    pub codec_short_name: String,
    pub codec_long_name: Option<String>,
    pub bit_depth: Option<i32>,
    pub tags: Option<serde_json::Value>,
}

/// Runs `ffprobe` against `path`, extracting the fields step 2
/// validates against. Bounded by `timeout`.
pub async fn probe(path: &Path, timeout: Duration) -> Result<ProbeResult, ProbeError> {
    let mut command = tokio::process::Command::new("ffprobe");
    command
    .arg("-v")
    .arg("error")
    .arg("-print_format")
    .arg("json")
    .arg("-show_format")
    .arg("-show_streams")
    .arg(path)
    .stdout(std::process::Stdio::piped())
    .stderr(std::process::Stdio::null());

    let child = command.spawn().map_err(ProbeError::Spawn)?;
    let output = tokio::time::timeout(timeout, child.wait_with_output()).await.map_err(|_| ProbeError::Timeout)?.map_err(ProbeError::Spawn)?;
    if !output.status.success() {
        return Err(ProbeError::Failed);
    }

    let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout).map_err(ProbeError::Malformed)?;
    let stream = parsed.streams.into_iter().find(|s| s.codec_type == "audio").ok_or(ProbeError::NoAudioStream)?;

    let duration_seconds = parsed.format.duration.unwrap_or(0.0);
    let bitrate = stream.bit_rate.or(parsed.format.bit_rate).map(|b| b as i32);
    let bit_depth = stream.bits_per_raw_sample.and_then(|s| s.parse().ok());
    let tags = stream.tags.or(parsed.format.tags);

    Ok(ProbeResult {
        duration_seconds,
        sample_rate: stream.sample_rate.unwrap_or(0),
        channels: stream.channels.unwrap_or(0),
        bitrate,
        codec_short_name: stream.codec_name.unwrap_or_default(),
        codec_long_name: stream.codec_long_name,
        bit_depth,
        tags,
    })
}

