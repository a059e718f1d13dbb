use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub max_track_duration_seconds: f64,
    pub ffprobe_timeout: Duration,
    pub ffmpeg_timeout: Duration,
    pub waveform_peak_count: usize,
    pub supported_codecs: Vec<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl ProcessorConfig {
    pub fn from_env() -> Self {
        Self {
            max_track_duration_seconds: env_parse("PROCESSOR_MAX_TRACK_DURATION_SECONDS", 7_200.0),
            ffprobe_timeout: Duration::from_secs(env_parse("PROCESSOR_FFPROBE_TIMEOUT_SECONDS", 30)),
            ffmpeg_timeout: Duration::from_secs(env_parse("PROCESSOR_FFMPEG_TIMEOUT_SECONDS", 300)),
            waveform_peak_count: env_parse("PROCESSOR_WAVEFORM_PEAK_COUNT", 600),
            supported_codecs: env::var("PROCESSOR_SUPPORTED_CODECS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| {
                ["mp3", "aac", "flac", "pcm_s16le", "pcm_s24le", "vorbis", "opus"].iter().map(|s| s.to_string()).collect()
            }),
        }
    }
}

