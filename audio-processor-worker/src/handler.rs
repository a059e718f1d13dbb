use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common_bus::{BusError, BusMessage, MessageHandler};
use common_storage::StorageAdapter;
use domain::{AudioUploaded, Track, TrackMetadata, TrackStatus};
use sqlx::PgPool;

use crate::config::ProcessorConfig;
use crate::tempfile::ScopedTempFile;
use crate::{ffprobe, repo, waveform};

pub struct ProcessorHandler {
    pub db: PgPool,
    pub storage: Arc<StorageAdapter>,
    pub config: ProcessorConfig,
}

/// Derives the waveform peaks object key as a sibling of the audio object,
/// under a `waveform/` prefix matching the audio key's shape (
/// "Object keys").
fn waveform_object_key(audio_object_key: &str) -> String {
    format!("waveform/{}.json", audio_object_key.trim_start_matches("audio/"))
}

#[async_trait]
impl MessageHandler for ProcessorHandler {
    async fn handle(&self, message: BusMessage) -> Result<(), BusError> {
        let event: AudioUploaded = serde_json::from_slice(&message.value).map_err(|_| BusError::InvalidPayload)?;

        let Some(stored) = repo::load_track(&self.db, &event.track_id).await.map_err(|e| BusError::Handler(e.to_string()))? else {
            tracing::warn!(track_id = %event.track_id, "audio processor received event for unknown track, acking");
            return Ok(());
        };

        if stored.data.status != TrackStatus::Processing {
            tracing::info!(track_id = %event.track_id, status = ?stored.data.status, "track no longer processing, skipping");
            return Ok(());
        }

        match self.process(&event).await {
            Ok(outcome) => {
                self.finish(&event.track_id, outcome).await.map_err(|e| BusError::Handler(e.to_string()))?;
                Ok(())
            }
            Err(Outcome::Terminal(reason)) => {
                self.finish(&event.track_id, Outcome::Terminal(reason)).await.map_err(|e| BusError::Handler(e.to_string()))?;
                Ok(())
            }
            Err(Outcome::Transient(detail)) => Err(BusError::Handler(detail)),
            Err(Outcome::Ready { .. }) => unreachable!(),
        }
    }
}

enum Outcome {
    Ready { duration_seconds: f64, metadata: TrackMetadata, waveform_object_key: String },
    Terminal(&'static str),
    Transient(String),
}

impl ProcessorHandler {
    async fn process(&self, event: &AudioUploaded) -> Result<Outcome, Outcome> {
        let bytes = self
        .storage
        .read_bytes(&event.object_key)
        .await
        .map_err(|e| Outcome::Transient(format!("failed to read object {}: {e}", event.object_key)))?;

        let suffix = std::path::Path::new(&event.object_key).extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
        let temp = ScopedTempFile::write(&bytes, &suffix).await.map_err(|e| Outcome::Transient(format!("failed to stage temp file: {e}")))?;

        let probe = match ffprobe::probe(temp.path(), self.config.ffprobe_timeout).await {
            Ok(probe) => probe,
            Err(ffprobe::ProbeError::Timeout) => return Err(Outcome::Terminal("FfprobeTimeout")),
            Err(ffprobe::ProbeError::NoAudioStream) | Err(ffprobe::ProbeError::Malformed(_)) => return Err(Outcome::Terminal("CorruptedFile")),
            Err(_) => return Err(Outcome::Terminal("CorruptedFile")),
        };

        if probe.duration_seconds <= 0.0 {
            return Err(Outcome::Terminal("InvalidDuration"));
        }
        if probe.duration_seconds > self.config.max_track_duration_seconds {
            return Err(Outcome::Terminal("DurationExceeded"));
        }
        if probe.sample_rate <= 0 {
            return Err(Outcome::Terminal("InvalidSampleRate"));
        }
        if probe.channels < 1 || probe.channels > 8 {
            return Err(Outcome::Terminal("InvalidChannels"));
        }
        if !self.config.supported_codecs.iter().any(|c| c == &probe.codec_short_name) {
            return Err(Outcome::Terminal("UnsupportedCodec"));
        }

        let peaks = match waveform::generate_peaks(temp.path(), self.config.waveform_peak_count, self.config.ffmpeg_timeout).await {
            Ok(peaks) => peaks,
            Err(waveform::WaveformError::Timeout) => return Err(Outcome::Terminal("FfmpegTimeout")),
            Err(_) => return Err(Outcome::Terminal("CorruptedFile")),
        };

        let waveform_key = waveform_object_key(&event.object_key);
        let peaks_json = serde_json::to_vec(&peaks).expect("peaks serialize");
        self.storage
        .put_bytes(&waveform_key, "application/json", peaks_json)
        .await
        .map_err(|e| Outcome::Transient(format!("failed to store waveform: {e}")))?;

        Ok(Outcome::Ready {
            duration_seconds: probe.duration_seconds,
            metadata: TrackMetadata {
                sample_rate: Some(probe.sample_rate),
                channels: Some(probe.channels),
                bitrate: probe.bitrate,
                codec: Some(probe.codec_short_name),
                bit_depth: probe.bit_depth,
                tags: probe.tags,
            },
            waveform_object_key: waveform_key,
        })
    }

    async fn finish(&self, track_id: &str, outcome: Outcome) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        repo::save_track_with_retry(&self.db, track_id, move |track: &mut Track| {
            track.processed_at = Some(now);
            track.updated_at = now;
            match &outcome {
                Outcome::Ready { duration_seconds, metadata, waveform_object_key } => {
                    track.status = TrackStatus::Ready;
                    track.duration_seconds = Some(*duration_seconds);
                    track.metadata = Some(metadata.clone());
                    track.waveform_object_key = Some(waveform_object_key.clone());
                    track.failure_reason_code = None;
                }
                Outcome::Terminal(reason) => {
                    track.status = TrackStatus::Failed;
                    track.failure_reason_code = Some((*reason).to_string());
                }
                Outcome::Transient(_) => unreachable!(),
            }
        })
        .await
    }
}

