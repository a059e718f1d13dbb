use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use common_http_errors::{NovaError, NovaResult};
use common_security::SecurityCtxExtractor;
use domain::{PlaybackEvent, PlaybackEventType};
use serde::Deserialize;
use ulid::Ulid;

use crate::app::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEventRequest {
    pub event_type: String,
    pub track_id: String,
    pub client_timestamp: chrono::DateTime<Utc>,
    pub position_seconds: Option<f64>,
    pub duration_played_seconds: Option<f64>,
    pub session_id: Option<String>,
    pub device_id_hash: Option<String>,
    pub client_version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestPlaybackRequest {
    pub events: Vec<PlaybackEventRequest>,
}

fn parse_event_type(raw: &str) -> NovaResult<PlaybackEventType> {
    match raw {
        "play_start" => Ok(PlaybackEventType::Started),
        "play_progress" | "seek" => Ok(PlaybackEventType::Progress),
        "play_complete" => Ok(PlaybackEventType::Completed),
        "play_stop" => Ok(PlaybackEventType::Abandoned),
        other => Err(NovaError::validation(format!("unrecognized eventType: {other}"))),
    }
}

/// Ingests a batch of playback telemetry, persisting each event as an
/// outbox row on the `-telemetry` topic partitioned by `trackId` so the
/// telemetry worker can roll them into aggregates asynchronously (
/// ).
pub async fn ingest(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Json(body): Json<IngestPlaybackRequest>,
) -> NovaResult<StatusCode> {
    if body.events.is_empty() {
        return Err(NovaError::validation("events must contain at least one entry"));
    }

    let server_timestamp = Utc::now();
    let mut tx = state.db.begin().await.map_err(NovaError::internal)?;

    for raw in body.events {
        let event_type = parse_event_type(&raw.event_type)?;
        let correlation_id = Ulid::new().to_string();
        let event = PlaybackEvent {
            event_type,
            track_id: raw.track_id.clone(),
            user_id: ctx.user_id.clone(),
            client_timestamp: raw.client_timestamp,
            server_timestamp,
            position_seconds: raw.position_seconds,
            duration_played_seconds: raw.duration_played_seconds,
            session_id: raw.session_id,
            device_id_hash: raw.device_id_hash,
            client_version: raw.client_version,
            correlation_id: correlation_id.clone(),
        };
        let payload = serde_json::to_value(&event).map_err(NovaError::internal)?;
        common_outbox::OutboxMessage::new("PlaybackEvent", "dev-telemetry", Some(raw.track_id), payload, correlation_id)
        .insert(&mut tx)
        .await
        .map_err(NovaError::internal)?;
    }

    tx.commit().await.map_err(NovaError::internal)?;
    Ok(StatusCode::ACCEPTED)
}

