use chrono::Utc;
use common_storage::StorageAdapter;
use common_store::DocumentStore;
use domain::{Playlist, Track};

use crate::repo;

const TABLE_TRACKS: &str = "tracks";

/// Reclaims every track past its grace period, best-effort per step:
/// partial failures at steps 1-3 are logged and do not block step 4 or a
/// future retry.
pub async fn reclaim_due_tracks(store: &DocumentStore, storage: &StorageAdapter, batch_size: i64) -> anyhow::Result<usize> {
    let now = Utc::now();
    let due = repo::tracks_past_scheduled_deletion(store.pool(), now, batch_size).await?;
    let count = due.len();
    for stored in due {
        reclaim_one(store, storage, &stored.id, &stored.data).await;
    }
    Ok(count)
}

async fn reclaim_one(store: &DocumentStore, storage: &StorageAdapter, track_id: &str, track: &Track) {
    if let Err(e) = storage.delete(&track.object_key).await {
        tracing::warn!(track_id, object_key = %track.object_key, error = %e, "failed to delete audio object, will retry next sweep");
    }

    if let Some(waveform_key) = &track.waveform_object_key {
        if let Err(e) = storage.delete(waveform_key).await {
            tracing::warn!(track_id, object_key = %waveform_key, error = %e, "failed to delete waveform object, will retry next sweep");
        }
    }

    if let Err(e) = cascade_remove_from_playlists(store, track_id).await {
        tracing::warn!(track_id, error = %e, "failed to cascade-remove track from playlists, will retry next sweep");
    }

    match store.delete(TABLE_TRACKS, track_id).await {
        Ok(()) => tracing::info!(track_id, "reclaimed track"),
        Err(common_store::StoreError::NotFound) => {}
        Err(e) => tracing::warn!(track_id, error = %e, "failed to delete track document, will retry next sweep"),
    }
}

async fn cascade_remove_from_playlists(store: &DocumentStore, track_id: &str) -> Result<(), common_store::StoreError> {
    let referencing = repo::playlists_referencing_track(store.pool(), track_id).await?;
    for stored in referencing {
        let mut playlist: Playlist = stored.data;
        if !playlist.cascade_remove_track(track_id, &std::collections::HashMap::new(), Utc::now()) {
            continue;
        }
        match store.save_optimistic("playlists", &stored.id, &playlist, stored.version).await {
            Ok(_) => {}
            Err(common_store::StoreError::VersionConflict) => {
                tracing::info!(playlist_id = %stored.id, track_id, "lost race removing track from playlist, will retry next sweep");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

