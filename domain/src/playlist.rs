use chrono::{DateTime, Utc};
use common_http_errors::NovaError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Private,
    Unlisted,
    Public,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistEntry {
    pub position: i32,
    pub track_id: String,
    pub added_at: DateTime<Utc>,
}

/// `Playlist`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub entries: Vec<PlaylistEntry>,
    pub track_count: i32,
    pub total_duration_seconds: f64,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct Move {
    pub from: usize,
    pub to: usize,
}

impl Playlist {
    pub fn validate_name(name: &str) -> Result<(), NovaError> {
        if name.is_empty() || name.chars().count() > 100 {
            return Err(NovaError::validation("name must be 1-100 characters"));
        }
        Ok(())
    }

    pub fn validate_description(description: &Option<String>) -> Result<(), NovaError> {
        if let Some(d) = description {
            if d.chars().count() > 500 {
                return Err(NovaError::validation("description must be at most 500 characters"));
            }
        }
        Ok(())
    }

    /// Appends or inserts `track_ids` at `position` (None = append), shifting
    /// later entries right, then recomputes denormalized counts. Duplicate
    /// track ids are allowed.
    pub fn add_tracks(
        &mut self,
        track_ids: &[String],
        position: Option<usize>,
        track_durations: &std::collections::HashMap<String, f64>,
        max_entries: usize,
        now: DateTime<Utc>,
    ) -> Result<(), NovaError> {
        if self.entries.len() + track_ids.len() > max_entries {
            return Err(NovaError::validation("playlist entry limit exceeded"));
        }
        let insert_at = position.unwrap_or(self.entries.len()).min(self.entries.len());
        let new_entries: Vec<PlaylistEntry> =
        track_ids.iter().map(|id| PlaylistEntry { position: 0, track_id: id.clone(), added_at: now }).collect();
        self.entries.splice(insert_at..insert_at, new_entries);
        self.renumber();
        self.recompute_denormalized(track_durations);
        self.updated_at = now;
        Ok(())
    }

    /// Removes the entry at `position`, compacting the sequence.
    pub fn remove_at(
        &mut self,
        position: usize,
        track_durations: &std::collections::HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> Result<(), NovaError> {
        if position >= self.entries.len() {
            return Err(NovaError::InvalidPosition);
        }
        self.entries.remove(position);
        self.renumber();
        self.recompute_denormalized(track_durations);
        self.updated_at = now;
        Ok(())
    }

    /// Applies `moves` sequentially; on any invalid position, no changes are
    /// applied at all.
    pub fn reorder(&mut self, moves: &[Move], now: DateTime<Utc>) -> Result<(), NovaError> {
        let len = self.entries.len();
        for m in moves {
            if m.from >= len || m.to >= len {
                return Err(NovaError::InvalidPosition);
            }
        }
        let mut working = self.entries.clone();
        for m in moves {
            if m.from == m.to {
                continue;
            }
            let item = working.remove(m.from);
            working.insert(m.to, item);
        }
        self.entries = working;
        self.renumber();
        self.updated_at = now;
        Ok(())
    }

    /// Removes every occurrence of `track_id`, used by the lifecycle
    /// worker's cascade removal.
    pub fn cascade_remove_track(
        &mut self,
        track_id: &str,
        track_durations: &std::collections::HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.track_id != track_id);
        if self.entries.len() == before {
            return false;
        }
        self.renumber();
        self.recompute_denormalized(track_durations);
        self.updated_at = now;
        true
    }

    fn renumber(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.position = i as i32;
        }
    }

    fn recompute_denormalized(&mut self, track_durations: &std::collections::HashMap<String, f64>) {
        self.track_count = self.entries.len() as i32;
        self.total_duration_seconds = self.entries.iter().map(|e| track_durations.get(&e.track_id).copied().unwrap_or(0.0)).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn playlist_with(track_ids: &[&str]) -> Playlist {
        let now = Utc::now();
        let entries = track_ids
        .iter()
        .enumerate()
        .map(|(i, id)| PlaylistEntry { position: i as i32, track_id: id.to_string(), added_at: now })
        .collect();
        Playlist {
            id: "p1".into(),
            user_id: "u1".into(),
            name: "Mix".into(),
            description: None,
            entries,
            track_count: track_ids.len() as i32,
            total_duration_seconds: 0.0,
            visibility: Visibility::Private,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reorder_matches_spec_scenario() {
        let mut playlist = playlist_with(&["T0", "T1", "T2", "T3", "T4"]);
        playlist.reorder(&[Move { from: 0, to: 4 }, Move { from: 0, to: 2 }], Utc::now()).unwrap();
        let ids: Vec<_> = playlist.entries.iter().map(|e| e.track_id.clone()).collect();
        assert_eq!(ids, vec!["T2", "T3", "T1", "T4", "T0"]);
        for (i, e) in playlist.entries.iter().enumerate() {
            assert_eq!(e.position, i as i32);
        }
    }

    #[test]
    fn identity_moves_leave_playlist_unchanged() {
        let mut playlist = playlist_with(&["T0", "T1", "T2"]);
        let before: Vec<_> = playlist.entries.iter().map(|e| e.track_id.clone()).collect();
        playlist.reorder(&[Move { from: 0, to: 0 }, Move { from: 1, to: 1 }], Utc::now()).unwrap();
        let after: Vec<_> = playlist.entries.iter().map(|e| e.track_id.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn reorder_rejects_invalid_position_without_partial_application() {
        let mut playlist = playlist_with(&["T0", "T1", "T2"]);
        let before: Vec<_> = playlist.entries.iter().map(|e| e.track_id.clone()).collect();
        let result = playlist.reorder(&[Move { from: 0, to: 1 }, Move { from: 5, to: 0 }], Utc::now());
        assert!(matches!(result, Err(NovaError::InvalidPosition)));
        let after: Vec<_> = playlist.entries.iter().map(|e| e.track_id.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn remove_at_compacts_positions() {
        let mut playlist = playlist_with(&["T0", "T1", "T2"]);
        playlist.remove_at(1, &HashMap::new(), Utc::now()).unwrap();
        let ids: Vec<_> = playlist.entries.iter().map(|e| e.track_id.clone()).collect();
        assert_eq!(ids, vec!["T0", "T2"]);
        assert_eq!(playlist.entries[1].position, 1);
    }

    #[test]
    fn cascade_remove_drops_all_occurrences() {
        let mut playlist = playlist_with(&["T0", "T1", "T0"]);
        let removed = playlist.cascade_remove_track("T0", &HashMap::new(), Utc::now());
        assert!(removed);
        assert_eq!(playlist.entries.len(), 1);
        assert_eq!(playlist.entries[0].track_id, "T1");
    }
}

