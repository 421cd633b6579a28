//! Sync run storage.
//!
//! Maps a sync-group id to its live playback state. An entry exists iff
//! the group is playing; `stop` and group deletion remove it. All state
//! transitions go through this store so a group's timer callback can never
//! interleave with a concurrent control operation unnoticed: every run
//! carries a generation stamp and advances are rejected when the stamp no
//! longer matches.

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::model::{PlaylistItem, SyncMode};
use crate::utils::now_millis;

/// Live playback state of one sync group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub group_id: String,
    pub playlist_id: String,
    pub mode: SyncMode,
    pub items: Vec<PlaylistItem>,
    pub item_index: usize,
    /// Epoch ms the current item started.
    pub started_at: u64,
    pub playing: bool,
    /// Stamp of the timer task driving this run. A stale task observing a
    /// different stamp exits without touching state.
    #[serde(skip)]
    pub generation: u64,
    /// Cancels the pending one-shot timer.
    #[serde(skip)]
    pub cancel: CancellationToken,
}

/// Indexed storage for sync runs.
pub struct SyncRunStore {
    runs: DashMap<String, SyncRun>,
    /// Last acknowledged item index per (group, screen). Reserved input for
    /// drift detection; baseline behaviour only records it.
    acks: DashMap<(String, String), usize>,
}

impl SyncRunStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
            acks: DashMap::new(),
        }
    }

    /// Installs a new run, returning the one it displaced (if any).
    pub fn insert(&self, run: SyncRun) -> Option<SyncRun> {
        self.runs.insert(run.group_id.clone(), run)
    }

    /// Removes a run, cancelling its pending timer.
    pub fn remove(&self, group_id: &str) -> Option<SyncRun> {
        let removed = self.runs.remove(group_id).map(|(_, run)| run);
        if let Some(ref run) = removed {
            run.cancel.cancel();
            self.acks.retain(|(g, _), _| g != group_id);
        }
        removed
    }

    /// Snapshot of one run.
    pub fn get(&self, group_id: &str) -> Option<SyncRun> {
        self.runs.get(group_id).map(|r| r.value().clone())
    }

    /// Whether the group currently plays.
    pub fn is_playing(&self, group_id: &str) -> bool {
        self.runs.contains_key(group_id)
    }

    /// Advances a run to the next item if the generation still matches.
    ///
    /// Returns the new `(item_index, duration_secs)` on success, `None`
    /// when the run was stopped or replaced in the meantime.
    pub fn advance(&self, group_id: &str, generation: u64) -> Option<(usize, u32)> {
        let mut entry = self.runs.get_mut(group_id)?;
        let run = entry.value_mut();
        if run.generation != generation || !run.playing || run.items.is_empty() {
            return None;
        }
        run.item_index = (run.item_index + 1) % run.items.len();
        run.started_at = now_millis();
        let duration = run.items[run.item_index].duration;
        Some((run.item_index, duration))
    }

    /// Repositions a run at `item_index` if the generation still matches.
    pub fn reposition(&self, group_id: &str, generation: u64, item_index: usize) -> bool {
        let mut entry = match self.runs.get_mut(group_id) {
            Some(entry) => entry,
            None => return false,
        };
        let run = entry.value_mut();
        if run.generation != generation || item_index >= run.items.len() {
            return false;
        }
        run.item_index = item_index;
        run.started_at = now_millis();
        true
    }

    /// Records a tick acknowledgement from one screen.
    pub fn record_ack(&self, group_id: &str, screen_id: &str, item_index: usize) {
        self.acks
            .insert((group_id.to_string(), screen_id.to_string()), item_index);
    }

    /// Last acknowledged index for one screen, if any.
    pub fn last_ack(&self, group_id: &str, screen_id: &str) -> Option<usize> {
        self.acks
            .get(&(group_id.to_string(), screen_id.to_string()))
            .map(|r| *r.value())
    }

    /// Snapshot of every live run.
    pub fn all(&self) -> Vec<SyncRun> {
        self.runs.iter().map(|r| r.value().clone()).collect()
    }

    /// Cancels and clears every run. Used on shutdown.
    pub fn clear_all(&self) -> usize {
        let ids: Vec<String> = self.runs.iter().map(|r| r.key().clone()).collect();
        for id in &ids {
            self.remove(id);
        }
        ids.len()
    }
}

impl Default for SyncRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentType;
    use serde_json::Value;

    fn make_run(group_id: &str, generation: u64, durations: &[u32]) -> SyncRun {
        SyncRun {
            group_id: group_id.into(),
            playlist_id: "p1".into(),
            mode: SyncMode::Mirror,
            items: durations
                .iter()
                .map(|d| PlaylistItem {
                    content_type: ContentType::Widget,
                    content_id: None,
                    url: None,
                    widget: Some("clock".into()),
                    config: Value::Null,
                    duration: *d,
                    name: None,
                })
                .collect(),
            item_index: 0,
            started_at: 0,
            playing: true,
            generation,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn exists_iff_playing() {
        let store = SyncRunStore::new();
        assert!(!store.is_playing("g1"));
        store.insert(make_run("g1", 1, &[10]));
        assert!(store.is_playing("g1"));
        store.remove("g1");
        assert!(!store.is_playing("g1"));
    }

    #[test]
    fn advance_wraps_modulo_items() {
        let store = SyncRunStore::new();
        store.insert(make_run("g1", 1, &[10, 20]));

        assert_eq!(store.advance("g1", 1), Some((1, 20)));
        assert_eq!(store.advance("g1", 1), Some((0, 10)));
    }

    #[test]
    fn stale_generation_cannot_advance() {
        let store = SyncRunStore::new();
        store.insert(make_run("g1", 2, &[10, 20]));
        assert_eq!(store.advance("g1", 1), None);
        assert_eq!(store.get("g1").unwrap().item_index, 0);
    }

    #[test]
    fn remove_cancels_timer_token() {
        let store = SyncRunStore::new();
        store.insert(make_run("g1", 1, &[10]));
        let token = store.get("g1").unwrap().cancel;
        store.remove("g1");
        assert!(token.is_cancelled());
    }

    #[test]
    fn reposition_validates_bounds() {
        let store = SyncRunStore::new();
        store.insert(make_run("g1", 1, &[10, 20, 30]));
        assert!(store.reposition("g1", 1, 2));
        assert_eq!(store.get("g1").unwrap().item_index, 2);
        assert!(!store.reposition("g1", 1, 3));
        assert!(!store.reposition("g1", 9, 0));
        assert!(!store.reposition("ghost", 1, 0));
    }

    #[test]
    fn acks_recorded_and_cleared() {
        let store = SyncRunStore::new();
        store.insert(make_run("g1", 1, &[10]));
        store.record_ack("g1", "scr-1", 0);
        assert_eq!(store.last_ack("g1", "scr-1"), Some(0));
        store.remove("g1");
        assert_eq!(store.last_ack("g1", "scr-1"), None);
    }

    #[test]
    fn clear_all_empties_store() {
        let store = SyncRunStore::new();
        store.insert(make_run("g1", 1, &[10]));
        store.insert(make_run("g2", 2, &[10]));
        assert_eq!(store.clear_all(), 2);
        assert!(store.all().is_empty());
    }
}
