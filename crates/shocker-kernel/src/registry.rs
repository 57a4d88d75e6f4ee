//! Shared shocker registry and process-wide flags.
//!
//! The registry is a concurrent map shared by every loop. It only offers the
//! per-entry locking the map itself provides; callers must not hold an entry
//! guard across an `.await` or while touching another entry.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

use crate::shocker::{ShockerId, ShockerState};

/// Mapping from shocker name to its live state.
#[derive(Debug, Default)]
pub struct ShockerRegistry {
    shockers: DashMap<String, ShockerState>,
}

impl ShockerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for `name`, creating it with `id` on first reference.
    pub fn get_or_create(&self, name: &str, id: ShockerId) -> RefMut<'_, String, ShockerState> {
        self.shockers
            .entry(name.to_string())
            .or_insert_with(|| ShockerState::new(id, name))
    }

    /// Get a mutable handle to an existing entry.
    pub fn get_mut(&self, name: &str) -> Option<RefMut<'_, String, ShockerState>> {
        self.shockers.get_mut(name)
    }

    /// Find the name of the first entry with the given remote id.
    pub fn name_for_id(&self, id: ShockerId) -> Option<String> {
        self.shockers
            .iter()
            .find(|entry| entry.value().id() == id)
            .map(|entry| entry.key().clone())
    }

    /// Snapshot of the current entry names.
    ///
    /// Loops iterate over this snapshot and look each entry up again, so no
    /// shard lock is held while an entry is processed.
    pub fn names(&self) -> Vec<String> {
        self.shockers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Copy of an entry's state.
    pub fn snapshot(&self, name: &str) -> Option<ShockerState> {
        self.shockers.get(name).map(|entry| entry.value().clone())
    }

    /// Drop every entry (avatar change).
    pub fn clear(&self) {
        self.shockers.clear();
    }

    pub fn len(&self) -> usize {
        self.shockers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shockers.is_empty()
    }
}

/// Platform flags that apply to every shocker.
#[derive(Debug, Default)]
pub struct GlobalFlags {
    afk: AtomicBool,
    muted: AtomicBool,
}

impl GlobalFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_afk(&self) -> bool {
        self.afk.load(Ordering::Relaxed)
    }

    pub fn set_afk(&self, afk: bool) {
        self.afk.store(afk, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }
}
