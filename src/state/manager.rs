//! State Manager (spec §4.1): owns every `PerIdState`, offers O(1) update, and
//! enforces the core's memory ceiling via eviction.

use std::collections::HashMap;

use log::{debug, warn};

use super::per_id::{PerIdState, StateCaps};
use crate::frame::Frame;

pub struct StateManager {
    states: HashMap<u32, PerIdState>,
    caps: StateCaps,
}

impl StateManager {
    pub fn new(caps: StateCaps) -> Self {
        Self {
            states: HashMap::new(),
            caps,
        }
    }

    /// Fold `frame` into its ID's state, creating the record if this is a new
    /// ID, and return the updated view. Cannot fail (spec §4.1): memory
    /// pressure is handled by the caller invoking `cleanup_if_pressure`
    /// between frames, not by refusing this update. `treat_dlc_zero_as_special`
    /// is passed in per call (rather than fixed at construction) so the
    /// caller can resolve it per-ID via `Config::resolved_for` (spec §6).
    pub fn update(&mut self, frame: &Frame, treat_dlc_zero_as_special: bool) -> &PerIdState {
        let caps = self.caps;
        let state = self
            .states
            .entry(frame.can_id)
            .or_insert_with(|| PerIdState::new(frame.can_id, caps));
        state.update(frame, treat_dlc_zero_as_special);
        state
    }

    pub fn get(&self, can_id: u32) -> Option<&PerIdState> {
        self.states.get(&can_id)
    }

    pub fn get_mut(&mut self, can_id: u32) -> Option<&mut PerIdState> {
        self.states.get_mut(&can_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Remove records whose `last_timestamp` is older than `now - max_age`.
    pub fn evict_stale(&mut self, now: f64, max_age: f64) {
        let before = self.states.len();
        self.states
            .retain(|_, s| s.last_timestamp.map(|t| now - t < max_age).unwrap_or(true));
        let evicted = before - self.states.len();
        if evicted > 0 {
            debug!("evicted {evicted} stale ID(s) older than {max_age}s");
        }
    }

    /// If the tracked set exceeds `soft_limit`, evict the oldest 25% by
    /// last-seen timestamp. IDs observed within the last second are always
    /// preserved, even if that leaves the set above the limit (spec §4.1).
    pub fn cleanup_if_pressure(&mut self, now: f64, soft_limit: usize) {
        if self.states.len() <= soft_limit {
            return;
        }

        let mut by_age: Vec<(u32, f64)> = self
            .states
            .iter()
            .map(|(id, s)| (*id, s.last_timestamp.unwrap_or(f64::NEG_INFINITY)))
            .collect();
        by_age.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let evict_count = self.states.len() / 4;
        let mut evicted = 0;
        for (id, last_seen) in by_age {
            if evicted >= evict_count {
                break;
            }
            if now - last_seen < 1.0 {
                continue;
            }
            self.states.remove(&id);
            evicted += 1;
        }
        warn!(
            "memory pressure: evicted {evicted} of {} tracked ID(s) (soft_limit={soft_limit})",
            evicted + self.states.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32, ts: f64) -> Frame {
        Frame::new(ts, id, 2, vec![0, 0]).unwrap()
    }

    #[test]
    fn update_creates_new_id_state() {
        let mut mgr = StateManager::new(StateCaps::default());
        mgr.update(&frame(0x100, 1.0), false);
        assert_eq!(mgr.len(), 1);
        assert!(mgr.get(0x100).is_some());
        assert!(mgr.get(0x200).is_none());
    }

    #[test]
    fn evict_stale_removes_old_ids_only() {
        let mut mgr = StateManager::new(StateCaps::default());
        mgr.update(&frame(0x100, 1.0), false);
        mgr.update(&frame(0x200, 100.0), false);
        mgr.evict_stale(100.0, 10.0);
        assert!(mgr.get(0x100).is_none());
        assert!(mgr.get(0x200).is_some());
    }

    #[test]
    fn cleanup_preserves_ids_seen_in_last_second() {
        let mut mgr = StateManager::new(StateCaps::default());
        for id in 0..10u32 {
            mgr.update(&frame(id, 100.0), false);
        }
        mgr.cleanup_if_pressure(100.0, 5);
        // all were seen "now", so none should be evicted despite exceeding soft_limit
        assert_eq!(mgr.len(), 10);
    }

    #[test]
    fn cleanup_evicts_oldest_quarter_when_stale() {
        let mut mgr = StateManager::new(StateCaps::default());
        for id in 0..8u32 {
            mgr.update(&frame(id, id as f64), false);
        }
        mgr.cleanup_if_pressure(100.0, 4);
        assert_eq!(mgr.len(), 6); // 8 / 4 = 2 evicted
    }
}
