use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

struct AccessEntry {
    /// Access timestamps, most recent at the back, capped at k
    history: VecDeque<Timestamp>,
    evictable: bool,
}

struct ReplacerState {
    entries: HashMap<FrameId, AccessEntry>,
    num_evictable: usize,
    now: Timestamp,
}

/// LRU-K replacement policy.
///
/// Evicts the frame with the largest backward k-distance: the gap
/// between the current timestamp and the k-th most recent access.
/// Frames with fewer than k recorded accesses count as infinitely
/// distant; ties among those are broken by the earliest first access.
pub struct LruKReplacer {
    k: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            state: Mutex::new(ReplacerState {
                entries: HashMap::new(),
                num_evictable: 0,
                now: 0,
            }),
        }
    }

    /// Records an access to the frame at the current timestamp.
    pub fn record_access(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let ts = state.now;
        state.now += 1;
        let k = self.k;
        let entry = state.entries.entry(frame_id).or_insert(AccessEntry {
            history: VecDeque::new(),
            evictable: false,
        });
        entry.history.push_back(ts);
        while entry.history.len() > k {
            entry.history.pop_front();
        }
    }

    /// Marks a frame evictable or pinned. Frames become evictable when
    /// their pin count drops to zero.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut state = self.state.lock();
        match state.entries.get_mut(&frame_id) {
            Some(entry) => {
                if entry.evictable != evictable {
                    entry.evictable = evictable;
                    if evictable {
                        state.num_evictable += 1;
                    } else {
                        state.num_evictable -= 1;
                    }
                }
            }
            None if evictable => {
                state.entries.insert(
                    frame_id,
                    AccessEntry {
                        history: VecDeque::new(),
                        evictable: true,
                    },
                );
                state.num_evictable += 1;
            }
            None => {}
        }
    }

    /// Picks and removes the victim frame, or None if nothing is
    /// evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }
        let now = state.now;

        let mut victim: Option<FrameId> = None;
        // (is_infinite, distance-or-earliest-rank) ordering key
        let mut victim_key: Option<(bool, Timestamp)> = None;

        for (&frame_id, entry) in state.entries.iter() {
            if !entry.evictable {
                continue;
            }
            let key = if entry.history.len() < self.k {
                // Infinite distance; earlier first access wins the tie,
                // so invert the timestamp into a max-comparable rank.
                let first = entry.history.front().copied().unwrap_or(0);
                (true, Timestamp::MAX - first)
            } else {
                let kth = entry.history[entry.history.len() - self.k];
                (false, now - kth)
            };
            if victim_key.map_or(true, |v| key > v) {
                victim = Some(frame_id);
                victim_key = Some(key);
            }
        }

        if let Some(frame_id) = victim {
            state.entries.remove(&frame_id);
            state.num_evictable -= 1;
        }
        victim
    }

    /// Drops all bookkeeping for a frame (page deleted).
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.remove(&frame_id) {
            if entry.evictable {
                state.num_evictable -= 1;
            }
        }
    }

    /// Number of currently evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }
}
