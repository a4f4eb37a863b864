use rustc_hash::FxHashMap;
use super::state::{MetaAction, StateKey};

#[derive(Clone, Copy, Debug, Default)]
struct QEntry {
    values: [f32; MetaAction::ALL.len()],
    last_touched: u64,
    learned: bool,
}

/// Tabular action values keyed by discretized state.
///
/// Entries are created on first reference, either by [`QTable::touch`] or
/// by an update. Unseen state/action pairs read as 0. With a capacity set,
/// inserting a new state into a full table evicts the state touched least
/// recently.
#[derive(Clone, Debug, Default)]
pub struct QTable {
    entries: FxHashMap<StateKey, QEntry>,
    capacity: Option<usize>,
    clock: u64,
}

impl QTable {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: FxHashMap::default(),
            capacity,
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn value(&self, key: &StateKey, action: MetaAction) -> f32 {
        self.entries
            .get(key)
            .map_or(0.0, |entry| entry.values[action.index()])
    }

    pub fn max_value(&self, key: &StateKey) -> f32 {
        self.entries.get(key).map_or(0.0, |entry| {
            entry.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
        })
    }

    /// Reference `key`, creating its entry if needed. Returns true while the
    /// state has no learned values.
    pub fn touch(&mut self, key: StateKey) -> bool {
        !self.entry_mut(key).learned
    }

    pub fn set(&mut self, key: StateKey, action: MetaAction, value: f32) {
        let entry = self.entry_mut(key);
        entry.values[action.index()] = value;
        entry.learned = true;
    }

    fn entry_mut(&mut self, key: StateKey) -> &mut QEntry {
        self.clock += 1;
        if !self.entries.contains_key(&key) {
            self.evict_for_insert();
        }
        let entry = self.entries.entry(key).or_default();
        entry.last_touched = self.clock;
        entry
    }

    fn evict_for_insert(&mut self) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.entries.len() >= capacity.max(1) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_touched)
                .map(|(key, _)| *key);
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
