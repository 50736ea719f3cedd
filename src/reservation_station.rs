use crate::{model::SimId, util::Tag};
use std::collections::BTreeMap;

/// Issue window. Ordered by tag so iteration yields the oldest entry first.
#[derive(Debug, Clone)]
pub struct ReservationStation {
    waiting: BTreeMap<Tag, SimId>,
    capacity: usize,
}

impl ReservationStation {
    pub fn new(capacity: usize) -> Self {
        Self {
            waiting: BTreeMap::new(),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.waiting.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn insert(&mut self, tag: Tag, sim: SimId) {
        debug_assert!(!self.is_full());
        self.waiting.insert(tag, sim);
    }

    pub fn remove(&mut self, tag: Tag) -> Option<SimId> {
        self.waiting.remove(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, SimId)> + '_ {
        self.waiting.iter().map(|(&tag, &sim)| (tag, sim))
    }

    pub fn squash_from(&mut self, tag: Tag) -> Vec<SimId> {
        self.waiting.split_off(&tag).into_values().collect()
    }
}
