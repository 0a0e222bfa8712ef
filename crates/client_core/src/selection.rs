//! Capacity-bounded, name-unique set of chosen species.

use std::sync::Arc;

use shared::domain::Species;

pub const SELECTION_CAPACITY: usize = 8;

/// Ordered selection; insertion order is display order.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    entries: Vec<Arc<Species>>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `species` unless the set is full or already holds the name.
    /// Returns whether the set changed.
    pub fn add(&mut self, species: Arc<Species>) -> bool {
        if self.is_full() || self.contains(&species.name) {
            return false;
        }
        self.entries.push(species);
        true
    }

    /// Removes the entry called `name`. Returns whether the set changed.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(idx) = self.entries.iter().position(|entry| entry.name == name) else {
            return false;
        };
        self.entries.remove(idx);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= SELECTION_CAPACITY
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn snapshot(&self) -> Vec<Arc<Species>> {
        self.entries.clone()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Species>> {
        self.entries.iter()
    }
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
