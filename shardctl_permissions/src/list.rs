//! Sorted, borrowed views over a slice of permission entries.

use crate::entry::PermissionEntry;

/// A read-only view over entries of one kind, ordered by primary key.
///
/// Sorting happens on construction. Primary keys are not unique, since identity fields may
/// themselves contain `:` (`::1` and `a:b` give the same key as `::1:a` and `b`), so entries
/// that share a primary key are ordered by their rendering. The order therefore only depends on
/// the set of entries. The view borrows the entries and only lives as long as a single diff or
/// report.
#[derive(Debug)]
pub struct PermissionList<'a, T> {
    entries: Vec<(String, &'a T)>,
}

impl<'a, T: PermissionEntry> PermissionList<'a, T> {
    /// Sort `entries` by primary key, then by rendering
    pub fn new(entries: &'a [T]) -> Self {
        let mut entries: Vec<_> = entries.iter().map(|e| (e.primary_key(), e)).collect();
        entries.sort_by(|(ka, a), (kb, b)| {
            ka.cmp(kb)
                .then_with(|| a.to_string().cmp(&b.to_string()))
        });
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The primary key and rendering of the entry at `index`
    ///
    /// # Panics
    ///
    /// If `index` is out of bounds.
    pub fn get(&self, index: usize) -> (&str, String) {
        let (key, entry) = &self.entries[index];
        (key.as_str(), entry.to_string())
    }

    /// The primary key of the entry at `index`
    ///
    /// # Panics
    ///
    /// If `index` is out of bounds.
    pub fn primary_key(&self, index: usize) -> &str {
        &self.entries[index].0
    }

    /// Iterate over `(primary key, entry)` in primary key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &'a T)> + '_ {
        self.entries.iter().map(|(k, e)| (k.as_str(), *e))
    }
}
