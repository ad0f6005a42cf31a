//! Ordered reassembly of page results.

use std::collections::BTreeMap;

/// Holds out-of-order items until every earlier page has arrived.
///
/// Pages are keyed by their index; [`pop_ready`](Self::pop_ready) yields
/// them strictly in ascending order starting at the first expected page.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> ReorderBuffer<T> {
    /// Buffer expecting `first_page` next.
    pub fn new(first_page: usize) -> Self {
        Self {
            next: first_page,
            pending: BTreeMap::new(),
        }
    }

    /// Store a page result. Returns the item back when the page was already
    /// delivered or is already waiting.
    pub fn insert(&mut self, page: usize, item: T) -> Result<(), T> {
        if page < self.next || self.pending.contains_key(&page) {
            return Err(item);
        }
        self.pending.insert(page, item);
        Ok(())
    }

    /// Take the next page if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(usize, T)> {
        let item = self.pending.remove(&self.next)?;
        let page = self.next;
        self.next += 1;
        Some((page, item))
    }

    /// Index of the next page to be delivered.
    pub fn next_page(&self) -> usize {
        self.next
    }

    /// Pages waiting for an earlier page.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// No pages waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
