//! Min-heap over the current head of every non-empty merge input.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Entries order by key, then by input index, so equal keys come out in
/// input declaration order.
pub struct MergeFrontier<K> {
    heap: BinaryHeap<Reverse<(K, usize)>>,
}

impl<K: Ord> Default for MergeFrontier<K> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<K: Ord> MergeFrontier<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: K, input: usize) {
        self.heap.push(Reverse((key, input)));
    }

    pub fn pop(&mut self) -> Option<(K, usize)> {
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    pub fn peek(&self) -> Option<(&K, usize)> {
        self.heap.peek().map(|Reverse((k, i))| (k, *i))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
