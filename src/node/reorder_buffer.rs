use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::protocol::message_header::MessageHeader;

struct Entry<T> {
    header: MessageHeader,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.header.id == other.header.id
    }
}
impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.header.id.cmp(&other.header.id)
    }
}

/// Items that arrived ahead of their turn, keyed by ascending message id. Entries leave the
///  buffer only in increasing id order.
pub struct ReorderBuffer<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> ReorderBuffer<T> {
        ReorderBuffer {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, header: MessageHeader, item: T) {
        self.heap.push(Reverse(Entry { header, item }));
    }

    pub fn min_id(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.0.header.id)
    }

    /// removes and returns the entry with the smallest id if that id is <= `current_id`
    pub fn pop_ready(&mut self, current_id: u64) -> Option<(MessageHeader, T)> {
        match self.min_id() {
            Some(id) if id <= current_id => {
                self.heap.pop().map(|Reverse(e)| (e.header, e.item))
            }
            _ => None,
        }
    }

    /// removes all entries, in ascending id order
    pub fn drain_ordered(&mut self) -> Vec<(MessageHeader, T)> {
        let mut result = Vec::with_capacity(self.heap.len());
        while let Some(Reverse(e)) = self.heap.pop() {
            result.push((e.header, e.item));
        }
        result
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        ReorderBuffer::new()
    }
}
