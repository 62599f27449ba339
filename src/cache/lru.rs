//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.
//! Uses a HashMap index over a slab-backed doubly-linked list so touch and
//! remove are O(1).

use std::collections::HashMap;

/// Node in the recency list
#[derive(Debug)]
struct Node {
    key: String,
    prev: Option<usize>,
    next: Option<usize>,
}

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys are linked where:
/// - Head = Least recently used
/// - Tail = Most recently used
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Key to slot index
    index: HashMap<String, usize>,
    /// Slots, `None` when free
    nodes: Vec<Option<Node>>,
    /// Reusable slots
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used (moves to tail).
    ///
    /// If key is new, it is appended at the tail.
    pub fn touch(&mut self, key: &str) {
        if let Some(&idx) = self.index.get(key) {
            if self.tail == Some(idx) {
                return;
            }
            self.unlink(idx);
            self.link_back(idx);
            return;
        }

        let node = Node {
            key: key.to_string(),
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key.to_string(), idx);
        self.link_back(idx);
    }

    // == Remove ==
    /// Removes a key from the tracker. Returns false if it was not tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.index.remove(key) {
            Some(idx) => {
                self.unlink(idx);
                self.nodes[idx] = None;
                self.free.push(idx);
                true
            }
            None => false,
        }
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        self.iter().next()
    }

    // == Iter ==
    /// Iterates keys from least to most recently used.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tracker: self,
            cursor: self.head,
        }
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.index.clear();
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// Detaches a slot from its neighbours.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.nodes[idx] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = &mut self.nodes[p] {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = &mut self.nodes[n] {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = None;
        }
    }

    /// Appends a detached slot at the tail.
    fn link_back(&mut self, idx: usize) {
        let old_tail = self.tail;
        if let Some(node) = &mut self.nodes[idx] {
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => {
                if let Some(node) = &mut self.nodes[t] {
                    node.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }
}

// == Iterator ==
/// Head-to-tail iterator over tracked keys.
pub struct Iter<'a> {
    tracker: &'a LruTracker,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.tracker.nodes[idx].as_ref()?;
        self.cursor = node.next;
        Some(node.key.as_str())
    }
}
