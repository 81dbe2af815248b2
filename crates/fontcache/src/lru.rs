//! Fixed-capacity LRU list with a pluggable element lifecycle
//!
//! Slots are pre-allocated and linked by index. A slot number stays valid for
//! as long as its element lives, so higher layers use it as a stable id for
//! the element (glyph sets and chunk sets are addressed this way).

use crate::error::{Error, Result};

/// Element lifecycle used by [`Lru::lookup`].
///
/// Implementations are usually short-lived adapters borrowing whatever
/// context element creation needs.
pub trait LruClass<K: ?Sized> {
    /// Element stored in each slot
    type Element;

    /// Build the element for `key`
    fn init_element(&mut self, key: &K) -> Result<Self::Element>;

    /// Finalize an element leaving the list
    fn done_element(&mut self, element: Self::Element);

    /// Recycle the evicted tail element for `key`.
    ///
    /// Override when resources can be reused in place. On error the element
    /// has been consumed and the slot is discarded.
    fn flush_element(&mut self, element: Self::Element, key: &K) -> Result<Self::Element> {
        self.done_element(element);
        self.init_element(key)
    }

    /// Does `element` answer to `key`?
    fn compare_element(&self, element: &Self::Element, key: &K) -> bool;

    /// May `element` be recycled to make room? Elements refusing are kept
    /// and the next least recently used one is tried.
    fn can_flush(&self, _element: &Self::Element) -> bool {
        true
    }
}

/// Slot in the LRU doubly-linked list
struct Node<E> {
    element: E,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU list with a fixed number of slots
pub struct Lru<E> {
    nodes: Vec<Option<Node<E>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    num_elements: usize,
}

impl<E> Lru<E> {
    /// Create a list able to hold `max_elements` elements
    pub fn new(max_elements: usize) -> Self {
        Self {
            nodes: (0..max_elements).map(|_| None).collect(),
            head: None,
            tail: None,
            // Popped from the end, so low slots are handed out first
            free_list: (0..max_elements).rev().collect(),
            num_elements: 0,
        }
    }

    /// Find the element answering to `key`, creating or recycling one if needed.
    ///
    /// Returns the slot of the element, which is now the most recently used.
    pub fn lookup<K, C>(&mut self, key: &K, class: &mut C) -> Result<usize>
    where
        K: ?Sized,
        C: LruClass<K, Element = E>,
    {
        if let Some(idx) = self.find(|element| class.compare_element(element, key)) {
            self.move_to_front(idx);
            return Ok(idx);
        }

        if self.num_elements < self.capacity() {
            let element = class.init_element(key)?;
            let idx = self
                .free_list
                .pop()
                .ok_or(Error::Corrupted("lru free list exhausted"))?;
            self.nodes[idx] = Some(Node {
                element,
                prev: None,
                next: None,
            });
            self.link_front(idx);
            self.num_elements += 1;
            return Ok(idx);
        }

        if self.tail.is_none() {
            return Err(Error::invalid_argument("lru list has no capacity"));
        }

        // Full: recycle the least recently used slot the class lets go of
        let idx = self
            .find_from_tail(|element| class.can_flush(element))
            .ok_or(Error::Pinned)?;
        self.unlink(idx);
        let node = self.nodes[idx]
            .take()
            .ok_or(Error::Corrupted("lru recycled slot is empty"))?;

        match class.flush_element(node.element, key) {
            Ok(element) => {
                self.nodes[idx] = Some(Node {
                    element,
                    prev: None,
                    next: None,
                });
                self.link_front(idx);
                Ok(idx)
            }
            Err(e) => {
                self.num_elements -= 1;
                self.free_list.push(idx);
                Err(e)
            }
        }
    }

    /// Detach and finalize the element in `idx`.
    ///
    /// Returns `false` if the slot was empty.
    pub fn remove(&mut self, idx: usize, done: impl FnOnce(E)) -> bool {
        if self.nodes.get(idx).map_or(true, Option::is_none) {
            return false;
        }

        self.unlink(idx);
        if let Some(node) = self.nodes[idx].take() {
            self.num_elements -= 1;
            self.free_list.push(idx);
            done(node.element);
        }
        true
    }

    /// Finalize every element for which `select` holds.
    ///
    /// Returns the number of elements removed.
    pub fn remove_selection(
        &mut self,
        mut select: impl FnMut(&E) -> bool,
        mut done: impl FnMut(E),
    ) -> usize {
        let mut removed = 0;
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            let (next, selected) = match &self.nodes[idx] {
                Some(node) => (node.next, select(&node.element)),
                None => break,
            };
            if selected && self.remove(idx, &mut done) {
                removed += 1;
            }
            cursor = next;
        }

        removed
    }

    /// Finalize all elements, keeping slot storage for reuse
    pub fn reset(&mut self, mut done: impl FnMut(E)) {
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            match self.nodes[idx].take() {
                Some(node) => {
                    cursor = node.next;
                    done(node.element);
                }
                None => break,
            }
        }

        for node in self.nodes.iter_mut() {
            *node = None;
        }
        self.free_list = (0..self.capacity()).rev().collect();
        self.head = None;
        self.tail = None;
        self.num_elements = 0;
    }

    /// Element in `idx`, without touching recency
    pub fn get(&self, idx: usize) -> Option<&E> {
        self.nodes.get(idx)?.as_ref().map(|node| &node.element)
    }

    /// Mutable element in `idx`, without touching recency
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut E> {
        self.nodes.get_mut(idx)?.as_mut().map(|node| &mut node.element)
    }

    /// Iterate `(slot, element)` from most to least recently used
    pub fn iter(&self) -> impl Iterator<Item = (usize, &E)> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let idx = cursor?;
            let node = self.nodes[idx].as_ref()?;
            cursor = node.next;
            Some((idx, &node.element))
        })
    }

    /// Number of live elements
    pub fn len(&self) -> usize {
        self.num_elements
    }

    /// Check if the list holds no element
    pub fn is_empty(&self) -> bool {
        self.num_elements == 0
    }

    /// Maximum number of elements
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    fn find(&self, mut matches: impl FnMut(&E) -> bool) -> Option<usize> {
        self.iter()
            .find(|(_, element)| matches(element))
            .map(|(idx, _)| idx)
    }

    fn find_from_tail(&self, mut matches: impl FnMut(&E) -> bool) -> Option<usize> {
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref()?;
            if matches(&node.element) {
                return Some(idx);
            }
            cursor = node.prev;
        }
        None
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = old_head;
        }

        if let Some(head_idx) = old_head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.nodes[idx] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Entry {
        key: u32,
        reused: bool,
    }

    #[derive(Default)]
    struct Counting {
        inits: Vec<u32>,
        dones: Vec<u32>,
        fail_on: Option<u32>,
        reuse: bool,
        locked: Vec<u32>,
    }

    impl LruClass<u32> for Counting {
        type Element = Entry;

        fn init_element(&mut self, key: &u32) -> Result<Entry> {
            if self.fail_on == Some(*key) {
                return Err(Error::invalid_argument("refused"));
            }
            self.inits.push(*key);
            Ok(Entry {
                key: *key,
                reused: false,
            })
        }

        fn done_element(&mut self, element: Entry) {
            self.dones.push(element.key);
        }

        fn flush_element(&mut self, mut element: Entry, key: &u32) -> Result<Entry> {
            if !self.reuse {
                self.done_element(element);
                return self.init_element(key);
            }
            if self.fail_on == Some(*key) {
                self.done_element(element);
                return Err(Error::invalid_argument("refused"));
            }
            element.key = *key;
            element.reused = true;
            Ok(element)
        }

        fn compare_element(&self, element: &Entry, key: &u32) -> bool {
            element.key == *key
        }

        fn can_flush(&self, element: &Entry) -> bool {
            !self.locked.contains(&element.key)
        }
    }

    fn keys(lru: &Lru<Entry>) -> Vec<u32> {
        lru.iter().map(|(_, e)| e.key).collect()
    }

    #[test]
    fn test_lookup_creates_then_hits() {
        let mut lru = Lru::new(3);
        let mut class = Counting::default();

        let a = lru.lookup(&1, &mut class).unwrap();
        let b = lru.lookup(&2, &mut class).unwrap();
        assert_ne!(a, b);
        assert_eq!(lru.lookup(&1, &mut class).unwrap(), a);

        assert_eq!(class.inits, vec![1, 2]);
        assert_eq!(keys(&lru), vec![1, 2]);
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_full_list_recycles_tail() {
        let mut lru = Lru::new(2);
        let mut class = Counting::default();

        let slot1 = lru.lookup(&1, &mut class).unwrap();
        lru.lookup(&2, &mut class).unwrap();
        let slot3 = lru.lookup(&3, &mut class).unwrap();

        // 1 was least recently used, its slot now holds 3
        assert_eq!(slot3, slot1);
        assert_eq!(class.dones, vec![1]);
        assert_eq!(keys(&lru), vec![3, 2]);
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_recycling_skips_locked_elements() {
        let mut lru = Lru::new(3);
        let mut class = Counting {
            locked: vec![1],
            ..Default::default()
        };

        lru.lookup(&1, &mut class).unwrap();
        let slot2 = lru.lookup(&2, &mut class).unwrap();
        lru.lookup(&3, &mut class).unwrap();

        // 1 is the tail but refuses, so 2 makes room
        assert_eq!(lru.lookup(&4, &mut class).unwrap(), slot2);
        assert_eq!(class.dones, vec![2]);
        assert_eq!(keys(&lru), vec![4, 3, 1]);

        class.locked = vec![1, 3, 4];
        assert!(matches!(lru.lookup(&5, &mut class), Err(Error::Pinned)));
        assert_eq!(keys(&lru), vec![4, 3, 1]);
        assert_eq!(lru.len(), 3);
    }

    #[test]
    fn test_flush_fast_path_reuses_element() {
        let mut lru = Lru::new(1);
        let mut class = Counting {
            reuse: true,
            ..Default::default()
        };

        lru.lookup(&1, &mut class).unwrap();
        let idx = lru.lookup(&2, &mut class).unwrap();

        assert!(class.dones.is_empty());
        assert_eq!(class.inits, vec![1]);
        assert_eq!(
            lru.get(idx),
            Some(&Entry {
                key: 2,
                reused: true
            })
        );
    }

    #[test]
    fn test_init_failure_leaves_no_slot() {
        let mut lru = Lru::new(2);
        let mut class = Counting {
            fail_on: Some(7),
            ..Default::default()
        };

        lru.lookup(&1, &mut class).unwrap();
        assert!(lru.lookup(&7, &mut class).is_err());
        assert_eq!(lru.len(), 1);

        // The slot is still available
        lru.lookup(&2, &mut class).unwrap();
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_flush_failure_discards_slot() {
        let mut lru = Lru::new(2);
        let mut class = Counting {
            fail_on: Some(9),
            reuse: true,
            ..Default::default()
        };

        lru.lookup(&1, &mut class).unwrap();
        lru.lookup(&2, &mut class).unwrap();
        assert!(lru.lookup(&9, &mut class).is_err());

        assert_eq!(class.dones, vec![1]);
        assert_eq!(keys(&lru), vec![2]);
        assert_eq!(lru.len(), 1);

        // Next miss takes the freed slot instead of recycling 2
        lru.lookup(&3, &mut class).unwrap();
        assert_eq!(keys(&lru), vec![3, 2]);
    }

    #[test]
    fn test_remove() {
        let mut lru = Lru::new(3);
        let mut class = Counting::default();

        let a = lru.lookup(&1, &mut class).unwrap();
        lru.lookup(&2, &mut class).unwrap();

        let mut removed = Vec::new();
        assert!(lru.remove(a, |e| removed.push(e.key)));
        assert!(!lru.remove(a, |e| removed.push(e.key)));

        assert_eq!(removed, vec![1]);
        assert_eq!(keys(&lru), vec![2]);
        assert!(lru.get(a).is_none());
    }

    #[test]
    fn test_remove_selection() {
        let mut lru = Lru::new(5);
        let mut class = Counting::default();
        for key in 1..=5 {
            lru.lookup(&key, &mut class).unwrap();
        }

        let mut removed = Vec::new();
        let count = lru.remove_selection(|e| e.key % 2 == 0, |e| removed.push(e.key));

        assert_eq!(count, 2);
        assert_eq!(removed, vec![4, 2]);
        assert_eq!(keys(&lru), vec![5, 3, 1]);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut lru = Lru::new(2);
        let mut class = Counting::default();
        lru.lookup(&1, &mut class).unwrap();
        lru.lookup(&2, &mut class).unwrap();

        let mut done = Vec::new();
        lru.reset(|e| done.push(e.key));

        assert_eq!(done, vec![2, 1]);
        assert!(lru.is_empty());
        assert_eq!(lru.capacity(), 2);

        lru.lookup(&3, &mut class).unwrap();
        lru.lookup(&4, &mut class).unwrap();
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_zero_capacity() {
        let mut lru: Lru<Entry> = Lru::new(0);
        let mut class = Counting::default();
        assert!(matches!(
            lru.lookup(&1, &mut class),
            Err(Error::InvalidArgument(_))
        ));
    }
}
