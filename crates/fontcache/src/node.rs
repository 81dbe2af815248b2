//! Global recency list of cache nodes
//!
//! Every glyph node and chunk node of every registered cache is linked here,
//! most recently used first. The list also carries the manager's byte and
//! node counters so they move together with membership.

/// Handle to a cached node.
///
/// Stays unique across slot reuse: once the node is evicted, the handle no
/// longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Back-reference from a node to the structure holding its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeOwner {
    /// Slot in the manager's cache table
    pub cache_index: usize,
    /// Slot of the glyph set or chunk set in the cache's set list
    pub set_index: usize,
    /// Glyph index (glyph caches) or chunk index (chunk caches)
    pub key: u32,
}

struct NodeRecord {
    owner: NodeOwner,
    /// Bytes charged at insertion
    size: usize,
    ref_count: i32,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slot {
    generation: u32,
    record: Option<NodeRecord>,
}

/// Doubly-linked recency list plus byte budget
pub(crate) struct NodeList {
    slots: Vec<Slot>,
    free_list: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    num_bytes: usize,
    num_nodes: usize,
    max_bytes: usize,
}

impl NodeList {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            head: None,
            tail: None,
            num_bytes: 0,
            num_nodes: 0,
            max_bytes,
        }
    }

    /// Link a new node at the front and account for its size
    pub fn insert(&mut self, owner: NodeOwner, size: usize) -> NodeId {
        let record = NodeRecord {
            owner,
            size,
            ref_count: 0,
            prev: None,
            next: None,
        };

        let idx = match self.free_list.pop() {
            Some(idx) => {
                self.slots[idx].record = Some(record);
                idx
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                self.slots.len() - 1
            }
        };

        self.link_front(idx);
        self.num_bytes += size;
        self.num_nodes += 1;

        NodeId {
            index: idx as u32,
            generation: self.slots[idx].generation,
        }
    }

    /// Unlink a node and release its share of the budget
    pub fn remove(&mut self, id: NodeId, size: usize) -> Option<NodeOwner> {
        let idx = self.resolve(id)?;
        self.unlink(idx);

        let slot = &mut self.slots[idx];
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(idx);

        self.num_bytes = self.num_bytes.saturating_sub(size);
        self.num_nodes = self.num_nodes.saturating_sub(1);
        Some(record.owner)
    }

    /// Mark a node as most recently used
    pub fn touch(&mut self, id: NodeId) {
        if let Some(idx) = self.resolve(id) {
            if self.head != Some(idx) {
                self.unlink(idx);
                self.link_front(idx);
            }
        }
    }

    pub fn add_ref(&mut self, id: NodeId) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.ref_count += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference; never goes below zero
    pub fn release(&mut self, id: NodeId) -> bool {
        match self.record_mut(id) {
            Some(record) if record.ref_count > 0 => {
                record.ref_count -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn ref_count(&self, id: NodeId) -> Option<i32> {
        self.record(id).map(|record| record.ref_count)
    }

    /// Bytes the node was charged when inserted
    pub fn size(&self, id: NodeId) -> Option<usize> {
        self.record(id).map(|record| record.size)
    }

    pub fn owner(&self, id: NodeId) -> Option<NodeOwner> {
        self.record(id).map(|record| record.owner)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.resolve(id).is_some()
    }

    /// Least recently used node
    pub fn tail(&self) -> Option<NodeId> {
        self.tail.map(|idx| self.id_at(idx))
    }

    /// Next node toward the most recently used end
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        let record = self.record(id)?;
        record.prev.map(|idx| self.id_at(idx))
    }

    /// Iterate nodes from most to least recently used
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let idx = cursor?;
            cursor = self.slots[idx].record.as_ref()?.next;
            Some(self.id_at(idx))
        })
    }

    pub fn is_over_budget(&self) -> bool {
        self.num_bytes > self.max_bytes
    }

    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
    }

    fn id_at(&self, idx: usize) -> NodeId {
        NodeId {
            index: idx as u32,
            generation: self.slots[idx].generation,
        }
    }

    fn resolve(&self, id: NodeId) -> Option<usize> {
        let idx = id.index as usize;
        let slot = self.slots.get(idx)?;
        (slot.generation == id.generation && slot.record.is_some()).then_some(idx)
    }

    fn record(&self, id: NodeId) -> Option<&NodeRecord> {
        let idx = self.resolve(id)?;
        self.slots[idx].record.as_ref()
    }

    fn record_mut(&mut self, id: NodeId) -> Option<&mut NodeRecord> {
        let idx = self.resolve(id)?;
        self.slots[idx].record.as_mut()
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;

        if let Some(record) = &mut self.slots[idx].record {
            record.prev = None;
            record.next = old_head;
        }

        if let Some(head_idx) = old_head {
            if let Some(head) = &mut self.slots[head_idx].record {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.slots[idx].record {
            Some(record) => (record.prev, record.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_record) = &mut self.slots[prev_idx].record {
                    prev_record.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_record) = &mut self.slots[next_idx].record {
                    next_record.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(record) = &mut self.slots[idx].record {
            record.prev = None;
            record.next = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(key: u32) -> NodeOwner {
        NodeOwner {
            cache_index: 0,
            set_index: 0,
            key,
        }
    }

    #[test]
    fn test_insert_and_order() {
        let mut list = NodeList::new(100);
        let a = list.insert(owner(1), 10);
        let b = list.insert(owner(2), 20);
        let c = list.insert(owner(3), 30);

        assert_eq!(list.iter().collect::<Vec<_>>(), vec![c, b, a]);
        assert_eq!(list.tail(), Some(a));
        assert_eq!(list.prev(a), Some(b));
        assert_eq!(list.num_bytes(), 60);
        assert_eq!(list.num_nodes(), 3);
    }

    #[test]
    fn test_touch_moves_to_front() {
        let mut list = NodeList::new(100);
        let a = list.insert(owner(1), 10);
        let b = list.insert(owner(2), 10);

        list.touch(a);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(list.tail(), Some(b));
    }

    #[test]
    fn test_remove_invalidates_handle() {
        let mut list = NodeList::new(100);
        let a = list.insert(owner(1), 10);
        let b = list.insert(owner(2), 15);

        assert_eq!(list.size(b), Some(15));
        assert_eq!(list.remove(a, 10), Some(owner(1)));
        assert_eq!(list.size(a), None);
        assert!(!list.contains(a));
        assert_eq!(list.remove(a, 10), None);
        assert_eq!(list.num_bytes(), 15);
        assert_eq!(list.num_nodes(), 1);

        // Slot is reused under a new generation
        let c = list.insert(owner(3), 5);
        assert_ne!(a, c);
        assert!(list.owner(a).is_none());
        assert_eq!(list.owner(c), Some(owner(3)));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![c, b]);
    }

    #[test]
    fn test_ref_counting() {
        let mut list = NodeList::new(100);
        let a = list.insert(owner(1), 10);

        assert!(list.add_ref(a));
        assert!(list.add_ref(a));
        assert_eq!(list.ref_count(a), Some(2));
        assert!(list.release(a));
        assert!(list.release(a));
        assert!(!list.release(a));
        assert_eq!(list.ref_count(a), Some(0));
    }

    #[test]
    fn test_budget() {
        let mut list = NodeList::new(25);
        list.insert(owner(1), 10);
        assert!(!list.is_over_budget());
        list.insert(owner(2), 20);
        assert!(list.is_over_budget());
        list.set_max_bytes(30);
        assert!(!list.is_over_budget());
    }
}
