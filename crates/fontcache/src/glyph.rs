//! Glyph cache
//!
//! One node per (font key, glyph index). Nodes are grouped in glyph sets, one
//! per font key, and each set hashes its nodes into buckets by glyph index.
//! The sets themselves live in a small LRU owned by the cache.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, trace};

use crate::cache::CacheObject;
use crate::error::{Error, Result};
use crate::face::Face;
use crate::font::FontRegistry;
use crate::lru::{Lru, LruClass};
use crate::node::{NodeId, NodeList, NodeOwner};

/// Glyph sets held by one glyph cache
pub const MAX_GLYPH_SETS: usize = 8;
/// Default number of hash buckets per glyph set
pub const GSET_HASH_SIZE_DEFAULT: usize = 64;

/// Behavior of a concrete glyph cache
pub trait GlyphSetClass<F: Face>: 'static {
    /// Font key selecting a glyph set
    type Key: ?Sized;
    /// Per-set state, usually a copy of the key
    type SetData: 'static;
    /// Cached payload for one glyph
    type Node: 'static;

    /// Number of hash buckets in a new set
    fn hash_size(&self) -> usize {
        GSET_HASH_SIZE_DEFAULT
    }

    fn init_set(&mut self, key: &Self::Key) -> Result<Self::SetData>;

    fn done_set(&mut self, _data: Self::SetData) {}

    /// Does the set built from `data` answer to `key`?
    fn compare(&self, data: &Self::SetData, key: &Self::Key) -> bool;

    /// Build the payload for `glyph_index`
    fn new_node(
        &mut self,
        fonts: &mut FontRegistry<F>,
        data: &Self::SetData,
        glyph_index: u32,
    ) -> Result<Self::Node>;

    /// Bytes charged against the manager budget
    fn size_node(&self, node: &Self::Node, data: &Self::SetData) -> usize;

    fn destroy_node(&mut self, _node: Self::Node, _data: &Self::SetData) {}
}

struct GlyphNode<N> {
    glyph_index: u32,
    node: NodeId,
    value: N,
}

struct GlyphSet<D, N> {
    data: D,
    buckets: Vec<Vec<GlyphNode<N>>>,
}

impl<D, N> GlyphSet<D, N> {
    fn bucket(&self, glyph_index: u32) -> usize {
        glyph_index as usize % self.buckets.len()
    }

    fn find(&self, glyph_index: u32) -> Option<&GlyphNode<N>> {
        self.buckets[self.bucket(glyph_index)]
            .iter()
            .find(|node| node.glyph_index == glyph_index)
    }

    fn take(&mut self, glyph_index: u32) -> Option<GlyphNode<N>> {
        let bucket = self.bucket(glyph_index);
        let chain = &mut self.buckets[bucket];
        let pos = chain.iter().position(|node| node.glyph_index == glyph_index)?;
        Some(chain.remove(pos))
    }

    fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

type SetOf<F, C> = GlyphSet<<C as GlyphSetClass<F>>::SetData, <C as GlyphSetClass<F>>::Node>;

/// Glyph cache over a [`GlyphSetClass`]
pub(crate) struct GlyphCache<F: Face, C: GlyphSetClass<F>> {
    class: C,
    cache_index: usize,
    sets: Lru<SetOf<F, C>>,
    last_set: Option<usize>,
    _face: PhantomData<fn(F)>,
}

/// Set LRU lifecycle: creating a set allocates its buckets, retiring one
/// destroys all of its nodes. Sets holding a pinned node are not retired.
struct SetLru<'a, F: Face, C: GlyphSetClass<F>> {
    class: &'a mut C,
    nodes: &'a mut NodeList,
    _face: PhantomData<fn(F)>,
}

impl<F: Face, C: GlyphSetClass<F>> LruClass<C::Key> for SetLru<'_, F, C> {
    type Element = SetOf<F, C>;

    fn init_element(&mut self, key: &C::Key) -> Result<Self::Element> {
        let hash_size = self.class.hash_size().max(1);
        let data = self.class.init_set(key)?;
        debug!(hash_size, "glyph set created");
        Ok(GlyphSet {
            data,
            buckets: (0..hash_size).map(|_| Vec::new()).collect(),
        })
    }

    fn done_element(&mut self, set: Self::Element) {
        destroy_set::<F, C>(self.class, self.nodes, set);
    }

    fn compare_element(&self, set: &Self::Element, key: &C::Key) -> bool {
        self.class.compare(&set.data, key)
    }

    fn can_flush(&self, set: &Self::Element) -> bool {
        !set.buckets
            .iter()
            .flatten()
            .any(|node| self.nodes.ref_count(node.node).is_some_and(|count| count > 0))
    }
}

fn destroy_set<F: Face, C: GlyphSetClass<F>>(class: &mut C, nodes: &mut NodeList, set: SetOf<F, C>) {
    let GlyphSet { data, buckets } = set;
    let mut count = 0usize;

    for node in buckets.into_iter().flatten() {
        let size = class.size_node(&node.value, &data);
        nodes.remove(node.node, size);
        class.destroy_node(node.value, &data);
        count += 1;
    }

    class.done_set(data);
    debug!(nodes = count, "glyph set destroyed");
}

impl<F: Face, C: GlyphSetClass<F>> GlyphCache<F, C> {
    pub fn new(class: C, cache_index: usize) -> Self {
        Self {
            class,
            cache_index,
            sets: Lru::new(MAX_GLYPH_SETS),
            last_set: None,
            _face: PhantomData,
        }
    }

    /// Find or build the node for (`key`, `glyph_index`).
    ///
    /// Returns the node and whether it was already cached. A new node is
    /// linked at the front of the recency list; the caller runs compress.
    pub fn lookup(
        &mut self,
        fonts: &mut FontRegistry<F>,
        nodes: &mut NodeList,
        key: &C::Key,
        glyph_index: u32,
    ) -> Result<(NodeId, bool)> {
        let set_index = self.resolve_set(nodes, key)?;
        let set = self
            .sets
            .get_mut(set_index)
            .ok_or(Error::Corrupted("glyph set slot is empty"))?;

        let bucket = set.bucket(glyph_index);
        let chain = &mut set.buckets[bucket];
        if let Some(pos) = chain.iter().position(|node| node.glyph_index == glyph_index) {
            chain[..=pos].rotate_right(1);
            let node = chain[0].node;
            nodes.touch(node);
            trace!(glyph_index, "glyph hit");
            return Ok((node, true));
        }

        let value = self.class.new_node(fonts, &set.data, glyph_index)?;
        let size = self.class.size_node(&value, &set.data);
        let node = nodes.insert(
            NodeOwner {
                cache_index: self.cache_index,
                set_index,
                key: glyph_index,
            },
            size,
        );
        set.buckets[bucket].insert(
            0,
            GlyphNode {
                glyph_index,
                node,
                value,
            },
        );
        trace!(glyph_index, size, "glyph cached");

        Ok((node, false))
    }

    /// Payload of a cached node
    pub fn value(&self, owner: &NodeOwner) -> Option<&C::Node> {
        let set = self.sets.get(owner.set_index)?;
        set.find(owner.key).map(|node| &node.value)
    }

    #[cfg(test)]
    fn num_nodes(&self) -> usize {
        self.sets.iter().map(|(_, set)| set.len()).sum()
    }

    fn resolve_set(&mut self, nodes: &mut NodeList, key: &C::Key) -> Result<usize> {
        if let Some(index) = self.last_set {
            if let Some(set) = self.sets.get(index) {
                if self.class.compare(&set.data, key) {
                    return Ok(index);
                }
            }
        }

        let mut lru = SetLru {
            class: &mut self.class,
            nodes,
            _face: PhantomData,
        };
        let index = self.sets.lookup(key, &mut lru)?;
        self.last_set = Some(index);
        Ok(index)
    }
}

impl<F, C> CacheObject<F> for GlyphCache<F, C>
where
    F: Face + 'static,
    C: GlyphSetClass<F>,
{
    fn size_node(&self, owner: &NodeOwner) -> Option<usize> {
        let set = self.sets.get(owner.set_index)?;
        let node = set.find(owner.key)?;
        Some(self.class.size_node(&node.value, &set.data))
    }

    fn destroy_node(&mut self, owner: &NodeOwner) -> bool {
        let Some(set) = self.sets.get_mut(owner.set_index) else {
            return false;
        };
        match set.take(owner.key) {
            Some(node) => {
                self.class.destroy_node(node.value, &set.data);
                true
            }
            None => false,
        }
    }

    fn flush(&mut self, nodes: &mut NodeList) -> usize {
        let class = &mut self.class;
        let mut count = 0;
        self.sets.reset(|set| {
            destroy_set::<F, C>(class, nodes, set);
            count += 1;
        });
        self.last_set = None;
        count
    }

    fn num_sets(&self) -> usize {
        self.sets.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Typed handle to a glyph cache registered with a manager
pub struct GlyphCacheHandle<C> {
    pub(crate) index: usize,
    _class: PhantomData<fn() -> C>,
}

impl<C> GlyphCacheHandle<C> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _class: PhantomData,
        }
    }

    /// Slot in the manager's cache table
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<C> Clone for GlyphCacheHandle<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for GlyphCacheHandle<C> {}

impl<C> fmt::Debug for GlyphCacheHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlyphCacheHandle")
            .field("index", &self.index)
            .finish()
    }
}

/// A cached glyph node and its payload
#[derive(Debug)]
pub struct GlyphRef<'a, N> {
    pub node: NodeId,
    pub value: &'a N,
}
