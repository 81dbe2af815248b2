//! Cache manager
//!
//! Owns the face and size LRUs, the table of registered caches and the
//! global recency list with its byte budget.
//!
//! ## Eviction
//!
//! Every glyph node and chunk node counts against `max_bytes`. When a lookup
//! inserts a node that pushes the total over budget, the new node is pinned,
//! [`CacheManager::compress`] evicts unpinned nodes from the least recently
//! used end, and the pin is dropped again. Nodes pinned by the caller through
//! [`CacheManager::pin_node`] are skipped the same way, and a glyph set or
//! chunk set holding a pinned node is never recycled for a new font key.

use tracing::{debug, error, trace};

use crate::cache::CacheTable;
use crate::chunk::{ChunkCache, ChunkCacheHandle, ChunkRef, ChunkSetClass};
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::face::{Face, FaceId, FaceRequester, Font};
use crate::font::FontRegistry;
use crate::glyph::{GlyphCache, GlyphCacheHandle, GlyphRef, GlyphSetClass};
use crate::node::{NodeId, NodeList, NodeOwner};
use crate::stats::CacheStats;

/// Bounded cache of faces, sizes and rendered glyph data
pub struct CacheManager<F: Face + 'static> {
    fonts: FontRegistry<F>,
    nodes: NodeList,
    caches: CacheTable<F>,
    stats: CacheStats,
}

impl<F: Face + 'static> CacheManager<F> {
    /// Create a manager; zero limits in `config` select the defaults
    pub fn new(config: ManagerConfig, requester: impl FaceRequester<F> + 'static) -> Self {
        let config = config.resolved();
        debug!(
            max_faces = config.max_faces,
            max_sizes = config.max_sizes,
            max_bytes = config.max_bytes,
            "cache manager created"
        );

        Self {
            fonts: FontRegistry::new(Box::new(requester), config.max_faces, config.max_sizes),
            nodes: NodeList::new(config.max_bytes),
            caches: CacheTable::new(),
            stats: CacheStats::new(),
        }
    }

    /// Resolve a face, requesting it on a miss
    pub fn lookup_face(&mut self, face_id: FaceId) -> Result<&mut F> {
        self.fonts.lookup_face(face_id)
    }

    /// Resolve a face and its size for `font`
    pub fn lookup_size(&mut self, font: &Font) -> Result<(&mut F, &F::Size)> {
        self.fonts.lookup_size(font)
    }

    /// Install a glyph cache built on `class`.
    ///
    /// Fails with [`Error::TooManyCaches`] once the table is full.
    pub fn register_glyph_cache<C>(&mut self, class: C) -> Result<GlyphCacheHandle<C>>
    where
        C: GlyphSetClass<F>,
    {
        let index = self
            .caches
            .register(|index| Box::new(GlyphCache::<F, C>::new(class, index)))?;
        debug!(index, "glyph cache registered");
        Ok(GlyphCacheHandle::new(index))
    }

    /// Install a chunk cache built on `class`
    pub fn register_chunk_cache<C>(&mut self, class: C) -> Result<ChunkCacheHandle<C>>
    where
        C: ChunkSetClass<F>,
    {
        let index = self
            .caches
            .register(|index| Box::new(ChunkCache::<F, C>::new(class, index)))?;
        debug!(index, "chunk cache registered");
        Ok(ChunkCacheHandle::new(index))
    }

    /// Find or build the glyph node for (`key`, `glyph_index`)
    pub fn lookup_glyph<C>(
        &mut self,
        handle: GlyphCacheHandle<C>,
        key: &C::Key,
        glyph_index: u32,
    ) -> Result<GlyphRef<'_, C::Node>>
    where
        C: GlyphSetClass<F>,
    {
        let cache = self.caches.downcast_mut::<GlyphCache<F, C>>(handle.index)?;
        let (node, hit) = cache.lookup(&mut self.fonts, &mut self.nodes, key, glyph_index)?;
        self.after_lookup(node, hit);

        let owner = self.owner_of(node)?;
        let cache = self.caches.downcast::<GlyphCache<F, C>>(handle.index)?;
        let value = cache
            .value(&owner)
            .ok_or(Error::Corrupted("glyph node has no payload"))?;
        Ok(GlyphRef { node, value })
    }

    /// Find or load the chunk holding element `index` of `key`
    pub fn lookup_chunk<C>(
        &mut self,
        handle: ChunkCacheHandle<C>,
        key: &C::Key,
        index: u32,
    ) -> Result<ChunkRef<'_, C::Element>>
    where
        C: ChunkSetClass<F>,
    {
        let cache = self.caches.downcast_mut::<ChunkCache<F, C>>(handle.index)?;
        let (node, offset, hit) = cache.lookup(&mut self.fonts, &mut self.nodes, key, index)?;
        self.after_lookup(node, hit);

        let owner = self.owner_of(node)?;
        let cache = self.caches.downcast::<ChunkCache<F, C>>(handle.index)?;
        let elements = cache
            .elements(&owner)
            .ok_or(Error::Corrupted("chunk node has no payload"))?;
        Ok(ChunkRef {
            node,
            index: offset,
            elements,
        })
    }

    /// Evict unpinned nodes, least recently used first, until the byte total
    /// fits the budget or only pinned nodes remain
    pub fn compress(&mut self) {
        if !self.nodes.is_over_budget() {
            return;
        }

        let before = self.nodes.num_bytes();
        let mut evicted = 0usize;
        let mut cursor = self.nodes.tail();

        while let Some(id) = cursor {
            if !self.nodes.is_over_budget() {
                break;
            }
            cursor = self.nodes.prev(id);

            if self.nodes.ref_count(id).unwrap_or(0) > 0 {
                trace!(?id, "skipping pinned node");
                continue;
            }
            let Some(owner) = self.nodes.owner(id) else {
                continue;
            };
            if let Some(size) = self.destroy_node(id, &owner) {
                self.stats.record_eviction(size);
                evicted += 1;
            }
        }

        debug!(
            evicted,
            freed = before - self.nodes.num_bytes(),
            total_bytes = self.nodes.num_bytes(),
            max_bytes = self.nodes.max_bytes(),
            "compress done"
        );
    }

    /// Drop every size and face.
    ///
    /// Registered caches keep their glyph and chunk nodes; call
    /// [`flush_caches`](Self::flush_caches) as well to drop everything.
    pub fn reset(&mut self) {
        self.fonts.reset();
        debug!("faces and sizes reset");
    }

    /// Destroy every glyph set and chunk set, keeping cache registrations
    pub fn flush_caches(&mut self) {
        let sets = self.caches.flush_all(&mut self.nodes);
        debug!(sets, "caches flushed");
    }

    /// Protect a node from eviction until the matching
    /// [`unpin_node`](Self::unpin_node).
    ///
    /// Returns `false` if the node is no longer cached. While pinned, the
    /// node survives compress and its set is not recycled; only
    /// [`flush_caches`](Self::flush_caches) drops it.
    pub fn pin_node(&mut self, node: NodeId) -> bool {
        self.nodes.add_ref(node)
    }

    /// Returns `false` if the node is gone or was not pinned
    pub fn unpin_node(&mut self, node: NodeId) -> bool {
        self.nodes.release(node)
    }

    /// Pin count of a node, `None` once it is gone
    pub fn node_ref_count(&self, node: NodeId) -> Option<i32> {
        self.nodes.ref_count(node)
    }

    /// Is the node still cached?
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Cached nodes, most recently used first
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter()
    }

    /// Bytes accounted for all cached nodes
    pub fn total_bytes(&self) -> usize {
        self.nodes.num_bytes()
    }

    /// Number of cached nodes across caches
    pub fn total_nodes(&self) -> usize {
        self.nodes.num_nodes()
    }

    /// Current byte budget
    pub fn max_bytes(&self) -> usize {
        self.nodes.max_bytes()
    }

    /// Change the byte budget and evict down to it
    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.nodes.set_max_bytes(max_bytes);
        self.compress();
    }

    /// Faces currently open
    pub fn num_faces(&self) -> usize {
        self.fonts.num_faces()
    }

    /// Sizes currently active
    pub fn num_sizes(&self) -> usize {
        self.fonts.num_sizes()
    }

    /// Number of registered caches
    pub fn num_caches(&self) -> usize {
        self.caches.len()
    }

    /// Number of live glyph sets and chunk sets across caches
    pub fn num_sets(&self) -> usize {
        self.caches.num_sets()
    }

    /// Open faces and active sizes
    pub fn fonts(&self) -> &FontRegistry<F> {
        &self.fonts
    }

    /// Lookup and eviction counters
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn after_lookup(&mut self, node: NodeId, hit: bool) {
        if hit {
            self.stats.record_hit();
            return;
        }

        self.stats.record_miss();
        if self.nodes.is_over_budget() {
            // The new node is the most recent one but may still be reached
            // once everything older is gone
            self.nodes.add_ref(node);
            self.compress();
            self.nodes.release(node);
        }
    }

    fn owner_of(&self, node: NodeId) -> Result<NodeOwner> {
        self.nodes
            .owner(node)
            .ok_or(Error::Corrupted("cached node left the recency list"))
    }

    /// Destroy a node through its cache and unlink it, returning its size.
    ///
    /// A node its cache cannot account for is unlinked all the same, with the
    /// bytes it was charged on insertion, so compress never revisits it.
    fn destroy_node(&mut self, id: NodeId, owner: &NodeOwner) -> Option<usize> {
        let Some(cache) = self.caches.get_mut(owner.cache_index) else {
            error!(cache_index = owner.cache_index, "node owned by an unregistered cache");
            self.unlink_orphan(id);
            return None;
        };
        let Some(size) = cache.size_node(owner) else {
            error!(?owner, "node missing from its cache");
            self.unlink_orphan(id);
            return None;
        };
        if !cache.destroy_node(owner) {
            error!(?owner, "cache failed to destroy node");
            self.nodes.remove(id, size);
            return None;
        }

        self.nodes.remove(id, size);
        Some(size)
    }

    fn unlink_orphan(&mut self, id: NodeId) {
        let size = self.nodes.size(id).unwrap_or(0);
        self.nodes.remove(id, size);
    }
}

impl<F: Face + 'static> Drop for CacheManager<F> {
    fn drop(&mut self) {
        self.flush_caches();
        self.fonts.reset();
    }
}
