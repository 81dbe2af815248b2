//! Chunk cache
//!
//! Small homogeneous elements (typically glyph bitmaps) are loaded and cached
//! in fixed-size batches. A chunk set, one per font key, holds a flat array of
//! chunk slots indexed by `index / element_count`.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

use tracing::{debug, trace};

use crate::cache::CacheObject;
use crate::error::{Error, Result};
use crate::face::Face;
use crate::font::FontRegistry;
use crate::lru::{Lru, LruClass};
use crate::node::{NodeId, NodeList, NodeOwner};

/// Chunk sets held by one chunk cache
pub const MAX_CHUNK_SETS: usize = 8;

/// Element stored in a chunk
pub trait ChunkElement {
    /// Placeholder for an element that failed to load
    fn missing() -> Self;
}

/// Geometry of a chunk set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizes {
    /// Elements per chunk
    pub element_count: u32,
    /// Number of addressable elements
    pub element_max: u32,
}

impl ChunkSizes {
    /// Chunks needed to cover every element, the last one possibly short
    pub fn num_chunks(&self) -> u32 {
        self.element_max.div_ceil(self.element_count)
    }

    fn span(&self, chunk_index: u32) -> ChunkSpan {
        let first = chunk_index * self.element_count;
        ChunkSpan {
            chunk_index,
            first,
            len: self.element_count.min(self.element_max - first),
        }
    }
}

/// Range of element indices loaded into one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub chunk_index: u32,
    /// First element index
    pub first: u32,
    /// Number of elements; short only for the last chunk
    pub len: u32,
}

impl ChunkSpan {
    pub fn indices(&self) -> Range<u32> {
        self.first..self.first + self.len
    }
}

/// Behavior of a concrete chunk cache
pub trait ChunkSetClass<F: Face>: 'static {
    /// Font key selecting a chunk set
    type Key: ?Sized;
    type SetData: 'static;
    type Element: ChunkElement + 'static;

    /// Chunk geometry for a new set. An error aborts set creation.
    fn sizes(&mut self, fonts: &mut FontRegistry<F>, key: &Self::Key) -> Result<ChunkSizes>;

    fn init_set(&mut self, key: &Self::Key) -> Result<Self::SetData>;

    fn done_set(&mut self, _data: Self::SetData) {}

    fn compare(&self, data: &Self::SetData, key: &Self::Key) -> bool;

    /// Load every element of `span`.
    ///
    /// The outer error fails the lookup; an inner error only marks that
    /// element as missing. One result per index of the span is expected.
    fn new_node(
        &mut self,
        fonts: &mut FontRegistry<F>,
        data: &Self::SetData,
        span: ChunkSpan,
    ) -> Result<Vec<Result<Self::Element>>>;

    /// Bytes charged against the manager budget
    fn size_node(&self, elements: &[Self::Element], data: &Self::SetData) -> usize;

    fn destroy_node(&mut self, _elements: Vec<Self::Element>, _data: &Self::SetData) {}
}

struct ChunkNode<E> {
    node: NodeId,
    elements: Vec<E>,
}

struct ChunkSet<D, E> {
    data: D,
    sizes: ChunkSizes,
    chunks: Vec<Option<ChunkNode<E>>>,
}

impl<D, E> ChunkSet<D, E> {
    fn chunk(&self, chunk_index: u32) -> Option<&ChunkNode<E>> {
        self.chunks.get(chunk_index as usize)?.as_ref()
    }

    fn len(&self) -> usize {
        self.chunks.iter().flatten().count()
    }
}

type SetOf<F, C> = ChunkSet<<C as ChunkSetClass<F>>::SetData, <C as ChunkSetClass<F>>::Element>;

/// Chunk cache over a [`ChunkSetClass`]
pub(crate) struct ChunkCache<F: Face, C: ChunkSetClass<F>> {
    class: C,
    cache_index: usize,
    sets: Lru<SetOf<F, C>>,
    last_set: Option<usize>,
    _face: PhantomData<fn(F)>,
}

struct SetLru<'a, F: Face, C: ChunkSetClass<F>> {
    class: &'a mut C,
    fonts: &'a mut FontRegistry<F>,
    nodes: &'a mut NodeList,
}

impl<F: Face, C: ChunkSetClass<F>> LruClass<C::Key> for SetLru<'_, F, C> {
    type Element = SetOf<F, C>;

    fn init_element(&mut self, key: &C::Key) -> Result<Self::Element> {
        let sizes = self.class.sizes(self.fonts, key)?;
        if sizes.element_count == 0 {
            return Err(Error::invalid_argument("chunk element count is zero"));
        }

        let num_chunks = sizes.num_chunks();
        let data = self.class.init_set(key)?;
        debug!(
            element_count = sizes.element_count,
            element_max = sizes.element_max,
            num_chunks,
            "chunk set created"
        );

        Ok(ChunkSet {
            data,
            sizes,
            chunks: (0..num_chunks).map(|_| None).collect(),
        })
    }

    fn done_element(&mut self, set: Self::Element) {
        destroy_set::<F, C>(self.class, self.nodes, set);
    }

    fn compare_element(&self, set: &Self::Element, key: &C::Key) -> bool {
        self.class.compare(&set.data, key)
    }

    fn can_flush(&self, set: &Self::Element) -> bool {
        !set.chunks
            .iter()
            .flatten()
            .any(|chunk| self.nodes.ref_count(chunk.node).is_some_and(|count| count > 0))
    }
}

fn destroy_set<F: Face, C: ChunkSetClass<F>>(class: &mut C, nodes: &mut NodeList, set: SetOf<F, C>) {
    let ChunkSet { data, chunks, .. } = set;
    let mut count = 0usize;

    for chunk in chunks.into_iter().flatten() {
        let size = class.size_node(&chunk.elements, &data);
        nodes.remove(chunk.node, size);
        class.destroy_node(chunk.elements, &data);
        count += 1;
    }

    class.done_set(data);
    debug!(chunks = count, "chunk set destroyed");
}

impl<F: Face, C: ChunkSetClass<F>> ChunkCache<F, C> {
    pub fn new(class: C, cache_index: usize) -> Self {
        Self {
            class,
            cache_index,
            sets: Lru::new(MAX_CHUNK_SETS),
            last_set: None,
            _face: PhantomData,
        }
    }

    /// Find or load the chunk holding element `index` of `key`.
    ///
    /// Returns the chunk node, the position of the element in the chunk and
    /// whether the chunk was already cached.
    pub fn lookup(
        &mut self,
        fonts: &mut FontRegistry<F>,
        nodes: &mut NodeList,
        key: &C::Key,
        index: u32,
    ) -> Result<(NodeId, u32, bool)> {
        let set_index = self.resolve_set(fonts, nodes, key)?;
        let set = self
            .sets
            .get_mut(set_index)
            .ok_or(Error::Corrupted("chunk set slot is empty"))?;

        if index >= set.sizes.element_max {
            return Err(Error::invalid_argument(format!(
                "element index {} out of range (max {})",
                index, set.sizes.element_max
            )));
        }

        let chunk_index = index / set.sizes.element_count;
        let offset = index % set.sizes.element_count;

        if let Some(chunk) = set.chunk(chunk_index) {
            nodes.touch(chunk.node);
            trace!(index, chunk_index, "chunk hit");
            return Ok((chunk.node, offset, true));
        }

        let span = set.sizes.span(chunk_index);
        let loaded = self.class.new_node(fonts, &set.data, span)?;
        if loaded.len() != span.len as usize {
            let elements = loaded.into_iter().filter_map(Result::ok).collect();
            self.class.destroy_node(elements, &set.data);
            return Err(Error::Corrupted("chunk class loaded a wrong element count"));
        }

        let elements: Vec<C::Element> = span
            .indices()
            .zip(loaded)
            .map(|(element_index, result)| {
                result.unwrap_or_else(|err| {
                    trace!(index = element_index, error = %err, "chunk element missing");
                    <C::Element as ChunkElement>::missing()
                })
            })
            .collect();

        let size = self.class.size_node(&elements, &set.data);
        let node = nodes.insert(
            NodeOwner {
                cache_index: self.cache_index,
                set_index,
                key: chunk_index,
            },
            size,
        );
        set.chunks[chunk_index as usize] = Some(ChunkNode { node, elements });
        trace!(chunk_index, len = span.len, size, "chunk cached");

        Ok((node, offset, false))
    }

    /// Elements of a cached chunk
    pub fn elements(&self, owner: &NodeOwner) -> Option<&[C::Element]> {
        let set = self.sets.get(owner.set_index)?;
        set.chunk(owner.key).map(|chunk| chunk.elements.as_slice())
    }

    #[cfg(test)]
    fn num_chunks(&self) -> usize {
        self.sets.iter().map(|(_, set)| set.len()).sum()
    }

    fn resolve_set(
        &mut self,
        fonts: &mut FontRegistry<F>,
        nodes: &mut NodeList,
        key: &C::Key,
    ) -> Result<usize> {
        if let Some(index) = self.last_set {
            if let Some(set) = self.sets.get(index) {
                if self.class.compare(&set.data, key) {
                    return Ok(index);
                }
            }
        }

        let mut lru = SetLru {
            class: &mut self.class,
            fonts,
            nodes,
        };
        let index = self.sets.lookup(key, &mut lru)?;
        self.last_set = Some(index);
        Ok(index)
    }
}

impl<F, C> CacheObject<F> for ChunkCache<F, C>
where
    F: Face + 'static,
    C: ChunkSetClass<F>,
{
    fn size_node(&self, owner: &NodeOwner) -> Option<usize> {
        let set = self.sets.get(owner.set_index)?;
        let chunk = set.chunk(owner.key)?;
        Some(self.class.size_node(&chunk.elements, &set.data))
    }

    fn destroy_node(&mut self, owner: &NodeOwner) -> bool {
        let Some(set) = self.sets.get_mut(owner.set_index) else {
            return false;
        };
        match set.chunks.get_mut(owner.key as usize).and_then(Option::take) {
            Some(chunk) => {
                self.class.destroy_node(chunk.elements, &set.data);
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

/// Typed handle to a chunk cache registered with a manager
pub struct ChunkCacheHandle<C> {
    pub(crate) index: usize,
    _class: PhantomData<fn() -> C>,
}

impl<C> ChunkCacheHandle<C> {
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

impl<C> Clone for ChunkCacheHandle<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ChunkCacheHandle<C> {}

impl<C> fmt::Debug for ChunkCacheHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkCacheHandle")
            .field("index", &self.index)
            .finish()
    }
}

/// A cached chunk and the position of the requested element in it
#[derive(Debug)]
pub struct ChunkRef<'a, E> {
    pub node: NodeId,
    pub index: u32,
    pub elements: &'a [E],
}

impl<'a, E> ChunkRef<'a, E> {
    /// The requested element
    pub fn element(&self) -> Option<&'a E> {
        self.elements.get(self.index as usize)
    }
}
