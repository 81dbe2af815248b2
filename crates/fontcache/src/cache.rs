//! Registered cache table
//!
//! The manager only knows caches through [`CacheObject`], which is enough to
//! size and destroy any node during compress. Typed access goes through the
//! handles returned at registration and a checked downcast.

use std::any::Any;

use tracing::error;

use crate::error::{Error, Result};
use crate::face::Face;
use crate::node::{NodeList, NodeOwner};

/// Number of caches a manager can hold
pub const MAX_CACHES: usize = 16;

/// Node operations the manager dispatches without knowing the cache kind
pub(crate) trait CacheObject<F: Face>: Any {
    /// Bytes accounted for the node, `None` if the owner is unknown
    fn size_node(&self, owner: &NodeOwner) -> Option<usize>;

    /// Drop the node payload from its set. The caller unlinks it from the
    /// recency list.
    fn destroy_node(&mut self, owner: &NodeOwner) -> bool;

    /// Destroy every set and its nodes, returning the number of sets dropped
    fn flush(&mut self, nodes: &mut NodeList) -> usize;

    /// Number of live sets
    fn num_sets(&self) -> usize;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Fixed-size table of registered caches
pub(crate) struct CacheTable<F: Face> {
    slots: Vec<Option<Box<dyn CacheObject<F>>>>,
}

impl<F: Face + 'static> CacheTable<F> {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_CACHES).map(|_| None).collect(),
        }
    }

    /// Install a cache in the first free slot.
    ///
    /// `build` receives the slot index so the cache can tag its nodes.
    pub fn register(
        &mut self,
        build: impl FnOnce(usize) -> Box<dyn CacheObject<F>>,
    ) -> Result<usize> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            error!(max = MAX_CACHES, "cache table is full");
            return Err(Error::TooManyCaches);
        };

        self.slots[index] = Some(build(index));
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&dyn CacheObject<F>> {
        self.slots.get(index)?.as_deref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn CacheObject<F> + 'static)> {
        self.slots.get_mut(index)?.as_deref_mut()
    }

    pub fn downcast<T: 'static>(&self, index: usize) -> Result<&T> {
        self.get(index)
            .and_then(|cache| cache.as_any().downcast_ref::<T>())
            .ok_or(Error::InvalidCacheHandle)
    }

    pub fn downcast_mut<T: 'static>(&mut self, index: usize) -> Result<&mut T> {
        self.get_mut(index)
            .and_then(|cache| cache.as_any_mut().downcast_mut::<T>())
            .ok_or(Error::InvalidCacheHandle)
    }

    /// Flush every registered cache, keeping the registrations
    pub fn flush_all(&mut self, nodes: &mut NodeList) -> usize {
        self.slots
            .iter_mut()
            .flatten()
            .map(|cache| cache.flush(nodes))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Total number of live sets across caches
    pub fn num_sets(&self) -> usize {
        self.slots.iter().flatten().map(|cache| cache.num_sets()).sum()
    }
}
