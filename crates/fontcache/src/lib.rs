//! # fontcache
//!
//! Bounded-memory cache manager for font faces, sizes and rendered glyphs.
//!
//! ## Architecture
//! - **Faces / sizes**: two fixed-capacity LRU lists; evicting a face evicts
//!   its sizes first
//! - **Glyph caches**: per-font-key glyph sets, hash-bucketed by glyph index
//! - **Chunk caches**: per-font-key chunk sets of batch-loaded small elements
//! - **Budget**: every cached node sits in one global recency list; going over
//!   `max_bytes` evicts unpinned nodes from the least recently used end
//!
//! The font engine stays outside: faces come from a [`FaceRequester`] and
//! glyphs are loaded through the [`Face`] trait.
//!
//! ## Example
//!
//! ```ignore
//! let mut manager = CacheManager::new(ManagerConfig::default(), open_face);
//! let sbits = SBitCache::new(&mut manager)?;
//!
//! let desc = ImageDesc::new(Font::new(FaceId(1), 16, 16), ImageType::GRAYS);
//! let sbit = sbits.lookup(&mut manager, &desc, glyph_index)?;
//! if !sbit.is_missing() {
//!     blit(sbit);
//! }
//! ```

mod cache;
mod chunk;
mod config;
mod error;
mod face;
mod font;
mod glyph;
mod image;
mod lru;
mod manager;
mod node;
mod sbits;
mod stats;

#[cfg(test)]
mod testing;

pub use cache::MAX_CACHES;
pub use chunk::{
    ChunkCacheHandle, ChunkElement, ChunkRef, ChunkSetClass, ChunkSizes, ChunkSpan, MAX_CHUNK_SETS,
};
pub use config::{ManagerConfig, MAX_BYTES_DEFAULT, MAX_FACES_DEFAULT, MAX_SIZES_DEFAULT};
pub use error::{Error, Result};
pub use face::{
    Bitmap, Face, FaceId, FaceRequester, Font, GlyphMetrics, GlyphSlot, LoadFlags, Outline,
    PixelMode, SlotImage, Vector,
};
pub use font::FontRegistry;
pub use glyph::{GlyphCacheHandle, GlyphRef, GlyphSetClass, GSET_HASH_SIZE_DEFAULT, MAX_GLYPH_SETS};
pub use image::{GlyphImage, ImageCache, ImageDesc, ImageSetClass, ImageType};
pub use lru::{Lru, LruClass};
pub use manager::CacheManager;
pub use node::NodeId;
pub use sbits::{SBit, SBitCache, SBitSetClass, SBIT_ELEMENT_COUNT};
pub use stats::{CacheStats, StatsSnapshot};
