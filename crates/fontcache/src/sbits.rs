//! Small bitmap cache
//!
//! Chunk cache of compact glyph bitmaps rendered 16 at a time. Metrics are
//! stored in single bytes; a glyph whose bitmap or advances do not fit is
//! kept as missing rather than truncated.

use std::borrow::Cow;
use std::mem;

use tracing::{error, trace};

use crate::chunk::{ChunkCacheHandle, ChunkElement, ChunkRef, ChunkSetClass, ChunkSizes, ChunkSpan};
use crate::error::{Error, Result};
use crate::face::{round_26_6, Face, LoadFlags, PixelMode, SlotImage};
use crate::font::FontRegistry;
use crate::image::ImageDesc;
use crate::manager::CacheManager;

/// Glyphs loaded together in one chunk
pub const SBIT_ELEMENT_COUNT: u32 = 16;

/// Compact glyph bitmap.
///
/// A glyph that failed to render, or that does not fit, has no buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SBit {
    pub width: u8,
    pub height: u8,
    pub left: i8,
    pub top: i8,
    pub format: PixelMode,
    pub pitch: i8,
    /// Horizontal advance in pixels
    pub xadvance: i8,
    /// Vertical advance in pixels
    pub yadvance: i8,
    pub buffer: Option<Box<[u8]>>,
}

impl SBit {
    pub fn is_missing(&self) -> bool {
        self.buffer.is_none()
    }

    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// Size of the pixel data in bytes
    pub fn byte_len(&self) -> usize {
        match self.buffer {
            Some(_) => usize::from(self.pitch.unsigned_abs()) * usize::from(self.height),
            None => 0,
        }
    }
}

impl ChunkElement for SBit {
    fn missing() -> Self {
        Self::default()
    }
}

/// Chunk set class of [`SBitCache`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SBitSetClass;

impl<F: Face + 'static> ChunkSetClass<F> for SBitSetClass {
    type Key = ImageDesc;
    type SetData = ImageDesc;
    type Element = SBit;

    fn sizes(&mut self, fonts: &mut FontRegistry<F>, desc: &ImageDesc) -> Result<ChunkSizes> {
        let face = fonts.lookup_face(desc.font.face_id)?;
        Ok(ChunkSizes {
            element_count: SBIT_ELEMENT_COUNT,
            element_max: face.num_glyphs(),
        })
    }

    fn init_set(&mut self, desc: &ImageDesc) -> Result<ImageDesc> {
        Ok(*desc)
    }

    fn compare(&self, data: &ImageDesc, desc: &ImageDesc) -> bool {
        data == desc
    }

    fn new_node(
        &mut self,
        fonts: &mut FontRegistry<F>,
        desc: &ImageDesc,
        span: ChunkSpan,
    ) -> Result<Vec<Result<SBit>>> {
        if desc.image_type.is_outline() {
            error!(image_type = ?desc.image_type, "sbit cache cannot hold scalable glyphs");
            return Err(Error::invalid_argument(
                "outline image type requested from the sbit cache",
            ));
        }

        let flags = desc.image_type.load_flags();
        let (face, size) = fonts.lookup_size(&desc.font)?;

        Ok(span
            .indices()
            .map(|glyph_index| load_sbit(face, size, glyph_index, flags))
            .collect())
    }

    fn size_node(&self, sbits: &[SBit], _desc: &ImageDesc) -> usize {
        let records = SBIT_ELEMENT_COUNT as usize * mem::size_of::<SBit>();
        let pixels: usize = sbits.iter().map(SBit::byte_len).sum();
        mem::size_of::<Vec<SBit>>() + records + pixels
    }
}

fn load_sbit<F: Face>(face: &mut F, size: &F::Size, glyph_index: u32, flags: LoadFlags) -> Result<SBit> {
    let slot = face.load_glyph(size, glyph_index, flags)?;
    let metrics = slot.metrics;

    let SlotImage::Bitmap { bitmap, left, top } = slot.image else {
        return Err(Error::invalid_argument(format!(
            "glyph {} did not render to a bitmap",
            glyph_index
        )));
    };

    let (Ok(width), Ok(height), Ok(pitch), Ok(left), Ok(top), Ok(xadvance), Ok(yadvance)) = (
        u8::try_from(bitmap.width),
        u8::try_from(bitmap.rows),
        i8::try_from(bitmap.pitch),
        i8::try_from(left),
        i8::try_from(top),
        i8::try_from(round_26_6(metrics.hori_advance)),
        i8::try_from(round_26_6(metrics.vert_advance)),
    ) else {
        trace!(glyph_index, width = bitmap.width, rows = bitmap.rows, "bitmap too large for sbit");
        return Ok(SBit::missing());
    };

    let buffer = match bitmap.buffer {
        Cow::Owned(pixels) => pixels.into_boxed_slice(),
        Cow::Borrowed(pixels) => Box::from(pixels),
    };

    Ok(SBit {
        width,
        height,
        left,
        top,
        format: bitmap.pixel_mode,
        pitch,
        xadvance,
        yadvance,
        buffer: Some(buffer),
    })
}

/// Cache of small glyph bitmaps, registered with a [`CacheManager`]
#[derive(Debug, Clone, Copy)]
pub struct SBitCache {
    handle: ChunkCacheHandle<SBitSetClass>,
}

impl SBitCache {
    pub fn new<F: Face + 'static>(manager: &mut CacheManager<F>) -> Result<Self> {
        let handle = manager.register_chunk_cache(SBitSetClass)?;
        Ok(Self { handle })
    }

    /// Cached bitmap of `glyph_index`; check [`SBit::is_missing`]
    pub fn lookup<'m, F: Face + 'static>(
        &self,
        manager: &'m mut CacheManager<F>,
        desc: &ImageDesc,
        glyph_index: u32,
    ) -> Result<&'m SBit> {
        self.lookup_node(manager, desc, glyph_index)?
            .element()
            .ok_or(Error::Corrupted("sbit index outside its chunk"))
    }

    /// Like [`lookup`](Self::lookup), also returning the chunk node
    pub fn lookup_node<'m, F: Face + 'static>(
        &self,
        manager: &'m mut CacheManager<F>,
        desc: &ImageDesc,
        glyph_index: u32,
    ) -> Result<ChunkRef<'m, SBit>> {
        manager.lookup_chunk(self.handle, desc, glyph_index)
    }

    pub fn handle(&self) -> ChunkCacheHandle<SBitSetClass> {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::face::{FaceId, Font};
    use crate::image::ImageType;
    use crate::testing::{MockFace, MockLibrary};

    fn setup(library: &MockLibrary) -> (CacheManager<MockFace>, SBitCache) {
        let mut manager = CacheManager::new(ManagerConfig::default(), library.requester());
        let cache = SBitCache::new(&mut manager).unwrap();
        (manager, cache)
    }

    fn gray(width: u16, height: u16) -> ImageDesc {
        ImageDesc::new(Font::new(FaceId(1), width, height), ImageType::GRAYS)
    }

    #[test]
    fn test_chunk_loaded_at_once() {
        let library = MockLibrary::new(40);
        let (mut manager, cache) = setup(&library);

        let sbit = cache.lookup(&mut manager, &gray(6, 7), 18).unwrap();
        assert_eq!((sbit.width, sbit.height, sbit.pitch), (6, 7, 6));
        assert_eq!((sbit.left, sbit.top), (1, 7));
        assert_eq!((sbit.xadvance, sbit.yadvance), (6, 7));
        assert_eq!(sbit.format, PixelMode::Gray);
        assert_eq!(sbit.buffer().unwrap(), &[18u8; 42][..]);

        // The rest of the chunk came along without another load
        let chunk = cache.lookup_node(&mut manager, &gray(6, 7), 31).unwrap();
        assert_eq!(chunk.index, 15);
        assert_eq!(manager.stats().hits(), 1);
        assert_eq!(manager.total_nodes(), 1);
        assert_eq!(manager.lookup_face(FaceId(1)).unwrap().glyphs_loaded, 16);
    }

    #[test]
    fn test_borrowed_and_owned_buffers() {
        let library = MockLibrary::new(16);
        let (mut manager, cache) = setup(&library);
        let desc = ImageDesc::new(Font::new(FaceId(1), 9, 2), ImageType::MONO);

        let chunk = cache.lookup_node(&mut manager, &desc, 0).unwrap();
        // 9 pixels wide in mono takes 2 bytes per row
        for (index, sbit) in chunk.elements.iter().enumerate() {
            assert_eq!(sbit.pitch, 2);
            assert_eq!(sbit.buffer().unwrap(), &[index as u8; 4][..]);
        }
    }

    #[test]
    fn test_broken_glyph_is_missing() {
        let library = MockLibrary::new(32).with_broken(&[5]);
        let (mut manager, cache) = setup(&library);

        let sbit = cache.lookup(&mut manager, &gray(8, 8), 5).unwrap();
        assert!(sbit.is_missing());
        let sbit = cache.lookup(&mut manager, &gray(8, 8), 6).unwrap();
        assert!(!sbit.is_missing());
        assert_eq!(sbit.buffer().unwrap().len(), 64);
        assert_eq!(manager.total_nodes(), 1);
    }

    #[test]
    fn test_oversized_bitmap_is_missing() {
        let library = MockLibrary::new(16).with_huge(&[2]);
        let (mut manager, cache) = setup(&library);

        assert!(cache.lookup(&mut manager, &gray(8, 8), 2).unwrap().is_missing());
        assert!(!cache.lookup(&mut manager, &gray(8, 8), 3).unwrap().is_missing());

        // A 200 pixel wide glyph overflows the signed pitch and advance
        let big = gray(200, 10);
        assert!(cache.lookup(&mut manager, &big, 0).unwrap().is_missing());
    }

    #[test]
    fn test_outline_type_rejected() {
        let library = MockLibrary::new(16);
        let (mut manager, cache) = setup(&library);
        let desc = ImageDesc::new(Font::new(FaceId(1), 8, 8), ImageType::OUTLINE);

        assert!(matches!(
            cache.lookup(&mut manager, &desc, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(manager.total_nodes(), 0);
    }

    #[test]
    fn test_index_out_of_range() {
        let library = MockLibrary::new(20);
        let (mut manager, cache) = setup(&library);

        assert!(matches!(
            cache.lookup(&mut manager, &gray(8, 8), 20),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_node_size_counts_records_and_pixels() {
        let library = MockLibrary::new(20).with_broken(&[17]);
        let (mut manager, cache) = setup(&library);

        // Last chunk: glyphs 16..20, one of them missing
        cache.lookup(&mut manager, &gray(4, 4), 16).unwrap();
        let expected = mem::size_of::<Vec<SBit>>()
            + SBIT_ELEMENT_COUNT as usize * mem::size_of::<SBit>()
            + 3 * 16;
        assert_eq!(manager.total_bytes(), expected);
    }

    #[test]
    fn test_eviction_drops_chunks() {
        let library = MockLibrary::new(64);
        let mut manager: CacheManager<MockFace> = CacheManager::new(
            ManagerConfig::new().with_max_bytes(1),
            library.requester(),
        );
        let cache = SBitCache::new(&mut manager).unwrap();

        let first = cache.lookup_node(&mut manager, &gray(4, 4), 0).unwrap().node;
        let second = cache.lookup_node(&mut manager, &gray(4, 4), 16).unwrap().node;

        assert!(!manager.contains_node(first));
        assert!(manager.contains_node(second));
        assert_eq!(manager.stats().evictions(), 1);
    }
}
