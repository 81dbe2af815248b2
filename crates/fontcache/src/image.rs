//! Glyph image cache
//!
//! A glyph cache whose sets are keyed by [`ImageDesc`] and whose nodes hold a
//! detached copy of the loaded glyph: a bitmap for the bitmap image types, an
//! outline otherwise.

use std::mem;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::face::{Bitmap, Face, Font, GlyphMetrics, LoadFlags, Outline, SlotImage, Vector};
use crate::font::FontRegistry;
use crate::glyph::{GlyphCacheHandle, GlyphRef, GlyphSetClass};
use crate::manager::CacheManager;

bitflags! {
    /// Image format and rendering options of cached glyphs
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageType: u32 {
        /// Scalable outline instead of a rendered bitmap
        const OUTLINE = 1;
        /// 1-bit bitmaps
        const MONOCHROME = 1 << 4;
        const UNHINTED = 1 << 5;
        /// Force the auto-hinter
        const AUTOHINTED = 1 << 6;
        /// Outlines in font units
        const UNSCALED = 1 << 7;
        /// Ignore embedded bitmaps
        const NO_SBITS = 1 << 8;
    }
}

impl ImageType {
    /// Anti-aliased bitmaps
    pub const GRAYS: Self = Self::empty();
    /// Monochrome bitmaps
    pub const MONO: Self = Self::MONOCHROME;

    pub fn is_outline(self) -> bool {
        self.contains(Self::OUTLINE)
    }

    /// Flags passed to [`Face::load_glyph`] for this image type
    pub fn load_flags(self) -> LoadFlags {
        let mut flags = LoadFlags::empty();

        if self.is_outline() {
            flags |= LoadFlags::NO_BITMAP;
            if self.contains(Self::UNSCALED) {
                flags |= LoadFlags::NO_SCALE;
            }
        } else {
            flags |= LoadFlags::RENDER;
            if self.contains(Self::MONOCHROME) {
                flags |= LoadFlags::MONOCHROME;
            }
            if self.contains(Self::NO_SBITS) {
                flags |= LoadFlags::NO_BITMAP;
            }
        }

        if self.contains(Self::UNHINTED) {
            flags |= LoadFlags::NO_HINTING;
        }
        if self.contains(Self::AUTOHINTED) {
            flags |= LoadFlags::FORCE_AUTOHINT;
        }

        flags
    }
}

/// Font and image type selecting a glyph set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDesc {
    pub font: Font,
    pub image_type: ImageType,
}

impl ImageDesc {
    pub fn new(font: Font, image_type: ImageType) -> Self {
        Self { font, image_type }
    }
}

/// Cached glyph image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlyphImage {
    Bitmap {
        left: i32,
        top: i32,
        bitmap: Bitmap<'static>,
        metrics: GlyphMetrics,
    },
    Outline {
        outline: Outline,
        metrics: GlyphMetrics,
    },
}

impl GlyphImage {
    pub fn metrics(&self) -> &GlyphMetrics {
        match self {
            GlyphImage::Bitmap { metrics, .. } | GlyphImage::Outline { metrics, .. } => metrics,
        }
    }

    pub fn bitmap(&self) -> Option<&Bitmap<'static>> {
        match self {
            GlyphImage::Bitmap { bitmap, .. } => Some(bitmap),
            GlyphImage::Outline { .. } => None,
        }
    }

    pub fn outline(&self) -> Option<&Outline> {
        match self {
            GlyphImage::Outline { outline, .. } => Some(outline),
            GlyphImage::Bitmap { .. } => None,
        }
    }

    /// Bytes charged against the manager budget
    pub fn byte_size(&self) -> usize {
        let payload = match self {
            GlyphImage::Bitmap { bitmap, .. } => bitmap.byte_len(),
            GlyphImage::Outline { outline, .. } => {
                outline.points.len() * (mem::size_of::<Vector>() + mem::size_of::<u8>())
                    + outline.contours.len() * mem::size_of::<u16>()
            }
        };
        payload + mem::size_of::<Self>()
    }
}

/// Glyph set class of [`ImageCache`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSetClass;

impl<F: Face + 'static> GlyphSetClass<F> for ImageSetClass {
    type Key = ImageDesc;
    type SetData = ImageDesc;
    type Node = GlyphImage;

    fn init_set(&mut self, key: &ImageDesc) -> Result<ImageDesc> {
        Ok(*key)
    }

    fn compare(&self, data: &ImageDesc, key: &ImageDesc) -> bool {
        data == key
    }

    fn new_node(
        &mut self,
        fonts: &mut FontRegistry<F>,
        desc: &ImageDesc,
        glyph_index: u32,
    ) -> Result<GlyphImage> {
        let (face, size) = fonts.lookup_size(&desc.font)?;
        let slot = face.load_glyph(size, glyph_index, desc.image_type.load_flags())?;

        match slot.image {
            SlotImage::Bitmap { bitmap, left, top } => Ok(GlyphImage::Bitmap {
                left,
                top,
                bitmap: bitmap.into_owned(),
                metrics: slot.metrics,
            }),
            SlotImage::Outline(outline) => Ok(GlyphImage::Outline {
                outline,
                metrics: slot.metrics,
            }),
            SlotImage::Composite => Err(Error::invalid_argument(format!(
                "glyph {} has neither a bitmap nor an outline",
                glyph_index
            ))),
        }
    }

    fn size_node(&self, image: &GlyphImage, _desc: &ImageDesc) -> usize {
        image.byte_size()
    }
}

/// Cache of glyph images, registered with a [`CacheManager`]
#[derive(Debug, Clone, Copy)]
pub struct ImageCache {
    handle: GlyphCacheHandle<ImageSetClass>,
}

impl ImageCache {
    pub fn new<F: Face + 'static>(manager: &mut CacheManager<F>) -> Result<Self> {
        let handle = manager.register_glyph_cache(ImageSetClass)?;
        Ok(Self { handle })
    }

    /// Cached image of `glyph_index` rendered as `desc` describes
    pub fn lookup<'m, F: Face + 'static>(
        &self,
        manager: &'m mut CacheManager<F>,
        desc: &ImageDesc,
        glyph_index: u32,
    ) -> Result<&'m GlyphImage> {
        Ok(self.lookup_node(manager, desc, glyph_index)?.value)
    }

    /// Like [`lookup`](Self::lookup), also returning the node for pinning
    pub fn lookup_node<'m, F: Face + 'static>(
        &self,
        manager: &'m mut CacheManager<F>,
        desc: &ImageDesc,
        glyph_index: u32,
    ) -> Result<GlyphRef<'m, GlyphImage>> {
        manager.lookup_glyph(self.handle, desc, glyph_index)
    }

    pub fn handle(&self) -> GlyphCacheHandle<ImageSetClass> {
        self.handle
    }
}
