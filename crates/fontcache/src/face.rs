//! Font engine interface
//!
//! The cache never parses fonts or rasterizes glyphs itself. It reaches the
//! engine through [`FaceRequester`] (opening faces on demand) and [`Face`]
//! (sizing and glyph loading).

use std::borrow::Cow;

use bitflags::bitflags;

use crate::error::Result;

/// Opaque client-chosen identifier of a face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaceId(pub u64);

/// A face at a given pixel size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Font {
    pub face_id: FaceId,
    pub pix_width: u16,
    pub pix_height: u16,
}

impl Font {
    pub fn new(face_id: FaceId, pix_width: u16, pix_height: u16) -> Self {
        Self {
            face_id,
            pix_width,
            pix_height,
        }
    }
}

bitflags! {
    /// Flags handed to [`Face::load_glyph`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LoadFlags: u32 {
        /// Rasterize the glyph into a bitmap
        const RENDER = 1 << 0;
        /// 1-bit rendering instead of 8-bit coverage
        const MONOCHROME = 1 << 1;
        /// Ignore embedded bitmaps
        const NO_BITMAP = 1 << 2;
        const NO_HINTING = 1 << 3;
        const FORCE_AUTOHINT = 1 << 4;
        /// Load in font units
        const NO_SCALE = 1 << 5;
    }
}

/// Pixel format of a rendered bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelMode {
    #[default]
    None,
    Mono,
    Gray,
}

/// Rendered glyph bitmap.
///
/// An owned buffer may be moved into the cache; a borrowed one belongs to the
/// face's glyph slot and is copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap<'a> {
    pub width: u32,
    pub rows: u32,
    /// Bytes per row, negative for bottom-up bitmaps
    pub pitch: i32,
    pub pixel_mode: PixelMode,
    pub buffer: Cow<'a, [u8]>,
}

impl Bitmap<'_> {
    /// Size of the pixel data in bytes
    pub fn byte_len(&self) -> usize {
        self.rows as usize * self.pitch.unsigned_abs() as usize
    }

    /// Detach from the glyph slot, copying the pixels if they are borrowed
    pub fn into_owned(self) -> Bitmap<'static> {
        Bitmap {
            width: self.width,
            rows: self.rows,
            pitch: self.pitch,
            pixel_mode: self.pixel_mode,
            buffer: Cow::Owned(self.buffer.into_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vector {
    pub x: i32,
    pub y: i32,
}

/// Scalable glyph outline
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outline {
    pub points: Vec<Vector>,
    pub tags: Vec<u8>,
    /// End point index of each contour
    pub contours: Vec<u16>,
}

/// Advances in 26.6 fixed point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphMetrics {
    pub hori_advance: i32,
    pub vert_advance: i32,
}

/// Image produced by the rasterizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotImage<'a> {
    Bitmap {
        bitmap: Bitmap<'a>,
        left: i32,
        top: i32,
    },
    Outline(Outline),
    /// Unresolved composite glyph; not cacheable
    Composite,
}

/// Result of loading one glyph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphSlot<'a> {
    pub metrics: GlyphMetrics,
    pub image: SlotImage<'a>,
}

/// An open face, as produced by a [`FaceRequester`]
pub trait Face {
    /// A face activated at given pixel dimensions
    type Size;

    /// Number of addressable glyphs
    fn num_glyphs(&self) -> u32;

    /// Release any size the engine attached when opening the face.
    ///
    /// Called right after loading; sizes are owned by the cache manager.
    fn clear_default_size(&mut self) {}

    /// Create a size, activate it and scale it to `width` x `height` pixels
    fn new_size(&mut self, width: u16, height: u16) -> Result<Self::Size>;

    /// Re-activate an existing size and rescale it in place
    fn set_pixel_sizes(&mut self, size: &mut Self::Size, width: u16, height: u16) -> Result<()>;

    /// Load (and, with [`LoadFlags::RENDER`], rasterize) a glyph
    fn load_glyph(
        &mut self,
        size: &Self::Size,
        glyph_index: u32,
        flags: LoadFlags,
    ) -> Result<GlyphSlot<'_>>;
}

/// Opens faces on demand
pub trait FaceRequester<F> {
    fn request_face(&mut self, face_id: FaceId) -> Result<F>;
}

impl<F, T> FaceRequester<F> for T
where
    T: FnMut(FaceId) -> Result<F>,
{
    fn request_face(&mut self, face_id: FaceId) -> Result<F> {
        self(face_id)
    }
}

/// Round a 26.6 fixed point value to whole pixels
pub(crate) fn round_26_6(value: i32) -> i32 {
    (value + 32) >> 6
}
