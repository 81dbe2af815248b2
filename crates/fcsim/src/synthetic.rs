//! Synthetic font engine
//!
//! Faces that render each glyph as a box whose width depends on the glyph
//! index, so workloads exercise varied node sizes without real font files.

use std::borrow::Cow;

use ahash::AHashMap;
use fontcache::{
    Bitmap, Error, Face, FaceId, GlyphMetrics, GlyphSlot, LoadFlags, Outline, PixelMode, Result,
    SlotImage, Vector,
};
use tracing::debug;

use crate::scenario::FontDef;

/// Active size of a [`SyntheticFace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticSize {
    pub width: u16,
    pub height: u16,
}

pub struct SyntheticFace {
    font: FontDef,
    scratch: Vec<u8>,
}

impl SyntheticFace {
    pub fn new(font: FontDef) -> Self {
        Self {
            font,
            scratch: Vec::new(),
        }
    }

    /// Box width in pixels: between 40% and 100% of the em width
    fn glyph_width(size: &SyntheticSize, glyph_index: u32) -> u32 {
        let percent = 40 + (glyph_index % 7) * 10;
        (u32::from(size.width) * percent / 100).max(1)
    }
}

impl Face for SyntheticFace {
    type Size = SyntheticSize;

    fn num_glyphs(&self) -> u32 {
        self.font.num_glyphs
    }

    fn new_size(&mut self, width: u16, height: u16) -> Result<SyntheticSize> {
        if width == 0 || height == 0 {
            return Err(Error::backend(format!(
                "face {}: invalid pixel size {}x{}",
                self.font.face_id, width, height
            )));
        }
        Ok(SyntheticSize { width, height })
    }

    fn set_pixel_sizes(
        &mut self,
        size: &mut SyntheticSize,
        width: u16,
        height: u16,
    ) -> Result<()> {
        *size = self.new_size(width, height)?;
        Ok(())
    }

    fn load_glyph(
        &mut self,
        size: &SyntheticSize,
        glyph_index: u32,
        flags: LoadFlags,
    ) -> Result<GlyphSlot<'_>> {
        if glyph_index >= self.font.num_glyphs {
            return Err(Error::backend(format!(
                "face {}: glyph {} out of range",
                self.font.face_id, glyph_index
            )));
        }
        if self.font.broken_glyphs.contains(&glyph_index) {
            return Err(Error::backend(format!(
                "face {}: glyph {} is damaged",
                self.font.face_id, glyph_index
            )));
        }

        let width = Self::glyph_width(size, glyph_index);
        let rows = u32::from(size.height);
        let metrics = GlyphMetrics {
            hori_advance: ((width + 1) << 6) as i32,
            vert_advance: ((rows + 2) << 6) as i32,
        };

        if flags.contains(LoadFlags::NO_BITMAP) && !flags.contains(LoadFlags::RENDER) {
            let (w, h) = (width as i32, rows as i32);
            let outline = Outline {
                points: vec![
                    Vector { x: 0, y: 0 },
                    Vector { x: w, y: 0 },
                    Vector { x: w, y: h },
                    Vector { x: 0, y: h },
                ],
                tags: vec![1; 4],
                contours: vec![3],
            };
            return Ok(GlyphSlot {
                metrics,
                image: SlotImage::Outline(outline),
            });
        }

        let (pixel_mode, pitch, fill) = if flags.contains(LoadFlags::MONOCHROME) {
            (PixelMode::Mono, width.div_ceil(8), 0xff)
        } else {
            (PixelMode::Gray, width, 0x80)
        };
        let len = (pitch * rows) as usize;

        // Alternate between a transferable buffer and one owned by the face
        let buffer = if glyph_index % 2 == 0 {
            Cow::Owned(vec![fill; len])
        } else {
            self.scratch.clear();
            self.scratch.resize(len, fill);
            Cow::Borrowed(&self.scratch[..])
        };

        Ok(GlyphSlot {
            metrics,
            image: SlotImage::Bitmap {
                bitmap: Bitmap {
                    width,
                    rows,
                    pitch: pitch as i32,
                    pixel_mode,
                    buffer,
                },
                left: 0,
                top: rows as i32,
            },
        })
    }
}

/// Opens [`SyntheticFace`]s by id
pub struct SyntheticLibrary {
    fonts: AHashMap<FaceId, FontDef>,
}

impl SyntheticLibrary {
    pub fn new(fonts: &[FontDef]) -> Self {
        let fonts = fonts
            .iter()
            .map(|font| (FaceId(font.face_id), font.clone()))
            .collect();
        Self { fonts }
    }

    pub fn open(&self, face_id: FaceId) -> Result<SyntheticFace> {
        let font = self
            .fonts
            .get(&face_id)
            .ok_or_else(|| Error::backend(format!("unknown face {}", face_id.0)))?;
        debug!(face_id = face_id.0, num_glyphs = font.num_glyphs, "opening synthetic face");
        Ok(SyntheticFace::new(font.clone()))
    }

    /// Face requester for a [`fontcache::CacheManager`]
    pub fn into_requester(self) -> impl FnMut(FaceId) -> Result<SyntheticFace> + 'static {
        move |face_id| self.open(face_id)
    }
}
