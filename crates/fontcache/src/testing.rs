//! Test doubles: a scripted font engine and fixed-size cache classes

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::chunk::{ChunkElement, ChunkSetClass, ChunkSizes, ChunkSpan};
use crate::error::{Error, Result};
use crate::face::{
    Bitmap, Face, FaceId, GlyphMetrics, GlyphSlot, LoadFlags, Outline, PixelMode, SlotImage,
    Vector,
};
use crate::font::FontRegistry;
use crate::glyph::{GlyphSetClass, GSET_HASH_SIZE_DEFAULT};

/// Hands out [`MockFace`]s and records every request
#[derive(Clone)]
pub(crate) struct MockLibrary {
    num_glyphs: u32,
    broken: Vec<u32>,
    huge: Vec<u32>,
    composite: Vec<u32>,
    requests: Rc<RefCell<Vec<FaceId>>>,
}

impl MockLibrary {
    /// Requesting this face (or any higher id) fails
    pub const MISSING_FACE: FaceId = FaceId(100);

    pub fn new(num_glyphs: u32) -> Self {
        Self {
            num_glyphs,
            broken: Vec::new(),
            huge: Vec::new(),
            composite: Vec::new(),
            requests: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Glyphs whose loading fails
    pub fn with_broken(mut self, glyphs: &[u32]) -> Self {
        self.broken.extend_from_slice(glyphs);
        self
    }

    /// Glyphs rendered 300 pixels wide
    pub fn with_huge(mut self, glyphs: &[u32]) -> Self {
        self.huge.extend_from_slice(glyphs);
        self
    }

    /// Glyphs loaded as unresolved composites
    pub fn with_composite(mut self, glyphs: &[u32]) -> Self {
        self.composite.extend_from_slice(glyphs);
        self
    }

    pub fn requests(&self) -> Vec<FaceId> {
        self.requests.borrow().clone()
    }

    pub fn requester(&self) -> impl FnMut(FaceId) -> Result<MockFace> + 'static {
        let library = self.clone();
        move |face_id| {
            library.requests.borrow_mut().push(face_id);
            if face_id.0 >= Self::MISSING_FACE.0 {
                return Err(Error::backend(format!("cannot open face {}", face_id.0)));
            }
            Ok(MockFace {
                id: face_id,
                has_default_size: true,
                sizes_created: 0,
                glyphs_loaded: 0,
                num_glyphs: library.num_glyphs,
                broken: library.broken.clone(),
                huge: library.huge.clone(),
                composite: library.composite.clone(),
                scratch: Vec::new(),
            })
        }
    }
}

#[derive(Debug)]
pub(crate) struct MockSize {
    pub serial: u32,
    pub width: u16,
    pub height: u16,
    pub rescales: u32,
}

/// Renders glyph `n` as a `width x height` box filled with `n`.
///
/// Even glyphs hand out an owned buffer, odd glyphs borrow the face's
/// scratch buffer.
pub(crate) struct MockFace {
    pub id: FaceId,
    pub has_default_size: bool,
    pub sizes_created: u32,
    pub glyphs_loaded: u32,
    num_glyphs: u32,
    broken: Vec<u32>,
    huge: Vec<u32>,
    composite: Vec<u32>,
    scratch: Vec<u8>,
}

impl Face for MockFace {
    type Size = MockSize;

    fn num_glyphs(&self) -> u32 {
        self.num_glyphs
    }

    fn clear_default_size(&mut self) {
        self.has_default_size = false;
    }

    fn new_size(&mut self, width: u16, height: u16) -> Result<MockSize> {
        if width == 0 || height == 0 {
            return Err(Error::backend("invalid pixel size"));
        }
        self.sizes_created += 1;
        Ok(MockSize {
            serial: self.sizes_created,
            width,
            height,
            rescales: 0,
        })
    }

    fn set_pixel_sizes(&mut self, size: &mut MockSize, width: u16, height: u16) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::backend("invalid pixel size"));
        }
        size.width = width;
        size.height = height;
        size.rescales += 1;
        Ok(())
    }

    fn load_glyph(
        &mut self,
        size: &MockSize,
        glyph_index: u32,
        flags: LoadFlags,
    ) -> Result<GlyphSlot<'_>> {
        if glyph_index >= self.num_glyphs || self.broken.contains(&glyph_index) {
            return Err(Error::backend(format!("cannot load glyph {}", glyph_index)));
        }
        self.glyphs_loaded += 1;

        let metrics = GlyphMetrics {
            hori_advance: i32::from(size.width) << 6,
            vert_advance: i32::from(size.height) << 6,
        };

        if self.composite.contains(&glyph_index) {
            return Ok(GlyphSlot {
                metrics,
                image: SlotImage::Composite,
            });
        }

        if flags.contains(LoadFlags::NO_BITMAP) && !flags.contains(LoadFlags::RENDER) {
            let points = (0..=glyph_index as i32)
                .map(|i| Vector { x: i, y: -i })
                .collect::<Vec<_>>();
            let outline = Outline {
                tags: vec![1; points.len()],
                contours: vec![glyph_index as u16],
                points,
            };
            return Ok(GlyphSlot {
                metrics,
                image: SlotImage::Outline(outline),
            });
        }

        let width = if self.huge.contains(&glyph_index) {
            300
        } else {
            u32::from(size.width)
        };
        let rows = u32::from(size.height);
        let (pixel_mode, pitch) = if flags.contains(LoadFlags::MONOCHROME) {
            (PixelMode::Mono, width.div_ceil(8))
        } else {
            (PixelMode::Gray, width)
        };
        let len = (pitch * rows) as usize;
        let fill = glyph_index as u8;

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
                left: 1,
                top: rows as i32,
            },
        })
    }
}

#[derive(Default)]
struct Counters {
    created: Cell<u32>,
    destroyed: Cell<u32>,
    sets_done: Cell<u32>,
}

/// Glyph class keyed by face id whose nodes are the glyph index and all
/// weigh the same
#[derive(Clone)]
pub(crate) struct FixedGlyphClass {
    node_size: usize,
    hash_size: usize,
    failing: Vec<u32>,
    counters: Rc<Counters>,
}

impl FixedGlyphClass {
    pub fn new(node_size: usize) -> Self {
        Self {
            node_size,
            hash_size: GSET_HASH_SIZE_DEFAULT,
            failing: Vec::new(),
            counters: Rc::default(),
        }
    }

    pub fn with_hash_size(mut self, hash_size: usize) -> Self {
        self.hash_size = hash_size;
        self
    }

    pub fn with_failing(mut self, glyph_index: u32) -> Self {
        self.failing.push(glyph_index);
        self
    }

    pub fn created(&self) -> u32 {
        self.counters.created.get()
    }

    pub fn destroyed(&self) -> u32 {
        self.counters.destroyed.get()
    }

    pub fn sets_done(&self) -> u32 {
        self.counters.sets_done.get()
    }
}

impl GlyphSetClass<MockFace> for FixedGlyphClass {
    type Key = FaceId;
    type SetData = FaceId;
    type Node = u32;

    fn hash_size(&self) -> usize {
        self.hash_size
    }

    fn init_set(&mut self, key: &FaceId) -> Result<FaceId> {
        Ok(*key)
    }

    fn done_set(&mut self, _data: FaceId) {
        bump(&self.counters.sets_done);
    }

    fn compare(&self, data: &FaceId, key: &FaceId) -> bool {
        data == key
    }

    fn new_node(
        &mut self,
        _fonts: &mut FontRegistry<MockFace>,
        _data: &FaceId,
        glyph_index: u32,
    ) -> Result<u32> {
        if self.failing.contains(&glyph_index) {
            return Err(Error::backend(format!("glyph {} failed", glyph_index)));
        }
        bump(&self.counters.created);
        Ok(glyph_index)
    }

    fn size_node(&self, _node: &u32, _data: &FaceId) -> usize {
        self.node_size
    }

    fn destroy_node(&mut self, _node: u32, _data: &FaceId) {
        bump(&self.counters.destroyed);
    }
}

/// Element holding its own index, `None` when missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TestElement(pub Option<u32>);

impl ChunkElement for TestElement {
    fn missing() -> Self {
        TestElement(None)
    }
}

/// Chunk class sized from the face's glyph count; every element weighs
/// 10 bytes
#[derive(Clone)]
pub(crate) struct FixedChunkClass {
    element_count: u32,
    failing: Vec<u32>,
    short_loads: bool,
    counters: Rc<Counters>,
}

impl FixedChunkClass {
    pub const ELEMENT_SIZE: usize = 10;

    pub fn new(element_count: u32) -> Self {
        Self {
            element_count,
            failing: Vec::new(),
            short_loads: false,
            counters: Rc::default(),
        }
    }

    pub fn with_failing(mut self, index: u32) -> Self {
        self.failing.push(index);
        self
    }

    /// Load one element less than asked for
    pub fn with_short_loads(mut self) -> Self {
        self.short_loads = true;
        self
    }

    pub fn sets_done(&self) -> u32 {
        self.counters.sets_done.get()
    }

    pub fn chunks_loaded(&self) -> u32 {
        self.counters.created.get()
    }

    pub fn chunks_destroyed(&self) -> u32 {
        self.counters.destroyed.get()
    }
}

impl ChunkSetClass<MockFace> for FixedChunkClass {
    type Key = FaceId;
    type SetData = FaceId;
    type Element = TestElement;

    fn sizes(&mut self, fonts: &mut FontRegistry<MockFace>, key: &FaceId) -> Result<ChunkSizes> {
        let face = fonts.lookup_face(*key)?;
        Ok(ChunkSizes {
            element_count: self.element_count,
            element_max: face.num_glyphs(),
        })
    }

    fn init_set(&mut self, key: &FaceId) -> Result<FaceId> {
        Ok(*key)
    }

    fn done_set(&mut self, _data: FaceId) {
        bump(&self.counters.sets_done);
    }

    fn compare(&self, data: &FaceId, key: &FaceId) -> bool {
        data == key
    }

    fn new_node(
        &mut self,
        _fonts: &mut FontRegistry<MockFace>,
        _data: &FaceId,
        span: ChunkSpan,
    ) -> Result<Vec<Result<TestElement>>> {
        bump(&self.counters.created);
        let mut indices = span.indices();
        if self.short_loads {
            indices.end -= 1;
        }
        Ok(indices
            .map(|index| {
                if self.failing.contains(&index) {
                    Err(Error::backend(format!("element {} failed", index)))
                } else {
                    Ok(TestElement(Some(index)))
                }
            })
            .collect())
    }

    fn size_node(&self, elements: &[TestElement], _data: &FaceId) -> usize {
        elements.len() * Self::ELEMENT_SIZE
    }

    fn destroy_node(&mut self, _elements: Vec<TestElement>, _data: &FaceId) {
        bump(&self.counters.destroyed);
    }
}

fn bump(counter: &Cell<u32>) {
    counter.set(counter.get() + 1);
}
