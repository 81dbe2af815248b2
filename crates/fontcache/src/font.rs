//! Face and size resolution
//!
//! Faces live in one bounded LRU, sizes in another. A size records the face
//! it was created from; evicting a face first evicts every size made from it.

use tracing::debug;

use crate::error::{Error, Result};
use crate::face::{Face, FaceId, FaceRequester, Font};
use crate::lru::{Lru, LruClass};

struct FaceEntry<F> {
    face_id: FaceId,
    face: F,
}

struct SizeEntry<S> {
    face_id: FaceId,
    width: u16,
    height: u16,
    size: S,
}

#[derive(Debug, Clone, Copy)]
struct SizeRequest {
    face_id: FaceId,
    width: u16,
    height: u16,
}

/// Open faces and active sizes, each bounded by an LRU.
///
/// Owned by [`CacheManager`](crate::CacheManager) and handed to cache classes
/// so they can resolve the face and size they render from.
pub struct FontRegistry<F: Face> {
    requester: Box<dyn FaceRequester<F>>,
    faces: Lru<FaceEntry<F>>,
    sizes: Lru<SizeEntry<F::Size>>,
}

impl<F: Face> FontRegistry<F> {
    pub(crate) fn new(
        requester: Box<dyn FaceRequester<F>>,
        max_faces: usize,
        max_sizes: usize,
    ) -> Self {
        Self {
            requester,
            faces: Lru::new(max_faces),
            sizes: Lru::new(max_sizes),
        }
    }

    /// Resolve a face, requesting it on a miss
    pub fn lookup_face(&mut self, face_id: FaceId) -> Result<&mut F> {
        let idx = self.face_slot(face_id)?;
        self.faces
            .get_mut(idx)
            .map(|entry| &mut entry.face)
            .ok_or(Error::Corrupted("face slot is empty"))
    }

    /// Resolve a face and its size for `font`
    pub fn lookup_size(&mut self, font: &Font) -> Result<(&mut F, &F::Size)> {
        let face_idx = self.face_slot(font.face_id)?;

        let Self { faces, sizes, .. } = self;
        let entry = faces
            .get_mut(face_idx)
            .ok_or(Error::Corrupted("face slot is empty"))?;

        let request = SizeRequest {
            face_id: font.face_id,
            width: font.pix_width,
            height: font.pix_height,
        };
        let mut class = SizeClass {
            face: &mut entry.face,
        };
        let size_idx = sizes.lookup(&request, &mut class)?;
        let size = sizes
            .get(size_idx)
            .ok_or(Error::Corrupted("size slot is empty"))?;

        Ok((&mut entry.face, &size.size))
    }

    /// Drop every size, then every face
    pub(crate) fn reset(&mut self) {
        self.sizes.reset(drop);
        self.faces.reset(|entry| {
            debug!(face_id = entry.face_id.0, "face released");
        });
    }

    /// Number of open faces
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Number of active sizes
    pub fn num_sizes(&self) -> usize {
        self.sizes.len()
    }

    /// Is `face_id` currently open?
    pub fn has_face(&self, face_id: FaceId) -> bool {
        self.faces.iter().any(|(_, entry)| entry.face_id == face_id)
    }

    /// Open faces, most recently used first
    pub fn face_ids(&self) -> Vec<FaceId> {
        self.faces.iter().map(|(_, entry)| entry.face_id).collect()
    }

    fn face_slot(&mut self, face_id: FaceId) -> Result<usize> {
        let Self {
            requester,
            faces,
            sizes,
        } = self;
        let mut class = FaceClass {
            requester: requester.as_mut(),
            sizes,
        };
        faces.lookup(&face_id, &mut class)
    }
}

struct FaceClass<'a, F: Face> {
    requester: &'a mut dyn FaceRequester<F>,
    sizes: &'a mut Lru<SizeEntry<F::Size>>,
}

impl<F: Face> LruClass<FaceId> for FaceClass<'_, F> {
    type Element = FaceEntry<F>;

    fn init_element(&mut self, face_id: &FaceId) -> Result<FaceEntry<F>> {
        let mut face = self.requester.request_face(*face_id)?;
        face.clear_default_size();
        debug!(face_id = face_id.0, "face loaded");
        Ok(FaceEntry {
            face_id: *face_id,
            face,
        })
    }

    fn done_element(&mut self, entry: FaceEntry<F>) {
        let removed = self
            .sizes
            .remove_selection(|size| size.face_id == entry.face_id, drop);
        debug!(
            face_id = entry.face_id.0,
            sizes = removed,
            "face evicted"
        );
    }

    fn compare_element(&self, entry: &FaceEntry<F>, face_id: &FaceId) -> bool {
        entry.face_id == *face_id
    }
}

struct SizeClass<'a, F> {
    face: &'a mut F,
}

impl<F: Face> LruClass<SizeRequest> for SizeClass<'_, F> {
    type Element = SizeEntry<F::Size>;

    fn init_element(&mut self, request: &SizeRequest) -> Result<SizeEntry<F::Size>> {
        let size = self.face.new_size(request.width, request.height)?;
        Ok(SizeEntry {
            face_id: request.face_id,
            width: request.width,
            height: request.height,
            size,
        })
    }

    fn done_element(&mut self, _entry: SizeEntry<F::Size>) {}

    fn flush_element(
        &mut self,
        mut entry: SizeEntry<F::Size>,
        request: &SizeRequest,
    ) -> Result<SizeEntry<F::Size>> {
        if entry.face_id != request.face_id {
            return self.init_element(request);
        }

        // Same face: rescale the existing size instead of allocating one
        self.face
            .set_pixel_sizes(&mut entry.size, request.width, request.height)?;
        entry.width = request.width;
        entry.height = request.height;
        Ok(entry)
    }

    fn compare_element(&self, entry: &SizeEntry<F::Size>, request: &SizeRequest) -> bool {
        entry.face_id == request.face_id
            && entry.width == request.width
            && entry.height == request.height
    }
}
