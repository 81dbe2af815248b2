//! Manager limits

/// Faces kept open when the configured limit is zero
pub const MAX_FACES_DEFAULT: usize = 2;
/// Active sizes kept when the configured limit is zero
pub const MAX_SIZES_DEFAULT: usize = 4;
/// Byte budget for cached nodes when the configured limit is zero
pub const MAX_BYTES_DEFAULT: usize = 200_000;

/// Limits for a [`CacheManager`](crate::CacheManager).
///
/// A zero field selects the matching `*_DEFAULT` constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ManagerConfig {
    pub max_faces: usize,
    pub max_sizes: usize,
    pub max_bytes: usize,
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_faces(mut self, max_faces: usize) -> Self {
        self.max_faces = max_faces;
        self
    }

    pub fn with_max_sizes(mut self, max_sizes: usize) -> Self {
        self.max_sizes = max_sizes;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Same limits with zero fields replaced by the defaults
    pub fn resolved(self) -> Self {
        fn or_default(value: usize, default: usize) -> usize {
            if value == 0 {
                default
            } else {
                value
            }
        }

        Self {
            max_faces: or_default(self.max_faces, MAX_FACES_DEFAULT),
            max_sizes: or_default(self.max_sizes, MAX_SIZES_DEFAULT),
            max_bytes: or_default(self.max_bytes, MAX_BYTES_DEFAULT),
        }
    }
}
