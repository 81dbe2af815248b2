//! Workload description loaded from JSON

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use fontcache::{ImageType, ManagerConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A synthetic font
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FontDef {
    pub face_id: u64,
    pub num_glyphs: u32,
    /// Glyphs that fail to load
    #[serde(default)]
    pub broken_glyphs: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Grays,
    Mono,
    Outline,
}

impl ImageKind {
    pub fn image_type(self) -> ImageType {
        match self {
            ImageKind::Grays => ImageType::GRAYS,
            ImageKind::Mono => ImageType::MONO,
            ImageKind::Outline => ImageType::OUTLINE,
        }
    }
}

/// Which cache serves a pass
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Image,
    Sbit,
}

/// One series of lookups against one font, size and image type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pass {
    pub face_id: u64,
    pub pixel_size: u16,
    pub image: ImageKind,
    pub cache: CacheKind,
    /// Characters looked up by code point
    #[serde(default)]
    pub text: String,
    /// Extra glyph indices looked up after the text
    #[serde(default)]
    pub glyphs: Vec<u32>,
}

impl Pass {
    pub fn glyph_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.text
            .chars()
            .map(u32::from)
            .chain(self.glyphs.iter().copied())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    #[serde(default)]
    pub manager: ManagerConfig,
    pub fonts: Vec<FontDef>,
    pub passes: Vec<Pass>,
    /// Number of times the passes are replayed
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

fn default_repeat() -> u32 {
    1
}

impl Scenario {
    /// Load a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario =
            serde_json::from_str(&content).context("Failed to parse scenario file")?;

        info!(
            "Loaded scenario with {} fonts and {} passes from {}",
            scenario.fonts.len(),
            scenario.passes.len(),
            path.display()
        );
        Ok(scenario)
    }

    /// Scenario used when no file is given
    pub fn builtin() -> Self {
        let pangram = "The quick brown fox jumps over the lazy dog";
        let pass = |face_id, pixel_size, image, cache| Pass {
            face_id,
            pixel_size,
            image,
            cache,
            text: pangram.to_string(),
            glyphs: Vec::new(),
        };

        Self {
            manager: ManagerConfig::default(),
            fonts: vec![
                FontDef {
                    face_id: 1,
                    num_glyphs: 256,
                    broken_glyphs: vec![u32::from('q')],
                },
                FontDef {
                    face_id: 2,
                    num_glyphs: 512,
                    broken_glyphs: Vec::new(),
                },
            ],
            passes: vec![
                pass(1, 16, ImageKind::Grays, CacheKind::Image),
                pass(1, 16, ImageKind::Grays, CacheKind::Sbit),
                pass(2, 12, ImageKind::Mono, CacheKind::Sbit),
                pass(1, 24, ImageKind::Outline, CacheKind::Image),
                pass(2, 160, ImageKind::Grays, CacheKind::Sbit),
            ],
            repeat: 3,
        }
    }
}
