//! Replays a scenario against a cache manager

use anyhow::{Context, Result};
use fontcache::{
    CacheManager, FaceId, Font, ImageCache, ImageDesc, ManagerConfig, SBitCache, StatsSnapshot,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::scenario::{CacheKind, Pass, Scenario};
use crate::synthetic::{SyntheticFace, SyntheticLibrary};

/// Lookup outcomes over the whole run
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct Outcomes {
    pub images: u64,
    pub sbits: u64,
    pub missing_sbits: u64,
    pub errors: u64,
}

/// Final state of the manager after a run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub limits: ManagerConfig,
    pub lookups: Outcomes,
    pub total_bytes: usize,
    pub total_nodes: usize,
    pub num_faces: usize,
    pub num_sizes: usize,
    pub num_caches: usize,
    pub num_sets: usize,
    pub stats: StatsSnapshot,
}

struct Simulator {
    manager: CacheManager<SyntheticFace>,
    images: ImageCache,
    sbits: SBitCache,
    outcomes: Outcomes,
}

impl Simulator {
    fn new(scenario: &Scenario) -> Result<Self> {
        let library = SyntheticLibrary::new(&scenario.fonts);
        let mut manager = CacheManager::new(scenario.manager, library.into_requester());
        let images = ImageCache::new(&mut manager).context("Failed to register image cache")?;
        let sbits = SBitCache::new(&mut manager).context("Failed to register sbit cache")?;

        Ok(Self {
            manager,
            images,
            sbits,
            outcomes: Outcomes::default(),
        })
    }

    fn run_pass(&mut self, pass: &Pass) {
        let font = Font::new(FaceId(pass.face_id), pass.pixel_size, pass.pixel_size);
        let desc = ImageDesc::new(font, pass.image.image_type());

        for glyph_index in pass.glyph_indices() {
            match pass.cache {
                CacheKind::Image => match self.images.lookup(&mut self.manager, &desc, glyph_index) {
                    Ok(_) => self.outcomes.images += 1,
                    Err(e) => {
                        warn!("Image lookup failed for glyph {}: {}", glyph_index, e);
                        self.outcomes.errors += 1;
                    }
                },
                CacheKind::Sbit => match self.sbits.lookup(&mut self.manager, &desc, glyph_index) {
                    Ok(sbit) if sbit.is_missing() => self.outcomes.missing_sbits += 1,
                    Ok(_) => self.outcomes.sbits += 1,
                    Err(e) => {
                        warn!("Sbit lookup failed for glyph {}: {}", glyph_index, e);
                        self.outcomes.errors += 1;
                    }
                },
            }
        }

        debug!(
            face_id = pass.face_id,
            pixel_size = pass.pixel_size,
            total_bytes = self.manager.total_bytes(),
            total_nodes = self.manager.total_nodes(),
            "pass done"
        );
    }

    fn report(&self, limits: ManagerConfig) -> Report {
        Report {
            limits,
            lookups: self.outcomes,
            total_bytes: self.manager.total_bytes(),
            total_nodes: self.manager.total_nodes(),
            num_faces: self.manager.num_faces(),
            num_sizes: self.manager.num_sizes(),
            num_caches: self.manager.num_caches(),
            num_sets: self.manager.num_sets(),
            stats: self.manager.stats().snapshot(),
        }
    }
}

/// Run every pass `scenario.repeat` times and report the final state
pub fn run(scenario: &Scenario) -> Result<Report> {
    let mut sim = Simulator::new(scenario)?;

    for round in 0..scenario.repeat {
        for pass in &scenario.passes {
            sim.run_pass(pass);
        }
        info!(
            "Round {} done: {} bytes in {} nodes",
            round + 1,
            sim.manager.total_bytes(),
            sim.manager.total_nodes()
        );
    }

    Ok(sim.report(scenario.manager.resolved()))
}
