//! fcsim - replays glyph lookup workloads against the font cache

mod scenario;
mod sim;
mod synthetic;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (JSON); the built-in workload is used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of open faces
    #[arg(long)]
    max_faces: Option<usize>,

    /// Override the number of active sizes
    #[arg(long)]
    max_sizes: Option<usize>,

    /// Override the byte budget for cached glyphs
    #[arg(long)]
    max_bytes: Option<usize>,

    /// Override the number of rounds
    #[arg(short, long)]
    repeat: Option<u32>,

    /// Print the report on one line
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("Starting fcsim v{}", env!("CARGO_PKG_VERSION"));

    let mut scenario = match &args.config {
        Some(path) => Scenario::load(path)?,
        None => {
            info!("No scenario file given, using the built-in workload");
            Scenario::builtin()
        }
    };

    if let Some(max_faces) = args.max_faces {
        scenario.manager.max_faces = max_faces;
    }
    if let Some(max_sizes) = args.max_sizes {
        scenario.manager.max_sizes = max_sizes;
    }
    if let Some(max_bytes) = args.max_bytes {
        scenario.manager.max_bytes = max_bytes;
    }
    if let Some(repeat) = args.repeat {
        scenario.repeat = repeat;
    }

    let limits = scenario.manager.resolved();
    info!(
        "Limits: {} faces, {} sizes, {} bytes",
        limits.max_faces, limits.max_sizes, limits.max_bytes
    );

    let report = sim::run(&scenario)?;
    info!(
        "Finished: {} hits, {} misses, {} evictions",
        report.stats.hits, report.stats.misses, report.stats.evictions
    );

    let output = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{}", output);

    Ok(())
}
