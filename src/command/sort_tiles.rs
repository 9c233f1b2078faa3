use anyhow::{Context, Result};
use clap::Args;
use log::{info, warn};
use rustc_hash::FxHashMap;
use seq_io::fastq::Record;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::checkpoint::{self, CheckpointLog};
use crate::coord::{derive_tile_id, extract_coordinate_key};
use crate::fileformat;
use crate::runconfig::RunConfig;

use super::run_lane_workers;

/// Directory under the run root holding the per-tile coordinate files
pub const TILE_DIR_NAME: &str = "perTileReads";

#[derive(Args)]
pub struct SortTilesCMD {
    // master_demux config file in the run root
    #[arg(short = 'c', long = "config", value_parser = clap::value_parser!(PathBuf))]
    pub path_config: PathBuf,

    // Optional: how many lanes to shard in parallel (default: one worker per lane)
    #[arg(short = 't', long, value_parser = clap::value_parser!(usize))]
    pub threads: Option<usize>,
}
impl SortTilesCMD {
    /// Run the commandline option
    pub fn try_execute(&mut self) -> Result<()> {
        let config = RunConfig::from_file(&self.path_config)?;

        let params = SortTilesParams {
            config,
            threads: self.threads,
        };
        SortTiles::run(Arc::new(params))?;

        log::info!("sort-tiles has finished successfully");
        Ok(())
    }
}

pub struct SortTilesParams {
    pub config: RunConfig,
    pub threads: Option<usize>,
}

pub struct SortTiles {}
impl SortTiles {
    /// Extract the coordinate of every sample read and partition the
    /// coordinates into one file per tile, for per-tile quality analysis
    pub fn run(params: Arc<SortTilesParams>) -> Result<()> {
        let project_paths = params.config.project_paths();
        let sample_files = fileformat::list_fastq_files(&project_paths);
        let primary = fileformat::primary_read_files(&sample_files);
        let lanes = fileformat::discover_lanes(&primary);
        if lanes.is_empty() {
            warn!("No sample read files found, nothing to sort");
            return Ok(());
        }
        info!("Processing lanes: {}", lanes.join(", "));

        let tile_dir = params.config.root.join(TILE_DIR_NAME);
        fs::create_dir_all(&tile_dir)
            .with_context(|| format!("Cannot create tile directory {}", tile_dir.display()))?;

        let threads = params.threads;
        let primary = Arc::new(primary);
        run_lane_workers(&lanes, threads, move |lane| {
            let lane_files = fileformat::files_for_lane(&primary, lane);
            shard_lane(lane, &lane_files, &tile_dir)
        })
    }
}

/// Shard one lane's read coordinates into per-tile files.
///
/// The coordinate checkpoint doubles as the replay source: once committed,
/// re-runs derive the tile set from it without re-scanning any fastq file.
/// When every tile file already exists the lane is already sharded and is
/// skipped outright. Otherwise the tile files are recreated empty and the
/// checkpoint is replayed line by line; recreating keeps the tile files a
/// strict partition of the checkpoint even after a crashed replay.
pub fn shard_lane(lane: &str, sample_files: &[PathBuf], tile_dir: &Path) -> Result<()> {
    info!("...... Processing lane {} ......", lane);
    let checkpoint_path = tile_dir.join(format!("coordinates_{}.txt", lane));

    let tiles: BTreeSet<String>;
    if checkpoint::is_complete(&checkpoint_path) {
        info!(
            "Lane {}: coordinate checkpoint {} already present, deriving tiles from it",
            lane,
            checkpoint_path.display()
        );
        let mut seen = BTreeSet::new();
        for line in checkpoint::line_reader(&checkpoint_path)? {
            seen.insert(derive_tile_id(&line?));
        }
        tiles = seen;
    } else {
        let mut log = CheckpointLog::create(&checkpoint_path)?;
        let mut seen = BTreeSet::new();
        for file in sample_files {
            info!("Lane {}: extracting coordinates from {}", lane, file.display());
            let mut reader = fileformat::open_fastq(file)?;
            while let Some(result) = reader.next() {
                let record = result
                    .with_context(|| format!("Malformed fastq record in {}", file.display()))?;
                let head = std::str::from_utf8(record.head())
                    .with_context(|| format!("Non-UTF8 read name in {}", file.display()))?;
                let key = extract_coordinate_key(head)?;
                seen.insert(derive_tile_id(&key));
                log.append(&key)?;
            }
        }
        log.commit()?;
        tiles = seen;
    }

    if tiles.is_empty() {
        info!("Lane {}: no reads, nothing to shard", lane);
        return Ok(());
    }
    if tiles.iter().all(|tile| tile_dir.join(tile).exists()) {
        info!(
            "Lane {}: all {} tile files already present, skipping",
            lane,
            tiles.len()
        );
        return Ok(());
    }

    let mut writers: FxHashMap<String, BufWriter<File>> = FxHashMap::default();
    for tile in &tiles {
        let path = tile_dir.join(tile);
        let file = File::create(&path)
            .with_context(|| format!("Cannot create tile file {}", path.display()))?;
        writers.insert(tile.clone(), BufWriter::new(file));
    }

    for line in checkpoint::line_reader(&checkpoint_path)? {
        let key = line?;
        let tile = derive_tile_id(&key);
        let writer = writers
            .get_mut(&tile)
            .with_context(|| format!("No tile file for coordinate {}", key))?;
        writer.write_all(key.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    for (_, writer) in writers.iter_mut() {
        writer.flush()?;
    }
    info!("Lane {}: wrote {} tile files", lane, tiles.len());
    Ok(())
}
