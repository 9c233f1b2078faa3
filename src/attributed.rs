use anyhow::{Context, Result};
use log::info;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

use seq_io::fastq::Record;

use crate::checkpoint::{self, CheckpointLog};
use crate::coord::extract_coordinate_key;
use crate::fileformat;

/// Build the set of coordinate keys attributed to a sample for one lane, or
/// reload it from a committed checkpoint.
///
/// When the checkpoint is complete the set is rebuilt purely from it and no
/// source read file is reopened. Otherwise every sample project directory is
/// searched for the lane's primary read files; each record's key is appended
/// to the checkpoint log and accumulated in memory, and the log is committed
/// atomically once the scan finishes. The returned set is read-only from
/// then on and used only for membership tests.
pub fn build_or_load(
    lane: &str,
    project_paths: &[PathBuf],
    checkpoint_path: &Path,
) -> Result<FxHashSet<String>> {
    if checkpoint::is_complete(checkpoint_path) {
        info!(
            "Lane {}: attributed coordinates checkpoint {} already present, loading",
            lane,
            checkpoint_path.display()
        );
        let keys = checkpoint::load_key_set(checkpoint_path)?;
        info!("Lane {}: loaded {} attributed coordinates", lane, keys.len());
        return Ok(keys);
    }

    let all_files = fileformat::list_fastq_files(project_paths);
    let primary = fileformat::primary_read_files(&all_files);
    let lane_files = fileformat::files_for_lane(&primary, lane);

    let mut log = CheckpointLog::create(checkpoint_path)?;
    let mut keys: FxHashSet<String> = FxHashSet::default();
    for file in &lane_files {
        info!("Lane {}: extracting coordinates from {}", lane, file.display());
        let mut reader = fileformat::open_fastq(file)?;
        while let Some(result) = reader.next() {
            let record = result
                .with_context(|| format!("Malformed fastq record in {}", file.display()))?;
            let head = std::str::from_utf8(record.head())
                .with_context(|| format!("Non-UTF8 read name in {}", file.display()))?;
            let key = extract_coordinate_key(head)?;
            log.append(&key)?;
            keys.insert(key);
        }
    }
    log.commit()?;
    info!(
        "Lane {}: collected {} attributed coordinates from {} files",
        lane,
        keys.len(),
        lane_files.len()
    );
    Ok(keys)
}
