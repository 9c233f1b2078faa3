use anyhow::{Context, Result};
use clap::Args;
use log::{info, warn};
use rustc_hash::FxHashSet;
use seq_io::fastq::Record;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::attributed;
use crate::coord::extract_coordinate_key;
use crate::fileformat;
use crate::fileformat::FastqGzWriter;
use crate::runconfig::RunConfig;

use super::run_lane_workers;

/// Per-lane checkpoint with the attributed coordinates, kept in the run root
pub const ATTRIBUTED_CHECKPOINT_SUFFIX: &str = "read_coordinates_to_eliminate.txt";
/// Marker substitution for the residual output files
pub const UNDETERMINED_MARKER: &str = "Undetermined_";
pub const CLEAN_MARKER: &str = "Undetermined_clean_";

#[derive(Args)]
pub struct CleanUndeterminedCMD {
    // master_demux config file in the run root
    #[arg(short = 'c', long = "config", value_parser = clap::value_parser!(PathBuf))]
    pub path_config: PathBuf,

    // Optional: how many lanes to clean in parallel (default: one worker per lane)
    #[arg(short = 't', long, value_parser = clap::value_parser!(usize))]
    pub threads: Option<usize>,
}
impl CleanUndeterminedCMD {
    /// Run the commandline option
    pub fn try_execute(&mut self) -> Result<()> {
        let config = RunConfig::from_file(&self.path_config)?;

        let params = CleanUndeterminedParams {
            config,
            threads: self.threads,
        };
        CleanUndetermined::run(Arc::new(params))?;

        log::info!("clean-undetermined has finished successfully");
        Ok(())
    }
}

pub struct CleanUndeterminedParams {
    pub config: RunConfig,
    pub threads: Option<usize>,
}

pub struct CleanUndetermined {}
impl CleanUndetermined {
    /// For each lane, gather the coordinates of every sample-attributed read
    /// and strip those reads out of the lane's Undetermined fastq files,
    /// writing residual files that hold only truly-unattributed reads
    pub fn run(params: Arc<CleanUndeterminedParams>) -> Result<()> {
        let project_paths = params.config.project_paths();
        info!("Sample project paths:");
        for path in &project_paths {
            info!("  {}", path.display());
        }

        let sample_files = fileformat::list_fastq_files(&project_paths);
        let primary = fileformat::primary_read_files(&sample_files);
        let lanes = fileformat::discover_lanes(&primary);

        // one Undetermined directory per lane group; projects of a group share it
        let undetermined_dirs: Vec<PathBuf> = params
            .config
            .undetermined_dirs()
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let undetermined_files = fileformat::list_fastq_files(&undetermined_dirs);

        for lane in fileformat::discover_lanes(&undetermined_files) {
            if !lanes.contains(&lane) {
                warn!(
                    "Lane {} has undetermined reads but no sample read files; skipping its undetermined files",
                    lane
                );
            }
        }

        if lanes.is_empty() {
            warn!("No sample read files found, nothing to clean");
            return Ok(());
        }
        info!("Processing lanes: {}", lanes.join(", "));

        let threads = params.threads;
        let undetermined_files = Arc::new(undetermined_files);
        run_lane_workers(&lanes, threads, move |lane| {
            process_lane(lane, &params.config, &undetermined_files)
        })
    }
}

fn process_lane(lane: &str, config: &RunConfig, undetermined_files: &[PathBuf]) -> Result<()> {
    info!("...... Processing lane {} ......", lane);
    let checkpoint = config
        .root
        .join(format!("{}_{}", lane, ATTRIBUTED_CHECKPOINT_SUFFIX));
    let attributed_set = attributed::build_or_load(lane, &config.project_paths(), &checkpoint)?;

    let lane_files = fileformat::files_for_lane(undetermined_files, lane);
    if lane_files.is_empty() {
        warn!("Lane {}: no undetermined fastq files found", lane);
        return Ok(());
    }
    for source in &lane_files {
        filter_undetermined(&attributed_set, source)?;
    }
    Ok(())
}

/// Stream one Undetermined fastq file and write every record whose
/// coordinate key is not in the attributed set to the residual output,
/// compressed. Skipped entirely when the output already exists.
pub fn filter_undetermined(attributed_set: &FxHashSet<String>, source: &Path) -> Result<()> {
    let undetermined_dir = source
        .parent()
        .with_context(|| format!("No parent directory for {}", source.display()))?;
    let mut clean_dir_name = undetermined_dir
        .file_name()
        .unwrap_or_default()
        .to_os_string();
    clean_dir_name.push("_clean");
    let clean_dir = undetermined_dir.with_file_name(clean_dir_name);
    fs::create_dir_all(&clean_dir)
        .with_context(|| format!("Cannot create output directory {}", clean_dir.display()))?;

    let source_name = source
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    let dest = clean_dir.join(source_name.replace(UNDETERMINED_MARKER, CLEAN_MARKER));
    if dest.exists() {
        info!("Output file {} already present, skipping", dest.display());
        return Ok(());
    }

    info!("Cleaning {} -> {}", source.display(), dest.display());
    let mut partial_name = dest.file_name().unwrap_or_default().to_os_string();
    partial_name.push(".partial");
    let partial = dest.with_file_name(partial_name);

    let mut reader = fileformat::open_fastq(source)?;
    let mut writer = FastqGzWriter::create(&partial)?;
    let mut num_kept: u64 = 0;
    let mut num_dropped: u64 = 0;
    while let Some(result) = reader.next() {
        let record =
            result.with_context(|| format!("Malformed fastq record in {}", source.display()))?;
        let head = std::str::from_utf8(record.head())
            .with_context(|| format!("Non-UTF8 read name in {}", source.display()))?;
        let key = extract_coordinate_key(head)?;
        if attributed_set.contains(&key) {
            num_dropped += 1;
        } else {
            writer.write_record(record.head(), record.seq(), record.qual())?;
            num_kept += 1;
        }
    }
    writer.finish()?;
    fs::rename(&partial, &dest)
        .with_context(|| format!("Cannot finalize output file {}", dest.display()))?;

    info!(
        "{}: kept {} reads, dropped {} attributed reads",
        dest.display(),
        num_kept,
        num_dropped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fastq(path: &Path, keys: &[&str]) {
        let mut writer = FastqGzWriter::create(path).unwrap();
        for key in keys {
            let head = format!("M1:2:FC:{} 1:N:0:ACGT", key);
            writer
                .write_record(head.as_bytes(), b"ACGT", b"FFFF")
                .unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_keys(path: &Path) -> Vec<String> {
        let mut reader = fileformat::open_fastq(path).unwrap();
        let mut keys = Vec::new();
        while let Some(result) = reader.next() {
            let record = result.unwrap();
            let head = std::str::from_utf8(record.head()).unwrap();
            keys.push(extract_coordinate_key(head).unwrap());
        }
        keys
    }

    /// Run layout: UnalignedBCL1/ProjA with one sample R1 file per lane,
    /// plus the sibling Undetermined directory.
    fn setup_run(dir: &Path) -> RunConfig {
        let text = "unaligned_suffix=BCL1\nsample_project=ProjA\n";
        let config = RunConfig::parse(text, dir.to_path_buf()).unwrap();

        let proj = dir.join("UnalignedBCL1/ProjA");
        let undet = dir.join("UnalignedBCL1/Undetermined");
        fs::create_dir_all(&proj).unwrap();
        fs::create_dir_all(&undet).unwrap();

        write_fastq(
            &proj.join("SampleA_S1_L001_R1_001.fastq.gz"),
            &["1:1101:10:10", "1:1101:20:20"],
        );
        write_fastq(
            &undet.join("Undetermined_S0_L001_R1_001.fastq.gz"),
            &["1:1101:10:10", "1:1102:30:30", "1:1103:40:40"],
        );
        config
    }

    #[test]
    fn residual_holds_only_unattributed_reads() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup_run(dir.path());

        CleanUndetermined::run(Arc::new(CleanUndeterminedParams {
            config,
            threads: Some(1),
        }))
        .unwrap();

        let dest = dir
            .path()
            .join("UnalignedBCL1/Undetermined_clean/Undetermined_clean_S0_L001_R1_001.fastq.gz");
        let keys = read_keys(&dest);
        assert_eq!(keys, vec!["1:1102:30:30", "1:1103:40:40"]);

        // conservation: kept + dropped == source records
        let source = dir
            .path()
            .join("UnalignedBCL1/Undetermined/Undetermined_S0_L001_R1_001.fastq.gz");
        assert_eq!(read_keys(&source).len(), keys.len() + 1);
    }

    #[test]
    fn second_run_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup_run(dir.path());

        let params = Arc::new(CleanUndeterminedParams {
            config,
            threads: Some(1),
        });
        CleanUndetermined::run(Arc::clone(&params)).unwrap();

        let dest = dir
            .path()
            .join("UnalignedBCL1/Undetermined_clean/Undetermined_clean_S0_L001_R1_001.fastq.gz");
        let first = fs::read(&dest).unwrap();

        CleanUndetermined::run(params).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), first);
    }

    #[test]
    fn all_read_type_variants_are_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup_run(dir.path());
        let undet = dir.path().join("UnalignedBCL1/Undetermined");
        for variant in ["R2", "I1", "I2", "R3"] {
            write_fastq(
                &undet.join(format!("Undetermined_S0_L001_{}_001.fastq.gz", variant)),
                &["1:1101:10:10", "1:1104:50:50"],
            );
        }

        CleanUndetermined::run(Arc::new(CleanUndeterminedParams {
            config,
            threads: Some(1),
        }))
        .unwrap();

        let clean = dir.path().join("UnalignedBCL1/Undetermined_clean");
        for variant in ["R2", "I1", "I2", "R3"] {
            let keys = read_keys(&clean.join(format!(
                "Undetermined_clean_S0_L001_{}_001.fastq.gz",
                variant
            )));
            assert_eq!(keys, vec!["1:1104:50:50"], "variant {}", variant);
        }
    }

    #[test]
    fn filter_skips_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let undet = dir.path().join("Undetermined");
        fs::create_dir_all(&undet).unwrap();
        let source = undet.join("Undetermined_S0_L001_R1_001.fastq.gz");
        write_fastq(&source, &["1:1101:10:10"]);

        let clean = dir.path().join("Undetermined_clean");
        fs::create_dir_all(&clean).unwrap();
        let dest = clean.join("Undetermined_clean_S0_L001_R1_001.fastq.gz");
        fs::write(&dest, b"sentinel").unwrap();

        let attributed_set: FxHashSet<String> = FxHashSet::default();
        filter_undetermined(&attributed_set, &source).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"sentinel");
    }

    #[test]
    fn lane_without_sample_reads_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup_run(dir.path());
        // undetermined reads for a lane with no sample read files
        let undet = dir.path().join("UnalignedBCL1/Undetermined");
        write_fastq(
            &undet.join("Undetermined_S0_L002_R1_001.fastq.gz"),
            &["2:1101:10:10"],
        );

        CleanUndetermined::run(Arc::new(CleanUndeterminedParams {
            config,
            threads: Some(1),
        }))
        .unwrap();

        let clean = dir.path().join("UnalignedBCL1/Undetermined_clean");
        assert!(clean
            .join("Undetermined_clean_S0_L001_R1_001.fastq.gz")
            .exists());
        assert!(!clean
            .join("Undetermined_clean_S0_L002_R1_001.fastq.gz")
            .exists());
    }
}
