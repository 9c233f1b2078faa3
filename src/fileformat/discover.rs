use itertools::Itertools;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

lazy_static! {
    /// Primary read files of a sample project, e.g. Sample1_S1_L001_R1_001.fastq.gz
    static ref PRIMARY_READ_RE: Regex = Regex::new(r"_R1_00\d\.fastq\.gz$").unwrap();
    /// Lane token inside a bcl2fastq/BCL Convert filename, e.g. _L001_
    static ref LANE_RE: Regex = Regex::new(r"_(L\d{3})_").unwrap();
}

/// List the fastq.gz files directly inside each of the given directories.
/// Directories that do not exist are skipped with a warning; the
/// demultiplexing step may legitimately not have produced them.
pub fn list_fastq_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            warn!("Directory {} not present, skipping", dir.display());
            continue;
        }
        for entry in WalkDir::new(dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && file_name(path).ends_with(".fastq.gz") {
                files.push(path.to_path_buf());
            }
        }
    }
    files
}

/// Keep only primary (R1) read files.
pub fn primary_read_files(files: &[PathBuf]) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|f| PRIMARY_READ_RE.is_match(&file_name(f)))
        .cloned()
        .collect()
}

/// Lane token of a read filename, if any.
pub fn lane_of(path: &Path) -> Option<String> {
    LANE_RE
        .captures(&file_name(path))
        .map(|c| c[1].to_string())
}

/// The distinct lanes the given files cover, sorted. The lane list is
/// data-driven rather than a fixed L001..L004 enumeration.
pub fn discover_lanes(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .filter_map(|f| lane_of(f))
        .sorted()
        .dedup()
        .collect()
}

/// Files belonging to one lane.
pub fn files_for_lane(files: &[PathBuf], lane: &str) -> Vec<PathBuf> {
    let token = format!("_{}_", lane);
    files
        .iter()
        .filter(|f| file_name(f).contains(&token))
        .cloned()
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
