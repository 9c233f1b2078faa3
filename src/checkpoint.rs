use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only, newline-delimited key log used to checkpoint a completed
/// scan over the source read files.
///
/// Writes go to a `.partial` sibling path; only `commit` renames it into
/// place. A crash mid-scan therefore leaves a `.partial` file that is never
/// trusted on the next run, instead of a truncated checkpoint masquerading
/// as complete.
pub struct CheckpointLog {
    path: PathBuf,
    partial: PathBuf,
    writer: BufWriter<File>,
}

impl CheckpointLog {
    pub fn create(path: &Path) -> Result<CheckpointLog> {
        let partial = partial_path(path);
        let file = File::create(&partial)
            .with_context(|| format!("Cannot create checkpoint file {}", partial.display()))?;
        Ok(CheckpointLog {
            path: path.to_path_buf(),
            partial,
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, key: &str) -> Result<()> {
        self.writer.write_all(key.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flush, sync and atomically rename the log into its final path.
    pub fn commit(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        fs::rename(&self.partial, &self.path).with_context(|| {
            format!("Cannot commit checkpoint file {}", self.path.display())
        })?;
        Ok(self.path)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// A checkpoint is authoritative once it exists at its final path and holds
/// at least one key.
pub fn is_complete(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Rebuild the key set purely from a committed checkpoint, without touching
/// any source read file. Duplicate lines collapse.
pub fn load_key_set(path: &Path) -> Result<FxHashSet<String>> {
    let mut keys = FxHashSet::default();
    for line in line_reader(path)? {
        keys.insert(line?);
    }
    Ok(keys)
}

/// Line-by-line replay of a committed checkpoint.
pub fn line_reader(path: &Path) -> Result<impl Iterator<Item = std::io::Result<String>>> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open checkpoint file {}", path.display()))?;
    Ok(BufReader::new(file).lines())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncommitted_log_is_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        let mut log = CheckpointLog::create(&path).unwrap();
        log.append("1101:1000:2000").unwrap();
        drop(log);
        assert!(!is_complete(&path));
        assert!(path.with_file_name("keys.txt.partial").exists());
    }

    #[test]
    fn committed_log_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        let mut log = CheckpointLog::create(&path).unwrap();
        log.append("1101:1000:2000").unwrap();
        log.append("1101:1000:2000").unwrap();
        log.append("1102:500:600").unwrap();
        log.commit().unwrap();

        assert!(is_complete(&path));
        assert!(!path.with_file_name("keys.txt.partial").exists());

        let keys = load_key_set(&path).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("1101:1000:2000"));
        assert!(keys.contains("1102:500:600"));
    }

    #[test]
    fn empty_committed_log_is_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        let log = CheckpointLog::create(&path).unwrap();
        log.commit().unwrap();
        assert!(!is_complete(&path));
    }

    #[test]
    fn replay_preserves_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        let mut log = CheckpointLog::create(&path).unwrap();
        for key in ["a:1", "a:1", "b:2"] {
            log.append(key).unwrap();
        }
        log.commit().unwrap();

        let lines: Vec<String> = line_reader(&path)
            .unwrap()
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["a:1", "a:1", "b:2"]);
    }
}
