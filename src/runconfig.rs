use anyhow::{bail, Context, Result};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

/// One demultiplexing configuration applied to the raw lanes: a suffix
/// naming the Unaligned<suffix> output folder, and the sample projects
/// demultiplexed into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneGroup {
    pub suffix: String,
    pub projects: Vec<String>,
}

/// Parsed master_demux configuration for one sequencing run.
///
/// The configuration file lives in the run root and consists of repeated
/// blocks of key=value lines, e.g.
///
/// ```text
/// [DEMUX]
/// unaligned_suffix=BCL1
/// OverrideCycles=Y151;I10N6;I10;Y151
/// sample_project=SpiderConeSnail_MR,CoPo_JM,PhixSeqC_LG
/// ```
///
/// Only unaligned_suffix and sample_project are meaningful here; all other
/// lines are ignored.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Run root, i.e. the parent directory of the configuration file.
    pub root: PathBuf,
    /// Lane groups in the order their suffix first appeared.
    pub groups: Vec<LaneGroup>,
}

impl RunConfig {
    /// Read and parse a configuration file. A missing or unreadable file is
    /// a fatal error for the whole run.
    pub fn from_file(path: &Path) -> Result<RunConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let root = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        RunConfig::parse(&text, root)
    }

    pub fn parse(text: &str, root: PathBuf) -> Result<RunConfig> {
        let mut groups: Vec<LaneGroup> = Vec::new();
        let mut current_suffix: Option<String> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "unaligned_suffix" => {
                    current_suffix = Some(value.to_string());
                }
                "sample_project" => {
                    let Some(suffix) = current_suffix.clone() else {
                        bail!("Config error: sample_project line before any unaligned_suffix line");
                    };
                    let projects: Vec<String> =
                        value.split(',').map(|p| p.to_string()).collect();
                    if let Some(existing) =
                        groups.iter_mut().find(|g| g.suffix == suffix)
                    {
                        // Ambiguous config; keep the historical last-one-wins
                        // semantics but make the collision visible
                        warn!(
                            "Duplicate unaligned_suffix '{}' in config; overwriting earlier project list",
                            suffix
                        );
                        existing.projects = projects;
                    } else {
                        groups.push(LaneGroup { suffix, projects });
                    }
                }
                _ => {}
            }
        }

        Ok(RunConfig { root, groups })
    }

    /// Unaligned<suffix> directory for one lane group.
    pub fn unaligned_dir(&self, group: &LaneGroup) -> PathBuf {
        self.root.join(format!("Unaligned{}", group.suffix))
    }

    /// All sample project directories, in configuration order.
    pub fn project_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for group in &self.groups {
            let unaligned = self.unaligned_dir(group);
            for project in &group.projects {
                paths.push(unaligned.join(project));
            }
        }
        paths
    }

    /// Undetermined directories, one per lane group, in configuration order.
    /// They sit next to the sample projects inside Unaligned<suffix>.
    pub fn undetermined_dirs(&self) -> Vec<PathBuf> {
        self.groups
            .iter()
            .map(|g| self.unaligned_dir(g).join("Undetermined"))
            .collect()
    }
}
