use anyhow::{bail, Result};
use clap::Subcommand;
use std::sync::Arc;

pub mod clean_undetermined;
pub mod sort_tiles;

pub use clean_undetermined::CleanUndetermined;
pub use clean_undetermined::CleanUndeterminedCMD;
pub use clean_undetermined::CleanUndeterminedParams;

pub use sort_tiles::SortTiles;
pub use sort_tiles::SortTilesCMD;
pub use sort_tiles::SortTilesParams;

///////////////////////////////
/// Possible subcommands to parse
#[derive(Subcommand)]
pub enum Commands {
    /// Remove all sample-attributed reads from the Undetermined fastq files
    CleanUndetermined(CleanUndeterminedCMD),
    /// Sort sample read coordinates into one file per tile
    SortTiles(SortTilesCMD),
}

/// Run one job per lane on a worker pool. Lanes are independent units of
/// work; results come back over a channel and any lane failure fails the
/// whole command, after every worker has finished.
pub(crate) fn run_lane_workers<F>(lanes: &[String], threads: Option<usize>, job: F) -> Result<()>
where
    F: Fn(&str) -> Result<()> + Send + Sync + 'static,
{
    let job = Arc::new(job);
    let num_workers = threads
        .unwrap_or(lanes.len())
        .clamp(1, lanes.len().max(1));
    let thread_pool = threadpool::ThreadPool::new(num_workers);
    let (tx, rx) = crossbeam::channel::unbounded::<(String, Result<()>)>();

    for lane in lanes {
        let lane = lane.clone();
        let job = Arc::clone(&job);
        let tx = tx.clone();
        thread_pool.execute(move || {
            let result = job(&lane);
            tx.send((lane, result)).expect("Lane result channel closed");
        });
    }
    drop(tx);
    thread_pool.join();

    let mut num_failed = 0;
    for (lane, result) in rx.iter() {
        if let Err(e) = result {
            log::error!("Lane {} failed: {:#}", lane, e);
            num_failed += 1;
        }
    }
    if num_failed > 0 {
        bail!("{} lane(s) failed", num_failed);
    }
    Ok(())
}
