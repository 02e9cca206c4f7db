use crate::convert::{Converter, PartitionReport, PartitionStatus};
use crate::partition::PartitionKey;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Totals over every partition of a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub already_complete: usize,
    pub finished: usize,
    pub aborted: usize,
    /// Partitions that stopped on an I/O or store error
    pub failed: usize,
    pub days_written: usize,
    pub missing_inputs: usize,
}

impl RunSummary {
    fn record(&mut self, report: &PartitionReport) {
        match report.status {
            PartitionStatus::AlreadyComplete => self.already_complete += 1,
            PartitionStatus::Finished => self.finished += 1,
            PartitionStatus::Aborted(_) => self.aborted += 1,
        }
        self.days_written += report.written.len();
        self.missing_inputs += report.missing_inputs.len();
    }

    pub fn total(&self) -> usize {
        self.already_complete + self.finished + self.aborted + self.failed
    }
}

/// Run every partition on a pool of `jobs` blocking workers.
///
/// Each partition goes to exactly one worker. Partitions map to disjoint store
/// paths, so workers never contend on a store. A partition that fails is
/// logged and counted; the rest of the run continues.
pub async fn convert_local(
    converter: Arc<Converter>,
    partitions: Vec<PartitionKey>,
    jobs: usize,
) -> RunSummary {
    let jobs = jobs.max(1);
    log::info!(
        "Converting {} partitions with {} workers",
        partitions.len(),
        jobs
    );

    let permits = Arc::new(Semaphore::new(jobs));
    let mut set = JoinSet::new();

    for key in partitions {
        let converter = Arc::clone(&converter);
        let permits = Arc::clone(&permits);
        set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let task_key = key.clone();
            let result =
                tokio::task::spawn_blocking(move || converter.process_partition(&task_key)).await;
            (key, result)
        });
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(Ok(report)))) => summary.record(&report),
            Ok((key, Ok(Err(e)))) => {
                log::error!("{} failed: {}", key, e);
                summary.failed += 1;
            }
            Ok((key, Err(e))) => {
                log::error!("{} worker panicked: {}", key, e);
                summary.failed += 1;
            }
            Err(e) => {
                log::error!("partition task failed: {}", e);
                summary.failed += 1;
            }
        }
    }

    log::info!(
        "Done: {} complete, {} finished, {} aborted, {} failed ({} days written, {} missing inputs)",
        summary.already_complete,
        summary.finished,
        summary.aborted,
        summary.failed,
        summary.days_written,
        summary.missing_inputs
    );
    summary
}
