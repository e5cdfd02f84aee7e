use std::time::Duration;

use trielog_types::Offset;

/// What happened to one appended batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Durable at `first_offset..=last_offset` and indexed.
    Committed { first_offset: Offset, last_offset: Offset },
    /// The log did not store the batch; none of its nodes were indexed.
    Failed { error: String },
}

/// One batch of an `update` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of nodes in the batch.
    pub records: usize,
    /// Uncompressed encoded size of the batch.
    pub size: usize,
    pub outcome: BatchOutcome,
}

impl BatchReport {
    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Committed { .. })
    }
}

/// Result of `NodeStore::update`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Batches in append order.
    pub batches: Vec<BatchReport>,
    /// Index entries written for committed batches.
    pub index_entries_written: usize,
    /// Upserts skipped because the node was already stored.
    pub already_present: usize,
    /// Removal requests received and ignored.
    pub removals_ignored: usize,
}

impl UpdateReport {
    /// Nodes durably written by this call.
    pub fn committed_records(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.is_committed())
            .map(|b| b.records)
            .sum()
    }

    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchReport> {
        self.batches.iter().filter(|b| !b.is_committed())
    }

    /// `true` when every batch was committed.
    pub fn is_complete(&self) -> bool {
        self.batches.iter().all(BatchReport::is_committed)
    }
}

/// Read-path latency counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Completed `get_with_offset` calls.
    pub reads: u64,
    /// Wall-clock time spent in them.
    pub total_nanos: u64,
}

impl ReadStats {
    /// Mean latency, or `None` before the first read.
    pub fn average(&self) -> Option<Duration> {
        (self.reads > 0).then(|| Duration::from_nanos(self.total_nanos / self.reads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(records: usize, outcome: BatchOutcome) -> BatchReport {
        BatchReport {
            records,
            size: 0,
            outcome,
        }
    }

    #[test]
    fn committed_records_skip_failures() {
        let report = UpdateReport {
            batches: vec![
                batch(
                    3,
                    BatchOutcome::Committed {
                        first_offset: 0,
                        last_offset: 2,
                    },
                ),
                batch(2, BatchOutcome::Failed { error: "disk full".into() }),
            ],
            index_entries_written: 3,
            ..UpdateReport::default()
        };
        assert_eq!(report.committed_records(), 3);
        assert_eq!(report.failed_batches().count(), 1);
        assert!(!report.is_complete());
        assert!(UpdateReport::default().is_complete());
    }

    #[test]
    fn average_latency() {
        assert_eq!(ReadStats::default().average(), None);
        let stats = ReadStats {
            reads: 4,
            total_nanos: 4_000,
        };
        assert_eq!(stats.average(), Some(Duration::from_nanos(1_000)));
    }
}
