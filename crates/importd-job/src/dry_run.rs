use std::time::Duration;

use async_trait::async_trait;
use importd_common::{error::Result, types::Job};

use crate::worker::{ChunkProcessor, ItemOutcome, ItemResult};

/// Walks a job's declared item range and reports every item as created
/// without touching a catalog. Lets a standalone server exercise the full
/// progress pipeline.
#[derive(Debug, Clone, Default)]
pub struct DryRunProcessor {
    chunk_delay: Duration,
}

impl DryRunProcessor {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }
}

#[async_trait]
impl ChunkProcessor for DryRunProcessor {
    async fn prepare(&self, job: &Job) -> Result<u64> {
        Ok(job.total_items)
    }

    async fn process_chunk(&self, job: &Job, offset: u64, limit: u64) -> Result<Vec<ItemResult>> {
        if !self.chunk_delay.is_zero() {
            tokio::time::sleep(self.chunk_delay).await;
        }
        let end = offset.saturating_add(limit).min(job.total_items);
        Ok((offset..end)
            .map(|index| ItemResult {
                item_key: format!("item-{index}"),
                outcome: ItemOutcome::Created,
            })
            .collect())
    }
}
