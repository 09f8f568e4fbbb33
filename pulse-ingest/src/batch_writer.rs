//! Bounded in-memory buffer and background flush task for telemetry rows
//! (`spec.md` §4.1 step 8, §8 "at-most-once for buffered records").
//!
//! Accepted records sit in a `Mutex`-guarded `VecDeque` until a size or time
//! threshold flushes them in one batch. A flush failure drops the whole
//! batch rather than retrying -- `spec.md` §8 documents ingest as
//! at-most-once for anything still in the in-process buffer when a flush
//! fails or the process dies; durability starts at the row actually landing
//! in `telemetry`.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sqlx::PgPool;
use tokio::sync::Notify;

use pulse_core::domain::TelemetryRecord;

/// Threshold above which a flush uses the `COPY`-based bulk path instead of
/// a parameterized multi-row insert (`spec.md` §4.1).
const COPY_THRESHOLD: usize = 100;

pub struct BatchWriter {
    buffer: Mutex<VecDeque<TelemetryRecord>>,
    max_buffer_size: usize,
    batch_size: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl BatchWriter {
    #[must_use]
    pub fn new(max_buffer_size: usize, batch_size: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(max_buffer_size.min(4096))),
            max_buffer_size,
            batch_size,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push one accepted record. If the buffer is already at capacity the
    /// oldest record is evicted to make room -- a full buffer means the
    /// flush task has fallen behind the ingest rate, not that new records
    /// should be rejected.
    pub fn enqueue(&self, record: TelemetryRecord) {
        let should_notify = {
            let mut buffer = self.buffer.lock().unwrap();
            if buffer.len() >= self.max_buffer_size {
                buffer.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            buffer.push_back(record);
            buffer.len() >= self.batch_size
        };
        if should_notify {
            self.notify.notify_one();
        }
    }

    /// Number of records evicted due to a full buffer since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn drain_batch(&self) -> Vec<TelemetryRecord> {
        let mut buffer = self.buffer.lock().unwrap();
        let take = buffer.len().min(self.batch_size.max(1) * 4);
        buffer.drain(..take).collect()
    }

    fn is_empty(&self) -> bool {
        self.buffer.lock().unwrap().is_empty()
    }

    /// Run the flush loop until `shutdown` fires. Flushes on whichever comes
    /// first: the buffer reaching `batch_size`, or `flush_interval` elapsing.
    pub async fn run(
        &self,
        pool: &PgPool,
        flush_interval: std::time::Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(flush_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.notify.notified() => {}
                _ = shutdown.changed() => {
                    self.flush_once(pool).await;
                    break;
                }
            }
            self.flush_once(pool).await;
        }
    }

    async fn flush_once(&self, pool: &PgPool) {
        loop {
            if self.is_empty() {
                return;
            }
            let batch = self.drain_batch();
            if batch.is_empty() {
                return;
            }

            let tenant_ids: HashSet<_> = batch.iter().map(|r| r.tenant_id.clone()).collect();
            let result = if batch.len() <= COPY_THRESHOLD {
                pulse_db::queries::telemetry::insert_multi_row(pool, &batch).await
            } else {
                pulse_db::queries::telemetry::insert_copy(pool, &batch).await
            };

            match result {
                Ok(()) => {
                    pulse_db::notify::telemetry_inserted(pool, &tenant_ids).await;
                }
                Err(err) => {
                    tracing::error!(%err, batch_len = batch.len(), "telemetry flush failed, dropping batch");
                }
            }

            if batch.len() < self.batch_size {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::domain::MsgType;
    use pulse_core::types::{DeviceId, SiteId, TenantId};
    use std::collections::HashMap;

    fn record(seq: i64) -> TelemetryRecord {
        TelemetryRecord {
            time: Utc::now(),
            tenant_id: TenantId::new("t1"),
            device_id: DeviceId::new("dev-1"),
            site_id: SiteId::new("site-1"),
            msg_type: MsgType::Telemetry,
            seq,
            metrics: HashMap::new(),
        }
    }

    #[test]
    fn enqueue_evicts_oldest_when_full() {
        let writer = BatchWriter::new(2, 10);
        writer.enqueue(record(1));
        writer.enqueue(record(2));
        writer.enqueue(record(3));
        assert_eq!(writer.dropped_count(), 1);
        let batch = writer.drain_batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].seq, 2);
        assert_eq!(batch[1].seq, 3);
    }

    #[test]
    fn drain_batch_empties_the_buffer() {
        let writer = BatchWriter::new(100, 10);
        writer.enqueue(record(1));
        writer.enqueue(record(2));
        assert!(!writer.is_empty());
        let batch = writer.drain_batch();
        assert_eq!(batch.len(), 2);
        assert!(writer.is_empty());
    }
}
