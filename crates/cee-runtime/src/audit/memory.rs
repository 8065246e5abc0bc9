//! In-process audit sink.

use std::collections::HashMap;

use async_trait::async_trait;
use cee_core::RequestId;
use parking_lot::Mutex;

use super::{AuditError, AuditRecord, AuditSink, OutcomeUpdate};

#[derive(Default)]
struct Inner {
    records: Vec<AuditRecord>,
    index: HashMap<RequestId, usize>,
}

/// Keeps every record in memory, in append order.
#[derive(Default)]
pub struct InMemoryAuditSink {
    inner: Mutex<Inner>,
}

impl InMemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner.lock().records.clone()
    }

    /// Record for `request_id`.
    pub fn get(&self, request_id: &RequestId) -> Option<AuditRecord> {
        let inner = self.inner.lock();
        inner
            .index
            .get(request_id)
            .and_then(|&i| inner.records.get(i).cloned())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Whether no record has been written.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut inner = self.inner.lock();
        let pos = inner.records.len();
        let _ = inner.index.insert(record.request_id.clone(), pos);
        inner.records.push(record);
        Ok(())
    }

    async fn record_outcome(&self, update: OutcomeUpdate) -> Result<(), AuditError> {
        let mut inner = self.inner.lock();
        let Some(&pos) = inner.index.get(&update.request_id) else {
            return Err(AuditError::NotFound(update.request_id));
        };
        let record = &mut inner.records[pos];
        record.outcome = update.outcome;
        if update.detail.is_some() {
            record.detail = update.detail;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditDecision, AuditOutcome};
    use cee_core::Mode;

    #[tokio::test]
    async fn append_and_update() {
        let sink = InMemoryAuditSink::new();
        let rec = AuditRecord::new(
            RequestId::generate(),
            "u1",
            Mode::GovernanceCheck,
            AuditDecision::Authorized,
            AuditOutcome::Pending,
        );
        let id = rec.request_id.clone();
        sink.append(rec).await.unwrap();
        sink.record_outcome(OutcomeUpdate {
            request_id: id.clone(),
            outcome: AuditOutcome::Failed,
            detail: Some("agent error".into()),
        })
        .await
        .unwrap();

        let got = sink.get(&id).unwrap();
        assert_eq!(got.outcome, AuditOutcome::Failed);
        assert_eq!(got.detail.as_deref(), Some("agent error"));
        assert_eq!(sink.len(), 1);
    }
}
