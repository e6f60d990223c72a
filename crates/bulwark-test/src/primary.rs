//! Scripted primary store.
//!
//! [`ScriptedPrimary`] answers each [`execute`](PrimaryStore::execute) with
//! the next queued response and records every operation it was sent. An
//! exhausted script answers with a transport error, which the failover
//! router surfaces without tripping.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bulwark_failover::{PrimaryError, PrimaryResponse, PrimaryStore, WriteOperation};

/// A deterministic, queue-based [`PrimaryStore`].
#[derive(Debug, Default)]
pub struct ScriptedPrimary {
    script: Mutex<VecDeque<Result<PrimaryResponse, PrimaryError>>>,
    calls: Mutex<Vec<WriteOperation>>,
}

impl ScriptedPrimary {
    /// An empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a success reporting `changes` rows.
    #[must_use]
    pub fn with_success(self, changes: u64) -> Self {
        self.push(Ok(PrimaryResponse {
            changes,
            last_row_id: None,
        }));
        self
    }

    /// Queue a success with an inserted row id.
    #[must_use]
    pub fn with_insert(self, last_row_id: impl Into<String>) -> Self {
        self.push(Ok(PrimaryResponse {
            changes: 1,
            last_row_id: Some(last_row_id.into()),
        }));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_error(self, error: PrimaryError) -> Self {
        self.push(Err(error));
        self
    }

    /// Queue an HTTP 429 limit failure.
    #[must_use]
    pub fn with_limit(self, message: impl Into<String>) -> Self {
        self.with_error(PrimaryError::Limited {
            status: 429,
            message: message.into(),
        })
    }

    /// Queue a response on a shared reference.
    pub fn push(&self, response: Result<PrimaryResponse, PrimaryError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Operations received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<WriteOperation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of operations received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Responses still queued.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl PrimaryStore for ScriptedPrimary {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, operation: &WriteOperation) -> Result<PrimaryResponse, PrimaryError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(operation.clone());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(PrimaryError::Transport("no scripted response".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let primary = ScriptedPrimary::new()
            .with_insert("u1")
            .with_limit("slow down");
        let op = WriteOperation::new("INSERT INTO users (id) VALUES (?)", ["u1"]);

        let first = primary.execute(&op).await.unwrap();
        assert_eq!(first.last_row_id.as_deref(), Some("u1"));

        let second = primary.execute(&op).await.unwrap_err();
        assert!(second.is_limit());

        let third = primary.execute(&op).await.unwrap_err();
        assert!(!third.is_limit());

        assert_eq!(primary.call_count(), 3);
        assert_eq!(primary.calls()[0], op);
        assert_eq!(primary.remaining(), 0);
    }
}
