//! Delivery of status documents.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::update::StatusUpdate;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("status request failed: {0}")]
    Request(String),

    #[error("status endpoint answered {status}")]
    Rejected { status: u16 },
}

/// Sends one status document for a run.
#[async_trait]
pub trait StatusTransport: Send + Sync {
    async fn publish(&self, url: &str, run_id: &str, update: &StatusUpdate) -> Result<(), TransportError>;
}

/// POSTs the status as JSON with the run id as bearer token.
pub struct HttpStatusTransport {
    client: reqwest::Client,
}

impl HttpStatusTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusTransport for HttpStatusTransport {
    async fn publish(&self, url: &str, run_id: &str, update: &StatusUpdate) -> Result<(), TransportError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(run_id)
            .json(update)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Keeps every published document in memory instead of sending it.
///
/// Used by tests and by `iris serve --dry-run`.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    updates: Arc<Mutex<Vec<StatusUpdate>>>,
    failing: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records nothing and fails every publish.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<StatusUpdate> {
        self.updates.lock().ok().and_then(|u| u.last().cloned())
    }

    /// Stage messages in publish order, taken from the stage that changed.
    pub fn messages(&self) -> Vec<String> {
        let updates = self.updates();
        let mut messages = Vec::new();
        let mut previous: Option<&StatusUpdate> = None;
        for update in &updates {
            for (i, stage) in update.stages.iter().enumerate() {
                let changed = previous.is_none_or(|p| p.stages.get(i) != Some(stage));
                if changed {
                    if let Some(message) = &stage.message {
                        messages.push(message.clone());
                    }
                }
            }
            previous = Some(update);
        }
        messages
    }
}

#[async_trait]
impl StatusTransport for RecordingTransport {
    async fn publish(&self, _url: &str, _run_id: &str, update: &StatusUpdate) -> Result<(), TransportError> {
        if self.failing {
            return Err(TransportError::Request("connection refused".into()));
        }
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update.clone());
        }
        Ok(())
    }
}
