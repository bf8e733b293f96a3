//! Delegation transport seam
//!
//! Delegation requests travel to recipient agents over an event network that
//! lives outside this crate. The runner only needs to publish a request and
//! learn the event id it was published under.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::DelegationRecord;
use crate::error::Result;
use crate::id::generate_event_id;

/// Publishes delegation requests to their recipients
#[async_trait]
pub trait DelegationTransport: Send + Sync {
    /// Publish the request, returning the id of the published event
    async fn publish_request(&self, record: &DelegationRecord) -> Result<String>;
}

/// Transport that keeps published requests in memory
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    published: Mutex<Vec<(String, DelegationRecord)>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event ids and records published so far, oldest first
    pub async fn published(&self) -> Vec<(String, DelegationRecord)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl DelegationTransport for InMemoryTransport {
    async fn publish_request(&self, record: &DelegationRecord) -> Result<String> {
        let event_id = generate_event_id();
        log::debug!(
            "Publishing delegation {} to {} as event {}",
            record.id,
            record.recipients.join(","),
            event_id
        );
        self.published.lock().await.push((event_id.clone(), record.clone()));
        Ok(event_id)
    }
}
