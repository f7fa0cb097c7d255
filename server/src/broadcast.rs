//! Fan-out of chat lines to every registered connection
//!
//! Recording a message in the transcript and pushing it to each recipient
//! happen as one step under the router's ordering lock. Two broadcasts
//! therefore never interleave, and every recipient sees messages in the same
//! order they appear in the transcript.

use crate::registry::SharedRegistry;
use log::{info, warn};
use shared::{SessionId, TranscriptStore};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of a single broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the message was handed to
    pub delivered: usize,
    /// Recipients that could not take it and were evicted
    pub evicted: Vec<SessionId>,
}

/// Records and fans out every chat line of the relay
pub struct BroadcastRouter {
    registry: SharedRegistry,
    transcript: Arc<TranscriptStore>,
    /// Held for the whole of one broadcast: append plus fan-out
    ordering: Mutex<()>,
}

impl BroadcastRouter {
    pub fn new(registry: SharedRegistry, transcript: Arc<TranscriptStore>) -> Self {
        Self {
            registry,
            transcript,
            ordering: Mutex::new(()),
        }
    }

    /// Connections messages are delivered to
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Every message broadcast so far, in delivery order
    pub fn transcript(&self) -> &Arc<TranscriptStore> {
        &self.transcript
    }

    /// Records `message` and sends it to every connection registered right now
    ///
    /// A recipient that fails (closed or too slow) does not hold up the
    /// others. Once the fan-out is done, failed recipients are removed from
    /// the registry and their sessions are told to leave.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let _turn = self.ordering.lock().await;

        self.transcript.append(message);
        info!("{}", message);

        let recipients = {
            let registry = self.registry.read().await;
            registry.snapshot()
        };

        let mut report = BroadcastReport::default();
        for recipient in &recipients {
            match recipient.write_line(message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Evicting client {}: {}", recipient.id(), e);
                    recipient.evict();
                    report.evicted.push(recipient.id());
                }
            }
        }

        if !report.evicted.is_empty() {
            let mut registry = self.registry.write().await;
            for id in &report.evicted {
                registry.deregister(*id);
            }
        }

        report
    }
}
