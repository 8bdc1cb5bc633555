//! Event bus seam. The bus is process-scoped and injected; it is never a global.

use super::{DomainEvent, Envelope};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Publisher side of the message transport.
///
/// Implementations provide at-least-once delivery downstream. `publish` must fail with
/// `TransportFailure` while disconnected.
pub trait EventBus: Send + Sync {
    fn connect(&self) -> Result<()>;

    fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    fn publish(&self, envelope: &Envelope) -> Result<()>;
}

/// Publish after a committed state change. Failures are logged, not returned: the
/// state change already happened and must not be reported as failed.
pub fn publish_best_effort(bus: &dyn EventBus, event: DomainEvent) {
    let envelope = Envelope::new(event);
    if let Err(e) = bus.publish(&envelope) {
        tracing::warn!(
            routing_key = %envelope.routing_key,
            event_id = %envelope.event_id,
            error = %e,
            "event publish failed"
        );
    }
}

/// In-process bus that records every published envelope.
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    connected: AtomicBool,
    published: Mutex<Vec<Envelope>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        InMemoryEventBus::default()
    }

    /// A bus that is already connected.
    pub fn connected() -> Self {
        let bus = InMemoryEventBus::new();
        bus.connected.store(true, Ordering::SeqCst);
        bus
    }

    pub fn published(&self) -> Vec<Envelope> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn published_with_key(&self, routing_key: &str) -> Vec<Envelope> {
        self.published()
            .into_iter()
            .filter(|e| e.routing_key == routing_key)
            .collect()
    }
}

impl EventBus for InMemoryEventBus {
    fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("event bus connected");
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        tracing::debug!("event bus disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, envelope: &Envelope) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::TransportFailure(
                "event bus is not connected".to_string(),
            ));
        }
        self.published
            .lock()
            .map_err(|_| Error::TransportFailure("event buffer poisoned".to_string()))?
            .push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finalized() -> DomainEvent {
        DomainEvent::LeaderboardFinalized {
            campaign_id: "c1".to_string(),
            entries: 3,
        }
    }

    #[test]
    fn test_publish_requires_connection() {
        let bus = InMemoryEventBus::new();
        let result = bus.publish(&Envelope::new(finalized()));
        assert!(matches!(result, Err(Error::TransportFailure(_))));

        bus.connect().unwrap();
        bus.publish(&Envelope::new(finalized())).unwrap();
        assert_eq!(bus.published().len(), 1);
    }

    #[test]
    fn test_best_effort_swallows_failure() {
        let bus = InMemoryEventBus::new();
        publish_best_effort(&bus, finalized());
        assert!(bus.published().is_empty());

        bus.connect().unwrap();
        publish_best_effort(&bus, finalized());
        assert_eq!(bus.published_with_key("leaderboard.finalized").len(), 1);

        bus.disconnect().unwrap();
        assert!(!bus.is_connected());
    }
}
