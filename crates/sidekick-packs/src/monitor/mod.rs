//! Runtime event monitoring
//!
//! Lifecycle notifications for packs and features, fanned out to any number of
//! subscribers (UI bindings, activity log, CLI output).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle notification emitted by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RuntimeEvent {
    PackLoaded {
        pack_id: String,
        feature_count: usize,
    },
    PackUnloaded {
        pack_id: String,
    },
    PackError {
        pack_id: String,
        message: String,
    },
    FeatureRegistered {
        feature_id: String,
        pack_id: String,
    },
    FeatureUnregistered {
        feature_id: String,
        pack_id: String,
    },
    FeatureConflict {
        feature_id: String,
        existing_pack_id: String,
        new_pack_id: String,
        allow_override: bool,
    },
    FeatureActivated {
        feature_id: String,
    },
    FeatureDeactivated {
        feature_id: String,
    },
    ActivationError {
        feature_id: String,
        message: String,
    },
    LicenseRejected {
        order_number: String,
        message: String,
        trial_available: bool,
    },
}

/// Timestamped event as delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RuntimeEvent,
}

/// Broadcast channel shared by the registry, activation service and pack manager
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: RuntimeEvent) {
        trace!("Runtime event: {:?}", event);
        // No subscribers is fine
        let _ = self.sender.send(EventRecord {
            timestamp: Utc::now(),
            event,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain everything currently buffered on a receiver
pub fn drain_events(receiver: &mut broadcast::Receiver<EventRecord>) -> Vec<RuntimeEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(record) => events.push(record.event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit(RuntimeEvent::PackUnloaded {
            pack_id: "demo".to_string(),
        });
    }

    #[test]
    fn test_subscribers_see_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(RuntimeEvent::FeatureActivated {
            feature_id: "core".to_string(),
        });
        bus.emit(RuntimeEvent::FeatureDeactivated {
            feature_id: "core".to_string(),
        });

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RuntimeEvent::FeatureActivated { .. }));
        assert!(matches!(events[1], RuntimeEvent::FeatureDeactivated { .. }));
    }

    #[test]
    fn test_event_json_shape() {
        let record = EventRecord {
            timestamp: Utc::now(),
            event: RuntimeEvent::FeatureConflict {
                feature_id: "reports".to_string(),
                existing_pack_id: "demo".to_string(),
                new_pack_id: "insights".to_string(),
                allow_override: false,
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "featureConflict");
        assert_eq!(value["existingPackId"], "demo");
        assert_eq!(value["allowOverride"], false);
        assert!(value["timestamp"].is_string());
    }
}
