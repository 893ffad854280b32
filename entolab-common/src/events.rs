//! Event types and EventBus for the EntoLab services
//!
//! Events are broadcast in-process via `EventBus` and serialized for SSE
//! transmission to connected clients. All events carry the owning case id so
//! SSE streams can be filtered per user.

use crate::pmi::LifeStage;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// EntoLab event types
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EntoEvent {
    /// Detection run started for an upload
    AnalysisStarted {
        case_id: Uuid,
        upload_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Detection run finished; model detections stored
    AnalysisCompleted {
        case_id: Uuid,
        upload_id: Uuid,
        /// Number of bounding boxes the model returned
        detection_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Detection run failed (transport or model error)
    AnalysisFailed {
        case_id: Uuid,
        upload_id: Uuid,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An annotation commit reconciled detections against the baseline
    DetectionsSaved {
        case_id: Uuid,
        upload_id: Uuid,
        added: usize,
        updated: usize,
        deleted: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The case's PMI estimate was recomputed
    PmiUpdated {
        case_id: Uuid,
        oldest_stage: LifeStage,
        pmi_min_hours: f64,
        pmi_max_hours: Option<f64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A case report export was written to object storage
    ExportCompleted {
        case_id: Uuid,
        export_id: Uuid,
        format: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EntoEvent {
    /// The case this event belongs to (for per-user SSE filtering)
    pub fn case_id(&self) -> Uuid {
        match self {
            EntoEvent::AnalysisStarted { case_id, .. }
            | EntoEvent::AnalysisCompleted { case_id, .. }
            | EntoEvent::AnalysisFailed { case_id, .. }
            | EntoEvent::DetectionsSaved { case_id, .. }
            | EntoEvent::PmiUpdated { case_id, .. }
            | EntoEvent::ExportCompleted { case_id, .. } => *case_id,
        }
    }

    /// Event name, matching the serialized `type` tag (SSE event field)
    pub fn event_type(&self) -> &'static str {
        match self {
            EntoEvent::AnalysisStarted { .. } => "AnalysisStarted",
            EntoEvent::AnalysisCompleted { .. } => "AnalysisCompleted",
            EntoEvent::AnalysisFailed { .. } => "AnalysisFailed",
            EntoEvent::DetectionsSaved { .. } => "DetectionsSaved",
            EntoEvent::PmiUpdated { .. } => "PmiUpdated",
            EntoEvent::ExportCompleted { .. } => "ExportCompleted",
        }
    }
}

/// Broadcast bus for EntoLab events.
///
/// Thin wrapper around `tokio::sync::broadcast`; emitting with no
/// subscribers is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EntoEvent>,
}

impl EventBus {
    /// Create a new EventBus buffering up to `capacity` events per
    /// subscriber before old events are dropped
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EntoEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers
    pub fn emit(&self, event: EntoEvent) {
        // send() errors only when there are no subscribers
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let case_id = Uuid::new_v4();
        bus.emit(EntoEvent::PmiUpdated {
            case_id,
            oldest_stage: LifeStage::Instar3,
            pmi_min_hours: 53.1,
            pmi_max_hours: Some(135.0),
            timestamp: chrono::Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.case_id(), case_id);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(16);
        bus.emit(EntoEvent::AnalysisStarted {
            case_id: Uuid::new_v4(),
            upload_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = EntoEvent::AnalysisCompleted {
            case_id: Uuid::new_v4(),
            upload_id: Uuid::new_v4(),
            detection_count: 4,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AnalysisCompleted");
        assert_eq!(json["detection_count"], 4);
    }
}
