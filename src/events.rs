//! Observer events
//!
//! A one-way telemetry fan-out over a broadcast channel. The core publishes
//! state transitions, turn outcomes, latency classifications, and stage
//! errors; subscribers (status display, debug console, tests) consume them
//! with no feedback path into the pipeline.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::orchestrator::EngineState;
use crate::session::{LatencySample, TurnEndReason};

/// Default subscriber channel depth
const CHANNEL_CAPACITY: usize = 64;

/// Telemetry event emitted by the voice loop
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// Orchestrator moved between states
    StateChanged {
        from: EngineState,
        to: EngineState,
    },
    /// A turn's capture phase ended
    TurnEnded {
        turn_id: Uuid,
        reason: TurnEndReason,
    },
    /// Round-trip latency measured for a turn
    Latency(LatencySample),
    /// A pipeline stage failed
    StageError {
        turn_id: Option<Uuid>,
        stage: &'static str,
        message: String,
    },
}

/// Fan-out point for observer events
///
/// Publishing is best-effort: a slow or absent subscriber never blocks or
/// errors the publisher.
#[derive(Debug, Clone)]
pub struct Observer {
    tx: broadcast::Sender<ObserverEvent>,
}

impl Observer {
    /// Create an observer with the default channel depth
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to the event stream from this point forward
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: ObserverEvent) {
        // Err means no subscribers, which is fine
        let _ = self.tx.send(event);
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}
