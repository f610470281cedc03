//! Fan-out of [`AgentEvent`]s to attached listeners.
//!
//! The runtime publishes events as it works; anything that wants to observe
//! a run (a session transport, a test) attaches a listener. Publication
//! never blocks the turn loop: a listener that falls behind the channel
//! capacity loses the oldest events instead of stalling the run.

use drover_core::events::AgentEvent;
use tokio::sync::broadcast;

// Enough headroom for a long streamed turn of text deltas.
const CHANNEL_CAPACITY: usize = 1024;

/// Fan-out sink for [`AgentEvent`]s.
pub struct EventEmitter {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventEmitter {
    /// Create an emitter with no listeners attached.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to every attached listener.
    ///
    /// Events published while nobody is listening are dropped; an
    /// unobserved run still executes.
    pub fn emit(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }

    /// Attach a listener that observes every event published after this
    /// call.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::events::{BaseEvent, TurnEndReason};

    fn text_delta(agent_id: &str, delta: &str) -> AgentEvent {
        AgentEvent::TextDelta {
            base: BaseEvent::now(agent_id),
            delta: delta.into(),
        }
    }

    #[test]
    fn unobserved_run_can_still_emit() {
        let emitter = EventEmitter::new();
        emitter.emit(text_delta("a1", "nobody is watching"));
    }

    #[tokio::test]
    async fn listener_sees_events_in_publication_order() {
        let emitter = EventEmitter::new();
        let mut listener = emitter.subscribe();

        emitter.emit(text_delta("a1", "working"));
        emitter.emit(AgentEvent::TurnEnd {
            base: BaseEvent::now("a1"),
            reason: TurnEndReason::Natural,
        });

        assert_eq!(listener.recv().await.unwrap().event_type(), "text_delta");
        assert_eq!(listener.recv().await.unwrap().event_type(), "turn_end");
    }

    #[tokio::test]
    async fn late_listener_only_sees_later_events() {
        let emitter = EventEmitter::new();
        emitter.emit(text_delta("a1", "published before anyone listened"));

        let mut listener = emitter.subscribe();
        emitter.emit(text_delta("a1", "after"));

        let AgentEvent::TextDelta { delta, .. } = listener.recv().await.unwrap() else {
            panic!("expected a text delta");
        };
        assert_eq!(delta, "after");
        assert!(listener.try_recv().is_err());
    }

    #[tokio::test]
    async fn each_listener_gets_its_own_copy() {
        let emitter = EventEmitter::new();
        let mut first = emitter.subscribe();
        let mut second = emitter.subscribe();

        emitter.emit(text_delta("a1", "shared"));

        assert_eq!(first.recv().await.unwrap().base().agent_id, "a1");
        assert_eq!(second.recv().await.unwrap().base().agent_id, "a1");
    }
}
