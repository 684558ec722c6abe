//! Typed job-event stream for observers (dashboard, tests).
//!
//! One producer side shared by the queue and classifier, N broadcast
//! subscribers. Emission is best-effort and non-blocking: nobody listening
//! is fine, and a slow subscriber only lags itself. Dropping every producer
//! clone ends the subscribers cleanly.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::store::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobEventKind {
    Enqueue,
    Synced,
    Blocked,
    Retry,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub kind: JobEventKind,
    pub job_id: i64,
    pub local_path: String,
    pub remote_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job_id: i64, local_path: &str, remote_path: &str) -> Self {
        Self {
            kind,
            job_id,
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
            error: None,
            timestamp: now_ms(),
        }
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Broadcast fan-out for [`JobEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; never blocks, never fails durability.
    pub fn emit(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(JobEvent::new(JobEventKind::Enqueue, 1, "/a", "/r/a"));
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(JobEvent::new(JobEventKind::Enqueue, 1, "/a", "/r/a"));
        bus.emit(JobEvent::new(JobEventKind::Synced, 1, "/a", "/r/a"));
        assert_eq!(rx.recv().await.unwrap().kind, JobEventKind::Enqueue);
        assert_eq!(rx.recv().await.unwrap().kind, JobEventKind::Synced);
    }

    #[test]
    fn event_serializes_with_wire_names() {
        let event = JobEvent::new(JobEventKind::Blocked, 7, "/a", "/r/a").with_error("boom");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "blocked");
        assert_eq!(json["error"], "boom");
    }
}
