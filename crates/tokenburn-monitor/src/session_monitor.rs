//! Active-session state machine
//!
//! The monitor consumes one raw block snapshot per refresh tick. It validates
//! the snapshot first and only then looks for the first active block:
//!
//! | tracked   | snapshot active block | result                              |
//! |-----------|-----------------------|-------------------------------------|
//! | none      | `b`                   | `Started(b)`                        |
//! | `a`       | `b != a`              | `Ended(a)`, then `Started(b)`       |
//! | `a`       | none                  | `Ended(a)`                          |
//! | `a`       | `a`                   | nothing                             |
//!
//! Invalid snapshots leave the state untouched. Events go to registered
//! observers in registration order; an observer's failure is logged and
//! recorded but never reaches the caller or the remaining observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tokenburn_core::snapshot::{BlockSnapshot, SnapshotValidation, validate_snapshot};
use tokenburn_core::{Result, SessionId, TokenburnError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

/// Where the state machine currently stands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    NoSession,
    Active(SessionId),
}

/// Transition notifications
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A session became active; `previous` is set when it replaced another
    Started {
        session_id: SessionId,
        previous: Option<SessionId>,
        block: BlockSnapshot,
    },
    /// The tracked session is no longer active
    Ended { session_id: SessionId },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Started { session_id, .. } | Self::Ended { session_id } => session_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "session_start",
            Self::Ended { .. } => "session_end",
        }
    }
}

/// Subscriber to session transitions
pub trait SessionObserver: Send {
    fn on_event(&mut self, event: &SessionEvent) -> Result<()>;
}

impl<F> SessionObserver for F
where
    F: FnMut(&SessionEvent) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &SessionEvent) -> Result<()> {
        self(event)
    }
}

/// Forwards events into a tokio channel
pub struct ChannelObserver {
    sender: UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }
}

impl SessionObserver for ChannelObserver {
    fn on_event(&mut self, event: &SessionEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| TokenburnError::Observer("event receiver dropped".to_string()))
    }
}

/// Handle returned by [`SessionMonitor::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

/// One entry of the session history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    /// Block start time, when the snapshot carried one
    pub start_time: Option<DateTime<Utc>>,
    /// When the monitor saw the session start
    pub observed_at: DateTime<Utc>,
    /// When the monitor saw the session end
    pub ended_at: Option<DateTime<Utc>>,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Default)]
pub struct SessionMonitor {
    state: SessionState,
    observers: Vec<(ObserverHandle, Box<dyn SessionObserver>)>,
    next_handle: u64,
    history: Vec<SessionRecord>,
    validation_errors: Vec<String>,
    tracked_tokens: u64,
    tracked_cost: f64,
}

impl SessionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a snapshot and advance the state machine.
    ///
    /// Returns `(is_valid, errors)`. Invalid input never advances state.
    pub fn update(&mut self, raw: &Value) -> (bool, Vec<String>) {
        self.update_at(raw, Utc::now())
    }

    /// [`update`](Self::update) with an explicit clock
    pub fn update_at(&mut self, raw: &Value, now: DateTime<Utc>) -> (bool, Vec<String>) {
        let snapshot = match validate_snapshot(raw) {
            SnapshotValidation::Valid(snapshot) => snapshot,
            SnapshotValidation::Invalid(errors) => {
                warn!("Snapshot validation failed: {:?}", errors);
                self.validation_errors.extend(errors.iter().cloned());
                return (false, errors);
            }
        };

        match (snapshot.active_block(), self.state.clone()) {
            (Some(block), SessionState::Active(current)) if block.id == current => {
                self.tracked_tokens = block.total_tokens;
                self.tracked_cost = block.cost_usd;
            }
            (Some(block), SessionState::Active(current)) => {
                info!("Session changed from {} to {}", current, block.id);
                self.end_session(current.clone(), now);
                self.start_session(block.clone(), Some(current), now);
            }
            (Some(block), SessionState::NoSession) => {
                info!("New session started: {}", block.id);
                self.start_session(block.clone(), None, now);
            }
            (None, SessionState::Active(current)) => {
                info!("Session ended: {}", current);
                self.end_session(current, now);
            }
            (None, SessionState::NoSession) => {}
        }

        (true, Vec::new())
    }

    fn start_session(
        &mut self,
        block: BlockSnapshot,
        previous: Option<SessionId>,
        now: DateTime<Utc>,
    ) {
        self.state = SessionState::Active(block.id.clone());
        self.tracked_tokens = block.total_tokens;
        self.tracked_cost = block.cost_usd;
        self.history.push(SessionRecord {
            session_id: block.id.clone(),
            start_time: block.start_time,
            observed_at: now,
            ended_at: None,
            total_tokens: block.total_tokens,
            cost_usd: block.cost_usd,
        });

        self.dispatch(SessionEvent::Started {
            session_id: block.id.clone(),
            previous,
            block,
        });
    }

    fn end_session(&mut self, session_id: SessionId, now: DateTime<Utc>) {
        if let Some(record) = self
            .history
            .iter_mut()
            .rev()
            .find(|r| r.session_id == session_id)
        {
            record.ended_at = Some(now);
            record.total_tokens = self.tracked_tokens;
            record.cost_usd = self.tracked_cost;
        }

        self.state = SessionState::NoSession;
        self.dispatch(SessionEvent::Ended { session_id });
    }

    fn dispatch(&mut self, event: SessionEvent) {
        for (handle, observer) in self.observers.iter_mut() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(&event)))
                .unwrap_or_else(|payload| {
                    Err(TokenburnError::Observer(format!(
                        "panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            if let Err(e) = outcome {
                error!(
                    "Session observer {:?} failed on {} for {}: {}",
                    handle,
                    event.name(),
                    event.session_id(),
                    e
                );
                self.validation_errors.push(e.to_string());
            }
        }
    }

    /// Subscribe to transitions
    pub fn register(&mut self, observer: impl SessionObserver + 'static) -> ObserverHandle {
        let handle = ObserverHandle(self.next_handle);
        self.next_handle += 1;
        self.observers.push((handle, Box::new(observer)));
        handle
    }

    /// Remove a subscriber; false if the handle was unknown
    pub fn unregister(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(h, _)| *h != handle);
        self.observers.len() != before
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_session_id(&self) -> Option<&SessionId> {
        match &self.state {
            SessionState::Active(id) => Some(id),
            SessionState::NoSession => None,
        }
    }

    /// Number of sessions started so far
    pub fn session_count(&self) -> usize {
        self.history.len()
    }

    pub fn session_history(&self) -> &[SessionRecord] {
        &self.history
    }

    /// Validation and observer errors accumulated across updates
    pub fn validation_errors(&self) -> &[String] {
        &self.validation_errors
    }

    pub fn clear_validation_errors(&mut self) {
        self.validation_errors.clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn snapshot(blocks: &[(&str, bool, u64)]) -> Value {
        let blocks: Vec<Value> = blocks
            .iter()
            .map(|(id, active, tokens)| {
                json!({
                    "id": id,
                    "isActive": active,
                    "totalTokens": tokens,
                    "costUSD": *tokens as f64 / 1000.0,
                    "startTime": "2024-01-01T10:00:00Z",
                })
            })
            .collect();
        json!({ "blocks": blocks })
    }

    fn recorder(monitor: &mut SessionMonitor) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        monitor.register(move |event: &SessionEvent| -> Result<()> {
            sink.lock()
                .unwrap()
                .push(format!("{}:{}", event.name(), event.session_id()));
            Ok(())
        });
        seen
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_start_then_end() {
        let mut monitor = SessionMonitor::new();
        let seen = recorder(&mut monitor);

        assert_eq!(monitor.update_at(&snapshot(&[("s1", true, 100)]), now()), (true, vec![]));
        assert_eq!(monitor.current_session_id().map(|s| s.as_str()), Some("s1"));

        monitor.update_at(&snapshot(&[("s1", false, 100)]), now());
        assert!(monitor.current_session_id().is_none());
        assert_eq!(monitor.state(), &SessionState::NoSession);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["session_start:s1".to_string(), "session_end:s1".to_string()]
        );
    }

    #[test]
    fn test_exactly_one_end_event() {
        let mut monitor = SessionMonitor::new();
        let seen = recorder(&mut monitor);

        monitor.update_at(&snapshot(&[("s1", true, 1)]), now());
        monitor.update_at(&json!({"blocks": []}), now());
        monitor.update_at(&json!({"blocks": []}), now());

        let ends = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("session_end"))
            .count();
        assert_eq!(ends, 1);
    }

    #[test]
    fn test_same_session_emits_nothing() {
        let mut monitor = SessionMonitor::new();
        let seen = recorder(&mut monitor);

        monitor.update_at(&snapshot(&[("s1", true, 1)]), now());
        monitor.update_at(&snapshot(&[("s1", true, 50)]), now());
        monitor.update_at(&snapshot(&[("old", false, 9), ("s1", true, 80)]), now());

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(monitor.session_count(), 1);
    }

    #[test]
    fn test_session_change_ends_then_starts() {
        let mut monitor = SessionMonitor::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        monitor.register(move |event: &SessionEvent| -> Result<()> {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });

        monitor.update_at(&snapshot(&[("a", true, 10)]), now());
        monitor.update_at(&snapshot(&[("a", true, 25)]), now());
        monitor.update_at(&snapshot(&[("a", false, 25), ("b", true, 5)]), now());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            SessionEvent::Ended {
                session_id: SessionId::new("a")
            }
        );
        match &events[2] {
            SessionEvent::Started {
                session_id,
                previous,
                ..
            } => {
                assert_eq!(session_id.as_str(), "b");
                assert_eq!(previous.as_ref().map(|p| p.as_str()), Some("a"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let history = monitor.session_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].total_tokens, 25);
        assert_eq!(history[0].ended_at, Some(now()));
        assert!(history[1].ended_at.is_none());
    }

    #[test]
    fn test_first_active_block_is_authoritative() {
        let mut monitor = SessionMonitor::new();
        monitor.update_at(&snapshot(&[("x", true, 1), ("y", true, 1)]), now());
        assert_eq!(monitor.current_session_id().map(|s| s.as_str()), Some("x"));
    }

    #[test]
    fn test_invalid_snapshot_does_not_advance() {
        let mut monitor = SessionMonitor::new();
        let seen = recorder(&mut monitor);
        monitor.update_at(&snapshot(&[("s1", true, 1)]), now());

        let (valid, errors) = monitor.update_at(&json!({"blocks": [{"id": "s2"}]}), now());
        assert!(!valid);
        assert_eq!(errors.len(), 3);
        assert_eq!(monitor.current_session_id().map(|s| s.as_str()), Some("s1"));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(monitor.validation_errors().len(), 3);

        monitor.clear_validation_errors();
        assert!(monitor.validation_errors().is_empty());
    }

    #[test]
    fn test_failing_observer_is_isolated() {
        let mut monitor = SessionMonitor::new();
        monitor.register(|_: &SessionEvent| -> Result<()> {
            Err(TokenburnError::Observer("boom".to_string()))
        });
        let seen = recorder(&mut monitor);

        let (valid, errors) = monitor.update_at(&snapshot(&[("s1", true, 1)]), now());
        assert!(valid);
        assert!(errors.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(monitor.validation_errors(), ["Observer error: boom"]);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let mut monitor = SessionMonitor::new();
        monitor.register(|_: &SessionEvent| -> Result<()> { panic!("observer exploded") });
        let seen = recorder(&mut monitor);

        let (valid, errors) = monitor.update_at(&snapshot(&[("s1", true, 1)]), now());
        assert!(valid);
        assert!(errors.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(
            monitor.validation_errors(),
            ["Observer error: panicked: observer exploded"]
        );

        // the monitor keeps working after the panic
        monitor.update_at(&snapshot(&[("s1", false, 1)]), now());
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(monitor.state(), &SessionState::NoSession);
    }

    #[test]
    fn test_unregister() {
        let mut monitor = SessionMonitor::new();
        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        let handle = monitor.register(move |_: &SessionEvent| -> Result<()> {
            *sink.lock().unwrap() += 1;
            Ok(())
        });

        assert!(monitor.unregister(handle));
        assert!(!monitor.unregister(handle));
        monitor.update_at(&snapshot(&[("s1", true, 1)]), now());
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_channel_observer() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut monitor = SessionMonitor::new();
        monitor.register(ChannelObserver::new(tx));

        monitor.update_at(&snapshot(&[("s1", true, 1)]), now());
        monitor.update_at(&json!({"blocks": []}), now());

        assert_eq!(rx.recv().await.map(|e| e.name()), Some("session_start"));
        assert_eq!(rx.recv().await.map(|e| e.name()), Some("session_end"));
    }

    #[test]
    fn test_channel_observer_reports_dropped_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let mut monitor = SessionMonitor::new();
        monitor.register(ChannelObserver::new(tx));

        monitor.update_at(&snapshot(&[("s1", true, 1)]), now());
        assert_eq!(monitor.validation_errors().len(), 1);
    }
}
