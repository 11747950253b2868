//! tokenburn-monitor - session tracking and alerting
//!
//! - [`session_monitor`]: active-session state machine with observers
//! - [`alerts`]: limit alert conditions for the active block
//! - [`notifications`]: persisted per-alert cooldowns
//! - [`preferences`]: priority threshold, quiet hours and hourly budget

pub mod alerts;
pub mod notifications;
pub mod preferences;
pub mod session_monitor;

pub use alerts::{AlertKind, AlertOutcome, dispatch_alerts, evaluate_alerts};
pub use notifications::{NotificationManager, NotificationPriority, NotificationState};
pub use preferences::{NotificationPreferences, QuietHours};
pub use session_monitor::{
    ChannelObserver, ObserverHandle, SessionEvent, SessionMonitor, SessionObserver, SessionState,
};
