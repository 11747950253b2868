//! Limit alerts derived from the active block

use crate::notifications::{NotificationManager, NotificationPriority};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokenburn_core::plans::PlanType;
use tokenburn_core::SessionBlock;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Pro plan usage went past the Pro ceiling
    SwitchToCustom,
    /// Active block exceeded the effective token limit
    ExceedMaxLimit,
    /// Current pace exhausts the limit before the block resets
    TokensWillRunOut,
}

impl AlertKind {
    pub const ALL: [AlertKind; 3] = [
        AlertKind::SwitchToCustom,
        AlertKind::ExceedMaxLimit,
        AlertKind::TokensWillRunOut,
    ];

    /// Key in the notification table
    pub fn key(&self) -> &'static str {
        match self {
            Self::SwitchToCustom => "switch_to_custom",
            Self::ExceedMaxLimit => "exceed_max_limit",
            Self::TokensWillRunOut => "tokens_will_run_out",
        }
    }

    pub fn default_cooldown_hours(&self) -> f64 {
        match self {
            Self::SwitchToCustom => 24.0,
            Self::ExceedMaxLimit => 6.0,
            Self::TokensWillRunOut => 1.0,
        }
    }

    pub fn priority(&self) -> NotificationPriority {
        match self {
            Self::SwitchToCustom => NotificationPriority::Normal,
            Self::ExceedMaxLimit => NotificationPriority::High,
            Self::TokensWillRunOut => NotificationPriority::Critical,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::SwitchToCustom => "Tokens exceeded the Pro limit; switching to the custom plan limit",
            Self::ExceedMaxLimit => "Tokens exceeded the maximum limit",
            Self::TokensWillRunOut => "Tokens will run out before the session resets",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Alert conditions that hold at `now`.
///
/// `hourly_rate` is in tokens per minute. Only non-gap active blocks raise
/// alerts.
pub fn evaluate_alerts(
    plan: PlanType,
    token_limit: u64,
    active: Option<&SessionBlock>,
    hourly_rate: f64,
    now: DateTime<Utc>,
) -> Vec<AlertKind> {
    let Some(block) = active.filter(|b| b.is_active && !b.is_gap) else {
        return Vec::new();
    };
    let used = block.total_tokens();
    let mut kinds = Vec::new();

    if plan == PlanType::Pro && used > PlanType::Pro.limits().token_limit {
        kinds.push(AlertKind::SwitchToCustom);
    }

    if used > token_limit {
        kinds.push(AlertKind::ExceedMaxLimit);
    }

    if hourly_rate > 0.0 && used < token_limit {
        let minutes_left = (token_limit - used) as f64 / hourly_rate;
        let minutes_to_reset = (block.end_time - now).num_milliseconds() as f64 / 60_000.0;
        if minutes_left < minutes_to_reset {
            kinds.push(AlertKind::TokensWillRunOut);
        }
    }

    kinds
}

/// Result of passing alert conditions through the cooldown table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertOutcome {
    /// Fired this tick
    pub fired: Vec<AlertKind>,
    /// Holding and still within their cooldown, including `fired`
    pub active: Vec<AlertKind>,
}

/// Fire every condition that clears the delivery preferences and whose
/// cooldown has elapsed, then mark it notified
pub fn dispatch_alerts(
    kinds: &[AlertKind],
    manager: &mut NotificationManager,
    now: DateTime<Utc>,
) -> AlertOutcome {
    let mut outcome = AlertOutcome::default();

    for kind in kinds {
        let (cooldown, priority) = manager
            .get(kind.key())
            .map(|state| (state.cooldown_hours, state.priority))
            .unwrap_or_else(|| (kind.default_cooldown_hours(), kind.priority()));

        let sent = manager.sent_within_hour(now);
        if !manager.preferences().allows(priority, now, sent) {
            debug!("Alert {} ({}) held back by notification preferences", kind, priority);
        } else if manager.should_notify_at(kind.key(), cooldown, now) {
            info!("Alert {} ({}): {}", kind, priority, kind.message());
            manager.mark_notified_at(kind.key(), now);
            outcome.fired.push(*kind);
        }

        if manager.is_notification_active_at(kind.key(), now) {
            outcome.active.push(*kind);
        }
    }

    outcome
}
