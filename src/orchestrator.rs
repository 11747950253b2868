//! Refresh-tick loop
//!
//! Every tick runs the same pipeline against the latest data:
//! load → build blocks → refresh burn rate and projection → snapshot →
//! session monitor → limit alerts → sink. A tick either completes or is
//! skipped as a whole; a failing source only costs that tick.

use crate::config::TickSettings;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokenburn_core::calculator::{hourly_burn_rate, refresh_active_metrics};
use tokenburn_core::source::{UsageSource, load_sorted_entries};
use tokenburn_core::{Result, SessionBlock, SessionBlockBuilder, UsageSnapshot};
use tokenburn_monitor::{
    AlertOutcome, ChannelObserver, NotificationManager, SessionEvent, SessionMonitor,
    dispatch_alerts, evaluate_alerts,
};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Everything produced by one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub now: DateTime<Utc>,
    pub blocks: Vec<SessionBlock>,
    /// Monitor transitions seen this tick, in dispatch order
    pub events: Vec<SessionEvent>,
    pub alerts: AlertOutcome,
    pub token_limit: u64,
    /// Tokens per minute over the last hour
    pub hourly_burn_rate: f64,
    pub session_count: usize,
    /// Problems reported by snapshot validation this tick
    pub validation_errors: Vec<String>,
}

impl TickReport {
    /// The block currently collecting usage
    pub fn active_block(&self) -> Option<&SessionBlock> {
        self.blocks.iter().find(|b| b.is_active && !b.is_gap)
    }
}

/// Consumer of tick reports, typically a renderer
pub trait TickSink {
    fn on_tick(&mut self, report: &TickReport) -> Result<()>;
}

impl<F> TickSink for F
where
    F: FnMut(&TickReport) -> Result<()>,
{
    fn on_tick(&mut self, report: &TickReport) -> Result<()> {
        self(report)
    }
}

pub struct Orchestrator<S> {
    source: S,
    settings: TickSettings,
    monitor: SessionMonitor,
    notifications: NotificationManager,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    stop: Arc<AtomicBool>,
}

impl<S: UsageSource> Orchestrator<S> {
    pub fn new(source: S, settings: TickSettings, notifications: NotificationManager) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let mut monitor = SessionMonitor::new();
        monitor.register(ChannelObserver::new(tx));

        Self {
            source,
            settings,
            monitor,
            notifications,
            events,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends the loop before its next tick
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut SessionMonitor {
        &mut self.monitor
    }

    pub fn notifications(&self) -> &NotificationManager {
        &self.notifications
    }

    pub async fn tick(&mut self) -> Result<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Run one full pipeline pass as of `now`
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let entries = load_sorted_entries(&self.source).await?;

        let mut blocks = SessionBlockBuilder::new(self.settings.block)
            .with_cost_mode(self.settings.cost_mode)
            .build(&entries, now);
        refresh_active_metrics(&mut blocks, now);

        let snapshot = UsageSnapshot::from_blocks(&blocks).to_value()?;
        let (_, validation_errors) = self.monitor.update_at(&snapshot, now);

        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }

        let token_limit = self.settings.plan.token_limit(&blocks);
        let hourly_burn_rate = hourly_burn_rate(&blocks, now);
        let active = blocks.iter().find(|b| b.is_active && !b.is_gap);
        let kinds = evaluate_alerts(
            self.settings.plan,
            token_limit,
            active,
            hourly_burn_rate,
            now,
        );
        let alerts = dispatch_alerts(&kinds, &mut self.notifications, now);

        debug!(
            "Tick at {}: {} entries, {} blocks, {} events, {} alerts",
            now,
            entries.len(),
            blocks.len(),
            events.len(),
            alerts.active.len()
        );

        Ok(TickReport {
            now,
            blocks,
            events,
            alerts,
            token_limit,
            hourly_burn_rate,
            session_count: self.monitor.session_count(),
            validation_errors,
        })
    }

    /// Tick until Ctrl+C or the stop flag is raised
    pub async fn run(&mut self, sink: &mut impl TickSink) -> Result<()> {
        self.run_loop(None, sink).await.map(|_| ())
    }

    /// Tick at most `n` times; returns the number of completed ticks
    pub async fn run_ticks(&mut self, n: u64, sink: &mut impl TickSink) -> Result<u64> {
        self.run_loop(Some(n), sink).await
    }

    async fn run_loop(&mut self, limit: Option<u64>, sink: &mut impl TickSink) -> Result<u64> {
        let mut interval = interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut attempted = 0u64;
        let mut completed = 0u64;

        loop {
            if self.stop.load(Ordering::Acquire) {
                info!("Stop requested, leaving refresh loop");
                break;
            }
            if limit.is_some_and(|n| attempted >= n) {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    attempted += 1;
                    match self.tick().await {
                        Ok(report) => {
                            completed += 1;
                            if let Err(e) = sink.on_tick(&report) {
                                warn!("Failed to render tick: {}", e);
                            }
                        }
                        Err(e) => warn!("Skipping tick, usage source {} failed: {}", self.source.name(), e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, leaving refresh loop");
                    break;
                }
            }
        }

        Ok(completed)
    }
}
