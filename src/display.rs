//! Terminal sink for the refresh loop

use crate::orchestrator::{TickReport, TickSink};
use tokenburn_core::{PlanType, Result};
use tokenburn_monitor::SessionEvent;
use tokenburn_terminal::{LivePanel, OutputFormatter, PanelInput, get_formatter};

pub struct TerminalSink {
    panel: LivePanel,
    formatter: Box<dyn OutputFormatter>,
    timezone: chrono_tz::Tz,
    plan: PlanType,
    json: bool,
    clear_screen: bool,
}

impl TerminalSink {
    pub fn new(timezone: chrono_tz::Tz, interval_secs: u64, plan: PlanType, json: bool) -> Self {
        Self {
            panel: LivePanel::new(timezone, interval_secs),
            formatter: get_formatter(json),
            timezone,
            plan,
            json,
            clear_screen: !json,
        }
    }

    /// Clearing is pointless when stdout is not a terminal
    pub fn with_clear_screen(mut self, clear_screen: bool) -> Self {
        self.clear_screen = clear_screen && !self.json;
        self
    }

    /// Text written for one tick
    pub fn frame(&self, report: &TickReport) -> String {
        if self.json {
            return self.formatter.format_blocks(&report.blocks, &self.timezone, false);
        }

        let input = PanelInput {
            active: report.active_block(),
            plan: self.plan,
            token_limit: report.token_limit,
            hourly_burn_rate: report.hourly_burn_rate,
            alerts: &report.alerts.active,
            session_count: report.session_count,
        };
        let mut frame = self.panel.render(&input, report.now);

        for line in event_lines(&report.events) {
            frame.push('\n');
            frame.push_str(&line);
        }
        frame
    }
}

impl TickSink for TerminalSink {
    fn on_tick(&mut self, report: &TickReport) -> Result<()> {
        if self.clear_screen {
            print!("\x1B[2J\x1B[1;1H");
        }
        println!("{}", self.frame(report));
        Ok(())
    }
}

/// One line per transition; an `Ended` folded into the `Started` that
/// replaces it is not repeated
fn event_lines(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .enumerate()
        .filter(|(i, event)| {
            let SessionEvent::Ended { session_id } = event else {
                return true;
            };
            !matches!(
                events.get(i + 1),
                Some(SessionEvent::Started { previous: Some(previous), .. }) if previous == session_id
            )
        })
        .map(|(_, event)| describe_event(event))
        .collect()
}

fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Started {
            session_id,
            previous: Some(previous),
            ..
        } => format!("Session {previous} ended, {session_id} started"),
        SessionEvent::Started { session_id, .. } => format!("Session {session_id} started"),
        SessionEvent::Ended { session_id } => format!("Session {session_id} ended"),
    }
}
