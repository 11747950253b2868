//! Live panel for the active session block
//!
//! Redrawn every refresh tick: time progress through the window, token usage
//! against the effective limit, burn rate, projection status, model mix and
//! any alerts currently in force.

use crate::output::{format_duration, format_number};
use chrono::{DateTime, Duration, Utc};
use colored::*;
use std::fmt;
use tokenburn_core::plans::{PlanType, usage_percentage};
use tokenburn_core::SessionBlock;
use tokenburn_monitor::{AlertKind, NotificationPriority};

const BOX_CORNER: &str = "+";
const BOX_HORIZONTAL: &str = "-";
const BOX_VERTICAL: &str = "|";

const PROGRESS_FULL: &str = "#";
const PROGRESS_EMPTY: &str = ".";
const BAR_WIDTH: usize = 40;

const LIMIT_EXCEEDED_PERCENT: f64 = 100.0;
const LIMIT_APPROACHING_PERCENT: f64 = 80.0;

/// Tokens per minute above which the burn is flagged
const HIGH_BURN_RATE: f64 = 1_000.0;
const ELEVATED_BURN_RATE: f64 = 300.0;

/// Everything the panel needs for one frame
#[derive(Debug, Clone, Copy)]
pub struct PanelInput<'a> {
    pub active: Option<&'a SessionBlock>,
    pub plan: PlanType,
    pub token_limit: u64,
    /// Tokens per minute over the last hour
    pub hourly_burn_rate: f64,
    pub alerts: &'a [AlertKind],
    pub session_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Ok,
    Warn,
    Critical,
}

impl Level {
    fn from_percent(percent: f64) -> Self {
        if percent > LIMIT_EXCEEDED_PERCENT {
            Self::Critical
        } else if percent > LIMIT_APPROACHING_PERCENT {
            Self::Warn
        } else {
            Self::Ok
        }
    }
}

pub struct LivePanel {
    width: usize,
    timezone: chrono_tz::Tz,
    interval_secs: u64,
    /// Cleared when NO_COLOR is set
    colored_output: bool,
}

impl LivePanel {
    pub fn new(timezone: chrono_tz::Tz, interval_secs: u64) -> Self {
        let raw_width = terminal_width().unwrap_or(100);
        let width = if raw_width < 60 {
            raw_width.max(20)
        } else {
            raw_width.clamp(60, 120)
        };
        Self {
            width,
            timezone,
            interval_secs,
            colored_output: std::env::var_os("NO_COLOR").is_none(),
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(20);
        self
    }

    pub fn with_color(mut self, colored_output: bool) -> Self {
        self.colored_output = colored_output;
        self
    }

    pub fn render(&self, input: &PanelInput<'_>, now: DateTime<Utc>) -> String {
        let mut output = String::new();
        output.push_str(&self.draw_border(""));
        output.push_str(&self.draw_centered_line("TOKENBURN - LIVE SESSION MONITOR"));
        output.push_str(&self.draw_border("\n"));

        match input.active {
            Some(block) => output.push_str(&self.draw_active(block, input, now)),
            None => {
                output.push_str(&self.draw_line(""));
                output.push_str(&self.draw_line("No active session"));
                output.push_str(&self.draw_line(&format!(
                    "Plan: {}  Token limit: {}  Sessions seen: {}",
                    input.plan.display_name(),
                    format_number(input.token_limit),
                    input.session_count
                )));
                output.push_str(&self.draw_line(""));
            }
        }

        output.push_str(&self.draw_border("\n"));
        output.push_str(&self.draw_centered_line(&format!(
            "Refreshing every {}s - Press Ctrl+C to stop",
            self.interval_secs
        )));
        output.push_str(&self.draw_border("\n"));
        output
    }

    fn draw_active(&self, block: &SessionBlock, input: &PanelInput<'_>, now: DateTime<Utc>) -> String {
        let mut output = String::new();

        let elapsed = now - block.start_time;
        let remaining = block.end_time - now;
        let window = block.end_time - block.start_time;
        let time_percent = if window.num_seconds() > 0 {
            elapsed.num_seconds() as f64 / window.num_seconds() as f64 * 100.0
        } else {
            0.0
        };

        output.push('\n');
        output.push_str(&self.draw_line(&format!(
            "TIME         {}  {:5.1}%",
            progress_bar(time_percent, BAR_WIDTH),
            time_percent.clamp(0.0, 999.9)
        )));
        let remaining_str = if remaining.num_seconds() > 0 {
            format_duration(remaining)
        } else {
            "Expired".to_string()
        };
        output.push_str(&self.draw_line(&format!(
            "   Started: {}  Elapsed: {}  Resets: {} (in {})",
            self.clock(block.start_time),
            format_duration(elapsed),
            self.clock(block.end_time),
            remaining_str
        )));

        let used = block.total_tokens();
        let usage_percent = usage_percentage(used, input.token_limit);
        let usage_level = Level::from_percent(usage_percent);
        output.push('\n');
        output.push_str(&self.draw_line(&format!(
            "TOKENS       {}  {:5.1}% ({}/{})",
            self.colored_bar(usage_percent, usage_level),
            usage_percent.min(999.9),
            format_number(used),
            format_number(input.token_limit)
        )));

        let (tokens_per_minute, cost_per_hour) = block
            .burn_rate
            .map(|rate| (rate.tokens_per_minute, rate.cost_per_hour))
            .unwrap_or((0.0, 0.0));
        output.push_str(&self.draw_line(&format!(
            "   Burn: {:.1} tok/min {}  Last hour: {:.1} tok/min  Cost: ${:.2} (${:.2}/h)",
            tokens_per_minute,
            self.burn_status(tokens_per_minute),
            input.hourly_burn_rate,
            block.total_cost(),
            cost_per_hour
        )));

        output.push('\n');
        output.push_str(&self.draw_projection(block, input));
        output.push_str(&self.draw_line(&format!(
            "   Runs out: {}",
            self.run_out_time(used, input, block, now)
        )));

        output.push('\n');
        output.push_str(&self.draw_line(&format!(
            "Session: {}  Messages: {}  Plan: {}",
            block.id,
            block.sent_messages_count,
            input.plan.display_name()
        )));
        output.push_str(&self.draw_line(&format!("Models: {}", model_mix(block))));

        for alert in input.alerts {
            output.push_str(&self.draw_line(&format!("! {}", self.alert_text(*alert))));
        }

        output
    }

    fn draw_projection(&self, block: &SessionBlock, input: &PanelInput<'_>) -> String {
        let Some(projection) = block.projection_data else {
            return self.draw_line("PROJECTION   not enough data");
        };

        let percent = usage_percentage(projection.projected_total_tokens, input.token_limit);
        let level = Level::from_percent(percent);
        let mut output = self.draw_line(&format!(
            "PROJECTION   {}  {:5.1}% ({}/{})",
            self.colored_bar(percent, level),
            percent.min(999.9),
            format_number(projection.projected_total_tokens),
            format_number(input.token_limit)
        ));

        let status = match level {
            Level::Critical => "WILL EXCEED LIMIT",
            Level::Warn => "APPROACHING LIMIT",
            Level::Ok => "WITHIN LIMITS",
        };
        output.push_str(&self.draw_line(&format!(
            "   Status: {}  Projected cost: ${:.2}",
            self.paint(status, level),
            projection.projected_total_cost
        )));
        output
    }

    fn run_out_time(
        &self,
        used: u64,
        input: &PanelInput<'_>,
        block: &SessionBlock,
        now: DateTime<Utc>,
    ) -> String {
        if used >= input.token_limit {
            return self.paint("limit reached", Level::Critical);
        }
        if input.hourly_burn_rate <= 0.0 {
            return "-".to_string();
        }

        let minutes = (input.token_limit - used) as f64 / input.hourly_burn_rate;
        // a near-zero rate pushes the run-out past what chrono can represent
        let at = Duration::try_milliseconds((minutes * 60_000.0) as i64)
            .and_then(|remaining| now.checked_add_signed(remaining));
        match at {
            Some(at) if at < block.end_time => {
                self.paint(&format!("{} (before reset)", self.clock(at)), Level::Critical)
            }
            Some(at) => format!("after reset ({})", self.clock(at)),
            None => "after reset".to_string(),
        }
    }

    fn alert_text(&self, alert: AlertKind) -> String {
        let level = match alert.priority() {
            NotificationPriority::Critical | NotificationPriority::High => Level::Critical,
            NotificationPriority::Normal => Level::Warn,
            NotificationPriority::Low => Level::Ok,
        };
        self.paint(alert.message(), level)
    }

    fn burn_status(&self, tokens_per_minute: f64) -> String {
        if tokens_per_minute > HIGH_BURN_RATE {
            self.paint("HIGH", Level::Critical)
        } else if tokens_per_minute > ELEVATED_BURN_RATE {
            self.paint("ELEVATED", Level::Warn)
        } else {
            self.paint("NORMAL", Level::Ok)
        }
    }

    fn clock(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone).format("%H:%M").to_string()
    }

    fn paint(&self, text: &str, level: Level) -> String {
        if !self.colored_output {
            return text.to_string();
        }
        match level {
            Level::Critical => text.red().to_string(),
            Level::Warn => text.yellow().to_string(),
            Level::Ok => text.green().to_string(),
        }
    }

    fn colored_bar(&self, percent: f64, level: Level) -> String {
        self.paint(&progress_bar(percent, BAR_WIDTH), level)
    }

    /// `prefix` is "\n" for every border but the first
    fn draw_border(&self, prefix: &str) -> String {
        format!(
            "{}{}{}{}",
            prefix,
            BOX_CORNER,
            BOX_HORIZONTAL.repeat(self.width.saturating_sub(2)),
            BOX_CORNER
        )
    }

    fn draw_centered_line(&self, text: &str) -> String {
        let text_width = console::measure_text_width(text);
        let available = self.width.saturating_sub(2);
        if text_width >= available {
            return format!("\n{} {} {}", BOX_VERTICAL, text, BOX_VERTICAL);
        }
        let padding = (available - text_width) / 2;
        format!(
            "\n{}{}{}{}{}",
            BOX_VERTICAL,
            " ".repeat(padding),
            text,
            " ".repeat(available - padding - text_width),
            BOX_VERTICAL
        )
    }

    fn draw_line(&self, content: &str) -> String {
        let available = self.width.saturating_sub(4);
        let truncated = console::truncate_str(content, available, "...");
        let padding = available.saturating_sub(console::measure_text_width(&truncated));
        format!(
            "\n{} {}{} {}",
            BOX_VERTICAL,
            truncated,
            " ".repeat(padding),
            BOX_VERTICAL
        )
    }
}

impl fmt::Display for LivePanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LivePanel(width: {})", self.width)
    }
}

fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64) as usize;
    let filled = filled.min(width);
    format!(
        "[{}{}]",
        PROGRESS_FULL.repeat(filled),
        PROGRESS_EMPTY.repeat(width - filled)
    )
}

fn model_mix(block: &SessionBlock) -> String {
    if block.per_model_stats.is_empty() {
        return "None".to_string();
    }
    block
        .per_model_stats
        .iter()
        .map(|(model, stats)| format!("{} ({})", model, format_number(stats.tokens.total_tokens())))
        .collect::<Vec<_>>()
        .join(", ")
}

fn terminal_width() -> Option<usize> {
    terminal_size::terminal_size().map(|(width, _)| width.0 as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokenburn_core::calculator::refresh_active_metrics;
    use tokenburn_core::{BlockConfig, ModelName, SessionBlockBuilder, TokenCounts, UsageEntry};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    fn active_block(tokens: u64) -> SessionBlock {
        let entries = vec![
            UsageEntry::new(
                now() - Duration::hours(2),
                ModelName::new("claude-3-opus-20240229"),
                TokenCounts::new(tokens / 2, 0, 0, 0),
            ),
            UsageEntry::new(
                now() - Duration::hours(1),
                ModelName::new("claude-3-5-sonnet-20241022"),
                TokenCounts::new(0, tokens - tokens / 2, 0, 0),
            ),
        ];
        let mut blocks = SessionBlockBuilder::new(BlockConfig::default()).build(&entries, now());
        refresh_active_metrics(&mut blocks, now());
        blocks.remove(0)
    }

    fn panel() -> LivePanel {
        LivePanel::new(chrono_tz::UTC, 5).with_width(100).with_color(false)
    }

    #[test]
    fn test_idle_panel() {
        let input = PanelInput {
            active: None,
            plan: PlanType::Pro,
            token_limit: 44_000,
            hourly_burn_rate: 0.0,
            alerts: &[],
            session_count: 2,
        };
        let output = panel().render(&input, now());
        assert!(output.contains("No active session"));
        assert!(output.contains("44,000"));
        assert!(output.contains("Refreshing every 5s"));
    }

    #[test]
    fn test_active_panel_sections() {
        let block = active_block(12_000);
        let alerts = [AlertKind::TokensWillRunOut];
        let input = PanelInput {
            active: Some(&block),
            plan: PlanType::Custom,
            token_limit: 44_000,
            hourly_burn_rate: 200.0,
            alerts: &alerts,
            session_count: 1,
        };
        let output = panel().render(&input, now());

        assert!(output.contains("TIME"));
        assert!(output.contains("12,000/44,000"));
        assert!(output.contains("PROJECTION"));
        assert!(output.contains("before reset"));
        assert!(output.contains("claude-3-opus"));
        assert!(output.contains("Tokens will run out"));
        // started 10:00 with a 5h window
        assert!(output.contains("Resets: 15:00 (in 3h 0m)"));
    }

    #[test]
    fn test_lines_fit_width() {
        let block = active_block(50_000);
        let input = PanelInput {
            active: Some(&block),
            plan: PlanType::Pro,
            token_limit: 44_000,
            hourly_burn_rate: 0.0,
            alerts: &[],
            session_count: 1,
        };
        let output = panel().with_width(60).render(&input, now());
        for line in output.lines().filter(|line| !line.is_empty()) {
            assert_eq!(console::measure_text_width(line), 60, "line: {line:?}");
        }
        assert!(output.contains("limit reached"));
    }

    #[test]
    fn test_no_color_output_is_plain() {
        let block = active_block(12_000);
        let input = PanelInput {
            active: Some(&block),
            plan: PlanType::Custom,
            token_limit: 44_000,
            hourly_burn_rate: 10.0,
            alerts: &[],
            session_count: 1,
        };
        let output = panel().render(&input, now());
        assert!(!output.contains('\u{1b}'));
    }

    #[test]
    fn test_negligible_burn_rate_runs_out_after_reset() {
        let block = active_block(12_000);
        let input = PanelInput {
            active: Some(&block),
            plan: PlanType::Custom,
            token_limit: 44_000,
            hourly_burn_rate: 1e-9,
            alerts: &[],
            session_count: 1,
        };
        let output = panel().render(&input, now());
        assert!(output.contains("after reset"));
        assert!(!output.contains("before reset"));
    }

    #[test]
    fn test_progress_bar_clamps() {
        assert_eq!(progress_bar(150.0, 4), "[####]");
        assert_eq!(progress_bar(-5.0, 4), "[....]");
        assert_eq!(progress_bar(50.0, 4), "[##..]");
    }
}
