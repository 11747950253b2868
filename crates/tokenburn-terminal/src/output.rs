//! Block report and alert table output
//!
//! Formatters render the block list and the notification table either as
//! terminal tables or as JSON for scripting.
//!
//! # Examples
//!
//! ```
//! use tokenburn_terminal::output::get_formatter;
//!
//! let formatter = get_formatter(true);
//! let output = formatter.format_blocks(&[], &chrono_tz::UTC, false);
//! assert!(output.contains("\"blocks\""));
//! ```

use chrono::{DateTime, Duration, Utc};
use prettytable::{Table, format, row};
use serde_json::json;
use tokenburn_core::SessionBlock;
use tokenburn_monitor::NotificationManager;

/// Renders reports in one output style
pub trait OutputFormatter {
    /// Block report; `show_entries` adds per-model rows or entry lists
    fn format_blocks(&self, blocks: &[SessionBlock], tz: &chrono_tz::Tz, show_entries: bool)
    -> String;

    /// Persisted notification table
    fn format_alerts(&self, manager: &NotificationManager, tz: &chrono_tz::Tz) -> String;
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, ch) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }

    result.chars().rev().collect()
}

pub fn format_currency(amount: f64) -> String {
    format!("${amount:.2}")
}

pub fn format_duration(duration: Duration) -> String {
    format!("{}h {}m", duration.num_hours(), duration.num_minutes() % 60)
}

fn format_datetime_with_tz(dt: &DateTime<Utc>, tz: &chrono_tz::Tz) -> String {
    dt.with_timezone(tz).format("%Y-%m-%d %H:%M %Z").to_string()
}

/// Human-readable tables
pub struct TableFormatter;

impl TableFormatter {
    pub(crate) fn format_blocks_with_now(
        &self,
        blocks: &[SessionBlock],
        tz: &chrono_tz::Tz,
        now: DateTime<Utc>,
        show_entries: bool,
    ) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

        table.set_titles(row![
            b -> "Block Start",
            b -> "Status",
            b -> "Messages",
            b -> "Input",
            b -> "Output",
            b -> "Cache",
            b -> "Total Tokens",
            b -> "Cost",
            b -> "Time"
        ]);

        for block in blocks {
            let formatted_start = format_datetime_with_tz(&block.start_time, tz);

            if block.is_gap {
                table.add_row(row![
                    formatted_start,
                    "Gap",
                    "", "", "", "", "", "",
                    format_duration(block.end_time - block.start_time)
                ]);
                continue;
            }

            let (status, time) = if block.is_active {
                let remaining = block.end_time - now;
                let time = if remaining.num_seconds() > 0 {
                    format!("{} left", format_duration(remaining))
                } else {
                    "Expired".to_string()
                };
                ("ACTIVE", time)
            } else {
                let ran = block.actual_end_time.unwrap_or(block.end_time) - block.start_time;
                ("Complete", format_duration(ran))
            };

            let tokens = &block.token_counts;
            table.add_row(row![
                formatted_start,
                status,
                c -> block.sent_messages_count,
                r -> format_number(tokens.input_tokens),
                r -> format_number(tokens.output_tokens),
                r -> format_number(tokens.cache_creation_tokens + tokens.cache_read_tokens),
                r -> format_number(block.total_tokens()),
                r -> format_currency(block.total_cost()),
                time
            ]);

            if show_entries {
                for model in &block.models {
                    let Some(stats) = block.per_model_stats.get(model) else {
                        continue;
                    };
                    table.add_row(row![
                        format!("  └─ {}", model),
                        "",
                        c -> stats.entries_count,
                        r -> format_number(stats.tokens.input_tokens),
                        r -> format_number(stats.tokens.output_tokens),
                        r -> format_number(stats.tokens.cache_creation_tokens + stats.tokens.cache_read_tokens),
                        r -> format_number(stats.tokens.total_tokens()),
                        r -> format_currency(stats.cost_usd),
                        ""
                    ]);
                }
            }
        }

        table.to_string()
    }

    pub(crate) fn format_alerts_with_now(
        &self,
        manager: &NotificationManager,
        tz: &chrono_tz::Tz,
        now: DateTime<Utc>,
    ) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

        table.set_titles(row![
            b -> "Alert",
            b -> "Priority",
            b -> "Cooldown",
            b -> "Count",
            b -> "Last Fired",
            b -> "Status"
        ]);

        for (key, state) in manager.states() {
            let last_fired = state
                .timestamp
                .map(|ts| format_datetime_with_tz(&ts, tz))
                .unwrap_or_else(|| "-".to_string());
            let status = if manager.is_notification_active_at(key, now) {
                "cooling down"
            } else {
                "ready"
            };
            table.add_row(row![
                key,
                state.priority,
                format!("{}h", state.cooldown_hours),
                r -> state.count,
                last_fired,
                status
            ]);
        }

        let preferences = manager.preferences();
        let quiet = preferences
            .quiet_hours
            .map(|q| q.to_string())
            .unwrap_or_else(|| "off".to_string());
        format!(
            "{}\nThreshold: {}  Quiet hours: {}  Max per hour: {}",
            table,
            preferences.priority_threshold,
            quiet,
            preferences.max_notifications_per_hour
        )
    }
}

impl OutputFormatter for TableFormatter {
    fn format_blocks(
        &self,
        blocks: &[SessionBlock],
        tz: &chrono_tz::Tz,
        show_entries: bool,
    ) -> String {
        self.format_blocks_with_now(blocks, tz, Utc::now(), show_entries)
    }

    fn format_alerts(&self, manager: &NotificationManager, tz: &chrono_tz::Tz) -> String {
        self.format_alerts_with_now(manager, tz, Utc::now())
    }
}

/// Machine-readable output; times are always RFC 3339 UTC
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_blocks(
        &self,
        blocks: &[SessionBlock],
        _tz: &chrono_tz::Tz,
        show_entries: bool,
    ) -> String {
        let output = json!({
            "blocks": blocks.iter().map(|b| {
                let mut block_json = json!({
                    "id": b.id.as_str(),
                    "start_time": b.start_time.to_rfc3339(),
                    "end_time": b.end_time.to_rfc3339(),
                    "actual_end_time": b.actual_end_time.map(|t| t.to_rfc3339()),
                    "is_active": b.is_active,
                    "is_gap": b.is_gap,
                    "tokens": {
                        "input_tokens": b.token_counts.input_tokens,
                        "output_tokens": b.token_counts.output_tokens,
                        "cache_creation_tokens": b.token_counts.cache_creation_tokens,
                        "cache_read_tokens": b.token_counts.cache_read_tokens,
                        "total": b.total_tokens(),
                    },
                    "cost_usd": b.total_cost(),
                    "sent_messages_count": b.sent_messages_count,
                    "models": b.models,
                    "burn_rate": b.burn_rate,
                    "projection": b.projection_data,
                });

                if show_entries {
                    block_json["per_model_stats"] = json!(b.per_model_stats);
                    block_json["entries"] = json!(b.entries);
                }

                block_json
            }).collect::<Vec<_>>()
        });

        serde_json::to_string_pretty(&output).unwrap_or_default()
    }

    fn format_alerts(&self, manager: &NotificationManager, _tz: &chrono_tz::Tz) -> String {
        let output = json!({
            "notifications": manager.states(),
            "preferences": manager.preferences(),
            "stats": manager.stats(),
        });
        serde_json::to_string_pretty(&output).unwrap_or_default()
    }
}

pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(TableFormatter)
    }
}
