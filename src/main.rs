//! tokenburn - live token burn rate and limit alerts from a JSONL usage file

use is_terminal::IsTerminal;
use tokenburn::{
    Result,
    cli::{AlertsArgs, BlocksArgs, Cli, Command, WatchArgs},
    config::Config,
    display::TerminalSink,
    orchestrator::Orchestrator,
    reader::JsonlSource,
};
use tokenburn_core::calculator::refresh_active_metrics;
use tokenburn_core::source::load_sorted_entries;
use tokenburn_core::SessionBlockBuilder;
use tokenburn_monitor::NotificationManager;
use tokenburn_terminal::get_formatter;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose opts into info for our crates
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            tracing_subscriber::EnvFilter::new("tokenburn=info")
        } else {
            tracing_subscriber::EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_cli(&cli)?;
    info!("Using timezone: {}", config.zone.name());

    match cli.command_or_default() {
        Command::Watch(args) => watch(&config, args).await,
        Command::Blocks(args) => blocks(&config, args).await,
        Command::Alerts(args) => alerts(&config, args),
    }
}

async fn watch(config: &Config, args: WatchArgs) -> Result<()> {
    info!(
        "Watching {} every {}s",
        config.data_path.display(),
        config.tick.interval.as_secs()
    );

    let notifications = NotificationManager::new(&config.state_dir);
    let mut orchestrator = Orchestrator::new(
        JsonlSource::new(&config.data_path),
        config.tick,
        notifications,
    );
    let mut sink = TerminalSink::new(
        config.zone.tz,
        config.tick.interval.as_secs(),
        config.tick.plan,
        config.json,
    )
    .with_clear_screen(std::io::stdout().is_terminal());

    match args.ticks {
        Some(n) => {
            let completed = orchestrator.run_ticks(n, &mut sink).await?;
            info!("Completed {} of {} ticks", completed, n);
        }
        None => orchestrator.run(&mut sink).await?,
    }
    Ok(())
}

async fn blocks(config: &Config, args: BlocksArgs) -> Result<()> {
    info!("Running session block report");

    let entries = load_sorted_entries(&JsonlSource::new(&config.data_path)).await?;
    let now = chrono::Utc::now();
    let mut blocks = SessionBlockBuilder::new(config.tick.block)
        .with_cost_mode(config.tick.cost_mode)
        .build(&entries, now);
    refresh_active_metrics(&mut blocks, now);

    if args.active {
        blocks.retain(|b| b.is_active);
    }
    if args.recent {
        let cutoff = now - chrono::Duration::days(1);
        blocks.retain(|b| b.start_time > cutoff);
    }

    let formatter = get_formatter(config.json);
    println!("{}", formatter.format_blocks(&blocks, &config.zone.tz, args.models));
    Ok(())
}

fn alerts(config: &Config, args: AlertsArgs) -> Result<()> {
    let mut manager = NotificationManager::new(&config.state_dir);

    if let Some(key) = &args.reset {
        if manager.reset(key) {
            info!("Cleared notification state for {}", key);
        } else {
            return Err(tokenburn::TokenburnError::InvalidArgument(format!(
                "unknown alert key: {key}"
            )));
        }
    }

    if args.changes_preferences() {
        let mut preferences = *manager.preferences();
        if let Some(threshold) = args.priority_threshold {
            preferences.priority_threshold = threshold;
        }
        if let Some(quiet) = args.quiet_hours {
            preferences.quiet_hours = Some(quiet);
        }
        if args.no_quiet_hours {
            preferences.quiet_hours = None;
        }
        if let Some(max) = args.max_per_hour {
            preferences.max_notifications_per_hour = max;
        }
        manager.set_preferences(preferences)?;
        info!("Saved notification preferences");
    }

    let formatter = get_formatter(config.json);
    println!("{}", formatter.format_alerts(&manager, &config.zone.tz));
    Ok(())
}
