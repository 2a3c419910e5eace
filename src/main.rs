use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use famcal_calendar::{
    due_reminders, instances_in_window, ConflictDetector, ConflictQuery, ConflictWatcher,
    EventStore, RemoteEventStore, RetryConfig, SqliteEventStore, TimeWindow,
};
use famcal_core::{AppError, Config, ConfigError};

const USAGE: &str = "usage:
  famcal [--remote] [FAMILY_ID]
  famcal [--remote] check FAMILY_ID START END [EXCLUDE_EVENT_ID]

START and END are RFC 3339 timestamps.";

#[tokio::main]
async fn main() -> Result<()> {
    famcal_core::init()?;

    if let Err(err) = run().await {
        tracing::error!("{:#}", err);
        let err = AppError::from(err);
        eprintln!("{}\n  ({})", err.user_message(), err);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let (config, _validation) = Config::load_validated()?;

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let remote = match args.iter().position(|a| a == "--remote") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };

    let store: Arc<dyn EventStore> = if remote {
        Arc::new(open_remote_store(&config)?)
    } else {
        Arc::new(open_local_store(&config)?)
    };

    match args.first().map(String::as_str) {
        Some("check") => check(&config, store, &args[1..]).await,
        Some("-h") | Some("--help") => {
            println!("{}", USAGE);
            Ok(())
        }
        family => {
            let family_id = match family {
                Some(id) => id.to_string(),
                None => config.calendar.default_family_id.clone().ok_or_else(|| {
                    ConfigError::MissingSetting("calendar.default_family_id".to_string())
                })?,
            };
            agenda(&config, store, &family_id).await
        }
    }
}

fn open_local_store(config: &Config) -> Result<SqliteEventStore> {
    let path = &config.store.database_path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(AppError::Io)?;
    }
    SqliteEventStore::new(path)
        .map_err(AppError::from)
        .with_context(|| format!("Failed to open event store at {}", path.display()))
}

fn open_remote_store(config: &Config) -> Result<RemoteEventStore> {
    let api_key = config
        .backend
        .api_key
        .as_deref()
        .ok_or_else(|| ConfigError::MissingSetting("backend.api_key".to_string()))?;

    let mut store = RemoteEventStore::new(&config.backend.api_url, api_key)
        .with_retry(RetryConfig::from(&config.retry));
    if let Some(token) = config.backend.access_token.as_deref() {
        store = store.with_access_token(token);
    }
    Ok(store)
}

async fn agenda(config: &Config, store: Arc<dyn EventStore>, family_id: &str) -> Result<()> {
    let start = Utc::now();
    let window = TimeWindow::new(
        start,
        start + Duration::days(i64::from(config.calendar.window_days)),
    );

    // Unbounded fetch: a series that began before the window can still
    // have occurrences inside it.
    let rows = store
        .fetch_family_events(family_id, None)
        .await
        .map_err(AppError::from)
        .context("Could not load events")?;

    let instances = instances_in_window(&rows, &window);
    tracing::info!(family_id, count = instances.len(), "Agenda built");

    println!("Agenda for {} ({} days)", family_id, config.calendar.window_days);
    if instances.is_empty() {
        println!("  nothing scheduled");
    }
    for instance in &instances {
        println!(
            "  {}  {}  {}",
            local_time(instance.start),
            local_time(instance.end),
            instance.title
        );
    }

    let horizon = start + Duration::minutes(i64::from(config.calendar.reminder_poll_minutes));
    let due = due_reminders(&rows, start, horizon);
    if !due.is_empty() {
        println!(
            "\nReminders due in the next {} minutes:",
            config.calendar.reminder_poll_minutes
        );
        for reminder in &due {
            println!(
                "  {} ({}) at {}",
                reminder.title,
                reminder.method.as_str(),
                local_time(reminder.event_start)
            );
        }
    }

    Ok(())
}

async fn check(config: &Config, store: Arc<dyn EventStore>, args: &[String]) -> Result<()> {
    let [family_id, start, end, rest @ ..] = args else {
        bail!("{}", USAGE);
    };
    let start = parse_time(start)?;
    let end = parse_time(end)?;

    let mut query = ConflictQuery::new(family_id.as_str(), start, end);
    if let Some(exclude) = rest.first() {
        query = query.excluding(exclude.as_str());
    }

    let (watcher, mut outcomes) =
        ConflictWatcher::from_settings(ConflictDetector::new(store), &config.calendar);
    watcher
        .submit(query)
        .await
        .context("Conflict check task failed")?;
    let outcome = outcomes
        .recv()
        .await
        .context("Conflict check produced no result")?;

    let conflicts = outcome
        .result
        .map_err(AppError::from)
        .context("Conflict check could not run")?;

    if conflicts.is_empty() {
        println!("No conflicts");
    }
    for conflict in &conflicts {
        println!(
            "Conflicts with {} ({} to {})",
            conflict.title,
            local_time(conflict.start),
            local_time(conflict.end)
        );
    }
    Ok(())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Not an RFC 3339 timestamp: {}", value))
}

fn local_time(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%a %b %e %H:%M").to_string()
}
