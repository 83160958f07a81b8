//! geochoice - pick a country, state and city from the terminal.
//!
//! Lists are served from the local cache when present and fetched from the
//! place directory otherwise, so a subtree only has to be downloaded once.

mod command;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use geochoice_core::{
    ApiClient, Config, JsonPlaceCache, Level, LoadError, LoadFailure, LoadState, PlacePicker,
    PlaceSlot, SelectionStore, Subscription, NO_SELECTION,
};

use command::Command;

/// Environment variable overriding the configured API base URL
const API_URL_ENV: &str = "GEOCHOICE_API_URL";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("geochoice starting");

    let mut config = Config::load()?;
    if let Ok(url) = std::env::var(API_URL_ENV) {
        config.api_base_url = url;
    }

    let cache = JsonPlaceCache::new(config.cache_dir()?).context("Failed to open place cache")?;
    let api = ApiClient::from_config(&config)?;
    let store = SelectionStore::new(config.data_dir()?);

    let saved = match store.load() {
        Ok(saved) => saved,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable saved selection");
            None
        }
    };

    let picker = PlacePicker::start(
        Arc::new(cache.clone()),
        Arc::new(api),
        saved,
        config.max_concurrent_loads(),
    )?;
    let _watchers = watch_slots(&picker);

    let result = run(&picker, &cache).await;

    if let Err(e) = store.save(&picker.save()) {
        warn!(error = %e, "Could not save selection");
    }
    picker.teardown();

    info!("geochoice shutting down");
    result
}

async fn run(picker: &PlacePicker, cache: &JsonPlaceCache) -> Result<()> {
    println!("{}", command::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Ok(Command::Show) => show(picker, cache),
            Ok(Command::Select(level, id)) => picker.slot(level).select(id),
            Ok(Command::Clear(level)) => picker.slot(level).select(NO_SELECTION),
            Ok(Command::Retry) => picker.request_retry(),
            Ok(Command::Help) => println!("{}", command::HELP),
            Ok(Command::Quit) => break,
            Ok(Command::Nothing) => {}
            Err(e) => eprintln!("{}", e),
        }
    }
    Ok(())
}

/// Print every state change as it happens.
fn watch_slots(picker: &PlacePicker) -> Vec<Subscription> {
    let mut subscriptions: Vec<Subscription> = Level::ALL
        .into_iter()
        .map(|level| {
            let slot = Arc::clone(picker.slot(level));
            picker.slot(level).subscribe_state(move |_, state: &LoadState| {
                match state {
                    LoadState::Ok => println!("[{}] {} loaded", level, slot.items().len()),
                    other => println!("[{}] {}", level, other),
                }
            })
        })
        .collect();

    subscriptions.push(picker.subscribe_problem(|_, problem| {
        if let Some(failure) = problem {
            println!("problem: {}", describe(failure));
        }
    }));
    subscriptions
}

fn show(picker: &PlacePicker, cache: &JsonPlaceCache) {
    for level in Level::ALL {
        let slot = picker.slot(level);
        let age = cache
            .table_age(level)
            .map(|age| format!(", cached {}", age))
            .unwrap_or_default();
        println!("{} [{}{}]", level, slot.state(), age);
        print_items(slot);
    }
    if let Some(problem) = picker.problem() {
        println!("problem: {}", describe(&problem));
    }
}

fn describe(failure: &LoadFailure) -> String {
    match &failure.error {
        LoadError::Network(e) if e.is_timeout() => format!(
            "{} list timed out, the place directory is slow or unreachable (type `retry` to try again)",
            failure.level
        ),
        _ => format!("{} (type `retry` to try again)", failure),
    }
}

fn print_items(slot: &PlaceSlot) {
    let selected = slot.selected();
    for place in slot.items() {
        let marker = if place.id == selected { '*' } else { ' ' };
        println!("  {} {:>6}  {}", marker, place.id, place.name);
    }
}
