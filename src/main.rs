// Headless host for the hazard map core
//
//   hazard-map watch                       log every marker-set change until Ctrl-C
//   hazard-map report <category> <lat> <lon>
//   hazard-map remove <event-id>

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use hazard_map_lib::context::{AppContext, Collaborators};
use hazard_map_lib::interaction::{CreateOutcome, DeleteOutcome};
use hazard_map_lib::location::NoLocation;
use hazard_map_lib::model::{category_at, category_by_label, Coordinate, EventId, CATEGORY_OPTIONS};
use hazard_map_lib::notice::LogNotifier;
use hazard_map_lib::store::Backend;
use hazard_map_lib::AppConfig;

/// How long a one-shot command waits for its write to show up in the feed
const ECHO_TIMEOUT: Duration = Duration::from_secs(15);

/// Index of "Excluir" in the delete confirmation
const CONFIRM_DELETE: usize = 1;

enum Command {
    Watch,
    Report { category: usize, at: Coordinate },
    Remove { id: EventId },
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let command = args.next().unwrap_or_else(|| "watch".to_string());
        match command.as_str() {
            "watch" => Ok(Command::Watch),
            "report" => {
                let category = args.next().ok_or_else(|| anyhow!("report needs a category"))?;
                let lat = args.next().ok_or_else(|| anyhow!("report needs a latitude"))?;
                let lon = args.next().ok_or_else(|| anyhow!("report needs a longitude"))?;
                Ok(Command::Report {
                    category: parse_category(&category)?,
                    at: Coordinate::new(
                        lat.parse().with_context(|| format!("Bad latitude: {}", lat))?,
                        lon.parse().with_context(|| format!("Bad longitude: {}", lon))?,
                    ),
                })
            }
            "remove" => {
                let id = args.next().ok_or_else(|| anyhow!("remove needs an event id"))?;
                Ok(Command::Remove { id: EventId::new(id) })
            }
            other => bail!("Unknown command '{}' (expected watch, report or remove)", other),
        }
    }
}

/// Category by 1-based picker position or by label
fn parse_category(raw: &str) -> Result<usize> {
    if let Ok(position) = raw.parse::<usize>() {
        if position >= 1 && category_at(position - 1).is_some() {
            return Ok(position - 1);
        }
    }
    category_by_label(raw)
        .and_then(|option| CATEGORY_OPTIONS.iter().position(|o| o == option))
        .ok_or_else(|| anyhow!("Unknown category '{}'", raw))
}

fn main() -> Result<()> {
    // Initialize env_logger to output to stderr (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let command = Command::parse(std::env::args().skip(1))?;
    let config = AppConfig::load()?;

    // The core assumes a single event loop
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    runtime.block_on(run(config, command))
}

async fn run(config: AppConfig, command: Command) -> Result<()> {
    let backend = Backend::open(&config).context("Failed to open backend")?;
    let notifier = match command {
        Command::Remove { .. } => LogNotifier::answering(CONFIRM_DELETE),
        _ => LogNotifier::new(),
    };
    let collaborators = Collaborators::new(backend, Arc::new(NoLocation), Arc::new(notifier));

    let ctx = AppContext::start(&config, collaborators)
        .await
        .context("Failed to start event feed")?;
    let presenter = ctx.presenter();

    if !presenter.wait_until_loaded().await {
        ctx.shutdown().await;
        bail!("Event feed closed before the first snapshot");
    }
    info!("Initial load complete: {} markers", presenter.markers().len());

    let mut feed = presenter.watch_feed();
    feed.borrow_and_update();

    let result = match command {
        Command::Watch => {
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = feed.changed() => {
                        if changed.is_err() {
                            warn!("Event feed ended");
                            break;
                        }
                        let markers = feed.borrow_and_update().markers.clone();
                        info!("{} markers", markers.len());
                        for record in &markers {
                            info!(
                                "  {} {} ({}) at ({}, {})",
                                record.id,
                                record.fields.value,
                                record.fields.marker_color,
                                record.fields.latitude,
                                record.fields.longitude
                            );
                        }
                    }
                }
            }
            Ok(())
        }
        Command::Report { category, at } => {
            // Answer the category dialog the way a user would
            let dialog = ctx.dialog();
            let picker = tokio::spawn(async move {
                let mut visible = dialog.watch_visibility();
                if visible.wait_for(|v| *v).await.is_ok() {
                    dialog.select(category);
                }
            });

            let outcome = presenter.on_long_press(at).await;
            picker.abort();
            match outcome {
                CreateOutcome::Submitted(id) => {
                    let echoed = tokio::time::timeout(
                        ECHO_TIMEOUT,
                        feed.wait_for(|state| state.markers.contains(&id)),
                    )
                    .await;
                    match echoed {
                        Ok(Ok(_)) => info!("Event {} is on the map", id),
                        _ => warn!("Event {} was written but has not appeared in the feed yet", id),
                    }
                    Ok(())
                }
                other => Err(anyhow!("Report did not go through: {:?}", other)),
            }
        }
        Command::Remove { id } => match presenter.on_callout_press(&id).await {
            DeleteOutcome::Deleted => {
                let gone = tokio::time::timeout(
                    ECHO_TIMEOUT,
                    feed.wait_for(|state| !state.markers.contains(&id)),
                )
                .await;
                if !matches!(gone, Ok(Ok(_))) {
                    warn!("Event {} was deleted but is still in the feed", id);
                }
                Ok(())
            }
            other => Err(anyhow!("Remove did not go through: {:?}", other)),
        },
    };

    ctx.shutdown().await;
    result
}
