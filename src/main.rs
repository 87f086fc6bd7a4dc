use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use filter_catalog::backend::{Backend, BackendSettings, HttpFilterListSource};
use filter_catalog::catalog::{CatalogMetadata, FilterId, GroupId};
use filter_catalog::config::Config;
use filter_catalog::storage::{Database, StorageError};
use filter_catalog::sync::{
    event_channel, CatalogView, Command, CustomFilterReply, Reply, SyncEvent, ViewContext,
    ViewEffect,
};

/// Metadata documents larger than this are refused.
const MAX_IMPORT_SIZE: u64 = 32 * 1024 * 1024;

/// Get the config directory path (~/.config/filter-catalog/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("filter-catalog"))
}

#[derive(Parser, Debug)]
#[command(
    name = "filter-catalog",
    about = "Filter list catalog: categories, recommendations and updates"
)]
struct Args {
    /// Config file (default: ~/.config/filter-catalog/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Import a catalog metadata document ({groups, tags, filters} JSON)
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the categorized catalog as JSON
    Snapshot,
    /// Enable a filter
    Enable { filter_id: FilterId },
    /// Disable a filter
    Disable { filter_id: FilterId },
    /// Enable the recommended filters of a group
    EnableGroup { group_id: GroupId },
    /// Disable every filter of a group
    DisableGroup { group_id: GroupId },
    /// Remove a custom filter
    Remove { filter_id: FilterId },
    /// Subscribe to a filter list by URL
    AddCustom { url: String },
    /// Re-download enabled filters and report the rules total
    Update,
    /// Set a boolean user setting
    Set {
        key: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                eprintln!("Warning: failed to restrict {}: {}", config_dir.display(), e);
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // RUST_LOG wins over the configured directive
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let db_path = config.database_path_in(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StorageError::InstanceLocked) => {
            eprintln!("Error: {}", StorageError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let source = HttpFilterListSource::new(
        Duration::from_secs(config.fetch_timeout_secs),
        config.max_list_size,
    )
    .context("Failed to create HTTP client")?;

    let (events, mut event_rx) = event_channel(64);
    let backend = Backend::new(db, source, events, BackendSettings::from(&config));

    let startup = backend
        .startup_state()
        .await
        .context("Failed to load startup state")?;
    let mut view = CatalogView::new(ViewContext::from_startup(startup));
    view.apply_snapshot(
        backend
            .filters_metadata()
            .await
            .context("Failed to load catalog")?,
    );

    let effects = match args.command {
        CliCommand::Import { file } => {
            let metadata = read_metadata(&file)?;
            let (summary, effects) =
                pump(&mut view, &mut event_rx, backend.import_metadata(&metadata)).await;
            let summary = summary.context("Failed to import catalog metadata")?;
            println!(
                "Imported {} groups, {} tags, {} filters",
                summary.groups, summary.tags, summary.filters
            );
            effects
        }
        cli => {
            let command = into_command(cli, &mut view);
            let name = command.type_name();
            let (reply, effects) = pump(&mut view, &mut event_rx, backend.dispatch(command)).await;
            let reply = reply.with_context(|| format!("{name} failed"))?;
            print_reply(reply)?;
            effects
        }
    };

    for effect in &effects {
        if let Some(line) = describe(effect) {
            println!("{line}");
        }
    }

    if view.needs_snapshot() {
        view.apply_snapshot(
            backend
                .filters_metadata()
                .await
                .context("Failed to refresh catalog")?,
        );
    }
    print_summary(&view);

    Ok(())
}

/// Toggles and settings are built by the view, the way the options page
/// issues them.
fn into_command(cli: CliCommand, view: &mut CatalogView) -> Command {
    match cli {
        CliCommand::Snapshot | CliCommand::Import { .. } => Command::GetFiltersMetadata,
        CliCommand::Enable { filter_id } => view.toggle_filter(filter_id, true),
        CliCommand::Disable { filter_id } => view.toggle_filter(filter_id, false),
        CliCommand::EnableGroup { group_id } => view.toggle_group(group_id, true),
        CliCommand::DisableGroup { group_id } => view.toggle_group(group_id, false),
        CliCommand::Remove { filter_id } => Command::RemoveFilter { filter_id },
        CliCommand::AddCustom { url } => Command::LoadCustomFilterInfo { url },
        CliCommand::Update => Command::CheckFiltersUpdate,
        CliCommand::Set { key, value } => view.change_setting(&key, value),
    }
}

/// Drive `work` to completion while replaying every event it emits through
/// the view, in emission order.
async fn pump<T>(
    view: &mut CatalogView,
    rx: &mut mpsc::Receiver<SyncEvent>,
    work: impl Future<Output = T>,
) -> (T, Vec<ViewEffect>) {
    let mut effects = Vec::new();
    tokio::pin!(work);

    let output = loop {
        tokio::select! {
            biased;

            Some(event) = rx.recv() => {
                effects.extend(view.handle_event(event));
            }

            output = &mut work => break output,
        }
    };

    // Events emitted right before completion are still buffered
    while let Ok(event) = rx.try_recv() {
        effects.extend(view.handle_event(event));
    }

    (output, effects)
}

/// Canonicalize, check and parse a metadata document.
fn read_metadata(path: &Path) -> Result<CatalogMetadata> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve import file: {}", path.display()))?;

    let metadata = std::fs::metadata(&canonical)?;
    if !metadata.is_file() {
        anyhow::bail!("Import path must be a regular file");
    }
    if metadata.len() > MAX_IMPORT_SIZE {
        anyhow::bail!(
            "Import file is {} bytes (max {} bytes)",
            metadata.len(),
            MAX_IMPORT_SIZE
        );
    }

    let content = std::fs::read_to_string(&canonical)
        .with_context(|| format!("Failed to read import file: {}", canonical.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid catalog metadata in {}", canonical.display()))
}

fn print_reply(reply: Reply) -> Result<()> {
    match reply {
        Reply::Ack => {}
        Reply::Snapshot(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Reply::Startup(state) => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Reply::CustomFilter(outcome) => {
            let failed = outcome.is_err();
            println!(
                "{}",
                serde_json::to_string_pretty(&CustomFilterReply::from(outcome))?
            );
            if failed {
                std::process::exit(2);
            }
        }
    }
    Ok(())
}

fn describe(effect: &ViewEffect) -> Option<String> {
    match effect {
        ViewEffect::FilterToggled {
            filter_id, enabled, ..
        } => Some(format!(
            "filter {filter_id}: {}",
            if *enabled { "enabled" } else { "disabled" }
        )),
        ViewEffect::DownloadIndicator {
            filter_id,
            filter_active: false,
            ..
        } => Some(format!("filter {filter_id}: download finished")),
        ViewEffect::RulesCount(info) => Some(format!(
            "rules: {}{}",
            info.rules_count,
            if info.rules_over_limit {
                " (over limit)"
            } else {
                ""
            }
        )),
        ViewEffect::SelfPromoToggled(enabled) => Some(format!(
            "acceptable ads: {}",
            if *enabled { "allowed" } else { "blocked" }
        )),
        _ => None,
    }
}

fn print_summary(view: &CatalogView) {
    let cache = view.cache();
    for category in cache.categories() {
        let total = category.recommended.len() + category.other.len();
        println!(
            "{:<32} {:>3}/{:<3} enabled",
            category.group_name,
            cache.enabled_count(category.group_id),
            total
        );
        let recommended = cache.recommended_filters(category.group_id).map(|f| (f, '*'));
        let other = cache.other_filters(category.group_id).map(|f| (f, ' '));
        for (filter, mark) in recommended.chain(other) {
            println!(
                "  [{}]{} {:>5} {}",
                if filter.enabled { 'x' } else { ' ' },
                mark,
                filter.filter_id,
                filter.name
            );
        }
    }
    let updated = view.last_update_text();
    if !updated.is_empty() {
        println!("last update: {updated}");
    }
}
