use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand};
use log::debug;

use lapstats::{
    AppConfig, FileBasedStore, Freshness, LapLogEditor, LapStatsError, QueryFacade,
    RecomputeTarget, SessionId, SessionInfo, SessionStore, format_lap_time, ingest_session,
    read_laps_jsonl, recompute,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Session storage directory, overrides the configured one
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recalculate cached session statistics
    #[command(group(
        ArgGroup::new("target")
            .required(true)
            .args(["session_id", "all", "outdated_only"]),
    ))]
    Recalculate {
        #[arg(long)]
        session_id: Option<u64>,

        #[arg(long)]
        all: bool,

        /// Only sessions without usable cached statistics
        #[arg(long)]
        outdated_only: bool,

        #[arg(long)]
        dry_run: bool,
    },
    /// Import a session from a JSON Lines lap file
    Ingest {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        track: String,

        #[arg(long)]
        car: String,

        #[arg(long)]
        session_type: String,

        #[arg(long)]
        name: Option<String>,
    },
    /// Print the statistics of a session
    Show {
        #[arg(long)]
        session_id: u64,
    },
    /// List stored sessions
    Sessions,
    /// Remove every lap of a driver from a session
    DeleteDriver {
        #[arg(long)]
        session_id: u64,

        #[arg(long)]
        driver: String,

        /// Recalculate right away instead of on the next read
        #[arg(long)]
        recompute: bool,
    },
    /// Update and save the persisted configuration
    Config {
        #[arg(long)]
        storage_path: Option<PathBuf>,

        #[arg(long)]
        recompute_after_ingest: Option<bool>,
    },
}

fn to_pretty_json<T: serde::Serialize>(what: &str, value: &T) -> Result<String, LapStatsError> {
    serde_json::to_string_pretty(value).map_err(|e| LapStatsError::Serialization {
        what: what.to_string(),
        source: e,
    })
}

fn recalculate(
    store: &mut FileBasedStore,
    target: RecomputeTarget,
    dry_run: bool,
) -> Result<bool, LapStatsError> {
    let report = recompute::run(store, target, dry_run)?;
    let total = report.planned.len();
    println!("Found {} session(s) to process.", total);

    if report.dry_run {
        for session_id in &report.planned {
            match store.session_info(*session_id) {
                Ok(Some(info)) => println!("Would recalculate: {} ({})", session_id, info),
                Ok(None) => println!("Would recalculate: {} (session info missing)", session_id),
                Err(e) => println!("Would recalculate: {} (session info unreadable: {})", session_id, e),
            }
        }
        return Ok(true);
    }

    for (i, session_id) in report.planned.iter().enumerate() {
        match report.failure_for(*session_id) {
            None => println!("[{}/{}] ✓ Session {}", i + 1, total, session_id),
            Some(failure) => println!(
                "[{}/{}] ✗ Session {}: {}",
                i + 1,
                total,
                session_id,
                failure.message
            ),
        }
    }

    println!(
        "Complete: {} successful, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    Ok(report.is_success())
}

fn ingest(
    store: &mut FileBasedStore,
    config: &AppConfig,
    input: &Path,
    info: SessionInfo,
) -> Result<(), LapStatsError> {
    let laps = read_laps_jsonl(input)?;
    let outcome = ingest_session(store, &info, laps, config.recompute_after_ingest)?;
    println!(
        "Created session {} with {} laps (statistics {})",
        outcome.session_id,
        outcome.lap_count,
        if outcome.cache_fresh {
            "precomputed"
        } else {
            "calculated on demand"
        }
    );
    Ok(())
}

fn show(store: &FileBasedStore, session_id: SessionId) -> Result<(), LapStatsError> {
    let info = store
        .session_info(session_id)?
        .ok_or(LapStatsError::SessionNotFound { session_id })?;
    println!("Session {}: {}", session_id, info);
    println!("Cache: {}", store.load_cache(session_id)?.status());

    let facade = QueryFacade::new(store);
    let statistics = facade.statistics(session_id)?;
    println!(
        "Driver statistics:\n{}",
        to_pretty_json("driver statistics", &statistics.driver_statistics)?
    );
    println!(
        "Chart data:\n{}",
        to_pretty_json("chart data", &statistics.chart_data)?
    );
    println!(
        "Sector statistics:\n{}",
        to_pretty_json("sector statistics", &statistics.sector_statistics)?
    );
    match statistics.fastest_lap() {
        Some(fastest) => println!(
            "Fastest lap: {} by {}",
            format_lap_time(Some(fastest.time)),
            fastest.driver
        ),
        None => println!("Fastest lap: {}", format_lap_time(None)),
    }
    Ok(())
}

fn sessions(store: &FileBasedStore) -> Result<(), LapStatsError> {
    for session_id in store.list_sessions()? {
        let Some(info) = store.session_info(session_id)? else {
            continue;
        };
        println!(
            "{:>5}  {:<7} {}",
            session_id,
            store.load_cache(session_id)?.status(),
            info
        );
    }
    Ok(())
}

fn delete_driver(
    store: &mut FileBasedStore,
    session_id: SessionId,
    driver: &str,
    recompute: bool,
) -> Result<(), LapStatsError> {
    let freshness = if recompute {
        Freshness::Immediate
    } else {
        Freshness::Lazy
    };
    let removed = LapLogEditor::new(store).delete_driver(session_id, driver, freshness)?;
    println!(
        "Removed {} lap(s) of {} from session {}",
        removed, driver, session_id
    );
    Ok(())
}

fn configure(
    mut config: AppConfig,
    storage_path: Option<PathBuf>,
    recompute_after_ingest: Option<bool>,
) -> Result<(), LapStatsError> {
    if storage_path.is_some() {
        config.storage_path = storage_path;
    }
    if let Some(recompute_after_ingest) = recompute_after_ingest {
        config.recompute_after_ingest = recompute_after_ingest;
    }
    config.save()?;

    println!("Saved configuration to {:?}", AppConfig::config_path()?);
    println!("{}", to_pretty_json("config", &config)?);
    Ok(())
}

fn run(cli: Args) -> Result<bool, LapStatsError> {
    let config = AppConfig::from_local_file()?.unwrap_or_default();
    if let Commands::Config {
        storage_path,
        recompute_after_ingest,
    } = cli.command
    {
        configure(config, storage_path, recompute_after_ingest)?;
        return Ok(true);
    }

    let storage_path = config.resolve_storage_path(cli.storage.as_deref())?;
    debug!("Using session storage at {:?}", storage_path);
    let mut store = FileBasedStore::new(storage_path)?;

    match cli.command {
        Commands::Recalculate {
            session_id,
            all,
            outdated_only,
            dry_run,
        } => {
            let target = match (session_id, all, outdated_only) {
                (Some(id), _, _) => RecomputeTarget::Session(SessionId(id)),
                (None, true, _) => RecomputeTarget::All,
                _ => RecomputeTarget::OutdatedOnly,
            };
            return recalculate(&mut store, target, dry_run);
        }
        Commands::Ingest {
            input,
            track,
            car,
            session_type,
            name,
        } => {
            let mut info = SessionInfo::new(track, car, session_type);
            if let Some(name) = name {
                info = info.with_name(name);
            }
            ingest(&mut store, &config, &input, info)?;
        }
        Commands::Show { session_id } => show(&store, SessionId(session_id))?,
        Commands::Sessions => sessions(&store)?,
        Commands::DeleteDriver {
            session_id,
            driver,
            recompute,
        } => delete_driver(&mut store, SessionId(session_id), &driver, recompute)?,
        Commands::Config { .. } => {}
    }
    Ok(true)
}

fn main() -> ExitCode {
    colog::init();

    let cli = Args::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
