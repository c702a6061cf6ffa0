use clap::{Parser, Subcommand};
use emberlog_cli::{commands, readline};
use emberlog_core::LogService;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "encounter log shell")]
struct Args {
    /// Directory holding the per-log store files.
    #[arg(long, default_value = "logdbs")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let service =
        Arc::new(LogService::open(args.root).map_err(|e| format!("open store root: {e}"))?);

    // Report index refreshes (imports, deletes, renames) as they land.
    let mut changes = service.subscribe_changes();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            tracing::info!("[INDEX] refreshed (generation {})", *changes.borrow());
        }
    });

    loop {
        let line = readline()?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, Arc::clone(&service)).await {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => {
                eprintln!("{err}");
            }
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(version, about = "shell")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one or more log files (independent logs run in parallel).
    Import {
        paths: Vec<String>,
        /// Drop per-event samples to shrink the stored detail blobs.
        #[arg(long)]
        no_samples: bool,
    },
    /// List all sessions, newest first.
    Sessions,
    /// List the fights of a session.
    Fights { session_id: String },
    /// Show a fight's per-ability aggregates.
    Aggregates {
        fight_id: String,
        #[arg(short, long)]
        source: Option<i64>,
        #[arg(short, long)]
        target: Option<i64>,
        #[arg(long)]
        heals: bool,
    },
    /// Show a fight's per-second series (filtered when samples exist).
    Series {
        fight_id: String,
        #[arg(short, long)]
        source: Option<i64>,
        #[arg(short, long)]
        target: Option<i64>,
        #[arg(long)]
        heals: bool,
    },
    /// Damage/heal totals over a millisecond range of a fight.
    Range {
        fight_id: String,
        from_ms: i64,
        to_ms: i64,
    },
    /// List store files under the root.
    Stores,
    /// Rename GUID-named stores to the friendly timestamped form.
    RenameLegacy,
    /// Delete one store file under the root.
    DeleteStore { path: String },
    /// Set (or clear, when omitted) a session's display name.
    SetName {
        session_id: String,
        name: Option<String>,
    },
    Exit,
}

async fn respond(line: &str, service: Arc<LogService>) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "emberlog".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match cli.command {
        Some(Commands::Import { paths, no_samples }) => {
            commands::import(&service, &paths, no_samples)
        }
        Some(Commands::Sessions) => commands::sessions(&service),
        Some(Commands::Fights { session_id }) => commands::fights(&service, &session_id),
        Some(Commands::Aggregates {
            fight_id,
            source,
            target,
            heals,
        }) => commands::aggregates(&service, &fight_id, source, target, heals),
        Some(Commands::Series {
            fight_id,
            source,
            target,
            heals,
        }) => commands::series(&service, &fight_id, source, target, heals),
        Some(Commands::Range {
            fight_id,
            from_ms,
            to_ms,
        }) => commands::range(&service, &fight_id, from_ms, to_ms),
        Some(Commands::Stores) => commands::stores(&service),
        Some(Commands::RenameLegacy) => commands::rename_legacy(&service),
        Some(Commands::DeleteStore { path }) => commands::delete_store(&service, &path),
        Some(Commands::SetName { session_id, name }) => {
            commands::set_name(&service, &session_id, name.as_deref())
        }
        Some(Commands::Exit) => return Ok(true),
        None => Ok(()),
    }
    .map_err(|e| e.to_string())?;

    Ok(false)
}
