// src/main.rs
//
// watch-history command line front end

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use watch_history::application::{AppState, ErrorResponse};
use watch_history::db::DatabaseConfig;
use watch_history::live::{LiveQuery, Subscription};
use watch_history::{AppError, HistoryConfig, HistoryEntry, RecordProgressRequest};

#[derive(Parser, Debug)]
#[command(name = "watch-history", version, about = "Local playback history store")]
struct Cli {
    /// Database file (defaults to the per-user data directory)
    #[arg(long, env = "WATCH_HISTORY_DB")]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Most recently watched entries
    Recent {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Entries not yet completed
    Incomplete,
    /// Continue-watching page, one entry per title
    Continue {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Look up one entry by media and episode id
    Show {
        media_id: String,
        #[arg(long)]
        episode: Option<String>,
    },
    /// Entries for a show title
    Title { title: String },
    /// Number of stored entries
    Count,
    /// Record playback progress
    Record {
        media_id: String,
        #[arg(long)]
        title: String,
        #[arg(long = "type", default_value = "movie")]
        media_type: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        poster: Option<String>,
        #[arg(long)]
        episode: Option<String>,
        #[arg(long)]
        episode_title: Option<String>,
        #[arg(long)]
        season: Option<i32>,
        #[arg(long)]
        number: Option<i32>,
        /// Playback position in milliseconds
        #[arg(long)]
        position: i64,
        /// Total duration in milliseconds
        #[arg(long, default_value_t = 0)]
        duration: i64,
    },
    /// Delete every entry for a media (and episode) id
    Remove {
        media_id: String,
        #[arg(long)]
        episode: Option<String>,
    },
    /// Delete all history
    Clear,
    /// Keep only the newest entry per media/episode pair
    Dedupe,
    /// Keep only the N most recently watched entries
    Prune {
        #[arg(long)]
        keep: usize,
    },
    /// Database statistics
    Stats,
    /// Stream a live query until interrupted
    Watch {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        incomplete: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let json = cli.json;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let db_config = match &cli.db {
        Some(path) => DatabaseConfig::at(path)
            .with_env_overrides()
            .map(|config| DatabaseConfig {
                path: path.clone(),
                ..config
            }),
        None => DatabaseConfig::default_location().and_then(DatabaseConfig::with_env_overrides),
    };

    let result = db_config.and_then(|config| {
        AppState::open(&config, HistoryConfig::default(), runtime.handle().clone())
    });
    let state = match result {
        Ok(state) => state,
        Err(e) => return Err(report(e, json)),
    };

    let outcome = run(&state, &runtime, cli.command, json);
    state.close();

    outcome.map_err(|e| report(e, json))
}

fn run(
    state: &AppState,
    runtime: &tokio::runtime::Runtime,
    command: Command,
    json: bool,
) -> Result<(), AppError> {
    let service = &state.history_service;

    match command {
        Command::Recent { limit } => print_entries(&service.recent_history(limit)?, json)?,
        Command::Incomplete => print_entries(&service.incomplete_history()?, json)?,
        Command::Continue { limit, offset } => {
            let page = service.continue_watching(limit, offset)?;
            if json {
                print_json(&page)?;
            } else {
                print_entries(&page.entries, false)?;
                println!(
                    "{} incomplete total{}",
                    page.total,
                    if page.has_more { ", more available" } else { "" }
                );
            }
        }
        Command::Show { media_id, episode } => {
            let entry = service
                .history_entry(&media_id, episode)?
                .ok_or(AppError::NotFound)?;
            print_entries(std::slice::from_ref(&entry), json)?;
        }
        Command::Title { title } => print_entries(&service.history_by_show(&title)?, json)?,
        Command::Count => print_value(service.history_count()?, json)?,
        Command::Record {
            media_id,
            title,
            media_type,
            url,
            poster,
            episode,
            episode_title,
            season,
            number,
            position,
            duration,
        } => {
            let outcome = service.record_progress(RecordProgressRequest {
                media_id,
                title,
                media_type,
                url,
                poster_image: poster,
                episode_id: episode,
                episode_title,
                season_number: season,
                episode_number: number,
                position,
                duration,
            })?;
            if json {
                print_json(&serde_json::json!({
                    "rowId": outcome.row_id,
                    "inserted": outcome.inserted,
                }))?;
            } else {
                let verb = if outcome.inserted { "Created" } else { "Updated" };
                println!("{} entry {}", verb, outcome.row_id);
            }
        }
        Command::Remove { media_id, episode } => {
            print_value(service.delete_entry(&media_id, episode)?, json)?
        }
        Command::Clear => print_value(service.clear_all()?, json)?,
        Command::Dedupe => print_value(service.remove_duplicates()?, json)?,
        Command::Prune { keep } => print_value(service.prune_oldest(keep)?, json)?,
        Command::Stats => {
            let stats = state.database_stats()?;
            if json {
                print_json(&stats)?;
            } else {
                println!("schema version: {}", stats.schema_version);
                println!("entries:        {}", stats.entry_count);
                println!("journal mode:   {}", stats.journal_mode);
                println!("size:           {} bytes", stats.size_bytes);
            }
        }
        Command::Watch { limit, incomplete } => {
            let query = if incomplete {
                LiveQuery::Incomplete
            } else {
                LiveQuery::Recent { limit }
            };
            let subscription = state.live_queries.subscribe(query);
            log::info!("Watching {} (ctrl-c to stop)", subscription.query());
            runtime.block_on(stream(subscription, json, ctrl_c()))?;
        }
    }

    Ok(())
}

/// Print snapshots until `stop` resolves or the stream ends.
async fn stream<S>(mut subscription: Subscription, json: bool, stop: S) -> Result<(), AppError>
where
    S: Future<Output = ()>,
{
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            item = subscription.next() => match item {
                Some(Ok(snapshot)) => {
                    if !json {
                        println!("--- {} entries ---", snapshot.len());
                    }
                    print_entries(&snapshot, json)?;
                }
                Some(Err(e)) => log::error!("Live query failed: {}", e),
                None => break,
            },
        }
    }

    subscription.cancel();
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_entries(entries: &[HistoryEntry], json: bool) -> Result<(), AppError> {
    if json {
        return print_json(&entries);
    }

    for entry in entries {
        let episode = match (&entry.episode_id, entry.season_number, entry.episode_number) {
            (Some(_), Some(season), Some(number)) => format!(" S{:02}E{:02}", season, number),
            (Some(id), _, _) => format!(" [{}]", id),
            _ => String::new(),
        };
        println!(
            "{:>6}  {}{}  {:.0}%{}",
            entry.row_id,
            entry.title,
            episode,
            entry.percent_watched,
            if entry.completed { "  (completed)" } else { "" }
        );
    }
    Ok(())
}

fn print_value<T: Serialize + std::fmt::Display>(value: T, json: bool) -> Result<(), AppError> {
    if json {
        print_json(&value)
    } else {
        println!("{}", value);
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Turn an application error into the process error, echoing the
/// structured response on stdout in JSON mode.
fn report(error: AppError, json: bool) -> anyhow::Error {
    if json {
        println!("{}", ErrorResponse::from_app_error(&error).to_json());
    }
    anyhow::Error::new(error)
}
