use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use paddock_cache::CacheStore;
use paddock_common::Config;
use paddock_scout::{Assembler, AssemblyOutcome};
use paddock_scraper::{FetchSettings, HttpFetcher};

/// Exit status for a run stopped by Ctrl-C.
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "paddock", about = "netkeiba race data scraper and cache")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the races held on a date, optionally at one venue
    Races {
        /// Race date, YYYYMMDD
        #[arg(long)]
        date: String,
        /// Venue name, e.g. 東京
        #[arg(long)]
        track: Option<String>,
        /// Print only the id of this race number at `--track`
        #[arg(long, requires = "track")]
        number: Option<u32>,
    },
    /// Assemble the full dataset for one race
    Assemble {
        #[arg(long)]
        race_id: String,
        /// Venue name written into the dataset
        #[arg(long)]
        track: Option<String>,
    },
    /// Recent form, pedigree and career stats for one horse
    Horse {
        #[arg(long)]
        horse_id: String,
        /// Number of detailed results to include
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Career and recent-window stats for one jockey
    Jockey {
        #[arg(long)]
        jockey_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("paddock=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("invalid configuration")?;
    config.log_redacted();

    let fetcher = HttpFetcher::new(&FetchSettings::from(&config)).context("failed to build HTTP client")?;
    let cache = CacheStore::from_config(&config).await;
    let assembler = Assembler::new(Arc::new(fetcher), cache, &config);

    match cli.command {
        Command::Races { date, track, number } => match (track, number) {
            (Some(track), Some(number)) => {
                let race_id = assembler.races().find_race_id(&date, &track, number).await?;
                print_json(&json!({ "race_id": race_id }))?;
            }
            (Some(track), None) => print_json(&assembler.resolve_race_ids(&date, &track).await?)?,
            (None, _) => print_json(&assembler.races().list_by_date(&date).await?)?,
        },

        Command::Assemble { race_id, track } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling");
                    on_signal.cancel();
                }
            });

            match assembler.assemble(&race_id, track.as_deref(), &cancel).await? {
                AssemblyOutcome::Complete(dataset) => print_json(&dataset)?,
                AssemblyOutcome::Cancelled(partial) => {
                    print_json(&partial)?;
                    std::process::exit(EXIT_CANCELLED);
                }
            }
        }

        Command::Horse { horse_id, limit } => {
            let history = assembler.horse_history(&horse_id).await?;
            let pedigree = assembler.horse_parents(&horse_id).await?;
            let overall = assembler.horses().fetch_overall_stats(&horse_id).await?;
            let results = assembler.horses().fetch_race_results(&horse_id, Some(limit)).await?;

            let failed: Vec<String> = pedigree.failed.iter().map(ToString::to_string).collect();
            print_json(&json!({
                "history": history,
                "parents": pedigree.info,
                "failed_parent_profiles": failed,
                "overall": overall,
                "results": results,
            }))?;
        }

        Command::Jockey { jockey_id } => print_json(&assembler.jockey_stats(&jockey_id).await?)?,
    }

    info!("Done");
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
