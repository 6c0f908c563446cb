use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use src_sync::import::taxonomy::{build_mapping, resolve_game};
use src_sync::import::{ExternalSource, ImportOptions, ImportSession};
use src_sync::model::{LeaderboardType, RunType};
use src_sync::providers::speedrun::client_from_env;
use src_sync::scoring::score;
use src_sync::store::{Db, PgStore};
use src_sync::tracing::init_tracing;
use src_sync::util::env;

#[derive(Parser, Debug)]
#[command(name = "src_sync", version, about = "speedrun.com leaderboard importer")]
struct Cli {
    /// Debug-level logs with source locations (ignored when RUST_LOG is set)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Import new runs for one game into the local leaderboard
    Import {
        /// External game id or abbreviation (defaults to SRC_GAME)
        #[arg(long)]
        game: Option<String>,
        /// Run the whole pipeline without writing anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Concurrent name lookups (defaults to SRC_CONCURRENCY or 8)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Show how the external taxonomy maps onto the local one
    Mappings {
        /// External game id or abbreviation (defaults to SRC_GAME)
        #[arg(long)]
        game: Option<String>,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Compute leaderboard points for a placement
    Score {
        #[arg(long)]
        rank: u32,
        /// solo or co-op
        #[arg(long, default_value = "solo")]
        run_type: String,
        /// regular, individual-level or community-golds
        #[arg(long, default_value = "regular")]
        leaderboard_type: String,
        #[arg(long, default_value_t = false)]
        obsolete: bool,
    },
}

fn resolve_game_arg(game: Option<String>) -> Result<String> {
    game.or_else(|| env::env_opt("SRC_GAME"))
        .ok_or_else(|| anyhow!("no game given; pass --game or set SRC_GAME"))
}

async fn connect_store(db_url: Option<String>) -> Result<PgStore> {
    let database_url = match db_url {
        Some(url) => url,
        None => env::db_url()?,
    };
    let max_conns: u32 = env::env_parse("DB_MAX_CONNS", 5u32);
    let db = Db::connect(&database_url, max_conns)
        .await
        .context("connect to leaderboard database")?;
    Ok(PgStore::new(db))
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    let cli = Cli::parse();
    init_tracing("info,sqlx=warn", cli.verbose)?;

    match cli.command {
        Commands::Import {
            game,
            dry_run,
            db_url,
            concurrency,
        } => {
            env::preflight_check(
                "src_sync import",
                &[],
                &[
                    "SRC_GAME",
                    "SRC_API_BASE",
                    "SRC_RUN_STATUS",
                    "SRC_PAGE_SIZE",
                    "SRC_MAX_PAGES",
                    "DATABASE_URL",
                ],
            )?;
            let game = resolve_game_arg(game)?;
            let store = connect_store(db_url).await?;
            let source = client_from_env()?;

            let mut options = ImportOptions::new(game);
            options.dry_run = dry_run;
            options.concurrency = concurrency
                .unwrap_or_else(|| env::env_parse("SRC_CONCURRENCY", 8usize))
                .max(1);

            let result = ImportSession::new(&source, &store, options)
                .run(|total, imported, skipped| {
                    let done = imported + skipped;
                    if done % 50 == 0 {
                        info!(target = "import", total, imported, skipped, "progress");
                    }
                })
                .await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.errors.is_empty() {
                info!(
                    target = "import",
                    errors = result.errors.len(),
                    "some records were not imported; see errors above"
                );
            }
        }
        Commands::Mappings { game, db_url } => {
            let game = resolve_game_arg(game)?;
            let store = connect_store(db_url).await?;
            let source = client_from_env()?;
            let concurrency = env::env_parse("SRC_CONCURRENCY", 8usize).max(1);

            let game_id = resolve_game(&source, &game).await?;
            let runs = source
                .list_runs(&game_id)
                .await
                .with_context(|| format!("list runs for {game_id}"))?;
            let mapping = build_mapping(&source, &store, &game_id, &runs, concurrency).await?;

            fn unmatched<'a>(
                names: &'a std::collections::HashMap<String, String>,
                matched: &std::collections::HashMap<String, String>,
            ) -> Vec<&'a str> {
                let mut out: Vec<&str> = names
                    .iter()
                    .filter(|(id, _)| !matched.contains_key(*id))
                    .map(|(_, name)| name.as_str())
                    .collect();
                out.sort_unstable();
                out
            }
            let summary = json!({
                "game_id": mapping.game_id,
                "runs": runs.len(),
                "categories": {
                    "matched": mapping.category_mapping.len(),
                    "unmatched": unmatched(&mapping.src_category_id_to_name, &mapping.category_mapping),
                },
                "platforms": {
                    "matched": mapping.platform_mapping.len(),
                    "unmatched": unmatched(&mapping.src_platform_id_to_name, &mapping.platform_mapping),
                    "unresolved_ids": mapping.unresolved_platforms.len(),
                },
                "levels": {
                    "matched": mapping.level_mapping.len(),
                    "unmatched": unmatched(&mapping.src_level_id_to_name, &mapping.level_mapping),
                },
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Score {
            rank,
            run_type,
            leaderboard_type,
            obsolete,
        } => {
            let run_type =
                RunType::parse(&run_type).ok_or_else(|| anyhow!("unknown run type '{run_type}'"))?;
            let leaderboard_type = LeaderboardType::parse(&leaderboard_type)
                .ok_or_else(|| anyhow!("unknown leaderboard type '{leaderboard_type}'"))?;
            println!("{}", score(rank, run_type, leaderboard_type, obsolete));
        }
    }
    Ok(())
}
