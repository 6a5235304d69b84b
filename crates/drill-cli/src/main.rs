mod run;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use drill_cron::CronSchedule;
use drill_storage::DrillStorage;
use drill_types::UserId;

#[derive(Parser)]
#[command(name = "drill", about = "Goal check-in bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot and process Telegram updates until Ctrl-C
    Run,
    /// Validate a cron expression and show when it fires
    Cron {
        /// Five-field expression, e.g. "0 20 * * 0"
        expr: String,

        /// Number of upcoming occurrences to print
        #[arg(short, long, default_value_t = 5)]
        count: usize,
    },
    /// Print a user's scores from the stored state
    Stats {
        user_id: UserId,
    },
    /// Check configuration
    Health,
}

fn main() -> anyhow::Result<()> {
    let config = drill_config::load_config().context("Failed to load configuration")?;

    let default_filter = config.log_filter.clone().unwrap_or_else(|| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::run_bot(config))?;
        }
        Commands::Cron { expr, count } => {
            let schedule = CronSchedule::parse(&expr)?;
            println!("schedule: {schedule}");
            println!("cadence:  every {}", schedule.cadence().unit());
            let mut at = Local::now();
            for _ in 0..count {
                match schedule.next_occurrence(&at) {
                    Some(next) => {
                        println!("  {}", next.format("%a %Y-%m-%d %H:%M"));
                        at = next;
                    }
                    None => {
                        println!("  (no further occurrences)");
                        break;
                    }
                }
            }
        }
        Commands::Stats { user_id } => {
            let rt = tokio::runtime::Runtime::new()?;
            let path = config.storage_path()?;
            let state = rt.block_on(async { DrillStorage::open(&path)?.load_state().await })?;
            let user = state.users.get(user_id)?;
            println!("{}:", user.name());
            println!("{}", drill_engine::stats::user_stats(user));
        }
        Commands::Health => {
            println!("drill is healthy");
            println!(
                "  bot token: {}",
                if config.bot_token().is_ok() { "set" } else { "missing" }
            );
            match config.admin_id {
                Some(id) => println!("  admin id: {id}"),
                None => println!("  admin id: missing"),
            }
            println!("  storage: {}", config.storage_path()?.display());
            println!("  daily check hour: {}", config.checks.daily_hour);
            match config.checks.token_ttl_days {
                Some(days) => println!("  prompts expire after: {days} days"),
                None => println!("  prompts expire after: never"),
            }
        }
    }

    Ok(())
}
