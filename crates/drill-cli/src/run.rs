use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use drill_channel_telegram::TelegramMessenger;
use drill_config::DrillConfig;
use drill_cron::CronScheduler;
use drill_engine::{DrillBot, EngineSettings, Messenger};
use drill_storage::DrillStorage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Load state, start polling and dispatch events until Ctrl-C.
pub async fn run_bot(config: DrillConfig) -> anyhow::Result<()> {
    let bot_token = config.bot_token()?;
    let admin_id = config.admin_id()?;
    let path = config.storage_path()?;

    let storage = Arc::new(DrillStorage::open(&path)?);
    let state = storage.load_state().await?;
    info!(path = %path.display(), users = state.users.len(), "State loaded");

    let messenger = Arc::new(TelegramMessenger::new(bot_token)?);
    let scheduler = Arc::new(CronScheduler::new());
    let settings = EngineSettings {
        admin_id,
        daily_hour: config.checks.daily_hour,
        max_score_range: config.checks.max_score_range,
        token_ttl: config
            .checks
            .token_ttl_days
            .map(|days| chrono::Duration::days(i64::from(days))),
        autosave: Duration::from_secs(config.autosave_secs),
    };

    let bot = DrillBot::new(
        settings,
        drill_engine::shared(state),
        messenger.clone(),
        scheduler.clone(),
        storage,
    );
    bot.startup().await?;

    let (tx, rx) = mpsc::channel(256);
    messenger
        .start(tx)
        .await
        .context("Failed to start Telegram polling")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        ctrl_c.cancel();
    });

    bot.run(rx, cancel).await;

    messenger.stop().await?;
    scheduler.shutdown();
    info!("drill stopped");
    Ok(())
}
