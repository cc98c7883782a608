//! remna-shop-bot — Telegram-бот продажи VPN-подписок через панель Remnawave.

mod bot;
mod config;
mod db;
mod export;
mod panel;
mod payments;
mod scheduler;
mod stats;
mod tariff;

use std::path::PathBuf;
use std::sync::Arc;
use teloxide::dispatching::Dispatcher;
use teloxide::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/remna-shop-bot.toml"));
    tracing::info!(
        "Starting remna-shop-bot with config {}",
        config_path.display()
    );

    let config = Arc::new(config::Config::load(&config_path)?);
    tracing::info!(
        admin_count = config.admin_ids.len(),
        db_path = %config.db_path.display(),
        panel_url = %config.panel.base_url,
        trial_days = config.trial_days,
        "Configuration loaded"
    );

    let db = Arc::new(db::Db::open(&config.db_path).await?);
    let panel = Arc::new(panel::PanelClient::new(&config.panel)?);
    let platega = Arc::new(payments::platega::PlategaClient::new(&config.platega)?);
    let cryptobot = Arc::new(payments::cryptobot::CryptoBotClient::new(
        &config.cryptobot,
        &config.bot_url,
    )?);

    let bot = Bot::new(config.bot_token.clone());
    let bot_username = match bot.get_me().await {
        Ok(me) => me.user.username.clone(),
        Err(error) => {
            tracing::warn!(
                error = %error,
                "Не удалось получить username бота через getMe"
            );
            None
        }
    };

    let state = bot::handlers::BotState {
        config,
        db,
        panel,
        platega,
        cryptobot,
        bot_username,
    };
    scheduler::spawn_jobs(bot.clone(), state.clone());
    tracing::info!("Dispatcher initialized, bot is ready");

    Dispatcher::builder(bot, bot::handlers::schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
