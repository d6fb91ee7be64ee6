pub mod bot;
pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod scan;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use grammers_client::client::UpdatesConfiguration;
use grammers_client::types::update::Update;
use grammers_mtsender::SenderPool;

use crate::bot::conversation::SearchServices;
use crate::bot::{Dispatcher, GrammersMessenger};
use crate::collector::directory::GrammersDirectory;
use crate::collector::history::GrammersHistory;
use crate::config::Settings;
use crate::error::AppError;

/// Start both Telegram identities and serve bot updates until Ctrl-C or
/// the update stream ends.
pub async fn run() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();
    let settings = Settings::new()?;
    let data_dir = settings.data_dir();

    let log_file = logging::init(&data_dir.join("logs"))?;
    log::info!("Starting with data dir {}", data_dir.display());

    // Search account: contacts.search and history are unavailable to bots.
    let (user_client, user_pool) = collector::connect(
        &collector::session_path(&data_dir, "user"),
        settings.api_id,
    )?;
    let SenderPool { runner, .. } = user_pool;
    let user_runner = tokio::spawn(async move {
        runner.run().await;
    });
    collector::auth::ensure_user_login(&user_client, settings.phone.as_deref(), &settings.api_hash)
        .await?;

    let (bot_client, bot_pool) = collector::connect(
        &collector::session_path(&data_dir, "bot"),
        settings.api_id,
    )?;
    let SenderPool {
        runner, updates, ..
    } = bot_pool;
    let bot_runner = tokio::spawn(async move {
        runner.run().await;
    });
    collector::auth::ensure_bot_login(&bot_client, &settings.bot_token, &settings.api_hash)
        .await?;

    let services = Arc::new(SearchServices {
        directory: Arc::new(GrammersDirectory::new(user_client.clone())),
        history: Arc::new(GrammersHistory::new(user_client.clone())),
        scan: settings.scan_limits(),
        limits: settings.conversation_limits(),
    });
    let messenger = Arc::new(GrammersMessenger::new(bot_client.clone()));
    let mut dispatcher = Dispatcher::new(services, messenger, Arc::new(log_file));

    let mut updates = bot_client.stream_updates(
        updates,
        UpdatesConfiguration {
            catch_up: false,
            ..Default::default()
        },
    );
    log::info!("Bot is running");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
            update = updates.next() => match update {
                Ok(Update::NewMessage(message)) if !message.outgoing() => {
                    if let Some(inbound) = bot::inbound_from(&message) {
                        dispatcher.dispatch(inbound).await;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("Error getting bot update: {}", e);
                    break;
                }
            },
        }
    }

    bot_runner.abort();
    user_runner.abort();
    Ok(())
}
