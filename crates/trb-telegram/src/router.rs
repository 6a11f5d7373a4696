use std::{sync::Arc, time::Duration};

use anyhow::Context;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use trb_core::{
    config::Config,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::FileTransport,
    rename::RenameService,
};

use crate::{handlers, TelegramMessenger, TelegramTransport};

/// Uploads of a few GB take far longer than the client's default timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub fn build_bot(cfg: &Config) -> anyhow::Result<Bot> {
    let token = cfg
        .bot_token
        .clone()
        .context("BOT_TOKEN is required for bot mode")?;
    let client = teloxide::net::default_reqwest_settings()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let mut bot = Bot::with_client(token, client);
    if let Some(url) = cfg.bot_api_url.as_deref() {
        let url = reqwest::Url::parse(url).context("BOT_API_URL is not a valid URL")?;
        bot = bot.set_api_url(url);
    }
    Ok(bot)
}

/// Run the bot-mode dispatcher until `shutdown` fires.
pub async fn run_polling(cfg: Arc<Config>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let bot = build_bot(&cfg)?;

    let me = bot.get_me().await.context("getMe failed; check BOT_TOKEN")?;
    info!(username = %me.username(), "bot started");
    match cfg.bot_api_url.as_deref() {
        Some(url) => info!(%url, "using custom Bot API server"),
        None => info!("using the official Bot API; downloads above 20 MB need BOT_API_URL"),
    }

    // Keep the 429 RetryAfter retry in the adapter, but space edits first.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));
    let transport: Arc<dyn FileTransport> = Arc::new(TelegramTransport::new(bot.clone()));

    let service = Arc::new(
        RenameService::new(cfg.clone(), messenger, transport, shutdown.clone())
            .with_bot_username(Some(me.username().to_string())),
    );

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_edited_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![service])
        .default_handler(|_| async {})
        .build();

    let token = dispatcher.shutdown_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        match token.shutdown() {
            Ok(done) => done.await,
            Err(e) => warn!("dispatcher was not running at shutdown: {e}"),
        }
    });

    dispatcher.dispatch().await;
    info!("dispatcher stopped");
    Ok(())
}
