use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;

use eventbot::chatbot::credentials::mask_secret;
use eventbot::chatbot::knowledge::{self, KnowledgeWatcher};
use eventbot::chatbot::{
    ChatMessage, CredentialPool, CredentialSlot, GeminiClient, MessagePipeline, PipelineConfig, TelegramClient,
};
use eventbot::config::Config;
use eventbot::health::{self, HealthState};
use eventbot::telegram_log;

fn build_credentials(config: &Config) -> CredentialPool {
    let slots = config
        .gemini_api_keys
        .iter()
        .filter_map(|key| match GeminiClient::new(key.clone()) {
            Ok(client) => Some(CredentialSlot::new(mask_secret(key), Arc::new(client))),
            Err(e) => {
                error!("Failed to build Gemini client for key {}: {e}", mask_secret(key));
                None
            }
        })
        .collect();
    CredentialPool::new(slots)
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "eventbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("eventbot.log"))
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let tg_layer = telegram_log::TelegramLogLayer::new(bot.clone(), ChatId(log_chat_id));
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting eventbot...");
    info!("Loaded config from {config_path}");
    if config.dry_run {
        info!("DRY RUN mode enabled");
    }
    for warning in config.warnings() {
        warn!("{warning}");
    }

    let bot_user_id = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            me.id.0 as i64
        }
        Err(e) => {
            warn!("Failed to get bot info: {e}");
            0
        }
    };

    let credentials = build_credentials(&config);
    info!("🔑 {} Gemini credential(s), model {}", credentials.len(), config.model);

    let initial = knowledge::load(&config.knowledge_path);
    info!(
        "📚 Event knowledge: {} day(s), {} rule(s)",
        initial.days.len(),
        initial.rules.len()
    );

    let gateway = Arc::new(TelegramClient::new(bot.clone()));
    let pipeline = Arc::new(MessagePipeline::new(
        PipelineConfig::from_config(&config, bot_user_id),
        initial,
        credentials,
        gateway,
    ));
    pipeline.announce_ready();

    let _watcher: Option<KnowledgeWatcher> = {
        let pipeline = pipeline.clone();
        match knowledge::watch(config.knowledge_path.clone(), move |k| pipeline.on_knowledge_reload(k)) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("Knowledge hot-reload disabled: {e}");
                None
            }
        }
    };

    if let Some(port) = config.health_port {
        let state = HealthState::new(pipeline.clone());
        tokio::spawn(async move {
            if let Err(e) = health::serve(port, state).await {
                error!("Health endpoint stopped: {e}");
            }
        });
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_new_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![pipeline])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_new_message(msg: Message, pipeline: Arc<MessagePipeline>) -> ResponseResult<()> {
    let Some(chat_msg) = telegram_to_chat_message(&msg) else {
        return Ok(());
    };

    let outcome = pipeline.handle_message(&chat_msg).await;
    debug!(
        "Message {} from {} ({}) → {:?}",
        chat_msg.message_id, chat_msg.username, chat_msg.user_id, outcome
    );
    Ok(())
}

/// Text messages with a known sender only.
fn telegram_to_chat_message(msg: &Message) -> Option<ChatMessage> {
    let user = msg.from.as_ref()?;
    let text = msg.text()?;

    let username = user
        .username
        .clone()
        .unwrap_or_else(|| user.first_name.clone());

    Some(ChatMessage {
        message_id: msg.id.0 as i64,
        chat_id: msg.chat.id.0,
        user_id: user.id.0 as i64,
        username,
        timestamp: msg.date.format("%Y-%m-%d %H:%M").to_string(),
        text: text.to_string(),
        from_bot: user.is_bot,
    })
}
