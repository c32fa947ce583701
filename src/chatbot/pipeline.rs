//! Message pipeline: moderation, cache, FAQ, topic filter and generation.
//!
//! Each inbound message gets one `handle_message` run. Runs may overlap;
//! shared state (cache, counter, credentials, knowledge) is only touched
//! through their own narrow, internally synchronised interfaces.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{error, info, warn};

use crate::chatbot::cache::{normalize_key, ResponseCache, CACHE_LIMIT};
use crate::chatbot::credentials::{CredentialPool, GenerationError};
use crate::chatbot::faq::FaqMatcher;
use crate::chatbot::knowledge::{EventKnowledge, KnowledgeStore};
use crate::chatbot::message::ChatMessage;
use crate::chatbot::presence::{PresenceReporter, QuestionCounter};
use crate::chatbot::telegram::{ChatGateway, GatewayError, PresenceKind};
use crate::classifier::{is_math_or_code, TOPIC_DECLINE};
use crate::config::{Config, DEFAULT_MODEL};
use crate::moderation::{DenyList, CONDUCT_NOTICE};

/// Upper bound on the user text embedded in a prompt.
const MAX_PROMPT_USER_BYTES: usize = 1500;

/// Used when the model answers with nothing.
pub const EMPTY_ANSWER_FALLBACK: &str = "I can only answer about the Minecraft event/program.";

/// Posted while waiting for the model when placeholders are enabled.
pub const TYPING_PLACEHOLDER: &str = "✍️ Maya is typing…";

/// Shown in place of the placeholder when generation fails.
pub const APOLOGY: &str = "Sorry, I couldn't come up with an answer right now. Please try again in a bit. 🙏";

const DEFAULT_PERSONA: &str = "You are Maya, a friendly, chill Nepali assistant for a Minecraft event. You are female, born in Nepal on 12/11/2025.
Tone: polite, warm, GenZ-friendly, no rude slang. Keep it concise.
Language mix: aim ~80% English, ~20% Nepali words/phrases (no Hindi), natural blend.
You know a lot about cooking. Your favorite food is MOMO. ONLY provide recipes or processes if the user EXPLICITLY asks for them. Do not volunteer recipes just because food is mentioned. If asked, give concise bullets for ingredients and short steps.";

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub bot_user_id: i64,
    /// `None` means every chat is in scope.
    pub event_chat_id: Option<i64>,
    pub model: String,
    pub persona: Option<String>,
    pub channels: Vec<(String, String)>,
    pub schedule_link: Option<String>,
    pub extra_banned_words: Vec<String>,
    pub cache_limit: usize,
    pub hint_probability: f64,
    pub clear_cache_on_reload: bool,
    pub typing_placeholder: bool,
    pub presence_kind: PresenceKind,
    /// Log moderation actions instead of performing them.
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bot_user_id: 0,
            event_chat_id: None,
            model: DEFAULT_MODEL.to_string(),
            persona: None,
            channels: Vec::new(),
            schedule_link: None,
            extra_banned_words: Vec::new(),
            cache_limit: CACHE_LIMIT,
            hint_probability: 0.2,
            clear_cache_on_reload: true,
            typing_placeholder: false,
            presence_kind: PresenceKind::Listening,
            dry_run: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config, bot_user_id: i64) -> Self {
        Self {
            bot_user_id,
            event_chat_id: config.event_chat_id,
            model: config.model.clone(),
            persona: config.persona.clone(),
            channels: config.channels.clone(),
            schedule_link: config.schedule_link.clone(),
            extra_banned_words: config.extra_banned_words.clone(),
            cache_limit: config.cache_limit,
            hint_probability: config.hint_probability,
            clear_cache_on_reload: config.clear_cache_on_reload,
            typing_placeholder: config.typing_placeholder,
            presence_kind: config.presence_kind,
            dry_run: config.dry_run,
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Sent by this bot or another bot.
    IgnoredBot,
    /// Nothing but whitespace.
    IgnoredEmpty,
    /// Deny-listed content: deleted and the author warned.
    Moderated,
    CacheHit,
    /// Not in the event chat.
    OutOfScope,
    Faq,
    /// Math or programming request, declined.
    Declined,
    Generated,
    /// Generation failed; nothing useful was sent.
    Abandoned { rate_limited: bool },
}

/// The message pipeline and the state it shares across runs.
pub struct MessagePipeline {
    config: PipelineConfig,
    knowledge: KnowledgeStore,
    faq: RwLock<Arc<FaqMatcher>>,
    /// Serialises reloads so the store and the FAQ table move together.
    reload_lock: Mutex<()>,
    cache: ResponseCache,
    deny_list: DenyList,
    credentials: CredentialPool,
    gateway: Arc<dyn ChatGateway>,
    counter: QuestionCounter,
    presence: PresenceReporter,
}

impl MessagePipeline {
    pub fn new(
        config: PipelineConfig,
        knowledge: EventKnowledge,
        credentials: CredentialPool,
        gateway: Arc<dyn ChatGateway>,
    ) -> Self {
        let knowledge = KnowledgeStore::new(knowledge);
        let faq = FaqMatcher::new(knowledge.snapshot(), config.hint_probability);

        Self {
            cache: ResponseCache::new(config.cache_limit),
            deny_list: DenyList::new(&config.extra_banned_words),
            presence: PresenceReporter::new(gateway.clone(), config.presence_kind),
            faq: RwLock::new(Arc::new(faq)),
            reload_lock: Mutex::new(()),
            knowledge,
            credentials,
            gateway,
            counter: QuestionCounter::new(),
            config,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn questions_answered(&self) -> u64 {
        self.counter.get()
    }

    /// Show the current count once the gateway is connected.
    pub fn announce_ready(&self) {
        self.presence.report(self.counter.get());
    }

    /// Install a freshly loaded snapshot. Safe to call repeatedly with the
    /// same content. Runs already in flight keep the snapshot they captured.
    pub fn on_knowledge_reload(&self, knowledge: EventKnowledge) {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let snapshot = self.knowledge.publish(knowledge);
        let faq = FaqMatcher::new(snapshot.clone(), self.config.hint_probability);
        *self.faq.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(faq);

        if self.config.clear_cache_on_reload {
            self.cache.clear();
        }
        info!(
            "🔄 Event knowledge updated: {} day(s), {} rule(s){}",
            snapshot.days.len(),
            snapshot.rules.len(),
            if self.config.clear_cache_on_reload { ", cache cleared" } else { "" }
        );
    }

    fn faq_snapshot(&self) -> Arc<FaqMatcher> {
        self.faq.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Run one message through the pipeline.
    pub async fn handle_message(&self, msg: &ChatMessage) -> PipelineOutcome {
        if msg.from_bot || msg.user_id == self.config.bot_user_id {
            return PipelineOutcome::IgnoredBot;
        }

        if let Some(word) = self.deny_list.find(&msg.text) {
            info!("🚫 Deny-listed word {:?} from {} ({})", word, msg.username, msg.user_id);
            self.moderate(msg).await;
            return PipelineOutcome::Moderated;
        }

        let key = normalize_key(&msg.text);
        if key.is_empty() {
            return PipelineOutcome::IgnoredEmpty;
        }

        if let Some(cached) = self.cache.get(&key) {
            info!("💾 Cache hit for \"{}\"", msg.preview(50));
            self.record_answer();
            self.send_reply(msg, &cached).await;
            return PipelineOutcome::CacheHit;
        }

        if let Some(event_chat_id) = self.config.event_chat_id
            && msg.chat_id != event_chat_id
        {
            return PipelineOutcome::OutOfScope;
        }

        // One snapshot for the whole run, even if a reload lands mid-flight
        let faq = self.faq_snapshot();

        if let Some(answer) = faq.find(&msg.text) {
            info!("📋 FAQ answer for \"{}\"", msg.preview(50));
            self.answer(msg, key, answer).await;
            return PipelineOutcome::Faq;
        }

        if is_math_or_code(&msg.text) {
            info!("🙅 Declining math/code ask from {}", msg.username);
            self.answer(msg, key, TOPIC_DECLINE.to_string()).await;
            return PipelineOutcome::Declined;
        }

        self.generate(msg, key, &faq).await
    }

    async fn moderate(&self, msg: &ChatMessage) {
        if self.config.dry_run {
            info!("[DRY RUN] Would delete message {} and warn {}", msg.message_id, msg.username);
            return;
        }

        match self.gateway.delete_message(msg.chat_id, msg.message_id).await {
            Ok(()) => {}
            Err(GatewayError::NotPermitted(e)) => {
                warn!("Could not delete message from {}: {e}", msg.username);
            }
            Err(e) => error!("Failed to delete deny-listed message: {e}"),
        }

        match self.gateway.send_direct(msg.user_id, CONDUCT_NOTICE).await {
            Ok(()) => {}
            Err(GatewayError::Unreachable(e)) => {
                warn!("Could not DM {} (DMs closed): {e}", msg.username);
            }
            Err(e) => error!("Failed to send conduct notice: {e}"),
        }
    }

    fn record_answer(&self) {
        let count = self.counter.increment();
        self.presence.report(count);
    }

    /// Cache, count, then reply.
    async fn answer(&self, msg: &ChatMessage, key: String, answer: String) {
        self.cache.put(key, answer.clone());
        self.record_answer();
        self.send_reply(msg, &answer).await;
    }

    async fn send_reply(&self, msg: &ChatMessage, text: &str) -> Option<i64> {
        match self.gateway.reply(msg, text).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to send reply: {e}");
                None
            }
        }
    }

    async fn generate(&self, msg: &ChatMessage, key: String, faq: &FaqMatcher) -> PipelineOutcome {
        let placeholder = if self.config.typing_placeholder {
            self.send_reply(msg, TYPING_PLACEHOLDER).await
        } else {
            None
        };

        let prompt = build_prompt(&self.config, faq.knowledge(), msg);
        info!("🤖 Asking {} ({} chars)", self.config.model, prompt.len());

        match self.credentials.generate(&self.config.model, &prompt).await {
            Ok(text) => {
                let reply = if text.trim().is_empty() {
                    EMPTY_ANSWER_FALLBACK.to_string()
                } else {
                    text
                };
                self.cache.put(key, reply.clone());
                self.record_answer();
                self.deliver(msg, placeholder, &reply).await;
                PipelineOutcome::Generated
            }
            Err(e) if e.is_rate_limited() => {
                warn!("Gemini rate limit reached, ignoring message: {e}");
                if let Some(id) = placeholder
                    && let Err(e) = self.gateway.delete_message(msg.chat_id, id).await
                {
                    warn!("Failed to remove placeholder: {e}");
                }
                PipelineOutcome::Abandoned { rate_limited: true }
            }
            Err(e) => {
                match &e {
                    GenerationError::ModelNotFound { .. } => error!("Model unavailable, check config: {e}"),
                    GenerationError::NoCredentials => error!("Cannot generate: {e}"),
                    _ => error!("Error handling message: {e}"),
                }
                if let Some(id) = placeholder
                    && let Err(e) = self.gateway.edit_message(msg.chat_id, id, APOLOGY).await
                {
                    warn!("Failed to edit placeholder: {e}");
                }
                PipelineOutcome::Abandoned { rate_limited: false }
            }
        }
    }

    /// Replace the placeholder if there is one, otherwise reply normally.
    async fn deliver(&self, msg: &ChatMessage, placeholder: Option<i64>, text: &str) {
        if let Some(id) = placeholder {
            match self.gateway.edit_message(msg.chat_id, id, text).await {
                Ok(()) => return,
                Err(e) => warn!("Failed to edit placeholder, replying instead: {e}"),
            }
        }
        self.send_reply(msg, text).await;
    }
}

/// Build the generation prompt from the persona, event knowledge, channel
/// references and the (bounded) user message.
pub fn build_prompt(config: &PipelineConfig, knowledge: &EventKnowledge, msg: &ChatMessage) -> String {
    let persona = config.persona.as_deref().unwrap_or(DEFAULT_PERSONA);

    let days = if knowledge.days.is_empty() {
        "- Not announced yet".to_string()
    } else {
        knowledge
            .days
            .iter()
            .map(|(day, desc)| format!("- <b>Day {day}:</b> {desc}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let rules = if knowledge.rules.is_empty() {
        "- Not announced yet".to_string()
    } else {
        knowledge
            .rules
            .iter()
            .map(|r| format!("- {r}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut references = String::new();
    if !config.channels.is_empty() {
        references.push_str("\nEvent Channels:\n");
        for (label, reference) in &config.channels {
            references.push_str(&format!("- {label}: {reference}\n"));
        }
    }
    if let Some(link) = &config.schedule_link {
        references.push_str(&format!("\nSchedule Message:\n- {link}\n"));
    }

    format!(
        r#"{persona}
Formatting: Telegram HTML only (<b>bold</b> labels, '-' bullets, <i>italics</i> for side-notes), no code blocks, no Markdown.
Only use the event data below; if unknown, say you don't know yet but will update. Keep replies short, like DM with a friend.
Do NOT answer math or coding questions, politely decline if asked.

Event Days:
{days}

Event Rules:
{rules}
{references}
User message: {user}
Answer concisely, polite, Telegram-styled, and ONLY based on the event/program data."#,
        user = msg.bounded_text(MAX_PROMPT_USER_BYTES),
    )
}

#[cfg(test)]
mod prompt_tests {
    use super::*;

    fn msg(text: &str) -> ChatMessage {
        ChatMessage {
            message_id: 1,
            chat_id: -1,
            user_id: 7,
            username: "bob".into(),
            timestamp: "12:00".into(),
            text: text.into(),
            from_bot: false,
        }
    }

    #[test]
    fn test_prompt_embeds_knowledge_and_channels() {
        let mut k = EventKnowledge::default();
        k.days.insert("1".into(), "Build bases".into());
        k.rules.push("No griefing".into());
        let config = PipelineConfig {
            channels: vec![("Rules".into(), "@event_rules".into())],
            schedule_link: Some("https://t.me/event/42".into()),
            ..PipelineConfig::default()
        };

        let prompt = build_prompt(&config, &k, &msg("what should I bring?"));
        assert!(prompt.starts_with("You are Maya"));
        assert!(prompt.contains("- <b>Day 1:</b> Build bases"));
        assert!(prompt.contains("- No griefing"));
        assert!(prompt.contains("- Rules: @event_rules"));
        assert!(prompt.contains("https://t.me/event/42"));
        assert!(prompt.contains("User message: what should I bring?"));
    }

    #[test]
    fn test_prompt_empty_knowledge_and_persona_override() {
        let config = PipelineConfig {
            persona: Some("You are Ravi.".into()),
            ..PipelineConfig::default()
        };
        let prompt = build_prompt(&config, &EventKnowledge::default(), &msg("hi"));
        assert!(prompt.starts_with("You are Ravi."));
        assert!(prompt.contains("Event Days:\n- Not announced yet"));
        assert!(!prompt.contains("Event Channels"));
    }

    #[test]
    fn test_prompt_bounds_user_text() {
        let long = "a".repeat(10_000);
        let prompt = build_prompt(&PipelineConfig::default(), &EventKnowledge::default(), &msg(&long));
        assert!(prompt.len() < 10_000);
        assert!(prompt.contains(&"a".repeat(MAX_PROMPT_USER_BYTES)));
        assert!(!prompt.contains(&"a".repeat(MAX_PROMPT_USER_BYTES + 1)));
    }
}
