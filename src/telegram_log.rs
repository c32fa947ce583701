//! Mirrors log lines into an operator chat.
//!
//! WARN and ERROR go out right away. INFO lines are batched and flushed
//! every few seconds, or early once the batch is large.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BATCH_LINES: usize = 50;
/// Telegram rejects messages above 4096 characters.
const MAX_MESSAGE_CHARS: usize = 4000;

/// Targets never mirrored: sending a log line would log again.
const MUTED_TARGETS: &[&str] = &["teloxide", "reqwest", "hyper", "h2", "rustls", "notify"];

#[derive(Debug, PartialEq, Eq)]
enum LogLine {
    Urgent(String),
    Info(String),
}

impl LogLine {
    fn from_event(level: Level, message: String) -> Option<Self> {
        match level {
            Level::ERROR => Some(Self::Urgent(format!("❌ {message}"))),
            Level::WARN => Some(Self::Urgent(format!("⚠️ {message}"))),
            Level::INFO => Some(Self::Info(message)),
            _ => None,
        }
    }
}

/// Accumulates INFO lines until a flush.
#[derive(Debug, Default)]
struct Batch {
    lines: Vec<String>,
}

impl Batch {
    /// Returns true when the batch should be flushed now.
    fn push(&mut self, line: String) -> bool {
        self.lines.push(line);
        self.lines.len() >= MAX_BATCH_LINES
    }

    fn take(&mut self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let combined = self.lines.join("\n");
        self.lines.clear();
        Some(combined)
    }
}

fn clamp_message(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE_CHARS {
        let truncated: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

fn is_muted(target: &str) -> bool {
    MUTED_TARGETS
        .iter()
        .any(|m| target == *m || target.starts_with(&format!("{m}::")))
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogLine>,
}

impl TelegramLogLayer {
    /// Spawns the sender task. Requires a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogLine>();

        tokio::spawn(async move {
            let mut batch = Batch::default();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    line = rx.recv() => match line {
                        Some(LogLine::Urgent(text)) => send_log(&bot, chat_id, &text).await,
                        Some(LogLine::Info(text)) => {
                            if batch.push(text)
                                && let Some(combined) = batch.take()
                            {
                                send_log(&bot, chat_id, &combined).await;
                            }
                        }
                        None => break,
                    },
                    _ = interval.tick() => {
                        if let Some(combined) = batch.take() {
                            send_log(&bot, chat_id, &combined).await;
                        }
                    }
                }
            }
        });

        Self { tx }
    }
}

async fn send_log(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, clamp_message(text)).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else if self.message.is_empty() {
            self.message = format!("{} = {value:?}", field.name());
        } else {
            self.message.push_str(&format!(", {} = {value:?}", field.name()));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.record_debug(field, &value);
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_muted(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let Some(line) = LogLine::from_event(*metadata.level(), visitor.message) else {
            return;
        };
        if self.tx.send(line).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(
            LogLine::from_event(Level::ERROR, "boom".into()),
            Some(LogLine::Urgent("❌ boom".into()))
        );
        assert_eq!(
            LogLine::from_event(Level::WARN, "careful".into()),
            Some(LogLine::Urgent("⚠️ careful".into()))
        );
        assert_eq!(LogLine::from_event(Level::INFO, "hi".into()), Some(LogLine::Info("hi".into())));
        assert_eq!(LogLine::from_event(Level::DEBUG, "noise".into()), None);
    }

    #[test]
    fn test_batch_flushes_when_full() {
        let mut batch = Batch::default();
        assert_eq!(batch.take(), None);
        for i in 0..MAX_BATCH_LINES - 1 {
            assert!(!batch.push(format!("line {i}")));
        }
        assert!(batch.push("last".into()));
        let combined = batch.take().unwrap();
        assert!(combined.starts_with("line 0\nline 1"));
        assert!(combined.ends_with("\nlast"));
        assert_eq!(batch.take(), None);
    }

    #[test]
    fn test_clamp_message() {
        assert_eq!(clamp_message("short"), "short");
        let long = "é".repeat(MAX_MESSAGE_CHARS + 10);
        let clamped = clamp_message(&long);
        assert!(clamped.ends_with("..."));
        assert_eq!(clamped.chars().count(), MAX_MESSAGE_CHARS + 3);
    }

    #[test]
    fn test_muted_targets() {
        assert!(is_muted("teloxide::dispatching"));
        assert!(is_muted("reqwest"));
        assert!(!is_muted("eventbot::chatbot::pipeline"));
        assert!(!is_muted("hyperion"));
    }
}
