//! Chatbot module - answers event questions in a Telegram group.

pub mod cache;
pub mod credentials;
pub mod debounce;
pub mod faq;
pub mod gemini;
pub mod knowledge;
pub mod message;
pub mod pipeline;
pub mod presence;
pub mod telegram;


pub use credentials::{CredentialPool, CredentialSlot};
pub use gemini::GeminiClient;
pub use knowledge::{EventKnowledge, KnowledgeStore};
pub use message::ChatMessage;
pub use pipeline::{MessagePipeline, PipelineConfig, PipelineOutcome};
pub use telegram::{ChatGateway, TelegramClient};
