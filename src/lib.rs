pub mod chatbot;
pub mod classifier;
pub mod config;
pub mod health;
pub mod moderation;
pub mod telegram_log;
