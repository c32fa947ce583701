//! Answered-question counter and the status line that shows it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::chatbot::telegram::{ChatGateway, PresenceKind};

/// Process-wide count of answered messages.
#[derive(Debug, Default)]
pub struct QuestionCounter(AtomicU64);

impl QuestionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more answer and return the new total.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn status_text(count: u64) -> String {
    match count {
        1 => "1 question".to_string(),
        n => format!("{n} questions"),
    }
}

/// Best-effort status updates. Never fails the caller.
pub struct PresenceReporter {
    gateway: Arc<dyn ChatGateway>,
    kind: PresenceKind,
    /// Highest count already shown. Held across the request so a late
    /// update can never land after a newer one.
    shown: Arc<Mutex<Option<u64>>>,
}

impl PresenceReporter {
    pub fn new(gateway: Arc<dyn ChatGateway>, kind: PresenceKind) -> Self {
        Self {
            gateway,
            kind,
            shown: Arc::new(Mutex::new(None)),
        }
    }

    /// Fire-and-forget update. Requires a tokio runtime.
    pub fn report(&self, count: u64) {
        let gateway = self.gateway.clone();
        let kind = self.kind;
        let shown = self.shown.clone();

        tokio::spawn(async move {
            let mut shown = shown.lock().await;
            if shown.is_some_and(|latest| latest >= count) {
                debug!("Skipping stale presence update ({count})");
                return;
            }
            match gateway.set_presence(&status_text(count), kind).await {
                Ok(()) => *shown = Some(count),
                Err(e) => warn!("Failed to update presence: {e}"),
            }
        });
    }
}
