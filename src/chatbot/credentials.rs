//! Multi-credential failover for the generation backend.
//!
//! Each request walks the slots in a freshly shuffled order. Rate-limited
//! slots are skipped in favour of the next one; a not-found error or any
//! other failure ends the request immediately. No cooldown is carried
//! between requests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Failure reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// HTTP-style status, when the backend reported one.
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.status == Some(429) || self.message.contains("429")
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
            || self.message.contains("404")
            || self.message.to_lowercase().contains("not found")
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{status}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BackendError {}

/// A text generation backend bound to one credential.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendError>;
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API keys configured")]
    NoCredentials,
    #[error("model \"{model}\" not found, check the model name ({source})")]
    ModelNotFound { model: String, source: BackendError },
    #[error("all {attempts} API key(s) are rate limited")]
    Exhausted { attempts: usize },
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl GenerationError {
    /// Whether the failure means "provider is throttling us". Used to decide
    /// whether to stay silent instead of apologising.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Exhausted { .. } => true,
            Self::Backend(e) => {
                let lowered = e.message.to_lowercase();
                e.is_rate_limit()
                    || lowered.contains("quota")
                    || lowered.contains("rate limit")
                    || e.message.contains("RESOURCE_EXHAUSTED")
            }
            Self::NoCredentials | Self::ModelNotFound { .. } => false,
        }
    }
}

/// One credential and the client bound to it.
pub struct CredentialSlot {
    /// Masked credential, safe for logs.
    pub label: String,
    backend: Arc<dyn GenerationBackend>,
}

impl CredentialSlot {
    pub fn new(label: impl Into<String>, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            label: label.into(),
            backend,
        }
    }
}

/// Mask a secret for logging: keep the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{tail}")
}

pub struct CredentialPool {
    slots: Vec<CredentialSlot>,
}

impl CredentialPool {
    pub fn new(slots: Vec<CredentialSlot>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot indices in the order this request will try them.
    fn attempt_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        if order.len() > 1 {
            order.shuffle(&mut rand::thread_rng());
        }
        order
    }

    /// Generate text, failing over across credentials on rate limits.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        if self.slots.is_empty() {
            return Err(GenerationError::NoCredentials);
        }

        let order = self.attempt_order();
        for (attempt, &index) in order.iter().enumerate() {
            let slot = &self.slots[index];
            debug!(slot = %slot.label, attempt = attempt + 1, "calling generation backend");

            match slot.backend.generate(model, prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_rate_limit() => {
                    warn!("Key {} (slot {index}) rate limited, trying next key", slot.label);
                }
                Err(e) if e.is_not_found() => {
                    error!("Model not found: {e}");
                    return Err(GenerationError::ModelNotFound {
                        model: model.to_string(),
                        source: e,
                    });
                }
                Err(e) => return Err(GenerationError::Backend(e)),
            }
        }

        Err(GenerationError::Exhausted {
            attempts: order.len(),
        })
    }
}
