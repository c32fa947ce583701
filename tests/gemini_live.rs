//! Live check against the real Gemini API.
//!
//! Requires GEMINI_API_KEY (and optionally GEMINI_MODEL) in the environment.
//!
//! Run with: cargo test --features integ_test --test gemini_live

#[cfg(feature = "integ_test")]
mod tests {
    use std::sync::Arc;

    use eventbot::chatbot::credentials::{mask_secret, CredentialPool, CredentialSlot};
    use eventbot::chatbot::GeminiClient;
    use eventbot::config::DEFAULT_MODEL;

    fn api_key() -> Option<String> {
        std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty())
    }

    #[tokio::test]
    async fn test_live_generation() {
        let Some(key) = api_key() else {
            eprintln!("Skipping: GEMINI_API_KEY not set");
            return;
        };
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let client = GeminiClient::new(key.clone()).expect("client");
        let pool = CredentialPool::new(vec![CredentialSlot::new(mask_secret(&key), Arc::new(client))]);

        match pool.generate(&model, "Reply with the single word: momo").await {
            Ok(text) => assert!(!text.trim().is_empty(), "empty answer"),
            Err(e) if e.is_rate_limited() => eprintln!("Skipping: rate limited ({e})"),
            Err(e) => panic!("generation failed: {e}"),
        }
    }

    #[tokio::test]
    async fn test_live_unknown_model() {
        let Some(key) = api_key() else {
            eprintln!("Skipping: GEMINI_API_KEY not set");
            return;
        };

        let client = GeminiClient::new(key.clone()).expect("client");
        let pool = CredentialPool::new(vec![CredentialSlot::new(mask_secret(&key), Arc::new(client))]);

        let err = pool
            .generate("no-such-model-eventbot", "hi")
            .await
            .expect_err("unknown model must fail");
        assert!(!err.is_rate_limited() || err.to_string().contains("429"));
    }
}
