//! Virtual text generation.

use std::time::Duration;

use autoflow_app::ports::TextGenerationService;
use autoflow_domain::error::ActionError;

/// Produces a canned draft after a fixed latency.
///
/// Latency above the caller's timeout yields [`ActionError::TimedOut`],
/// which makes slow-model behaviour reproducible in demos.
#[derive(Debug, Clone, Default)]
pub struct VirtualTextGenerator {
    latency: Duration,
}

impl VirtualTextGenerator {
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl TextGenerationService for VirtualTextGenerator {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ActionError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ActionError::permanent("prompt is empty"));
        }
        if self.latency > timeout {
            tokio::time::sleep(timeout).await;
            tracing::warn!(?timeout, latency = ?self.latency, "text generation timed out");
            return Err(ActionError::TimedOut { after: timeout });
        }
        tokio::time::sleep(self.latency).await;
        tracing::debug!(prompt_len = prompt.len(), "text generated");
        Ok(format!("Draft: {prompt}"))
    }
}
