//! Configuration for a document workspace.
//!
//! Every knob lives in [`WorkspaceConfig`], built via its
//! [`WorkspaceConfigBuilder`]. Setters clamp obviously wrong values and
//! `build()` rejects the rest, so a config that exists is a config that works.

use crate::error::PdfCiteError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Model used when a provider is named but no model is given.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for a [`crate::workspace::Workspace`].
///
/// # Example
/// ```rust
/// use edgequake_pdfcite::WorkspaceConfig;
///
/// let config = WorkspaceConfig::builder()
///     .model("gpt-4.1-mini")
///     .preview_scale(2.0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct WorkspaceConfig {
    /// LLM model identifier, e.g. "gpt-4.1", "claude-sonnet-4-20250514".
    /// If None, uses [`DEFAULT_MODEL`] or the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Contract questions are factual look-ups; a low temperature keeps
    /// percentages, dates and amounts verbatim.
    pub temperature: f32,

    /// Maximum tokens the model may generate per answer. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed LLM call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom analyst instructions. If None, uses the built-in prompt.
    /// The citation grammar and document context are always appended.
    pub system_prompt: Option<String>,

    /// Render scale for inline thumbnails. Default: 1.0.
    pub inline_scale: f32,

    /// Render scale for the large citation preview. Default: 2.0.
    pub preview_scale: f32,

    /// Rough token cost of one page, for context-size warnings. Default: 650.
    pub tokens_per_page: usize,

    /// Estimated context size above which a warning is raised. Default: 2 000 000.
    pub context_token_warning: usize,

    /// Download timeout for URL uploads in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives file and page events during ingestion.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            system_prompt: None,
            inline_scale: 1.0,
            preview_scale: 2.0,
            tokens_per_page: 650,
            context_token_warning: 2_000_000,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for WorkspaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("inline_scale", &self.inline_scale)
            .field("preview_scale", &self.preview_scale)
            .field("tokens_per_page", &self.tokens_per_page)
            .field("context_token_warning", &self.context_token_warning)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl WorkspaceConfig {
    /// Create a new builder for `WorkspaceConfig`.
    pub fn builder() -> WorkspaceConfigBuilder {
        WorkspaceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`WorkspaceConfig`].
#[derive(Debug)]
pub struct WorkspaceConfigBuilder {
    config: WorkspaceConfig,
}

impl WorkspaceConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn inline_scale(mut self, scale: f32) -> Self {
        self.config.inline_scale = scale;
        self
    }

    pub fn preview_scale(mut self, scale: f32) -> Self {
        self.config.preview_scale = scale;
        self
    }

    pub fn tokens_per_page(mut self, n: usize) -> Self {
        self.config.tokens_per_page = n;
        self
    }

    pub fn context_token_warning(mut self, n: usize) -> Self {
        self.config.context_token_warning = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WorkspaceConfig, PdfCiteError> {
        let c = &self.config;
        for (name, scale) in [("inline_scale", c.inline_scale), ("preview_scale", c.preview_scale)] {
            if !scale.is_finite() || scale <= 0.0 || scale > 8.0 {
                return Err(PdfCiteError::InvalidConfig(format!(
                    "{name} must be in (0, 8], got {scale}"
                )));
            }
        }
        if c.max_tokens == 0 {
            return Err(PdfCiteError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_preview_conventions() {
        let c = WorkspaceConfig::default();
        assert_eq!(c.inline_scale, 1.0);
        assert_eq!(c.preview_scale, 2.0);
        assert_eq!(c.temperature, 0.2);
        assert_eq!(c.tokens_per_page, 650);
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = WorkspaceConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_bad_scale() {
        assert!(WorkspaceConfig::builder().preview_scale(0.0).build().is_err());
        assert!(WorkspaceConfig::builder().inline_scale(f32::NAN).build().is_err());
        assert!(WorkspaceConfig::builder().preview_scale(3.0).build().is_ok());
    }

    #[test]
    fn debug_hides_provider() {
        let c = WorkspaceConfig::builder().model("gpt-4.1").build().unwrap();
        let s = format!("{c:?}");
        assert!(s.contains("gpt-4.1"));
    }
}
