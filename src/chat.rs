//! The LLM chat transport.
//!
//! The workspace treats the model as an opaque service behind
//! [`ChatTransport`]: `initialize` turns the document context into a
//! [`ChatSession`], and `send` yields the reply as a lazy stream of text
//! chunks. Replies are always collected in full before citation parsing;
//! partial citations are never rendered.
//!
//! [`ProviderTransport`] adapts any `edgequake_llm` provider. Providers that
//! stream are read chunk by chunk; the rest answer with one chunk.
//! [`ScriptedTransport`] replays canned replies for tests.
//!
//! ## Retry Strategy
//!
//! Rate-limit and overload errors from LLM APIs are transient. A request that
//! cannot open a stream falls back to a plain chat call, retried with
//! exponential backoff (`retry_backoff_ms * 2^(attempt-1)`): with a 500 ms
//! base and 2 retries the waits are 500 ms then 1 s.

use crate::config::{WorkspaceConfig, DEFAULT_MODEL};
use crate::error::{ChatError, PdfCiteError};
use crate::prompts::build_system_prompt;
use edgequake_llm::traits::StreamChunk;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Reply chunks in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

/// One message of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// A conversation bound to one document context.
#[derive(Debug, Clone)]
pub struct ChatSession {
    system_prompt: String,
    history: Vec<Turn>,
}

impl ChatSession {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: Vec::new(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Append a completed question/answer pair.
    pub fn record_exchange(&mut self, question: impl Into<String>, reply: impl Into<String>) {
        self.history.push(Turn {
            role: Role::User,
            content: question.into(),
        });
        self.history.push(Turn {
            role: Role::Model,
            content: reply.into(),
        });
    }
}

/// The chat service the workspace talks to.
pub trait ChatTransport: Send + Sync {
    /// Open a session whose system instruction embeds `context`.
    fn initialize(&self, context: &str) -> Result<ChatSession, ChatError>;

    /// Send `message` within `session`.
    fn send(&self, session: &ChatSession, message: &str) -> ChunkStream;
}

/// Concatenate a reply stream, failing on the first broken chunk.
pub async fn collect_reply(mut chunks: ChunkStream) -> Result<String, ChatError> {
    let mut reply = String::new();
    while let Some(chunk) = chunks.next().await {
        reply.push_str(&chunk?);
    }
    Ok(reply)
}

// ── edgequake-llm provider ───────────────────────────────────────────────

/// [`ChatTransport`] over an `edgequake_llm` provider.
#[derive(Clone)]
pub struct ProviderTransport {
    provider: Arc<dyn LLMProvider>,
    custom_rules: Option<String>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl ProviderTransport {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &WorkspaceConfig) -> Self {
        Self {
            provider,
            custom_rules: config.system_prompt.clone(),
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Resolve a provider from `config` and wrap it.
    pub fn from_config(config: &WorkspaceConfig) -> Result<Self, PdfCiteError> {
        let provider = resolve_provider(config)?;
        info!("Using LLM provider {} / model {}", provider.name(), provider.model());
        Ok(Self::new(provider, config))
    }
}

impl ChatTransport for ProviderTransport {
    fn initialize(&self, context: &str) -> Result<ChatSession, ChatError> {
        Ok(ChatSession::new(build_system_prompt(
            self.custom_rules.as_deref(),
            context,
        )))
    }

    fn send(&self, session: &ChatSession, message: &str) -> ChunkStream {
        let messages = build_messages(session, message);
        let transport = self.clone();
        stream::once(async move { transport.open_stream(messages).await })
            .flatten()
            .boxed()
    }
}

impl ProviderTransport {
    /// Stream the reply when the provider can; otherwise one retried request.
    async fn open_stream(&self, messages: Vec<ChatMessage>) -> ChunkStream {
        if self.provider.supports_tool_streaming() {
            match self
                .provider
                .chat_with_tools_stream(&messages, &[], None, Some(&self.options))
                .await
            {
                Ok(chunks) => {
                    debug!("Chat: streaming reply from {}", self.provider.name());
                    return chunks
                        .filter_map(|chunk| async move {
                            match chunk {
                                Ok(StreamChunk::Content(text)) => Some(Ok(text)),
                                Ok(_) => None,
                                Err(e) => Some(Err(ChatError::Stream(e.to_string()))),
                            }
                        })
                        .boxed();
                }
                Err(e) => warn!("Chat: stream could not be opened ({}); sending one request", e),
            }
        }

        let reply = self.chat_with_retry(&messages).await;
        stream::once(async move { reply }).boxed()
    }

    async fn chat_with_retry(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let start = Instant::now();
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!("Chat: retry {}/{} after {}ms", attempt, self.max_retries, backoff);
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "Chat: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Chat: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(ChatError::Provider {
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// System instruction, prior turns, then the new question.
fn build_messages(session: &ChatSession, message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(session.history.len() + 2);
    messages.push(ChatMessage::system(session.system_prompt.as_str()));
    for turn in &session.history {
        messages.push(match turn.role {
            Role::User => ChatMessage::user(turn.content.as_str()),
            Role::Model => ChatMessage::assistant(turn.content.as_str()),
        });
    }
    messages.push(ChatMessage::user(message));
    messages
}

fn build_options(config: &WorkspaceConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PdfCiteError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PdfCiteError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    checked before auto-detection so the model choice is honoured even when
///    several API keys are present.
/// 4. **OpenAI key** (`OPENAI_API_KEY`), preferred when present.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &WorkspaceConfig) -> Result<Arc<dyn LLMProvider>, PdfCiteError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PdfCiteError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

// ── Scripted ─────────────────────────────────────────────────────────────

/// A [`ChatTransport`] that replays queued replies.
///
/// Each `send` pops the next reply; an exhausted queue yields a
/// [`ChatError::Stream`]. Every initialised context and sent message is
/// recorded for assertions.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<Vec<String>, ChatError>>>,
    contexts: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply delivered as the given chunks.
    pub fn push_reply<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks = chunks.into_iter().map(Into::into).collect();
        lock(&self.replies).push_back(Ok(chunks));
    }

    /// Queue a failing reply.
    pub fn push_error(&self, error: ChatError) {
        lock(&self.replies).push_back(Err(error));
    }

    /// Contexts passed to `initialize`, oldest first.
    pub fn contexts(&self) -> Vec<String> {
        lock(&self.contexts).clone()
    }

    /// Messages passed to `send`, oldest first.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChatTransport for ScriptedTransport {
    fn initialize(&self, context: &str) -> Result<ChatSession, ChatError> {
        lock(&self.contexts).push(context.to_string());
        Ok(ChatSession::new(build_system_prompt(None, context)))
    }

    fn send(&self, _session: &ChatSession, message: &str) -> ChunkStream {
        lock(&self.sent).push(message.to_string());
        match lock(&self.replies).pop_front() {
            Some(Ok(chunks)) => stream::iter(chunks.into_iter().map(Ok)).boxed(),
            Some(Err(e)) => stream::iter([Err(e)]).boxed(),
            None => stream::iter([Err(ChatError::Stream("no scripted reply left".into()))]).boxed(),
        }
    }
}
