//! The document workspace: ingestion, context loading, Q&A and page preview.
//!
//! ## Lifecycle
//!
//! ```text
//! ingest ──▶ store ──▶ load_context ──▶ ask ──▶ segments ──▶ preview
//!   │                      ▲                                   │
//!   └── remove / clear ────┘ (session invalidated)             └─ render
//! ```
//!
//! Uploads are extracted strictly one at a time so at most one decoded
//! document is alive during ingestion. Every upload settles exactly once as
//! `Ready` or `Error` and is persisted either way; one bad file never stops the
//! batch. Any change to the document set drops the chat session, so the next
//! question requires a fresh [`Workspace::load_context`].

use crate::chat::{collect_reply, ChatSession, ChatTransport, ProviderTransport};
use crate::config::WorkspaceConfig;
use crate::document::{GuardedBuffer, SourceDocument};
use crate::error::{ExtractError, PdfCiteError, RenderError};
use crate::pipeline::backend::PdfBackend;
use crate::pipeline::citation::{render_with_citations, ResolvedCitation, Segment};
use crate::pipeline::encode::RenderedPage;
use crate::pipeline::extract::{extract_text, Extraction};
use crate::pipeline::input::Upload;
use crate::pipeline::render::Rasterizer;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::format_context;
use crate::store::DocumentStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one [`Workspace::ingest`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Ids of documents that settled `Ready`, in upload order.
    pub ready: Vec<String>,
    /// `(name, message)` for uploads that settled `Error`.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.ready.len() + self.failed.len()
    }
}

/// What was handed to the model by [`Workspace::load_context`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    pub document_count: usize,
    pub total_pages: usize,
    pub estimated_tokens: usize,
    /// The estimate exceeds `context_token_warning`; answers may be slow or
    /// truncated by the provider.
    pub over_limit: bool,
    /// Opening message shown to the user.
    pub greeting: String,
}

/// A model reply to one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub question: String,
    pub reply: String,
}

impl Answer {
    /// Split the reply into text and citations bound to `known`.
    pub fn segments<'d>(&self, known: &'d [SourceDocument]) -> Vec<Segment<'d>> {
        render_with_citations(&self.reply, known)
    }
}

/// A single-user document workspace.
pub struct Workspace {
    config: WorkspaceConfig,
    store: Box<dyn DocumentStore>,
    backend: Arc<dyn PdfBackend>,
    rasterizer: Rasterizer,
    transport: Option<Arc<dyn ChatTransport>>,
    session: Option<ChatSession>,
}

impl Workspace {
    /// Create a workspace over `store`, decoding PDFs with `backend`.
    ///
    /// The chat transport is resolved from `config` on the first
    /// [`load_context`](Self::load_context) unless one is supplied with
    /// [`with_transport`](Self::with_transport).
    pub fn new(
        config: WorkspaceConfig,
        store: Box<dyn DocumentStore>,
        backend: Arc<dyn PdfBackend>,
    ) -> Self {
        Self {
            config,
            store,
            rasterizer: Rasterizer::new(Arc::clone(&backend)),
            backend,
            transport: None,
            session: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    // ── Documents ────────────────────────────────────────────────────────

    /// Extract and store each upload, one after another.
    ///
    /// Returns `Err` only when the store fails; extraction failures are
    /// recorded on the document and in the report.
    pub async fn ingest(&mut self, uploads: Vec<Upload>) -> Result<BatchReport, PdfCiteError> {
        self.invalidate_session();

        let callback: ProgressCallback = self
            .config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let total_files = uploads.len();
        callback.on_batch_start(total_files);

        let mut report = BatchReport::default();
        for (file_index, upload) in uploads.into_iter().enumerate() {
            callback.on_file_start(file_index + 1, total_files, &upload.name);

            let mut doc = SourceDocument::processing(upload.name, GuardedBuffer::from(upload.bytes));
            let outcome = self.extract(&doc, &callback).await;

            match outcome {
                Ok(extraction) => {
                    doc.mark_ready(extraction.text, extraction.page_count)?;
                    info!(file = %doc.name, pages = doc.page_count, "Document ready");
                    callback.on_file_ready(&doc.name, doc.page_count);
                    report.ready.push(doc.id.clone());
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(file = %doc.name, "Extraction failed: {}", message);
                    doc.mark_failed(message.clone())?;
                    callback.on_file_error(&doc.name, &message);
                    report.failed.push((doc.name.clone(), message));
                }
            }

            self.store.put(&doc)?;
        }

        callback.on_batch_complete(total_files, report.ready.len());
        Ok(report)
    }

    async fn extract(
        &self,
        doc: &SourceDocument,
        callback: &ProgressCallback,
    ) -> Result<Extraction, ExtractError> {
        let Some(bytes) = doc.raw_bytes.clone() else {
            return Err(ExtractError::Parse {
                detail: "upload has no data".into(),
            });
        };
        let name = doc.name.clone();
        let callback = Arc::clone(callback);
        extract_text(Arc::clone(&self.backend), bytes, move |state| {
            callback.on_page_extracted(&name, state)
        })
        .await
    }

    /// Every stored document, in upload order.
    pub fn documents(&self) -> Result<Vec<SourceDocument>, PdfCiteError> {
        Ok(self.store.get_all()?)
    }

    pub fn document(&self, id: &str) -> Result<SourceDocument, PdfCiteError> {
        self.store
            .get(id)?
            .ok_or_else(|| PdfCiteError::UnknownDocument { id: id.to_string() })
    }

    /// Look a document up by id, falling back to an exact name match.
    pub fn find(&self, id_or_name: &str) -> Result<SourceDocument, PdfCiteError> {
        if let Some(doc) = self.store.get(id_or_name)? {
            return Ok(doc);
        }
        self.store
            .get_all()?
            .into_iter()
            .find(|d| d.name == id_or_name)
            .ok_or_else(|| PdfCiteError::UnknownDocument {
                id: id_or_name.to_string(),
            })
    }

    /// Delete one document. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> Result<bool, PdfCiteError> {
        self.invalidate_session();
        let existed = self.store.get(id)?.is_some();
        self.store.delete(id)?;
        Ok(existed)
    }

    /// Delete every document.
    pub fn clear(&mut self) -> Result<(), PdfCiteError> {
        self.invalidate_session();
        self.store.clear()?;
        Ok(())
    }

    // ── Chat ─────────────────────────────────────────────────────────────

    /// Hand all `Ready` documents to the model and open a chat session.
    pub fn load_context(&mut self) -> Result<ContextSummary, PdfCiteError> {
        let documents = self.store.get_all()?;
        let context = format_context(&documents);
        if context.trim().is_empty() {
            return Err(PdfCiteError::NoReadableContent);
        }

        let total_pages: usize = documents.iter().map(|d| d.page_count).sum();
        let estimated_tokens = total_pages.saturating_mul(self.config.tokens_per_page);
        let over_limit = estimated_tokens > self.config.context_token_warning;
        if over_limit {
            warn!(
                estimated_tokens,
                limit = self.config.context_token_warning,
                "Total content is very large; responses may be slower or hit limits"
            );
        }

        let transport = self.transport()?;
        self.session = Some(transport.initialize(&context)?);

        info!(documents = documents.len(), pages = total_pages, "Context loaded");
        Ok(ContextSummary {
            document_count: documents.len(),
            total_pages,
            estimated_tokens,
            over_limit,
            greeting: format!(
                "I have analyzed {} document(s) totaling approx. {} pages. I am ready to answer \
                 questions regarding the contract terms, clauses, and specifications.",
                documents.len(),
                total_pages
            ),
        })
    }

    /// Whether [`ask`](Self::ask) can be called.
    pub fn is_chat_ready(&self) -> bool {
        self.session.is_some()
    }

    /// Ask one question about the loaded documents.
    ///
    /// The exchange is added to the session history only when the full reply
    /// arrives.
    pub async fn ask(&mut self, question: &str) -> Result<Answer, PdfCiteError> {
        if self.session.is_none() {
            return Err(PdfCiteError::ChatNotInitialized);
        }
        let transport = self.transport()?;
        let chunks = match self.session.as_ref() {
            Some(session) => transport.send(session, question),
            None => return Err(PdfCiteError::ChatNotInitialized),
        };

        let reply = collect_reply(chunks).await?;

        if let Some(session) = self.session.as_mut() {
            session.record_exchange(question, reply.as_str());
        }
        Ok(Answer {
            question: question.to_string(),
            reply,
        })
    }

    fn transport(&mut self) -> Result<Arc<dyn ChatTransport>, PdfCiteError> {
        if let Some(t) = &self.transport {
            return Ok(Arc::clone(t));
        }
        let transport: Arc<dyn ChatTransport> = Arc::new(ProviderTransport::from_config(&self.config)?);
        self.transport = Some(Arc::clone(&transport));
        Ok(transport)
    }

    fn invalidate_session(&mut self) {
        if self.session.take().is_some() {
            info!("Document set changed; chat context must be reloaded");
        }
    }

    // ── Preview ──────────────────────────────────────────────────────────

    /// Render the page a resolved citation points at, at `preview_scale`.
    ///
    /// An unresolved citation has no bytes to render and reports
    /// `DataUnavailable`.
    pub async fn preview(&self, citation: &ResolvedCitation<'_>) -> Result<RenderedPage, RenderError> {
        let buffer = citation.document.and_then(|d| d.raw_bytes.as_ref());
        self.rasterizer
            .render_page(
                buffer,
                i64::from(citation.citation.page_number),
                self.config.preview_scale,
            )
            .await
    }

    /// Render any page of `document` at `scale`.
    pub async fn render(
        &self,
        document: &SourceDocument,
        page_number: i64,
        scale: f32,
    ) -> Result<RenderedPage, RenderError> {
        self.rasterizer
            .render_page(document.raw_bytes.as_ref(), page_number, scale)
            .await
    }

    /// Render a small inline thumbnail at `inline_scale`.
    pub async fn thumbnail(
        &self,
        document: &SourceDocument,
        page_number: i64,
    ) -> Result<RenderedPage, RenderError> {
        self.render(document, page_number, self.config.inline_scale).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ScriptedTransport;
    use crate::document::DocumentStatus;
    use crate::pipeline::mock::MockPdfBackend;
    use crate::store::MemoryStore;

    fn workspace() -> (Workspace, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let ws = Workspace::new(
            WorkspaceConfig::default(),
            Box::new(MemoryStore::new()),
            Arc::new(MockPdfBackend::new()),
        )
        .with_transport(transport.clone());
        (ws, transport)
    }

    #[tokio::test]
    async fn failed_upload_does_not_stop_the_batch() {
        let (mut ws, _) = workspace();
        let report = ws
            .ingest(vec![
                Upload::new("a.pdf", MockPdfBackend::document(&[&["alpha"]])),
                Upload::new("bad.pdf", b"garbage".to_vec()),
                Upload::new("c.pdf", MockPdfBackend::document(&[&["gamma"], &["delta"]])),
            ])
            .await
            .unwrap();

        assert_eq!(report.ready.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad.pdf");
        assert!(report.failed[0].1.starts_with("Failed to parse PDF"));

        let docs = ws.documents().unwrap();
        let statuses: Vec<DocumentStatus> = docs.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![DocumentStatus::Ready, DocumentStatus::Error, DocumentStatus::Ready]
        );
        assert_eq!(docs[1].page_count, 0);
        assert!(docs[1].extracted_text.is_empty());
    }

    #[tokio::test]
    async fn ask_requires_loaded_context() {
        let (mut ws, _) = workspace();
        let err = ws.ask("anything?").await.unwrap_err();
        assert!(matches!(err, PdfCiteError::ChatNotInitialized));
    }

    #[tokio::test]
    async fn no_ready_documents_is_no_readable_content() {
        let (mut ws, _) = workspace();
        assert!(matches!(ws.load_context(), Err(PdfCiteError::NoReadableContent)));

        ws.ingest(vec![Upload::new("bad.pdf", b"junk".to_vec())]).await.unwrap();
        assert!(matches!(ws.load_context(), Err(PdfCiteError::NoReadableContent)));
    }

    #[tokio::test]
    async fn document_changes_invalidate_the_session() {
        let (mut ws, _) = workspace();
        ws.ingest(vec![Upload::new("a.pdf", MockPdfBackend::document(&[&["x"]]))])
            .await
            .unwrap();
        ws.load_context().unwrap();
        assert!(ws.is_chat_ready());

        let id = ws.documents().unwrap()[0].id.clone();
        assert!(ws.remove(&id).unwrap());
        assert!(!ws.is_chat_ready());
        assert!(!ws.remove(&id).unwrap());
    }

    #[tokio::test]
    async fn over_limit_is_flagged() {
        let transport = Arc::new(ScriptedTransport::new());
        let config = WorkspaceConfig::builder()
            .tokens_per_page(1000)
            .context_token_warning(1500)
            .build()
            .unwrap();
        let mut ws = Workspace::new(config, Box::new(MemoryStore::new()), Arc::new(MockPdfBackend::new()))
            .with_transport(transport);
        ws.ingest(vec![Upload::new("a.pdf", MockPdfBackend::document(&[&["p1"], &["p2"]]))])
            .await
            .unwrap();

        let summary = ws.load_context().unwrap();
        assert_eq!(summary.estimated_tokens, 2000);
        assert!(summary.over_limit);
    }
}
