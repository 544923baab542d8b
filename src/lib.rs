//! # edgequake-pdfcite
//!
//! Ask questions about PDF contracts and get answers whose citations open the
//! exact page they cite.
//!
//! ## Why this crate?
//!
//! A model answering from a long contract is only useful if every claim can be
//! checked. This crate extracts per-page text tagged with `[Page n]` markers,
//! hands it to an LLM with a strict citation grammar, parses the reply back
//! into text and structured citations, and renders the cited page from the
//! original PDF bytes on demand.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Intake   local file or URL download
//!  ├─ 2. Extract  per-page text + [Page n] markers (pdfium, spawn_blocking)
//!  ├─ 3. Store    metadata, text and raw bytes per document
//!  ├─ 4. Context  all Ready documents → one system prompt
//!  ├─ 5. Ask      gpt-4.1-nano / claude / gemini / … via edgequake-llm
//!  ├─ 6. Cite     ⦗Clause: … | Page: N | File: "…"⦘ → resolved citations
//!  └─ 7. Preview  re-decode raw bytes → PNG of the cited page
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfcite::{FsStore, PdfiumBackend, Upload, Workspace, WorkspaceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let mut ws = Workspace::new(
//!         WorkspaceConfig::default(),
//!         Box::new(FsStore::open(".pdfcite")?),
//!         Arc::new(PdfiumBackend::bind()?),
//!     );
//!     let bytes = std::fs::read("Master_Agreement.pdf")?;
//!     ws.ingest(vec![Upload::new("Master_Agreement.pdf", bytes)]).await?;
//!
//!     println!("{}", ws.load_context()?.greeting);
//!     let answer = ws.ask("What is the termination fee?").await?;
//!
//!     let docs = ws.documents()?;
//!     for segment in answer.segments(&docs) {
//!         if let edgequake_pdfcite::Segment::Citation(c) = segment {
//!             if c.is_interactive() {
//!                 let page = ws.preview(&c).await?;
//!                 eprintln!("{} → {}x{} px", c.citation.display_label(), page.width, page.height);
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfcite` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdfcite = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chat;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chat::{ChatSession, ChatTransport, ChunkStream, ProviderTransport, ScriptedTransport};
pub use config::{WorkspaceConfig, WorkspaceConfigBuilder};
pub use document::{DocumentStatus, GuardedBuffer, SourceDocument};
pub use error::{ChatError, ExtractError, PdfCiteError, RenderError, StoreError};
pub use pipeline::backend::{PdfBackend, PdfiumBackend};
pub use pipeline::citation::{render_with_citations, Citation, ResolvedCitation, Segment};
pub use pipeline::encode::RenderedPage;
pub use pipeline::input::{resolve_upload, Upload};
pub use pipeline::mock::MockPdfBackend;
pub use pipeline::render::parse_page_number;
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback, ProgressState};
pub use store::{DocumentStore, FsStore, MemoryStore};
pub use workspace::{Answer, BatchReport, ContextSummary, Workspace};
