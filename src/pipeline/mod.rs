//! Pipeline stages for document ingestion and citation preview.
//!
//! Each submodule implements one step and is testable on its own against the
//! scripted decoder in [`mock`].
//!
//! ## Data Flow
//!
//! ```text
//!  input ──▶ extract ──────────────▶ (context / chat)
//! (path/URL)  (text + [Page n])              │
//!                                            ▼
//!  render ◀──────────────────────────── citation
//! (re-decode raw bytes → PNG)          (scan + resolve)
//! ```
//!
//! 1. [`input`]   : read a local path or download a URL into named bytes
//! 2. [`backend`] : the injected decoder; pdfium in production
//! 3. [`extract`] : per-page text with `[Page n]` markers and progress ticks;
//!    on the blocking pool
//! 4. [`citation`]: recover `⦗Clause | Page | File⦘` tokens from model output
//!    and bind them to loaded documents by name
//! 5. [`render`]  : rasterise one cited page from a fresh copy of the bytes
//! 6. [`encode`]  : PNG-encode the surface and wrap it as a data URI

pub mod backend;
pub mod citation;
pub mod encode;
pub mod extract;
pub mod input;
pub mod mock;
pub mod render;
