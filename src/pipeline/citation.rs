//! Citation tokens in model output: scanning, labelling and resolution.
//!
//! The analyst prompt instructs the model to cite every fact as
//!
//! ```text
//! ⦗Clause: 14.2(a) | Page: 12 | File: "Master_Agreement.pdf"⦘
//! ```
//!
//! [`scan`] walks a reply once, left to right, and emits a flat sequence of
//! text and citation tokens. Anything that does not match the grammar exactly
//! stays in the surrounding text. [`render_with_citations`] then binds each
//! citation to a loaded document by exact file name; a miss is not an error,
//! the citation simply renders as inert text.

use crate::document::SourceDocument;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The citation token grammar. Must stay in sync with the prompt in
/// [`crate::prompts`].
static CITATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"⦗\s*Clause:\s*([^|⦗⦘]*?)\s*\|\s*Page:\s*(\d+)\s*\|\s*File:\s*"([^"⦘]*)"\s*⦘"#)
        .expect("citation regex is valid")
});

/// Clause values that carry no clause reference.
const PLACEHOLDER_CLAUSES: [&str; 2] = ["N/A", "General"];

/// One structured citation recovered from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub clause_id: String,
    pub page_number: u32,
    pub file_name: String,
}

impl Citation {
    /// Label shown on the citation control.
    ///
    /// Falls back to `Page {n}` when the model gave no real clause id.
    pub fn display_label(&self) -> String {
        let clause = self.clause_id.trim();
        if clause.is_empty() || PLACEHOLDER_CLAUSES.contains(&clause) {
            format!("Page {}", self.page_number)
        } else {
            clause.to_string()
        }
    }

    /// File name with surrounding quotes and whitespace removed.
    pub fn clean_file_name(&self) -> &str {
        self.file_name
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
    }
}

/// A lexical token of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Citation(Citation),
}

/// A citation bound (or not) to a loaded document.
#[derive(Debug, Clone)]
pub struct ResolvedCitation<'d> {
    pub citation: Citation,
    pub document: Option<&'d SourceDocument>,
}

impl<'d> ResolvedCitation<'d> {
    /// Whether activating this citation can open a page preview.
    pub fn is_interactive(&self) -> bool {
        self.document.is_some()
    }

    /// Fallback rendering for a citation that could not be resolved.
    pub fn inert_text(&self) -> String {
        format!(
            "[{}, p.{}]",
            self.citation.clean_file_name(),
            self.citation.page_number
        )
    }
}

/// A display segment of a model reply.
#[derive(Debug, Clone)]
pub enum Segment<'d> {
    Text(String),
    Citation(ResolvedCitation<'d>),
}

/// Split `text` into text and citation tokens in one pass.
///
/// Text between citations is emitted verbatim; empty gaps (adjacent
/// citations, a citation at either end) produce no text token. A token whose
/// page does not fit in `u32` or is 0 is malformed and stays text.
pub fn scan(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    for caps in CITATION_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let page_number = match caps[2].parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => {
                debug!(token = whole.as_str(), "Citation with unusable page number left as text");
                continue;
            }
        };

        if whole.start() > cursor {
            tokens.push(Token::Text(text[cursor..whole.start()].to_string()));
        }
        tokens.push(Token::Citation(Citation {
            clause_id: caps[1].trim().to_string(),
            page_number,
            file_name: caps[3].to_string(),
        }));
        cursor = whole.end();
    }

    if cursor < text.len() {
        tokens.push(Token::Text(text[cursor..].to_string()));
    }
    tokens
}

/// Scan `text` and resolve each citation against `known` by exact name.
pub fn render_with_citations<'d>(text: &str, known: &'d [SourceDocument]) -> Vec<Segment<'d>> {
    scan(text)
        .into_iter()
        .map(|token| match token {
            Token::Text(t) => Segment::Text(t),
            Token::Citation(citation) => {
                let document = resolve(&citation, known);
                if document.is_none() {
                    debug!(
                        file = citation.clean_file_name(),
                        page = citation.page_number,
                        "Citation does not match a loaded document"
                    );
                }
                Segment::Citation(ResolvedCitation { citation, document })
            }
        })
        .collect()
}

/// Find the loaded document a citation refers to.
pub fn resolve<'d>(citation: &Citation, known: &'d [SourceDocument]) -> Option<&'d SourceDocument> {
    let name = citation.clean_file_name();
    known.iter().find(|doc| doc.name == name)
}

/// Plain-text rendering of a reply: interactive citations become
/// `[label]`, unresolved ones their inert fallback.
pub fn to_plain_text(segments: &[Segment<'_>]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Text(t) => t.clone(),
            Segment::Citation(c) if c.is_interactive() => format!("[{}]", c.citation.display_label()),
            Segment::Citation(c) => c.inert_text(),
        })
        .collect()
}
