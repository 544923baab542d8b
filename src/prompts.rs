//! System prompt for the contract analyst chat.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth.** The citation token grammar is a contract
//!    between this prompt and [`crate::pipeline::citation`]; both live in one
//!    crate so a change to either is caught by the tests below.
//!
//! 2. **Testability.** Unit tests can inspect the assembled prompt without a
//!    live model.
//!
//! Callers can replace the analyst rules via
//! [`crate::config::WorkspaceConfig::system_prompt`]; the citation grammar and
//! the document context are always appended.

use crate::document::SourceDocument;

/// Default analyst rules, used when `WorkspaceConfig::system_prompt` is `None`.
pub const DEFAULT_ANALYST_PROMPT: &str = r#"You are a high-level Contract Analyst AI.
Your goal is to answer questions strictly based on the provided contract documents.

Rules:
1. Always cite the specific Clause Number (e.g., "Clause 14.2") and the Page Number for every fact you state.
2. Be precise with percentages, dates, and amounts. Quote them exactly as written.
3. If the information is not in the text, state clearly: "I cannot find this information in the provided documents."
4. Do not hallucinate or assume standard contract terms if they are not explicitly written."#;

/// Citation instructions. The token format must match the parser exactly.
pub const CITATION_INSTRUCTIONS: &str = r#"Citation format:
- Each document starts with a line "--- DOCUMENT: {file name} ---" and each page starts with a marker "[Page N]".
- After every cited fact, emit exactly one citation token of this form:
  ⦗Clause: {clause id} | Page: {page number} | File: "{file name}"⦘
- Example: The termination fee is 5%. ⦗Clause: 14.2(a) | Page: 12 | File: "Master_Agreement.pdf"⦘
- Use the page number from the nearest preceding [Page N] marker and the file name exactly as written in the DOCUMENT line.
- If no clause number applies, write Clause: N/A."#;

/// Phrase the model is told to use when the answer is absent.
pub const NOT_FOUND_REPLY: &str = "I cannot find this information in the provided documents.";

/// Frame one document for the context blob.
pub fn format_document(name: &str, extracted_text: &str) -> String {
    format!("--- DOCUMENT: {name} ---\n{extracted_text}\n--- END DOCUMENT ---\n")
}

/// Concatenate every `Ready` document into one context blob.
///
/// Documents still processing or in `Error` contribute nothing.
pub fn format_context(documents: &[SourceDocument]) -> String {
    documents
        .iter()
        .filter(|doc| doc.is_ready())
        .map(|doc| format_document(&doc.name, &doc.extracted_text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the full system instruction around `context`.
pub fn build_system_prompt(custom_rules: Option<&str>, context: &str) -> String {
    let rules = custom_rules.unwrap_or(DEFAULT_ANALYST_PROMPT);
    format!(
        "{rules}\n\n{CITATION_INSTRUCTIONS}\n\n\
         The following is the full content of the uploaded contracts:\n\n\
         === BEGIN CONTRACT CONTENT ===\n{context}\n=== END CONTRACT CONTENT ===\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::GuardedBuffer;
    use crate::pipeline::citation::{scan, Token};

    fn ready(name: &str, text: &str) -> SourceDocument {
        let mut doc = SourceDocument::processing(name, GuardedBuffer::from(b"x".to_vec()));
        doc.mark_ready(text.to_string(), 1).unwrap();
        doc
    }

    #[test]
    fn prompt_example_is_a_parseable_citation() {
        let example = CITATION_INSTRUCTIONS
            .lines()
            .find(|l| l.contains("Example:"))
            .unwrap();
        let tokens = scan(example);
        assert!(
            tokens.iter().any(|t| matches!(t, Token::Citation(c) if c.page_number == 12)),
            "example must match the parser grammar: {tokens:?}"
        );
    }

    #[test]
    fn context_includes_only_ready_documents() {
        let mut failed = SourceDocument::processing("bad.pdf", GuardedBuffer::from(b"x".to_vec()));
        failed.mark_failed("Failed to parse PDF: nope").unwrap();
        let docs = vec![
            ready("a.pdf", "[Page 1]\nAlpha\n\n"),
            failed,
            ready("b.pdf", "[Page 1]\nBeta\n\n"),
        ];

        let context = format_context(&docs);
        assert_eq!(
            context,
            "--- DOCUMENT: a.pdf ---\n[Page 1]\nAlpha\n\n\n--- END DOCUMENT ---\n\n\
             --- DOCUMENT: b.pdf ---\n[Page 1]\nBeta\n\n\n--- END DOCUMENT ---\n"
        );
        assert!(!context.contains("bad.pdf"));
    }

    #[test]
    fn system_prompt_wraps_context() {
        let prompt = build_system_prompt(None, "CTX");
        assert!(prompt.starts_with("You are a high-level Contract Analyst AI."));
        assert!(prompt.contains(NOT_FOUND_REPLY));
        assert!(prompt.contains("=== BEGIN CONTRACT CONTENT ===\nCTX\n=== END CONTRACT CONTENT ==="));

        let custom = build_system_prompt(Some("Answer in French."), "CTX");
        assert!(custom.starts_with("Answer in French."));
        assert!(custom.contains(CITATION_INSTRUCTIONS));
    }
}
