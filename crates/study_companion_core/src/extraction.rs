//! crates/study_companion_core/src/extraction.rs
//!
//! Normalizes pasted text and uploaded documents into one text corpus.

use futures::future::join_all;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::{SourceDocument, StudyInput};
use crate::ports::{bounded, DocumentConversionService, PortError};

/// A document whose text could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub file_name: String,
    pub reason: String,
}

/// The combined corpus plus the documents that were left out of it.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub corpus: String,
    pub failures: Vec<ExtractionFailure>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("No text could be extracted ({} document(s) failed)", failures.len())]
    EmptyCorpus { failures: Vec<ExtractionFailure> },
}

/// Builds the corpus: plain text first, then each document in input order.
///
/// Documents are converted concurrently and joined before concatenation. A
/// failed conversion only drops that document; the call fails only when no
/// text at all remains.
pub async fn extract_corpus(
    converter: &dyn DocumentConversionService,
    input: &StudyInput,
    call_timeout: Duration,
) -> Result<Extraction, ExtractionError> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(text) = input.plain_text.as_deref().map(str::trim) {
        if !text.is_empty() {
            parts.push(text.to_string());
        }
    }

    let conversions = input
        .documents
        .iter()
        .map(|doc| convert_one(converter, doc, call_timeout));
    let results = join_all(conversions).await;

    let mut failures = Vec::new();
    for (doc, result) in input.documents.iter().zip(results) {
        match result {
            Ok(text) if !text.trim().is_empty() => parts.push(text),
            Ok(_) => {
                warn!("Document '{}' converted to empty text.", doc.file_name);
                failures.push(ExtractionFailure {
                    file_name: doc.file_name.clone(),
                    reason: "no text content in document".to_string(),
                });
            }
            Err(e) => {
                warn!("Failed to extract text from '{}': {}", doc.file_name, e);
                failures.push(ExtractionFailure {
                    file_name: doc.file_name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let corpus = parts.join("\n");
    if corpus.trim().is_empty() {
        return Err(ExtractionError::EmptyCorpus { failures });
    }

    info!(
        "Extracted corpus of {} chars from {} source(s), {} failure(s).",
        corpus.len(),
        parts.len(),
        failures.len()
    );
    Ok(Extraction { corpus, failures })
}

async fn convert_one(
    converter: &dyn DocumentConversionService,
    doc: &SourceDocument,
    call_timeout: Duration,
) -> Result<String, PortError> {
    if is_plain_text(&doc.mime_type) {
        return String::from_utf8(doc.data.to_vec())
            .map_err(|e| PortError::Unexpected(format!("not valid UTF-8 text: {}", e)));
    }
    bounded(
        call_timeout,
        "document conversion",
        converter.convert(&doc.data, &doc.file_name, &doc.mime_type),
    )
    .await
}

fn is_plain_text(mime_type: &str) -> bool {
    mime_type
        .split(';')
        .next()
        .map(|m| m.trim().eq_ignore_ascii_case("text/plain"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the document bytes back as text, failing on anything named "bad*".
    struct EchoConverter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentConversionService for EchoConverter {
        async fn convert(&self, data: &[u8], file_name: &str, _mime: &str) -> PortResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if file_name.starts_with("bad") {
                return Err(PortError::Unexpected("conversion rejected".into()));
            }
            Ok(String::from_utf8_lossy(data).into_owned())
        }
    }

    fn pdf(name: &str, body: &str) -> SourceDocument {
        SourceDocument {
            file_name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            data: Bytes::from(body.to_string()),
        }
    }

    fn converter() -> EchoConverter {
        EchoConverter { calls: AtomicUsize::new(0) }
    }

    #[tokio::test]
    async fn plain_text_comes_first_then_documents_in_order() {
        let input = StudyInput {
            plain_text: Some("  notes  ".into()),
            documents: vec![pdf("a.pdf", "alpha"), pdf("b.pdf", "beta")],
        };
        let out = extract_corpus(&converter(), &input, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out.corpus, "notes\nalpha\nbeta");
        assert!(out.failures.is_empty());
    }

    #[tokio::test]
    async fn failed_documents_are_skipped_and_reported() {
        let input = StudyInput {
            plain_text: None,
            documents: vec![pdf("a.pdf", "alpha"), pdf("bad.pdf", "x"), pdf("c.pdf", "gamma")],
        };
        let out = extract_corpus(&converter(), &input, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out.corpus, "alpha\ngamma");
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].file_name, "bad.pdf");
    }

    #[tokio::test]
    async fn all_failures_without_text_is_an_empty_corpus() {
        let input = StudyInput {
            plain_text: Some("   ".into()),
            documents: vec![pdf("bad1.pdf", "x"), pdf("bad2.pdf", "y")],
        };
        let err = extract_corpus(&converter(), &input, Duration::from_secs(1))
            .await
            .unwrap_err();
        let ExtractionError::EmptyCorpus { failures } = err;
        assert_eq!(failures.len(), 2);
    }

    #[tokio::test]
    async fn text_uploads_bypass_the_converter() {
        let c = converter();
        let input = StudyInput {
            plain_text: None,
            documents: vec![SourceDocument {
                file_name: "notes.txt".into(),
                mime_type: "text/plain; charset=utf-8".into(),
                data: Bytes::from_static(b"Stacks are LIFO."),
            }],
        };
        let out = extract_corpus(&c, &input, Duration::from_secs(1)).await.unwrap();
        assert_eq!(out.corpus, "Stacks are LIFO.");
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }
}
