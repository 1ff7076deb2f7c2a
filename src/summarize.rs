//! Thread summarization strategies.

use async_trait::async_trait;

use crate::error::{Error, ErrorContext, Result};
use crate::memory::MemoryEntry;

/// Produces summary text for a set of entries.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `entries`, given in creation order.
    async fn summarize(&self, entries: &[MemoryEntry]) -> Result<String>;
}

/// Picks the leading sentence of the most important entries.
///
/// Selected sentences are emitted in creation order so the summary reads
/// like the conversation did.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_sentences: usize,
    max_chars: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self {
            max_sentences: 5,
            max_chars: 1_000,
        }
    }
}

impl ExtractiveSummarizer {
    pub fn new(max_sentences: usize, max_chars: usize) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
            max_chars: max_chars.max(1),
        }
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, entries: &[MemoryEntry]) -> Result<String> {
        let mut candidates: Vec<(usize, f64, &str)> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| lead_sentence(&e.content).map(|s| (i, e.importance(), s)))
            .collect();
        if candidates.is_empty() {
            return Err(Error::summarization("no content to summarize")
                .with_context(ErrorContext::operation("summarize").with_batch_size(entries.len())));
        }

        // Most important first; earlier entries win ties
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(self.max_sentences);
        candidates.sort_by_key(|c| c.0);

        let text = candidates
            .iter()
            .map(|c| c.2)
            .collect::<Vec<_>>()
            .join(" ");
        Ok(truncate_chars(&text, self.max_chars))
    }
}

/// First sentence of `content`, trimmed; `None` when blank.
fn lead_sentence(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?' | '\n'))
        .map(|(i, c)| if c == '\n' { i } else { i + c.len_utf8() })
        .unwrap_or(trimmed.len());
    let sentence = trimmed[..end].trim();
    (!sentence.is_empty()).then_some(sentence)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryMetadata, MemoryType};

    fn entry(content: &str, importance: f64) -> MemoryEntry {
        MemoryEntry::new(
            "t1",
            content,
            MemoryMetadata::new(MemoryType::Conversation).with_importance(importance),
        )
    }

    #[tokio::test]
    async fn test_picks_important_sentences_in_order() {
        let entries = vec![
            entry("We chose Postgres. It was a long debate.", 0.9),
            entry("Lunch was fine.", 0.1),
            entry("Deploys happen on Fridays! Not ideal.", 0.8),
        ];
        let summary = ExtractiveSummarizer::new(2, 500)
            .summarize(&entries)
            .await
            .unwrap();
        assert_eq!(summary, "We chose Postgres. Deploys happen on Fridays!");
    }

    #[tokio::test]
    async fn test_empty_input_is_an_error() {
        let err = ExtractiveSummarizer::default()
            .summarize(&[entry("   ", 0.5)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Summarization);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo world", 5), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_lead_sentence() {
        assert_eq!(lead_sentence("line one\nline two"), Some("line one"));
        assert_eq!(lead_sentence("no terminator"), Some("no terminator"));
        assert_eq!(lead_sentence(""), None);
    }
}
