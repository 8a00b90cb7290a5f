//! # Entity Extraction
//!
//! Turns a [`TextUnit`] into candidate ticker spans. The tagging capability
//! behind [`EntityTagger`] only accepts a bounded input, so longer text is
//! split into overlapping chunks at whitespace, each chunk is tagged, and the
//! spans are mapped back to unit-relative offsets and deduplicated.

mod pattern;
mod remote;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{CandidateSpan, ConfigError, ExtractionError, TextUnit};

pub use pattern::PatternTagger;
pub use remote::RemoteTagger;

/// Span reported by a tagger, with its byte offset relative to the chunk it was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedSpan {
    pub text: String,
    pub start: usize,
}

impl TaggedSpan {
    pub fn new(text: impl Into<String>, start: usize) -> Self {
        Self {
            text: text.into(),
            start,
        }
    }
}

/// External tagging capability: text in, candidate spans out.
pub trait EntityTagger: Send + Sync {
    /// Largest input, in bytes, the tagger accepts in one call.
    fn max_input_len(&self) -> usize;

    fn tag<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TaggedSpan>, ExtractionError>> + Send + 'a>>;
}

/// Chunking and merge tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Upper bound on chunk size in bytes. The tagger's own bound wins if smaller.
    pub chunk_size: usize,
    /// Bytes shared by consecutive chunks. Must cover the longest ticker token.
    pub overlap: usize,
    /// Spans with equal text whose offsets differ by at most this many bytes are merged.
    pub dedup_tolerance: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 8,
            dedup_tolerance: 2,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Zero {
                field: "chunk_size",
            });
        }
        if self.overlap == 0 {
            return Err(ConfigError::Zero { field: "overlap" });
        }
        if self.chunk_size < self.overlap * 2 {
            return Err(ConfigError::ChunkOverlap {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

/// A slice of the original text and its byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunk<'a> {
    pub offset: usize,
    pub text: &'a str,
}

impl TextChunk<'_> {
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

/// Splits `text` into chunks of at most `max_len` bytes.
///
/// Text within the bound comes back as a single chunk. Otherwise each chunk
/// ends at the last whitespace inside the bound, and the next one starts at
/// the beginning of the token that contains `end - overlap`, so every token
/// no longer than `overlap` appears whole in at least one chunk. A token with
/// no whitespace inside the bound is cut hard.
pub fn chunk_text(text: &str, max_len: usize, overlap: usize) -> Vec<TextChunk<'_>> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_len || max_len == 0 {
        return vec![TextChunk { offset: 0, text }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let hard_end =
            floor_char_boundary(text, start + max_len).max(next_char_boundary(text, start));
        if hard_end >= text.len() {
            chunks.push(TextChunk {
                offset: start,
                text: &text[start..],
            });
            break;
        }

        let (end, clean_break) = match text[start..hard_end].rfind(char::is_whitespace) {
            Some(index) if index > 0 => (start + index, true),
            _ => (hard_end, false),
        };
        chunks.push(TextChunk {
            offset: start,
            text: &text[start..end],
        });

        let back = floor_char_boundary(text, end.saturating_sub(overlap).max(start));
        let token_start = match text[start..back].rfind(char::is_whitespace) {
            Some(index) => {
                let ws = start + index;
                ws + text[ws..].chars().next().map_or(1, char::len_utf8)
            }
            None if clean_break => end,
            None => back,
        };
        start = if token_start > start { token_start } else { end };
    }
    chunks
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut index = index;
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn next_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index + 1;
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index.min(text.len())
}

/// Spans found in one text unit, plus how many chunks the tagger failed on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub spans: Vec<CandidateSpan>,
    pub failed_chunks: usize,
}

/// Chunks, tags and merges.
#[derive(Clone)]
pub struct ExtractionAdapter {
    tagger: Arc<dyn EntityTagger>,
    config: ExtractionConfig,
}

impl ExtractionAdapter {
    pub fn new(
        tagger: Arc<dyn EntityTagger>,
        config: ExtractionConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { tagger, config })
    }

    /// Effective chunk bound: the smaller of the configured size and the tagger's.
    pub fn chunk_limit(&self) -> usize {
        self.config.chunk_size.min(self.tagger.max_input_len()).max(1)
    }

    pub async fn extract(&self, unit: &TextUnit) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();
        let mut spans = Vec::new();

        for chunk in chunk_text(&unit.text, self.chunk_limit(), self.config.overlap) {
            match self.tag_chunk(chunk, unit.id()).await {
                Ok(found) => spans.extend(found),
                Err(error) => {
                    warn!(
                        submission_id = unit.id(),
                        offset = chunk.offset,
                        error = %error,
                        "tagger failed on chunk"
                    );
                    outcome.failed_chunks += 1;
                }
            }
        }

        outcome.spans = merge_spans(spans, self.config.dedup_tolerance);
        outcome
    }

    async fn tag_chunk(
        &self,
        chunk: TextChunk<'_>,
        source_id: &str,
    ) -> Result<Vec<CandidateSpan>, ExtractionError> {
        let tagged = self.tagger.tag(chunk.text).await?;
        tagged
            .into_iter()
            .map(|span| {
                if span.start > chunk.text.len() {
                    return Err(ExtractionError::SpanOutOfBounds {
                        start: span.start,
                        len: chunk.text.len(),
                    });
                }
                Ok(CandidateSpan::new(span.text, chunk.offset + span.start, source_id))
            })
            .collect()
    }
}

/// Orders spans by offset and drops repeats of the same text within `tolerance` bytes.
pub fn merge_spans(mut spans: Vec<CandidateSpan>, tolerance: usize) -> Vec<CandidateSpan> {
    spans.sort_by(|a, b| (a.start, &a.text).cmp(&(b.start, &b.text)));
    let mut merged: Vec<CandidateSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        let duplicate = merged
            .iter()
            .rev()
            .take_while(|kept| span.start - kept.start <= tolerance)
            .any(|kept| kept.text == span.text);
        if !duplicate {
            merged.push(span);
        }
    }
    merged
}
