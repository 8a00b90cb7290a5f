use std::future::Future;
use std::pin::Pin;

use regex::Regex;

use super::{EntityTagger, TaggedSpan};
use crate::ExtractionError;

/// Cashtags (`$tsla`) and all-caps words up to ten letters.
const TICKER_PATTERN: &str = r"\$[A-Za-z]{1,10}\b|\b[A-Z]{1,10}\b";

/// Deterministic regex tagger. The default tagger and the test double.
#[derive(Debug, Clone)]
pub struct PatternTagger {
    pattern: Regex,
    max_input_len: usize,
}

impl PatternTagger {
    pub const DEFAULT_MAX_INPUT_LEN: usize = 512;

    pub fn new() -> Self {
        Self::with_max_input_len(Self::DEFAULT_MAX_INPUT_LEN)
    }

    pub fn with_max_input_len(max_input_len: usize) -> Self {
        Self {
            pattern: Regex::new(TICKER_PATTERN).expect("ticker pattern must compile"),
            max_input_len: max_input_len.max(1),
        }
    }

    pub fn find(&self, text: &str) -> Vec<TaggedSpan> {
        self.pattern
            .find_iter(text)
            .map(|found| TaggedSpan::new(found.as_str(), found.start()))
            .collect()
    }
}

impl Default for PatternTagger {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTagger for PatternTagger {
    fn max_input_len(&self) -> usize {
        self.max_input_len
    }

    fn tag<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TaggedSpan>, ExtractionError>> + Send + 'a>> {
        if text.len() > self.max_input_len {
            let len = text.len();
            return Box::pin(async move {
                Err(ExtractionError::Unavailable(format!(
                    "input of {len} bytes exceeds the {}-byte bound",
                    self.max_input_len
                )))
            });
        }
        let spans = self.find(text);
        Box::pin(async move { Ok(spans) })
    }
}
