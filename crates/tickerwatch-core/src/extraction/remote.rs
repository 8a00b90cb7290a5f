use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{EntityTagger, TaggedSpan};
use crate::http_client::{HttpClient, HttpRequest};
use crate::ExtractionError;

#[derive(Debug, Serialize)]
struct TagRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TagResponse {
    #[serde(default)]
    entities: Vec<TaggedSpan>,
}

/// Tagger backed by an HTTP NER service.
///
/// Posts `{"text": "..."}` and expects `{"entities": [{"text": "...", "start": 0}]}`
/// with byte offsets into the posted text.
#[derive(Clone)]
pub struct RemoteTagger {
    http: Arc<dyn HttpClient>,
    url: String,
    max_input_len: usize,
    timeout_ms: u64,
}

impl RemoteTagger {
    pub fn new(http: Arc<dyn HttpClient>, url: impl Into<String>, max_input_len: usize) -> Self {
        Self {
            http,
            url: url.into(),
            max_input_len: max_input_len.max(1),
            timeout_ms: 10_000,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl EntityTagger for RemoteTagger {
    fn max_input_len(&self) -> usize {
        self.max_input_len
    }

    fn tag<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TaggedSpan>, ExtractionError>> + Send + 'a>> {
        Box::pin(async move {
            let body = serde_json::to_string(&TagRequest { text })
                .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
            let request = HttpRequest::post_json(&self.url, body).with_timeout_ms(self.timeout_ms);

            let response = self
                .http
                .execute(request)
                .await
                .map_err(|e| ExtractionError::Unavailable(e.to_string()))?;
            if !response.is_success() {
                return Err(ExtractionError::Unavailable(format!(
                    "tagger at '{}' returned {}",
                    self.url, response.status
                )));
            }

            let parsed: TagResponse = serde_json::from_str(&response.body)
                .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
            Ok(parsed.entities)
        })
    }
}
