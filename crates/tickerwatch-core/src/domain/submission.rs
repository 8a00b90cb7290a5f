use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Ticker, UtcDateTime, ValidationError};

/// Position of a piece of content in the post -> comment -> reply tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmissionKind {
    Post,
    Comment,
    Reply,
}

impl SubmissionKind {
    pub const ALL: [Self; 3] = [Self::Post, Self::Comment, Self::Reply];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Comment => "COMMENT",
            Self::Reply => "REPLY",
        }
    }
}

impl Display for SubmissionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Post),
            "COMMENT" => Ok(Self::Comment),
            "REPLY" => Ok(Self::Reply),
            other => Err(ValidationError::InvalidSubmissionKind {
                value: other.to_owned(),
            }),
        }
    }
}

/// Where a piece of text came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub submission_id: String,
    /// Enclosing post; equal to `submission_id` for posts.
    pub post_id: String,
    pub author: String,
    pub subreddit: String,
    pub score: i64,
    #[serde(rename = "type")]
    pub kind: SubmissionKind,
    pub created_utc: UtcDateTime,
}

/// One fetched post body, comment, or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub provenance: Provenance,
    pub text: String,
}

impl TextUnit {
    pub fn new(provenance: Provenance, text: impl Into<String>) -> Self {
        Self {
            provenance,
            text: text.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.provenance.submission_id
    }

    pub fn kind(&self) -> SubmissionKind {
        self.provenance.kind
    }
}

/// Substring flagged by a tagger as a possible ticker, with its byte offset
/// relative to the whole [`TextUnit`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidateSpan {
    pub text: String,
    pub start: usize,
    pub source_id: String,
}

impl CandidateSpan {
    pub fn new(text: impl Into<String>, start: usize, source_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start,
            source_id: source_id.into(),
        }
    }

    /// Whether the tagged text carried an explicit cashtag prefix.
    pub fn has_dollar_prefix(&self) -> bool {
        self.text.trim_start().starts_with('$')
    }
}

/// Dedup identity of a mention within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MentionKey {
    pub submission_id: String,
    pub kind: SubmissionKind,
    pub ticker: Ticker,
}

/// A validated ticker occurrence, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub ticker: Ticker,
    pub submission_id: String,
    pub author: String,
    pub subreddit: String,
    pub score: i64,
    #[serde(rename = "type")]
    pub kind: SubmissionKind,
    pub created_utc: UtcDateTime,
}

impl Mention {
    pub fn new(ticker: Ticker, provenance: &Provenance) -> Self {
        Self {
            ticker,
            submission_id: provenance.submission_id.clone(),
            author: provenance.author.clone(),
            subreddit: provenance.subreddit.clone(),
            score: provenance.score,
            kind: provenance.kind,
            created_utc: provenance.created_utc,
        }
    }

    pub fn key(&self) -> MentionKey {
        MentionKey {
            submission_id: self.submission_id.clone(),
            kind: self.kind,
            ticker: self.ticker.clone(),
        }
    }
}
