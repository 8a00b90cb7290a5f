//! # Domain Models
//!
//! Types that flow through the mention pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ticker`] | Normalized exchange symbol |
//! | [`SubmissionKind`] | POST, COMMENT, or REPLY |
//! | [`Provenance`] | Submission id, author, subreddit, score, kind, timestamp |
//! | [`TextUnit`] | Fetched text with its provenance |
//! | [`CandidateSpan`] | Tagger output prior to validation |
//! | [`Mention`] | Validated ticker occurrence |
//! | [`UtcDateTime`] | UTC timestamp |

mod submission;
mod ticker;
mod timestamp;

pub use submission::{
    CandidateSpan, Mention, MentionKey, Provenance, SubmissionKind, TextUnit,
};
pub use ticker::{normalize, Ticker};
pub use timestamp::UtcDateTime;
