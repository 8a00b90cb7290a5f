//! Reddit JSON listing endpoints and wire types.
//!
//! Three calls cover the whole tree:
//!
//! | Call | Yields |
//! |------|--------|
//! | `/r/{sub}/top.json` | posts |
//! | `/r/{sub}/comments/{post}.json` | top comments of a post |
//! | `/r/{sub}/comments/{post}/comment/{comment}.json` | top replies of a comment |
//!
//! Thread endpoints are asked for `limit + 2` children because `more` stubs
//! and stickied comments are dropped before truncating to the limit.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::fetcher::FetchError;
use crate::http_client::HttpRequest;
use crate::{ConfigError, Provenance, SubmissionKind, TextUnit, UtcDateTime};

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

const LISTING_SLACK: usize = 2;
const MAX_SUBREDDIT_LEN: usize = 21;

/// `t=` window of the top listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TopWindow {
    Hour,
    Day,
    #[default]
    Week,
    Month,
    Year,
    All,
}

impl TopWindow {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }
}

impl Display for TopWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopWindow {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all" => Ok(Self::All),
            _ => Err(ConfigError::InvalidTopWindow {
                value: value.to_owned(),
            }),
        }
    }
}

/// Normalizes a subreddit name (`r/Stocks` -> `Stocks`) and checks its shape.
pub fn normalize_subreddit(input: &str) -> Result<String, ConfigError> {
    let trimmed = input.trim().trim_matches('/');
    let name = trimmed
        .strip_prefix("r/")
        .or_else(|| trimmed.strip_prefix("R/"))
        .unwrap_or(trimmed);

    if name.is_empty() {
        return Err(ConfigError::EmptySubreddit);
    }
    if let Some(ch) = name.chars().find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_')) {
        return Err(ConfigError::InvalidSubreddit { ch });
    }
    if name.len() > MAX_SUBREDDIT_LEN {
        return Err(ConfigError::TooLarge {
            field: "subreddit",
            value: name.len() as u64,
            max: MAX_SUBREDDIT_LEN as u64,
        });
    }
    Ok(name.to_owned())
}

/// Builds requests against a Reddit-compatible host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditApi {
    base_url: String,
    top_window: TopWindow,
}

impl Default for RedditApi {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, TopWindow::default())
    }
}

impl RedditApi {
    pub fn new(base_url: impl Into<String>, top_window: TopWindow) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            top_window,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn listing_request(&self, subreddit: &str, max_posts: usize) -> HttpRequest {
        HttpRequest::get(format!(
            "{}/r/{}/top.json?limit={}&t={}",
            self.base_url,
            urlencoding::encode(subreddit),
            max_posts,
            self.top_window
        ))
    }

    pub fn post_thread_request(
        &self,
        subreddit: &str,
        post_id: &str,
        max_comments: usize,
    ) -> HttpRequest {
        HttpRequest::get(format!(
            "{}/r/{}/comments/{}.json?sort=top&limit={}",
            self.base_url,
            urlencoding::encode(subreddit),
            urlencoding::encode(post_id),
            max_comments + LISTING_SLACK
        ))
    }

    pub fn comment_thread_request(
        &self,
        subreddit: &str,
        post_id: &str,
        comment_id: &str,
        max_replies: usize,
    ) -> HttpRequest {
        HttpRequest::get(format!(
            "{}/r/{}/comments/{}/comment/{}.json?sort=top&limit={}",
            self.base_url,
            urlencoding::encode(subreddit),
            urlencoding::encode(post_id),
            urlencoding::encode(comment_id),
            max_replies + LISTING_SLACK
        ))
    }
}

/// `{"kind": "Listing", "data": {"children": [...]}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub data: ListingData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<Thing>,
}

/// A listing child. `t3` is a post, `t1` a comment, `more` a pagination stub.
#[derive(Debug, Clone, Deserialize)]
pub struct Thing {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default = "deleted_author")]
    author: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    score: i64,
    created_utc: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct CommentData {
    id: String,
    #[serde(default)]
    body: String,
    #[serde(default = "deleted_author")]
    author: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    score: i64,
    created_utc: f64,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    replies: Value,
}

impl CommentData {
    /// Reddit sends `""` when a comment has no replies and a listing otherwise.
    fn reply_listing(&self) -> Option<Listing> {
        if !self.replies.is_object() {
            return None;
        }
        serde_json::from_value(self.replies.clone()).ok()
    }
}

fn deleted_author() -> String {
    String::from("[deleted]")
}

/// A comment discovered under a post, and whether it has replies worth fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredComment {
    pub unit: TextUnit,
    pub has_replies: bool,
}

/// Children parsed from one listing. A child that fails to decode is dropped
/// and counted; its siblings are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    pub malformed: usize,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            malformed: 0,
        }
    }
}

/// Parses the top listing into post text units, at most `limit`.
pub fn posts_from_listing(listing: &Listing, subreddit: &str, limit: usize) -> Parsed<TextUnit> {
    let mut parsed = Parsed::default();
    for thing in listing.data.children.iter().filter(|t| t.kind == "t3") {
        if parsed.items.len() >= limit {
            break;
        }
        match post_unit(thing, subreddit) {
            Ok(unit) => parsed.items.push(unit),
            Err(error) => skip_malformed(&mut parsed, &error),
        }
    }
    parsed
}

fn post_unit(thing: &Thing, subreddit: &str) -> Result<TextUnit, FetchError> {
    let post: PostData = decode(thing)?;
    let text = format!("{} {}", post.title, post.selftext).trim().to_owned();
    let provenance = Provenance {
        submission_id: post.id.clone(),
        created_utc: epoch(post.created_utc)?,
        post_id: post.id,
        author: post.author,
        subreddit: non_empty_or(post.subreddit, subreddit),
        score: post.score,
        kind: SubmissionKind::Post,
    };
    Ok(TextUnit::new(provenance, text))
}

/// Parses a post thread (`[post listing, comment listing]`) into its top comments.
///
/// A thread missing its comment listing is an error; bad children are not.
pub fn comments_from_thread(
    thread: &[Listing],
    subreddit: &str,
    post_id: &str,
    limit: usize,
) -> Result<Parsed<DiscoveredComment>, FetchError> {
    let comments = thread.get(1).ok_or_else(|| {
        FetchError::malformed(format!(
            "post thread for '{post_id}' has {} listings, expected 2",
            thread.len()
        ))
    })?;

    let top = top_comments(comments, limit);
    let mut parsed = Parsed {
        items: Vec::with_capacity(top.items.len()),
        malformed: top.malformed,
    };
    for comment in top.items {
        let has_replies = comment
            .reply_listing()
            .is_some_and(|replies| !replies.data.children.is_empty());
        match comment_unit(comment, subreddit, post_id, SubmissionKind::Comment) {
            Ok(unit) => parsed.items.push(DiscoveredComment { unit, has_replies }),
            Err(error) => skip_malformed(&mut parsed, &error),
        }
    }
    Ok(parsed)
}

/// Parses a comment thread into the top replies of `comment_id`.
pub fn replies_from_thread(
    thread: &[Listing],
    subreddit: &str,
    post_id: &str,
    comment_id: &str,
    limit: usize,
) -> Result<Parsed<TextUnit>, FetchError> {
    let listing = thread.get(1).ok_or_else(|| {
        FetchError::malformed(format!(
            "comment thread for '{comment_id}' has {} listings, expected 2",
            thread.len()
        ))
    })?;

    // Bad siblings of the focused comment belong to another node.
    let parent = top_comments(listing, usize::MAX)
        .items
        .into_iter()
        .find(|comment| comment.id == comment_id);
    let Some(replies) = parent.and_then(|parent| parent.reply_listing()) else {
        return Ok(Parsed::default());
    };

    let top = top_comments(&replies, limit);
    let mut parsed = Parsed {
        items: Vec::with_capacity(top.items.len()),
        malformed: top.malformed,
    };
    for reply in top.items {
        match comment_unit(reply, subreddit, post_id, SubmissionKind::Reply) {
            Ok(unit) => parsed.items.push(unit),
            Err(error) => skip_malformed(&mut parsed, &error),
        }
    }
    Ok(parsed)
}

fn top_comments(listing: &Listing, limit: usize) -> Parsed<CommentData> {
    let mut parsed = Parsed::default();
    for thing in listing.data.children.iter().filter(|t| t.kind == "t1") {
        if parsed.items.len() >= limit {
            break;
        }
        match decode::<CommentData>(thing) {
            Ok(comment) if comment.stickied => {}
            Ok(comment) => parsed.items.push(comment),
            Err(error) => skip_malformed(&mut parsed, &error),
        }
    }
    parsed
}

fn comment_unit(
    comment: CommentData,
    subreddit: &str,
    post_id: &str,
    kind: SubmissionKind,
) -> Result<TextUnit, FetchError> {
    let provenance = Provenance {
        created_utc: epoch(comment.created_utc)?,
        submission_id: comment.id,
        post_id: post_id.to_owned(),
        author: comment.author,
        subreddit: non_empty_or(comment.subreddit, subreddit),
        score: comment.score,
        kind,
    };
    Ok(TextUnit::new(provenance, comment.body))
}

fn skip_malformed<T>(parsed: &mut Parsed<T>, error: &FetchError) {
    warn!(error = %error, "skipping malformed listing child");
    parsed.malformed += 1;
}

fn decode<T: serde::de::DeserializeOwned>(thing: &Thing) -> Result<T, FetchError> {
    serde_json::from_value(thing.data.clone())
        .map_err(|e| FetchError::malformed(format!("invalid '{}' child: {e}", thing.kind)))
}

fn epoch(seconds: f64) -> Result<UtcDateTime, FetchError> {
    UtcDateTime::from_unix_seconds(seconds).map_err(|e| FetchError::malformed(e.to_string()))
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_owned()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fetcher::FetchErrorKind;

    fn listing(value: Value) -> Listing {
        serde_json::from_value(value).expect("listing")
    }

    fn comment(id: &str, body: &str, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id, "body": body, "author": "u", "subreddit": "stocks",
                "score": 3, "created_utc": 1_704_067_200.0, "replies": replies
            }
        })
    }

    #[test]
    fn builds_reddit_urls() {
        let api = RedditApi::new("https://www.reddit.com/", TopWindow::Day);

        assert_eq!(
            api.listing_request("stocks", 15).url,
            "https://www.reddit.com/r/stocks/top.json?limit=15&t=day"
        );
        assert_eq!(
            api.post_thread_request("stocks", "p1", 5).url,
            "https://www.reddit.com/r/stocks/comments/p1.json?sort=top&limit=7"
        );
        assert_eq!(
            api.comment_thread_request("stocks", "p1", "c1", 5).url,
            "https://www.reddit.com/r/stocks/comments/p1/comment/c1.json?sort=top&limit=7"
        );
    }

    #[test]
    fn normalizes_subreddit_names() {
        assert_eq!(normalize_subreddit(" r/wallstreetbets ").as_deref(), Ok("wallstreetbets"));
        assert_eq!(normalize_subreddit("/r/stocks/").as_deref(), Ok("stocks"));
        assert_eq!(normalize_subreddit(""), Err(ConfigError::EmptySubreddit));
        assert_eq!(
            normalize_subreddit("stocks?x=1"),
            Err(ConfigError::InvalidSubreddit { ch: '?' })
        );
    }

    #[test]
    fn parses_top_window() {
        assert_eq!("Month".parse::<TopWindow>(), Ok(TopWindow::Month));
        assert!("fortnight".parse::<TopWindow>().is_err());
    }

    #[test]
    fn listing_yields_posts_with_title_and_body() {
        let listing = listing(json!({
            "kind": "Listing",
            "data": {"children": [
                {"kind": "t3", "data": {
                    "id": "p1", "title": "Buying $TSLA", "selftext": "and AAPL",
                    "author": "alice", "subreddit": "stocks", "score": 42,
                    "created_utc": 1_704_067_200.0
                }},
                {"kind": "t3", "data": {
                    "id": "p2", "title": "Second", "author": "bob",
                    "score": 1, "created_utc": 1_704_067_201.0
                }}
            ]}
        }));

        let posts = posts_from_listing(&listing, "stocks", 1).items;

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].text, "Buying $TSLA and AAPL");
        assert_eq!(posts[0].provenance.kind, SubmissionKind::Post);
        assert_eq!(posts[0].provenance.post_id, "p1");
        assert_eq!(posts[0].provenance.score, 42);
    }

    #[test]
    fn thread_skips_more_stubs_and_stickied_comments() {
        let mut sticky = comment("c0", "mod note", json!(""));
        sticky["data"]["stickied"] = json!(true);
        let thread = vec![
            listing(json!({"data": {"children": []}})),
            listing(json!({"data": {"children": [
                sticky,
                comment("c1", "first", json!("")),
                {"kind": "more", "data": {"count": 10}},
                comment("c2", "second", json!({"data": {"children": [comment("r1", "reply", json!(""))]}})),
                comment("c3", "third", json!("")),
            ]}})),
        ];

        let parsed = comments_from_thread(&thread, "stocks", "p1", 2).expect("comments");
        assert_eq!(parsed.malformed, 0);
        let comments = parsed.items;

        let ids: Vec<&str> = comments.iter().map(|c| c.unit.id()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(!comments[0].has_replies);
        assert!(comments[1].has_replies);
        assert_eq!(comments[1].unit.provenance.post_id, "p1");
    }

    #[test]
    fn comment_thread_yields_replies_of_the_focused_comment() {
        let thread = vec![
            listing(json!({"data": {"children": []}})),
            listing(json!({"data": {"children": [
                comment("c1", "parent", json!({"data": {"children": [
                    comment("r1", "one", json!("")),
                    comment("r2", "two", json!("")),
                    comment("r3", "three", json!("")),
                ]}}))
            ]}})),
        ];

        let replies = replies_from_thread(&thread, "stocks", "p1", "c1", 2)
            .expect("replies")
            .items;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].provenance.kind, SubmissionKind::Reply);
        assert_eq!(replies[1].text, "two");
    }

    #[test]
    fn malformed_post_is_skipped_and_its_siblings_kept() {
        let listing = listing(json!({
            "data": {"children": [
                {"kind": "t3", "data": {"id": "p1", "title": "no timestamp"}},
                {"kind": "t3", "data": {
                    "id": "p2", "title": "AAPL", "created_utc": 1_704_067_200.0
                }},
                {"kind": "t3", "data": {
                    "id": "p3", "title": "out of range", "created_utc": 1.0e300
                }},
                {"kind": "t3", "data": {
                    "id": "p4", "title": "MSFT", "created_utc": 1_704_067_201.0
                }}
            ]}
        }));

        let posts = posts_from_listing(&listing, "stocks", 10);

        let ids: Vec<&str> = posts.items.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["p2", "p4"]);
        assert_eq!(posts.malformed, 2);
        assert_eq!(posts.items[0].provenance.subreddit, "stocks");
    }

    #[test]
    fn malformed_comment_does_not_use_up_the_limit() {
        let thread = vec![
            listing(json!({"data": {"children": []}})),
            listing(json!({"data": {"children": [
                {"kind": "t1", "data": {"id": "bad", "body": 7}},
                comment("c1", "first", json!("")),
                comment("c2", "second", json!("")),
            ]}})),
        ];

        let parsed = comments_from_thread(&thread, "stocks", "p1", 2).expect("comments");

        let ids: Vec<&str> = parsed.items.iter().map(|c| c.unit.id()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(parsed.malformed, 1);
    }

    #[test]
    fn malformed_reply_is_counted_under_the_focused_comment() {
        let thread = vec![
            listing(json!({"data": {"children": []}})),
            listing(json!({"data": {"children": [
                {"kind": "t1", "data": {"id": "sibling"}},
                comment("c1", "parent", json!({"data": {"children": [
                    {"kind": "t1", "data": {"id": "r0", "body": "no timestamp"}},
                    comment("r1", "one", json!("")),
                ]}}))
            ]}})),
        ];

        let parsed = replies_from_thread(&thread, "stocks", "p1", "c1", 5).expect("replies");

        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].id(), "r1");
        assert_eq!(parsed.malformed, 1);
    }

    #[test]
    fn truncated_thread_is_malformed() {
        let thread = vec![listing(json!({"data": {"children": []}}))];

        let err = comments_from_thread(&thread, "stocks", "p1", 5).expect_err("one listing only");
        assert_eq!(err.kind(), FetchErrorKind::MalformedResponse);
    }
}
