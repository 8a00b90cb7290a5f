//! # Traversal Orchestrator
//!
//! Walks post -> comment -> reply for one subreddit. The listing call seeds a
//! task set with one node per post; every finished node hands back the child
//! nodes it discovered, which are spawned into the same set. All nodes fetch
//! through the one shared [`RateLimitedFetcher`], so deep and shallow work
//! compete for the same permits instead of being throttled level by level.
//!
//! Text units are pushed into the caller's channel as soon as each node's
//! response is parsed.
//!
//! A failed node is logged and its subtree skipped. A listing child that does
//! not decode is dropped on its own and counted; its siblings still flow. A fatal fetch error closes
//! the fetcher: queued requests come back cancelled, nothing new is spawned,
//! and requests already on the wire finish.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::fetcher::{FetchError, FetchErrorKind, RateLimitedFetcher};
use crate::reddit::{self, Listing, Parsed, RedditApi};
use crate::{ConfigError, SubmissionKind, TextUnit};

/// Fan-out bounds for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalLimits {
    pub max_posts: usize,
    pub max_comments_per_post: usize,
    pub max_replies_per_comment: usize,
    pub max_concurrent: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_posts: 15,
            max_comments_per_post: 5,
            max_replies_per_comment: 5,
            max_concurrent: 15,
        }
    }
}

impl TraversalLimits {
    /// Reddit serves at most 100 children per listing call.
    pub const MAX_LISTING: usize = 100;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_posts == 0 {
            return Err(ConfigError::Zero { field: "max_posts" });
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Zero {
                field: "max_concurrent",
            });
        }
        for (field, value) in [
            ("max_posts", self.max_posts),
            ("max_comments_per_post", self.max_comments_per_post),
            ("max_replies_per_comment", self.max_replies_per_comment),
        ] {
            if value > Self::MAX_LISTING {
                return Err(ConfigError::TooLarge {
                    field,
                    value: value as u64,
                    max: Self::MAX_LISTING as u64,
                });
            }
        }
        Ok(())
    }
}

/// One unit of traversal work: expand `id` by fetching its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub depth: SubmissionKind,
}

impl FetchNode {
    fn post(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            depth: SubmissionKind::Post,
        }
    }

    fn comment(id: impl Into<String>, post_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: Some(post_id.into()),
            depth: SubmissionKind::Comment,
        }
    }
}

/// What a traversal did, for run statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalOutcome {
    /// Text units pushed downstream.
    pub emitted: u64,
    /// Nodes whose fetch failed after retries; their subtrees are missing.
    pub skipped_nodes: u64,
    /// Discovered nodes never scheduled because the run was cancelled.
    pub abandoned_nodes: u64,
    /// Listing children dropped because they did not decode.
    pub malformed_children: u64,
    /// First fatal upstream error, if the run was cancelled by one.
    pub fatal: Option<FetchError>,
    /// The fetcher was closed or the consumer went away before the walk finished.
    pub cancelled: bool,
}

impl TraversalOutcome {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.errors_skipped() == 0
    }

    /// Everything the walk had to leave out.
    pub fn errors_skipped(&self) -> u64 {
        self.skipped_nodes + self.abandoned_nodes + self.malformed_children
    }
}

struct NodeContext {
    fetcher: Arc<RateLimitedFetcher>,
    api: RedditApi,
    subreddit: String,
    limits: TraversalLimits,
    sink: mpsc::Sender<TextUnit>,
}

impl NodeContext {
    async fn emit(&self, unit: TextUnit) -> Result<(), FetchError> {
        self.sink
            .send(unit)
            .await
            .map_err(|_| FetchError::cancelled("text unit consumer stopped"))
    }
}

/// Schedules the tree walk for one subreddit.
#[derive(Clone)]
pub struct TraversalOrchestrator {
    fetcher: Arc<RateLimitedFetcher>,
    api: RedditApi,
}

impl TraversalOrchestrator {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, api: RedditApi) -> Self {
        Self { fetcher, api }
    }

    pub fn fetcher(&self) -> &Arc<RateLimitedFetcher> {
        &self.fetcher
    }

    /// Walks the tree, pushing text units into `sink` as they arrive.
    /// Returns once every scheduled node has finished.
    pub async fn run(
        &self,
        subreddit: &str,
        limits: &TraversalLimits,
        sink: mpsc::Sender<TextUnit>,
    ) -> TraversalOutcome {
        let ctx = Arc::new(NodeContext {
            fetcher: Arc::clone(&self.fetcher),
            api: self.api.clone(),
            subreddit: subreddit.to_owned(),
            limits: *limits,
            sink,
        });
        let mut outcome = TraversalOutcome::default();

        let posts = match self.fetch_posts(&ctx).await {
            Ok(posts) => posts,
            Err(error) => {
                self.record_failure(&mut outcome, "listing", error);
                return outcome;
            }
        };
        outcome.malformed_children += posts.malformed as u64;
        info!(
            subreddit,
            posts = posts.items.len(),
            malformed = posts.malformed,
            "fetched top posts"
        );
        let posts = posts.items;

        let mut tasks: JoinSet<(FetchNode, NodeYield)> = JoinSet::new();
        for post in posts {
            let post_id = post.id().to_owned();
            if let Err(error) = ctx.emit(post).await {
                self.record_failure(&mut outcome, &post_id, error);
                break;
            }
            outcome.emitted += 1;
            if limits.max_comments_per_post > 0 {
                spawn_node(&mut tasks, &ctx, FetchNode::post(post_id));
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (node, yielded) = match joined {
                Ok(done) => done,
                Err(join_error) => {
                    warn!(subreddit, error = %join_error, "traversal task panicked");
                    outcome.skipped_nodes += 1;
                    continue;
                }
            };

            outcome.emitted += yielded.emitted;
            outcome.malformed_children += yielded.malformed;
            if let Some(error) = yielded.error {
                outcome.abandoned_nodes += yielded.children.len() as u64;
                self.record_failure(&mut outcome, &node.id, error);
                continue;
            }

            debug!(
                subreddit,
                submission_id = %node.id,
                depth = %node.depth,
                emitted = yielded.emitted,
                children = yielded.children.len(),
                "node expanded"
            );

            if outcome.cancelled {
                outcome.abandoned_nodes += yielded.children.len() as u64;
                continue;
            }
            for child in yielded.children {
                spawn_node(&mut tasks, &ctx, child);
            }
        }

        if outcome.cancelled {
            warn!(
                subreddit,
                skipped = outcome.skipped_nodes,
                abandoned = outcome.abandoned_nodes,
                "traversal cancelled"
            );
        } else {
            info!(
                subreddit,
                emitted = outcome.emitted,
                skipped = outcome.skipped_nodes,
                "traversal finished"
            );
        }
        outcome
    }

    async fn fetch_posts(&self, ctx: &NodeContext) -> Result<Parsed<TextUnit>, FetchError> {
        let request = ctx
            .api
            .listing_request(&ctx.subreddit, ctx.limits.max_posts);
        let listing: Listing = self.fetcher.fetch_json(request).await?;
        Ok(reddit::posts_from_listing(
            &listing,
            &ctx.subreddit,
            ctx.limits.max_posts,
        ))
    }

    fn record_failure(
        &self,
        outcome: &mut TraversalOutcome,
        submission_id: &str,
        error: FetchError,
    ) {
        outcome.skipped_nodes += 1;

        if error.is_fatal() {
            warn!(submission_id, error = %error, "fatal upstream error; cancelling traversal");
            self.fetcher.close();
            outcome.cancelled = true;
            if outcome.fatal.is_none() {
                outcome.fatal = Some(error);
            }
            return;
        }

        if error.kind() == FetchErrorKind::Cancelled {
            debug!(submission_id, error = %error, "node cancelled");
            outcome.cancelled = true;
            return;
        }

        warn!(submission_id, error = %error, "node fetch failed; skipping subtree");
    }
}

/// Result of expanding one node. Units emitted before a failure still count.
#[derive(Default)]
struct NodeYield {
    emitted: u64,
    malformed: u64,
    children: Vec<FetchNode>,
    error: Option<FetchError>,
}

fn spawn_node(tasks: &mut JoinSet<(FetchNode, NodeYield)>, ctx: &Arc<NodeContext>, node: FetchNode) {
    let ctx = Arc::clone(ctx);
    tasks.spawn(async move {
        let yielded = visit(&ctx, &node).await;
        (node, yielded)
    });
}

async fn visit(ctx: &NodeContext, node: &FetchNode) -> NodeYield {
    let mut yielded = NodeYield::default();
    let result = match node.depth {
        SubmissionKind::Post => expand_post(ctx, &node.id, &mut yielded).await,
        SubmissionKind::Comment => {
            let post_id = node.parent_id.as_deref().unwrap_or_default();
            expand_comment(ctx, post_id, &node.id, &mut yielded).await
        }
        SubmissionKind::Reply => Ok(()),
    };
    yielded.error = result.err();
    yielded
}

async fn expand_post(
    ctx: &NodeContext,
    post_id: &str,
    yielded: &mut NodeYield,
) -> Result<(), FetchError> {
    let limit = ctx.limits.max_comments_per_post;
    let request = ctx.api.post_thread_request(&ctx.subreddit, post_id, limit);
    let thread: Vec<Listing> = ctx.fetcher.fetch_json(request).await?;
    let comments = reddit::comments_from_thread(&thread, &ctx.subreddit, post_id, limit)?;
    yielded.malformed += comments.malformed as u64;

    for comment in comments.items {
        let comment_id = comment.unit.id().to_owned();
        ctx.emit(comment.unit).await?;
        yielded.emitted += 1;
        if comment.has_replies && ctx.limits.max_replies_per_comment > 0 {
            yielded.children.push(FetchNode::comment(comment_id, post_id));
        }
    }
    Ok(())
}

async fn expand_comment(
    ctx: &NodeContext,
    post_id: &str,
    comment_id: &str,
    yielded: &mut NodeYield,
) -> Result<(), FetchError> {
    let limit = ctx.limits.max_replies_per_comment;
    let request = ctx
        .api
        .comment_thread_request(&ctx.subreddit, post_id, comment_id, limit);
    let thread: Vec<Listing> = ctx.fetcher.fetch_json(request).await?;
    let replies =
        reddit::replies_from_thread(&thread, &ctx.subreddit, post_id, comment_id, limit)?;
    yielded.malformed += replies.malformed as u64;

    for reply in replies.items {
        ctx.emit(reply).await?;
        yielded.emitted += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_run_defaults() {
        let limits = TraversalLimits::default();
        assert_eq!(limits.max_posts, 15);
        assert_eq!(limits.max_comments_per_post, 5);
        assert_eq!(limits.max_replies_per_comment, 5);
        assert_eq!(limits.max_concurrent, 15);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn rejects_oversized_listing_limits() {
        let limits = TraversalLimits {
            max_comments_per_post: 500,
            ..TraversalLimits::default()
        };
        assert!(matches!(
            limits.validate(),
            Err(ConfigError::TooLarge {
                field: "max_comments_per_post",
                ..
            })
        ));
    }

    #[test]
    fn zero_replies_is_a_valid_limit() {
        let limits = TraversalLimits {
            max_replies_per_comment: 0,
            ..TraversalLimits::default()
        };
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn outcome_with_skips_is_not_complete() {
        let outcome = TraversalOutcome {
            emitted: 3,
            skipped_nodes: 1,
            ..TraversalOutcome::default()
        };
        assert!(!outcome.is_complete());
        assert!(TraversalOutcome::default().is_complete());
    }

    #[test]
    fn malformed_children_count_as_skipped() {
        let outcome = TraversalOutcome {
            emitted: 4,
            abandoned_nodes: 1,
            malformed_children: 2,
            ..TraversalOutcome::default()
        };
        assert_eq!(outcome.errors_skipped(), 3);
        assert!(!outcome.is_complete());
    }
}
