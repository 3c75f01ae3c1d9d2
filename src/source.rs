//! Remote collaborators the thread screen depends on.

use async_trait::async_trait;

use crate::comment::{CommentBatch, CommentId, PostedComment, ThreadProxy};
use crate::error::TransportError;

/// Where discussions come from.
///
/// Every call succeeds or fails as a whole. `fetch_comments` may return fewer
/// comments than requested; the merger treats that as an omission, not as a
/// failure.
#[async_trait]
pub trait DiscussionSource: Send + Sync {
    /// Resolve a proxy ID into the ordered list of all top-level comment IDs.
    async fn fetch_thread_proxy(&self, proxy_id: &str) -> Result<ThreadProxy, TransportError>;

    /// Resolve comment IDs into comments plus their authors.
    async fn fetch_comments(&self, ids: &[CommentId]) -> Result<CommentBatch, TransportError>;

    /// Publish a new comment in `proxy_id`, as a reply when `parent` is set.
    async fn post_comment(
        &self,
        proxy_id: &str,
        parent: Option<CommentId>,
        body: &str,
    ) -> Result<PostedComment, TransportError>;
}
