//! Message types for the Elm Architecture

use crate::comment::{CommentBatch, CommentId, PostedComment, ThreadProxy};
use crate::error::TransportError;
use crate::heights::HeightSampler;
use crate::index::PageRequest;

/// Everything that may change thread state.
///
/// Async completions carry the generation they were issued under; a
/// completion from an older generation is dropped.
#[derive(Debug)]
pub enum Message {
    // === Presentation requests ===
    /// Pull-to-refresh: drop all state and load the first page again
    RequestReload,
    /// "Show more discussions" footer
    RequestLoadMoreTopLevel,
    /// "Show more replies" footer of a thread
    RequestLoadMoreReplies(CommentId),
    /// Publish a comment; `parent` set means a reply
    PostComment {
        parent: Option<CommentId>,
        body: String,
    },
    /// A row was displayed and its content height is not final yet
    RegisterRow {
        comment_id: CommentId,
        sampler: HeightSampler,
    },
    /// The screen goes away
    Teardown,

    // === Completions ===
    ProxyLoaded {
        generation: u64,
        result: Result<ThreadProxy, TransportError>,
    },
    PageLoaded {
        generation: u64,
        request: PageRequest,
        result: Result<CommentBatch, TransportError>,
    },
    CommentPosted {
        generation: u64,
        parent: Option<CommentId>,
        result: Result<PostedComment, TransportError>,
    },
    /// Scheduled height-convergence pass
    HeightTick { generation: u64 },
}
