//! Effects requested by [`update`](crate::update::update).
//!
//! `update` never performs I/O itself; the runtime executes these.

use std::collections::BTreeSet;
use std::ops::Range;
use std::time::Duration;

use crate::comment::CommentId;
use crate::index::PageRequest;

/// How the rendered thread changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadChange {
    /// Everything was rebuilt.
    Reloaded,
    /// A top-level page settled; new comments sit at these positions. The
    /// range is empty when the server omitted the whole page.
    InsertedTopLevel(Range<usize>),
    /// Replies or content of one top-level comment changed.
    UpdatedParent(CommentId),
}

/// What to show when there are no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyState {
    /// A request is outstanding.
    #[default]
    None,
    /// Loaded, nothing to show.
    Empty,
    /// The last request failed; reload to retry.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ThreadChanged(ThreadChange),
    /// One batch per height pass.
    HeightsChanged(BTreeSet<CommentId>),
    EmptyState(EmptyState),
    PostFailed {
        parent: Option<CommentId>,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FetchProxy {
        generation: u64,
        proxy_id: String,
    },
    FetchPage {
        generation: u64,
        request: PageRequest,
    },
    PostComment {
        generation: u64,
        proxy_id: String,
        parent: Option<CommentId>,
        body: String,
    },
    ScheduleHeightTick {
        generation: u64,
        delay: Duration,
    },
    CancelHeightTick,
    Notify(Notification),
}
