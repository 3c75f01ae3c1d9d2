//! Pagination bookkeeping for top-level comments and their replies.

use std::collections::{HashMap, HashSet};

use crate::comment::{Comment, CommentId};

/// One round trip worth of IDs, tagged with the scope it pages through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    TopLevel(Vec<CommentId>),
    Replies {
        parent: CommentId,
        ids: Vec<CommentId>,
    },
}

impl PageRequest {
    #[must_use]
    pub fn ids(&self) -> &[CommentId] {
        match self {
            Self::TopLevel(ids) | Self::Replies { ids, .. } => ids,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }
}

/// Ordered set of all top-level IDs of a thread and which of them are loaded.
///
/// `loaded` and `missing` are disjoint subsets of `all`. `missing` holds IDs
/// that were requested but omitted by the server, so paging still ends.
#[derive(Debug, Clone, Default)]
pub struct ThreadIndex {
    all: Vec<CommentId>,
    loaded: Vec<CommentId>,
    loaded_set: HashSet<CommentId>,
    missing: HashSet<CommentId>,
}

impl ThreadIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the authoritative order from the proxy.
    pub fn set_all(&mut self, ids: Vec<CommentId>) {
        let known: HashSet<CommentId> = ids.iter().copied().collect();
        self.loaded.retain(|id| known.contains(id));
        self.loaded_set.retain(|id| known.contains(id));
        self.missing.retain(|id| known.contains(id));
        self.all = ids;
    }

    #[must_use]
    pub fn all(&self) -> &[CommentId] {
        &self.all
    }

    #[must_use]
    pub fn loaded(&self) -> &[CommentId] {
        &self.loaded
    }

    #[must_use]
    pub fn is_loaded(&self, id: CommentId) -> bool {
        self.loaded_set.contains(&id)
    }

    #[must_use]
    pub fn contains(&self, id: CommentId) -> bool {
        self.all.contains(&id)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.all
            .len()
            .saturating_sub(self.loaded.len() + self.missing.len())
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.remaining() > 0
    }

    /// Next `min(page_size, remaining)` IDs in proxy order.
    ///
    /// An empty result means there are no more pages.
    #[must_use]
    pub fn next_page(&self, page_size: usize) -> Vec<CommentId> {
        self.all
            .iter()
            .copied()
            .filter(|id| !self.loaded_set.contains(id) && !self.missing.contains(id))
            .take(page_size)
            .collect()
    }

    /// Record a fetched top-level ID. Returns `false` if it was already
    /// loaded or is not part of this thread.
    pub fn mark_loaded(&mut self, id: CommentId) -> bool {
        if self.loaded_set.contains(&id) || !self.contains(id) {
            return false;
        }
        self.missing.remove(&id);
        self.loaded_set.insert(id);
        self.loaded.push(id);
        true
    }

    /// Record a requested ID the server did not return.
    pub fn mark_missing(&mut self, id: CommentId) {
        if self.contains(id) && !self.loaded_set.contains(&id) {
            self.missing.insert(id);
        }
    }

    /// Put a freshly posted comment at the head of both sequences.
    pub fn prepend(&mut self, id: CommentId) {
        self.all.retain(|other| *other != id);
        self.loaded.retain(|other| *other != id);
        self.missing.remove(&id);
        self.all.insert(0, id);
        self.loaded.insert(0, id);
        self.loaded_set.insert(id);
    }

    pub fn clear(&mut self) {
        self.all.clear();
        self.loaded.clear();
        self.loaded_set.clear();
        self.missing.clear();
    }
}

/// Fetched replies per top-level comment.
///
/// For a parent with canonical reply list `R`, the stored replies are always a
/// subsequence of `R`; replies not yet loaded are simply absent.
#[derive(Debug, Clone, Default)]
pub struct ReplyIndex {
    loaded: HashMap<CommentId, Vec<Comment>>,
    missing: HashSet<CommentId>,
}

impl ReplyIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn replies(&self, parent: CommentId) -> &[Comment] {
        self.loaded.get(&parent).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, parent: CommentId, reply_id: CommentId) -> bool {
        self.replies(parent).iter().any(|c| c.id == reply_id)
    }

    fn is_settled(&self, parent: CommentId, reply_id: CommentId) -> bool {
        self.missing.contains(&reply_id) || self.contains(parent, reply_id)
    }

    /// Replies of `parent` that are neither loaded nor known to be missing.
    #[must_use]
    pub fn remaining(&self, parent: &Comment) -> usize {
        parent
            .reply_ids()
            .iter()
            .filter(|id| !self.is_settled(parent.id, **id))
            .count()
    }

    /// Up to `page_size` reply IDs of `parent` that are not loaded yet, in
    /// canonical order.
    ///
    /// Works by set difference rather than offset: a posted reply may be
    /// loaded ahead of the page that would normally contain it.
    #[must_use]
    pub fn next_page(&self, parent: &Comment, page_size: usize) -> Vec<CommentId> {
        parent
            .reply_ids()
            .iter()
            .copied()
            .filter(|id| !self.is_settled(parent.id, *id))
            .take(page_size)
            .collect()
    }

    /// Append a reply under its parent, or replace the stored copy with the
    /// same ID. Returns `true` if the reply was new.
    pub fn upsert(&mut self, parent: CommentId, reply: Comment) -> bool {
        self.missing.remove(&reply.id);
        let replies = self.loaded.entry(parent).or_default();
        if let Some(existing) = replies.iter_mut().find(|c| c.id == reply.id) {
            *existing = reply;
            false
        } else {
            replies.push(reply);
            true
        }
    }

    pub fn mark_missing(&mut self, parent: CommentId, reply_id: CommentId) {
        if !self.contains(parent, reply_id) {
            self.missing.insert(reply_id);
        }
    }

    /// Reorder the replies of `parent` to follow `canonical`.
    ///
    /// Replies whose IDs are not listed in `canonical` are removed and
    /// returned.
    pub fn sort_canonical(&mut self, parent: CommentId, canonical: &[CommentId]) -> Vec<Comment> {
        let Some(replies) = self.loaded.remove(&parent) else {
            return Vec::new();
        };
        let (ordered, unlisted) = crate::merge::sort_by_ids(replies, canonical);
        self.loaded.insert(parent, ordered);
        unlisted
    }

    pub fn clear(&mut self) {
        self.loaded.clear();
        self.missing.clear();
    }
}
