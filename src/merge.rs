//! Merging fetched comments into thread state.
//!
//! [`ThreadState`] owns the top-level index, the reply index, the rendered
//! top-level sequence and the author cache. Every fetched batch and every
//! posted comment goes through it.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use log::{debug, warn};

use crate::comment::{Author, Comment, CommentBatch, CommentId, CommentKind, PostedComment, UserId};
use crate::index::{PageRequest, ReplyIndex, ThreadIndex};

/// Order `items` by `ids`, tolerating IDs with no item.
///
/// Returns the ordered items and the items whose IDs are not listed, in
/// arrival order. When several items share an ID the last one wins.
#[must_use]
pub fn sort_by_ids(items: Vec<Comment>, ids: &[CommentId]) -> (Vec<Comment>, Vec<Comment>) {
    let mut by_id: HashMap<CommentId, Comment> = HashMap::with_capacity(items.len());
    let mut arrival = Vec::with_capacity(items.len());
    for item in items {
        let id = item.id;
        if by_id.insert(id, item).is_none() {
            arrival.push(id);
        }
    }

    let mut ordered = Vec::with_capacity(by_id.len());
    for id in ids {
        if let Some(item) = by_id.remove(id) {
            ordered.push(item);
        }
    }
    let unlisted = arrival
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();
    (ordered, unlisted)
}

/// What a merge changed, for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Positions of newly inserted top-level comments in the rendered sequence.
    pub inserted_top_level: Range<usize>,
    /// Previously rendered top-level comments whose replies or content changed.
    pub updated_parents: BTreeSet<CommentId>,
    /// Requested IDs the server did not return.
    pub omitted: Vec<CommentId>,
    /// Replies held back because their parent is not loaded.
    pub held_orphans: usize,
}

impl MergeOutcome {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted_top_level.is_empty() && self.updated_parents.is_empty()
    }
}

/// Where a posted comment ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    InsertedTopLevel,
    UpdatedParent(CommentId),
    Held,
    /// The parent is not part of this thread.
    Dropped,
}

/// All fetched thread data, owned by a single screen.
#[derive(Debug, Default)]
pub struct ThreadState {
    index: ThreadIndex,
    replies: ReplyIndex,
    discussions: Vec<Comment>,
    orphans: HashMap<CommentId, Vec<Comment>>,
    authors: HashMap<UserId, Author>,
}

impl ThreadState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn index(&self) -> &ThreadIndex {
        &self.index
    }

    #[must_use]
    pub const fn reply_index(&self) -> &ReplyIndex {
        &self.replies
    }

    /// Rendered top-level comments, in display order.
    #[must_use]
    pub fn discussions(&self) -> &[Comment] {
        &self.discussions
    }

    #[must_use]
    pub fn discussion(&self, id: CommentId) -> Option<&Comment> {
        self.discussions.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn position(&self, id: CommentId) -> Option<usize> {
        self.discussions.iter().position(|c| c.id == id)
    }

    #[must_use]
    pub fn replies(&self, parent: CommentId) -> &[Comment] {
        self.replies.replies(parent)
    }

    #[must_use]
    pub fn author(&self, user_id: UserId) -> Option<&Author> {
        self.authors.get(&user_id)
    }

    #[must_use]
    pub fn orphan_count(&self) -> usize {
        self.orphans.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.discussions.is_empty()
    }

    #[must_use]
    pub fn has_more_top_level(&self) -> bool {
        self.index.has_more()
    }

    #[must_use]
    pub fn has_more_replies(&self, parent: CommentId) -> bool {
        self.discussion(parent)
            .is_some_and(|p| self.replies.remaining(p) > 0)
    }

    pub fn set_top_level_ids(&mut self, ids: Vec<CommentId>) {
        self.index.set_all(ids);
    }

    #[must_use]
    pub fn next_top_level_request(&self, page_size: usize) -> PageRequest {
        PageRequest::TopLevel(self.index.next_page(page_size))
    }

    /// Next reply page of `parent`; empty when the parent is not loaded.
    #[must_use]
    pub fn next_reply_request(&self, parent: CommentId, page_size: usize) -> PageRequest {
        let ids = self
            .discussion(parent)
            .map(|p| self.replies.next_page(p, page_size))
            .unwrap_or_default();
        PageRequest::Replies { parent, ids }
    }

    /// Merge a fetched batch into the thread.
    ///
    /// Re-merging IDs that are already loaded replaces them in place.
    pub fn merge(&mut self, request: &PageRequest, batch: CommentBatch) -> MergeOutcome {
        self.authors.extend(batch.authors);

        let mut outcome = MergeOutcome::default();
        let (top_level, replies): (Vec<Comment>, Vec<Comment>) =
            batch.comments.into_iter().partition(|c| !c.is_reply());

        let returned: BTreeSet<CommentId> = top_level
            .iter()
            .chain(replies.iter())
            .map(|c| c.id)
            .collect();
        outcome.omitted = request
            .ids()
            .iter()
            .copied()
            .filter(|id| !returned.contains(id))
            .collect();

        let (ordered, unrequested) = sort_by_ids(top_level, request.ids());
        for comment in &unrequested {
            warn!("dropping top-level comment {} that was not requested", comment.id);
        }

        let first_new = self.discussions.len();
        let mut touched = BTreeSet::new();
        for comment in ordered {
            let id = comment.id;
            if let Some(pos) = self.position(id) {
                self.discussions[pos] = comment;
                outcome.updated_parents.insert(id);
                touched.insert(id);
            } else if self.index.mark_loaded(id) {
                self.discussions.push(comment);
                if self.orphans.contains_key(&id) {
                    touched.insert(id);
                }
            } else {
                warn!("dropping top-level comment {id} that is not part of this thread");
            }
        }
        outcome.inserted_top_level = first_new..self.discussions.len();

        let new_ids: Vec<CommentId> = self.discussions[outcome.inserted_top_level.clone()]
            .iter()
            .map(|c| c.id)
            .collect();
        for id in new_ids {
            if let Some(held) = self.orphans.remove(&id) {
                debug!("attaching {} held replies to {id}", held.len());
                for reply in held {
                    self.replies.upsert(id, reply);
                }
            }
        }

        for reply in replies {
            let CommentKind::Reply { parent_id } = reply.kind else {
                continue;
            };
            if self.position(parent_id).is_some() {
                self.replies.upsert(parent_id, reply);
                touched.insert(parent_id);
            } else if !self.index.contains(parent_id) {
                warn!("dropping reply {} to {parent_id}, which is not in this thread", reply.id);
            } else {
                debug!("holding reply {} until parent {parent_id} loads", reply.id);
                let held = self.orphans.entry(parent_id).or_default();
                held.retain(|c| c.id != reply.id);
                held.push(reply);
                outcome.held_orphans += 1;
            }
        }

        match request {
            PageRequest::TopLevel(_) => {
                for id in &outcome.omitted {
                    self.index.mark_missing(*id);
                }
            }
            PageRequest::Replies { parent, .. } => {
                for id in &outcome.omitted {
                    self.replies.mark_missing(*parent, *id);
                }
            }
        }

        for parent in &touched {
            self.resort_replies(*parent);
            let newly_inserted = self
                .position(*parent)
                .is_some_and(|pos| outcome.inserted_top_level.contains(&pos));
            if !newly_inserted {
                outcome.updated_parents.insert(*parent);
            }
        }

        debug!(
            "merged {} new top-level, {} updated parents, {} omitted",
            outcome.inserted_top_level.len(),
            outcome.updated_parents.len(),
            outcome.omitted.len()
        );
        outcome
    }

    /// Insert a comment the user just posted.
    ///
    /// A top-level comment goes to the head of the thread; a reply is added to
    /// its parent's canonical list and appended under it.
    pub fn insert_posted(&mut self, posted: PostedComment) -> PostOutcome {
        let PostedComment { comment, author } = posted;
        self.authors.insert(author.id, author);

        match comment.kind {
            CommentKind::TopLevel { .. } => {
                let id = comment.id;
                if let Some(pos) = self.position(id) {
                    self.discussions[pos] = comment;
                    self.resort_replies(id);
                    return PostOutcome::UpdatedParent(id);
                }
                self.index.prepend(id);
                self.discussions.insert(0, comment);
                if let Some(held) = self.orphans.remove(&id) {
                    for reply in held {
                        self.replies.upsert(id, reply);
                    }
                    self.resort_replies(id);
                }
                PostOutcome::InsertedTopLevel
            }
            CommentKind::Reply { parent_id } => {
                let Some(pos) = self.position(parent_id) else {
                    if !self.index.contains(parent_id) {
                        warn!("posted reply {} answers {parent_id} outside this thread", comment.id);
                        return PostOutcome::Dropped;
                    }
                    debug!("holding posted reply {} for unloaded parent {parent_id}", comment.id);
                    self.orphans.entry(parent_id).or_default().push(comment);
                    return PostOutcome::Held;
                };
                self.discussions[pos].push_reply_id(comment.id);
                self.replies.upsert(parent_id, comment);
                self.resort_replies(parent_id);
                PostOutcome::UpdatedParent(parent_id)
            }
        }
    }

    fn resort_replies(&mut self, parent: CommentId) {
        let Some(pos) = self.position(parent) else {
            return;
        };
        let dropped = self
            .replies
            .sort_canonical(parent, self.discussions[pos].reply_ids());
        for reply in dropped {
            warn!("dropping reply {} not listed by parent {parent}", reply.id);
        }
    }

    pub fn reset(&mut self) {
        self.index.clear();
        self.replies.clear();
        self.discussions.clear();
        self.orphans.clear();
        self.authors.clear();
    }
}
