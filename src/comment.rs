//! Discussion data model shared by the index, merger and collaborators.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Externally assigned comment identifier.
pub type CommentId = u64;

/// Externally assigned user identifier.
pub type UserId = u64;

/// Whether a comment opens a thread or answers one.
///
/// Decided once when the comment is built from its wire record; threads are
/// never nested deeper than two levels, so a reply carries no reply list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentKind {
    TopLevel { reply_ids: Vec<CommentId> },
    Reply { parent_id: CommentId },
}

/// A single comment as returned by the discussion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CommentRecord", into = "CommentRecord")]
pub struct Comment {
    pub id: CommentId,
    pub kind: CommentKind,
    pub author_id: UserId,
    pub text: String,
    pub created_at: String,
}

impl Comment {
    #[must_use]
    pub fn top_level(
        id: CommentId,
        author_id: UserId,
        text: impl Into<String>,
        reply_ids: Vec<CommentId>,
    ) -> Self {
        Self {
            id,
            kind: CommentKind::TopLevel { reply_ids },
            author_id,
            text: text.into(),
            created_at: String::new(),
        }
    }

    #[must_use]
    pub fn reply(
        id: CommentId,
        parent_id: CommentId,
        author_id: UserId,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind: CommentKind::Reply { parent_id },
            author_id,
            text: text.into(),
            created_at: String::new(),
        }
    }

    #[must_use]
    pub const fn parent_id(&self) -> Option<CommentId> {
        match self.kind {
            CommentKind::TopLevel { .. } => None,
            CommentKind::Reply { parent_id } => Some(parent_id),
        }
    }

    #[must_use]
    pub const fn is_reply(&self) -> bool {
        matches!(self.kind, CommentKind::Reply { .. })
    }

    /// Canonical reply order for a top-level comment; empty for replies.
    #[must_use]
    pub fn reply_ids(&self) -> &[CommentId] {
        match &self.kind {
            CommentKind::TopLevel { reply_ids } => reply_ids,
            CommentKind::Reply { .. } => &[],
        }
    }

    /// The thread a new reply to this comment should go to.
    ///
    /// Replying to a reply answers its parent thread.
    #[must_use]
    pub const fn reply_target(&self) -> CommentId {
        match self.kind {
            CommentKind::TopLevel { .. } => self.id,
            CommentKind::Reply { parent_id } => parent_id,
        }
    }

    /// Append a reply ID to the canonical list. Returns `false` for replies
    /// and for IDs that are already listed.
    pub fn push_reply_id(&mut self, reply_id: CommentId) -> bool {
        match &mut self.kind {
            CommentKind::TopLevel { reply_ids } if !reply_ids.contains(&reply_id) => {
                reply_ids.push(reply_id);
                true
            }
            _ => false,
        }
    }
}

/// Wire shape of a comment: an optional parent plus a reply list.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommentRecord {
    id: CommentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<CommentId>,
    #[serde(default)]
    replies: Vec<CommentId>,
    user: UserId,
    text: String,
    #[serde(default)]
    time: String,
}

impl From<CommentRecord> for Comment {
    fn from(r: CommentRecord) -> Self {
        let kind = match r.parent {
            Some(parent_id) => CommentKind::Reply { parent_id },
            None => CommentKind::TopLevel {
                reply_ids: r.replies,
            },
        };
        Self {
            id: r.id,
            kind,
            author_id: r.user,
            text: r.text,
            created_at: r.time,
        }
    }
}

impl From<Comment> for CommentRecord {
    fn from(c: Comment) -> Self {
        let (parent, replies) = match c.kind {
            CommentKind::TopLevel { reply_ids } => (None, reply_ids),
            CommentKind::Reply { parent_id } => (Some(parent_id), Vec::new()),
        };
        Self {
            id: c.id,
            parent,
            replies,
            user: c.author_id,
            text: c.text,
            time: c.created_at,
        }
    }
}

/// Author display record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Author {
    #[must_use]
    pub fn display_name(&self) -> String {
        match (self.first_name.trim(), self.last_name.trim()) {
            ("", "") => format!("User {}", self.id),
            (first, "") => first.to_string(),
            ("", last) => last.to_string(),
            (first, last) => format!("{first} {last}"),
        }
    }
}

/// Ordered list of all top-level comment IDs of one discussion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadProxy {
    pub id: String,
    pub top_level_ids: Vec<CommentId>,
}

/// Result of resolving a list of comment IDs.
///
/// May hold fewer comments than were requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentBatch {
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub authors: HashMap<UserId, Author>,
}

/// A comment the current user just wrote, with their author record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedComment {
    pub comment: Comment,
    pub author: Author,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_record_with_parent_becomes_reply_and_drops_reply_list() {
        let json = r#"{"id":7,"parent":3,"replies":[9],"user":1,"text":"hi"}"#;
        let comment: Comment = serde_json::from_str(json).unwrap();

        assert_eq!(comment.kind, CommentKind::Reply { parent_id: 3 });
        assert!(comment.reply_ids().is_empty());
        assert_eq!(comment.reply_target(), 3);
    }

    #[test]
    fn wire_record_without_parent_keeps_reply_order() {
        let json = r#"{"id":3,"replies":[5,3,8],"user":1,"text":"top"}"#;
        let comment: Comment = serde_json::from_str(json).unwrap();

        assert_eq!(comment.parent_id(), None);
        assert_eq!(comment.reply_ids(), &[5, 3, 8]);
        assert_eq!(comment.reply_target(), 3);
    }

    #[test]
    fn push_reply_id_only_applies_to_top_level_once() {
        let mut top = Comment::top_level(1, 1, "t", vec![2]);
        assert!(top.push_reply_id(4));
        assert!(!top.push_reply_id(4));
        assert_eq!(top.reply_ids(), &[2, 4]);

        let mut reply = Comment::reply(2, 1, 1, "r");
        assert!(!reply.push_reply_id(9));
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let author = Author {
            id: 42,
            first_name: String::new(),
            last_name: " ".to_string(),
            avatar_url: None,
        };
        assert_eq!(author.display_name(), "User 42");
    }
}
