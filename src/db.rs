//! SQLite-backed discussion store.
//!
//! Implements [`DiscussionSource`] over a local database so the engine can be
//! driven without a remote service. Queries run on tokio's blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::comment::{Author, Comment, CommentBatch, CommentId, PostedComment, ThreadProxy, UserId};
use crate::error::TransportError;
use crate::source::DiscussionSource;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id    INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL DEFAULT '',
    last_name  TEXT NOT NULL DEFAULT '',
    avatar_url TEXT
);
CREATE TABLE IF NOT EXISTS comments (
    comment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    proxy_id   TEXT NOT NULL,
    parent_id  INTEGER REFERENCES comments(comment_id),
    user_id    INTEGER NOT NULL,
    text       TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_comments_proxy ON comments(proxy_id, parent_id);
CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
";

/// Database handle for a discussion store, acting as `user_id` when posting.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    user_id: UserId,
}

impl Db {
    /// Open (or create) a discussion database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize discussion schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            user_id: 0,
        })
    }

    /// Post as `user_id` from now on.
    #[must_use]
    pub const fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    /// Insert or update a user record.
    pub fn upsert_user(&self, author: &Author) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO users (user_id, first_name, last_name, avatar_url)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    avatar_url = excluded.avatar_url",
                params![author.id, author.first_name, author.last_name, author.avatar_url],
            )
            .context("Failed to store user")?;
        Ok(())
    }

    /// Insert a comment directly, bypassing the async source API.
    pub fn insert_comment(
        &self,
        proxy_id: &str,
        parent: Option<CommentId>,
        user_id: UserId,
        text: &str,
    ) -> Result<CommentId> {
        let conn = self.lock()?;
        insert_comment(&conn, proxy_id, parent, user_id, text).context("Failed to insert comment")
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, TransportError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| TransportError::Request("database lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| TransportError::Request(format!("database worker failed: {e}")))?
    }
}

#[async_trait]
impl DiscussionSource for Db {
    async fn fetch_thread_proxy(&self, proxy_id: &str) -> Result<ThreadProxy, TransportError> {
        let proxy_id = proxy_id.to_string();
        self.blocking(move |conn| {
            let top_level_ids = query_top_level_ids(conn, &proxy_id)?;
            Ok(ThreadProxy {
                id: proxy_id,
                top_level_ids,
            })
        })
        .await
    }

    async fn fetch_comments(&self, ids: &[CommentId]) -> Result<CommentBatch, TransportError> {
        let ids = ids.to_vec();
        self.blocking(move |conn| {
            let mut batch = CommentBatch::default();
            for id in ids {
                let Some(comment) = query_comment(conn, id)? else {
                    continue;
                };
                if !batch.authors.contains_key(&comment.author_id) {
                    if let Some(author) = query_author(conn, comment.author_id)? {
                        batch.authors.insert(author.id, author);
                    }
                }
                batch.comments.push(comment);
            }
            Ok(batch)
        })
        .await
    }

    async fn post_comment(
        &self,
        proxy_id: &str,
        parent: Option<CommentId>,
        body: &str,
    ) -> Result<PostedComment, TransportError> {
        let proxy_id = proxy_id.to_string();
        let body = body.to_string();
        let user_id = self.user_id;
        self.blocking(move |conn| {
            let parent = match parent {
                Some(parent_id) => {
                    let target = query_comment(conn, parent_id)?.ok_or_else(|| {
                        TransportError::Request(format!("comment {parent_id} not found"))
                    })?;
                    Some(target.reply_target())
                }
                None => None,
            };
            let id = insert_comment(conn, &proxy_id, parent, user_id, &body)?;
            let comment = query_comment(conn, id)?.ok_or_else(|| {
                TransportError::Request(format!("comment {id} vanished after insert"))
            })?;
            let author = query_author(conn, user_id)?.unwrap_or_else(|| Author {
                id: user_id,
                first_name: String::new(),
                last_name: String::new(),
                avatar_url: None,
            });
            Ok(PostedComment { comment, author })
        })
        .await
    }
}

fn insert_comment(
    conn: &Connection,
    proxy_id: &str,
    parent: Option<CommentId>,
    user_id: UserId,
    text: &str,
) -> rusqlite::Result<CommentId> {
    conn.execute(
        "INSERT INTO comments (proxy_id, parent_id, user_id, text) VALUES (?1, ?2, ?3, ?4)",
        params![proxy_id, parent, user_id, text],
    )?;
    #[allow(clippy::cast_sign_loss)]
    Ok(conn.last_insert_rowid() as CommentId)
}

/// Newest thread first, so a freshly posted comment lands at the head.
fn query_top_level_ids(conn: &Connection, proxy_id: &str) -> rusqlite::Result<Vec<CommentId>> {
    let mut stmt = conn.prepare(
        "SELECT comment_id FROM comments
         WHERE proxy_id = ?1 AND parent_id IS NULL
         ORDER BY created_at DESC, comment_id DESC",
    )?;
    let rows = stmt.query_map(params![proxy_id], |row| row.get(0))?;
    rows.collect()
}

/// Replies oldest first.
fn query_reply_ids(conn: &Connection, parent: CommentId) -> rusqlite::Result<Vec<CommentId>> {
    let mut stmt = conn.prepare(
        "SELECT comment_id FROM comments
         WHERE parent_id = ?1
         ORDER BY created_at, comment_id",
    )?;
    let rows = stmt.query_map(params![parent], |row| row.get(0))?;
    rows.collect()
}

fn query_comment(conn: &Connection, id: CommentId) -> rusqlite::Result<Option<Comment>> {
    let row = conn
        .query_row(
            "SELECT comment_id, parent_id, user_id, text, created_at
             FROM comments WHERE comment_id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, CommentId>(0)?,
                    row.get::<_, Option<CommentId>>(1)?,
                    row.get::<_, UserId>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, parent, user_id, text, created_at)) = row else {
        return Ok(None);
    };
    let mut comment = match parent {
        Some(parent_id) => Comment::reply(id, parent_id, user_id, text),
        None => Comment::top_level(id, user_id, text, query_reply_ids(conn, id)?),
    };
    comment.created_at = created_at;
    Ok(Some(comment))
}

fn query_author(conn: &Connection, user_id: UserId) -> rusqlite::Result<Option<Author>> {
    conn.query_row(
        "SELECT user_id, first_name, last_name, avatar_url FROM users WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(Author {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                avatar_url: row.get(3)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Db, Vec<CommentId>) {
        let db = Db::open_in_memory().unwrap().with_user(1);
        db.upsert_user(&Author {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            avatar_url: None,
        })
        .unwrap();
        let a = db.insert_comment("step-1", None, 1, "first").unwrap();
        let b = db.insert_comment("step-1", None, 1, "second").unwrap();
        let r1 = db.insert_comment("step-1", Some(a), 1, "reply one").unwrap();
        let r2 = db.insert_comment("step-1", Some(a), 1, "reply two").unwrap();
        db.insert_comment("step-2", None, 1, "elsewhere").unwrap();
        (db, vec![a, b, r1, r2])
    }

    #[tokio::test]
    async fn proxy_lists_top_level_newest_first() {
        let (db, ids) = seeded();
        let proxy = db.fetch_thread_proxy("step-1").await.unwrap();
        assert_eq!(proxy.top_level_ids, vec![ids[1], ids[0]]);
    }

    #[tokio::test]
    async fn fetch_comments_skips_unknown_ids_and_includes_authors() {
        let (db, ids) = seeded();
        let batch = db.fetch_comments(&[ids[0], 9999, ids[2]]).await.unwrap();

        let fetched: Vec<CommentId> = batch.comments.iter().map(|c| c.id).collect();
        assert_eq!(fetched, vec![ids[0], ids[2]]);
        assert_eq!(batch.comments[0].reply_ids(), &[ids[2], ids[3]]);
        assert_eq!(batch.comments[1].parent_id(), Some(ids[0]));
        assert_eq!(batch.authors[&1].display_name(), "Ada Lovelace");
    }

    #[tokio::test]
    async fn posting_to_a_reply_answers_its_thread() {
        let (db, ids) = seeded();
        let posted = db
            .post_comment("step-1", Some(ids[2]), "nested?")
            .await
            .unwrap();

        assert_eq!(posted.comment.parent_id(), Some(ids[0]));
        assert_eq!(posted.author.id, 1);
    }

    #[tokio::test]
    async fn posting_to_unknown_parent_fails() {
        let (db, _) = seeded();
        let err = db.post_comment("step-1", Some(424_242), "hi").await;
        assert!(matches!(err, Err(TransportError::Request(_))));
    }

    #[test]
    fn open_creates_schema_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discussions.db");
        let db = Db::open(&path).unwrap();
        let id = db.insert_comment("p", None, 3, "hello").unwrap();
        drop(db);

        let reopened = Db::open(&path).unwrap();
        assert_eq!(
            query_top_level_ids(&reopened.lock().unwrap(), "p").unwrap(),
            vec![id]
        );
    }
}
