//! discussion-thread - page through a discussion stored in SQLite
//!
//! Usage: discussion-thread [--db path] [--proxy id] [--seed-demo]
//!
//! Loads every page and reply of one discussion through the thread screen,
//! lets row heights settle and prints the thread.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use discussion_thread::config::{load_thread_config, load_thread_config_from};
use discussion_thread::layout::{estimate_comment_height, footer_height, text_columns};
use discussion_thread::text::{plain_text, wrap_text};
use discussion_thread::{
    Author, Comment, CommentId, Db, EmptyState, HeightConvergenceLoop, ThreadChange, ThreadConfig,
    ThreadObserver, ThreadScreen, ThreadScreenHandle, ThreadState,
};

/// Upper bound for a single page or post round trip.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "discussion-thread", version, about = "Page through a threaded discussion.")]
struct Args {
    /// SQLite discussion store; an in-memory demo store is used when omitted.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Discussion proxy to show.
    #[arg(long, default_value = "demo")]
    proxy: String,

    /// User that posts comments.
    #[arg(long, default_value_t = 1)]
    user: u64,

    /// Fill the store with a demo discussion first.
    #[arg(long)]
    seed_demo: bool,

    /// Post this comment after loading.
    #[arg(long)]
    post: Option<String>,

    /// Post as a reply to this comment.
    #[arg(long, requires = "post")]
    reply_to: Option<CommentId>,

    /// Row width used for text wrapping and height estimates.
    #[arg(long, default_value_t = 375.0)]
    width: f64,

    /// Config file to use instead of the standard location.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_thread_config_from(path)?,
        None => load_thread_config()?,
    }
    .unwrap_or_default();

    let db = match &args.db {
        Some(path) => Db::open(path)?,
        None => Db::open_in_memory()?,
    }
    .with_user(args.user);
    if args.seed_demo || args.db.is_none() {
        seed_demo(&db, &args.proxy).context("Failed to seed demo discussion")?;
    }

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (handle, task) =
        ThreadScreen::spawn(args.proxy.clone(), config.clone(), Arc::new(db), Forwarder(events_tx));
    let mut heights = HashMap::new();

    handle.request_reload()?;
    let mut snapshot = next_snapshot(&mut events, &mut heights).await?;
    while snapshot.has_more {
        handle.request_load_more_top_level()?;
        snapshot = next_snapshot(&mut events, &mut heights).await?;
    }

    let mut pending: Vec<CommentId> = snapshot
        .rows
        .iter()
        .filter(|row| row.has_more_replies)
        .map(|row| row.comment.id)
        .collect();
    while let Some(parent) = pending.pop() {
        handle.request_load_more_replies(parent)?;
        snapshot = next_snapshot(&mut events, &mut heights).await?;
        if snapshot.row(parent).is_some_and(|row| row.has_more_replies) {
            pending.push(parent);
        }
    }

    if let Some(body) = &args.post {
        handle.post_comment(args.reply_to, body.as_str())?;
        snapshot = next_snapshot(&mut events, &mut heights).await?;
    }

    settle_heights(&handle, &snapshot, &config, args.width, &mut events, &mut heights).await?;
    print_thread(&snapshot, &heights, args.width);

    handle.teardown()?;
    task.await.context("Thread screen panicked")?;
    Ok(())
}

/// Register every row with a sampler and wait until each one froze.
async fn settle_heights(
    handle: &ThreadScreenHandle,
    snapshot: &Snapshot,
    config: &ThreadConfig,
    width: f64,
    events: &mut UnboundedReceiver<ScreenEvent>,
    heights: &mut HashMap<CommentId, f64>,
) -> Result<()> {
    for comment in snapshot.comments() {
        let height = estimate_comment_height(comment, width);
        handle.register_row_for_height_tracking(comment.id, move || height)?;
    }

    let settle = config.height_tick_interval() * (config.max_stale_ticks + 2);
    tokio::time::sleep(settle).await;
    while let Ok(event) = events.try_recv() {
        if let ScreenEvent::Heights(changed) = event {
            heights.extend(changed);
        }
    }
    info!("{} row heights known", heights.len());
    Ok(())
}

async fn next_snapshot(
    events: &mut UnboundedReceiver<ScreenEvent>,
    heights: &mut HashMap<CommentId, f64>,
) -> Result<Snapshot> {
    loop {
        let event = tokio::time::timeout(RESPONSE_TIMEOUT, events.recv())
            .await
            .context("Timed out waiting for the discussion")?;
        match event {
            Some(ScreenEvent::Thread(snapshot)) => return Ok(snapshot),
            Some(ScreenEvent::Heights(changed)) => heights.extend(changed),
            Some(ScreenEvent::Empty(EmptyState::Error)) => {
                anyhow::bail!("Failed to load discussion")
            }
            Some(ScreenEvent::Empty(_)) => {}
            Some(ScreenEvent::PostFailed(error)) => anyhow::bail!("Failed to post comment: {error}"),
            None => anyhow::bail!("Thread screen stopped"),
        }
    }
}

// --- Observer ---

enum ScreenEvent {
    Thread(Snapshot),
    Heights(Vec<(CommentId, f64)>),
    Empty(EmptyState),
    PostFailed(String),
}

struct Forwarder(UnboundedSender<ScreenEvent>);

impl Forwarder {
    fn forward(&self, event: ScreenEvent) {
        if self.0.send(event).is_err() {
            debug!("event receiver gone");
        }
    }
}

impl ThreadObserver for Forwarder {
    fn on_thread_changed(&mut self, change: &ThreadChange, thread: &ThreadState) {
        debug!("thread changed: {change:?}");
        self.forward(ScreenEvent::Thread(Snapshot::capture(thread)));
    }

    fn on_heights_changed(&mut self, changed: &BTreeSet<CommentId>, heights: &HeightConvergenceLoop) {
        let changed = changed
            .iter()
            .filter_map(|id| heights.height(*id).map(|h| (*id, h)))
            .collect();
        self.forward(ScreenEvent::Heights(changed));
    }

    fn on_empty_state(&mut self, state: EmptyState) {
        self.forward(ScreenEvent::Empty(state));
    }

    fn on_post_failed(&mut self, _parent: Option<CommentId>, error: &str) {
        self.forward(ScreenEvent::PostFailed(error.to_string()));
    }
}

// --- Snapshot of the rendered thread ---

struct Row {
    comment: Comment,
    author: String,
    replies: Vec<(Comment, String)>,
    has_more_replies: bool,
}

struct Snapshot {
    rows: Vec<Row>,
    has_more: bool,
}

impl Snapshot {
    fn capture(thread: &ThreadState) -> Self {
        let name = |comment: &Comment| {
            thread
                .author(comment.author_id)
                .map_or_else(|| format!("user {}", comment.author_id), Author::display_name)
        };
        let rows = thread
            .discussions()
            .iter()
            .map(|comment| Row {
                author: name(comment),
                replies: thread
                    .replies(comment.id)
                    .iter()
                    .map(|reply| (reply.clone(), name(reply)))
                    .collect(),
                has_more_replies: thread.has_more_replies(comment.id),
                comment: comment.clone(),
            })
            .collect();
        Self {
            rows,
            has_more: thread.has_more_top_level(),
        }
    }

    fn row(&self, id: CommentId) -> Option<&Row> {
        self.rows.iter().find(|row| row.comment.id == id)
    }

    fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.rows.iter().flat_map(|row| {
            std::iter::once(&row.comment).chain(row.replies.iter().map(|(reply, _)| reply))
        })
    }
}

fn print_thread(snapshot: &Snapshot, heights: &HashMap<CommentId, f64>, width: f64) {
    if snapshot.rows.is_empty() {
        println!("No comments yet.");
        return;
    }

    for row in &snapshot.rows {
        print_comment(&row.comment, &row.author, heights, text_columns(&row.comment, width), "");
        for (reply, author) in &row.replies {
            print_comment(reply, author, heights, text_columns(reply, width), "    ");
        }
        if row.has_more_replies {
            println!("    ... more replies");
        }
        println!("    [footer {:.0}]", footer_height(row.has_more_replies));
        println!();
    }
}

fn print_comment(
    comment: &Comment,
    author: &str,
    heights: &HashMap<CommentId, f64>,
    columns: usize,
    indent: &str,
) {
    let height = heights
        .get(&comment.id)
        .map_or_else(|| "?".to_string(), |h| format!("{h:.0}"));
    println!("{indent}#{} {author} {} [h={height}]", comment.id, comment.created_at);
    for line in wrap_text(&plain_text(&comment.text), columns) {
        println!("{indent}  {line}");
    }
}

/// Fill `proxy_id` with two pages of threads, one of them with two pages of replies.
fn seed_demo(db: &Db, proxy_id: &str) -> Result<()> {
    let people = [
        (1, "Ada", "Lovelace"),
        (2, "Grace", "Hopper"),
        (3, "Edsger", "Dijkstra"),
    ];
    for (id, first, last) in people {
        db.upsert_user(&Author {
            id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            avatar_url: None,
        })?;
    }

    let lively = db.insert_comment(
        proxy_id,
        None,
        2,
        "<p>Why does the second test case time out?</p><p>My loop is <code>O(n log n)</code>.</p>",
    )?;
    for i in 0..23u64 {
        db.insert_comment(
            proxy_id,
            Some(lively),
            1 + i % 3,
            &format!("Reply {i}: check the input bounds &amp; the sort."),
        )?;
    }
    for i in 0..24u64 {
        db.insert_comment(proxy_id, None, 1 + i % 3, &format!("Thread {i} about this step."))?;
    }
    Ok(())
}
