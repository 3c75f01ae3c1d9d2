//! Single-owner screen runtime.
//!
//! A [`ThreadScreen`] owns the [`ThreadModel`] inside one tokio task. Callers
//! talk to it through a cloneable [`ThreadScreenHandle`]; fetches and height
//! ticks run as spawned tasks that post their completion back as a
//! [`Message`]. Spawned tasks only hold a weak sender, so once every handle is
//! dropped or the screen is torn down their results are discarded.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::task::{AbortHandle, JoinHandle};

use crate::command::{Command, EmptyState, Notification, ThreadChange};
use crate::comment::CommentId;
use crate::config::ThreadConfig;
use crate::error::ThreadError;
use crate::heights::{HeightConvergenceLoop, HeightSampler};
use crate::merge::ThreadState;
use crate::message::Message;
use crate::model::ThreadModel;
use crate::source::DiscussionSource;
use crate::update::update;

/// Receives presentation events, always from the screen's task.
pub trait ThreadObserver: Send + 'static {
    fn on_thread_changed(&mut self, change: &ThreadChange, thread: &ThreadState);

    /// Called once per height pass with every row that changed.
    fn on_heights_changed(&mut self, changed: &BTreeSet<CommentId>, heights: &HeightConvergenceLoop);

    fn on_empty_state(&mut self, state: EmptyState);

    fn on_post_failed(&mut self, parent: Option<CommentId>, error: &str) {
        warn!("posting comment (parent {parent:?}) failed: {error}");
    }
}

/// Cloneable entry point into a running screen.
#[derive(Debug, Clone)]
pub struct ThreadScreenHandle {
    tx: UnboundedSender<Message>,
}

impl ThreadScreenHandle {
    fn send(&self, msg: Message) -> Result<(), ThreadError> {
        self.tx.send(msg).map_err(|_| ThreadError::ScreenClosed)
    }

    /// Drop all state and load the first page. Ignored while a reload runs.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::ScreenClosed`] once the screen is gone.
    pub fn request_reload(&self) -> Result<(), ThreadError> {
        self.send(Message::RequestReload)
    }

    /// # Errors
    ///
    /// Returns [`ThreadError::ScreenClosed`] once the screen is gone.
    pub fn request_load_more_top_level(&self) -> Result<(), ThreadError> {
        self.send(Message::RequestLoadMoreTopLevel)
    }

    /// # Errors
    ///
    /// Returns [`ThreadError::ScreenClosed`] once the screen is gone.
    pub fn request_load_more_replies(&self, parent: CommentId) -> Result<(), ThreadError> {
        self.send(Message::RequestLoadMoreReplies(parent))
    }

    /// Track the height of a displayed row until it settles.
    ///
    /// `sampler` is called from the screen's task on every height tick.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::ScreenClosed`] once the screen is gone.
    pub fn register_row_for_height_tracking(
        &self,
        comment_id: CommentId,
        sampler: impl FnMut() -> f64 + Send + 'static,
    ) -> Result<(), ThreadError> {
        self.send(Message::RegisterRow {
            comment_id,
            sampler: HeightSampler::new(sampler),
        })
    }

    /// # Errors
    ///
    /// Returns [`ThreadError::ScreenClosed`] once the screen is gone.
    pub fn post_comment(
        &self,
        parent: Option<CommentId>,
        body: impl Into<String>,
    ) -> Result<(), ThreadError> {
        self.send(Message::PostComment {
            parent,
            body: body.into(),
        })
    }

    /// Stop the screen. Pending fetches and ticks are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::ScreenClosed`] if the screen is already gone.
    pub fn teardown(&self) -> Result<(), ThreadError> {
        self.send(Message::Teardown)
    }
}

pub struct ThreadScreen<O> {
    model: ThreadModel,
    source: Arc<dyn DiscussionSource>,
    observer: O,
    weak_tx: WeakUnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
    tick: Option<AbortHandle>,
}

impl<O: ThreadObserver> ThreadScreen<O> {
    pub fn new(
        proxy_id: impl Into<String>,
        config: ThreadConfig,
        source: Arc<dyn DiscussionSource>,
        observer: O,
    ) -> (Self, ThreadScreenHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let screen = Self {
            model: ThreadModel::new(proxy_id, config),
            source,
            observer,
            weak_tx: tx.downgrade(),
            rx,
            tick: None,
        };
        (screen, ThreadScreenHandle { tx })
    }

    /// Start the screen on the current tokio runtime.
    pub fn spawn(
        proxy_id: impl Into<String>,
        config: ThreadConfig,
        source: Arc<dyn DiscussionSource>,
        observer: O,
    ) -> (ThreadScreenHandle, JoinHandle<()>) {
        let (screen, handle) = Self::new(proxy_id, config, source, observer);
        (handle, tokio::spawn(screen.run()))
    }

    /// Process messages until teardown or until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            let teardown = matches!(msg, Message::Teardown);
            self.handle(msg);
            if teardown {
                break;
            }
        }
        self.cancel_tick();
        debug!("screen for {} stopped", self.model.proxy_id);
    }

    fn handle(&mut self, msg: Message) {
        for command in update(&mut self.model, msg) {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::FetchProxy {
                generation,
                proxy_id,
            } => {
                let source = Arc::clone(&self.source);
                let tx = self.weak_tx.clone();
                tokio::spawn(async move {
                    let result = source.fetch_thread_proxy(&proxy_id).await;
                    deliver(&tx, Message::ProxyLoaded { generation, result });
                });
            }
            Command::FetchPage {
                generation,
                request,
            } => {
                let source = Arc::clone(&self.source);
                let tx = self.weak_tx.clone();
                tokio::spawn(async move {
                    let result = source.fetch_comments(request.ids()).await;
                    deliver(
                        &tx,
                        Message::PageLoaded {
                            generation,
                            request,
                            result,
                        },
                    );
                });
            }
            Command::PostComment {
                generation,
                proxy_id,
                parent,
                body,
            } => {
                let source = Arc::clone(&self.source);
                let tx = self.weak_tx.clone();
                tokio::spawn(async move {
                    let result = source.post_comment(&proxy_id, parent, &body).await;
                    deliver(
                        &tx,
                        Message::CommentPosted {
                            generation,
                            parent,
                            result,
                        },
                    );
                });
            }
            Command::ScheduleHeightTick { generation, delay } => {
                self.cancel_tick();
                let tx = self.weak_tx.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    deliver(&tx, Message::HeightTick { generation });
                });
                self.tick = Some(handle.abort_handle());
            }
            Command::CancelHeightTick => self.cancel_tick(),
            Command::Notify(notification) => self.notify(notification),
        }
    }

    fn notify(&mut self, notification: Notification) {
        match notification {
            Notification::ThreadChanged(change) => {
                self.observer.on_thread_changed(&change, &self.model.thread);
            }
            Notification::HeightsChanged(changed) => {
                self.observer
                    .on_heights_changed(&changed, &self.model.heights);
            }
            Notification::EmptyState(state) => self.observer.on_empty_state(state),
            Notification::PostFailed { parent, error } => {
                self.observer.on_post_failed(parent, &error);
            }
        }
    }

    fn cancel_tick(&mut self) {
        if let Some(tick) = self.tick.take() {
            tick.abort();
        }
    }
}

fn deliver(tx: &WeakUnboundedSender<Message>, msg: Message) {
    let Some(tx) = tx.upgrade() else {
        debug!("screen gone; dropping {msg:?}");
        return;
    };
    if tx.send(msg).is_err() {
        debug!("screen stopped before completion arrived");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::comment::{Author, Comment, CommentBatch, PostedComment, ThreadProxy};
    use crate::error::TransportError;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Changed(ThreadChange, Vec<CommentId>),
        Heights(Vec<CommentId>),
        Empty(EmptyState),
        PostFailed,
    }

    struct Recorder(UnboundedSender<Event>);

    impl ThreadObserver for Recorder {
        fn on_thread_changed(&mut self, change: &ThreadChange, thread: &ThreadState) {
            let ids = thread.discussions().iter().map(|c| c.id).collect();
            let _ = self.0.send(Event::Changed(change.clone(), ids));
        }

        fn on_heights_changed(
            &mut self,
            changed: &BTreeSet<CommentId>,
            _heights: &HeightConvergenceLoop,
        ) {
            let _ = self.0.send(Event::Heights(changed.iter().copied().collect()));
        }

        fn on_empty_state(&mut self, state: EmptyState) {
            let _ = self.0.send(Event::Empty(state));
        }

        fn on_post_failed(&mut self, _parent: Option<CommentId>, _error: &str) {
            let _ = self.0.send(Event::PostFailed);
        }
    }

    /// In-memory source with a configurable proxy delay and failure switch.
    struct FakeSource {
        top_level: Vec<CommentId>,
        comments: HashMap<CommentId, Comment>,
        proxy_delay: Duration,
        fail_proxy: Mutex<bool>,
        proxy_calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(top_level: usize) -> Self {
            let top_level: Vec<CommentId> = (1..=top_level as CommentId).collect();
            let comments = top_level
                .iter()
                .map(|id| (*id, Comment::top_level(*id, 1, format!("comment {id}"), vec![])))
                .collect();
            Self {
                top_level,
                comments,
                proxy_delay: Duration::ZERO,
                fail_proxy: Mutex::new(false),
                proxy_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DiscussionSource for FakeSource {
        async fn fetch_thread_proxy(&self, proxy_id: &str) -> Result<ThreadProxy, TransportError> {
            self.proxy_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.proxy_delay).await;
            if *self.fail_proxy.lock().unwrap() {
                return Err(TransportError::Request("unreachable".to_string()));
            }
            Ok(ThreadProxy {
                id: proxy_id.to_string(),
                top_level_ids: self.top_level.clone(),
            })
        }

        async fn fetch_comments(&self, ids: &[CommentId]) -> Result<CommentBatch, TransportError> {
            Ok(CommentBatch {
                comments: ids
                    .iter()
                    .filter_map(|id| self.comments.get(id).cloned())
                    .collect(),
                authors: HashMap::new(),
            })
        }

        async fn post_comment(
            &self,
            _proxy_id: &str,
            parent: Option<CommentId>,
            body: &str,
        ) -> Result<PostedComment, TransportError> {
            let comment = match parent {
                Some(parent) => Comment::reply(500, parent, 2, body),
                None => Comment::top_level(500, 2, body, vec![]),
            };
            Ok(PostedComment {
                comment,
                author: Author {
                    id: 2,
                    first_name: "Me".to_string(),
                    last_name: String::new(),
                    avatar_url: None,
                },
            })
        }
    }

    fn start(
        source: Arc<FakeSource>,
    ) -> (ThreadScreenHandle, JoinHandle<()>, UnboundedReceiver<Event>) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let config = ThreadConfig {
            top_level_page_size: 2,
            ..ThreadConfig::default()
        };
        let (handle, task) = ThreadScreen::spawn("step-1", config, source, Recorder(events_tx));
        (handle, task, events)
    }

    async fn next_change(events: &mut UnboundedReceiver<Event>) -> (ThreadChange, Vec<CommentId>) {
        loop {
            match events.recv().await {
                Some(Event::Changed(change, ids)) => return (change, ids),
                Some(_) => {}
                None => panic!("screen stopped"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_reloads_fetch_proxy_once() {
        let mut source = FakeSource::new(3);
        source.proxy_delay = Duration::from_millis(100);
        let source = Arc::new(source);
        let (handle, _task, mut events) = start(Arc::clone(&source));

        handle.request_reload().unwrap();
        handle.request_reload().unwrap();

        let (change, ids) = next_change(&mut events).await;
        assert_eq!(change, ThreadChange::Reloaded);
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(source.proxy_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn paging_appends_until_exhausted() {
        let (handle, _task, mut events) = start(Arc::new(FakeSource::new(3)));

        handle.request_reload().unwrap();
        next_change(&mut events).await;

        handle.request_load_more_top_level().unwrap();
        let (change, ids) = next_change(&mut events).await;
        assert_eq!(change, ThreadChange::InsertedTopLevel(2..3));
        assert_eq!(ids, vec![1, 2, 3]);

        handle.post_comment(None, "hello").unwrap();
        let (change, ids) = next_change(&mut events).await;
        assert_eq!(change, ThreadChange::InsertedTopLevel(0..1));
        assert_eq!(ids[0], 500);
    }

    #[tokio::test(start_paused = true)]
    async fn row_height_freezes_and_polling_stops() {
        let (handle, _task, mut events) = start(Arc::new(FakeSource::new(1)));
        handle.request_reload().unwrap();
        next_change(&mut events).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        handle
            .register_row_for_height_tracking(1, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                120.0
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let heights: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e, Event::Heights(_)))
            .collect();
        assert_eq!(heights, vec![Event::Heights(vec![1])]);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_stops_ticks_and_closes_handle() {
        let (handle, task, mut events) = start(Arc::new(FakeSource::new(1)));
        handle.request_reload().unwrap();
        next_change(&mut events).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut height = 10.0;
        handle
            .register_row_for_height_tracking(1, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                height += 10.0;
                height
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(750)).await;
        let before = calls.load(Ordering::SeqCst);

        handle.teardown().unwrap();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(calls.load(Ordering::SeqCst), before);
        assert!(matches!(
            handle.request_reload(),
            Err(ThreadError::ScreenClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reload_shows_error_then_retries() {
        let source = Arc::new(FakeSource::new(2));
        *source.fail_proxy.lock().unwrap() = true;
        let (handle, _task, mut events) = start(Arc::clone(&source));

        handle.request_reload().unwrap();
        assert_eq!(events.recv().await, Some(Event::Empty(EmptyState::Error)));
        let (change, ids) = next_change(&mut events).await;
        assert_eq!(change, ThreadChange::Reloaded);
        assert!(ids.is_empty());

        *source.fail_proxy.lock().unwrap() = false;
        handle.request_reload().unwrap();
        let (change, ids) = next_change(&mut events).await;
        assert_eq!(change, ThreadChange::Reloaded);
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(source.proxy_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn posting_to_unknown_parent_is_reported() {
        struct Failing;

        #[async_trait]
        impl DiscussionSource for Failing {
            async fn fetch_thread_proxy(&self, _: &str) -> Result<ThreadProxy, TransportError> {
                Ok(ThreadProxy::default())
            }

            async fn fetch_comments(&self, _: &[CommentId]) -> Result<CommentBatch, TransportError> {
                Ok(CommentBatch::default())
            }

            async fn post_comment(
                &self,
                _: &str,
                _: Option<CommentId>,
                _: &str,
            ) -> Result<PostedComment, TransportError> {
                Err(TransportError::Request("parent not found".to_string()))
            }
        }

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (handle, _task) = ThreadScreen::spawn(
            "p",
            ThreadConfig::default(),
            Arc::new(Failing),
            Recorder(events_tx),
        );
        handle.post_comment(Some(9), "hi").unwrap();
        assert_eq!(events.recv().await, Some(Event::PostFailed));
    }
}
