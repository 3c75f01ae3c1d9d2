//! Thread screen state model

use std::collections::HashSet;

use crate::command::EmptyState;
use crate::comment::CommentId;
use crate::config::ThreadConfig;
use crate::heights::{HeightConvergenceLoop, HeightPolicy};
use crate::merge::ThreadState;

/// Everything one discussion screen owns.
///
/// Only [`update`](crate::update::update) mutates it, always from the
/// screen's own task.
#[derive(Debug)]
pub struct ThreadModel {
    pub config: ThreadConfig,
    /// Discussion proxy this screen shows
    pub proxy_id: String,
    pub thread: ThreadState,
    pub heights: HeightConvergenceLoop,
    /// Bumped by reload and teardown; completions from older generations are dropped
    pub generation: u64,
    /// Reentrancy guard for reload
    pub is_reloading: bool,
    /// A top-level page is in flight
    pub pending_top_level: bool,
    /// Parents with a reply page in flight
    pub pending_replies: HashSet<CommentId>,
    pub empty_state: EmptyState,
    pub torn_down: bool,
}

impl ThreadModel {
    #[must_use]
    pub fn new(proxy_id: impl Into<String>, config: ThreadConfig) -> Self {
        let heights = HeightConvergenceLoop::new(HeightPolicy::from(&config));
        Self {
            config,
            proxy_id: proxy_id.into(),
            thread: ThreadState::new(),
            heights,
            generation: 0,
            is_reloading: false,
            pending_top_level: false,
            pending_replies: HashSet::new(),
            empty_state: EmptyState::None,
            torn_down: false,
        }
    }

    #[must_use]
    pub const fn is_current(&self, generation: u64) -> bool {
        !self.torn_down && generation == self.generation
    }

    /// Discard thread and height state and start a new generation.
    pub fn reset(&mut self) {
        self.thread.reset();
        self.heights.reset();
        self.pending_top_level = false;
        self.pending_replies.clear();
        self.generation += 1;
    }

    /// Empty state implied by the current thread contents.
    #[must_use]
    pub fn settled_empty_state(&self) -> EmptyState {
        if self.thread.is_empty() {
            EmptyState::Empty
        } else {
            EmptyState::None
        }
    }
}
