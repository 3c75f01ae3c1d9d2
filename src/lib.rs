//! discussion-thread - threaded discussion pagination and row-height convergence
//!
//! Uses Elm Architecture (Model/Message/Update) with a single tokio task owning
//! all thread state.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::too_many_lines)]

pub mod command;
pub mod comment;
pub mod config;
pub mod db;
pub mod error;
pub mod heights;
pub mod index;
pub mod layout;
pub mod merge;
pub mod message;
pub mod model;
pub mod runtime;
pub mod source;
pub mod text;
pub mod update;

pub use command::{Command, EmptyState, Notification, ThreadChange};
pub use comment::{Author, Comment, CommentBatch, CommentId, CommentKind, PostedComment, ThreadProxy, UserId};
pub use config::ThreadConfig;
pub use db::Db;
pub use error::{ThreadError, TransportError};
pub use heights::{HeightConvergenceLoop, HeightPolicy, HeightSampler, HeightTracker, RowState};
pub use index::{PageRequest, ReplyIndex, ThreadIndex};
pub use merge::{MergeOutcome, ThreadState};
pub use message::Message;
pub use model::ThreadModel;
pub use runtime::{ThreadObserver, ThreadScreen, ThreadScreenHandle};
pub use source::DiscussionSource;
pub use update::update;
