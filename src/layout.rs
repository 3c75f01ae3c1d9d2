//! Row and footer heights for the thread list.
//!
//! A row uses its frozen height once known, the latest sample while it is
//! still converging, and a text estimate before its first sample.

use crate::comment::{Comment, CommentId};
use crate::heights::HeightConvergenceLoop;
use crate::merge::ThreadState;
use crate::text::{plain_text, wrapped_line_count};

// --- Footers and placeholders ---

/// Footer under a thread (or the list) offering "show more".
pub const LOAD_MORE_FOOTER_HEIGHT: f64 = 50.0;
/// Plain gap closing a thread with nothing more to load.
pub const SECTION_GAP_HEIGHT: f64 = 10.0;
/// Height of a row whose comment is not available.
pub const PLACEHOLDER_ROW_HEIGHT: f64 = 0.5;

// --- Comment row estimate ---

pub const ROW_HEADER_HEIGHT: f64 = 24.0;
pub const ROW_V_PADDING: f64 = 8.0;
pub const TEXT_LINE_HEIGHT: f64 = 17.0;
/// Average glyph width used to turn a row width into characters per line.
pub const AVERAGE_CHAR_WIDTH: f64 = 7.5;
/// Reply rows are indented under their thread.
pub const REPLY_INDENT: f64 = 24.0;
pub const AVATAR_COLUMN_WIDTH: f64 = 48.0;

/// Characters per line available to comment text in a row of `row_width`.
#[must_use]
pub fn text_columns(comment: &Comment, row_width: f64) -> usize {
    let indent = if comment.is_reply() { REPLY_INDENT } else { 0.0 };
    let text_width = (row_width - AVATAR_COLUMN_WIDTH - indent).max(AVERAGE_CHAR_WIDTH);
    (text_width / AVERAGE_CHAR_WIDTH).floor() as usize
}

/// Height guess for a row that has not been sampled yet.
#[must_use]
pub fn estimate_comment_height(comment: &Comment, row_width: f64) -> f64 {
    let lines = wrapped_line_count(&plain_text(&comment.text), text_columns(comment, row_width));
    ROW_HEADER_HEIGHT + ROW_V_PADDING * 2.0 + TEXT_LINE_HEIGHT * lines.max(1) as f64
}

/// Height to lay out `comment` with.
#[must_use]
pub fn row_height(heights: &HeightConvergenceLoop, comment: &Comment, row_width: f64) -> f64 {
    heights
        .height(comment.id)
        .unwrap_or_else(|| estimate_comment_height(comment, row_width))
}

/// Height of the header row of thread `section`.
#[must_use]
pub fn thread_header_height(
    thread: &ThreadState,
    heights: &HeightConvergenceLoop,
    section: usize,
    row_width: f64,
) -> f64 {
    thread
        .discussions()
        .get(section)
        .map_or(PLACEHOLDER_ROW_HEIGHT, |comment| row_height(heights, comment, row_width))
}

/// Height of reply `row` under `parent`.
#[must_use]
pub fn reply_row_height(
    thread: &ThreadState,
    heights: &HeightConvergenceLoop,
    parent: CommentId,
    row: usize,
    row_width: f64,
) -> f64 {
    thread
        .replies(parent)
        .get(row)
        .map_or(PLACEHOLDER_ROW_HEIGHT, |reply| row_height(heights, reply, row_width))
}

#[must_use]
pub const fn footer_height(has_more: bool) -> f64 {
    if has_more {
        LOAD_MORE_FOOTER_HEIGHT
    } else {
        SECTION_GAP_HEIGHT
    }
}
