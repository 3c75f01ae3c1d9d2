//! Error taxonomy for the discussion engine.
//!
//! Omitted items and replies to unknown parents are not errors; the merger
//! absorbs both.

use thiserror::Error;

/// A collaborator call failed as a whole.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum ThreadError {
    #[error("thread screen is closed")]
    ScreenClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_failures_become_database_errors() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: TransportError = conn.execute("SELECT * FROM nowhere", []).unwrap_err().into();

        assert!(matches!(err, TransportError::Database(_)));
        assert!(err.to_string().starts_with("database error: "));
    }
}
