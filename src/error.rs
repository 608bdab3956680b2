//! ==============================================================================
//! error.rs - typed errors returned to the immediate caller
//! ==============================================================================
//!
//! arbiter timeouts are NOT errors (see arbiter::TimedOut); these cover the
//! unexpected cases: the sqlite backend failing and the serial stream dying.
//!
//! ==============================================================================

use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// the blocking task running the store operation panicked or was cancelled
    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Serial read error: {0}")]
    Read(#[from] std::io::Error),

    #[error("Serial stream closed")]
    Closed,
}
