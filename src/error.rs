//! Error types for the aging driver

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    #[error("Missing log property: {0}")]
    MissingProperty(String),

    #[error("Truncated {section} section: need {expected} more bytes, {available} available")]
    TruncatedLog {
        section: &'static str,
        expected: usize,
        available: usize,
    },

    #[error("SUT error: {0}")]
    Sut(String),

    #[error("Edge ({edge_source}, {destination}) refused by the SUT after {attempts} attempts")]
    RetryLimit {
        edge_source: u64,
        destination: u64,
        attempts: u32,
    },

    #[error("Another experiment is already registered for interruption")]
    InterruptBusy,
}
