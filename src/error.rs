//! Error types for the host PDR exchange.

use crate::types::{CompletionCode, Entity, RecordHandle, SensorEntry};
use thiserror::Error;

/// Decode errors for a single PDR record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PdrError {
    #[error("Record too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("Length mismatch: header declares {declared} body bytes, record carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Unexpected PDR type: expected {expected}, got {actual}")]
    UnexpectedType { expected: u8, actual: u8 },

    #[error("Child count {declared} does not fit record body of {body_len} bytes")]
    ChildCountMismatch { declared: usize, body_len: usize },

    #[error("Malformed possible states for composite sensor {index}")]
    MalformedPossibleStates { index: usize },

    #[error("Malformed FRU record table at offset {offset}")]
    MalformedFruTable { offset: usize },

    #[error("Record handle space exhausted")]
    HandleExhausted,

    #[error("Container id space exhausted")]
    ContainerIdsExhausted,
}

/// Failures surfaced by the request/response transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Failed to send request: {0}")]
    SendFailed(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Endpoint {0} unreachable")]
    Unreachable(u8),
}

/// Reasons a fetch cycle aborts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("GetPDR for record {record_handle} failed with completion code {code}")]
    CompletionCode {
        record_handle: RecordHandle,
        code: CompletionCode,
    },

    #[error("Host went down during the fetch cycle")]
    HostDown,

    #[error("Response received while no page was awaited")]
    UnexpectedResponse,

    #[error("Repository rejected record: {0}")]
    Repository(#[from] PdrError),
}

/// Lookup misses reported to callers as typed outcomes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Sensor not found: {0}")]
    SensorNotFound(SensorEntry),

    #[error("No FRU record set owns entity {0}")]
    FruRecordNotFound(Entity),
}

/// Errors of the ambient layer: configuration, logging, service plumbing
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Service stopped")]
    ServiceStopped,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Decode error: {0}")]
    Decode(#[from] PdrError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
