//! CLI output: error mapping from domain errors to the CLI surface.

use crate::error::{ApiError, FetchError};

/// Map errors to a single line for stderr.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Fetch(FetchError::HostDown) => {
            "Host powered off during the fetch; nothing was merged".to_string()
        }
        ApiError::Fetch(FetchError::Transport(t)) => {
            format!("Capture has no answer for a request ({})", t)
        }
        other => other.to_string(),
    }
}
