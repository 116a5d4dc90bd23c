use anyhow::Result;
use reqwest::Response;
use std::time::Duration;

use crate::core::error::FetchError;

// The fund endpoints reject unknown clients; send a browser agent.
pub const USER_AGENT: &str = "Mozilla/5.0";

/// Builds the long-lived client an adapter reuses across fetches. The
/// timeout bounds every call; a slow upstream becomes a failure, not a
/// hang.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Maps a transport-level reqwest error onto the fetch taxonomy.
pub fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_decode() {
        FetchError::Parse(err.to_string())
    } else if let Some(status) = err.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Rejects non-success responses before any body read.
pub fn expect_success(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::Status(status.as_u16()))
    }
}
