//! Error taxonomy for the scoring pipeline.
//!
//! Every failure in the handling pipeline maps onto one of three variants.
//! Errors propagate uncaught to the consumer loop, the single catch point,
//! which logs them and withholds the offset commit so the bus redelivers.

use thiserror::Error;

/// Errors surfaced by the message handling pipeline.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The inbound event does not conform to the expected schema.
    #[error("invalid event: {0}")]
    Validation(String),

    /// An upstream REST call failed or returned an unexpected shape.
    #[error("upstream call failed: {0}")]
    Upstream(String),

    /// A domain precondition was violated while handling the event.
    #[error("{0}")]
    Processing(String),
}

impl ProcessorError {
    /// Upstream error carrying the response status and a truncated body
    /// snippet for log inspection.
    pub fn upstream_status(endpoint: &str, status: u16, body: &str) -> Self {
        Self::Upstream(format!(
            "{endpoint} returned status {status}: {}",
            body_snippet(body)
        ))
    }
}

impl From<reqwest::Error> for ProcessorError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

// Truncation counts characters, not bytes, so multi-byte responses cannot
// split a UTF-8 boundary.
fn body_snippet(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    if body.chars().count() > MAX_CHARS {
        let truncated: String = body.chars().take(MAX_CHARS).collect();
        format!("{truncated}...")
    } else {
        body.to_string()
    }
}
