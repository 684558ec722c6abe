//! Error classification and retry scheduling.
//!
//! Every remote failure is classified by inspecting its message, then mapped
//! to a scheduling decision. Classification is string-based and deliberately
//! conservative: when uncertain, the error is OTHER. The substring tables
//! live here, in one place, so the processor and the tests exercise the same
//! classifier.

use rand::Rng;
use std::time::Duration;

/// Backoff schedule in seconds; retries index into it.
pub const RETRY_DELAYS_SEC: [u64; 11] = [
    1, 4, 16, 64, 256, 1024, 4096, 16384, 65536, 262144, 604800,
];

/// Network retries cap their schedule index here (256 s) and their
/// `n_retries` at the index + 1.
pub const NETWORK_RETRY_CAP_INDEX: usize = 4;

/// Reupload attempts before falling back to delete-then-recreate.
pub const REUPLOAD_MAX_ATTEMPTS: i64 = 4;

/// Missing-local-file failures allowed before blocking.
pub const LOCAL_NOT_FOUND_MAX_ATTEMPTS: i64 = 3;

/// Unclassified failures allowed before blocking.
pub const OTHER_MAX_ATTEMPTS: i64 = RETRY_DELAYS_SEC.len() as i64;

/// Fixed delay for reupload retries (seconds).
const REUPLOAD_DELAY_SEC: u64 = 256;

const NETWORK_MARKERS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "etimedout",
    "enotfound",
    "eai_again",
    "enetunreach",
    "ehostunreach",
    "socket hang up",
    "network",
    "timeout",
    "connection",
];

const REUPLOAD_MARKER: &str = "draft revision already exists";

const LOCAL_NOT_FOUND_MARKERS: &[&str] = &["enoent", "no such file or directory"];

const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "authentication failed",
    "session expired",
    "invalid access token",
    "401",
    "403",
];

/// Failure class, driving the retry policy and surfaced to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Network,
    ReuploadNeeded,
    LocalNotFound,
    Auth,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::ReuploadNeeded => "REUPLOAD_NEEDED",
            ErrorCategory::LocalNotFound => "LOCAL_NOT_FOUND",
            ErrorCategory::Auth => "AUTH",
            ErrorCategory::Other => "OTHER",
        }
    }
}

/// Classify an error message, case-insensitively.
///
/// Order matters: the reupload marker is the most specific; AUTH and NETWORK
/// come before LOCAL_NOT_FOUND so DNS `ENOTFOUND` never reads as a missing
/// local file.
pub fn classify_error(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains(REUPLOAD_MARKER) {
        return ErrorCategory::ReuploadNeeded;
    }
    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorCategory::Auth;
    }
    if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorCategory::Network;
    }
    if LOCAL_NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorCategory::LocalNotFound;
    }
    ErrorCategory::Other
}

/// What the queue should do with a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to PENDING with the given delay and updated retry count.
    Retry { delay: Duration, n_retries: i64 },
    /// Terminal; surfaced to the operator.
    Block,
    /// Reupload attempts exhausted: the worker should delete the remote
    /// node and recreate it.
    Reupload,
}

/// Map `(category, n_retries)` to a decision, jitter applied.
pub fn decide(category: ErrorCategory, n_retries: i64) -> RetryDecision {
    match category {
        ErrorCategory::Network => {
            let index = (n_retries as usize).min(NETWORK_RETRY_CAP_INDEX);
            RetryDecision::Retry {
                delay: jittered_delay(RETRY_DELAYS_SEC[index]),
                // Clamped so the schedule index stays capped forever (P7).
                n_retries: (n_retries + 1).min(NETWORK_RETRY_CAP_INDEX as i64 + 1),
            }
        }
        ErrorCategory::ReuploadNeeded => {
            if n_retries + 1 >= REUPLOAD_MAX_ATTEMPTS {
                RetryDecision::Reupload
            } else {
                // Fixed delay; n_retries only counts attempts here.
                RetryDecision::Retry {
                    delay: jittered_delay(REUPLOAD_DELAY_SEC),
                    n_retries: n_retries + 1,
                }
            }
        }
        ErrorCategory::LocalNotFound => {
            if n_retries + 1 >= LOCAL_NOT_FOUND_MAX_ATTEMPTS {
                RetryDecision::Block
            } else {
                RetryDecision::Retry {
                    delay: backoff_delay(n_retries),
                    n_retries: n_retries + 1,
                }
            }
        }
        ErrorCategory::Auth => RetryDecision::Block,
        ErrorCategory::Other => {
            if n_retries + 1 >= OTHER_MAX_ATTEMPTS {
                RetryDecision::Block
            } else {
                RetryDecision::Retry {
                    delay: backoff_delay(n_retries),
                    n_retries: n_retries + 1,
                }
            }
        }
    }
}

/// Standard backoff: schedule index `min(n, last)`, jittered.
fn backoff_delay(n_retries: i64) -> Duration {
    let index = (n_retries.max(0) as usize).min(RETRY_DELAYS_SEC.len() - 1);
    jittered_delay(RETRY_DELAYS_SEC[index])
}

/// `base ± 25 %`, clamped to at least one second.
pub fn jittered_delay(base_sec: u64) -> Duration {
    let mut rng = rand::rng();
    let jitter: f64 = rng.random_range(-1.0..=1.0);
    let secs = base_sec as f64 * (1.0 + 0.25 * jitter);
    Duration::from_secs_f64(secs.max(1.0))
}

/// Fixed reupload delay, exposed for the worker's recreate-failed reschedule.
pub fn reupload_delay() -> Duration {
    jittered_delay(REUPLOAD_DELAY_SEC)
}
