//! Error code registry shared by the subprocess and streaming layers.
//!
//! Library errors are plain `thiserror` enums (`ProcessError`, `StreamError`);
//! each of them maps onto a stable numeric code from [`ErrorCode`] so the
//! command line can print `[E####]` prefixed messages.

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// Format a message with its error code prefix, e.g. `[E4003] Subprocess failed`.
pub fn format_with_code(code: u16, message: impl std::fmt::Display) -> String {
    format!("[E{code:04}] {message}")
}
