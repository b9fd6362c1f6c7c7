//! # Siphon
//!
//! Streams newline-delimited JSON messages out of a long-lived subprocess while
//! it runs, drains its stderr so the child never blocks, and reports a failed
//! run once the process has exited.
//!
//! ## Usage
//!
//! ```bash
//! siphon run -- my-agent --output-format stream-json
//! siphon decode transcript.jsonl
//! ```
//!
//! ## Modules
//!
//! - `config` - Configuration file and environment overrides
//! - `error` - Error code registry shared by all error types
//! - `subprocess` - Process spawning, test doubles and the streaming decoder
pub mod config;
pub mod error;
pub mod subprocess;
