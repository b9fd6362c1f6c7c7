//! Resilient JSON-lines streaming from long-lived subprocesses
//!
//! This module decodes a process's stdout into structured messages as they
//! complete, while concurrently draining stderr so neither pipe can stall the
//! child, and decides at exit whether the run failed.
//!
//! - [`chunks`] turns a raw pipe into UTF-8 text fragments
//! - [`decoder`] accumulates fragments into JSON messages
//! - [`drain`] collects stderr on its own task
//! - [`exit`] correlates the exit status with the collected diagnostics
//! - [`controller`] composes all of the above into a [`MessageStream`]

pub mod chunks;
pub mod controller;
pub mod decoder;
pub mod drain;
pub mod error;
pub mod exit;
pub mod types;


pub use chunks::{chunk_stream, Utf8Decoder};
pub use controller::{DecoderController, MessageStream};
pub use decoder::{decode_stream, IncrementalLineJsonDecoder};
pub use drain::{DiagnosticLog, StderrDrain};
pub use error::StreamError;
pub use exit::ExitCorrelator;
pub use types::{DecoderState, StreamSource, StreamingConfig};
