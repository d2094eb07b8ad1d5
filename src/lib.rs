#![forbid(unsafe_code)]

//! Pull-based PIX outgoing message stream gateway.
//!
//! A participant (identified by its 8-digit ISPB code) repeatedly calls the
//! stream endpoint to drain queued payment messages. Concurrency is bounded
//! by a per-participant thread-slot semaphore, and continuation is stateless:
//! every delivered batch carries an opaque HMAC-signed token the participant
//! presents on the next call.

pub mod batch;
pub mod config;
pub mod cursor;
pub mod errors;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod slots;
pub mod token;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
