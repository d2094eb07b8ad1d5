//! Domain models persisted by the stream gateway.

pub mod cursor;
pub mod stream;
