//! Incremental extraction of change events from streamed completion output.
//!
//! `SseDecoder` splits raw stream text into provider frames; `EventExtractor`
//! turns the accumulated payload into change events as soon as each one is
//! provably complete. The two compose but do not depend on each other.

mod extractor;
pub mod partial;
mod sse;

pub use extractor::EventExtractor;
pub use sse::{DONE_SENTINEL, SseDecoder, SseFrame};
