use serde_json::Value;

use super::partial;
use crate::protocol::ChangeEvent;

/// Field of the streamed document that holds the change events.
const EVENTS_FIELD: &str = "events";

/// Incrementally extracts completed change events from a streamed JSON
/// document of the form `{"events": [...]}`.
///
/// An array element is provably finished only once a later sibling has started
/// arriving, or once the stream itself ends. `feed` emits every element proven
/// finished by the bytes so far, exactly once and in index order; the trailing
/// element is held back until `finish` confirms it.
///
/// Malformed or not-yet-parseable input is never an error at this layer: the
/// extractor simply waits for more bytes. A stream that never produces a valid
/// document yields zero events.
#[derive(Debug, Default)]
pub struct EventExtractor {
    buffer: String,
    cursor: usize,
    pending: Option<ChangeEvent>,
}

impl EventExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next array slot to be confirmed and emitted.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Everything received so far.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Append a chunk and return the events it proved complete, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<ChangeEvent> {
        self.buffer.push_str(chunk);

        let Some(document) = partial::parse_partial(&self.buffer) else {
            return Vec::new();
        };
        let Some(events) = document.get(EVENTS_FIELD).and_then(Value::as_array) else {
            return Vec::new();
        };

        // The tail is re-derived from the full buffer on every call; a hold
        // from a previous call is stale the moment we can see the array again.
        self.pending = None;

        let mut emitted = Vec::new();
        while let Some(slot) = events.get(self.cursor) {
            let Ok(event) = serde_json::from_value::<ChangeEvent>(slot.clone()) else {
                // Not valid yet. Later indices must wait too: order is strict.
                tracing::trace!(index = self.cursor, "event slot not yet complete");
                break;
            };
            if self.cursor + 1 < events.len() {
                // A later sibling exists, so this element can no longer grow.
                self.cursor += 1;
                emitted.push(event);
            } else {
                self.pending = Some(event);
                break;
            }
        }
        emitted
    }

    /// Signal end of stream and flush the tentative trailing event, if any.
    pub fn finish(&mut self) -> Vec<ChangeEvent> {
        match self.pending.take() {
            Some(event) => {
                self.cursor += 1;
                vec![event]
            }
            None => Vec::new(),
        }
    }

    /// Clear all state so the extractor can consume a new stream.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.pending = None;
    }
}
