//! Framing for `text/event-stream` responses.
//!
//! Providers deliver completion tokens as server-sent events: `data: ` lines
//! terminated by a blank line, with a literal `[DONE]` payload marking the end
//! of the stream. The decoder splits decoded text into those payloads; what
//! the payloads mean is the extractor's business.

/// Sentinel payload that terminates a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded frame from the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload of one `data:` event.
    Data(String),
    /// The `[DONE]` sentinel; the caller should call `finish` on its extractor.
    Done,
}

/// Incremental decoder for server-sent-event framing.
///
/// Feed it decoded text in arbitrary chunks; it buffers partial lines and
/// yields a frame per completed event. Line endings are normalized to LF on
/// ingest, so events terminated by `\r\n\r\n` or a mix of endings all frame
/// the same way.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of stream text and return the frames it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseFrame> {
        // A CRLF may be split across chunks; the CR is sitting in the buffer.
        if self.buffer.ends_with('\r') && chunk.starts_with('\n') {
            self.buffer.pop();
        }
        self.buffer.push_str(&chunk.replace("\r\n", "\n"));

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let event = self.buffer[..end].to_string();
            self.buffer.drain(..end + 2);
            if let Some(frame) = decode_event(&event) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Unconsumed text still waiting for its blank-line terminator.
    #[must_use]
    pub fn remainder(&self) -> &str {
        &self.buffer
    }
}

/// Decode one blank-line-terminated event into a frame.
///
/// Multiple `data:` lines within one event are joined with newlines, per the
/// event-stream format. Comment lines (`:`) and unknown fields are skipped.
fn decode_event(event: &str) -> Option<SseFrame> {
    let mut data: Option<String> = None;
    for line in event.lines() {
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        match &mut data {
            None => data = Some(payload.to_string()),
            Some(acc) => {
                acc.push('\n');
                acc.push_str(payload);
            }
        }
    }
    let data = data?;
    if data == DONE_SENTINEL {
        Some(SseFrame::Done)
    } else {
        Some(SseFrame::Data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event_decodes() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed("data: {\"a\":1}\n\n");
        assert_eq!(frames, vec![SseFrame::Data("{\"a\":1}".to_string())]);
        assert!(decoder.remainder().is_empty());
    }

    #[test]
    fn split_event_waits_for_terminator() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed("data: {\"a\"").is_empty());
        assert!(decoder.feed(":1}\n").is_empty());
        let frames = decoder.feed("\ndata: [DONE]\n\n");
        assert_eq!(
            frames,
            vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Done]
        );
    }

    #[test]
    fn crlf_framing_decodes() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed("data: x\r\n\r\ndata: [DONE]\r\n\r\n");
        assert_eq!(frames, vec![SseFrame::Data("x".to_string()), SseFrame::Done]);
    }

    #[test]
    fn mixed_line_endings_terminate_an_event() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed("data: x\n\r\n");
        assert_eq!(frames, vec![SseFrame::Data("x".to_string())]);
        let frames = decoder.feed("data: y\r\n\n");
        assert_eq!(frames, vec![SseFrame::Data("y".to_string())]);
    }

    #[test]
    fn crlf_split_across_chunks_still_terminates() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed("data: x\r\n\r").is_empty());
        let frames = decoder.feed("\n");
        assert_eq!(frames, vec![SseFrame::Data("x".to_string())]);
        assert!(decoder.remainder().is_empty());
    }

    #[test]
    fn comments_and_unknown_fields_are_skipped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(": keep-alive\nevent: completion\ndata: y\n\n");
        assert_eq!(frames, vec![SseFrame::Data("y".to_string())]);
    }

    #[test]
    fn multiple_data_lines_join_with_newline() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed("data: one\ndata: two\n\n");
        assert_eq!(frames, vec![SseFrame::Data("one\ntwo".to_string())]);
    }

    #[test]
    fn event_without_data_yields_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(": ping\n\n").is_empty());
    }
}
