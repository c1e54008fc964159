//! Best-effort parser for a JSON document that is still streaming in.
//!
//! The completion rules are pinned; the extractor depends on them:
//!
//! - an open string is closed at end of input, keeping the text seen so far;
//! - an open array or object is closed at end of input, keeping the elements
//!   and members completed so far;
//! - an object key with no complete value yet is dropped, as is a key that is
//!   itself truncated;
//! - a string escape cut off mid-sequence is dropped from the string;
//! - a literal (`true`/`false`/`null`) or number cut off at end of input is
//!   dropped, since further bytes could still extend it;
//! - an array whose input ends right after a `,` separator gains a trailing
//!   `null` placeholder: the separator proves the next element has started
//!   arriving, which is what tells a consumer the previous one is finished;
//! - input that is malformed, rather than merely truncated, yields no
//!   document at all.
//!
//! Lone `\u` surrogates decode to U+FFFD instead of failing; a streaming
//! producer can legitimately split a surrogate pair across chunks.

use serde_json::{Map, Value};

/// Parse as much of `input` as has arrived.
///
/// Returns `None` when the input is malformed or contains nothing usable yet.
#[must_use]
pub fn parse_partial(input: &str) -> Option<Value> {
    let mut scanner = Scanner::new(input);
    let part = scanner.value().ok()?;
    match part {
        Part::Complete(value) => {
            scanner.skip_whitespace();
            if scanner.at_end() { Some(value) } else { None }
        }
        Part::Truncated(value) => value,
    }
}

/// Outcome at one grammar position.
enum Part {
    Complete(Value),
    /// Input ended inside this value. `None` means nothing usable was seen.
    Truncated(Option<Value>),
}

/// Input that can never become valid JSON by appending bytes.
struct Malformed;

type ScanResult = Result<Part, Malformed>;

struct StringPart {
    text: String,
    complete: bool,
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    const fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if matches!(b, b' ' | b'\t' | b'\n' | b'\r') {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    const fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn value(&mut self) -> ScanResult {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(Part::Truncated(None)),
            Some(b'{') => self.object(),
            Some(b'[') => self.array(),
            Some(b'"') => Ok(match self.string()? {
                StringPart { text, complete: true } => Part::Complete(Value::String(text)),
                StringPart { text, complete: false } => {
                    Part::Truncated(Some(Value::String(text)))
                }
            }),
            Some(b't' | b'f' | b'n') => self.literal(),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(_) => Err(Malformed),
        }
    }

    fn object(&mut self) -> ScanResult {
        self.pos += 1;
        let mut map = Map::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Part::Complete(Value::Object(map)));
        }
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Part::Truncated(Some(Value::Object(map)))),
                Some(b'"') => {}
                Some(_) => return Err(Malformed),
            }
            let key = self.string()?;
            if !key.complete {
                return Ok(Part::Truncated(Some(Value::Object(map))));
            }
            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Part::Truncated(Some(Value::Object(map)))),
                Some(b':') => self.pos += 1,
                Some(_) => return Err(Malformed),
            }
            match self.value()? {
                Part::Complete(value) => {
                    map.insert(key.text, value);
                }
                Part::Truncated(value) => {
                    if let Some(value) = value {
                        map.insert(key.text, value);
                    }
                    return Ok(Part::Truncated(Some(Value::Object(map))));
                }
            }
            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Part::Truncated(Some(Value::Object(map)))),
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Part::Complete(Value::Object(map)));
                }
                Some(_) => return Err(Malformed),
            }
        }
    }

    fn array(&mut self) -> ScanResult {
        self.pos += 1;
        let mut items = Vec::new();
        self.skip_whitespace();
        match self.peek() {
            None => return Ok(Part::Truncated(Some(Value::Array(items)))),
            Some(b']') => {
                self.pos += 1;
                return Ok(Part::Complete(Value::Array(items)));
            }
            Some(_) => {}
        }
        loop {
            match self.value()? {
                Part::Complete(value) => items.push(value),
                Part::Truncated(value) => {
                    if let Some(value) = value {
                        items.push(value);
                    }
                    return Ok(Part::Truncated(Some(Value::Array(items))));
                }
            }
            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Part::Truncated(Some(Value::Array(items)))),
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    if self.at_end() {
                        // The separator proves a further element has started
                        // arriving; stand it in as null so a consumer can see
                        // the previous element is finished.
                        items.push(Value::Null);
                        return Ok(Part::Truncated(Some(Value::Array(items))));
                    }
                }
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Part::Complete(Value::Array(items)));
                }
                Some(_) => return Err(Malformed),
            }
        }
    }

    /// Parse a string starting at the opening quote.
    fn string(&mut self) -> Result<StringPart, Malformed> {
        self.pos += 1;
        let mut text = String::new();
        let mut run_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    push_run(&mut text, self.bytes, run_start, self.pos)?;
                    return Ok(StringPart { text, complete: false });
                }
                Some(b'"') => {
                    push_run(&mut text, self.bytes, run_start, self.pos)?;
                    self.pos += 1;
                    return Ok(StringPart { text, complete: true });
                }
                Some(b'\\') => {
                    push_run(&mut text, self.bytes, run_start, self.pos)?;
                    self.pos += 1;
                    match self.escape()? {
                        // Escape cut off by end of input: drop it.
                        None => return Ok(StringPart { text, complete: false }),
                        Some(c) => text.push(c),
                    }
                    run_start = self.pos;
                }
                Some(b) if b < 0x20 => return Err(Malformed),
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Decode one escape sequence after the backslash.
    ///
    /// `Ok(None)` means the input ended mid-escape.
    fn escape(&mut self) -> Result<Option<char>, Malformed> {
        let Some(b) = self.peek() else {
            return Ok(None);
        };
        self.pos += 1;
        let c = match b {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => return self.unicode_escape(),
            _ => return Err(Malformed),
        };
        Ok(Some(c))
    }

    fn unicode_escape(&mut self) -> Result<Option<char>, Malformed> {
        let Some(high) = self.hex4()? else {
            return Ok(None);
        };
        if !(0xD800..=0xDBFF).contains(&high) {
            return Ok(Some(
                char::from_u32(u32::from(high)).unwrap_or(char::REPLACEMENT_CHARACTER),
            ));
        }
        // High surrogate: needs a following \uXXXX low surrogate.
        let rollback = self.pos;
        if self.peek() == Some(b'\\') {
            self.pos += 1;
            if self.peek() == Some(b'u') {
                self.pos += 1;
                let Some(low) = self.hex4()? else {
                    return Ok(None);
                };
                if (0xDC00..=0xDFFF).contains(&low) {
                    let combined = 0x10000
                        + ((u32::from(high) - 0xD800) << 10)
                        + (u32::from(low) - 0xDC00);
                    return Ok(Some(
                        char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER),
                    ));
                }
                // Lone surrogate followed by an unrelated escape: replace it
                // and re-scan the second escape on the next call.
            }
        }
        if self.at_end() {
            // The pair may still arrive.
            return Ok(None);
        }
        self.pos = rollback;
        Ok(Some(char::REPLACEMENT_CHARACTER))
    }

    fn hex4(&mut self) -> Result<Option<u16>, Malformed> {
        let mut out: u16 = 0;
        for _ in 0..4 {
            let Some(b) = self.peek() else {
                return Ok(None);
            };
            let digit = match b {
                b'0'..=b'9' => b - b'0',
                b'a'..=b'f' => b - b'a' + 10,
                b'A'..=b'F' => b - b'A' + 10,
                _ => return Err(Malformed),
            };
            out = (out << 4) | u16::from(digit);
            self.pos += 1;
        }
        Ok(Some(out))
    }

    fn literal(&mut self) -> ScanResult {
        let (word, value) = match self.peek() {
            Some(b't') => ("true", Value::Bool(true)),
            Some(b'f') => ("false", Value::Bool(false)),
            _ => ("null", Value::Null),
        };
        for (i, expected) in word.bytes().enumerate() {
            match self.bytes.get(self.pos + i) {
                None => return Ok(Part::Truncated(None)),
                Some(&b) if b == expected => {}
                Some(_) => return Err(Malformed),
            }
        }
        self.pos += word.len();
        Ok(Part::Complete(value))
    }

    fn number(&mut self) -> ScanResult {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.at_end() {
            // More digits (or an exponent) could still arrive.
            return Ok(Part::Truncated(None));
        }
        let run = std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| Malformed)?;
        serde_json::from_str::<serde_json::Number>(run)
            .map(|n| Part::Complete(Value::Number(n)))
            .map_err(|_| Malformed)
    }
}

/// Append the raw byte run `[start, end)` to `text`.
///
/// Runs are cut only at ASCII delimiters of a valid UTF-8 input, so the slice
/// is always valid UTF-8.
fn push_run(text: &mut String, bytes: &[u8], start: usize, end: usize) -> Result<(), Malformed> {
    if start == end {
        return Ok(());
    }
    let run = std::str::from_utf8(&bytes[start..end]).map_err(|_| Malformed)?;
    text.push_str(run);
    Ok(())
}
