//! Command message framing.
//!
//! Wire format, one level deep:
//! ```text
//! {"TOKEN":value,"TOKEN":value,...}
//! ```
//! Values are unquoted numbers, or empty for trigger commands (`{"SHOW":}`).
//! Bytes outside braces are ignored, so messages can be embedded in other
//! console traffic.

use log::debug;

use crate::codec::{self, Value};
use crate::error::LinkError;

const OPEN: u8 = b'{';
const CLOSE: u8 = b'}';
const QUOTE: u8 = b'"';
const COLON: u8 = b':';
const COMMA: u8 = b',';

/// Longest message accepted, counted from the byte after `{`.
pub const MAX_MESSAGE_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for `{`.
    Idle,
    /// Between pairs.
    Scanning,
    InToken,
    ExpectColon,
    InValue,
    /// Dropping a broken message up to its `}`.
    Discarding,
}

/// Output of [`CommandParser::feed`].
#[derive(Debug)]
pub enum ParseEvent {
    /// A complete `"token":value` pair. `last` is set when the pair was
    /// closed by `}`.
    Pair { token: String, raw: String, last: bool },
    /// A message closed with no pending pair (`{}` or a trailing comma).
    End,
    /// The current message was abandoned.
    Error(LinkError),
}

/// Incremental recogniser for one transport's byte stream.
///
/// Feed bytes one at a time; the parser never blocks and never buffers more
/// than [`MAX_MESSAGE_LEN`] bytes.
#[derive(Debug)]
pub struct CommandParser {
    state: State,
    token: String,
    value: String,
    len: usize,
    limit: usize,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::with_limit(MAX_MESSAGE_LEN)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: State::Idle,
            token: String::new(),
            value: String::new(),
            len: 0,
            limit,
        }
    }

    /// True while a message is open.
    pub fn in_message(&self) -> bool {
        self.state != State::Idle
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.token.clear();
        self.value.clear();
        self.len = 0;
    }

    /// Advance the state machine by one byte.
    pub fn feed(&mut self, byte: u8) -> Option<ParseEvent> {
        if self.state == State::Idle {
            if byte == OPEN {
                self.state = State::Scanning;
                self.len = 0;
            }
            return None;
        }

        self.len += 1;
        if self.len > self.limit {
            debug!("message abandoned after {} bytes", self.limit);
            self.reset();
            return Some(ParseEvent::Error(LinkError::MessageTooLong { limit: self.limit }));
        }

        match self.state {
            State::Idle => None,
            State::Scanning => match byte {
                CLOSE => {
                    self.reset();
                    Some(ParseEvent::End)
                }
                QUOTE | COMMA => None,
                b if b.is_ascii_whitespace() => None,
                b if b.is_ascii_alphabetic() => {
                    self.token.clear();
                    self.token.push(b as char);
                    self.state = State::InToken;
                    None
                }
                other => self.malformed(other, "a token"),
            },
            State::InToken => match byte {
                QUOTE => {
                    self.state = State::ExpectColon;
                    None
                }
                CLOSE => {
                    self.reset();
                    Some(ParseEvent::Error(LinkError::MalformedMessage {
                        got: '}',
                        expected: "a closing quote",
                    }))
                }
                b => {
                    self.token.push(b as char);
                    None
                }
            },
            State::ExpectColon => match byte {
                COLON => {
                    self.value.clear();
                    self.state = State::InValue;
                    None
                }
                b if b.is_ascii_whitespace() => None,
                CLOSE => {
                    self.reset();
                    Some(ParseEvent::Error(LinkError::MalformedMessage {
                        got: '}',
                        expected: "':'",
                    }))
                }
                other => self.malformed(other, "':'"),
            },
            State::InValue => match byte {
                COMMA => {
                    self.state = State::Scanning;
                    Some(self.take_pair(false))
                }
                CLOSE => {
                    let pair = self.take_pair(true);
                    self.reset();
                    Some(pair)
                }
                b => {
                    self.value.push(b as char);
                    None
                }
            },
            State::Discarding => {
                if byte == CLOSE {
                    self.reset();
                }
                None
            }
        }
    }

    fn take_pair(&mut self, last: bool) -> ParseEvent {
        ParseEvent::Pair {
            token: std::mem::take(&mut self.token),
            raw: std::mem::take(&mut self.value),
            last,
        }
    }

    /// Structural violation: drop the rest of the message up to `}`.
    fn malformed(&mut self, got: u8, expected: &'static str) -> Option<ParseEvent> {
        self.token.clear();
        self.value.clear();
        self.state = State::Discarding;
        Some(ParseEvent::Error(LinkError::MalformedMessage {
            got: got as char,
            expected,
        }))
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds messages in the same framing [`CommandParser`] accepts.
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: String,
    pairs: usize,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one `"token":value` pair.
    pub fn pair(&mut self, token: &str, value: Value) -> &mut Self {
        self.key(token);
        codec::write_value(&mut self.buf, value);
        self
    }

    /// Append an unsigned counter, which may exceed the 16-bit value range.
    pub fn count(&mut self, token: &str, n: u32) -> &mut Self {
        self.key(token);
        self.buf.push_str(&n.to_string());
        self
    }

    fn key(&mut self, token: &str) {
        self.buf.push(if self.pairs == 0 { '{' } else { ',' });
        self.buf.push('"');
        self.buf.push_str(token);
        self.buf.push_str("\":");
        self.pairs += 1;
    }

    /// Close the message. An empty writer yields `{}`.
    pub fn finish(&mut self) -> String {
        if self.pairs == 0 {
            self.buf.push('{');
        }
        self.buf.push('}');
        self.pairs = 0;
        std::mem::take(&mut self.buf)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
