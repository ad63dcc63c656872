//! Tagged values carried through a channel.
//!
//! A [`Message`] is one of three kinds: an owned byte string, a double, or a
//! boolean. Text payloads are arbitrary bytes; embedded zero bytes are kept and
//! the length is always the buffer length.
//!
//! Ownership moves with the value: the sender gives it up on a successful
//! send, and the receiver that dequeues it is its only owner afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An immutable value sent through a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Owned byte string (not necessarily UTF-8, may contain `\0`).
    Text(Box<[u8]>),
    /// Double-precision number.
    Number(f64),
    /// Boolean flag.
    Boolean(bool),
}

/// Discriminant of a [`Message`], for diagnostics and host-side dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Number,
    Boolean,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

impl Message {
    /// Creates a text message by copying `bytes`.
    #[must_use]
    pub fn text(bytes: impl AsRef<[u8]>) -> Self {
        Self::Text(bytes.as_ref().into())
    }

    /// Returns the kind of this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Text(_) => MessageKind::Text,
            Self::Number(_) => MessageKind::Number,
            Self::Boolean(_) => MessageKind::Boolean,
        }
    }

    /// Raw bytes of a text message.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Text payload as `&str`, if it is a text message holding valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Consumes the message, returning the text buffer.
    ///
    /// # Errors
    ///
    /// Returns `Err(self)` if this is not a text message.
    pub fn into_bytes(self) -> Result<Box<[u8]>, Self> {
        match self {
            Self::Text(bytes) => Ok(bytes),
            other => Err(other),
        }
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::Text(s.into_bytes().into_boxed_slice())
    }
}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Self::text(bytes)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Text(bytes.into_boxed_slice())
    }
}

impl From<Box<[u8]>> for Message {
    fn from(bytes: Box<[u8]>) -> Self {
        Self::Text(bytes)
    }
}

impl From<f64> for Message {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Message {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}
