//! Validated channel names.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use super::ChanError;

/// Longest accepted name, in bytes.
pub const NAME_MAX: usize = 255;

/// A channel name accepted by the registry.
///
/// Names are matched byte-exact and case-sensitive. They may be any UTF-8
/// string up to [`NAME_MAX`] bytes without interior NUL bytes, so they can be
/// handed to C hosts unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueName(Box<str>);

impl QueueName {
    /// Validates `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ChanError::InvalidName`] if the name contains a NUL byte or is
    /// longer than [`NAME_MAX`] bytes.
    pub fn new(name: impl Into<String>) -> Result<Self, ChanError> {
        let name = name.into();
        if name.as_bytes().contains(&0) {
            return Err(ChanError::InvalidName {
                name,
                reason: "name must not contain NUL bytes",
            });
        }
        if name.len() > NAME_MAX {
            return Err(ChanError::InvalidName {
                name,
                reason: "name length must be <= 255 bytes",
            });
        }
        Ok(Self(name.into_boxed_str()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for QueueName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for QueueName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for QueueName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for QueueName {
    type Error = ChanError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl TryFrom<String> for QueueName {
    type Error = ChanError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(QueueName::new("jobs").is_ok());
        assert!(QueueName::new("").is_ok());
        assert!(QueueName::new("with spaces/and:punct").is_ok());
        assert_eq!(QueueName::new("Jobs").unwrap().as_str(), "Jobs");
    }

    #[test]
    fn test_nul_rejected() {
        let result = QueueName::new("bad\0name");
        assert!(matches!(
            result,
            Err(ChanError::InvalidName { reason, .. }) if reason == "name must not contain NUL bytes"
        ));
    }

    #[test]
    fn test_too_long_rejected() {
        let result = QueueName::new("a".repeat(NAME_MAX + 1));
        assert!(matches!(
            result,
            Err(ChanError::InvalidName { reason, .. }) if reason == "name length must be <= 255 bytes"
        ));
    }

    #[test]
    fn test_max_length_accepted() {
        assert!(QueueName::new("a".repeat(NAME_MAX)).is_ok());
    }
}
