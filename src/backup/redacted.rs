//! Secret string handling with redacted display and serialization.
//!
//! Provides `RedactedString` for the backup code, archive password and
//! database password so they never leak into logs, debug output, error
//! messages or serialized configuration.

use bon::Builder;
use derive_more::From;
use getset::Getters;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::result;
use validator::Validate;
use zeroize::Zeroize;

/// Placeholder text shown instead of the actual secret in logs/debug output
pub static REDACTED: &str = "###REDACTED###";

/// A string that gets redacted in debug output and serialization
///
/// The inner value is only reachable through the `inner()` getter and is
/// zeroed when dropped.
#[derive(Validate, Clone, Default, Zeroize, From, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[validate(length(min = 1))]
    #[builder(into)]
    inner: String,
}

impl RedactedString {
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Shows the first and last three characters, stars in between.
    /// Values of six characters or fewer are fully masked.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.inner.chars().collect();
        if chars.len() <= 6 {
            return "*".repeat(chars.len());
        }

        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 3..].iter().collect();
        format!("{head}{}{tail}", "*".repeat(chars.len() - 6))
    }
}

impl From<&str> for RedactedString {
    fn from(value: &str) -> Self {
        RedactedString::builder().inner(value).build()
    }
}

impl Debug for RedactedString {
    /// Always shows redacted placeholder instead of actual value
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED)
    }
}

impl Serialize for RedactedString {
    /// Always serializes as redacted placeholder
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for RedactedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(RedactedStringVisitor)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}

pub struct RedactedStringVisitor;

impl Visitor<'_> for RedactedStringVisitor {
    type Value = RedactedString;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a string")
    }

    /// Deserializes the actual secret from the config file
    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RedactedString::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_string_validation() {
        assert!(RedactedString::from("p").validate().is_ok());
        assert!(RedactedString::from("").validate().is_err());
    }

    #[test]
    fn test_redacted_string_debug_and_serialize_hide_value() {
        let secret = RedactedString::from("hunter2-password");
        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(
            serde_json::to_string(&secret).unwrap(),
            format!("\"{REDACTED}\"")
        );
    }

    #[test]
    fn test_redacted_string_deserialize_keeps_value() {
        let secret: RedactedString = serde_json::from_str("\"hunter2\"").unwrap();
        assert_eq!(secret.inner(), "hunter2");
    }

    #[test]
    fn test_masked() {
        assert_eq!(RedactedString::from("abcdefghij").masked(), "abc****hij");
        assert_eq!(RedactedString::from("abcdef").masked(), "******");
        assert_eq!(RedactedString::from("").masked(), "");
    }

    #[test]
    fn test_redacted_string_zeroize() {
        let mut redacted = RedactedString::from("secret_password");
        redacted.zeroize();
        assert!(redacted.is_empty());
    }
}
