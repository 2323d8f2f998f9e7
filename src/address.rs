//! A validated, lowercase-canonicalized hex address (spec §3).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parses `0x` + 40 hex chars, case-insensitively, canonicalizing to
    /// lowercase. Any other shape is a validation error.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        if raw.len() != 42 || !raw.starts_with("0x") {
            return Err(AddressError::BadFormat);
        }
        if !raw[2..].chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::BadFormat);
        }
        Ok(Self(raw.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    BadFormat,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("address must match ^0x[a-fA-F0-9]{40}$")
    }
}

impl std::error::Error for AddressError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_valid_address() {
        let a = Address::parse("0xABCDEF0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(a.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn rejects_short_address() {
        assert!(Address::parse("0x1234").is_err());
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(Address::parse("1234567890123456789012345678901234567890").is_err());
    }

    #[test]
    fn rejects_non_hex_chars() {
        assert!(Address::parse("0xZZZZ567890123456789012345678901234567890").is_err());
    }

    #[test]
    fn equal_case_insensitively() {
        let a = Address::parse("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let b = Address::parse("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
        assert_eq!(a, b);
    }
}
