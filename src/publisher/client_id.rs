//! Client identifier derived from the device hardware address
//!
//! The id is a pure function of the configured prefix and the last three
//! bytes of the 6-byte hardware address, so it is stable across restarts of
//! the same device.
//!
//! # Transport precondition
//!
//! The wrapped MQTT transport requires the client id to occupy an even
//! number of bytes. Odd-length ids are padded with a single trailing space.
//! The id must also fit the transport's fixed 32-byte id buffer, which
//! includes a terminator, so at most [`MAX_CLIENT_ID_LEN`] bytes are usable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of the transport's client id buffer, terminator included
pub const CLIENT_ID_BUFFER_SIZE: usize = 32;

/// Longest client id that fits the transport buffer
pub const MAX_CLIENT_ID_LEN: usize = CLIENT_ID_BUFFER_SIZE - 1;

/// Default client id prefix
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "modulino";

/// Client id and hardware address errors
#[derive(Debug, Error, PartialEq)]
pub enum ClientIdError {
    #[error("Invalid hardware address '{0}': expected six hex octets like 01:02:03:04:05:06")]
    InvalidHardwareAddress(String),
    #[error("Client id prefix must be non-empty printable ASCII without spaces: '{0}'")]
    InvalidPrefix(String),
    #[error("Client id '{id}' is {len} bytes, exceeds maximum of {max}")]
    TooLong { id: String, len: usize, max: usize },
}

/// 6-byte hardware (MAC) address of the device's network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareAddress(pub [u8; 6]);

impl HardwareAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for HardwareAddress {
    type Err = ClientIdError;

    /// Parse `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClientIdError::InvalidHardwareAddress(s.to_string());
        let trimmed = s.trim();
        let separator = if trimmed.contains('-') { '-' } else { ':' };

        let parts: Vec<&str> = trimmed.split(separator).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(HardwareAddress(octets))
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl Serialize for HardwareAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HardwareAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// MQTT client identifier satisfying the transport's length constraints
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Derive the client id for a device
    ///
    /// Format: `<prefix>-xx-xx-xx` from the last three address bytes in
    /// lowercase hex, each right-aligned in two columns with a leading space
    /// (`0x04` becomes `" 4"`), so ids match those issued by the device
    /// firmware. Padded with one trailing space when the byte count is odd.
    pub fn generate(
        prefix: &str,
        address: &HardwareAddress,
    ) -> Result<Self, ClientIdError> {
        validate_prefix(prefix)?;

        let [_, _, _, d, e, f] = address.octets();
        let mut id = format!("{prefix}-{d:>2x}-{e:>2x}-{f:>2x}");
        if id.len() % 2 != 0 {
            id.push(' ');
        }

        if id.len() > MAX_CLIENT_ID_LEN {
            return Err(ClientIdError::TooLong {
                len: id.len(),
                id,
                max: MAX_CLIENT_ID_LEN,
            });
        }
        Ok(ClientId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_prefix(prefix: &str) -> Result<(), ClientIdError> {
    let printable = prefix.chars().all(|c| c.is_ascii_graphic());
    if prefix.is_empty() || !printable {
        return Err(ClientIdError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}
