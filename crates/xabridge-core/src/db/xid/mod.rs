//! Module: xid
//! Responsibility: distributed-transaction branch identifiers and their
//! stable string key.
//! Does not own: branch lifecycle (bridge) or recovery persistence.
//!
//! Invariants:
//! - Equality and hashing are over (format id, global id, branch qualifier).
//! - `Xid::key` is deterministic; `Xid::from_key` accepts padded and unpadded
//!   encodings, so every accepted key of the same content yields an equal Xid.

#[cfg(test)]
mod tests;

use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;

///
/// Constants
///

pub const MAX_GLOBAL_ID_BYTES: usize = 64;
pub const MAX_BRANCH_QUALIFIER_BYTES: usize = 64;

const KEY_SEPARATOR: char = '.';

const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

///
/// XidError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum XidError {
    #[error("global transaction id is empty")]
    EmptyGlobalId,

    #[error("global transaction id length {len} exceeds max {max}")]
    GlobalIdTooLong { len: usize, max: usize },

    #[error("branch qualifier length {len} exceeds max {max}")]
    BranchQualifierTooLong { len: usize, max: usize },

    #[error("xid key '{key}' must have three '.'-separated parts")]
    MalformedKey { key: String },

    #[error("xid key '{key}' has invalid format id")]
    InvalidFormatId { key: String },

    #[error("xid key '{key}' has invalid {part} encoding")]
    InvalidEncoding { key: String, part: &'static str },
}

///
/// Xid
///
/// Immutable (format id, global transaction id, branch qualifier) triple.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Xid {
    format_id: i32,
    global_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl Xid {
    /// Validate and construct a branch identifier.
    pub fn try_new(
        format_id: i32,
        global_id: impl Into<Vec<u8>>,
        branch_qualifier: impl Into<Vec<u8>>,
    ) -> Result<Self, XidError> {
        let global_id = global_id.into();
        let branch_qualifier = branch_qualifier.into();

        if global_id.is_empty() {
            return Err(XidError::EmptyGlobalId);
        }
        if global_id.len() > MAX_GLOBAL_ID_BYTES {
            return Err(XidError::GlobalIdTooLong {
                len: global_id.len(),
                max: MAX_GLOBAL_ID_BYTES,
            });
        }
        if branch_qualifier.len() > MAX_BRANCH_QUALIFIER_BYTES {
            return Err(XidError::BranchQualifierTooLong {
                len: branch_qualifier.len(),
                max: MAX_BRANCH_QUALIFIER_BYTES,
            });
        }

        Ok(Self {
            format_id,
            global_id,
            branch_qualifier,
        })
    }

    #[must_use]
    pub const fn format_id(&self) -> i32 {
        self.format_id
    }

    #[must_use]
    pub fn global_id(&self) -> &[u8] {
        &self.global_id
    }

    #[must_use]
    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }

    /// Deterministic string key: `<format id>.<global id>.<branch qualifier>`,
    /// ids in unpadded url-safe base64.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.format_id,
            KEY_ENGINE.encode(&self.global_id),
            KEY_ENGINE.encode(&self.branch_qualifier),
        )
    }

    /// Decode a key produced by [`Xid::key`] (padding optional).
    pub fn from_key(key: &str) -> Result<Self, XidError> {
        let mut parts = key.split(KEY_SEPARATOR);
        let (Some(format), Some(global), Some(branch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(XidError::MalformedKey {
                key: key.to_string(),
            });
        };

        let format_id = format
            .parse::<i32>()
            .map_err(|_| XidError::InvalidFormatId {
                key: key.to_string(),
            })?;
        let global_id = decode_part(key, global, "global id")?;
        let branch_qualifier = decode_part(key, branch, "branch qualifier")?;

        Self::try_new(format_id, global_id, branch_qualifier)
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Xid {
    type Err = XidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s)
    }
}

fn decode_part(key: &str, part: &str, label: &'static str) -> Result<Vec<u8>, XidError> {
    KEY_ENGINE
        .decode(part)
        .map_err(|_| XidError::InvalidEncoding {
            key: key.to_string(),
            part: label,
        })
}
