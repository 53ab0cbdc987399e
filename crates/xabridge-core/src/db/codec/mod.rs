//! Module: codec
//! Responsibility: durable string form of a `Mutation` for the recovery table.
//! Does not own: recovery-table layout or replay ordering.
//!
//! Format: `v1:` followed by standard base64 of the CBOR-encoded mutation.
//! Unknown fields are rejected as corruption; payloads are not forward-compatible.


use crate::{
    db::mutation::Mutation,
    error::InternalError,
    serialize::{deserialize_bounded, serialize},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};

///
/// Constants
///

pub const CODEC_VERSION_PREFIX: &str = "v1:";

/// Default cap on one encoded mutation payload (CBOR bytes).
pub const DEFAULT_MAX_MUTATION_BYTES: usize = 1024 * 1024;

///
/// MutationCodec
///
/// Size-bounded encoder/decoder for persisted mutations.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MutationCodec {
    max_bytes: usize,
}

impl MutationCodec {
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Encode a mutation; oversized payloads are rejected before persist.
    pub fn encode(&self, mutation: &Mutation) -> Result<String, InternalError> {
        mutation.validate()?;

        let bytes = serialize(mutation)?;
        if bytes.len() > self.max_bytes {
            return Err(InternalError::codec_unsupported(format!(
                "mutation on '{}' exceeds max size: {} bytes (limit {})",
                mutation.table(),
                bytes.len(),
                self.max_bytes
            )));
        }

        Ok(format!("{CODEC_VERSION_PREFIX}{}", STANDARD.encode(bytes)))
    }

    /// Decode a persisted mutation, treating every failure as corruption.
    pub fn decode(&self, encoded: &str) -> Result<Mutation, InternalError> {
        let Some(payload) = encoded.strip_prefix(CODEC_VERSION_PREFIX) else {
            let version = encoded.split(':').next().unwrap_or_default();
            return Err(InternalError::codec_unsupported(format!(
                "unsupported mutation payload version '{version}'"
            )));
        };

        let bytes = STANDARD.decode(payload).map_err(|err| {
            InternalError::codec_corruption(format!("mutation payload is not base64: {err}"))
        })?;
        let mutation = deserialize_bounded::<Mutation>(&bytes, self.max_bytes).map_err(|err| {
            InternalError::codec_corruption(format!("mutation payload decode failed: {err}"))
        })?;
        mutation.validate().map_err(|err| {
            InternalError::codec_corruption(format!("mutation payload is malformed: {err}"))
        })?;

        Ok(mutation)
    }
}

impl Default for MutationCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MUTATION_BYTES)
    }
}

/// Encode with the default size limit.
pub fn serialize_mutation(mutation: &Mutation) -> Result<String, InternalError> {
    MutationCodec::default().encode(mutation)
}

/// Decode with the default size limit.
pub fn deserialize_mutation(encoded: &str) -> Result<Mutation, InternalError> {
    MutationCodec::default().decode(encoded)
}
