//! Object identification and canonical envelope format for the embedded VCS.

use crate::error::{CkptError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte BLAKE3 content hash identifying a blob, tree or commit.
///
/// The hex form doubles as the commit hash reported to callers.
///
/// # Examples
///
/// ```
/// use ckpt_core::ObjectId;
///
/// let id = ObjectId::from_bytes([0xab; 32]);
/// assert_eq!(id.as_hex().len(), 64);
/// assert_eq!(id.short(), "abababab");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// The length of an ObjectId as a hex string.
    pub const HEX_LEN: usize = 64;

    /// Creates an ObjectId from raw bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying hash bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns this ObjectId as a lowercase hex string (64 chars).
    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form used in history listings (8 chars).
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Shard prefix (first 2 hex characters) for `objects/{shard}/{hex}`.
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Parses an ObjectId from a 64-char hex string.
    ///
    /// # Errors
    ///
    /// Returns `CkptError::InvalidArgument` if the string is not valid hex
    /// of the right length.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != Self::HEX_LEN {
            return Err(CkptError::InvalidArgument(format!(
                "object id must be {} hex chars, got {}",
                Self::HEX_LEN,
                s.len()
            )));
        }

        let bytes = hex::decode(s).map_err(|e| CkptError::InvalidArgument(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CkptError::InvalidArgument("invalid object id length".to_string()))?;

        Ok(Self(arr))
    }

    /// Computes the id of a payload of the given kind.
    pub(crate) fn hash_object(kind: ObjectKind, payload: &[u8]) -> Self {
        let canonical = canonical_bytes(kind, payload);
        Self(*blake3::hash(&canonical).as_bytes())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}...)", &self.as_hex()[..12])
    }
}

/// Object kind discriminant for the canonical envelope.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ObjectKind {
    /// File contents.
    Blob = 1,
    /// Directory listing.
    Tree = 2,
    /// Commit record.
    Commit = 3,
}

impl ObjectKind {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Blob),
            2 => Some(Self::Tree),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// Canonical envelope magic bytes.
pub(crate) const MAGIC: &[u8; 5] = b"CKPT1";

/// Size of the envelope header: magic + kind + u64 length.
pub(crate) const HEADER_LEN: usize = 5 + 1 + 8;

/// Constructs canonical bytes for hashing and storage.
///
/// Format: magic (5) | kind (1) | payload length u64 LE (8) | payload
pub(crate) fn canonical_bytes(kind: ObjectKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(kind as u8);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out
}
