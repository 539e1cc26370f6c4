//! Documents, their owners, and their identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::keys::KeyIdentifier;

/// Number of random bytes in a document id (128 bits).
pub(crate) const DOCUMENT_ID_RANDOM_LEN: usize = 16;

/// The owner a document is scoped to, e.g. a person identifier.
///
/// Only ever used as binding context and inside the encrypted storage key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Owner(String);

impl Owner {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Owner {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// Owners are personal identifiers; keep them out of logs.
impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Owner(<redacted>)")
    }
}

/// A freshly generated document identifier.
///
/// Format: `{key identifier}-{32 lowercase hex chars}`. The key identifier is
/// the one that was active when the id was generated; the storage key of the
/// document is always derived under that key, so later key rings can still
/// find the object after the active key has rotated.
///
/// Knowing the id and the owner is necessary and sufficient to read or delete
/// the document. Treat it as a capability.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DocumentId {
    key_identifier: KeyIdentifier,
    value: String,
}

impl DocumentId {
    pub(crate) fn generate(
        key_identifier: KeyIdentifier,
        random: &[u8; DOCUMENT_ID_RANDOM_LEN],
    ) -> Self {
        Self {
            key_identifier,
            value: format!("{}-{}", key_identifier, hex::encode(random)),
        }
    }

    /// Parse an id received from a caller.
    pub fn parse(value: &str) -> Result<Self, VaultError> {
        let (prefix, random) = value.split_once('-').ok_or(VaultError::InvalidDocumentId)?;

        // Canonical decimal only, so one id has exactly one spelling.
        if prefix.is_empty()
            || prefix.starts_with('0')
            || !prefix.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(VaultError::InvalidDocumentId);
        }
        let id: u32 = prefix.parse().map_err(|_| VaultError::InvalidDocumentId)?;
        let key_identifier = KeyIdentifier::new(id).map_err(|_| VaultError::InvalidDocumentId)?;

        let random_ok = random.len() == DOCUMENT_ID_RANDOM_LEN * 2
            && random.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !random_ok {
            return Err(VaultError::InvalidDocumentId);
        }

        Ok(Self {
            key_identifier,
            value: value.to_string(),
        })
    }

    /// The key the storage key of this document is derived under.
    pub fn key_identifier(&self) -> KeyIdentifier {
        self.key_identifier
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl FromStr for DocumentId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId(key={}, <redacted>)", self.key_identifier)
    }
}

/// A stored document. Everything here, metadata included, is encrypted as
/// one payload; none of it is exposed as storage metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub content_type: String,
    #[serde(with = "base64_content")]
    pub content: Vec<u8>,
}

impl Document {
    pub fn new(
        title: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            title: title.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }

    pub(crate) fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

mod base64_content {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
