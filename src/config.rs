//! Vault configuration.
//!
//! Non-secret settings (key identifiers, bucket location, deadline) come from
//! `DOCVAULT_*` variables or a JSON document. Passphrases are never part of
//! the config structure: each identifier's passphrase is read from
//! `CRYPTO_PASSPHRASE_{identifier}` when the key ring is built.
//!
//! Every loader takes a lookup function so tests can supply values without
//! touching the process environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::keys::{KeyIdentifier, KeyRing, Passphrase};

pub const ENCRYPTION_IDENTIFIER_VAR: &str = "DOCVAULT_ENCRYPTION_IDENTIFIER";
pub const DECRYPTION_IDENTIFIERS_VAR: &str = "DOCVAULT_DECRYPTION_IDENTIFIERS";
pub const BUCKET_PATH_VAR: &str = "DOCVAULT_BUCKET_PATH";
pub const STORAGE_DEADLINE_VAR: &str = "DOCVAULT_STORAGE_DEADLINE_MS";
pub const PASSPHRASE_PREFIX: &str = "CRYPTO_PASSPHRASE_";

/// Read a variable from the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Which keys encrypt and which decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CryptoConfig {
    /// Identifier of the key new documents are encrypted with.
    pub encryption_identifier: u32,
    /// Retired identifiers still allowed to decrypt. May be empty; the
    /// encryption identifier is always added.
    #[serde(default)]
    pub decryption_identifiers: Vec<u32>,
}

impl CryptoConfig {
    /// Resolve every passphrase and build the key ring.
    pub fn key_ring<F>(&self, lookup: F) -> Result<KeyRing, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let active = KeyIdentifier::new(self.encryption_identifier)?;
        let passphrase = |id: KeyIdentifier| {
            let name = format!("{PASSPHRASE_PREFIX}{id}");
            lookup(&name)
                .map(Passphrase::from)
                .ok_or(ConfigError::Missing(name))
        };

        let mut decryption_keys = HashMap::new();
        for raw in &self.decryption_identifiers {
            let id = KeyIdentifier::new(*raw)?;
            decryption_keys.insert(id, passphrase(id)?);
        }
        // The active key must always be able to decrypt what it encrypts.
        decryption_keys.insert(active, passphrase(active)?);

        Ok(KeyRing::new(active, passphrase(active)?, decryption_keys)?)
    }
}

/// Where documents are stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Directory of the blob bucket. Must already exist.
    pub bucket_path: PathBuf,
    /// Deadline for each storage call, in milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl StorageConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VaultConfig {
    pub crypto: CryptoConfig,
    pub storage: StorageConfig,
}

impl VaultConfig {
    /// Load from `DOCVAULT_*` variables resolved through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| lookup(name).ok_or_else(|| ConfigError::Missing(name.to_string()));

        let encryption_identifier = parse_identifier(
            ENCRYPTION_IDENTIFIER_VAR,
            &required(ENCRYPTION_IDENTIFIER_VAR)?,
        )?;

        let decryption_identifiers = match lookup(DECRYPTION_IDENTIFIERS_VAR) {
            None => Vec::new(),
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_identifier(DECRYPTION_IDENTIFIERS_VAR, s))
                .collect::<Result<_, _>>()?,
        };

        let deadline_ms = lookup(STORAGE_DEADLINE_VAR)
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: STORAGE_DEADLINE_VAR.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            crypto: CryptoConfig {
                encryption_identifier,
                decryption_identifiers,
            },
            storage: StorageConfig {
                bucket_path: PathBuf::from(required(BUCKET_PATH_VAR)?),
                deadline_ms,
            },
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Parse a JSON document with the same shape as this struct.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid {
            name: "config".to_string(),
            reason: e.to_string(),
        })
    }
}

fn parse_identifier(name: &str, raw: &str) -> Result<u32, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: name.to_string(),
        reason,
    };
    let value: u32 = raw.trim().parse().map_err(|e| invalid(format!("{e}")))?;
    if value == 0 {
        return Err(invalid("key identifiers start at 1".to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyRingError;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config = VaultConfig::from_lookup(lookup(&[
            (ENCRYPTION_IDENTIFIER_VAR, "3"),
            (DECRYPTION_IDENTIFIERS_VAR, "1, 2,"),
            (BUCKET_PATH_VAR, "/var/lib/docvault"),
            (STORAGE_DEADLINE_VAR, "1500"),
        ]))
        .unwrap();

        assert_eq!(config.crypto.encryption_identifier, 3);
        assert_eq!(config.crypto.decryption_identifiers, vec![1, 2]);
        assert_eq!(config.storage.bucket_path, PathBuf::from("/var/lib/docvault"));
        assert_eq!(config.storage.deadline(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_missing_and_invalid_settings() {
        assert!(matches!(
            VaultConfig::from_lookup(lookup(&[(BUCKET_PATH_VAR, "/tmp")])),
            Err(ConfigError::Missing(name)) if name == ENCRYPTION_IDENTIFIER_VAR
        ));
        assert!(matches!(
            VaultConfig::from_lookup(lookup(&[
                (ENCRYPTION_IDENTIFIER_VAR, "0"),
                (BUCKET_PATH_VAR, "/tmp"),
            ])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            VaultConfig::from_lookup(lookup(&[
                (ENCRYPTION_IDENTIFIER_VAR, "1"),
                (DECRYPTION_IDENTIFIERS_VAR, "1,x"),
                (BUCKET_PATH_VAR, "/tmp"),
            ])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_key_ring_always_includes_active_key() {
        let crypto = CryptoConfig {
            encryption_identifier: 2,
            decryption_identifiers: vec![1],
        };
        let ring = crypto
            .key_ring(lookup(&[
                ("CRYPTO_PASSPHRASE_1", "passord"),
                ("CRYPTO_PASSPHRASE_2", "passord2"),
            ]))
            .unwrap();

        assert_eq!(ring.active_identifier(), KeyIdentifier::new(2).unwrap());
        assert_eq!(
            ring.identifiers(),
            vec![KeyIdentifier::new(1).unwrap(), KeyIdentifier::new(2).unwrap()]
        );
    }

    #[test]
    fn test_key_ring_fails_fast_on_missing_passphrase() {
        let crypto = CryptoConfig {
            encryption_identifier: 2,
            decryption_identifiers: vec![1],
        };
        assert!(matches!(
            crypto.key_ring(lookup(&[("CRYPTO_PASSPHRASE_2", "passord2")])),
            Err(ConfigError::Missing(name)) if name == "CRYPTO_PASSPHRASE_1"
        ));
        assert!(matches!(
            crypto.key_ring(lookup(&[
                ("CRYPTO_PASSPHRASE_1", "passord"),
                ("CRYPTO_PASSPHRASE_2", ""),
            ])),
            Err(ConfigError::KeyRing(KeyRingError::EmptyPassphrase(_)))
        ));
    }

    #[test]
    fn test_from_json() {
        let config = VaultConfig::from_json(
            r#"{
                "crypto": { "encryption_identifier": 1 },
                "storage": { "bucket_path": "/srv/bucket" }
            }"#,
        )
        .unwrap();

        assert!(config.crypto.decryption_identifiers.is_empty());
        assert_eq!(config.storage.deadline(), None);
        assert!(VaultConfig::from_json("{}").is_err());
    }
}
