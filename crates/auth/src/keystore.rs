//! Signing key registry.
//!
//! Keys are RSA private keys in PEM form, each named by a short key id (kid).
//! One kid is *active* and signs new tokens; every registered kid verifies.
//! That split is what lets keys rotate: tokens signed by a retired kid keep
//! verifying for as long as the kid stays registered.
//!
//! The registry is an immutable snapshot behind an `Arc`. Reload and rotation
//! build a complete new snapshot and swap the pointer, so a reader always
//! sees one whole generation of keys.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use serde::Serialize;

use crate::KeyStoreError;

/// Signing algorithm used for every registered key.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// One named entry of a key-material source.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub kid: String,
    pub pem: String,
}

impl core::fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyEntry").field("kid", &self.kid).finish_non_exhaustive()
    }
}

/// Enumerable source of PEM-encoded private keys named by kid.
pub trait KeySource: Send + Sync {
    fn entries(&self) -> Result<Vec<KeyEntry>, KeyStoreError>;
}

/// Directory of `<kid>.pem` files. Files with any other extension are ignored.
#[derive(Debug, Clone)]
pub struct DirKeySource {
    dir: PathBuf,
}

impl DirKeySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl KeySource for DirKeySource {
    fn entries(&self) -> Result<Vec<KeyEntry>, KeyStoreError> {
        let source_err = |e: std::io::Error| KeyStoreError::Source(format!("{}: {e}", self.dir.display()));

        let mut entries = Vec::new();
        for dirent in std::fs::read_dir(&self.dir).map_err(source_err)? {
            let path = dirent.map_err(source_err)?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("pem") {
                continue;
            }
            let Some(kid) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let pem = std::fs::read_to_string(&path).map_err(source_err)?;
            entries.push(KeyEntry {
                kid: kid.to_string(),
                pem,
            });
        }

        entries.sort_by(|a, b| a.kid.cmp(&b.kid));
        Ok(entries)
    }
}

/// In-memory key source (tests, or material already fetched from a secret store).
#[derive(Debug, Clone, Default)]
pub struct MemoryKeySource {
    entries: Vec<KeyEntry>,
}

impl MemoryKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, kid: impl Into<String>, pem: impl Into<String>) -> Self {
        self.entries.push(KeyEntry {
            kid: kid.into(),
            pem: pem.into(),
        });
        self
    }
}

impl KeySource for MemoryKeySource {
    fn entries(&self) -> Result<Vec<KeyEntry>, KeyStoreError> {
        Ok(self.entries.clone())
    }
}

/// A parsed key pair. Immutable once built.
pub struct KeyPair {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    public_pem: String,
}

impl KeyPair {
    /// Parse a PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`) PEM and
    /// derive the public half from it.
    pub fn from_pem(kid: impl Into<String>, pem: &str) -> Result<Self, KeyStoreError> {
        let kid = kid.into();
        let material = |reason: String| KeyStoreError::KeyMaterial {
            kid: kid.clone(),
            reason,
        };

        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| material(format!("unparseable private key: {e}")))?;

        let private_der = private
            .to_pkcs1_der()
            .map_err(|e| material(format!("encode private key: {e}")))?;
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| material(format!("encode public key: {e}")))?;

        let encoding = EncodingKey::from_rsa_der(private_der.as_bytes());
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| material(format!("decoding key: {e}")))?;

        Ok(Self {
            kid,
            encoding,
            decoding,
            public_pem,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Algorithm {
        SIGNING_ALGORITHM
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyPair").field("kid", &self.kid).finish_non_exhaustive()
    }
}

/// Public half of a registered key, for consumers that verify on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicKeyInfo {
    pub kid: String,
    pub alg: String,
    pub active: bool,
    pub public_key_pem: String,
}

#[derive(Debug)]
struct KeySnapshot {
    keys: HashMap<String, Arc<KeyPair>>,
    active_kid: String,
}

/// Kid-indexed registry of signing keys.
#[derive(Debug)]
pub struct KeyStore {
    current: RwLock<Arc<KeySnapshot>>,
}

impl KeyStore {
    /// Load every entry of `source`.
    ///
    /// All or nothing: one malformed entry fails the whole load. The active
    /// kid is not required to be present here; signing reports its absence.
    pub fn load(source: &dyn KeySource, active_kid: impl Into<String>) -> Result<Self, KeyStoreError> {
        let snapshot = KeySnapshot {
            keys: build_keys(source)?,
            active_kid: active_kid.into(),
        };
        log_snapshot("signing keys loaded", &snapshot);
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    fn snapshot(&self) -> Arc<KeySnapshot> {
        // The lock only guards a pointer swap; a poisoned guard still holds a
        // complete snapshot.
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<KeySnapshot>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_kid(&self) -> String {
        self.snapshot().active_kid.clone()
    }

    /// Key pair that signs new tokens.
    pub fn private_key_for_signing(&self) -> Result<Arc<KeyPair>, KeyStoreError> {
        let snapshot = self.snapshot();
        snapshot
            .keys
            .get(&snapshot.active_kid)
            .cloned()
            .ok_or_else(|| KeyStoreError::NoActiveKey(snapshot.active_kid.clone()))
    }

    /// Key pair registered under `kid`, active or not.
    pub fn public_key_for_verification(&self, kid: &str) -> Result<Arc<KeyPair>, KeyStoreError> {
        self.snapshot()
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyStoreError::UnknownKey(kid.to_string()))
    }

    /// Registered kids, sorted.
    pub fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self.snapshot().keys.keys().cloned().collect();
        kids.sort();
        kids
    }

    pub fn public_keys(&self) -> Vec<PublicKeyInfo> {
        let snapshot = self.snapshot();
        let mut keys: Vec<PublicKeyInfo> = snapshot
            .keys
            .values()
            .map(|pair| PublicKeyInfo {
                kid: pair.kid().to_string(),
                alg: format!("{:?}", pair.algorithm()),
                active: pair.kid() == snapshot.active_kid,
                public_key_pem: pair.public_key_pem().to_string(),
            })
            .collect();
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        keys
    }

    /// Re-read `source` and replace the whole registry, keeping the active kid.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn reload(&self, source: &dyn KeySource) -> Result<(), KeyStoreError> {
        self.reload_with_active(source, None)
    }

    /// Re-read `source` and publish it together with `active_kid` (or the
    /// current active kid when `None`) in a single swap.
    ///
    /// A named `active_kid` must be present in the new key set; otherwise
    /// nothing changes. Parsing happens outside the lock; the active kid is
    /// read under the same write guard that publishes the new snapshot, so
    /// a concurrent [`rotate`](Self::rotate) is never undone.
    pub fn reload_with_active(&self, source: &dyn KeySource, active_kid: Option<&str>) -> Result<(), KeyStoreError> {
        let keys = build_keys(source)?;
        if let Some(kid) = active_kid {
            if !keys.contains_key(kid) {
                return Err(KeyStoreError::NoActiveKey(kid.to_string()));
            }
        }

        let published = {
            let mut current = self.write();
            let snapshot = Arc::new(KeySnapshot {
                keys,
                active_kid: active_kid.map_or_else(|| current.active_kid.clone(), str::to_string),
            });
            *current = snapshot.clone();
            snapshot
        };

        log_snapshot("signing keys reloaded", &published);
        Ok(())
    }

    /// Make `kid` the active signing key. The kid must already be registered.
    pub fn rotate(&self, kid: &str) -> Result<(), KeyStoreError> {
        let previous = {
            let mut current = self.write();
            if !current.keys.contains_key(kid) {
                return Err(KeyStoreError::NoActiveKey(kid.to_string()));
            }

            let previous = current.active_kid.clone();
            *current = Arc::new(KeySnapshot {
                keys: current.keys.clone(),
                active_kid: kid.to_string(),
            });
            previous
        };

        tracing::info!(previous_kid = %previous, active_kid = %kid, "active signing key rotated");
        Ok(())
    }
}

fn build_keys(source: &dyn KeySource) -> Result<HashMap<String, Arc<KeyPair>>, KeyStoreError> {
    let entries = source.entries()?;
    if entries.is_empty() {
        return Err(KeyStoreError::EmptyRegistry);
    }

    let mut keys = HashMap::with_capacity(entries.len());
    for entry in entries {
        let pair = KeyPair::from_pem(entry.kid.as_str(), &entry.pem)?;
        if keys.insert(entry.kid.clone(), Arc::new(pair)).is_some() {
            return Err(KeyStoreError::KeyMaterial {
                kid: entry.kid,
                reason: "duplicate kid".to_string(),
            });
        }
    }

    Ok(keys)
}

fn log_snapshot(message: &str, snapshot: &KeySnapshot) {
    let mut kids: Vec<&str> = snapshot.keys.keys().map(String::as_str).collect();
    kids.sort_unstable();

    if snapshot.keys.contains_key(&snapshot.active_kid) {
        tracing::info!(kids = ?kids, active_kid = %snapshot.active_kid, "{message}");
    } else {
        tracing::warn!(
            kids = ?kids,
            active_kid = %snapshot.active_kid,
            "{message}; active kid is not registered, issuance will fail"
        );
    }
}
