//! Cryptographic primitives for TriShard
//!
//! Provides:
//! - Blake3 content fingerprints (one-shot and incremental)
//! - HMAC-SHA256 key derivation from a passphrase and a salt
//! - AES-256-CTR keystream for in-place, byte-granular encryption

use crate::error::{Result, TriShardError};
use crate::{HASH_HEX_LEN, KEY_SIZE, SALT_SIZE};
use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;
use std::fmt;
use std::io::{self, Read};

type HmacSha256 = Hmac<Sha256>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// AES-CTR counter block size (16 bytes)
const IV_SIZE: usize = 16;

/// Blake3 hash wrapper used for shard and input fingerprints
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(blake3::Hash);

impl ContentHash {
    /// Compute Blake3 hash of data
    pub fn compute(data: &[u8]) -> Self {
        Self(blake3::hash(data))
    }

    /// Hash everything a reader yields, returning the hash and the byte count
    pub fn compute_reader<R: Read>(reader: &mut R) -> io::Result<(Self, u64)> {
        let mut hasher = blake3::Hasher::new();
        let len = io::copy(reader, &mut hasher)?;
        Ok((Self(hasher.finalize()), len))
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// Parse from hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != HASH_HEX_LEN {
            return Err(TriShardError::MalformedMetadata(format!(
                "fingerprint must be {} hex chars, got {}",
                HASH_HEX_LEN,
                hex.len()
            )));
        }
        let hash = blake3::Hash::from_hex(hex)
            .map_err(|e| TriShardError::MalformedMetadata(e.to_string()))?;
        Ok(Self(hash))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Running fingerprint over a stream that arrives block by block
#[derive(Default)]
pub struct Fingerprinter {
    hasher: blake3::Hasher,
    len: u64,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes fed so far
    pub fn bytes_hashed(&self) -> u64 {
        self.len
    }

    pub fn finalize(&self) -> ContentHash {
        ContentHash(self.hasher.finalize())
    }
}

/// Random salt mixed into the passphrase before key derivation
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// The all-zero salt, recorded when confidentiality is disabled
    pub const fn empty() -> Self {
        Self([0u8; SALT_SIZE])
    }

    /// Draw a fresh salt from the operating system entropy source
    pub fn generate() -> Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.try_fill_bytes(&mut salt)?;
        Ok(Self(salt))
    }

    /// Create from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; SALT_SIZE] = slice.try_into().map_err(|_| {
            TriShardError::MalformedMetadata(format!(
                "salt must be {} bytes, got {}",
                SALT_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    /// True if no salt was recorded, i.e. the shard set is not encrypted
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for Salt {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "Salt(empty)")
        } else {
            write!(f, "Salt({}..)", &self.to_hex()[..16])
        }
    }
}

impl Serialize for Salt {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Stream cipher key derived from a passphrase and a salt
#[derive(Clone)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    /// HMAC-SHA256 keyed with the passphrase over the salt
    pub fn derive(passphrase: &[u8], salt: &Salt) -> Result<Self> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(passphrase)
            .map_err(|e| TriShardError::KeyDerivation(e.to_string()))?;
        mac.update(salt.as_bytes());
        let digest = mac.finalize().into_bytes();

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Ok(Self(key))
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey([REDACTED])")
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        // Zeroize key on drop
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// Continuous keystream over one file.
///
/// Every call to [`KeystreamCipher::apply`] picks up the keystream where the
/// previous call stopped, so splitting a file into blocks of any size yields
/// the same ciphertext as encrypting it in one go. Applying the keystream
/// twice from the same starting offset is the identity.
pub struct KeystreamCipher {
    inner: Aes256Ctr,
}

impl KeystreamCipher {
    pub fn new(key: &DerivedKey) -> Result<Self> {
        // The key is unique per salt, so a fixed counter start is safe
        let iv = [0u8; IV_SIZE];
        let inner = Aes256Ctr::new_from_slices(key.as_bytes(), &iv)
            .map_err(|e| TriShardError::KeyDerivation(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Derive the key and build the cipher in one step
    pub fn from_passphrase(passphrase: &[u8], salt: &Salt) -> Result<Self> {
        let key = DerivedKey::derive(passphrase, salt)?;
        Self::new(&key)
    }

    /// XOR the next `data.len()` keystream bytes into `data`
    pub fn apply(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }
}

impl fmt::Debug for KeystreamCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeystreamCipher([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        let data = b"hello world";
        let hash = ContentHash::compute(data);

        // Same data produces same hash
        let hash2 = ContentHash::compute(data);
        assert_eq!(hash, hash2);

        // Different data produces different hash
        let hash3 = ContentHash::compute(b"different data");
        assert_ne!(hash, hash3);

    }

    #[test]
    fn test_content_hash_hex_roundtrip() {
        let hash = ContentHash::compute(b"fingerprint");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), HASH_HEX_LEN);
        assert_eq!(ContentHash::from_hex(&hex).unwrap(), hash);

        assert!(ContentHash::from_hex("abc").is_err());
        assert!(ContentHash::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_fingerprinter_matches_one_shot() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

        let mut fp = Fingerprinter::new();
        for block in data.chunks(777) {
            fp.update(block);
        }
        assert_eq!(fp.bytes_hashed(), data.len() as u64);
        assert_eq!(fp.finalize(), ContentHash::compute(&data));

        let (hash, len) = ContentHash::compute_reader(&mut data.as_slice()).unwrap();
        assert_eq!(hash, ContentHash::compute(&data));
        assert_eq!(len, 5000);
    }

    #[test]
    fn test_key_derivation_depends_on_salt_and_passphrase() {
        let salt_a = Salt::generate().unwrap();
        let salt_b = Salt::generate().unwrap();

        let k1 = DerivedKey::derive(b"password", &salt_a).unwrap();
        let k2 = DerivedKey::derive(b"password", &salt_a).unwrap();
        let k3 = DerivedKey::derive(b"password", &salt_b).unwrap();
        let k4 = DerivedKey::derive(b"other", &salt_a).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(k1.as_bytes(), k3.as_bytes());
        assert_ne!(k1.as_bytes(), k4.as_bytes());
        assert_eq!(format!("{:?}", k1), "DerivedKey([REDACTED])");
    }

    #[test]
    fn test_keystream_roundtrip() {
        let key = DerivedKey::derive(b"secret", &Salt::generate().unwrap()).unwrap();
        let plaintext: Vec<u8> = (0..3000u32).map(|i| (i * 7 % 256) as u8).collect();

        let mut data = plaintext.clone();
        KeystreamCipher::new(&key).unwrap().apply(&mut data);
        assert_ne!(data, plaintext);

        KeystreamCipher::new(&key).unwrap().apply(&mut data);
        assert_eq!(data, plaintext);
    }

    #[test]
    fn test_keystream_is_continuous_across_blocks() {
        let key = DerivedKey::from_bytes([7u8; KEY_SIZE]);
        let plaintext = vec![0x5Au8; 4096];

        let mut whole = plaintext.clone();
        KeystreamCipher::new(&key).unwrap().apply(&mut whole);

        let mut pieces = plaintext.clone();
        let mut cipher = KeystreamCipher::new(&key).unwrap();
        for piece in pieces.chunks_mut(1000) {
            cipher.apply(piece);
        }

        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_salt() {
        assert!(Salt::empty().is_empty());
        let salt = Salt::generate().unwrap();
        assert!(!salt.is_empty());
        assert_eq!(salt.to_hex().len(), SALT_SIZE * 2);
        assert_eq!(Salt::from_slice(salt.as_bytes()).unwrap(), salt);
        assert!(Salt::from_slice(&[1, 2, 3]).is_err());
    }
}
