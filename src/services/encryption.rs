//! At-rest sealing for archives kept in object storage.
//!
//! Sealed envelope: `b"ASZ1"` || 12-byte nonce || ciphertext+tag.
//! The object key is bound as associated data, so an envelope copied to a
//! different key fails to open.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine;

const MAGIC: &[u8; 4] = b"ASZ1";
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + NONCE_LEN;

pub struct ArchiveCipher {
    cipher: Aes256Gcm,
}

impl ArchiveCipher {
    /// Key is 32 bytes, base64-encoded (`ENCRYPTION_KEY`).
    pub fn from_base64_key(key: &str) -> Result<Self, CipherError> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(key.trim())
            .map_err(|_| CipherError::InvalidKey)?;
        let cipher = Aes256Gcm::new_from_slice(&raw).map_err(|_| CipherError::InvalidKey)?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, object_key: &str, archive: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let body = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: archive,
                    aad: object_key.as_bytes(),
                },
            )
            .map_err(|_| CipherError::Seal)?;

        let mut envelope = Vec::with_capacity(HEADER_LEN + body.len());
        envelope.extend_from_slice(MAGIC);
        envelope.extend_from_slice(&nonce);
        envelope.extend(body);
        Ok(envelope)
    }

    pub fn open(&self, object_key: &str, envelope: &[u8]) -> Result<Vec<u8>, CipherError> {
        let Some(rest) = envelope.strip_prefix(MAGIC.as_slice()) else {
            return Err(CipherError::UnknownFormat);
        };
        if rest.len() < NONCE_LEN {
            return Err(CipherError::UnknownFormat);
        }

        let (nonce, body) = rest.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: body,
                    aad: object_key.as_bytes(),
                },
            )
            .map_err(|_| CipherError::Open)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("ENCRYPTION_KEY must be 32 bytes, base64-encoded")]
    InvalidKey,

    #[error("failed to seal archive")]
    Seal,

    #[error("archive failed authentication")]
    Open,

    #[error("not a sealed archive")]
    UnknownFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> ArchiveCipher {
        ArchiveCipher::from_base64_key(&base64::engine::general_purpose::STANDARD.encode([7u8; 32]))
            .unwrap()
    }

    #[test]
    fn test_sealed_archive_opens_under_same_key() {
        let c = cipher();
        let archive = b"PK\x03\x04 fake zip body";
        let sealed = c.seal("archives/a.zip", archive).unwrap();
        assert!(sealed.starts_with(MAGIC));
        assert!(!sealed.windows(archive.len()).any(|w| w == archive));
        assert_eq!(c.open("archives/a.zip", &sealed).unwrap(), archive);
    }

    #[test]
    fn test_envelope_bound_to_object_key() {
        let c = cipher();
        let sealed = c.seal("archives/a.zip", b"archive").unwrap();
        assert!(matches!(c.open("archives/b.zip", &sealed), Err(CipherError::Open)));
    }

    #[test]
    fn test_tampered_or_foreign_bytes_rejected() {
        let c = cipher();
        let mut sealed = c.seal("k", b"archive").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(c.open("k", &sealed), Err(CipherError::Open)));

        // A plain ZIP uploaded by something else.
        assert!(matches!(c.open("k", b"PK\x03\x04"), Err(CipherError::UnknownFormat)));
    }

    #[test]
    fn test_short_key_rejected() {
        let short = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
        assert!(matches!(
            ArchiveCipher::from_base64_key(&short),
            Err(CipherError::InvalidKey)
        ));
    }
}
