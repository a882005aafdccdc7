/*!
 * Credential Wrapper
 * Protects an issued private key at rest under a password-derived key.
 *
 * Wrapping key: PBKDF2-HMAC-SHA256(password, salt, iterations) -> 32 bytes.
 * Cipher: AES-256-GCM with a random 96-bit nonce stored beside the salt.
 *
 * Flat layout (all lengths fixed except the ciphertext):
 *
 *   version   u8        = 1
 *   iterations u32 BE
 *   salt      16 bytes
 *   nonce     12 bytes
 *   ciphertext 48 bytes (PKCS#8 private key) + 16-byte GCM tag
 *
 * The 5-byte header is bound into the AEAD associated data.
 */

use std::num::NonZeroU32;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::keys::PrivateKey;

pub const WRAP_VERSION: u8 = 1;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = 5;

/// OWASP 2023 guidance for PBKDF2-HMAC-SHA256.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

const WRAP_DOMAIN: &[u8] = b"biokey/wrap/v1";
const WRAPPING_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedPrivateKey {
    pub iterations: u32,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted key with the GCM tag appended.
    pub ciphertext: Vec<u8>,
}

impl WrappedPrivateKey {
    fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0] = WRAP_VERSION;
        header[1..].copy_from_slice(&self.iterations.to_be_bytes());
        header
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(HEADER_LEN + SALT_LEN + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses the flat layout. Any structural problem is reported the same
    /// way as a failed tag check.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let fixed = HEADER_LEN + SALT_LEN + NONCE_LEN;
        if bytes.len() < fixed + TAG_LEN || bytes[0] != WRAP_VERSION {
            return Err(Error::WrongPasswordOrCorrupted);
        }

        let mut iterations = [0u8; 4];
        iterations.copy_from_slice(&bytes[1..HEADER_LEN]);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + SALT_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[HEADER_LEN + SALT_LEN..fixed]);

        Ok(Self {
            iterations: u32::from_be_bytes(iterations),
            salt,
            nonce,
            ciphertext: bytes[fixed..].to_vec(),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded).map_err(|_| Error::WrongPasswordOrCorrupted)?;
        Self::from_bytes(&bytes)
    }

    fn aad(&self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(WRAP_DOMAIN.len() + HEADER_LEN);
        aad.extend_from_slice(WRAP_DOMAIN);
        aad.extend_from_slice(&self.header());
        aad
    }
}

pub struct CredentialWrapper {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl CredentialWrapper {
    pub fn new(iterations: NonZeroU32) -> Self {
        Self {
            iterations,
            rng: SystemRandom::new(),
        }
    }

    pub fn iterations(&self) -> NonZeroU32 {
        self.iterations
    }

    pub fn wrap(&self, key: &PrivateKey, password: &str) -> Result<WrappedPrivateKey> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut salt)
            .and_then(|_| self.rng.fill(&mut nonce))
            .map_err(|_| Error::Internal("system RNG failure".to_string()))?;

        let mut wrapped = WrappedPrivateKey {
            iterations: self.iterations.get(),
            salt,
            nonce,
            ciphertext: Vec::new(),
        };

        let sealing_key = aead_key(&derive_wrapping_key(
            password,
            &wrapped.salt,
            self.iterations,
        ))?;

        let mut in_out = key.to_pkcs8_der().to_vec();
        let sealed = sealing_key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(wrapped.nonce),
            Aad::from(wrapped.aad()),
            &mut in_out,
        );
        if sealed.is_err() {
            zeroize::Zeroize::zeroize(&mut in_out);
            return Err(Error::Internal("AES-GCM seal failed".to_string()));
        }

        wrapped.ciphertext = in_out;
        Ok(wrapped)
    }

    /// Uses the work factor recorded in `wrapped`, not the configured one.
    pub fn unwrap(&self, wrapped: &WrappedPrivateKey, password: &str) -> Result<PrivateKey> {
        let iterations =
            NonZeroU32::new(wrapped.iterations).ok_or(Error::WrongPasswordOrCorrupted)?;

        let opening_key = aead_key(&derive_wrapping_key(password, &wrapped.salt, iterations))?;

        let mut in_out = Zeroizing::new(wrapped.ciphertext.clone());
        let plaintext = opening_key
            .open_in_place(
                Nonce::assume_unique_for_key(wrapped.nonce),
                Aad::from(wrapped.aad()),
                &mut in_out,
            )
            .map_err(|_| Error::WrongPasswordOrCorrupted)?;

        PrivateKey::from_pkcs8_der(plaintext).ok_or(Error::WrongPasswordOrCorrupted)
    }
}

fn derive_wrapping_key(
    password: &str,
    salt: &[u8],
    iterations: NonZeroU32,
) -> Zeroizing<[u8; WRAPPING_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; WRAPPING_KEY_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut key[..],
    );
    key
}

fn aead_key(key: &[u8; WRAPPING_KEY_LEN]) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Internal("invalid AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}
