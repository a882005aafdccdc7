/*!
 * Key material issued by the authority.
 *
 * Ed25519 pairs, with RFC 8410 DER encodings (SubjectPublicKeyInfo for the
 * public half, PKCS#8 v1 for the private half) and their PEM armour.
 */

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::signature::{Ed25519KeyPair, KeyPair as _};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SEED_LEN: usize = 32;

const SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

const PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04,
    0x20,
];

pub const SPKI_DER_LEN: usize = SPKI_PREFIX.len() + PUBLIC_KEY_LEN;
pub const PKCS8_DER_LEN: usize = PKCS8_PREFIX.len() + SEED_LEN;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    pub fn to_spki_der(&self) -> Vec<u8> {
        let mut der = Vec::with_capacity(SPKI_DER_LEN);
        der.extend_from_slice(&SPKI_PREFIX);
        der.extend_from_slice(&self.0);
        der
    }

    pub fn to_pem(&self) -> String {
        pem_encode("PUBLIC KEY", &self.to_spki_der())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

/// Ed25519 seed. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; SEED_LEN]);

impl PrivateKey {
    pub fn from_seed(seed: [u8; SEED_LEN]) -> Self {
        Self(seed)
    }

    pub fn seed(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        let pair = Ed25519KeyPair::from_seed_unchecked(&self.0)
            .map_err(|_| Error::Internal("rejected Ed25519 seed".to_string()))?;
        let mut public = [0u8; PUBLIC_KEY_LEN];
        public.copy_from_slice(pair.public_key().as_ref());
        Ok(PublicKey(public))
    }

    pub fn to_pkcs8_der(&self) -> Zeroizing<Vec<u8>> {
        let mut der = Zeroizing::new(Vec::with_capacity(PKCS8_DER_LEN));
        der.extend_from_slice(&PKCS8_PREFIX);
        der.extend_from_slice(&self.0);
        der
    }

    /// Parses the exact PKCS#8 v1 layout produced by
    /// [`to_pkcs8_der`](Self::to_pkcs8_der).
    pub fn from_pkcs8_der(der: &[u8]) -> Option<Self> {
        if der.len() != PKCS8_DER_LEN || der[..PKCS8_PREFIX.len()] != PKCS8_PREFIX {
            return None;
        }
        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(&der[PKCS8_PREFIX.len()..]);
        Some(Self(seed))
    }

    pub fn to_pem(&self) -> Zeroizing<String> {
        Zeroizing::new(pem_encode("PRIVATE KEY", &self.to_pkcs8_der()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    pub fn from_seed(seed: [u8; SEED_LEN]) -> Result<Self> {
        let private = PrivateKey::from_seed(seed);
        let public = private.public_key()?;
        Ok(Self { public, private })
    }
}

fn pem_encode(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for line in body.as_bytes().chunks(64) {
        // base64 output is ASCII
        pem.push_str(std::str::from_utf8(line).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}
