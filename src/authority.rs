/*!
 * Key Authority Simulator
 * Derives an identity-keyed Ed25519 pair from (master secret, canonical digest).
 *
 * This is deterministic seeded key generation, not an identity-based
 * encryption scheme. It offers none of the collusion resistance of a real
 * IBE construction; a caller that needs those properties must put an actual
 * IBE library behind `issue`.
 */

use std::fmt;
use std::sync::OnceLock;

use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};
use crate::identity::CanonicalDigest;
use crate::keys::{KeyPair, PublicKey, SEED_LEN};

const AUTHORITY_SALT: &[u8] = b"biokey/authority/v1";

pub const MASTER_SECRET_LEN: usize = 32;

/// Process-wide authority secret. Never serialized to a response.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret([u8; MASTER_SECRET_LEN]);

impl MasterSecret {
    pub fn from_bytes(bytes: [u8; MASTER_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(encoded: &str) -> std::result::Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; MASTER_SECRET_LEN];
        hex::decode_to_slice(encoded.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; MASTER_SECRET_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| Error::Internal("system RNG failure".to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}

/// `ring::hkdf` output length marker for an Ed25519 seed.
struct SeedLen;

impl hkdf::KeyType for SeedLen {
    fn len(&self) -> usize {
        SEED_LEN
    }
}

/// Holds the master secret once installed; read-only afterwards, so any
/// number of concurrent `issue` calls may share it.
pub struct KeyAuthority {
    master: OnceLock<MasterSecret>,
}

impl KeyAuthority {
    pub fn uninitialized() -> Self {
        Self {
            master: OnceLock::new(),
        }
    }

    pub fn with_secret(secret: MasterSecret) -> Self {
        let authority = Self::uninitialized();
        // freshly created, cannot already be set
        let _ = authority.master.set(secret);
        authority
    }

    /// Installs the master secret. A second install is refused.
    pub fn install(&self, secret: MasterSecret) -> Result<()> {
        self.master
            .set(secret)
            .map_err(|_| Error::Internal("master secret already installed".to_string()))
    }

    pub fn is_ready(&self) -> bool {
        self.master.get().is_some()
    }

    pub fn issue(&self, identity: &CanonicalDigest) -> Result<KeyPair> {
        let mut seed = self.derive_seed(identity)?;
        let pair = KeyPair::from_seed(seed);
        seed.zeroize();
        pair
    }

    /// Re-derives only the public half for `identity`.
    pub fn public_key_for(&self, identity: &CanonicalDigest) -> Result<PublicKey> {
        Ok(self.issue(identity)?.public)
    }

    fn derive_seed(&self, identity: &CanonicalDigest) -> Result<[u8; SEED_LEN]> {
        let master = self.master.get().ok_or(Error::AuthorityUnavailable)?;

        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, AUTHORITY_SALT).extract(&master.0);
        let info = [identity.as_bytes().as_slice()];
        let okm = prk
            .expand(&info, SeedLen)
            .map_err(|_| Error::Internal("HKDF expand failed".to_string()))?;

        let mut seed = [0u8; SEED_LEN];
        okm.fill(&mut seed)
            .map_err(|_| Error::Internal("HKDF fill failed".to_string()))?;
        Ok(seed)
    }
}

impl fmt::Debug for KeyAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAuthority")
            .field("ready", &self.is_ready())
            .finish()
    }
}
