/*!
 * Biometric-bound key issuance and recovery.
 *
 * A feature vector is normalized and hashed into a canonical identity
 * digest, a simulated key authority derives an Ed25519 pair from that
 * digest, and the private half is wrapped under a password-derived key.
 * A later sample releases the public key only if it matches the enrolled
 * sample within the configured tolerance.
 */

pub mod authority;
pub mod biometric;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod extract;
pub mod features;
pub mod identity;
pub mod keys;
pub mod server;
pub mod store;
pub mod wrap;

pub use error::{Error, Result};
