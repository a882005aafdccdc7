/*!
 * Server configuration
 * Environment-driven settings; the master secret never appears in Debug output.
 */

use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroU32;

use anyhow::{bail, Context, Result};

use crate::authority::MasterSecret;
use crate::biometric::{Metric, DEFAULT_THRESHOLD};
use crate::enrollment::EnrollmentSettings;
use crate::features::MAX_DECIMALS;
use crate::wrap::DEFAULT_ITERATIONS;

/// Where the authority's master secret comes from.
pub enum MasterSecretSource {
    /// Provided by the operator; keys survive restarts.
    Configured(MasterSecret),
    /// Generated at startup; every restart re-keys the authority.
    Ephemeral,
}

// Custom Debug implementation to prevent secret leakage
impl fmt::Debug for MasterSecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterSecretSource::Configured(_) => f.write_str("Configured([REDACTED])"),
            MasterSecretSource::Ephemeral => f.write_str("Ephemeral"),
        }
    }
}

/// Server configuration
#[derive(Debug)]
pub struct Config {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    pub master_secret: MasterSecretSource,

    /// Feature vector dimensionality (D)
    pub feature_dimension: usize,

    /// Fractional digits kept by the normalizer
    pub feature_decimals: u8,

    pub match_metric: Metric,

    pub match_threshold: f64,

    /// PBKDF2 work factor for newly wrapped keys
    pub kdf_iterations: NonZeroU32,

    /// Concurrent wrap/unwrap computations
    pub kdf_concurrency: usize,

    /// Request body cap in bytes
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind_address = var("BIND_ADDRESS", "0.0.0.0:8080")
            .parse()
            .context("BIND_ADDRESS must be host:port")?;

        let ephemeral = parse_bool(&var("MASTER_SECRET_EPHEMERAL", "false"))?;
        let master_secret = match lookup("MASTER_SECRET") {
            Some(encoded) => MasterSecretSource::Configured(
                MasterSecret::from_hex(&encoded)
                    .context("MASTER_SECRET must be 32 bytes (64 hex chars)")?,
            ),
            None if ephemeral => MasterSecretSource::Ephemeral,
            None => bail!(
                "MASTER_SECRET environment variable required \
                 (or set MASTER_SECRET_EPHEMERAL=true for a throwaway authority)"
            ),
        };

        let feature_dimension: usize = var("FEATURE_DIMENSION", "128")
            .parse()
            .context("FEATURE_DIMENSION must be an integer")?;
        if feature_dimension == 0 {
            bail!("FEATURE_DIMENSION must be at least 1");
        }

        let feature_decimals: u8 = var("FEATURE_DECIMALS", "6")
            .parse()
            .context("FEATURE_DECIMALS must be an integer")?;
        if feature_decimals > MAX_DECIMALS {
            bail!("FEATURE_DECIMALS must be at most {MAX_DECIMALS}");
        }

        let match_metric = var("MATCH_METRIC", "euclidean")
            .parse::<Metric>()
            .map_err(anyhow::Error::msg)?;

        let match_threshold: f64 = var("MATCH_THRESHOLD", &DEFAULT_THRESHOLD.to_string())
            .parse()
            .context("MATCH_THRESHOLD must be a number")?;
        if !match_threshold.is_finite() || match_threshold < 0.0 {
            bail!("MATCH_THRESHOLD must be a finite, non-negative number");
        }

        let kdf_iterations = var("KDF_ITERATIONS", &DEFAULT_ITERATIONS.to_string())
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .context("KDF_ITERATIONS must be a positive integer")?;

        let default_concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let kdf_concurrency: usize = var("KDF_CONCURRENCY", &default_concurrency.to_string())
            .parse()
            .context("KDF_CONCURRENCY must be an integer")?;
        if kdf_concurrency == 0 {
            bail!("KDF_CONCURRENCY must be at least 1");
        }

        let max_body_bytes: usize = var("MAX_BODY_BYTES", "1048576")
            .parse()
            .context("MAX_BODY_BYTES must be an integer")?;

        Ok(Self {
            bind_address,
            master_secret,
            feature_dimension,
            feature_decimals,
            match_metric,
            match_threshold,
            kdf_iterations,
            kdf_concurrency,
            max_body_bytes,
        })
    }

    pub fn enrollment_settings(&self) -> EnrollmentSettings {
        EnrollmentSettings {
            dimension: self.feature_dimension,
            decimals: self.feature_decimals,
            metric: self.match_metric,
            threshold: self.match_threshold,
            kdf_iterations: self.kdf_iterations,
            kdf_concurrency: self.kdf_concurrency,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
