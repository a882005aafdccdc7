/*!
 * Enrollment / Verification Orchestrator
 *
 * The only component that sees both notions of "same identity": the exact
 * canonical digest that seeds key issuance at enrollment, and the tolerant
 * matcher that gates release of the public key at verification. It never
 * assumes the two agree.
 */

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{OwnedMutexGuard, Semaphore};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::authority::KeyAuthority;
use crate::biometric::{BiometricMatcher, Metric};
use crate::error::{Error, Result};
use crate::extract::FeatureExtractor;
use crate::features::{FeatureVector, Normalizer};
use crate::identity::IdentityHasher;
use crate::keys::{PrivateKey, PublicKey};
use crate::store::{EnrollmentRecord, EnrollmentStore};
use crate::wrap::{CredentialWrapper, WrappedPrivateKey};

#[derive(Debug, Clone, Copy)]
pub struct EnrollmentSettings {
    pub dimension: usize,
    pub decimals: u8,
    pub metric: Metric,
    pub threshold: f64,
    pub kdf_iterations: NonZeroU32,
    /// Upper bound on concurrent wrap/unwrap computations.
    pub kdf_concurrency: usize,
}

/// What a successful enrollment hands back. Never contains the plaintext
/// private key.
#[derive(Debug, Clone)]
pub struct EnrollmentReceipt {
    pub public_key: PublicKey,
    pub wrapped_private_key: WrappedPrivateKey,
}

#[derive(Debug, Clone, Copy)]
pub struct Verification {
    pub public_key: PublicKey,
    pub distance: f64,
}

pub struct EnrollmentService {
    normalizer: Normalizer,
    hasher: IdentityHasher,
    matcher: BiometricMatcher,
    authority: Arc<KeyAuthority>,
    wrapper: Arc<CredentialWrapper>,
    store: Arc<dyn EnrollmentStore>,
    extractor: Arc<dyn FeatureExtractor>,
    label_locks: LabelLocks,
    kdf_permits: Arc<Semaphore>,
}

impl EnrollmentService {
    pub fn new(
        settings: EnrollmentSettings,
        authority: Arc<KeyAuthority>,
        store: Arc<dyn EnrollmentStore>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        let normalizer = Normalizer::new(settings.dimension, settings.decimals);
        Self {
            normalizer,
            hasher: IdentityHasher::new(normalizer),
            matcher: BiometricMatcher::for_normalizer(
                &normalizer,
                settings.metric,
                settings.threshold,
            ),
            authority,
            wrapper: Arc::new(CredentialWrapper::new(settings.kdf_iterations)),
            store,
            extractor,
            label_locks: LabelLocks::default(),
            kdf_permits: Arc::new(Semaphore::new(settings.kdf_concurrency.max(1))),
        }
    }

    pub fn authority_ready(&self) -> bool {
        self.authority.is_ready()
    }

    pub async fn enroll_image(
        &self,
        identity_label: &str,
        image: &[u8],
        password: &str,
    ) -> Result<EnrollmentReceipt> {
        let features = self.extractor.extract(image)?;
        self.enroll(identity_label, &features, password).await
    }

    /// The registration check runs before the image is read.
    pub async fn verify_image(&self, identity_label: &str, image: &[u8]) -> Result<Verification> {
        let record = self.registered(identity_label).await?;
        let features = self.extractor.extract(image)?;
        self.verify_against(&record, &features)
    }

    /// At most one enrollment per label is in flight; the label lock is held
    /// from the registration check until the record is stored.
    pub async fn enroll(
        &self,
        identity_label: &str,
        features: &FeatureVector,
        password: &str,
    ) -> Result<EnrollmentReceipt> {
        let _label = self.label_locks.acquire(identity_label).await;

        if self.store.get(identity_label).await?.is_some() {
            return Err(Error::AlreadyRegistered(identity_label.to_string()));
        }

        let normalized = self.normalizer.normalize(features)?;
        let digest = self.hasher.digest(&normalized)?;
        let pair = self.authority.issue(&digest)?;
        debug!(identity_label, %digest, "identity key issued");

        let wrapped = self.wrap(pair.private, password).await?;

        let record = EnrollmentRecord {
            identity_label: identity_label.to_string(),
            features: normalized,
            public_key: pair.public,
            wrapped_private_key: wrapped.clone(),
        };
        if !self.store.put_if_absent(record).await? {
            return Err(Error::AlreadyRegistered(identity_label.to_string()));
        }

        info!(
            identity_label,
            kdf_iterations = self.wrapper.iterations().get(),
            "enrollment stored"
        );
        Ok(EnrollmentReceipt {
            public_key: pair.public,
            wrapped_private_key: wrapped,
        })
    }

    /// Releases the stored public key when the fresh sample matches.
    /// No password is involved.
    pub async fn verify(
        &self,
        identity_label: &str,
        features: &FeatureVector,
    ) -> Result<Verification> {
        let record = self.registered(identity_label).await?;
        self.verify_against(&record, features)
    }

    fn verify_against(
        &self,
        record: &EnrollmentRecord,
        features: &FeatureVector,
    ) -> Result<Verification> {
        let identity_label = record.identity_label.as_str();
        let fresh = self.normalizer.normalize(features)?;
        let result = self.matcher.compare(&fresh, &record.features)?;

        if !result.accepted {
            warn!(
                identity_label,
                metric = %self.matcher.metric(),
                distance = result.distance,
                threshold = self.matcher.threshold(),
                "biometric mismatch"
            );
            return Err(Error::BiometricMismatch);
        }

        info!(identity_label, distance = result.distance, "biometric verified");
        Ok(Verification {
            public_key: record.public_key,
            distance: result.distance,
        })
    }

    pub async fn recover_private_key(
        &self,
        identity_label: &str,
        password: &str,
    ) -> Result<PrivateKey> {
        let record = self.registered(identity_label).await?;

        let wrapper = Arc::clone(&self.wrapper);
        let password = Zeroizing::new(password.to_string());
        let wrapped = record.wrapped_private_key;
        let result = self
            .run_kdf(move || wrapper.unwrap(&wrapped, &password))
            .await;

        match &result {
            Ok(_) => info!(identity_label, "private key recovered"),
            Err(Error::WrongPasswordOrCorrupted) => {
                warn!(identity_label, "private key recovery refused")
            }
            Err(_) => {}
        }
        result
    }

    async fn registered(&self, identity_label: &str) -> Result<EnrollmentRecord> {
        self.store
            .get(identity_label)
            .await?
            .ok_or_else(|| Error::NotRegistered(identity_label.to_string()))
    }

    async fn wrap(&self, key: PrivateKey, password: &str) -> Result<WrappedPrivateKey> {
        let wrapper = Arc::clone(&self.wrapper);
        let password = Zeroizing::new(password.to_string());
        self.run_kdf(move || wrapper.wrap(&key, &password)).await
    }

    /// Runs password-KDF work on the blocking pool, bounded by `kdf_permits`.
    async fn run_kdf<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let _permit = Arc::clone(&self.kdf_permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("KDF pool closed".to_string()))?;

        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| Error::Internal(format!("KDF worker failed: {e}")))?
    }
}

/// Per-label async mutexes. Entries are dropped once nobody holds or waits
/// on them.
#[derive(Default)]
struct LabelLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LabelLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("label lock table was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    async fn acquire(&self, label: &str) -> LabelGuard<'_> {
        let lock = Arc::clone(self.map().entry(label.to_string()).or_default());
        let guard = lock.lock_owned().await;
        LabelGuard {
            guard: Some(guard),
            locks: self,
            label: label.to_string(),
        }
    }

    fn release(&self, label: &str) {
        let mut map = self.map();
        if map
            .get(label)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(label);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

struct LabelGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a LabelLocks,
    label: String,
}

impl Drop for LabelGuard<'_> {
    fn drop(&mut self) {
        // unlock before pruning so the strong count reflects waiters only
        self.guard.take();
        self.locks.release(&self.label);
    }
}
