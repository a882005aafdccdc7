/*!
 * Enrollment storage collaborator.
 *
 * Durable persistence lives behind [`EnrollmentStore`]; [`InMemoryStore`]
 * backs the server by default and the tests.
 */

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::features::FeatureVector;
use crate::keys::PublicKey;
use crate::wrap::WrappedPrivateKey;

/// Created once per identity label and never modified.
#[derive(Debug, Clone)]
pub struct EnrollmentRecord {
    pub identity_label: String,
    /// Normalized enrollment vector, retained for matching.
    pub features: FeatureVector,
    pub public_key: PublicKey,
    pub wrapped_private_key: WrappedPrivateKey,
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn get(&self, identity_label: &str) -> Result<Option<EnrollmentRecord>>;

    /// Stores `record` unless the label is taken. Returns whether it was stored.
    async fn put_if_absent(&self, record: EnrollmentRecord) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, EnrollmentRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryStore {
    async fn get(&self, identity_label: &str) -> Result<Option<EnrollmentRecord>> {
        Ok(self.records.read().await.get(identity_label).cloned())
    }

    async fn put_if_absent(&self, record: EnrollmentRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.identity_label) {
            return Ok(false);
        }
        records.insert(record.identity_label.clone(), record);
        Ok(true)
    }
}
