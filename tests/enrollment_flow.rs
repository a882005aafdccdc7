use std::num::NonZeroU32;
use std::sync::Arc;

use biokey_server::authority::{KeyAuthority, MasterSecret};
use biokey_server::biometric::Metric;
use biokey_server::enrollment::{EnrollmentService, EnrollmentSettings};
use biokey_server::extract::EmbeddingExtractor;
use biokey_server::features::FeatureVector;
use biokey_server::store::InMemoryStore;
use biokey_server::Error;

const DIM: usize = 8;

fn service(secret: [u8; 32]) -> EnrollmentService {
    let settings = EnrollmentSettings {
        dimension: DIM,
        decimals: 6,
        metric: Metric::Euclidean,
        threshold: 0.6,
        kdf_iterations: NonZeroU32::new(1_000).unwrap(),
        kdf_concurrency: 4,
    };
    EnrollmentService::new(
        settings,
        Arc::new(KeyAuthority::with_secret(MasterSecret::from_bytes(secret))),
        Arc::new(InMemoryStore::new()),
        Arc::new(EmbeddingExtractor::new(DIM)),
    )
}

fn v1() -> FeatureVector {
    FeatureVector::new(vec![0.12, -0.08, 0.31, 0.44, -0.27, 0.05, 0.19, -0.36])
}

fn v1_perturbed() -> FeatureVector {
    FeatureVector::new(v1().as_slice().iter().map(|x| x + 0.01).collect())
}

fn v_other_subject() -> FeatureVector {
    FeatureVector::new(vec![-0.41, 0.33, -0.12, -0.29, 0.38, -0.22, -0.17, 0.26])
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let svc = service([0x42; 32]);

    let receipt = svc.enroll("u1", &v1(), "pw123").await.unwrap();
    assert_eq!(receipt.wrapped_private_key.salt.len(), 16);

    let exact = svc.verify("u1", &v1()).await.unwrap();
    assert_eq!(exact.public_key, receipt.public_key);

    let close = svc.verify("u1", &v1_perturbed()).await.unwrap();
    assert_eq!(close.public_key, receipt.public_key);
    assert!(close.distance > 0.0 && close.distance <= 0.6);

    assert!(matches!(
        svc.verify("u1", &v_other_subject()).await,
        Err(Error::BiometricMismatch)
    ));

    let private_key = svc.recover_private_key("u1", "pw123").await.unwrap();
    assert_eq!(private_key.public_key().unwrap(), receipt.public_key);

    assert!(matches!(
        svc.recover_private_key("u1", "wrongpw").await,
        Err(Error::WrongPasswordOrCorrupted)
    ));
}

#[tokio::test]
async fn test_matching_sample_need_not_share_digest() {
    // The perturbed sample verifies, yet enrolling it would issue a
    // different key: the digest identifies one capture, not the subject.
    let svc = service([0x42; 32]);
    let original = svc.enroll("capture-a", &v1(), "pw").await.unwrap();
    let perturbed = svc.enroll("capture-b", &v1_perturbed(), "pw").await.unwrap();

    assert_ne!(original.public_key, perturbed.public_key);
    assert!(svc.verify("capture-a", &v1_perturbed()).await.is_ok());
}

#[tokio::test]
async fn test_issued_keys_stable_across_restart() {
    let before = service([0x42; 32]).enroll("u1", &v1(), "pw").await.unwrap();
    let after = service([0x42; 32]).enroll("u1", &v1(), "pw").await.unwrap();
    assert_eq!(before.public_key, after.public_key);

    let rekeyed = service([0x43; 32]).enroll("u1", &v1(), "pw").await.unwrap();
    assert_ne!(before.public_key, rekeyed.public_key);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enrollment_single_winner() {
    let svc = Arc::new(service([0x42; 32]));

    let mut handles = Vec::new();
    for i in 0..16 {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            let password = format!("pw-{i}");
            svc.enroll("a@x.com", &v1(), &password).await
        }));
    }

    let mut winners = Vec::new();
    let mut already_registered = 0;
    for (i, handle) in handles.into_iter().enumerate() {
        match handle.await.unwrap() {
            Ok(_) => winners.push(i),
            Err(Error::AlreadyRegistered(label)) => {
                assert_eq!(label, "a@x.com");
                already_registered += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(already_registered, 15);

    // the stored credential belongs to the single winner
    let winner_password = format!("pw-{}", winners[0]);
    assert!(svc.recover_private_key("a@x.com", &winner_password).await.is_ok());
}

#[tokio::test]
async fn test_unknown_label() {
    let svc = service([0x42; 32]);
    assert!(matches!(
        svc.verify("ghost", &v1()).await,
        Err(Error::NotRegistered(_))
    ));
    assert!(matches!(
        svc.recover_private_key("ghost", "pw").await,
        Err(Error::NotRegistered(_))
    ));
}
