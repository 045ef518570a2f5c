//! Membership changes, resharing and share secrecy

use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use quorum_core::arith;
use quorum_core::encoding;
use quorum_core::keygen::{self, Polynomial};
use quorum_core::mpc::MemoryRelay;
use quorum_core::sign::{self, Coordinator, Signer};
use quorum_core::{verify, Error, GroupConfig, KeyEpoch, KeyManager, KeyShare, ParticipantId};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(5);

fn group(t: usize, n: usize) -> KeyManager {
    let ids = (1..=n).map(|i| ParticipantId::new(format!("p{i}"))).collect();
    KeyManager::generate(GroupConfig::new(t, ids).unwrap()).unwrap()
}

async fn sign_with(manager: &KeyManager, ids: &[&str], message: &[u8]) -> bool {
    let mut signers = Vec::new();
    for id in ids {
        signers.push(Signer::new(manager.share(&ParticipantId::from(*id)).await.unwrap()));
    }
    let refs: Vec<&Signer> = signers.iter().collect();
    let hash = encoding::hash_message(message);
    let signature = sign::run_signing(
        manager,
        &Coordinator::new(),
        &refs,
        hash,
        &MemoryRelay::new(),
        WINDOW,
    )
    .await
    .unwrap();
    verify::verify(&hash, &signature.to_bytes(), manager.group_key().await.as_bytes())
}

#[tokio::test]
async fn test_set_threshold_invariants() {
    let manager = group(3, 5);
    assert!(matches!(manager.set_threshold(2).await, Err(Error::SecurityViolation(_))));
    assert!(matches!(manager.set_threshold(0).await, Err(Error::InvalidConfig(_))));
    assert!(matches!(manager.set_threshold(6).await, Err(Error::InvalidConfig(_))));
    assert_eq!(manager.get_config().await, (3, 5));
    assert_eq!(manager.epoch().await, KeyEpoch::GENESIS);

    manager.set_threshold(4).await.unwrap();
    assert_eq!(manager.get_config().await, (4, 5));
    assert!(sign_with(&manager, &["p1", "p2", "p4", "p5"], b"four of five").await);
}

#[tokio::test]
async fn test_remove_invariants() {
    let manager = group(3, 4);
    manager.remove("p4").await.unwrap();
    assert_eq!(manager.get_config().await, (3, 3));

    // 3 active with t = 3: nobody else may leave
    assert!(matches!(manager.remove("p1").await, Err(Error::InvalidConfig(_))));
    assert!(matches!(manager.remove("p4").await, Err(Error::UnknownParticipant(_))));
    assert_eq!(manager.get_active().await.len(), 3);
}

#[tokio::test]
async fn test_add_invariants() {
    let manager = group(2, 3);
    manager.add("p4").await.unwrap();
    assert!(matches!(manager.add("p4").await, Err(Error::InvalidConfig(_))));
    // 2 of 5 would no longer be a majority
    assert!(matches!(manager.add("p5").await, Err(Error::SecurityViolation(_))));

    manager.set_threshold(3).await.unwrap();
    manager.add("p5").await.unwrap();
    assert_eq!(manager.get_config().await, (3, 5));
    assert!(sign_with(&manager, &["p3", "p4", "p5"], b"new members sign").await);
}

#[tokio::test]
async fn test_group_key_survives_every_change() {
    let manager = group(2, 3);
    let key = manager.group_key().await;

    manager.add("p4").await.unwrap();
    manager.refresh().await.unwrap();
    manager.set_threshold(3).await.unwrap();
    manager.remove("p1").await.unwrap();

    assert_eq!(manager.group_key().await, key);
    assert_eq!(manager.epoch().await, KeyEpoch(4));
    assert_eq!(manager.get_config().await, (3, 3));
    assert!(sign_with(&manager, &["p2", "p3", "p4"], b"after churn").await);
}

#[tokio::test]
async fn test_old_shares_invalidated_by_refresh() {
    let manager = group(2, 3);
    let old: Vec<KeyShare> = {
        let mut shares = Vec::new();
        for id in ["p1", "p2", "p3"] {
            shares.push(manager.share(&id.into()).await.unwrap());
        }
        shares
    };

    manager.refresh().await.unwrap();
    let state = manager.export().await;
    for share in &old {
        assert!(keygen::verify_share(share, &state.commitments).is_err());
        assert_ne!(state.shares[&share.participant].public_share, share.public_share);
    }

    // Mixing one old and one new share interpolates to garbage.
    let fresh = &state.shares[&ParticipantId::from("p2")];
    let mixed = [&old[0], fresh];
    let indices = [old[0].index, fresh.index];
    let mut secret = Scalar::ZERO;
    for share in mixed {
        secret += share.secret_share * arith::lagrange_scalar(share.index, &indices).unwrap();
    }
    assert_ne!(
        (ProjectivePoint::GENERATOR * secret).to_affine(),
        state.group_key.to_projective().unwrap().to_affine()
    );
}

#[test]
fn test_fewer_than_threshold_shares_miss_the_secret() {
    let mut rng = ChaCha20Rng::seed_from_u64(0x5eed);
    let config = GroupConfig::new(
        3,
        (1..=5).map(|i| ParticipantId::new(format!("p{i}"))).collect(),
    )
    .unwrap();

    for epoch in 0..50 {
        let output = keygen::deal(&config, KeyEpoch(epoch), &mut rng).unwrap();
        let shares: Vec<&KeyShare> = output.shares.values().collect();
        let target = output.group_key.to_projective().unwrap();

        let pair = [shares[0], shares[3]];
        let indices = [pair[0].index, pair[1].index];
        let mut guess = Scalar::ZERO;
        for share in pair {
            guess += share.secret_share * arith::lagrange_scalar(share.index, &indices).unwrap();
        }
        assert_ne!(ProjectivePoint::GENERATOR * guess, target);
    }
}

#[test]
fn test_single_share_is_independent_of_secret() {
    // With t = 2 the share at x = 1 is secret + a_1 with a_1 uniform, so its
    // low bit is a fair coin whatever the secret is.
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let trials = 2_000;

    for secret in [Scalar::ZERO, Scalar::ONE, Scalar::random(&mut rng)] {
        let mut odd = 0;
        for _ in 0..trials {
            let poly = Polynomial::with_constant(&mut rng, 2, &secret).unwrap();
            if poly.evaluate(1).to_bytes()[31] & 1 == 1 {
                odd += 1;
            }
        }
        assert!((850..=1150).contains(&odd), "biased share distribution: {odd}/{trials}");
    }
}
