//! Async drivers for the signing rounds over a [`Relay`]

use super::{CommitmentMessage, PartialMessage, SignRequest, Signer, SigningPackage, SigningSession};
use crate::manager::KeyManager;
use crate::mpc::Relay;
use crate::sign::Coordinator;
use crate::types::{ParticipantId, Signature};
use crate::{Error, Result};
use futures_util::future;
use rand::rngs::OsRng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Round carrying nonce commitments (signers → all)
pub const ROUND_COMMIT: u32 = 1;
/// Round carrying the signing package (coordinator → all)
pub const ROUND_PACKAGE: u32 = 2;
/// Round carrying partial signatures (signers → coordinator)
pub const ROUND_PARTIAL: u32 = 3;

/// Relay address of the coordinator for direct messages
pub const COORDINATOR_ID: &str = "coordinator";

/// Collection window per round when the caller does not choose one
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(10);

async fn within<T>(window: Duration, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(window, fut)
        .await
        .map_err(|_| Error::Timeout(what.to_string()))?
}

/// A driver that cannot continue leaves the session in `FAILED`
fn abort_on_error<T>(session: &mut SigningSession, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        session.fail(e.to_string());
    }
    result
}

/// Signer side of one session: commit, wait for the package, answer with a partial.
#[instrument(skip_all, fields(participant = %signer.id(), session = %hex::encode(request.session_id)))]
pub async fn run_signer<R: Relay>(
    signer: &Signer,
    relay: &R,
    request: &SignRequest,
    window: Duration,
) -> Result<PartialMessage> {
    if !request.signers.contains(signer.id()) {
        return Err(Error::UnknownParticipant(signer.id().to_string()));
    }
    if request.epoch != signer.share().epoch {
        return Err(Error::InactiveSigner(signer.id().to_string()));
    }

    let (nonce, commitment) = signer.commit(request.session_id, &mut OsRng)?;
    let package = match await_package(relay, request, &commitment, window).await {
        Ok(package) => package,
        Err(e) => {
            signer.abandon(nonce);
            return Err(e);
        }
    };

    let partial = signer.sign(nonce, &package)?;
    relay
        .send_direct(
            &request.session_id,
            ROUND_PARTIAL,
            &ParticipantId::from(COORDINATOR_ID),
            &partial,
        )
        .await?;
    debug!("Sent partial signature");
    Ok(partial)
}

/// Publish our commitment and wait for the coordinator's package
async fn await_package<R: Relay>(
    relay: &R,
    request: &SignRequest,
    commitment: &CommitmentMessage,
    window: Duration,
) -> Result<SigningPackage> {
    relay
        .broadcast(&request.session_id, ROUND_COMMIT, commitment)
        .await?;
    debug!("Broadcast commitment");

    let mut packages: Vec<SigningPackage> = within(
        window,
        "signing package",
        relay.collect_broadcasts(&request.session_id, ROUND_PACKAGE, 1),
    )
    .await?;
    let package = packages
        .pop()
        .ok_or_else(|| Error::Relay("empty package round".into()))?;
    if package.message_hash != request.message_hash {
        return Err(Error::SecurityViolation(
            "package message differs from the announced request".into(),
        ));
    }
    Ok(package)
}

/// Coordinator side of one session. A missed window fails the session.
#[instrument(skip_all, fields(session = %hex::encode(session.id())))]
pub async fn run_coordinator<R: Relay>(
    session: &mut SigningSession,
    manager: &KeyManager,
    relay: &R,
    window: Duration,
) -> Result<Signature> {
    let session_id = *session.id();
    let count = session.signer_count();

    let commitments: Vec<CommitmentMessage> = match within(
        window,
        "nonce commitments",
        relay.collect_broadcasts(&session_id, ROUND_COMMIT, count),
    )
    .await
    {
        Ok(commitments) => commitments,
        Err(e) => {
            session.fail(format!("{e}; missing {:?}", session.missing_commitments()));
            return Err(e);
        }
    };
    for commitment in commitments {
        let added = session.add_commitment(commitment);
        abort_on_error(session, added)?;
    }

    let package = session.aggregate();
    let package = abort_on_error(session, package)?;
    relay.broadcast(&session_id, ROUND_PACKAGE, &package).await?;

    let partials: Vec<PartialMessage> = match within(
        window,
        "partial signatures",
        relay.collect_direct(&session_id, ROUND_PARTIAL, &ParticipantId::from(COORDINATOR_ID), count),
    )
    .await
    {
        Ok(partials) => partials,
        Err(e) => {
            session.fail(e.to_string());
            return Err(e);
        }
    };
    for partial in partials {
        let added = session.add_partial(partial);
        abort_on_error(session, added)?;
    }

    let group = manager.snapshot().await;
    session.finalize(&group)
}

/// Run a whole signing session in-process: open it, drive the coordinator
/// and every signer concurrently, and return the aggregate signature.
///
/// The session's relay traffic is discarded once it settles, on success or
/// failure.
#[instrument(skip_all, fields(n_signers = signers.len()))]
pub async fn run_signing<R: Relay>(
    manager: &KeyManager,
    coordinator: &Coordinator,
    signers: &[&Signer],
    message_hash: [u8; 32],
    relay: &R,
    window: Duration,
) -> Result<Signature> {
    let group = manager.snapshot().await;
    let ids: Vec<ParticipantId> = signers.iter().map(|s| s.id().clone()).collect();
    let mut session = coordinator.open_session(&group, &ids, message_hash)?;
    let request = session.request();

    let signer_runs = future::join_all(
        signers
            .iter()
            .map(|signer| run_signer(signer, relay, &request, window)),
    );
    let (signature, partials) =
        future::join(run_coordinator(&mut session, manager, relay, window), signer_runs).await;

    for (id, result) in ids.iter().zip(&partials) {
        if let Err(e) = result {
            warn!(participant = %id, error = %e, "Signer did not complete");
        }
    }

    if let Err(e) = relay.discard(&request.session_id).await {
        warn!(session = %hex::encode(request.session_id), error = %e, "Could not discard session traffic");
    }

    let signature = signature?;
    info!(
        session = %hex::encode(request.session_id),
        state = %session.state(),
        "Signature produced"
    );
    Ok(signature)
}
