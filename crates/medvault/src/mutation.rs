//! The access mutation protocol: grant or revoke one identity's access to one
//! record.
//!
//! Each mutation runs Fetch → Unwrap → Recompute → Publish under the
//! subject's lock. Any failing step aborts the whole mutation; the new
//! envelope is stored before the pointer moves, and the session cache is
//! written only after the pointer update succeeds. Dropping the future at
//! any await leaves the published state and the cache untouched.

use std::collections::BTreeMap;

use medvault_core::{ContentId, CoreError, Envelope, SymmetricKey, WalletAddress};
use medvault_keys::{KeysError, SigningAgent};
use medvault_store::{AdminDirectory, ContentStore, PointerReceipt, PointerRegistry};
use tracing::{debug, info, warn};

use crate::config::RevocationMode;
use crate::error::{MutationStep, Result, VaultError};
use crate::vault::RecordVault;

/// Terminal state of a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOutcome {
    /// The target can read the record.
    Granted,
    /// The target can no longer read the record.
    Revoked,
}

/// Confirmation of a grant or revoke.
#[derive(Debug)]
pub struct MutationReceipt {
    /// The record's subject.
    pub subject: WalletAddress,
    /// The identity whose access changed.
    pub target: WalletAddress,
    /// What happened.
    pub outcome: MutationOutcome,
    /// False if the target already had (or already lacked) access and nothing
    /// was published.
    pub changed: bool,
    /// True if the record key was replaced.
    pub rotated: bool,
    /// The envelope now in force.
    pub content_id: ContentId,
    /// The registry's confirmation, when a new envelope was published.
    pub pointer: Option<PointerReceipt>,
    /// Who can read the envelope now in force.
    pub recipients: Vec<WalletAddress>,
    /// Remaining recipients the rotated key could not be wrapped for, left
    /// out under [`PartialWrapPolicy::PublishAvailable`](crate::PartialWrapPolicy).
    pub dropped: BTreeMap<WalletAddress, KeysError>,
}

/// The envelope a mutation will publish.
struct Recomputed {
    envelope: Envelope,
    key: SymmetricKey,
    rotated: bool,
    dropped: BTreeMap<WalletAddress, KeysError>,
}

impl<S, R, D, A> RecordVault<S, R, D, A>
where
    S: ContentStore,
    R: PointerRegistry,
    D: AdminDirectory,
    A: SigningAgent,
{
    /// Let `target` read `subject`'s record.
    ///
    /// `initiator` must already be a recipient. The record body is untouched;
    /// only a wrapped key for `target` is added.
    pub async fn grant_access(
        &self,
        initiator: &WalletAddress,
        subject: &WalletAddress,
        target: &WalletAddress,
    ) -> Result<MutationReceipt> {
        self.mutate(initiator, subject, target, MutationOutcome::Granted)
            .await
    }

    /// Stop `target` from reading `subject`'s record.
    ///
    /// `initiator` must already be a recipient. The subject can never be
    /// revoked. Whether the key is rotated follows [`RevocationMode`].
    pub async fn revoke_access(
        &self,
        initiator: &WalletAddress,
        subject: &WalletAddress,
        target: &WalletAddress,
    ) -> Result<MutationReceipt> {
        self.mutate(initiator, subject, target, MutationOutcome::Revoked)
            .await
    }

    async fn mutate(
        &self,
        initiator: &WalletAddress,
        subject: &WalletAddress,
        target: &WalletAddress,
        outcome: MutationOutcome,
    ) -> Result<MutationReceipt> {
        let _guard = self.locks.lock(subject).await;

        // ── Fetch ──
        debug!(step = %MutationStep::Fetch, subject = %subject, target = %target, ?outcome);
        let (content_id, envelope) = self
            .fetch_envelope(subject)
            .await
            .map_err(VaultError::aborted(MutationStep::Fetch))?;

        if !envelope.is_recipient(initiator) {
            return Err(VaultError::aborted(MutationStep::Unwrap)(
                VaultError::AccessDenied {
                    identity: *initiator,
                    subject: *subject,
                },
            ));
        }

        if outcome == MutationOutcome::Revoked && target == subject {
            return Err(VaultError::aborted(MutationStep::Recompute)(
                CoreError::InvariantViolation(format!(
                    "subject {subject} cannot be revoked from its own record"
                ))
                .into(),
            ));
        }

        let already = match outcome {
            MutationOutcome::Granted => envelope.is_recipient(target),
            MutationOutcome::Revoked => !envelope.is_recipient(target),
        };
        if already {
            debug!(subject = %subject, target = %target, ?outcome, "no change needed");
            return Ok(MutationReceipt {
                subject: *subject,
                target: *target,
                outcome,
                changed: false,
                rotated: false,
                content_id,
                pointer: None,
                recipients: envelope.recipients().copied().collect(),
                dropped: BTreeMap::new(),
            });
        }

        // ── Unwrap ──
        debug!(step = %MutationStep::Unwrap, initiator = %initiator);
        let (key, plaintext) = self
            .open_envelope(initiator, &envelope)
            .await
            .map_err(VaultError::aborted(MutationStep::Unwrap))?;

        // ── Recompute ──
        debug!(step = %MutationStep::Recompute);
        let Recomputed {
            envelope: next,
            key,
            rotated,
            dropped,
        } = self
            .recompute(initiator, target, outcome, &envelope, key, &plaintext)
            .await
            .map_err(VaultError::aborted(MutationStep::Recompute))?;

        // ── Publish ──
        debug!(step = %MutationStep::Publish);
        let (new_content_id, pointer) = self
            .publish(&next, Some(&content_id))
            .await
            .map_err(VaultError::aborted(MutationStep::Publish))?;

        if next.is_recipient(initiator) {
            self.cache.put(*subject, key);
        } else {
            self.cache.invalidate(subject);
        }

        info!(
            subject = %subject,
            target = %target,
            ?outcome,
            rotated,
            cid = %new_content_id,
            "access updated"
        );
        Ok(MutationReceipt {
            subject: *subject,
            target: *target,
            outcome,
            changed: true,
            rotated,
            content_id: new_content_id,
            pointer: Some(pointer),
            recipients: next.recipients().copied().collect(),
            dropped,
        })
    }

    /// Compute the next envelope and the key it is sealed under.
    async fn recompute(
        &self,
        initiator: &WalletAddress,
        target: &WalletAddress,
        outcome: MutationOutcome,
        envelope: &Envelope,
        key: SymmetricKey,
        plaintext: &[u8],
    ) -> Result<Recomputed> {
        match (outcome, self.config.revocation) {
            (MutationOutcome::Granted, _) => {
                let wrapped = self.wrapper.wrap_key_for(&self.agent, target, &key).await?;
                Ok(Recomputed {
                    envelope: envelope.with_recipient(*target, wrapped),
                    key,
                    rotated: false,
                    dropped: BTreeMap::new(),
                })
            }
            (MutationOutcome::Revoked, RevocationMode::RetainKey) => {
                warn!(
                    subject = %envelope.subject(),
                    target = %target,
                    "revoking without key rotation; the revoked party may still hold the record key"
                );
                Ok(Recomputed {
                    envelope: envelope.without_recipient(target)?,
                    key,
                    rotated: false,
                    dropped: BTreeMap::new(),
                })
            }
            (MutationOutcome::Revoked, RevocationMode::Rotate) => {
                let fresh = SymmetricKey::generate();
                let sealed = fresh.encrypt_bytes(plaintext)?;

                let remaining: Vec<WalletAddress> = envelope
                    .recipients()
                    .filter(|id| *id != target)
                    .copied()
                    .collect();
                let report = self
                    .wrapper
                    .wrap_for_recipients(&self.agent, remaining, &fresh)
                    .await;
                let (keys, dropped) =
                    self.apply_wrap_policy(report, &[*envelope.subject(), *initiator])?;

                Ok(Recomputed {
                    envelope: envelope.with_body(sealed, keys)?,
                    key: fresh,
                    rotated: true,
                    dropped,
                })
            }
        }
    }
}
