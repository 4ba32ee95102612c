//! The record vault: unified API over the cipher, the key wrapper and the
//! external collaborators.
//!
//! A writer's record is encrypted under a fresh key, the key is wrapped for
//! every authorized recipient, the envelope is stored, and only then is the
//! subject's pointer moved. Readers resolve the pointer, fetch the envelope
//! and unwrap their own entry through their signing agent.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use medvault_core::{ContentId, CoreError, Envelope, RecipientKeys, SymmetricKey, WalletAddress};
use medvault_keys::{KeyWrapper, KeysError, SigningAgent, WrapReport};
use medvault_store::{AdminDirectory, ContentStore, PointerReceipt, PointerRegistry};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::cache::SessionKeyCache;
use crate::config::{PartialWrapPolicy, VaultConfig};
use crate::error::{Result, VaultError};
use crate::locks::SubjectLocks;

/// Confirmation of a published record version.
#[derive(Debug)]
pub struct RecordReceipt {
    /// The record's subject.
    pub subject: WalletAddress,
    /// Where the new envelope is stored.
    pub content_id: ContentId,
    /// The registry's confirmation of the pointer update.
    pub pointer: PointerReceipt,
    /// Who can read this version.
    pub recipients: Vec<WalletAddress>,
    /// Recipients left out under [`PartialWrapPolicy::PublishAvailable`],
    /// with why their key could not be wrapped.
    pub dropped: BTreeMap<WalletAddress, KeysError>,
}

/// One entry of [`RecordVault::list_records`].
#[derive(Debug)]
pub struct RecordListing<T> {
    /// The record's subject.
    pub subject: WalletAddress,
    /// The record, or why it could not be read.
    pub record: Result<T>,
}

/// The main vault struct.
///
/// Provides a unified API for:
/// - Creating, reading and updating records
/// - Listing every record the reader can see
/// - Granting and revoking access (see the mutation protocol)
///
/// One vault belongs to one session: it acts through one signing agent and
/// fills one key cache.
pub struct RecordVault<S, R, D, A> {
    pub(crate) store: S,
    pub(crate) registry: R,
    pub(crate) directory: D,
    pub(crate) agent: A,
    pub(crate) cache: Arc<SessionKeyCache>,
    pub(crate) locks: SubjectLocks,
    pub(crate) wrapper: KeyWrapper,
    pub(crate) config: VaultConfig,
}

impl<S, R, D, A> RecordVault<S, R, D, A>
where
    S: ContentStore,
    R: PointerRegistry,
    D: AdminDirectory,
    A: SigningAgent,
{
    /// Create a vault over the given collaborators.
    pub fn new(
        store: S,
        registry: R,
        directory: D,
        agent: A,
        cache: Arc<SessionKeyCache>,
        config: VaultConfig,
    ) -> Self {
        Self {
            store,
            registry,
            directory,
            agent,
            cache,
            locks: SubjectLocks::new(),
            wrapper: config.key_wrapper(),
            config,
        }
    }

    /// The vault's configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The session key cache.
    pub fn cache(&self) -> &Arc<SessionKeyCache> {
        &self.cache
    }

    /// The content store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The pointer registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The signing agent.
    pub fn agent(&self) -> &A {
        &self.agent
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt and publish a new record for `subject`.
    ///
    /// The recipients are every authorized administrator plus the writer and
    /// the subject. An existing record for the subject is superseded.
    pub async fn create_record<T>(
        &self,
        writer: &WalletAddress,
        subject: &WalletAddress,
        record: &T,
    ) -> Result<RecordReceipt>
    where
        T: Serialize + Sync + ?Sized,
    {
        let _guard = self.locks.lock(subject).await;

        let mut recipients = bounded(
            self.config.registry_timeout,
            "administrator list",
            self.directory.list_authorized_administrators(),
        )
        .await?;
        recipients.insert(*writer);
        recipients.insert(*subject);

        let key = SymmetricKey::generate();
        let sealed = key.encrypt(record)?;
        let report = self
            .wrapper
            .wrap_for_recipients(&self.agent, recipients, &key)
            .await;
        let (keys, dropped) = self.apply_wrap_policy(report, &[*subject, *writer])?;
        let envelope = Envelope::from_sealed(sealed, keys, *subject)?;

        let previous = bounded(
            self.config.registry_timeout,
            "pointer read",
            self.registry.get_pointer(subject),
        )
        .await?;
        if let Some(previous) = &previous {
            warn!(subject = %subject, previous = %previous, "superseding existing record");
        }

        let (content_id, pointer) = self.publish(&envelope, previous.as_ref()).await?;
        self.cache.put(*subject, key);

        Ok(RecordReceipt {
            subject: *subject,
            content_id,
            pointer,
            recipients: envelope.recipients().copied().collect(),
            dropped,
        })
    }

    /// Fetch and decrypt `subject`'s record as `reader`.
    ///
    /// Fails with `RecordNotFound` if the subject has no pointer and
    /// `AccessDenied` if the reader has no entry in the current envelope.
    pub async fn read_record<T>(&self, reader: &WalletAddress, subject: &WalletAddress) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let (_, envelope) = self.fetch_envelope(subject).await?;
        let (key, plaintext) = self.open_envelope(reader, &envelope).await?;

        let record = serde_json::from_slice(&plaintext)
            .map_err(|e| CoreError::DecodeFailure(e.to_string()))?;
        self.cache.put(*subject, key);

        debug!(reader = %reader, subject = %subject, "record read");
        Ok(record)
    }

    /// Replace `subject`'s record body, keeping its key and recipients.
    ///
    /// The writer must be a recipient. A fresh IV is used; the wrapped keys
    /// are carried over unchanged.
    pub async fn update_record<T>(
        &self,
        writer: &WalletAddress,
        subject: &WalletAddress,
        record: &T,
    ) -> Result<RecordReceipt>
    where
        T: Serialize + Sync + ?Sized,
    {
        let _guard = self.locks.lock(subject).await;

        let (content_id, envelope) = self.fetch_envelope(subject).await?;
        let (key, _) = self.open_envelope(writer, &envelope).await?;

        let sealed = key.encrypt(record)?;
        let next = envelope.with_body(sealed, envelope.keys().clone())?;
        let (content_id, pointer) = self.publish(&next, Some(&content_id)).await?;
        self.cache.put(*subject, key);

        Ok(RecordReceipt {
            subject: *subject,
            content_id,
            pointer,
            recipients: next.recipients().copied().collect(),
            dropped: BTreeMap::new(),
        })
    }

    /// Read every registered record as `reader`.
    ///
    /// Each subject gets its own result, so one inaccessible or corrupted
    /// record never hides the others.
    pub async fn list_records<T>(&self, reader: &WalletAddress) -> Result<Vec<RecordListing<T>>>
    where
        T: DeserializeOwned,
    {
        let subjects = bounded(
            self.config.registry_timeout,
            "subject list",
            self.registry.list_subjects(),
        )
        .await?;

        let mut listings = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let record = self.read_record(reader, &subject).await;
            listings.push(RecordListing { subject, record });
        }
        Ok(listings)
    }

    /// The identities that can currently read `subject`'s record.
    pub async fn recipients(&self, subject: &WalletAddress) -> Result<Vec<WalletAddress>> {
        let (_, envelope) = self.fetch_envelope(subject).await?;
        Ok(envelope.recipients().copied().collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve the pointer and load the envelope it names.
    pub(crate) async fn fetch_envelope(
        &self,
        subject: &WalletAddress,
    ) -> Result<(ContentId, Envelope)> {
        let content_id = bounded(
            self.config.registry_timeout,
            "pointer read",
            self.registry.get_pointer(subject),
        )
        .await?
        .ok_or(VaultError::RecordNotFound(*subject))?;

        let raw = bounded(
            self.config.storage_timeout,
            "content get",
            self.store.get(&content_id),
        )
        .await?;
        let envelope = Envelope::parse(&raw)?;

        if envelope.subject() != subject {
            return Err(CoreError::MalformedEnvelope(format!(
                "envelope at {content_id} is about {}, not {subject}",
                envelope.subject()
            ))
            .into());
        }

        debug!(subject = %subject, cid = %content_id, "envelope fetched");
        Ok((content_id, envelope))
    }

    /// Recover the record key as `identity` and decrypt the body.
    ///
    /// A cached key is tried first; if it no longer authenticates (the record
    /// was rotated elsewhere) it is evicted and the key is unwrapped afresh.
    /// Nothing is cached here.
    pub(crate) async fn open_envelope(
        &self,
        identity: &WalletAddress,
        envelope: &Envelope,
    ) -> Result<(SymmetricKey, Vec<u8>)> {
        let subject = envelope.subject();
        let Some(wrapped) = envelope.wrapped_key_for(identity) else {
            self.cache.invalidate(subject);
            return Err(VaultError::AccessDenied {
                identity: *identity,
                subject: *subject,
            });
        };

        if let Some(cached) = self.cache.get(subject) {
            match cached.decrypt_bytes(envelope.data(), envelope.iv()) {
                Ok(plaintext) => return Ok((cached, plaintext)),
                Err(CoreError::AuthenticationFailure) => {
                    debug!(subject = %subject, "cached key is stale");
                    self.cache.invalidate_if(subject, &cached);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let key = self.wrapper.unwrap_key(&self.agent, wrapped, identity).await?;
        let plaintext = key.decrypt_bytes(envelope.data(), envelope.iv())?;
        Ok((key, plaintext))
    }

    /// Apply the partial wrap policy to a batch wrap.
    ///
    /// `required` identities must be wrapped for under every policy. When
    /// the policy lets the envelope go out short, the left-out recipients are
    /// returned with their errors.
    pub(crate) fn apply_wrap_policy(
        &self,
        report: WrapReport,
        required: &[WalletAddress],
    ) -> Result<(RecipientKeys, BTreeMap<WalletAddress, KeysError>)> {
        if report.is_complete() {
            return Ok((report.wrapped, BTreeMap::new()));
        }

        let required_failed = required.iter().any(|id| report.has_failed(id));
        if self.config.partial_wrap == PartialWrapPolicy::Abort || required_failed {
            return Err(VaultError::PartialWrap {
                failures: report.failures,
            });
        }

        for (identity, error) in &report.failures {
            warn!(recipient = %identity, error = %error, "publishing without recipient");
        }
        Ok((report.wrapped, report.failures))
    }

    /// Store `envelope`, then point its subject at it.
    ///
    /// The pointer is re-read after the store and the update is refused if
    /// it no longer names `expected`. `None` expects the subject to have no
    /// pointer yet.
    pub(crate) async fn publish(
        &self,
        envelope: &Envelope,
        expected: Option<&ContentId>,
    ) -> Result<(ContentId, PointerReceipt)> {
        let subject = *envelope.subject();
        let bytes = envelope.to_bytes()?;
        let name_hint = format!("{subject}.json");

        let content_id = bounded(
            self.config.storage_timeout,
            "content put",
            self.store.put(Bytes::from(bytes), &name_hint),
        )
        .await?;

        let current = bounded(
            self.config.registry_timeout,
            "pointer read",
            self.registry.get_pointer(&subject),
        )
        .await?;
        if current.as_ref() != expected {
            return Err(VaultError::StalePointer {
                subject,
                expected: expected.cloned(),
                found: current,
            });
        }

        let pointer = bounded(
            self.config.registry_timeout,
            "pointer update",
            self.registry.set_pointer(&subject, &content_id),
        )
        .await?;

        info!(
            subject = %subject,
            cid = %content_id,
            sequence = pointer.sequence,
            recipients = envelope.keys().len(),
            "envelope published"
        );
        Ok((content_id, pointer))
    }
}

impl<S, R, D, A> std::fmt::Debug for RecordVault<S, R, D, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordVault")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Bound a collaborator call; expiry is `StorageUnavailable`.
async fn bounded<T, F>(limit: Duration, call: &str, fut: F) -> Result<T>
where
    F: Future<Output = medvault_store::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(VaultError::from),
        Err(_) => Err(VaultError::StorageUnavailable(format!(
            "{call} did not complete within {limit:?}"
        ))),
    }
}
