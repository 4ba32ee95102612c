//! Fault injection wrappers around the collaborator traits.
//!
//! Each wrapper forwards to an inner implementation unless a fault is
//! switched on. Faults are toggled through shared handles so a test can flip
//! them between vault calls.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use medvault::{RecordVault, VaultConfig};
use medvault_core::{ContentId, WalletAddress};
use medvault_keys::{
    EncryptedKeyBlob, EncryptionPublicKey, KeysError, LocalKeyring, SigningAgent,
};
use medvault_store::{
    ContentStore, MemoryContentStore, MemoryRegistry, PointerReceipt, PointerRegistry,
    StaticAdminDirectory, StoreError,
};

use crate::fixtures::{Party, TestWorld};

type PutHook = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// A signing agent that can refuse, stall or lose recipients.
#[derive(Debug, Default)]
pub struct FaultyAgent<A> {
    inner: A,
    unavailable: Mutex<HashSet<WalletAddress>>,
    refuse_decrypt: AtomicBool,
    stall: AtomicBool,
    decrypt_calls: AtomicUsize,
}

impl<A> FaultyAgent<A> {
    /// Wrap `inner` with every fault off.
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            unavailable: Mutex::new(HashSet::new()),
            refuse_decrypt: AtomicBool::new(false),
            stall: AtomicBool::new(false),
            decrypt_calls: AtomicUsize::new(0),
        }
    }

    /// Pretend `identity` never published an encryption key.
    pub fn make_unavailable(&self, identity: WalletAddress) {
        self.unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity);
    }

    /// Make `identity` available again.
    pub fn make_available(&self, identity: &WalletAddress) {
        self.unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity);
    }

    /// Refuse every decrypt request, as a user clicking "reject" would.
    pub fn set_refuse_decrypt(&self, on: bool) {
        self.refuse_decrypt.store(on, Ordering::SeqCst);
    }

    /// Never answer, as a wallet waiting on an ignored prompt would.
    pub fn set_stall(&self, on: bool) {
        self.stall.store(on, Ordering::SeqCst);
    }

    /// How many decrypt requests reached the agent.
    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    fn is_unavailable(&self, identity: &WalletAddress) -> bool {
        self.unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identity)
    }
}

#[async_trait]
impl<A: SigningAgent> SigningAgent for FaultyAgent<A> {
    async fn encryption_public_key(
        &self,
        identity: &WalletAddress,
    ) -> medvault_keys::Result<EncryptionPublicKey> {
        if self.stall.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.is_unavailable(identity) {
            return Err(KeysError::RecipientUnavailable {
                identity: *identity,
                reason: "injected fault".into(),
            });
        }
        self.inner.encryption_public_key(identity).await
    }

    async fn decrypt(
        &self,
        identity: &WalletAddress,
        blob: &EncryptedKeyBlob,
    ) -> medvault_keys::Result<Vec<u8>> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.refuse_decrypt.load(Ordering::SeqCst) {
            return Err(KeysError::AccessDenied {
                identity: *identity,
                reason: "user rejected the request".into(),
            });
        }
        self.inner.decrypt(identity, blob).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Content store
// ─────────────────────────────────────────────────────────────────────────────

/// A content store that can fail or stall, and run a hook before a put.
pub struct FaultyStore<S> {
    inner: S,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    stall_puts: AtomicBool,
    stall_gets: AtomicBool,
    puts: AtomicUsize,
    before_put: Mutex<Option<PutHook>>,
}

impl<S> FaultyStore<S> {
    /// Wrap `inner` with every fault off.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_puts: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
            stall_puts: AtomicBool::new(false),
            stall_gets: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
            before_put: Mutex::new(None),
        }
    }

    /// Fail every put with `Unavailable`.
    pub fn set_fail_puts(&self, on: bool) {
        self.fail_puts.store(on, Ordering::SeqCst);
    }

    /// Fail every get with `Unavailable`.
    pub fn set_fail_gets(&self, on: bool) {
        self.fail_gets.store(on, Ordering::SeqCst);
    }

    /// Never complete puts.
    pub fn set_stall_puts(&self, on: bool) {
        self.stall_puts.store(on, Ordering::SeqCst);
    }

    /// Never complete gets.
    pub fn set_stall_gets(&self, on: bool) {
        self.stall_gets.store(on, Ordering::SeqCst);
    }

    /// Successful puts so far.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Run `hook` just before the next put reaches the inner store.
    pub fn before_next_put<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: PutHook = Box::new(move || Box::pin(hook()));
        *self
            .before_put
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }
}

#[async_trait]
impl<S: ContentStore> ContentStore for FaultyStore<S> {
    async fn put(&self, bytes: Bytes, name_hint: &str) -> medvault_store::Result<ContentId> {
        let hook = self
            .before_put
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook().await;
        }

        if self.stall_puts.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected put failure".into()));
        }
        let id = self.inner.put(bytes, name_hint).await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> medvault_store::Result<Bytes> {
        if self.stall_gets.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected get failure".into()));
        }
        self.inner.get(id).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// A pointer registry whose updates can fail or stall.
#[derive(Debug)]
pub struct FaultyRegistry<R> {
    inner: R,
    fail_set: AtomicBool,
    stall_set: AtomicBool,
    stall_reads: AtomicBool,
}

impl<R> FaultyRegistry<R> {
    /// Wrap `inner` with every fault off.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            fail_set: AtomicBool::new(false),
            stall_set: AtomicBool::new(false),
            stall_reads: AtomicBool::new(false),
        }
    }

    /// Fail every pointer update with `Unavailable`.
    pub fn set_fail_updates(&self, on: bool) {
        self.fail_set.store(on, Ordering::SeqCst);
    }

    /// Never complete pointer updates.
    pub fn set_stall_updates(&self, on: bool) {
        self.stall_set.store(on, Ordering::SeqCst);
    }

    /// Never complete pointer reads or subject listings.
    pub fn set_stall_reads(&self, on: bool) {
        self.stall_reads.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl<R: PointerRegistry> PointerRegistry for FaultyRegistry<R> {
    async fn get_pointer(
        &self,
        subject: &WalletAddress,
    ) -> medvault_store::Result<Option<ContentId>> {
        if self.stall_reads.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        self.inner.get_pointer(subject).await
    }

    async fn set_pointer(
        &self,
        subject: &WalletAddress,
        content_id: &ContentId,
    ) -> medvault_store::Result<PointerReceipt> {
        if self.stall_set.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected pointer update failure".into()));
        }
        self.inner.set_pointer(subject, content_id).await
    }

    async fn list_subjects(&self) -> medvault_store::Result<Vec<WalletAddress>> {
        if self.stall_reads.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        self.inner.list_subjects().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────────

/// Handles for flipping the faults of a [`FaultyVault`].
#[derive(Clone)]
pub struct Faults {
    /// The vault's content store.
    pub store: Arc<FaultyStore<Arc<MemoryContentStore>>>,
    /// The vault's registry.
    pub registry: Arc<FaultyRegistry<Arc<MemoryRegistry>>>,
    /// The vault's agent.
    pub agent: Arc<FaultyAgent<Arc<LocalKeyring>>>,
}

/// A vault whose collaborators can all be made to misbehave.
pub type FaultyVault = RecordVault<
    Arc<FaultyStore<Arc<MemoryContentStore>>>,
    Arc<FaultyRegistry<Arc<MemoryRegistry>>>,
    Arc<StaticAdminDirectory>,
    Arc<FaultyAgent<Arc<LocalKeyring>>>,
>;

impl TestWorld {
    /// A vault acting as `party` over fault-injecting wrappers of the shared
    /// world.
    pub fn faulty_vault(&self, party: &Party, config: VaultConfig) -> (FaultyVault, Faults) {
        let faults = Faults {
            store: Arc::new(FaultyStore::new(self.store.clone())),
            registry: Arc::new(FaultyRegistry::new(self.registry.clone())),
            agent: Arc::new(FaultyAgent::new(party.keyring.clone())),
        };
        let vault = RecordVault::new(
            faults.store.clone(),
            faults.registry.clone(),
            self.directory.clone(),
            faults.agent.clone(),
            party.cache.clone(),
            config,
        );
        (vault, faults)
    }
}
