//! Test fixtures and helpers.
//!
//! A [`TestWorld`] is one shared storage provider, registry and admin
//! directory. Each [`Party`] is one user session on top of it: their own
//! keyring (holding only their own secret) and their own key cache.

use std::sync::Arc;

use medvault::{RecordVault, SessionKeyCache, VaultConfig};
use medvault_core::WalletAddress;
use medvault_keys::{AgentSecret, EncryptionPublicKey, LocalKeyring, SigningAgent};
use medvault_store::{MemoryContentStore, MemoryRegistry, StaticAdminDirectory};

/// A vault over the shared in-memory world.
pub type WorldVault<A = Arc<LocalKeyring>> =
    RecordVault<Arc<MemoryContentStore>, Arc<MemoryRegistry>, Arc<StaticAdminDirectory>, A>;

/// Deterministic wallet address for a label.
pub fn address(label: &str) -> WalletAddress {
    let hash = blake3::derive_key("medvault testkit address", label.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[..20]);
    WalletAddress::from_bytes(bytes)
}

/// Deterministic encryption secret for a label.
pub fn secret(label: &str) -> AgentSecret {
    AgentSecret::from_bytes(blake3::derive_key(
        "medvault testkit secret",
        label.as_bytes(),
    ))
}

/// One user: an identity, a keyring agent and a session cache.
#[derive(Debug, Clone)]
pub struct Party {
    /// Human-readable label.
    pub label: String,
    /// The party's wallet address.
    pub address: WalletAddress,
    /// The party's agent. Holds only this party's secret.
    pub keyring: Arc<LocalKeyring>,
    /// The party's session cache.
    pub cache: Arc<SessionKeyCache>,
}

impl Party {
    /// The party's encryption public key.
    pub fn public_key(&self) -> EncryptionPublicKey {
        secret(&self.label).public_key()
    }
}

/// Shared collaborators plus every party created so far.
#[derive(Debug, Default)]
pub struct TestWorld {
    /// Shared content store.
    pub store: Arc<MemoryContentStore>,
    /// Shared pointer registry.
    pub registry: Arc<MemoryRegistry>,
    /// Shared administrator directory.
    pub directory: Arc<StaticAdminDirectory>,
    parties: Vec<Party>,
}

impl TestWorld {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a party whose public key every other party's keyring knows.
    pub fn add_party(&mut self, label: &str) -> Party {
        let party = Party {
            label: label.to_string(),
            address: address(label),
            keyring: Arc::new(LocalKeyring::new()),
            cache: Arc::new(SessionKeyCache::new()),
        };
        party.keyring.insert_secret(party.address, secret(label));

        for other in &self.parties {
            other
                .keyring
                .register_public_key(party.address, party.public_key());
            party
                .keyring
                .register_public_key(other.address, other.public_key());
        }

        self.parties.push(party.clone());
        party
    }

    /// Add a party and list them as an administrator.
    pub fn add_admin(&mut self, label: &str) -> Party {
        let party = self.add_party(label);
        self.directory.add(party.address);
        party
    }

    /// Add a party whose public key nobody knows (never opted in).
    pub fn add_unpublished_party(&mut self, label: &str) -> Party {
        let party = Party {
            label: label.to_string(),
            address: address(label),
            keyring: Arc::new(LocalKeyring::new()),
            cache: Arc::new(SessionKeyCache::new()),
        };
        party.keyring.insert_secret(party.address, secret(label));
        for other in &self.parties {
            party
                .keyring
                .register_public_key(other.address, other.public_key());
        }
        self.parties.push(party.clone());
        party
    }

    /// All parties, in creation order.
    pub fn parties(&self) -> &[Party] {
        &self.parties
    }

    /// A vault acting as `party` with default configuration.
    pub fn vault(&self, party: &Party) -> WorldVault {
        self.vault_with_config(party, VaultConfig::default())
    }

    /// A vault acting as `party`.
    pub fn vault_with_config(&self, party: &Party, config: VaultConfig) -> WorldVault {
        self.vault_with_agent(party, party.keyring.clone(), config)
    }

    /// A vault acting as `party` through a substitute agent.
    pub fn vault_with_agent<A: SigningAgent>(
        &self,
        party: &Party,
        agent: A,
        config: VaultConfig,
    ) -> WorldVault<A> {
        RecordVault::new(
            self.store.clone(),
            self.registry.clone(),
            self.directory.clone(),
            agent,
            party.cache.clone(),
            config,
        )
    }
}

/// The classic three-party setup: patient, administrator, provider.
pub struct ClinicFixture {
    /// The world they share.
    pub world: TestWorld,
    /// The record subject.
    pub patient: Party,
    /// An administrator, in every new record.
    pub admin: Party,
    /// A provider, not initially a recipient.
    pub provider: Party,
}

impl ClinicFixture {
    /// Create the world and its three parties.
    pub fn new() -> Self {
        let mut world = TestWorld::new();
        let admin = world.add_admin("admin");
        let patient = world.add_party("patient");
        let provider = world.add_party("provider");
        Self {
            world,
            patient,
            admin,
            provider,
        }
    }
}

impl Default for ClinicFixture {
    fn default() -> Self {
        Self::new()
    }
}
