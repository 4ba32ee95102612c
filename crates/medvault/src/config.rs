//! Vault configuration.

use std::time::Duration;

use medvault_keys::{KeyWrapper, WrapScheme};

/// What a revocation does to the record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationMode {
    /// Generate a fresh key, re-encrypt the body and re-wrap for every
    /// remaining recipient. A revoked party holding the old key learns
    /// nothing about later versions.
    #[default]
    Rotate,
    /// Only delete the revoked entry. The body and key stay the same, so a
    /// revoked party who kept the raw key can still decrypt. Legacy
    /// behavior, kept for byte-compatibility with existing envelopes.
    RetainKey,
}

/// What to do when some recipients cannot be wrapped for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialWrapPolicy {
    /// Publish nothing and report every failure.
    #[default]
    Abort,
    /// Publish for the recipients that succeeded. The subject and the
    /// initiating identity are still required.
    PublishAvailable,
}

/// Configuration for a [`RecordVault`](crate::RecordVault).
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Bound on each signing-agent call. Wallet prompts wait on the user.
    pub agent_timeout: Duration,
    /// Bound on each content-store call.
    pub storage_timeout: Duration,
    /// Bound on each registry or directory call.
    pub registry_timeout: Duration,
    /// Revocation behavior.
    pub revocation: RevocationMode,
    /// Partial wrap behavior.
    pub partial_wrap: PartialWrapPolicy,
    /// Scheme for newly wrapped keys.
    pub wrap_scheme: WrapScheme,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(120),
            storage_timeout: Duration::from_secs(30),
            registry_timeout: Duration::from_secs(60),
            revocation: RevocationMode::default(),
            partial_wrap: PartialWrapPolicy::default(),
            wrap_scheme: WrapScheme::default(),
        }
    }
}

impl VaultConfig {
    /// Set the signing-agent timeout.
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// Set the content-store timeout.
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Set the registry timeout.
    pub fn with_registry_timeout(mut self, timeout: Duration) -> Self {
        self.registry_timeout = timeout;
        self
    }

    /// Set the revocation mode.
    pub fn with_revocation(mut self, mode: RevocationMode) -> Self {
        self.revocation = mode;
        self
    }

    /// Set the partial wrap policy.
    pub fn with_partial_wrap(mut self, policy: PartialWrapPolicy) -> Self {
        self.partial_wrap = policy;
        self
    }

    /// Set the wrap scheme.
    pub fn with_wrap_scheme(mut self, scheme: WrapScheme) -> Self {
        self.wrap_scheme = scheme;
        self
    }

    /// The key wrapper these settings describe.
    pub fn key_wrapper(&self) -> KeyWrapper {
        KeyWrapper::new(self.wrap_scheme, self.agent_timeout)
    }
}
