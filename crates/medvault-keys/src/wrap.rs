//! Recipient key wrapper.
//!
//! Seals a record's symmetric key once per recipient and recovers it through
//! the caller's own signing agent. Each call targets exactly one identity;
//! batch wrapping is N independent calls whose failures are reported per
//! identity.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use medvault_core::{CoreError, RecipientKeys, SymmetricKey, WalletAddress, WrappedKey, KEY_LEN};
use tracing::debug;

use crate::agent::SigningAgent;
use crate::blob::{EncryptedKeyBlob, WrapScheme};
use crate::error::{KeysError, Result};

/// Default bound on a single signing-agent call.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Wraps and unwraps record keys with a fixed scheme and agent timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyWrapper {
    scheme: WrapScheme,
    timeout: Duration,
}

impl Default for KeyWrapper {
    fn default() -> Self {
        Self::new(WrapScheme::default(), DEFAULT_AGENT_TIMEOUT)
    }
}

impl KeyWrapper {
    /// Create a wrapper.
    pub const fn new(scheme: WrapScheme, timeout: Duration) -> Self {
        Self { scheme, timeout }
    }

    /// The scheme new blobs are sealed with.
    pub const fn scheme(&self) -> WrapScheme {
        self.scheme
    }

    /// The bound on each agent call.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Seal `key` for `identity`.
    ///
    /// The recipient's public key is fetched from `agent`; sealing itself is
    /// local. Fails with `RecipientUnavailable` if the agent has no key for
    /// the identity and `AgentUnavailable` if the agent does not answer.
    pub async fn wrap_key_for<A>(
        &self,
        agent: &A,
        identity: &WalletAddress,
        key: &SymmetricKey,
    ) -> Result<WrappedKey>
    where
        A: SigningAgent + ?Sized,
    {
        let public = bounded(
            self.timeout,
            "encryption public key",
            agent.encryption_public_key(identity),
        )
        .await?;

        let plaintext = STANDARD.encode(key.as_bytes());
        let blob = EncryptedKeyBlob::seal(self.scheme, identity, &public, plaintext.as_bytes())?;
        debug!(recipient = %identity, scheme = %self.scheme, "wrapped record key");
        blob.to_wrapped_key()
    }

    /// Recover the key sealed in `wrapped` using `caller`'s agent.
    ///
    /// Blobs of either scheme are accepted regardless of the configured one.
    pub async fn unwrap_key<A>(
        &self,
        agent: &A,
        wrapped: &WrappedKey,
        caller: &WalletAddress,
    ) -> Result<SymmetricKey>
    where
        A: SigningAgent + ?Sized,
    {
        let blob = EncryptedKeyBlob::from_wrapped_key(wrapped)?;
        blob.scheme()?;

        let plaintext = bounded(self.timeout, "decrypt", agent.decrypt(caller, &blob)).await?;
        let key = decode_key_text(&plaintext)?;
        debug!(caller = %caller, "unwrapped record key");
        Ok(key)
    }

    /// Seal `key` for every identity in `recipients`, one at a time.
    ///
    /// Never fails as a whole; each identity lands in exactly one of
    /// `wrapped` or `failures`. Duplicates are wrapped once.
    pub async fn wrap_for_recipients<A, I>(
        &self,
        agent: &A,
        recipients: I,
        key: &SymmetricKey,
    ) -> WrapReport
    where
        A: SigningAgent + ?Sized,
        I: IntoIterator<Item = WalletAddress>,
    {
        let mut report = WrapReport::default();
        for identity in recipients {
            if report.wrapped.contains_key(&identity) || report.failures.contains_key(&identity) {
                continue;
            }
            match self.wrap_key_for(agent, &identity, key).await {
                Ok(wrapped) => {
                    report.wrapped.insert(identity, wrapped);
                }
                Err(e) => {
                    debug!(recipient = %identity, error = %e, "wrap failed");
                    report.failures.insert(identity, e);
                }
            }
        }
        report
    }
}

/// Outcome of wrapping one key for several recipients.
#[derive(Debug, Default)]
pub struct WrapReport {
    /// Blobs for the recipients that succeeded.
    pub wrapped: RecipientKeys,
    /// Errors for the recipients that failed.
    pub failures: BTreeMap<WalletAddress, KeysError>,
}

impl WrapReport {
    /// True if no recipient failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Identities that could not be wrapped for.
    pub fn failed_identities(&self) -> impl Iterator<Item = &WalletAddress> {
        self.failures.keys()
    }

    /// True if `identity` failed.
    pub fn has_failed(&self, identity: &WalletAddress) -> bool {
        self.failures.contains_key(identity)
    }
}

async fn bounded<T, F>(limit: Duration, call: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(KeysError::AgentUnavailable(format!(
            "{call} did not complete within {limit:?}"
        ))),
    }
}

fn decode_key_text(plaintext: &[u8]) -> Result<SymmetricKey> {
    let text = std::str::from_utf8(plaintext)
        .map_err(|_| CoreError::DecodeFailure("unwrapped key is not UTF-8".to_string()))?;
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| CoreError::DecodeFailure(format!("unwrapped key is not base64: {e}")))?;
    if bytes.len() != KEY_LEN {
        return Err(CoreError::DecodeFailure(format!(
            "unwrapped key has {} bytes, expected {KEY_LEN}",
            bytes.len()
        ))
        .into());
    }
    Ok(SymmetricKey::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AgentSecret, EncryptionPublicKey};
    use crate::keyring::LocalKeyring;
    use async_trait::async_trait;
    use proptest::prelude::*;

    fn addr(b: u8) -> WalletAddress {
        WalletAddress::from_bytes([b; 20])
    }

    fn both_schemes() -> [KeyWrapper; 2] {
        [
            KeyWrapper::new(WrapScheme::X25519XSalsa20Poly1305, DEFAULT_AGENT_TIMEOUT),
            KeyWrapper::new(WrapScheme::X25519ChaCha20Poly1305, DEFAULT_AGENT_TIMEOUT),
        ]
    }

    #[tokio::test]
    async fn test_wrap_unwrap_identity() {
        let keyring = LocalKeyring::new();
        let alice = addr(1);
        keyring.generate(alice);

        for wrapper in both_schemes() {
            let key = SymmetricKey::generate();
            let wrapped = wrapper.wrap_key_for(&keyring, &alice, &key).await.unwrap();
            let recovered = wrapper.unwrap_key(&keyring, &wrapped, &alice).await.unwrap();
            assert_eq!(recovered, key);
        }
    }

    #[tokio::test]
    async fn test_cross_recipient_isolation() {
        let keyring = LocalKeyring::new();
        let (alice, bob) = (addr(1), addr(2));
        keyring.generate(alice);
        keyring.generate(bob);

        for wrapper in both_schemes() {
            let key = SymmetricKey::generate();
            let for_alice = wrapper.wrap_key_for(&keyring, &alice, &key).await.unwrap();
            let err = wrapper.unwrap_key(&keyring, &for_alice, &bob).await.unwrap_err();
            assert!(matches!(err, KeysError::AccessDenied { .. }), "{err:?}");
        }
    }

    #[tokio::test]
    async fn test_unwrap_accepts_either_scheme() {
        let keyring = LocalKeyring::new();
        let alice = addr(1);
        keyring.generate(alice);

        let key = SymmetricKey::generate();
        let [xsalsa, chacha] = both_schemes();
        let wrapped = chacha.wrap_key_for(&keyring, &alice, &key).await.unwrap();
        assert_eq!(xsalsa.unwrap_key(&keyring, &wrapped, &alice).await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_unavailable() {
        let keyring = LocalKeyring::new();
        let err = KeyWrapper::default()
            .wrap_key_for(&keyring, &addr(9), &SymmetricKey::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, KeysError::RecipientUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_batch_reports_each_failure() {
        let keyring = LocalKeyring::new();
        for b in [1, 2, 4, 5] {
            keyring.generate(addr(b));
        }

        let report = KeyWrapper::default()
            .wrap_for_recipients(&keyring, (1..=5).map(addr), &SymmetricKey::generate())
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.wrapped.len(), 4);
        assert_eq!(report.failed_identities().collect::<Vec<_>>(), vec![&addr(3)]);
        assert!(matches!(
            report.failures[&addr(3)],
            KeysError::RecipientUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_batch_wraps_duplicates_once() {
        let keyring = LocalKeyring::new();
        keyring.generate(addr(1));

        let report = KeyWrapper::default()
            .wrap_for_recipients(&keyring, [addr(1), addr(1)], &SymmetricKey::generate())
            .await;
        assert!(report.is_complete());
        assert_eq!(report.wrapped.len(), 1);
    }

    #[test]
    fn test_decode_key_text_rejects_bad_plaintext() {
        assert!(matches!(
            decode_key_text(&[0xff, 0xfe]),
            Err(KeysError::Core(CoreError::DecodeFailure(_)))
        ));
        assert!(matches!(
            decode_key_text(b"not base64!"),
            Err(KeysError::Core(CoreError::DecodeFailure(_)))
        ));
        let short = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            decode_key_text(short.as_bytes()),
            Err(KeysError::Core(CoreError::DecodeFailure(_)))
        ));
    }

    struct StalledAgent;

    #[async_trait]
    impl SigningAgent for StalledAgent {
        async fn encryption_public_key(
            &self,
            _identity: &WalletAddress,
        ) -> Result<EncryptionPublicKey> {
            std::future::pending().await
        }

        async fn decrypt(
            &self,
            _identity: &WalletAddress,
            _blob: &EncryptedKeyBlob,
        ) -> Result<Vec<u8>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_timeout_is_unavailable() {
        let wrapper = KeyWrapper::new(WrapScheme::default(), Duration::from_secs(5));

        let err = wrapper
            .wrap_key_for(&StalledAgent, &addr(1), &SymmetricKey::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, KeysError::AgentUnavailable(_)));

        let secret = AgentSecret::generate();
        let blob = EncryptedKeyBlob::seal(
            WrapScheme::default(),
            &addr(1),
            &secret.public_key(),
            b"x",
        )
        .unwrap();
        let err = wrapper
            .unwrap_key(&StalledAgent, &blob.to_wrapped_key().unwrap(), &addr(1))
            .await
            .unwrap_err();
        assert!(matches!(err, KeysError::AgentUnavailable(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_wrap_unwrap_identity(key_bytes in any::<[u8; KEY_LEN]>(), who in any::<[u8; 20]>()) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let keyring = LocalKeyring::new();
            let identity = WalletAddress::from_bytes(who);
            keyring.generate(identity);

            let key = SymmetricKey::from_bytes(key_bytes);
            let wrapper = KeyWrapper::default();
            let recovered = rt.block_on(async {
                let wrapped = wrapper.wrap_key_for(&keyring, &identity, &key).await?;
                wrapper.unwrap_key(&keyring, &wrapped, &identity).await
            }).unwrap();
            prop_assert_eq!(recovered, key);
        }

        #[test]
        fn prop_cross_recipient_isolation(key_bytes in any::<[u8; KEY_LEN]>(), a in any::<[u8; 20]>(), b in any::<[u8; 20]>()) {
            prop_assume!(a != b);
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let keyring = LocalKeyring::new();
            let (i, j) = (WalletAddress::from_bytes(a), WalletAddress::from_bytes(b));
            keyring.generate(i);
            keyring.generate(j);

            let wrapper = KeyWrapper::default();
            let result = rt.block_on(async {
                let wrapped = wrapper.wrap_key_for(&keyring, &i, &SymmetricKey::from_bytes(key_bytes)).await?;
                wrapper.unwrap_key(&keyring, &wrapped, &j).await
            });
            let denied = matches!(result, Err(KeysError::AccessDenied { .. }));
            prop_assert!(denied);
        }
    }
}
