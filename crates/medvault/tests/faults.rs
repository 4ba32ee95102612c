//! Failure handling: aborts leave no trace, timeouts surface as transient
//! errors, corrupted content is told apart from missing access.

use std::time::Duration;

use bytes::Bytes;
use medvault::core::{ContentId, Envelope};
use medvault::keys::KeysError;
use medvault::store::{ContentStore, PointerRegistry};
use medvault::{
    ErrorKind, MutationStep, PartialWrapPolicy, ReadFailure, RevocationMode, VaultConfig,
};
use medvault_testkit::{ClinicFixture, TestWorld};
use serde_json::{json, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn record() -> Value {
    json!({"name": "Grace Hopper", "blood_type": "O-"})
}

#[tokio::test]
async fn test_failed_store_aborts_revoke_without_side_effects() -> anyhow::Result<()> {
    init_tracing();
    let ClinicFixture {
        world,
        patient,
        provider,
        ..
    } = ClinicFixture::new();
    let (vault, faults) = world.faulty_vault(&patient, VaultConfig::default());

    vault
        .create_record(&patient.address, &patient.address, &record())
        .await?;
    vault
        .grant_access(&patient.address, &patient.address, &provider.address)
        .await?;
    let pointer_before = world.registry.get_pointer(&patient.address).await?;
    let key_before = patient.cache.get(&patient.address).expect("cached");
    let updates_before = world.registry.update_count();

    faults.store.set_fail_puts(true);
    let err = vault
        .revoke_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap_err();
    assert_eq!(err.aborted_step(), Some(MutationStep::Publish));
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert!(err.is_transient());

    assert_eq!(world.registry.get_pointer(&patient.address).await?, pointer_before);
    assert_eq!(world.registry.update_count(), updates_before);
    assert_eq!(patient.cache.get(&patient.address), Some(key_before));

    // The provider still reads the unchanged record.
    let read: Value = world
        .vault(&provider)
        .read_record(&provider.address, &patient.address)
        .await?;
    assert_eq!(read, record());
    Ok(())
}

#[tokio::test]
async fn test_failed_pointer_update_aborts_grant() -> anyhow::Result<()> {
    let ClinicFixture {
        world,
        patient,
        provider,
        ..
    } = ClinicFixture::new();
    let (vault, faults) = world.faulty_vault(&patient, VaultConfig::default());
    vault
        .create_record(&patient.address, &patient.address, &record())
        .await?;
    let pointer_before = world.registry.get_pointer(&patient.address).await?;

    faults.registry.set_fail_updates(true);
    let err = vault
        .grant_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap_err();
    assert_eq!(err.aborted_step(), Some(MutationStep::Publish));
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert_eq!(world.registry.get_pointer(&patient.address).await?, pointer_before);

    let denied = world
        .vault(&provider)
        .read_record::<Value>(&provider.address, &patient.address)
        .await
        .unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::AccessDenied);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stalled_store_times_out() {
    let ClinicFixture {
        world,
        patient,
        provider,
        ..
    } = ClinicFixture::new();
    let config = VaultConfig::default().with_storage_timeout(Duration::from_secs(5));
    let (vault, faults) = world.faulty_vault(&patient, config);
    vault
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();

    faults.store.set_stall_puts(true);
    let err = vault
        .grant_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert_eq!(err.aborted_step(), Some(MutationStep::Publish));

    faults.store.set_stall_puts(false);
    faults.store.set_stall_gets(true);
    let err = vault
        .read_record::<Value>(&patient.address, &patient.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert_eq!(ReadFailure::classify(&err), ReadFailure::Unavailable);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_registry_times_out() {
    let ClinicFixture {
        world, patient, ..
    } = ClinicFixture::new();
    let config = VaultConfig::default().with_registry_timeout(Duration::from_secs(5));
    let (vault, faults) = world.faulty_vault(&patient, config);
    vault
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();

    faults.registry.set_stall_updates(true);
    let err = vault
        .update_record(&patient.address, &patient.address, &json!({"name": "x"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert_eq!(world.registry.update_count(), 1);

    faults.registry.set_stall_updates(false);
    faults.registry.set_stall_reads(true);
    let err = vault.list_records::<Value>(&patient.address).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_agent_times_out() {
    let ClinicFixture {
        world,
        patient,
        admin,
        provider,
    } = ClinicFixture::new();
    world
        .vault(&patient)
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();

    let config = VaultConfig::default().with_agent_timeout(Duration::from_secs(10));
    let (vault, faults) = world.faulty_vault(&admin, config);
    faults.agent.set_stall(true);

    let err = vault
        .read_record::<Value>(&admin.address, &patient.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AgentUnavailable);
    assert!(admin.cache.get(&patient.address).is_none());

    let err = vault
        .grant_access(&admin.address, &patient.address, &provider.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AgentUnavailable);
    assert_eq!(err.aborted_step(), Some(MutationStep::Unwrap));
    assert_eq!(world.registry.update_count(), 1);
}

#[tokio::test]
async fn test_refused_decrypt_is_no_access() {
    let ClinicFixture {
        world,
        patient,
        admin,
        ..
    } = ClinicFixture::new();
    world
        .vault(&patient)
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();

    let (vault, faults) = world.faulty_vault(&admin, VaultConfig::default());
    faults.agent.set_refuse_decrypt(true);
    let err = vault
        .read_record::<Value>(&admin.address, &patient.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert_eq!(ReadFailure::classify(&err), ReadFailure::NoAccess);
}

#[tokio::test]
async fn test_partial_wrap_aborts_create_by_default() {
    let ClinicFixture {
        world,
        patient,
        admin,
        ..
    } = ClinicFixture::new();
    let (vault, faults) = world.faulty_vault(&patient, VaultConfig::default());
    faults.agent.make_unavailable(admin.address);

    let err = vault
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialWrap);
    match err {
        medvault::VaultError::PartialWrap { failures } => {
            assert_eq!(failures.keys().copied().collect::<Vec<_>>(), vec![admin.address]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(world.store.is_empty());
    assert!(world.registry.list_subjects().await.unwrap().is_empty());
    assert!(patient.cache.is_empty());
}

#[tokio::test]
async fn test_partial_wrap_publishes_available_when_allowed() {
    let ClinicFixture {
        world,
        patient,
        admin,
        ..
    } = ClinicFixture::new();
    let config = VaultConfig::default().with_partial_wrap(PartialWrapPolicy::PublishAvailable);
    let (vault, faults) = world.faulty_vault(&patient, config);
    faults.agent.make_unavailable(admin.address);

    let receipt = vault
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();
    assert_eq!(receipt.recipients, vec![patient.address]);
    assert_eq!(receipt.dropped.keys().copied().collect::<Vec<_>>(), vec![admin.address]);
    assert!(matches!(
        receipt.dropped[&admin.address],
        KeysError::RecipientUnavailable { .. }
    ));

    let err = world
        .vault(&admin)
        .read_record::<Value>(&admin.address, &patient.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
}

#[tokio::test]
async fn test_subject_must_always_be_wrapped() {
    let ClinicFixture {
        world,
        patient,
        provider,
        ..
    } = ClinicFixture::new();
    let config = VaultConfig::default().with_partial_wrap(PartialWrapPolicy::PublishAvailable);
    let (vault, faults) = world.faulty_vault(&provider, config);
    faults.agent.make_unavailable(patient.address);

    let err = vault
        .create_record(&provider.address, &patient.address, &record())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialWrap);
    assert!(world.registry.list_subjects().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unpublished_recipient_cannot_be_granted() {
    let mut world = TestWorld::new();
    let patient = world.add_party("patient");
    let stranger = world.add_unpublished_party("stranger");
    let vault = world.vault(&patient);
    vault
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();

    let err = vault
        .grant_access(&patient.address, &patient.address, &stranger.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecipientUnavailable);
    assert_eq!(err.aborted_step(), Some(MutationStep::Recompute));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_rotation_aborts_when_remaining_recipient_unavailable() {
    let ClinicFixture {
        world,
        patient,
        admin,
        provider,
    } = ClinicFixture::new();
    let (vault, faults) = world.faulty_vault(&patient, VaultConfig::default());
    vault
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();
    vault
        .grant_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap();
    let before = world.registry.get_pointer(&patient.address).await.unwrap();

    faults.agent.make_unavailable(admin.address);
    let err = vault
        .revoke_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialWrap);
    assert_eq!(err.aborted_step(), Some(MutationStep::Recompute));
    assert_eq!(world.registry.get_pointer(&patient.address).await.unwrap(), before);

    // Retaining the key needs no fresh wraps.
    let retain = world.faulty_vault(
        &patient,
        VaultConfig::default().with_revocation(RevocationMode::RetainKey),
    );
    retain.1.agent.make_unavailable(admin.address);
    let receipt = retain
        .0
        .revoke_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap();
    assert!(receipt.changed);
    assert!(!receipt.rotated);
    assert!(receipt.dropped.is_empty());
}

#[tokio::test]
async fn test_rotation_reports_recipients_left_out() {
    let ClinicFixture {
        world,
        patient,
        admin,
        provider,
    } = ClinicFixture::new();
    let config = VaultConfig::default().with_partial_wrap(PartialWrapPolicy::PublishAvailable);
    let (vault, faults) = world.faulty_vault(&patient, config);
    vault
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();
    vault
        .grant_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap();

    faults.agent.make_unavailable(admin.address);
    let receipt = vault
        .revoke_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap();
    assert!(receipt.rotated);
    assert_eq!(receipt.recipients, vec![patient.address]);
    assert_eq!(receipt.dropped.keys().copied().collect::<Vec<_>>(), vec![admin.address]);
}

#[tokio::test]
async fn test_concurrent_first_create_is_not_overwritten() {
    let ClinicFixture {
        world,
        patient,
        admin,
        ..
    } = ClinicFixture::new();
    let (vault, faults) = world.faulty_vault(&patient, VaultConfig::default());
    let admin_vault = std::sync::Arc::new(world.vault(&admin));
    let (admin_id, subject) = (admin.address, patient.address);
    faults.store.before_next_put(move || async move {
        admin_vault
            .create_record(&admin_id, &subject, &json!({"by": "admin"}))
            .await
            .unwrap();
    });

    let err = vault
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StalePointer);
    assert!(err.is_transient());
    assert_eq!(world.registry.update_count(), 1);

    let read: Value = world
        .vault(&patient)
        .read_record(&patient.address, &patient.address)
        .await
        .unwrap();
    assert_eq!(read, json!({"by": "admin"}));
}

#[tokio::test]
async fn test_stale_cached_key_is_replaced_after_rotation() {
    let ClinicFixture {
        world,
        patient,
        admin,
        provider,
    } = ClinicFixture::new();
    let patient_vault = world.vault(&patient);
    patient_vault
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();
    patient_vault
        .grant_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap();

    let (admin_vault, faults) = world.faulty_vault(&admin, VaultConfig::default());
    let _: Value = admin_vault
        .read_record(&admin.address, &patient.address)
        .await
        .unwrap();
    let _: Value = admin_vault
        .read_record(&admin.address, &patient.address)
        .await
        .unwrap();
    assert_eq!(faults.agent.decrypt_calls(), 1);
    let old_key = admin.cache.get(&patient.address).unwrap();

    // Rotation in another session.
    patient_vault
        .revoke_access(&patient.address, &patient.address, &provider.address)
        .await
        .unwrap();

    let read: Value = admin_vault
        .read_record(&admin.address, &patient.address)
        .await
        .unwrap();
    assert_eq!(read, record());
    assert_eq!(faults.agent.decrypt_calls(), 2);
    assert_ne!(admin.cache.get(&patient.address), Some(old_key));
}

#[tokio::test]
async fn test_session_end_forgets_keys() {
    let ClinicFixture {
        world,
        patient,
        admin,
        ..
    } = ClinicFixture::new();
    world
        .vault(&patient)
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();

    let (vault, faults) = world.faulty_vault(&admin, VaultConfig::default());
    let _: Value = vault.read_record(&admin.address, &patient.address).await.unwrap();
    admin.cache.end_session();
    assert!(admin.cache.is_empty());

    let _: Value = vault.read_record(&admin.address, &patient.address).await.unwrap();
    assert_eq!(faults.agent.decrypt_calls(), 2);
}

#[tokio::test]
async fn test_tampered_body_reads_as_corrupted() {
    let mut world = TestWorld::new();
    let alice = world.add_party("alice");
    let bob = world.add_party("bob");
    let alice_vault = world.vault(&alice);
    alice_vault
        .create_record(&alice.address, &alice.address, &record())
        .await
        .unwrap();
    world
        .vault(&bob)
        .create_record(&bob.address, &bob.address, &json!({"name": "Bob"}))
        .await
        .unwrap();

    // Splice Bob's ciphertext into Alice's envelope.
    let alice_cid = world.registry.get_pointer(&alice.address).await.unwrap().unwrap();
    let bob_cid = world.registry.get_pointer(&bob.address).await.unwrap().unwrap();
    let mut spliced: Value = serde_json::from_slice(&world.store.get(&alice_cid).await.unwrap()).unwrap();
    let bob_json: Value = serde_json::from_slice(&world.store.get(&bob_cid).await.unwrap()).unwrap();
    spliced["data"] = bob_json["data"].clone();

    let bytes = serde_json::to_vec(&spliced).unwrap();
    let cid = world.store.put(Bytes::from(bytes), "spliced.json").await.unwrap();
    world.registry.set_pointer(&alice.address, &cid).await.unwrap();

    let err = alice_vault
        .read_record::<Value>(&alice.address, &alice.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    assert_eq!(ReadFailure::classify(&err), ReadFailure::Corrupted);
    assert!(alice.cache.get(&alice.address).is_none());
}

#[tokio::test]
async fn test_garbage_content_reads_as_corrupted() {
    let ClinicFixture {
        world, patient, ..
    } = ClinicFixture::new();
    let cid = ContentId::new("bafkr4igarbage");
    world
        .store
        .insert_unchecked(cid.clone(), Bytes::from_static(b"not an envelope"));
    world.registry.set_pointer(&patient.address, &cid).await.unwrap();

    let err = world
        .vault(&patient)
        .read_record::<Value>(&patient.address, &patient.address)
        .await
        .unwrap_err();
    assert_eq!(ReadFailure::classify(&err), ReadFailure::Corrupted);
}

#[tokio::test]
async fn test_envelope_for_wrong_subject_is_malformed() {
    let mut world = TestWorld::new();
    let alice = world.add_party("alice");
    let bob = world.add_party("bob");
    let receipt = world
        .vault(&alice)
        .create_record(&alice.address, &alice.address, &record())
        .await
        .unwrap();

    // Bob's pointer names Alice's envelope.
    world
        .registry
        .set_pointer(&bob.address, &receipt.content_id)
        .await
        .unwrap();
    let err = world
        .vault(&bob)
        .read_record::<Value>(&bob.address, &bob.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedEnvelope);
}

#[tokio::test]
async fn test_missing_blob_is_unavailable() {
    let ClinicFixture {
        world, patient, ..
    } = ClinicFixture::new();
    world
        .registry
        .set_pointer(&patient.address, &ContentId::new("bafkr4imissing"))
        .await
        .unwrap();

    let err = world
        .vault(&patient)
        .read_record::<Value>(&patient.address, &patient.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecordNotFound);
    assert_eq!(ReadFailure::classify(&err), ReadFailure::Unavailable);
}

#[tokio::test]
async fn test_undecodable_record_body() {
    let ClinicFixture {
        world, patient, ..
    } = ClinicFixture::new();
    let vault = world.vault(&patient);
    vault
        .create_record(&patient.address, &patient.address, &json!(["not", "an", "object"]))
        .await
        .unwrap();

    #[derive(Debug, serde::Deserialize)]
    struct Patient {
        #[allow(dead_code)]
        name: String,
    }

    let err = vault
        .read_record::<Patient>(&patient.address, &patient.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeFailure);
}

#[tokio::test]
async fn test_published_envelope_parses() {
    let ClinicFixture {
        world, patient, admin, ..
    } = ClinicFixture::new();
    let receipt = world
        .vault(&patient)
        .create_record(&patient.address, &patient.address, &record())
        .await
        .unwrap();

    let raw = world.store.get(&receipt.content_id).await.unwrap();
    let envelope = Envelope::parse(&raw).unwrap();
    assert!(envelope.is_recipient(&admin.address));

    let json: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(json["wallet_address"], patient.address.to_hex());
    assert!(json["keys"][admin.address.to_hex()].is_string());
}
