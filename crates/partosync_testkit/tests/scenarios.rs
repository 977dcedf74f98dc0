//! End-to-end sync scenarios against the in-process authority.

use partosync_core::{
    AcceptKind, ConflictResolution, CoreError, DeviceIdentityProvider, EngineConfig,
    EqualVersionPolicy, ReconcileOutcome, RecordId, RejectReason, RemoteRecord,
    StoredDeviceIdentity, SyncEngine, SyncStatus,
};
use partosync_storage::InMemoryStore;
use partosync_testkit::prelude::*;
use std::sync::Arc;

#[test]
fn fresh_record_is_dirty_and_unsynced() {
    with_engine(|engine| {
        let repo = engine.repository::<Contraction>();
        let record = repo.create(contraction(50)).unwrap();

        let stored = repo.get(record.id()).unwrap().unwrap();
        assert_eq!(stored.envelope.local_version, 1);
        assert_eq!(stored.envelope.server_version, 0);
        assert_eq!(stored.envelope.sync_status, SyncStatus::Dirty);
        assert_eq!(stored.envelope.created_at, START_MILLIS);
        assert_eq!(stored.envelope.updated_at, START_MILLIS);
        assert_eq!(stored.envelope.device_id, LOCAL_DEVICE);
        assert_eq!(stored.envelope.origin_device_id, LOCAL_DEVICE);
        assert!(stored.envelope.deleted_at.is_none());
        assert!(stored.envelope.conflict_payload.is_none());
    });
}

#[test]
fn matching_server_state_cleans_record() {
    with_engine(|engine| {
        let repo = engine.repository::<Contraction>();
        let record = repo.create(contraction(50)).unwrap();

        let mut incoming = RemoteRecord::from(record.clone());
        incoming.envelope.server_version = 1;
        let outcome = repo.reconcile(incoming).unwrap();
        assert!(outcome.is_accepted());

        let stored = repo.get(record.id()).unwrap().unwrap();
        assert_eq!(stored.envelope.sync_status, SyncStatus::Clean);
        assert_eq!(stored.envelope.server_version, 1);
        assert_eq!(stored.envelope.local_version, 1);
    });
}

#[test]
fn concurrent_divergent_edits_conflict() {
    with_engine(|engine| {
        let repo = engine.repository::<CervixDilation>();
        let mut server = MockAuthority::new();
        let record = repo.create(dilation(4)).unwrap();
        server.sync(&repo).unwrap();

        // Local edit to H2 while another device edits to H3 on the server
        engine.advance(60_000);
        let local = repo.update(record.id(), dilation(5)).unwrap();
        let remote = server.edit(record.id(), dilation(6), PEER_DEVICE, START_MILLIS + 90_000);
        assert_eq!(remote.envelope.server_version, 2);

        let outcome = repo.reconcile(remote).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Conflicted);

        let stored = repo.get(record.id()).unwrap().unwrap();
        assert_eq!(stored.payload, local.payload);
        assert_eq!(stored.envelope.content_hash, local.envelope.content_hash);
        assert_eq!(stored.envelope.local_version, local.envelope.local_version);
        assert_eq!(stored.envelope.server_version, 1);
        assert_eq!(stored.envelope.sync_status, SyncStatus::Conflicted);

        let held = repo.conflict(record.id()).unwrap().unwrap();
        assert_eq!(held.payload, dilation(6));
        assert_eq!(held.envelope.device_id, PEER_DEVICE);
    });
}

#[test]
fn stale_state_after_local_delete_is_rejected() {
    with_engine(|engine| {
        let repo = engine.repository::<Temperature>();
        let mut server = MockAuthority::new();
        let record = repo.create(temperature(369)).unwrap();
        server.sync(&repo).unwrap();
        let first_ack = server.get(record.id()).unwrap().clone();

        engine.advance(1_000);
        repo.update(record.id(), temperature(372)).unwrap();
        server.sync(&repo).unwrap();

        engine.advance(1_000);
        let tombstone = repo.delete(record.id()).unwrap();
        assert!(tombstone.is_tombstone());
        assert_eq!(tombstone.envelope.sync_status, SyncStatus::Dirty);

        let outcome = repo.reconcile(first_ack).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::Stale));

        let stored = repo.get(record.id()).unwrap().unwrap();
        assert_eq!(stored, tombstone);
        assert!(repo.get_active(record.id()).unwrap().is_none());
    });
}

#[test]
fn device_identity_is_stable_per_installation() {
    let store = Arc::new(InMemoryStore::new());
    let provider = StoredDeviceIdentity::new(Arc::clone(&store));
    let first = provider.current_device_id().unwrap();
    let second = provider.current_device_id().unwrap();
    assert_eq!(first, second);

    let engine = SyncEngine::builder_shared(store).build().unwrap();
    assert_eq!(engine.device_id().unwrap(), first);
}

#[test]
fn push_cycle_leaves_nothing_pending() {
    with_engine(|engine| {
        let repo = engine.repository::<FetalHeartRate>();
        let mut server = MockAuthority::new();
        for bpm in [132, 140, 151] {
            repo.create(heart_rate(bpm)).unwrap();
            engine.advance(15_000);
        }

        let round = server.sync(&repo).unwrap();
        assert_eq!(round.pushed, 3);
        assert!(round
            .outcomes
            .iter()
            .all(|(_, outcome)| *outcome == ReconcileOutcome::Accepted(AcceptKind::Merged)));
        assert_eq!(repo.list_pending().iter().count(), 0);

        let again = server.sync(&repo).unwrap();
        assert_eq!(again.pushed, 0);
    });
}

#[test]
fn pending_is_oldest_change_first_across_types() {
    with_engine(|engine| {
        let temps = engine.repository::<Temperature>();
        let rates = engine.repository::<FetalHeartRate>();

        let t1 = temps.create(temperature(366)).unwrap();
        engine.advance(10);
        let r1 = rates.create(heart_rate(128)).unwrap();
        engine.advance(10);
        let t2 = temps.create(temperature(370)).unwrap();
        engine.advance(10);
        // Editing t1 moves it to the back of the queue
        temps.update(t1.id(), temperature(367)).unwrap();

        let order: Vec<RecordId> = engine
            .list_pending(None)
            .iter()
            .map(|row| row.unwrap().envelope.id)
            .collect();
        assert_eq!(order, vec![r1.id(), t2.id(), t1.id()]);

        let typed: Vec<RecordId> = temps
            .list_pending()
            .iter()
            .map(|record| record.unwrap().id())
            .collect();
        assert_eq!(typed, vec![t2.id(), t1.id()]);
    });
}

#[test]
fn pulled_record_from_peer_is_inserted_clean() {
    let peer = TestEngine::memory();
    let mut server = MockAuthority::new();
    let peer_repo = peer.repository::<Contraction>();
    let record = peer_repo.create(contraction(70)).unwrap();
    server.sync(&peer_repo).unwrap();

    with_engine(|engine| {
        let repo = engine.repository::<Contraction>();
        for incoming in server.pull_all() {
            let outcome = repo.reconcile(incoming).unwrap();
            assert_eq!(outcome, ReconcileOutcome::Accepted(AcceptKind::Inserted));
        }
        let stored = repo.get(record.id()).unwrap().unwrap();
        assert_eq!(stored.payload, contraction(70));
        assert_eq!(stored.envelope.sync_status, SyncStatus::Clean);
        assert_eq!(stored.envelope.server_version, 1);
        assert!(repo.list_pending().iter().next().is_none());
    });
}

#[test]
fn remote_tombstone_removes_record_from_active_views() {
    with_engine(|engine| {
        let repo = engine.repository::<Temperature>();
        let mut server = MockAuthority::new();
        let record = repo.create(temperature(380)).unwrap();
        server.sync(&repo).unwrap();

        let tombstone = server.delete(record.id(), PEER_DEVICE, START_MILLIS + 5_000);
        let outcome = repo.reconcile(tombstone).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Accepted(AcceptKind::Overwritten));

        assert!(repo.get_active(record.id()).unwrap().is_none());
        assert!(repo.list_active().unwrap().is_empty());
        let kept = repo.get(record.id()).unwrap().unwrap();
        assert!(kept.is_tombstone());
        assert_eq!(kept.envelope.origin_device_id, LOCAL_DEVICE);
        assert_eq!(kept.envelope.device_id, PEER_DEVICE);
    });
}

#[test]
fn pending_local_delete_is_not_merged_by_live_copy() {
    with_engine(|engine| {
        let repo = engine.repository::<Temperature>();
        let mut server = MockAuthority::new();
        let record = repo.create(temperature(375)).unwrap();
        server.sync(&repo).unwrap();

        engine.advance(1_000);
        repo.delete(record.id()).unwrap();

        // Same payload, still live on the server, newer version
        let live = server.edit(record.id(), temperature(375), PEER_DEVICE, START_MILLIS + 500);
        let outcome = repo.reconcile(live).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Conflicted);
        assert!(repo.get(record.id()).unwrap().unwrap().is_tombstone());
    });
}

#[test]
fn reconcile_is_idempotent() {
    with_engine(|engine| {
        let repo = engine.repository::<CervixDilation>();
        let mut server = MockAuthority::new();
        let record = repo.create(dilation(3)).unwrap();
        server.sync(&repo).unwrap();

        let remote = server.edit(record.id(), dilation(5), PEER_DEVICE, START_MILLIS + 1);
        assert!(repo.reconcile(remote.clone()).unwrap().is_accepted());
        let once = repo.get(record.id()).unwrap().unwrap();
        repo.reconcile(remote).unwrap();
        let twice = repo.get(record.id()).unwrap().unwrap();
        assert_eq!(once, twice);
    });
}

#[test]
fn equal_version_can_be_ignored() {
    let engine = TestEngine::memory_with_config(
        EngineConfig::new().equal_version_policy(EqualVersionPolicy::Ignore),
    );
    let repo = engine.repository::<Temperature>();
    let mut server = MockAuthority::new();
    let record = repo.create(temperature(368)).unwrap();
    server.sync(&repo).unwrap();

    let same = server.get(record.id()).unwrap().clone();
    let outcome = repo.reconcile(same).unwrap();
    assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::AlreadyApplied));
}

#[test]
fn keep_local_pushes_over_newer_server_state() {
    with_engine(|engine| {
        let repo = engine.repository::<CervixDilation>();
        let mut server = MockAuthority::new();
        let record = repo.create(dilation(4)).unwrap();
        server.sync(&repo).unwrap();

        engine.advance(1_000);
        repo.update(record.id(), dilation(7)).unwrap();
        let remote = server.edit(record.id(), dilation(6), PEER_DEVICE, START_MILLIS + 500);
        repo.reconcile(remote).unwrap();

        // Conflicted records are held back from push
        assert_eq!(server.sync(&repo).unwrap().pushed, 0);

        repo.resolve_conflict(record.id(), ConflictResolution::KeepLocal)
            .unwrap();
        let round = server.sync(&repo).unwrap();
        assert_eq!(round.pushed, 1);
        assert_eq!(server.get(record.id()).unwrap().payload, dilation(7));
        assert_eq!(server.server_version(record.id()), 3);

        let stored = repo.get(record.id()).unwrap().unwrap();
        assert_eq!(stored.envelope.sync_status, SyncStatus::Clean);
        assert_eq!(stored.envelope.server_version, 3);
    });
}

#[test]
fn accept_remote_discards_local_edit() {
    with_engine(|engine| {
        let repo = engine.repository::<CervixDilation>();
        let mut server = MockAuthority::new();
        let record = repo.create(dilation(4)).unwrap();
        server.sync(&repo).unwrap();

        engine.advance(1_000);
        repo.update(record.id(), dilation(7)).unwrap();
        let remote = server.edit(record.id(), dilation(6), PEER_DEVICE, START_MILLIS + 500);
        repo.reconcile(remote).unwrap();

        let resolved = repo
            .resolve_conflict(record.id(), ConflictResolution::AcceptRemote)
            .unwrap();
        assert_eq!(resolved.payload, dilation(6));
        assert_eq!(resolved.envelope.sync_status, SyncStatus::Clean);
        assert!(engine.conflicts().unwrap().is_empty());
    });
}

#[test]
fn newer_remote_replaces_held_conflict() {
    with_engine(|engine| {
        let repo = engine.repository::<CervixDilation>();
        let mut server = MockAuthority::new();
        let record = repo.create(dilation(4)).unwrap();
        server.sync(&repo).unwrap();

        engine.advance(1_000);
        repo.update(record.id(), dilation(7)).unwrap();
        let first = server.edit(record.id(), dilation(6), PEER_DEVICE, START_MILLIS + 500);
        let second = server.edit(record.id(), dilation(8), PEER_DEVICE, START_MILLIS + 700);

        assert!(repo.reconcile(second).unwrap().is_conflicted());
        let outcome = repo.reconcile(first).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Rejected(RejectReason::Stale));

        let held = repo.conflict(record.id()).unwrap().unwrap();
        assert_eq!(held.payload, dilation(8));
        assert_eq!(engine.conflicts().unwrap().len(), 1);
    });
}

#[test]
fn mutations_on_missing_records_fail() {
    with_engine(|engine| {
        let repo = engine.repository::<Contraction>();
        let missing = RecordId::new();
        assert!(matches!(
            repo.update(missing, contraction(30)),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(repo.delete(missing), Err(CoreError::NotFound { .. })));
        assert!(matches!(
            repo.resolve_conflict(missing, ConflictResolution::KeepLocal),
            Err(CoreError::NotFound { .. })
        ));
        assert!(repo.get(missing).unwrap().is_none());
    });
}

#[test]
fn stats_reflect_sync_state() {
    with_engine(|engine| {
        let repo = engine.repository::<Contraction>();
        let mut server = MockAuthority::new();
        let a = repo.create(contraction(40)).unwrap();
        repo.create(contraction(55)).unwrap();
        server.sync(&repo).unwrap();
        repo.delete(a.id()).unwrap();

        let stats = engine.stats().unwrap();
        let counts = stats.get("contraction").unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.clean, 1);
        assert_eq!(counts.dirty, 1);
        assert_eq!(counts.tombstoned, 1);
        assert_eq!(counts.pending(), 1);
    });
}
