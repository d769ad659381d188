mod common;

use std::sync::Arc;

use common::{drain, memory, rgba, spawn_worker, Gate, UploadKind, TIMEOUT};
use parking_lot::Mutex;
use pixel_transfer::{
    MemoryParams, TexImage2DParams, TexSubImage2DParams, TransferConfig, TransferCoordinator,
    TransferPhase, TextureId,
};
use pixel_transfer_core::HeapSharedMemory;

#[test]
fn sub_image_updates_return_straight_to_idle() {
    let (worker, recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker.clone());
    let state = coordinator.create_transfer_state(TextureId::new(4), TexImage2DParams::rgba8(4, 4));

    let gate = Gate::close(&worker);
    coordinator.submit_sub_image(&state, TexSubImage2DParams::rgba8(1, 2, 2, 1), memory(rgba(2, 1, 0x5a)));
    assert!(state.is_transfer_in_progress());
    assert_eq!(coordinator.pending_len(), 0);

    gate.open();
    coordinator.wait_for_completion(&state);
    assert_eq!(state.phase(), TransferPhase::Idle);
    assert_eq!(coordinator.reconcile_completed(), 0);

    let uploads = recorder.uploads_for(TextureId::new(4));
    assert_eq!(uploads.len(), 1);
    assert_eq!(
        uploads[0].kind,
        UploadKind::SubImage { x: 1, y: 2, width: 2, height: 1 }
    );
    assert_eq!(uploads[0].pixels, rgba(2, 1, 0x5a));
}

#[test]
fn uploads_read_only_the_declared_range() {
    let (worker, recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker);
    let state = coordinator.create_transfer_state(TextureId::new(5), TexImage2DParams::rgba8(1, 1));

    // The range ends exactly at the end of the block.
    let memory = MemoryParams {
        shared_memory: HeapSharedMemory::shared(vec![0, 1, 2, 3, 4, 5, 6, 7]),
        shm_size: 8,
        shm_data_offset: 4,
        shm_data_size: 4,
    };
    coordinator.submit_upload(&state, *state.define_params(), memory, |_| {});
    coordinator.wait_for_completion(&state);

    assert_eq!(recorder.uploads()[0].pixels, vec![4, 5, 6, 7]);
    assert_eq!(coordinator.reconcile_completed(), 1);
}

#[test]
fn out_of_bounds_range_is_rejected_and_never_completes() {
    let (worker, recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker.clone());
    let state = coordinator.create_transfer_state(TextureId::new(6), TexImage2DParams::rgba8(1, 1));

    let memory = MemoryParams {
        shared_memory: HeapSharedMemory::shared(vec![0; 8]),
        shm_size: 8,
        shm_data_offset: 6,
        shm_data_size: 4,
    };
    coordinator.submit_upload(&state, *state.define_params(), memory, |_| {});
    drain(&worker);

    assert!(recorder.uploads().is_empty());
    assert_eq!(recorder.flushes(), 0);
    assert_eq!(coordinator.upload_count(), 0);
    assert!(state.is_transfer_in_progress());
    assert_eq!(state.phase(), TransferPhase::InProgress);
    assert_eq!(coordinator.reconcile_completed(), 0);
}

#[test]
fn unmappable_block_is_rejected_and_never_completes() {
    let (worker, recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker.clone());
    let state = coordinator.create_transfer_state(TextureId::new(6), TexImage2DParams::rgba8(1, 1));

    // Declares more memory than the block holds.
    let memory = MemoryParams {
        shared_memory: HeapSharedMemory::shared(vec![0; 4]),
        shm_size: 16,
        shm_data_offset: 0,
        shm_data_size: 4,
    };
    coordinator.submit_upload(&state, *state.define_params(), memory, |_| {});
    drain(&worker);

    assert!(recorder.uploads().is_empty());
    assert!(state.is_transfer_in_progress());
}

#[test]
fn refused_upload_is_neither_bound_nor_counted() {
    let (worker, recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker.clone());
    let define = coordinator.create_transfer_state(TextureId::new(12), TexImage2DParams::rgba8(64, 64));
    let update = coordinator.create_transfer_state(TextureId::new(13), TexImage2DParams::rgba8(4, 4));
    let bound = Arc::new(Mutex::new(false));
    recorder.refuse_uploads();

    // A valid 4-byte range for a 64x64 definition.
    let flag = bound.clone();
    coordinator.submit_upload(&define, *define.define_params(), memory(rgba(1, 1, 0)), move |_| {
        *flag.lock() = true
    });
    coordinator.submit_sub_image(&update, TexSubImage2DParams::rgba8(0, 0, 2, 2), memory(rgba(1, 1, 0)));
    drain(&worker);

    assert!(define.is_transfer_in_progress());
    assert_eq!(define.phase(), TransferPhase::InProgress);
    assert!(update.is_transfer_in_progress());
    assert_eq!(coordinator.reconcile_completed(), 0);
    assert!(!*bound.lock());
    assert_eq!(coordinator.upload_count(), 0);
    assert_eq!(recorder.flushes(), 0);
    assert!(recorder.uploads().is_empty());
}

#[test]
fn stats_count_every_completed_upload() {
    let (worker, _recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker);
    let state = coordinator.create_transfer_state(TextureId::new(8), TexImage2DParams::rgba8(2, 2));
    assert_eq!(coordinator.upload_count(), 0);

    coordinator.submit_upload(&state, *state.define_params(), memory(rgba(2, 2, 0)), |_| {});
    coordinator.wait_for_completion(&state);
    coordinator.reconcile_completed();
    coordinator.submit_sub_image(&state, TexSubImage2DParams::rgba8(0, 0, 1, 1), memory(rgba(1, 1, 0)));
    coordinator.wait_for_completion(&state);

    assert_eq!(coordinator.upload_count(), 2);
    assert_eq!(coordinator.stats().snapshot().0, 2);
    assert!(!coordinator.needs_process_more_pending_transfers());
    coordinator.process_more_pending_transfers();
}

#[test]
fn drain_notification_follows_earlier_uploads() {
    let (worker, recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker.clone());
    let state = coordinator.create_transfer_state(TextureId::new(9), TexImage2DParams::rgba8(1, 1));

    let block = HeapSharedMemory::shared(vec![7; 12]);
    let memory = MemoryParams {
        shared_memory: block.clone(),
        shm_size: 12,
        shm_data_offset: 4,
        shm_data_size: 4,
    };

    let gate = Gate::close(&worker);
    coordinator.submit_upload(&state, *state.define_params(), memory.clone(), |_| {});

    let (tx, rx) = std::sync::mpsc::channel();
    let seen = recorder.clone();
    coordinator.notify_when_drained(memory, move |params| {
        let _ = tx.send((params.clone(), seen.uploads().len()));
    });
    assert!(rx.try_recv().is_err());

    gate.open();
    let (params, uploads_before) = rx.recv_timeout(TIMEOUT).expect("drain notification");
    assert_eq!(uploads_before, 1);
    assert_eq!(params.shared_memory.id(), block.id());
    assert_eq!(params.shm_size, 12);
    assert_eq!(params.shm_data_offset, 4);
    assert_eq!(params.shm_data_size, 4);
}

#[test]
fn invalid_drain_region_drops_callback() {
    let (worker, _recorder) = spawn_worker(&TransferConfig::default());
    let coordinator = TransferCoordinator::new(worker.clone());
    let called = Arc::new(Mutex::new(false));

    let memory = MemoryParams {
        shared_memory: HeapSharedMemory::shared(vec![0; 4]),
        shm_size: 4,
        shm_data_offset: 1,
        shm_data_size: 4,
    };
    let flag = called.clone();
    coordinator.notify_when_drained(memory, move |_| *flag.lock() = true);
    drain(&worker);

    assert!(!*called.lock());
}

#[test]
#[should_panic(expected = "transfer submitted while another is in progress")]
fn submitting_twice_while_in_progress_panics() {
    let (worker, _recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker.clone());
    let state = coordinator.create_transfer_state(TextureId::new(1), TexImage2DParams::rgba8(1, 1));

    let _gate = Gate::close(&worker);
    coordinator.submit_upload(&state, *state.define_params(), memory(rgba(1, 1, 0)), |_| {});
    coordinator.submit_upload(&state, *state.define_params(), memory(rgba(1, 1, 0)), |_| {});
}

#[test]
#[should_panic(expected = "submitted before the previous one was bound")]
fn submitting_before_bind_panics() {
    let (worker, _recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker);
    let state = coordinator.create_transfer_state(TextureId::new(1), TexImage2DParams::rgba8(1, 1));

    coordinator.submit_upload(&state, *state.define_params(), memory(rgba(1, 1, 0)), |_| {});
    coordinator.wait_for_completion(&state);
    coordinator.submit_upload(&state, *state.define_params(), memory(rgba(1, 1, 0)), |_| {});
}

#[test]
#[should_panic(expected = "upload submitted for texture 0")]
fn null_texture_is_rejected() {
    let (worker, _recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker);
    let state = coordinator.create_transfer_state(TextureId::new(0), TexImage2DParams::rgba8(1, 1));
    coordinator.submit_upload(&state, *state.define_params(), memory(rgba(1, 1, 0)), |_| {});
}

#[test]
#[should_panic(expected = "only level 0 uploads are supported")]
fn non_zero_level_is_rejected() {
    let (worker, _recorder) = spawn_worker(&TransferConfig::default());
    let mut coordinator = TransferCoordinator::new(worker);
    let state = coordinator.create_transfer_state(TextureId::new(1), TexImage2DParams::rgba8(1, 1));
    let params = TexImage2DParams {
        level: 1,
        ..*state.define_params()
    };
    coordinator.submit_upload(&state, params, memory(rgba(1, 1, 0)), |_| {});
}
