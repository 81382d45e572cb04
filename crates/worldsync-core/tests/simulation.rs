//! Integration tests for the frame tick, startup load, and run loop.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use chrono::DateTime;
use worldsync_core::config::RunConfig;
use worldsync_core::{RunEndReason, RunnerError, Simulation, run_server};
use worldsync_db::{
    AsyncSaveStorage, ChangeFormBatch, FileStore, InMemoryStore, SaveStorage, StoreError,
};
use worldsync_types::{BaseId, ChangeForm, FormDesc, LocationalData, RecType, RefId, Vec3};
use worldsync_world::{
    BaseType, Collaborators, ManualClock, NewRef, WorldConfig, WorldState,
};

const POLL: Duration = Duration::from_millis(5);

fn tamriel() -> FormDesc {
    FormDesc::new(0x3c, "Skyrim.esm")
}

fn world() -> WorldState {
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    WorldState::new(
        WorldConfig::default(),
        Collaborators {
            clock: Box::new(clock),
            ..Collaborators::default()
        },
    )
}

fn simulation(store: impl SaveStorage + 'static) -> Simulation {
    let storage = AsyncSaveStorage::with_poll_interval(store, "test", POLL).unwrap();
    Simulation::new(world(), storage)
}

fn here() -> LocationalData {
    LocationalData {
        pos: Vec3::ZERO,
        rot: Vec3::ZERO,
        cell_or_world_desc: tamriel(),
    }
}

fn stored_actor(id: u32, profile_id: i32) -> ChangeForm {
    ChangeForm {
        rec_type: RecType::Actor,
        form_desc: FormDesc::runtime(id),
        base_desc: FormDesc::new(0x7, "Skyrim.esm"),
        position: Vec3::new(10.0, 20.0, 0.0),
        world_or_cell_desc: tamriel(),
        profile_id,
        ..ChangeForm::default()
    }
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("worldsync-core-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Memory backend that rejects every batch.
struct BrokenStore;

impl SaveStorage for BrokenStore {
    fn upsert(&mut self, _batch: ChangeFormBatch) -> Result<usize, StoreError> {
        Err(StoreError::Config("backend offline".to_owned()))
    }

    fn iterate(&mut self, _visit: &mut dyn FnMut(ChangeForm)) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "broken"
    }
}

// =============================================================================
// Startup load
// =============================================================================

#[test]
fn load_places_stored_references() {
    let store = InMemoryStore::with_forms([stored_actor(0xff00_0005, 3)]);
    let mut sim = simulation(store);

    let summary = sim.load().unwrap();
    assert_eq!(summary.read, 1);
    assert_eq!(summary.placed, 1);

    let id = RefId::new(0xff00_0005);
    let actor = sim.world().lookup(id).unwrap();
    assert!(actor.is_actor());
    assert_eq!(actor.pos(), Vec3::new(10.0, 20.0, 0.0));
    assert_eq!(sim.world().actors_by_profile_id(3), vec![id]);
    assert_eq!(sim.world().pending_save_count(), 0);

    let created = sim
        .world_mut()
        .create_ref(BaseId::new(0xf), BaseType::from_code("MISC"), false, here())
        .unwrap();
    assert_eq!(created, RefId::new(0xff00_0006));
}

#[test]
fn load_applies_snapshots_to_record_references() {
    let plant = RefId::new(0x0001_0001);
    let stored = ChangeForm {
        form_desc: FormDesc::new(0x01_0001, "Skyrim.esm"),
        base_desc: FormDesc::new(0x99, "Skyrim.esm"),
        world_or_cell_desc: tamriel(),
        is_harvested: true,
        next_reloot_datetime: 1,
        ..ChangeForm::default()
    };
    let mut sim = simulation(InMemoryStore::with_forms([stored]));
    sim.world_mut()
        .add_ref(
            NewRef {
                id: plant,
                base_id: BaseId::new(0x99),
                base_type: BaseType::Flor,
                is_actor: false,
                location: here(),
                trigger_volume: None,
            },
            None,
        )
        .unwrap();

    let summary = sim.load().unwrap();
    assert_eq!(summary.applied, 1);
    assert!(sim.world().change_form(plant).unwrap().is_harvested);
    assert_eq!(sim.world().timers().len(), 1);
}

#[test]
fn load_skips_unknown_files_and_deleted_runtime_references() {
    let foreign = ChangeForm {
        form_desc: FormDesc::new(0x10, "Removed.esp"),
        ..ChangeForm::default()
    };
    let mut deleted = stored_actor(0xff00_0009, -1);
    deleted.is_deleted = true;
    let mut sim = simulation(InMemoryStore::with_forms([foreign, deleted]));

    let summary = sim.load().unwrap();
    assert_eq!(summary.read, 2);
    assert_eq!(summary.skipped, 2);
    assert!(sim.world().is_empty());
}

// =============================================================================
// Frame tick
// =============================================================================

#[test]
fn frame_hands_pending_saves_to_the_store() {
    let mut sim = simulation(InMemoryStore::new());
    let id = sim
        .world_mut()
        .create_ref(BaseId::new(0xf), BaseType::from_code("MISC"), false, here())
        .unwrap();

    let summary = sim.tick().unwrap();
    assert_eq!(summary.frame, 1);
    assert_eq!(summary.saves_queued, 1);
    assert_eq!(sim.world().pending_save_count(), 0);

    for _ in 0..400 {
        if sim.storage().num_finished_upserts() == 1 {
            break;
        }
        thread::sleep(POLL);
        sim.tick().unwrap();
    }
    assert_eq!(sim.storage().num_finished_upserts(), 1);

    let mut stored = Vec::new();
    sim.storage()
        .iterate_sync(&mut |f| stored.push(f.form_desc))
        .unwrap();
    assert_eq!(stored, vec![FormDesc::runtime(id.into_inner())]);
}

#[test]
fn idle_frame_queues_nothing() {
    let mut sim = simulation(InMemoryStore::new());
    let summary = sim.tick().unwrap();
    assert_eq!(summary.saves_queued, 0);
    assert_eq!(summary.timers_fired, 0);
}

#[test]
fn shutdown_flushes_unsaved_references() {
    let dir = scratch_dir("shutdown");
    let mut sim = simulation(FileStore::open(&dir).unwrap());
    sim.world_mut()
        .create_ref(BaseId::new(0xf), BaseType::from_code("MISC"), false, here())
        .unwrap();
    sim.shutdown().unwrap();

    let mut count = 0_usize;
    FileStore::open(&dir)
        .unwrap()
        .iterate(&mut |_| count += 1)
        .unwrap();
    assert_eq!(count, 1);
    std::fs::remove_dir_all(&dir).unwrap();
}

// =============================================================================
// Run loop
// =============================================================================

#[tokio::test]
async fn run_stops_at_tick_limit() {
    let mut sim = simulation(InMemoryStore::new());
    let config = RunConfig {
        tick_interval_ms: 0,
        max_ticks: 3,
        fatal_on_persist_error: false,
    };
    let stop = AtomicBool::new(false);

    let result = run_server(&mut sim, &config, &stop).await.unwrap();
    assert_eq!(result.end_reason, RunEndReason::MaxTicksReached);
    assert_eq!(result.total_ticks, 3);
    assert_eq!(sim.frame(), 3);
}

#[tokio::test]
async fn run_honours_stop_flag() {
    let mut sim = simulation(InMemoryStore::new());
    let stop = AtomicBool::new(true);

    let result = run_server(&mut sim, &RunConfig::default(), &stop)
        .await
        .unwrap();
    assert_eq!(result.end_reason, RunEndReason::Stopped);
    assert_eq!(result.total_ticks, 0);
    assert!(result.final_summary.is_none());
}

#[tokio::test]
async fn persistence_faults_are_counted_and_skipped() {
    let mut sim = simulation(BrokenStore);
    sim.world_mut()
        .create_ref(BaseId::new(0xf), BaseType::from_code("MISC"), false, here())
        .unwrap();
    let config = RunConfig {
        tick_interval_ms: 5,
        max_ticks: 200,
        fatal_on_persist_error: false,
    };

    let result = run_server(&mut sim, &config, &AtomicBool::new(false))
        .await
        .unwrap();
    assert_eq!(result.persist_faults, 1);
}

#[tokio::test]
async fn persistence_fault_can_stop_the_server() {
    let mut sim = simulation(BrokenStore);
    sim.world_mut()
        .create_ref(BaseId::new(0xf), BaseType::from_code("MISC"), false, here())
        .unwrap();
    let config = RunConfig {
        tick_interval_ms: 5,
        max_ticks: 400,
        fatal_on_persist_error: true,
    };

    let err = run_server(&mut sim, &config, &AtomicBool::new(false))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Persist { .. }));
}
