//! Process-wide list state
//!
//! The per-kind item counts, the active mission slot, the current sequence
//! and the transfer admission gate are shared by every link instance in the
//! process: two ground stations on two radios talk to the same authoritative
//! store. [`SharedLists`] wraps that state in a critical-section mutex; each
//! handler instance holds a reference and all access goes through short
//! closures, never across a storage call or a scheduler boundary.
//!
//! The navigator side polls [`SharedLists::mission_state`] and compares the
//! slot id (or the generation counter) against its cached copy to detect a
//! replaced mission; there are no callbacks.

use core::cell::RefCell;
use critical_section::Mutex;
use mavlink::common::MavMissionType;

use crate::storage::records::{
    ListStatsRecord, MissionStateRecord, LIST_STATS_RECORD_SIZE, MISSION_STATE_RECORD_SIZE,
};
use crate::storage::{Dataman, DmRegion};

/// Capacity bounds per list kind (mission, fence, rally).
pub const MAX_COUNT: [u16; 3] = [200, 64, 16];

/// Dense index for a transferable list kind.
///
/// `All` and unknown kinds return `None`; they are valid only as a clear
/// operand.
pub fn kind_index(kind: MavMissionType) -> Option<usize> {
    match kind {
        MavMissionType::MAV_MISSION_TYPE_MISSION => Some(0),
        MavMissionType::MAV_MISSION_TYPE_FENCE => Some(1),
        MavMissionType::MAV_MISSION_TYPE_RALLY => Some(2),
        _ => None,
    }
}

/// Snapshot of the active mission, published on every commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionStateChanged {
    /// Authoritative waypoint slot
    pub dataman_id: u8,
    /// Item count of the active mission
    pub count: u16,
    /// Currently executing index, if any
    pub current_seq: Option<u16>,
    /// Monotonic publication counter
    pub generation: u32,
}

/// The process-wide list state. Access only through [`SharedLists`].
#[derive(Debug)]
pub struct MissionLists {
    /// Item counts per kind (mission, fence, rally)
    counts: [u16; 3],
    /// Authoritative waypoint slot (0 or 1)
    dataman_id: u8,
    /// Currently executing mission index
    current_seq: Option<u16>,
    /// Last waypoint the navigator reported reached
    last_reached: Option<u16>,
    /// Incremented on every fence replacement
    geofence_update_counter: u16,
    /// Coarse admission gate: one upload per process at a time
    transfer_in_progress: bool,
    /// Startup state restore already ran
    restored: bool,
    /// Incremented on every mission state publication
    generation: u32,
}

impl MissionLists {
    const fn new() -> Self {
        Self {
            counts: [0; 3],
            dataman_id: 0,
            current_seq: None,
            last_reached: None,
            geofence_update_counter: 0,
            transfer_in_progress: false,
            restored: false,
            generation: 0,
        }
    }

    /// Item count for a kind index from [`kind_index`].
    pub fn count(&self, kind: usize) -> u16 {
        self.counts[kind]
    }

    pub fn mission_count(&self) -> u16 {
        self.counts[0]
    }

    pub fn dataman_id(&self) -> u8 {
        self.dataman_id
    }

    pub fn current_seq(&self) -> Option<u16> {
        self.current_seq
    }

    pub fn last_reached(&self) -> Option<u16> {
        self.last_reached
    }

    pub fn geofence_update_counter(&self) -> u16 {
        self.geofence_update_counter
    }

    pub fn transfer_in_progress(&self) -> bool {
        self.transfer_in_progress
    }

    pub(crate) fn set_transfer_in_progress(&mut self, in_progress: bool) {
        self.transfer_in_progress = in_progress;
    }

    pub(crate) fn set_current_seq(&mut self, seq: Option<u16>) {
        self.current_seq = seq;
    }

    pub(crate) fn set_last_reached(&mut self, seq: Option<u16>) {
        self.last_reached = seq;
    }

    /// Publish a committed mission state.
    pub(crate) fn set_mission(&mut self, dataman_id: u8, count: u16, current_seq: Option<u16>) {
        self.dataman_id = dataman_id;
        self.counts[0] = count;
        self.current_seq = current_seq;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Reserve the next geofence update counter value.
    ///
    /// Incremented before the stats write so a retried commit never reuses a
    /// counter value the navigator may already have seen.
    pub(crate) fn next_geofence_counter(&mut self) -> u16 {
        self.geofence_update_counter = self.geofence_update_counter.wrapping_add(1);
        self.geofence_update_counter
    }

    pub(crate) fn set_fence_stats(&mut self, stats: ListStatsRecord) {
        self.counts[1] = stats.count;
        self.geofence_update_counter = stats.update_counter;
    }

    pub(crate) fn set_fence_count(&mut self, count: u16) {
        self.counts[1] = count;
    }

    pub(crate) fn set_rally_count(&mut self, count: u16) {
        self.counts[2] = count;
    }
}

/// Shared handle to the process-wide list state.
///
/// Const-constructible so hosts can place it in a `static`; tests construct
/// it locally and hand the same reference to several handler instances.
pub struct SharedLists {
    inner: Mutex<RefCell<MissionLists>>,
}

impl SharedLists {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(MissionLists::new())),
        }
    }

    /// Access the list state immutably.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&MissionLists) -> R,
    {
        critical_section::with(|cs| f(&self.inner.borrow(cs).borrow()))
    }

    /// Access the list state mutably.
    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut MissionLists) -> R,
    {
        critical_section::with(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }

    /// Restore counts, slot and current sequence from the store.
    ///
    /// Runs once per process; handler instances created later adopt the
    /// already-restored state. Missing or invalid records leave the
    /// corresponding defaults (empty lists, slot 0) in place.
    pub fn restore<D: Dataman>(&self, dm: &mut D) {
        if self.with(|lists| lists.restored) {
            return;
        }

        let mut state_buf = [0u8; MISSION_STATE_RECORD_SIZE];
        let mission = match dm.read(DmRegion::MissionState, 0, &mut state_buf) {
            Ok(n) if n == MISSION_STATE_RECORD_SIZE => MissionStateRecord::decode(&state_buf).ok(),
            _ => None,
        };

        let fence = read_stats(dm, DmRegion::FencePoints);
        let rally = read_stats(dm, DmRegion::SafePoints);

        self.with_mut(|lists| {
            lists.restored = true;

            if let Some(state) = mission {
                lists.dataman_id = state.dataman_id;
                lists.counts[0] = state.count;
                lists.current_seq = state.current_seq;
            }

            if let Some(stats) = fence {
                lists.set_fence_stats(stats);
            }

            if let Some(stats) = rally {
                lists.counts[2] = stats.count;
            }
        });
    }

    /// Snapshot for the navigator's poll loop.
    pub fn mission_state(&self) -> MissionStateChanged {
        self.with(|lists| MissionStateChanged {
            dataman_id: lists.dataman_id,
            count: lists.counts[0],
            current_seq: lists.current_seq,
            generation: lists.generation,
        })
    }
}

impl Default for SharedLists {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn read_stats<D: Dataman>(dm: &mut D, region: DmRegion) -> Option<ListStatsRecord> {
    let mut buf = [0u8; LIST_STATS_RECORD_SIZE];
    match dm.read(region, 0, &mut buf) {
        Ok(n) if n == LIST_STATS_RECORD_SIZE => ListStatsRecord::decode(&buf).ok(),
        _ => None,
    }
}
