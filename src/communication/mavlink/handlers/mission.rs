//! Mission Protocol Handler
//!
//! The endpoint side of the MAVLink mission transfer protocol for all three
//! list kinds (mission, geofence, rally points).
//!
//! # Mission Upload Flow (GCS -> Vehicle)
//!
//! 1. GCS sends MISSION_COUNT with the item count
//! 2. Vehicle responds with MISSION_REQUEST(_INT) for seq=0
//! 3. GCS sends MISSION_ITEM(_INT) for seq=0
//! 4. ... repeat until all items received
//! 5. Vehicle commits the list and sends MISSION_ACK
//!
//! Uploaded mission items go to the *inactive* waypoint slot; the state
//! record flips the slot pointer only after the last item is stored, so a
//! reader never observes a half-written mission. Fence uploads hold the
//! fence region lock from the first request until the transfer leaves
//! GetList, on every exit path.
//!
//! # Mission Download Flow (Vehicle -> GCS)
//!
//! 1. GCS sends MISSION_REQUEST_LIST
//! 2. Vehicle responds with MISSION_COUNT
//! 3. GCS requests each item in sequence, re-requesting at most the last one
//! 4. GCS sends MISSION_ACK to finish
//!
//! # Timeouts
//!
//! Two clocks run against the partner: a per-item retry timeout that
//! re-emits the last frame, and an overall action timeout that abandons the
//! transfer with an operator diagnostic. Both are serviced from
//! [`MissionHandler::update`].
//!
//! Exactly one partner owns an active transfer; frames from any other
//! (system, component) are refused with a diagnostic and never touch the
//! transfer state.

use heapless::Vec;
use mavlink::common::{
    MavComponent, MavMessage, MavMissionResult, MavMissionType, MISSION_ACK_DATA,
    MISSION_CLEAR_ALL_DATA, MISSION_COUNT_DATA, MISSION_CURRENT_DATA, MISSION_ITEM_DATA,
    MISSION_ITEM_INT_DATA, MISSION_ITEM_REACHED_DATA, MISSION_REQUEST_DATA,
    MISSION_REQUEST_INT_DATA, MISSION_REQUEST_LIST_DATA, MISSION_SET_CURRENT_DATA,
};
use mavlink::MavHeader;

use crate::communication::mavlink::{items, status_notifier};
use crate::core::mission::item::MissionItem;
use crate::core::mission::lists::{kind_index, read_stats, SharedLists, MAX_COUNT};
use crate::storage::records::{
    self, ListStatsRecord, MissionStateRecord, ITEM_RECORD_SIZE, LIST_STATS_RECORD_SIZE,
    MISSION_STATE_RECORD_SIZE,
};
use crate::storage::{Dataman, DmRegion, PersistClass};

/// Maximum responses a single inbound frame can produce
pub const MAX_RESPONSES: usize = 4;

/// Bounded response collection returned by every handler entry point
pub type Responses = Vec<MavMessage, MAX_RESPONSES>;

/// Overall partner-silence timeout (microseconds)
const DEFAULT_ACTION_TIMEOUT_US: u64 = 5_000_000;

/// Per-item retry timeout (microseconds)
const DEFAULT_RETRY_TIMEOUT_US: u64 = 500_000;

/// MISSION_CURRENT broadcast interval (10 Hz)
const CURRENT_INTERVAL_US: u64 = 100_000;

/// Window for re-broadcasting MISSION_ITEM_REACHED after a waypoint
const REACHED_ECHO_WINDOW_US: u64 = 300_000;

/// Operator notifications per process for storage failures
const STORAGE_NOTIFY_LIMIT: u8 = 2;

const COMP_ID_ALL: u8 = MavComponent::MAV_COMP_ID_ALL as u8;
const COMP_ID_MISSIONPLANNER: u8 = MavComponent::MAV_COMP_ID_MISSIONPLANNER as u8;

/// Remote endpoint identity for the duration of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partner {
    pub system_id: u8,
    pub component_id: u8,
}

impl Partner {
    fn from_header(header: &MavHeader) -> Self {
        Self {
            system_id: header.system_id,
            component_id: header.component_id,
        }
    }
}

/// Handler configuration.
#[derive(Debug, Clone, Copy)]
pub struct MissionConfig {
    /// MAVLink system ID of this endpoint
    pub system_id: u8,
    /// MAVLink component ID of this endpoint
    pub component_id: u8,
    /// Overall partner-silence timeout in microseconds
    pub action_timeout_us: u64,
    /// Per-item retry timeout in microseconds
    pub retry_timeout_us: u64,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            system_id: 1,
            component_id: 1,
            action_timeout_us: DEFAULT_ACTION_TIMEOUT_US,
            retry_timeout_us: DEFAULT_RETRY_TIMEOUT_US,
        }
    }
}

/// Execution progress event published by the navigator.
#[derive(Debug, Clone, Copy)]
pub struct MissionResult {
    /// Index the navigator is executing now
    pub seq_current: u16,
    /// Waypoint just reached, if any
    pub seq_reached: Option<u16>,
    /// A DO_JUMP repeat counter changed
    pub item_do_jump_changed: bool,
    /// Index of the changed item
    pub item_changed_index: u16,
}

/// Sequence counters of an active transfer.
#[derive(Debug, Clone, Copy)]
struct TransferSession {
    kind: MavMissionType,
    partner: Partner,
    /// Next index to send (download) or receive (upload)
    seq: u16,
    /// Count agreed at transfer start
    count: u16,
}

/// Transfer state machine phase.
#[derive(Debug, Clone, Copy)]
enum TransferPhase {
    /// No transfer active
    Idle,
    /// Sending the list to the partner (download)
    SendList(TransferSession),
    /// Receiving a new list from the partner (upload)
    GetList {
        session: TransferSession,
        /// Write target for mission items: the inactive slot
        staging_slot: u8,
        /// Index the partner flagged current in the new list
        current_seq: Option<u16>,
    },
}

/// Simple elapsed-interval gate for periodic broadcasts.
#[derive(Debug)]
struct RateLimiter {
    interval_us: u64,
    last_us: Option<u64>,
}

impl RateLimiter {
    const fn new(interval_us: u64) -> Self {
        Self {
            interval_us,
            last_us: None,
        }
    }

    fn check(&mut self, now: u64) -> bool {
        match self.last_us {
            Some(last) if now.saturating_sub(last) < self.interval_us => false,
            _ => {
                self.last_us = Some(now);
                true
            }
        }
    }
}

/// Mission protocol handler; one instance per telemetry link.
///
/// All instances share one [`SharedLists`] and one store, so a mission
/// uploaded through one link is immediately visible on the others.
pub struct MissionHandler<'a> {
    config: MissionConfig,
    /// Process-wide list state shared across link instances
    lists: &'a SharedLists,
    phase: TransferPhase,
    /// Partner speaks the int-scaled coordinate encoding
    int_mode: bool,
    /// Fence region lock held (upload in progress)
    fence_locked: bool,
    time_last_sent: Option<u64>,
    time_last_recv: Option<u64>,
    time_last_reached: Option<u64>,
    /// Cached copy of the active slot, for cross-instance change detection
    my_dataman_id: u8,
    /// Partner of the most recent transfer, target of proactive announces
    last_partner: Option<Partner>,
    pending_result: Option<MissionResult>,
    current_broadcast: RateLimiter,
    /// Storage failures reported to the operator so far
    storage_errcount: u8,
}

impl<'a> MissionHandler<'a> {
    /// Create a handler bound to the shared list state.
    ///
    /// The first instance per process restores counts and the active slot
    /// from the store; later instances adopt the restored state.
    pub fn new<D: Dataman>(config: MissionConfig, lists: &'a SharedLists, dm: &mut D) -> Self {
        lists.restore(dm);
        let my_dataman_id = lists.with(|l| l.dataman_id());

        Self {
            config,
            lists,
            phase: TransferPhase::Idle,
            int_mode: false,
            fence_locked: false,
            time_last_sent: None,
            time_last_recv: None,
            time_last_reached: None,
            my_dataman_id,
            last_partner: None,
            pending_result: None,
            current_broadcast: RateLimiter::new(CURRENT_INTERVAL_US),
            storage_errcount: 0,
        }
    }

    /// No transfer in progress on this instance.
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, TransferPhase::Idle)
    }

    /// Current wire coordinate encoding.
    pub fn int_mode(&self) -> bool {
        self.int_mode
    }

    /// Queue a navigator progress event for the next update.
    pub fn notify_mission_result(&mut self, result: MissionResult) {
        self.pending_result = Some(result);
    }

    /// Frame is addressed to this endpoint.
    ///
    /// Accepts our component, the mission-planner component and the
    /// broadcast component.
    fn accepts_target(&self, target_system: u8, target_component: u8) -> bool {
        target_system == self.config.system_id
            && (target_component == self.config.component_id
                || target_component == COMP_ID_MISSIONPLANNER
                || target_component == COMP_ID_ALL)
    }

    fn push(responses: &mut Responses, message: MavMessage) {
        if responses.push(message).is_err() {
            crate::log_warn!("mission response buffer full");
        }
    }

    // ------------------------------------------------------------------
    // Outbound frames
    // ------------------------------------------------------------------

    fn send_ack(
        &mut self,
        responses: &mut Responses,
        partner: Partner,
        kind: MavMissionType,
        result: MavMissionResult,
    ) {
        Self::push(
            responses,
            MavMessage::MISSION_ACK(MISSION_ACK_DATA {
                target_system: partner.system_id,
                target_component: partner.component_id,
                mavtype: result,
                mission_type: kind,
                ..Default::default()
            }),
        );
    }

    fn send_count(
        &mut self,
        responses: &mut Responses,
        partner: Partner,
        count: u16,
        kind: MavMissionType,
        now: u64,
    ) {
        self.time_last_sent = Some(now);
        Self::push(
            responses,
            MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
                target_system: partner.system_id,
                target_component: partner.component_id,
                count,
                mission_type: kind,
                ..Default::default()
            }),
        );
    }

    fn send_request(
        &mut self,
        responses: &mut Responses,
        partner: Partner,
        seq: u16,
        kind: MavMissionType,
        now: u64,
    ) {
        let max = kind_index(kind).map(|k| MAX_COUNT[k]).unwrap_or(0);
        if seq >= max {
            status_notifier::send_critical("Mission request exceeds list capacity");
            crate::log_error!("mission request seq {} exceeds capacity", seq);
            return;
        }

        self.time_last_sent = Some(now);

        if self.int_mode {
            Self::push(
                responses,
                MavMessage::MISSION_REQUEST_INT(MISSION_REQUEST_INT_DATA {
                    target_system: partner.system_id,
                    target_component: partner.component_id,
                    seq,
                    mission_type: kind,
                    ..Default::default()
                }),
            );
        } else {
            Self::push(
                responses,
                MavMessage::MISSION_REQUEST(MISSION_REQUEST_DATA {
                    target_system: partner.system_id,
                    target_component: partner.component_id,
                    seq,
                    mission_type: kind,
                    ..Default::default()
                }),
            );
        }
    }

    /// Read an item from the store and emit it in the current encoding.
    ///
    /// On failure the partner gets an error ack; the caller decides whether
    /// the transfer survives.
    fn send_item<D: Dataman>(
        &mut self,
        responses: &mut Responses,
        partner: Partner,
        seq: u16,
        kind: MavMissionType,
        now: u64,
        dm: &mut D,
    ) -> bool {
        let item = match self.read_item(dm, kind, seq) {
            Some(item) => item,
            None => {
                self.notify_storage_error("Mission storage: read failed");
                self.send_ack(responses, partner, kind, MavMissionResult::MAV_MISSION_ERROR);
                return false;
            }
        };

        let current = kind == MavMissionType::MAV_MISSION_TYPE_MISSION
            && self.lists.with(|l| l.current_seq()) == Some(seq);

        let message = if self.int_mode {
            items::format_item_int(
                &item,
                seq,
                current,
                partner.system_id,
                partner.component_id,
                kind,
            )
            .map(MavMessage::MISSION_ITEM_INT)
        } else {
            items::format_item(
                &item,
                seq,
                current,
                partner.system_id,
                partner.component_id,
                kind,
            )
            .map(MavMessage::MISSION_ITEM)
        };

        match message {
            Some(message) => {
                self.time_last_sent = Some(now);
                Self::push(responses, message);
                true
            }
            None => {
                crate::log_error!("stored item {} no longer maps to a wire command", seq);
                self.send_ack(responses, partner, kind, MavMissionResult::MAV_MISSION_ERROR);
                false
            }
        }
    }

    fn send_current(&mut self, responses: &mut Responses) {
        let (current, count) = self.lists.with(|l| (l.current_seq(), l.mission_count()));
        match current {
            Some(seq) if seq < count => Self::push(
                responses,
                MavMessage::MISSION_CURRENT(MISSION_CURRENT_DATA {
                    seq,
                    ..Default::default()
                }),
            ),
            Some(seq) => {
                crate::log_warn!("current seq {} out of bounds (count {})", seq, count);
            }
            None => {}
        }
    }

    fn send_reached(&mut self, responses: &mut Responses, seq: u16) {
        Self::push(
            responses,
            MavMessage::MISSION_ITEM_REACHED(MISSION_ITEM_REACHED_DATA { seq }),
        );
    }

    // ------------------------------------------------------------------
    // Store access and commits
    // ------------------------------------------------------------------

    fn read_item<D: Dataman>(
        &mut self,
        dm: &mut D,
        kind: MavMissionType,
        seq: u16,
    ) -> Option<MissionItem> {
        let (region, index) = match kind {
            MavMissionType::MAV_MISSION_TYPE_MISSION => {
                let slot = self.lists.with(|l| l.dataman_id());
                (DmRegion::waypoints(slot), seq)
            }
            MavMissionType::MAV_MISSION_TYPE_FENCE => (DmRegion::FencePoints, seq + 1),
            MavMissionType::MAV_MISSION_TYPE_RALLY => (DmRegion::SafePoints, seq + 1),
            _ => return None,
        };

        let mut buf = [0u8; ITEM_RECORD_SIZE];
        match dm.read(region, index, &mut buf) {
            Ok(n) if n == ITEM_RECORD_SIZE => records::decode_item(&buf).ok(),
            _ => None,
        }
    }

    /// Write the mission state record and publish the new active mission.
    fn commit_mission<D: Dataman>(
        &mut self,
        dm: &mut D,
        dataman_id: u8,
        count: u16,
        current_seq: Option<u16>,
    ) -> bool {
        let record = MissionStateRecord {
            dataman_id,
            count,
            current_seq,
        };

        match dm.write(
            DmRegion::MissionState,
            0,
            PersistClass::PowerOnReset,
            &record.encode(),
        ) {
            Ok(n) if n == MISSION_STATE_RECORD_SIZE => {
                self.lists
                    .with_mut(|l| l.set_mission(dataman_id, count, current_seq));
                self.my_dataman_id = dataman_id;
                true
            }
            _ => {
                crate::log_error!("cannot save mission state");
                self.notify_storage_error("Mission storage: write failed");
                false
            }
        }
    }

    /// Write the fence stats record with a fresh update counter.
    fn commit_fence_count<D: Dataman>(&mut self, dm: &mut D, count: u16) -> bool {
        // Counter advances before the write so the navigator reloads even
        // after a retried commit
        let update_counter = self.lists.with_mut(|l| l.next_geofence_counter());
        let record = ListStatsRecord {
            count,
            update_counter,
        };

        match dm.write(
            DmRegion::FencePoints,
            0,
            PersistClass::PowerOnReset,
            &record.encode(),
        ) {
            Ok(n) if n == LIST_STATS_RECORD_SIZE => {
                self.lists.with_mut(|l| l.set_fence_count(count));
                true
            }
            _ => {
                crate::log_error!("cannot save fence stats");
                self.notify_storage_error("Mission storage: write failed");
                false
            }
        }
    }

    fn commit_rally_count<D: Dataman>(&mut self, dm: &mut D, count: u16) -> bool {
        let record = ListStatsRecord {
            count,
            update_counter: 0,
        };

        match dm.write(
            DmRegion::SafePoints,
            0,
            PersistClass::PowerOnReset,
            &record.encode(),
        ) {
            Ok(n) if n == LIST_STATS_RECORD_SIZE => {
                self.lists.with_mut(|l| l.set_rally_count(count));
                true
            }
            _ => {
                crate::log_error!("cannot save rally stats");
                self.notify_storage_error("Mission storage: write failed");
                false
            }
        }
    }

    /// Re-read fence/rally stats so counts reflect commits made through
    /// other link instances. Mission count is already resident.
    fn refresh_stats<D: Dataman>(&mut self, dm: &mut D, kind: MavMissionType) {
        match kind {
            MavMissionType::MAV_MISSION_TYPE_FENCE => {
                if let Some(stats) = read_stats(dm, DmRegion::FencePoints) {
                    self.lists.with_mut(|l| l.set_fence_stats(stats));
                }
            }
            MavMissionType::MAV_MISSION_TYPE_RALLY => {
                if let Some(stats) = read_stats(dm, DmRegion::SafePoints) {
                    self.lists.with_mut(|l| l.set_rally_count(stats.count));
                }
            }
            _ => {}
        }
    }

    fn notify_storage_error(&mut self, message: &str) {
        if self.storage_errcount < STORAGE_NOTIFY_LIMIT {
            status_notifier::send_critical(message);
        }
        self.storage_errcount = self.storage_errcount.saturating_add(1);
    }

    /// The only place allowed to leave an active transfer.
    ///
    /// Always releases the fence lock if held, so no exit path can leak it.
    fn switch_to_idle<D: Dataman>(&mut self, dm: &mut D) {
        if self.fence_locked {
            dm.unlock(DmRegion::FencePoints);
            self.fence_locked = false;
        }

        self.phase = TransferPhase::Idle;
    }

    /// Abort the active upload: error ack, idle, admission gate released.
    fn abort_upload<D: Dataman>(
        &mut self,
        responses: &mut Responses,
        dm: &mut D,
        partner: Partner,
        kind: MavMissionType,
        result: MavMissionResult,
    ) {
        self.send_ack(responses, partner, kind, result);
        self.switch_to_idle(dm);
        self.lists.with_mut(|l| l.set_transfer_in_progress(false));
    }

    // ------------------------------------------------------------------
    // Inbound frames
    // ------------------------------------------------------------------

    /// MISSION_REQUEST_LIST: start (or restart) a download.
    pub fn handle_request_list<D: Dataman>(
        &mut self,
        data: &MISSION_REQUEST_LIST_DATA,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        let mut responses = Responses::new();
        if !self.accepts_target(data.target_system, data.target_component) {
            return responses;
        }

        let kind = data.mission_type;
        let sender = Partner::from_header(header);

        let restartable = matches!(&self.phase, TransferPhase::SendList(s) if s.kind == kind);
        if !matches!(self.phase, TransferPhase::Idle) && !restartable {
            crate::log_warn!("request list while busy");
            status_notifier::send_critical("Mission request list ignored: busy");
            return responses;
        }

        let Some(kind_idx) = kind_index(kind) else {
            status_notifier::send_critical("Unknown mission list type");
            return responses;
        };

        self.time_last_recv = Some(now);
        self.refresh_stats(dm, kind);

        let count = self.lists.with(|l| l.count(kind_idx));
        crate::log_info!("download started: {} items", count);

        self.phase = TransferPhase::SendList(TransferSession {
            kind,
            partner: sender,
            seq: 0,
            count,
        });
        self.last_partner = Some(sender);

        self.send_count(&mut responses, sender, count, kind, now);
        responses
    }

    /// MISSION_REQUEST: item request in the float encoding.
    pub fn handle_request<D: Dataman>(
        &mut self,
        data: &MISSION_REQUEST_DATA,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        if !self.accepts_target(data.target_system, data.target_component) {
            return Responses::new();
        }

        // The partner asked in the float encoding; answer in kind
        self.int_mode = false;
        self.handle_request_common(data.seq, data.mission_type, header, now, dm)
    }

    /// MISSION_REQUEST_INT: item request in the int encoding.
    pub fn handle_request_int<D: Dataman>(
        &mut self,
        data: &MISSION_REQUEST_INT_DATA,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        if !self.accepts_target(data.target_system, data.target_component) {
            return Responses::new();
        }

        self.int_mode = true;
        self.handle_request_common(data.seq, data.mission_type, header, now, dm)
    }

    fn handle_request_common<D: Dataman>(
        &mut self,
        seq: u16,
        kind: MavMissionType,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        let mut responses = Responses::new();
        let sender = Partner::from_header(header);

        match self.phase {
            TransferPhase::SendList(mut session) => {
                if sender != session.partner {
                    status_notifier::send_critical("Mission request: partner id mismatch");
                    return responses;
                }

                if kind != session.kind {
                    crate::log_warn!("request for unexpected mission type");
                    return responses;
                }

                self.time_last_recv = Some(now);

                if seq == session.seq && seq < session.count {
                    session.seq += 1;
                    self.phase = TransferPhase::SendList(session);
                } else if session.seq > 0 && seq == session.seq - 1 {
                    // Our item got lost; resend without advancing
                } else {
                    crate::log_error!(
                        "unexpected request seq {} (expected {})",
                        seq,
                        session.seq
                    );
                    self.switch_to_idle(dm);
                    self.send_ack(
                        &mut responses,
                        session.partner,
                        kind,
                        MavMissionResult::MAV_MISSION_ERROR,
                    );
                    status_notifier::send_critical("Unexpected mission request");
                    return responses;
                }

                // Counts can shrink under us via another instance; re-check
                let current_count = kind_index(kind)
                    .map(|k| self.lists.with(|l| l.count(k)))
                    .unwrap_or(0);

                if seq < current_count {
                    if !self.send_item(&mut responses, session.partner, seq, kind, now, dm) {
                        self.switch_to_idle(dm);
                    }
                } else {
                    self.switch_to_idle(dm);
                    self.send_ack(
                        &mut responses,
                        session.partner,
                        kind,
                        MavMissionResult::MAV_MISSION_ERROR,
                    );
                    status_notifier::send_critical("Unexpected mission request");
                }
            }
            TransferPhase::Idle => {
                // Some OSDs fire stray requests; stay quiet
                crate::log_debug!("mission request with no transfer");
            }
            TransferPhase::GetList { session, .. } => {
                if sender != session.partner {
                    status_notifier::send_critical("Mission request: partner id mismatch");
                } else {
                    status_notifier::send_critical("Mission request ignored: busy");
                }
            }
        }

        responses
    }

    /// MISSION_COUNT: start of an upload, or a clear when the count is zero.
    pub fn handle_count<D: Dataman>(
        &mut self,
        data: &MISSION_COUNT_DATA,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        let mut responses = Responses::new();
        if !self.accepts_target(data.target_system, data.target_component) {
            return responses;
        }

        let kind = data.mission_type;
        let sender = Partner::from_header(header);

        match self.phase {
            TransferPhase::Idle => {
                self.time_last_recv = Some(now);

                if self.lists.with(|l| l.transfer_in_progress()) {
                    crate::log_warn!("upload refused: another transfer in progress");
                    self.send_ack(
                        &mut responses,
                        sender,
                        kind,
                        MavMissionResult::MAV_MISSION_ERROR,
                    );
                    return responses;
                }

                let Some(kind_idx) = kind_index(kind) else {
                    status_notifier::send_critical("Unknown mission list type");
                    self.send_ack(
                        &mut responses,
                        sender,
                        kind,
                        MavMissionResult::MAV_MISSION_ERROR,
                    );
                    return responses;
                };

                if data.count > MAX_COUNT[kind_idx] {
                    crate::log_warn!(
                        "upload refused: {} items, capacity {}",
                        data.count,
                        MAX_COUNT[kind_idx]
                    );
                    self.send_ack(
                        &mut responses,
                        sender,
                        kind,
                        MavMissionResult::MAV_MISSION_NO_SPACE,
                    );
                    return responses;
                }

                if data.count == 0 {
                    // An empty upload is a clear; the ack still signals it
                    let ok = self.clear_list(dm, kind_idx);
                    let result = if ok {
                        MavMissionResult::MAV_MISSION_ACCEPTED
                    } else {
                        MavMissionResult::MAV_MISSION_ERROR
                    };
                    self.send_ack(&mut responses, sender, kind, result);
                    return responses;
                }

                crate::log_info!("upload started: {} items", data.count);
                self.lists.with_mut(|l| l.set_transfer_in_progress(true));

                let staging_slot = 1 - self.lists.with(|l| l.dataman_id());
                self.phase = TransferPhase::GetList {
                    session: TransferSession {
                        kind,
                        partner: sender,
                        seq: 0,
                        count: data.count,
                    },
                    staging_slot,
                    current_seq: None,
                };
                self.last_partner = Some(sender);

                if kind == MavMissionType::MAV_MISSION_TYPE_FENCE {
                    // Keep the navigator away from the fence until commit.
                    // A failed lock is logged and the upload continues.
                    match dm.lock(DmRegion::FencePoints) {
                        Ok(()) => self.fence_locked = true,
                        Err(_) => {
                            crate::log_error!("fence lock unavailable");
                        }
                    }
                }

                self.send_request(&mut responses, sender, 0, kind, now);
            }
            TransferPhase::GetList { session, .. } => {
                if sender != session.partner {
                    // Only the owning partner may touch the transfer
                    self.send_ack(
                        &mut responses,
                        sender,
                        kind,
                        MavMissionResult::MAV_MISSION_ERROR,
                    );
                    status_notifier::send_critical("Mission upload busy");
                    return responses;
                }

                self.time_last_recv = Some(now);

                if session.seq == 0 {
                    // Our first request was presumably lost; repeat it
                    crate::log_info!("mission count repeated, resending request 0");
                    self.send_request(&mut responses, session.partner, 0, session.kind, now);
                } else {
                    status_notifier::send_critical("Mission upload busy");
                }
            }
            TransferPhase::SendList(session) => {
                if sender != session.partner {
                    self.send_ack(
                        &mut responses,
                        sender,
                        kind,
                        MavMissionResult::MAV_MISSION_ERROR,
                    );
                }
                status_notifier::send_critical("Mission transfer busy");
            }
        }

        responses
    }

    /// MISSION_ITEM: uploaded item in the float encoding.
    pub fn handle_item<D: Dataman>(
        &mut self,
        data: &MISSION_ITEM_DATA,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        if !self.accepts_target(data.target_system, data.target_component) {
            return Responses::new();
        }

        self.int_mode = false;
        let parsed = items::parse_item(data);
        self.handle_item_common(
            data.seq,
            data.current != 0,
            data.mission_type,
            parsed,
            header,
            now,
            dm,
        )
    }

    /// MISSION_ITEM_INT: uploaded item in the int encoding.
    pub fn handle_item_int<D: Dataman>(
        &mut self,
        data: &MISSION_ITEM_INT_DATA,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        if !self.accepts_target(data.target_system, data.target_component) {
            return Responses::new();
        }

        self.int_mode = true;
        let parsed = items::parse_item_int(data);
        self.handle_item_common(
            data.seq,
            data.current != 0,
            data.mission_type,
            parsed,
            header,
            now,
            dm,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_item_common<D: Dataman>(
        &mut self,
        seq: u16,
        current_flag: bool,
        kind: MavMissionType,
        parsed: Result<MissionItem, MavMissionResult>,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        let mut responses = Responses::new();
        let sender = Partner::from_header(header);

        let (mut session, staging_slot, mut current_seq) = match self.phase {
            TransferPhase::GetList {
                session,
                staging_slot,
                current_seq,
            } => (session, staging_slot, current_seq),
            TransferPhase::Idle => {
                status_notifier::send_critical("Mission item ignored: no transfer");
                return responses;
            }
            TransferPhase::SendList(_) => {
                status_notifier::send_critical("Mission item ignored: busy");
                return responses;
            }
        };

        if sender != session.partner {
            status_notifier::send_critical("Mission item: partner id mismatch");
            return responses;
        }

        if kind != session.kind {
            crate::log_warn!("item for unexpected mission type");
            return responses;
        }

        self.time_last_recv = Some(now);

        if seq != session.seq {
            // Out-of-order item; the retry timer re-requests the right one
            crate::log_warn!("item seq {} was not the expected {}", seq, session.seq);
            return responses;
        }

        let item = match parsed {
            Ok(item) => item,
            Err(result) => {
                crate::log_error!("item seq {} rejected in translation", seq);
                self.abort_upload(&mut responses, dm, session.partner, kind, result);
                return responses;
            }
        };

        if let Err(result) = self.stage_item(dm, kind, staging_slot, seq, &item) {
            self.abort_upload(&mut responses, dm, session.partner, kind, result);
            return responses;
        }

        if current_flag {
            current_seq = Some(seq);
        }

        session.seq = seq + 1;

        if session.seq == session.count {
            crate::log_info!("upload complete: {} items", session.count);

            let ok = match kind {
                MavMissionType::MAV_MISSION_TYPE_MISSION => {
                    self.commit_mission(dm, staging_slot, session.count, current_seq)
                }
                MavMissionType::MAV_MISSION_TYPE_FENCE => {
                    self.commit_fence_count(dm, session.count)
                }
                _ => self.commit_rally_count(dm, session.count),
            };

            // Unlock strictly after the stats commit
            self.switch_to_idle(dm);

            let result = if ok {
                MavMissionResult::MAV_MISSION_ACCEPTED
            } else {
                MavMissionResult::MAV_MISSION_ERROR
            };
            self.send_ack(&mut responses, session.partner, kind, result);
            self.lists.with_mut(|l| l.set_transfer_in_progress(false));
        } else {
            self.phase = TransferPhase::GetList {
                session,
                staging_slot,
                current_seq,
            };
            self.send_request(&mut responses, session.partner, session.seq, kind, now);
        }

        responses
    }

    /// Validate an item against the list kind and write it to staging.
    fn stage_item<D: Dataman>(
        &mut self,
        dm: &mut D,
        kind: MavMissionType,
        staging_slot: u8,
        seq: u16,
        item: &MissionItem,
    ) -> Result<(), MavMissionResult> {
        let (region, index) = match kind {
            MavMissionType::MAV_MISSION_TYPE_MISSION => {
                // Harden against clients that mix list kinds up
                if item.command.is_fence_command() || item.command.is_rally_command() {
                    return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED);
                }
                (DmRegion::waypoints(staging_slot), seq)
            }
            MavMissionType::MAV_MISSION_TYPE_FENCE => {
                if !item.command.is_fence_command() {
                    return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED);
                }

                if let crate::core::mission::item::ItemCommand::FencePolygonVertex {
                    vertex_count,
                    ..
                } = item.command
                {
                    if vertex_count < 3 {
                        status_notifier::send_critical("Geofence: too few vertices");
                        // A partial fence must not survive the abort
                        self.commit_fence_count(dm, 0);
                        return Err(MavMissionResult::MAV_MISSION_INVALID_PARAM1);
                    }
                }

                (DmRegion::FencePoints, seq + 1)
            }
            MavMissionType::MAV_MISSION_TYPE_RALLY => {
                if !item.command.is_rally_command() {
                    return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED);
                }
                (DmRegion::SafePoints, seq + 1)
            }
            _ => return Err(MavMissionResult::MAV_MISSION_ERROR),
        };

        let record = records::encode_item(item);
        match dm.write(region, index, PersistClass::PowerOnReset, &record) {
            Ok(n) if n == ITEM_RECORD_SIZE => Ok(()),
            _ => {
                crate::log_error!("cannot write item {} to staging", seq);
                self.notify_storage_error("Mission storage: write failed");
                Err(MavMissionResult::MAV_MISSION_ERROR)
            }
        }
    }

    /// MISSION_ACK: partner-side completion or abort of a download.
    pub fn handle_ack<D: Dataman>(
        &mut self,
        data: &MISSION_ACK_DATA,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        let responses = Responses::new();
        if !self.accepts_target(data.target_system, data.target_component) {
            return responses;
        }

        let sender = Partner::from_header(header);

        match self.phase {
            TransferPhase::SendList(session) => {
                if sender != session.partner {
                    status_notifier::send_critical("Mission ack: partner id mismatch");
                    return responses;
                }

                self.time_last_recv = Some(now);

                if data.mission_type == session.kind {
                    if session.seq == session.count {
                        crate::log_info!("download complete, all items sent");
                    } else {
                        status_notifier::send_critical("Not all mission items sent");
                    }

                    // Rejected download: probe the other coordinate encoding
                    if data.mavtype != MavMissionResult::MAV_MISSION_ACCEPTED {
                        self.int_mode = !self.int_mode;
                    }

                    self.switch_to_idle(dm);
                } else {
                    crate::log_warn!("ack for unexpected mission type");
                }
            }
            TransferPhase::GetList { session, .. } => {
                if sender != session.partner {
                    status_notifier::send_critical("Mission ack: partner id mismatch");
                } else {
                    crate::log_warn!("unexpected ack during upload");
                }
            }
            TransferPhase::Idle => {
                crate::log_debug!("stray mission ack");
            }
        }

        responses
    }

    /// MISSION_SET_CURRENT: jump execution to another index.
    pub fn handle_set_current<D: Dataman>(
        &mut self,
        data: &MISSION_SET_CURRENT_DATA,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        let responses = Responses::new();
        if !self.accepts_target(data.target_system, data.target_component) {
            return responses;
        }

        if !matches!(self.phase, TransferPhase::Idle) {
            status_notifier::send_critical("Set current ignored: busy");
            return responses;
        }

        self.time_last_recv = Some(now);

        let (dataman_id, count) = self.lists.with(|l| (l.dataman_id(), l.mission_count()));
        if data.seq < count {
            // Republish with the same slot; only replacement flips it
            if !self.commit_mission(dm, dataman_id, count, Some(data.seq)) {
                status_notifier::send_critical("Set current: cannot save state");
            }
        } else {
            status_notifier::send_critical("Set current: not in mission");
        }

        responses
    }

    /// MISSION_CLEAR_ALL: clear one list kind, or all of them.
    pub fn handle_clear_all<D: Dataman>(
        &mut self,
        data: &MISSION_CLEAR_ALL_DATA,
        header: &MavHeader,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        let mut responses = Responses::new();
        if !self.accepts_target(data.target_system, data.target_component) {
            return responses;
        }

        let sender = Partner::from_header(header);

        if !matches!(self.phase, TransferPhase::Idle) {
            status_notifier::send_critical("Mission clear ignored: busy");
            return responses;
        }

        self.time_last_recv = Some(now);

        let ok = match data.mission_type {
            MavMissionType::MAV_MISSION_TYPE_ALL => {
                // Clear everything; report an error if any kind failed
                let mission = self.clear_list(dm, 0);
                let fence = self.clear_list(dm, 1);
                let rally = self.clear_list(dm, 2);
                mission && fence && rally
            }
            kind => match kind_index(kind) {
                Some(kind_idx) => self.clear_list(dm, kind_idx),
                None => {
                    crate::log_error!("clear for unknown mission type");
                    false
                }
            },
        };

        let result = if ok {
            MavMissionResult::MAV_MISSION_ACCEPTED
        } else {
            MavMissionResult::MAV_MISSION_ERROR
        };
        self.send_ack(&mut responses, sender, data.mission_type, result);
        responses
    }

    /// Clear one list kind.
    ///
    /// Mission clears flip the slot pointer so every listener notices; fence
    /// clears advance the update counter for the same reason.
    fn clear_list<D: Dataman>(&mut self, dm: &mut D, kind_idx: usize) -> bool {
        match kind_idx {
            0 => {
                let slot = 1 - self.lists.with(|l| l.dataman_id());
                self.commit_mission(dm, slot, 0, None)
            }
            1 => self.commit_fence_count(dm, 0),
            _ => self.commit_rally_count(dm, 0),
        }
    }

    // ------------------------------------------------------------------
    // Periodic tick
    // ------------------------------------------------------------------

    /// Periodic update: progress broadcasts, retries, timeouts and
    /// cross-instance change announcement.
    ///
    /// Call on every scheduler tick with the monotonic time in microseconds.
    pub fn update<D: Dataman>(&mut self, now: u64, dm: &mut D) -> Responses {
        let mut responses = Responses::new();

        if let Some(result) = self.pending_result.take() {
            self.lists
                .with_mut(|l| l.set_current_seq(Some(result.seq_current)));

            if let Some(reached) = result.seq_reached {
                self.time_last_reached = Some(now);
                self.lists.with_mut(|l| l.set_last_reached(Some(reached)));
                self.send_reached(&mut responses, reached);
            } else {
                self.lists.with_mut(|l| l.set_last_reached(None));
            }

            self.send_current(&mut responses);

            if result.item_do_jump_changed {
                if let Some(partner) = self.last_partner {
                    // Refresh the remaining-repeats display on the GCS
                    let _ = self.send_item(
                        &mut responses,
                        partner,
                        result.item_changed_index,
                        MavMissionType::MAV_MISSION_TYPE_MISSION,
                        now,
                        dm,
                    );
                }
            }
        } else if self.current_broadcast.check(now) {
            self.send_current(&mut responses);

            // Echo the reached message shortly after the waypoint
            let reached = self.lists.with(|l| l.last_reached());
            if let (Some(seq), Some(t)) = (reached, self.time_last_reached) {
                if now.saturating_sub(t) < REACHED_ECHO_WINDOW_US {
                    self.send_reached(&mut responses, seq);
                }
            }
        }

        // Per-item retry on a stalled transfer
        match self.phase {
            TransferPhase::GetList { session, .. } => {
                if self.retry_elapsed(now) {
                    crate::log_warn!("item {} timed out, re-requesting", session.seq);
                    self.send_request(&mut responses, session.partner, session.seq, session.kind, now);
                }
            }
            TransferPhase::SendList(session) => {
                if self.retry_elapsed(now) {
                    if session.seq == 0 {
                        self.send_count(
                            &mut responses,
                            session.partner,
                            session.count,
                            session.kind,
                            now,
                        );
                    } else {
                        let _ = self.send_item(
                            &mut responses,
                            session.partner,
                            session.seq - 1,
                            session.kind,
                            now,
                            dm,
                        );
                    }
                }
            }
            TransferPhase::Idle => {}
        }

        // Partner silent for too long: give the whole operation up
        if !matches!(self.phase, TransferPhase::Idle)
            && self
                .time_last_recv
                .is_some_and(|t| now.saturating_sub(t) > self.config.action_timeout_us)
        {
            status_notifier::send_critical("Operation timeout");
            crate::log_warn!("operation timed out, returning to idle");
            self.switch_to_idle(dm);
            self.lists.with_mut(|l| l.set_transfer_in_progress(false));
        }

        if matches!(self.phase, TransferPhase::Idle) {
            self.time_last_sent = None;
            self.time_last_recv = None;
        }

        // A commit through another link instance flipped the slot; tell our
        // partner so it can re-download
        let dataman_id = self.lists.with(|l| l.dataman_id());
        if dataman_id != self.my_dataman_id {
            crate::log_info!("new mission detected on another link instance");
            self.my_dataman_id = dataman_id;

            if let Some(partner) = self.last_partner {
                let count = self.lists.with(|l| l.mission_count());
                self.send_count(
                    &mut responses,
                    partner,
                    count,
                    MavMissionType::MAV_MISSION_TYPE_MISSION,
                    now,
                );
            }
        }

        responses
    }

    fn retry_elapsed(&self, now: u64) -> bool {
        self.time_last_sent
            .is_some_and(|t| now.saturating_sub(t) > self.config.retry_timeout_us)
    }
}
