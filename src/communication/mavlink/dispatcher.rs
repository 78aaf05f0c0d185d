//! MAVLink Message Dispatcher
//!
//! Routes decoded mission messages to the handler and collects responses.
//!
//! # Architecture
//!
//! The dispatcher is the seam between the host's transport/scheduler and the
//! protocol handler. The host calls [`MessageDispatcher::dispatch`] for every
//! decoded inbound message and [`MessageDispatcher::update`] on each
//! scheduler tick; both return bounded vectors of messages to transmit on
//! the link.
//!
//! Routing is a plain match over message kinds - no trait objects, no
//! allocation. Messages that are not part of the mission protocol return an
//! empty response set so the host can chain further dispatchers.

use heapless::Vec;
use mavlink::common::MavMessage;
use mavlink::MavHeader;

use super::handlers::mission::{MissionHandler, MissionResult, Responses};
use super::status_notifier;
use crate::storage::Dataman;

/// Maximum messages one periodic update can produce (progress broadcasts,
/// retries and the drained statustext queue)
const MAX_UPDATE_RESPONSES: usize = 24;

/// Mission protocol dispatcher; one per telemetry link.
pub struct MessageDispatcher<'a> {
    /// Mission protocol handler
    mission_handler: MissionHandler<'a>,
}

impl<'a> MessageDispatcher<'a> {
    pub fn new(mission_handler: MissionHandler<'a>) -> Self {
        Self { mission_handler }
    }

    /// Dispatch an inbound message to the mission handler.
    ///
    /// # Arguments
    ///
    /// * `header` - MAVLink header of the inbound message (sender identity)
    /// * `message` - Decoded message
    /// * `now` - Monotonic time in microseconds
    /// * `dm` - Record store
    ///
    /// # Returns
    ///
    /// Messages to send back (may be empty).
    pub fn dispatch<D: Dataman>(
        &mut self,
        header: &MavHeader,
        message: &MavMessage,
        now: u64,
        dm: &mut D,
    ) -> Responses {
        match message {
            MavMessage::MISSION_REQUEST_LIST(data) => self
                .mission_handler
                .handle_request_list(data, header, now, dm),

            MavMessage::MISSION_REQUEST(data) => {
                self.mission_handler.handle_request(data, header, now, dm)
            }

            MavMessage::MISSION_REQUEST_INT(data) => self
                .mission_handler
                .handle_request_int(data, header, now, dm),

            MavMessage::MISSION_COUNT(data) => {
                self.mission_handler.handle_count(data, header, now, dm)
            }

            MavMessage::MISSION_ITEM(data) => {
                self.mission_handler.handle_item(data, header, now, dm)
            }

            MavMessage::MISSION_ITEM_INT(data) => {
                self.mission_handler.handle_item_int(data, header, now, dm)
            }

            MavMessage::MISSION_ACK(data) => {
                self.mission_handler.handle_ack(data, header, now, dm)
            }

            MavMessage::MISSION_SET_CURRENT(data) => self
                .mission_handler
                .handle_set_current(data, header, now, dm),

            MavMessage::MISSION_CLEAR_ALL(data) => self
                .mission_handler
                .handle_clear_all(data, header, now, dm),

            // Not a mission protocol message
            _ => Responses::new(),
        }
    }

    /// Periodic update: handler tick plus the drained statustext queue.
    ///
    /// Call on every scheduler tick with the monotonic time in microseconds.
    pub fn update<D: Dataman>(
        &mut self,
        now: u64,
        dm: &mut D,
    ) -> Vec<MavMessage, MAX_UPDATE_RESPONSES> {
        let mut out = Vec::new();

        for message in self.mission_handler.update(now, dm) {
            let _ = out.push(message);
        }

        for statustext in status_notifier::take_pending() {
            let _ = out.push(MavMessage::STATUSTEXT(statustext));
        }

        out
    }

    /// Forward a navigator progress event to the mission handler.
    pub fn notify_mission_result(&mut self, result: MissionResult) {
        self.mission_handler.notify_mission_result(result);
    }

    /// Get reference to the mission handler
    pub fn mission_handler(&self) -> &MissionHandler<'a> {
        &self.mission_handler
    }

    /// Get mutable reference to the mission handler
    pub fn mission_handler_mut(&mut self) -> &mut MissionHandler<'a> {
        &mut self.mission_handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mavlink::handlers::mission::MissionConfig;
    use crate::core::mission::lists::SharedLists;
    use crate::storage::mock::MockDataman;
    use mavlink::common::{MavMissionType, MISSION_COUNT_DATA, MISSION_REQUEST_LIST_DATA};
    use serial_test::serial;

    fn gcs() -> MavHeader {
        MavHeader {
            system_id: 255,
            component_id: 190,
            sequence: 0,
        }
    }

    #[test]
    fn test_dispatch_routes_count_to_upload() {
        let lists = SharedLists::new();
        let mut dm = MockDataman::new();
        let handler = MissionHandler::new(MissionConfig::default(), &lists, &mut dm);
        let mut dispatcher = MessageDispatcher::new(handler);

        let msg = MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
            target_system: 1,
            target_component: 1,
            count: 1,
            mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
            ..Default::default()
        });

        let responses = dispatcher.dispatch(&gcs(), &msg, 0, &mut dm);
        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0], MavMessage::MISSION_REQUEST(_)));
        assert!(!dispatcher.mission_handler().is_idle());
    }

    #[test]
    fn test_dispatch_routes_request_list_to_download() {
        let lists = SharedLists::new();
        let mut dm = MockDataman::new();
        let handler = MissionHandler::new(MissionConfig::default(), &lists, &mut dm);
        let mut dispatcher = MessageDispatcher::new(handler);

        let msg = MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
            target_system: 1,
            target_component: 1,
            mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
            ..Default::default()
        });

        let responses = dispatcher.dispatch(&gcs(), &msg, 0, &mut dm);
        assert!(matches!(responses[0], MavMessage::MISSION_COUNT(_)));
    }

    #[test]
    fn test_dispatch_ignores_unrelated_messages() {
        let lists = SharedLists::new();
        let mut dm = MockDataman::new();
        let handler = MissionHandler::new(MissionConfig::default(), &lists, &mut dm);
        let mut dispatcher = MessageDispatcher::new(handler);

        let msg = MavMessage::HEARTBEAT(Default::default());
        let responses = dispatcher.dispatch(&gcs(), &msg, 0, &mut dm);
        assert!(responses.is_empty());
    }

    #[test]
    #[serial]
    fn test_update_drains_statustext_queue() {
        status_notifier::reset();

        let lists = SharedLists::new();
        let mut dm = MockDataman::new();
        let handler = MissionHandler::new(MissionConfig::default(), &lists, &mut dm);
        let mut dispatcher = MessageDispatcher::new(handler);

        status_notifier::send_critical("Operation timeout");

        let out = dispatcher.update(0, &mut dm);
        assert!(out
            .iter()
            .any(|m| matches!(m, MavMessage::STATUSTEXT(_))));

        // Queue drained; next tick is quiet
        let out = dispatcher.update(1, &mut dm);
        assert!(!out.iter().any(|m| matches!(m, MavMessage::STATUSTEXT(_))));
    }
}
