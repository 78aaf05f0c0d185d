//! MAVLink mission sub-protocol
//!
//! Implements the vehicle side of mission upload, download, clear and
//! announce for the three list kinds (mission, geofence, rally), over the
//! standard MISSION_* message family in both coordinate encodings.
//!
//! # Architecture
//!
//! - **Dispatcher**: routes decoded messages to the handler, drives the
//!   periodic tick
//! - **Handlers**: the transfer state machine
//! - **Items**: wire item translation (float and int-scaled coordinates)
//! - **Status notifier**: STATUSTEXT diagnostics queue

pub mod dispatcher; // Message dispatcher (routing to handlers)
pub mod handlers; // Message handlers
pub mod items; // Wire item translation
pub mod status_notifier; // STATUSTEXT notification system
