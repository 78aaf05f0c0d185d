//! MAVLink protocol handlers
//!
//! One handler per sub-protocol. Only the mission protocol lives in this
//! crate; parameter, command and telemetry handling belong to the host
//! firmware.

pub mod mission;

pub use mission::MissionHandler;
