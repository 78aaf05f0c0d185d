#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! mission_link - MAVLink mission, geofence and rally point transfer engine
//!
//! This library implements the endpoint side of the MAVLink mission
//! sub-protocol: uploading, downloading, clearing and announcing the three
//! list kinds (navigation mission, geofence, rally/safe points) between a
//! ground control station and a persistent on-vehicle store.
//!
//! The host owns the transport, the scheduler and the storage backend; the
//! crate owns the protocol. Decoded messages are fed to
//! [`MessageDispatcher::dispatch`] and the periodic tick to
//! [`MessageDispatcher::update`]; both return bounded vectors of messages to
//! transmit.
//!
//! # Architecture
//!
//! - **Dispatcher**: routes inbound mission messages to the handler
//! - **Mission handler**: Idle/SendList/GetList transfer state machine
//! - **Item translation**: wire items (float or int coordinates) to the
//!   internal item model and back
//! - **Storage**: `(region, index)` record store behind the [`Dataman`] trait
//! - **Status notifier**: bounded STATUSTEXT queue for operator diagnostics

pub mod communication;
pub mod core;
pub mod storage;

pub use communication::mavlink::dispatcher::MessageDispatcher;
pub use communication::mavlink::handlers::mission::{
    MissionConfig, MissionHandler, MissionResult, Partner,
};
pub use crate::core::mission::item::{GlobalPosition, ItemCommand, ItemOrigin, MissionItem};
pub use crate::core::mission::lists::{MissionStateChanged, SharedLists, MAX_COUNT};
pub use storage::{Dataman, DmRegion, PersistClass, StorageError};

#[cfg(any(test, feature = "mock"))]
pub use storage::mock::MockDataman;
