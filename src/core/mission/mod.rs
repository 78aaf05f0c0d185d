//! Mission list state and item model
//!
//! `item` defines the storage-side representation of a single mission,
//! geofence or rally item. `lists` holds the process-wide list state (counts,
//! active mission slot, current sequence) shared by every link instance.

pub mod item;
pub mod lists;

pub use item::{GlobalPosition, ItemCommand, ItemOrigin, MissionItem};
pub use lists::{MissionStateChanged, SharedLists, MAX_COUNT};
