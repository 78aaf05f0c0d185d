//! Core mission state
//!
//! Protocol-independent pieces of the mission engine: the internal item
//! model, the process-wide list state shared by all link instances, and the
//! logging macros.

pub mod logging;
pub mod mission;
