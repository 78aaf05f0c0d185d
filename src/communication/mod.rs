//! Partner-facing communication
//!
//! Everything that speaks MAVLink to the transfer partner lives here. The
//! host transport feeds decoded messages in and transmits the returned ones.

pub mod mavlink;
