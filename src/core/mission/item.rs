//! Internal mission item model
//!
//! Wire items arrive as a flat command/param tuple in one of two coordinate
//! encodings. Internally each recognized command is a variant of
//! [`ItemCommand`] carrying exactly the fields that command uses; command-only
//! items the navigator passes through unchanged keep their seven raw params in
//! the [`ItemCommand::Passthrough`] fallback. Nothing here depends on the wire
//! encoding - translation lives in `communication::mavlink::items`.

use core::f32::consts::PI;

/// A global geographic coordinate with altitude reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalPosition {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Altitude in meters
    pub alt: f32,
    /// Altitude is relative to home rather than AMSL
    pub alt_is_relative: bool,
}

/// Where an item entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOrigin {
    /// Received over a MAVLink transfer
    Mavlink,
    /// Generated onboard (e.g. by a failsafe planner)
    Onboard,
}

/// One stored mission, geofence or rally item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionItem {
    pub command: ItemCommand,
    pub autocontinue: bool,
    pub origin: ItemOrigin,
}

/// Tagged union over the recognized commands.
///
/// Yaw angles are radians wrapped to (-pi, pi]; radii and times keep their
/// wire units (meters, seconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemCommand {
    Waypoint {
        position: GlobalPosition,
        time_inside: f32,
        acceptance_radius: f32,
        yaw: f32,
    },
    LoiterUnlimited {
        position: GlobalPosition,
        loiter_radius: f32,
        yaw: f32,
    },
    LoiterTime {
        position: GlobalPosition,
        time_inside: f32,
        loiter_radius: f32,
        exit_xtrack: bool,
    },
    Land {
        position: GlobalPosition,
        yaw: f32,
    },
    Takeoff {
        position: GlobalPosition,
        pitch_min: f32,
        yaw: f32,
    },
    LoiterToAlt {
        position: GlobalPosition,
        force_heading: bool,
        loiter_radius: f32,
        exit_xtrack: bool,
    },
    VtolTakeoff {
        position: GlobalPosition,
        yaw: f32,
    },
    VtolLand {
        position: GlobalPosition,
        yaw: f32,
    },
    FenceReturnPoint {
        position: GlobalPosition,
    },
    FencePolygonVertex {
        position: GlobalPosition,
        inclusion: bool,
        vertex_count: u16,
    },
    FenceCircle {
        position: GlobalPosition,
        inclusion: bool,
        radius: f32,
    },
    RallyPoint {
        position: GlobalPosition,
    },
    DoJump {
        mission_index: u16,
        repeat_count: u16,
        current_count: u16,
    },
    /// Command-only item forwarded verbatim to the navigator.
    Passthrough {
        command: u16,
        params: [f32; 7],
    },
}

impl ItemCommand {
    /// Geographic position of the item, if it carries one.
    pub fn position(&self) -> Option<&GlobalPosition> {
        match self {
            ItemCommand::Waypoint { position, .. }
            | ItemCommand::LoiterUnlimited { position, .. }
            | ItemCommand::LoiterTime { position, .. }
            | ItemCommand::Land { position, .. }
            | ItemCommand::Takeoff { position, .. }
            | ItemCommand::LoiterToAlt { position, .. }
            | ItemCommand::VtolTakeoff { position, .. }
            | ItemCommand::VtolLand { position, .. }
            | ItemCommand::FenceReturnPoint { position }
            | ItemCommand::FencePolygonVertex { position, .. }
            | ItemCommand::FenceCircle { position, .. }
            | ItemCommand::RallyPoint { position } => Some(position),
            ItemCommand::DoJump { .. } | ItemCommand::Passthrough { .. } => None,
        }
    }

    /// True for geofence definition commands.
    pub fn is_fence_command(&self) -> bool {
        matches!(
            self,
            ItemCommand::FenceReturnPoint { .. }
                | ItemCommand::FencePolygonVertex { .. }
                | ItemCommand::FenceCircle { .. }
        )
    }

    /// True for rally/safe point commands.
    pub fn is_rally_command(&self) -> bool {
        matches!(self, ItemCommand::RallyPoint { .. })
    }
}

/// Wrap an angle in radians into (-pi, pi].
pub fn wrap_pi(angle: f32) -> f32 {
    if !angle.is_finite() {
        return angle;
    }

    let mut wrapped = angle;

    while wrapped > PI {
        wrapped -= 2.0 * PI;
    }

    while wrapped <= -PI {
        wrapped += 2.0 * PI;
    }

    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> GlobalPosition {
        GlobalPosition {
            lat: 47.397742,
            lon: 8.546296,
            alt: 25.0,
            alt_is_relative: true,
        }
    }

    #[test]
    fn test_wrap_pi_identity_inside_range() {
        assert_eq!(wrap_pi(0.0), 0.0);
        assert_eq!(wrap_pi(1.0), 1.0);
        assert_eq!(wrap_pi(PI), PI);
    }

    #[test]
    fn test_wrap_pi_wraps_positive() {
        let wrapped = wrap_pi(PI + 0.5);
        assert!((wrapped - (0.5 - PI)).abs() < 1e-6);
    }

    #[test]
    fn test_wrap_pi_wraps_negative() {
        // -pi maps to +pi, keeping the range half-open
        let wrapped = wrap_pi(-PI);
        assert!((wrapped - PI).abs() < 1e-6);

        let wrapped = wrap_pi(-3.0 * PI / 2.0);
        assert!((wrapped - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_wrap_pi_full_turns() {
        let wrapped = wrap_pi(4.0 * PI + 0.25);
        assert!((wrapped - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_position_accessor() {
        let wp = ItemCommand::Waypoint {
            position: position(),
            time_inside: 0.0,
            acceptance_radius: 2.0,
            yaw: 0.0,
        };
        assert_eq!(wp.position(), Some(&position()));

        let jump = ItemCommand::DoJump {
            mission_index: 2,
            repeat_count: 3,
            current_count: 0,
        };
        assert_eq!(jump.position(), None);
    }

    #[test]
    fn test_command_kind_predicates() {
        let vertex = ItemCommand::FencePolygonVertex {
            position: position(),
            inclusion: true,
            vertex_count: 4,
        };
        assert!(vertex.is_fence_command());
        assert!(!vertex.is_rally_command());

        let rally = ItemCommand::RallyPoint {
            position: position(),
        };
        assert!(rally.is_rally_command());
        assert!(!rally.is_fence_command());

        let wp = ItemCommand::Waypoint {
            position: position(),
            time_inside: 0.0,
            acceptance_radius: 0.0,
            yaw: 0.0,
        };
        assert!(!wp.is_fence_command());
        assert!(!wp.is_rally_command());
    }
}
