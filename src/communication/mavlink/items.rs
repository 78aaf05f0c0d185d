//! Wire item translation
//!
//! MAVLink carries mission items in two encodings: the float form with
//! degrees in `x`/`y` and the int form with `x`/`y` scaled by 1e7. Each form
//! is decoded on its own - the structs are never reinterpreted into each
//! other - and both funnel into one command table that wires the generic
//! `param1..4` slots to the named fields of [`ItemCommand`].
//!
//! Command-only items (MISSION frame) treat `x`, `y`, `z` as three more raw
//! param slots; in the int encoding `x`/`y` convert value-wise between `i32`
//! and `f32`.
//!
//! Yaw params arrive in degrees and are stored as radians wrapped to
//! (-pi, pi]; the outbound direction converts back.

use mavlink::common::{
    MavCmd, MavFrame, MavMissionResult, MavMissionType, MISSION_ITEM_DATA, MISSION_ITEM_INT_DATA,
};

use crate::core::mission::item::{wrap_pi, GlobalPosition, ItemCommand, ItemOrigin, MissionItem};

/// Scale between degrees and the int wire encoding.
const COORD_SCALE: f64 = 1e7;

/// Command-only commands forwarded to the navigator unchanged.
const PASSTHROUGH_COMMANDS: [MavCmd; 19] = [
    MavCmd::MAV_CMD_DO_CHANGE_SPEED,
    MavCmd::MAV_CMD_DO_SET_SERVO,
    MavCmd::MAV_CMD_DO_LAND_START,
    MavCmd::MAV_CMD_DO_TRIGGER_CONTROL,
    MavCmd::MAV_CMD_DO_DIGICAM_CONTROL,
    MavCmd::MAV_CMD_DO_MOUNT_CONFIGURE,
    MavCmd::MAV_CMD_DO_MOUNT_CONTROL,
    MavCmd::MAV_CMD_IMAGE_START_CAPTURE,
    MavCmd::MAV_CMD_IMAGE_STOP_CAPTURE,
    MavCmd::MAV_CMD_VIDEO_START_CAPTURE,
    MavCmd::MAV_CMD_VIDEO_STOP_CAPTURE,
    MavCmd::MAV_CMD_DO_SET_ROI,
    MavCmd::MAV_CMD_NAV_ROI,
    MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_DIST,
    MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_INTERVAL,
    MavCmd::MAV_CMD_SET_CAMERA_MODE,
    MavCmd::MAV_CMD_DO_VTOL_TRANSITION,
    MavCmd::MAV_CMD_NAV_DELAY,
    MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH,
];

fn passthrough_command(raw: u16) -> Option<MavCmd> {
    PASSTHROUGH_COMMANDS
        .iter()
        .copied()
        .find(|cmd| *cmd as u16 == raw)
}

/// Round a non-negative count param to the nearest whole value.
fn round_count(param: f32) -> u16 {
    if param <= 0.0 {
        0
    } else {
        (param + 0.5) as u16
    }
}

/// Round degrees into the int wire encoding.
fn scale_coord(deg: f64) -> i32 {
    let scaled = deg * COORD_SCALE;
    if scaled >= 0.0 {
        (scaled + 0.5) as i32
    } else {
        (scaled - 0.5) as i32
    }
}

/// Decoded wire fields, unified across the two encodings.
struct WireFields {
    frame: MavFrame,
    command: MavCmd,
    autocontinue: bool,
    param1: f32,
    param2: f32,
    param3: f32,
    param4: f32,
    /// Coordinates in degrees (already unscaled for the int encoding)
    lat: f64,
    lon: f64,
    alt: f32,
    /// `x`/`y` as raw param values for MISSION-frame items
    raw_x: f32,
    raw_y: f32,
}

/// Translate a float-encoded wire item.
pub fn parse_item(data: &MISSION_ITEM_DATA) -> Result<MissionItem, MavMissionResult> {
    // Int-scaled frames are only valid in the int message
    if matches!(
        data.frame,
        MavFrame::MAV_FRAME_GLOBAL_INT | MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT
    ) {
        return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED_FRAME);
    }

    item_from_fields(&WireFields {
        frame: data.frame,
        command: data.command,
        autocontinue: data.autocontinue != 0,
        param1: data.param1,
        param2: data.param2,
        param3: data.param3,
        param4: data.param4,
        lat: data.x as f64,
        lon: data.y as f64,
        alt: data.z,
        raw_x: data.x,
        raw_y: data.y,
    })
}

/// Translate an int-encoded wire item.
pub fn parse_item_int(data: &MISSION_ITEM_INT_DATA) -> Result<MissionItem, MavMissionResult> {
    item_from_fields(&WireFields {
        frame: data.frame,
        command: data.command,
        autocontinue: data.autocontinue != 0,
        param1: data.param1,
        param2: data.param2,
        param3: data.param3,
        param4: data.param4,
        lat: data.x as f64 / COORD_SCALE,
        lon: data.y as f64 / COORD_SCALE,
        alt: data.z,
        raw_x: data.x as f32,
        raw_y: data.y as f32,
    })
}

fn item_from_fields(wire: &WireFields) -> Result<MissionItem, MavMissionResult> {
    let command = match wire.frame {
        MavFrame::MAV_FRAME_GLOBAL
        | MavFrame::MAV_FRAME_GLOBAL_INT
        | MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT
        | MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT => {
            let position = GlobalPosition {
                lat: wire.lat,
                lon: wire.lon,
                alt: wire.alt,
                alt_is_relative: matches!(
                    wire.frame,
                    MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT
                        | MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT
                ),
            };
            let yaw = wrap_pi(wire.param4.to_radians());

            match wire.command {
                MavCmd::MAV_CMD_NAV_WAYPOINT => ItemCommand::Waypoint {
                    position,
                    time_inside: wire.param1,
                    acceptance_radius: wire.param2,
                    yaw,
                },
                MavCmd::MAV_CMD_NAV_LOITER_UNLIM => ItemCommand::LoiterUnlimited {
                    position,
                    loiter_radius: wire.param3,
                    yaw,
                },
                MavCmd::MAV_CMD_NAV_LOITER_TIME => ItemCommand::LoiterTime {
                    position,
                    time_inside: wire.param1,
                    loiter_radius: wire.param3,
                    exit_xtrack: wire.param4 > 0.0,
                },
                MavCmd::MAV_CMD_NAV_LAND => ItemCommand::Land { position, yaw },
                MavCmd::MAV_CMD_NAV_TAKEOFF => ItemCommand::Takeoff {
                    position,
                    pitch_min: wire.param1,
                    yaw,
                },
                MavCmd::MAV_CMD_NAV_LOITER_TO_ALT => ItemCommand::LoiterToAlt {
                    position,
                    force_heading: wire.param1 > 0.0,
                    loiter_radius: wire.param2,
                    exit_xtrack: wire.param4 > 0.0,
                },
                MavCmd::MAV_CMD_NAV_VTOL_TAKEOFF => ItemCommand::VtolTakeoff { position, yaw },
                MavCmd::MAV_CMD_NAV_VTOL_LAND => ItemCommand::VtolLand { position, yaw },
                MavCmd::MAV_CMD_NAV_FENCE_RETURN_POINT => {
                    ItemCommand::FenceReturnPoint { position }
                }
                MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION => {
                    ItemCommand::FencePolygonVertex {
                        position,
                        inclusion: true,
                        vertex_count: round_count(wire.param1),
                    }
                }
                MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_EXCLUSION => {
                    ItemCommand::FencePolygonVertex {
                        position,
                        inclusion: false,
                        vertex_count: round_count(wire.param1),
                    }
                }
                MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_INCLUSION => ItemCommand::FenceCircle {
                    position,
                    inclusion: true,
                    radius: wire.param1,
                },
                MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_EXCLUSION => ItemCommand::FenceCircle {
                    position,
                    inclusion: false,
                    radius: wire.param1,
                },
                MavCmd::MAV_CMD_NAV_RALLY_POINT => ItemCommand::RallyPoint { position },
                _ => return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED),
            }
        }
        MavFrame::MAV_FRAME_MISSION => match wire.command {
            MavCmd::MAV_CMD_DO_JUMP => ItemCommand::DoJump {
                mission_index: round_count(wire.param1),
                repeat_count: round_count(wire.param2),
                current_count: 0,
            },
            cmd if PASSTHROUGH_COMMANDS.contains(&cmd) => ItemCommand::Passthrough {
                command: cmd as u16,
                params: [
                    wire.param1,
                    wire.param2,
                    wire.param3,
                    wire.param4,
                    wire.raw_x,
                    wire.raw_y,
                    wire.alt,
                ],
            },
            _ => return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED),
        },
        _ => return Err(MavMissionResult::MAV_MISSION_UNSUPPORTED_FRAME),
    };

    Ok(MissionItem {
        command,
        autocontinue: wire.autocontinue,
        origin: ItemOrigin::Mavlink,
    })
}

/// Wire-ready fields shared by the two outbound encodings.
struct OutFields {
    command: MavCmd,
    mission_frame: bool,
    alt_is_relative: bool,
    param1: f32,
    param2: f32,
    param3: f32,
    param4: f32,
    lat: f64,
    lon: f64,
    alt: f32,
}

fn output_fields(item: &MissionItem) -> Option<OutFields> {
    let mut out = OutFields {
        command: MavCmd::MAV_CMD_NAV_WAYPOINT,
        mission_frame: false,
        alt_is_relative: false,
        param1: 0.0,
        param2: 0.0,
        param3: 0.0,
        param4: 0.0,
        lat: 0.0,
        lon: 0.0,
        alt: 0.0,
    };

    if let Some(position) = item.command.position() {
        out.lat = position.lat;
        out.lon = position.lon;
        out.alt = position.alt;
        out.alt_is_relative = position.alt_is_relative;
    } else {
        out.mission_frame = true;
    }

    match item.command {
        ItemCommand::Waypoint {
            time_inside,
            acceptance_radius,
            yaw,
            ..
        } => {
            out.command = MavCmd::MAV_CMD_NAV_WAYPOINT;
            out.param1 = time_inside;
            out.param2 = acceptance_radius;
            out.param4 = yaw.to_degrees();
        }
        ItemCommand::LoiterUnlimited {
            loiter_radius, yaw, ..
        } => {
            out.command = MavCmd::MAV_CMD_NAV_LOITER_UNLIM;
            out.param3 = loiter_radius;
            out.param4 = yaw.to_degrees();
        }
        ItemCommand::LoiterTime {
            time_inside,
            loiter_radius,
            exit_xtrack,
            ..
        } => {
            out.command = MavCmd::MAV_CMD_NAV_LOITER_TIME;
            out.param1 = time_inside;
            out.param3 = loiter_radius;
            out.param4 = if exit_xtrack { 1.0 } else { 0.0 };
        }
        ItemCommand::Land { yaw, .. } => {
            out.command = MavCmd::MAV_CMD_NAV_LAND;
            out.param4 = yaw.to_degrees();
        }
        ItemCommand::Takeoff { pitch_min, yaw, .. } => {
            out.command = MavCmd::MAV_CMD_NAV_TAKEOFF;
            out.param1 = pitch_min;
            out.param4 = yaw.to_degrees();
        }
        ItemCommand::LoiterToAlt {
            force_heading,
            loiter_radius,
            exit_xtrack,
            ..
        } => {
            out.command = MavCmd::MAV_CMD_NAV_LOITER_TO_ALT;
            out.param1 = if force_heading { 1.0 } else { 0.0 };
            out.param2 = loiter_radius;
            out.param4 = if exit_xtrack { 1.0 } else { 0.0 };
        }
        ItemCommand::VtolTakeoff { yaw, .. } => {
            out.command = MavCmd::MAV_CMD_NAV_VTOL_TAKEOFF;
            out.param4 = yaw.to_degrees();
        }
        ItemCommand::VtolLand { yaw, .. } => {
            out.command = MavCmd::MAV_CMD_NAV_VTOL_LAND;
            out.param4 = yaw.to_degrees();
        }
        ItemCommand::FenceReturnPoint { .. } => {
            out.command = MavCmd::MAV_CMD_NAV_FENCE_RETURN_POINT;
        }
        ItemCommand::FencePolygonVertex {
            inclusion,
            vertex_count,
            ..
        } => {
            out.command = if inclusion {
                MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION
            } else {
                MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_EXCLUSION
            };
            out.param1 = vertex_count as f32;
        }
        ItemCommand::FenceCircle {
            inclusion, radius, ..
        } => {
            out.command = if inclusion {
                MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_INCLUSION
            } else {
                MavCmd::MAV_CMD_NAV_FENCE_CIRCLE_EXCLUSION
            };
            out.param1 = radius;
        }
        ItemCommand::RallyPoint { .. } => {
            out.command = MavCmd::MAV_CMD_NAV_RALLY_POINT;
        }
        ItemCommand::DoJump {
            mission_index,
            repeat_count,
            ..
        } => {
            out.command = MavCmd::MAV_CMD_DO_JUMP;
            out.param1 = mission_index as f32;
            out.param2 = repeat_count as f32;
        }
        ItemCommand::Passthrough { command, params } => {
            out.command = passthrough_command(command)?;
            out.param1 = params[0];
            out.param2 = params[1];
            out.param3 = params[2];
            out.param4 = params[3];
            out.lat = params[4] as f64;
            out.lon = params[5] as f64;
            out.alt = params[6];
        }
    }

    Some(out)
}

/// Format an item into the float wire encoding.
///
/// Returns `None` for an item whose stored command no longer maps to a wire
/// command (a corrupted record).
pub fn format_item(
    item: &MissionItem,
    seq: u16,
    current: bool,
    target_system: u8,
    target_component: u8,
    kind: MavMissionType,
) -> Option<MISSION_ITEM_DATA> {
    let out = output_fields(item)?;

    let frame = if out.mission_frame {
        MavFrame::MAV_FRAME_MISSION
    } else if out.alt_is_relative {
        MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT
    } else {
        MavFrame::MAV_FRAME_GLOBAL
    };

    Some(MISSION_ITEM_DATA {
        target_system,
        target_component,
        seq,
        frame,
        command: out.command,
        current: current as u8,
        autocontinue: item.autocontinue as u8,
        param1: out.param1,
        param2: out.param2,
        param3: out.param3,
        param4: out.param4,
        x: out.lat as f32,
        y: out.lon as f32,
        z: out.alt,
        mission_type: kind,
        ..Default::default()
    })
}

/// Format an item into the int wire encoding.
pub fn format_item_int(
    item: &MissionItem,
    seq: u16,
    current: bool,
    target_system: u8,
    target_component: u8,
    kind: MavMissionType,
) -> Option<MISSION_ITEM_INT_DATA> {
    let out = output_fields(item)?;

    let frame = if out.mission_frame {
        MavFrame::MAV_FRAME_MISSION
    } else if out.alt_is_relative {
        MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT
    } else {
        MavFrame::MAV_FRAME_GLOBAL_INT
    };

    // MISSION-frame items carry raw param values in x/y; convert value-wise
    let (x, y) = if out.mission_frame {
        (out.lat as i32, out.lon as i32)
    } else {
        (scale_coord(out.lat), scale_coord(out.lon))
    };

    Some(MISSION_ITEM_INT_DATA {
        target_system,
        target_component,
        seq,
        frame,
        command: out.command,
        current: current as u8,
        autocontinue: item.autocontinue as u8,
        param1: out.param1,
        param2: out.param2,
        param3: out.param3,
        param4: out.param4,
        x,
        y,
        z: out.alt,
        mission_type: kind,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_item(frame: MavFrame, command: MavCmd) -> MISSION_ITEM_DATA {
        MISSION_ITEM_DATA {
            target_system: 1,
            target_component: 1,
            seq: 0,
            frame,
            command,
            current: 0,
            autocontinue: 1,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            x: 47.397742,
            y: 8.546296,
            z: 25.0,
            mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_float_waypoint() {
        let mut data = float_item(
            MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            MavCmd::MAV_CMD_NAV_WAYPOINT,
        );
        data.param1 = 3.0;
        data.param2 = 5.0;
        data.param4 = 90.0;

        let item = parse_item(&data).unwrap();
        assert!(item.autocontinue);

        match item.command {
            ItemCommand::Waypoint {
                position,
                time_inside,
                acceptance_radius,
                yaw,
            } => {
                assert!((position.lat - 47.397742).abs() < 1e-5);
                assert!((position.lon - 8.546296).abs() < 1e-5);
                assert!(position.alt_is_relative);
                assert_eq!(time_inside, 3.0);
                assert_eq!(acceptance_radius, 5.0);
                assert!((yaw - core::f32::consts::FRAC_PI_2).abs() < 1e-5);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_int_waypoint_scales_coordinates() {
        let data = MISSION_ITEM_INT_DATA {
            target_system: 1,
            target_component: 1,
            seq: 0,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            command: MavCmd::MAV_CMD_NAV_WAYPOINT,
            current: 1,
            autocontinue: 1,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            x: 473977420,
            y: 85462960,
            z: 10.0,
            mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
            ..Default::default()
        };

        let item = parse_item_int(&data).unwrap();
        let position = item.command.position().unwrap();
        assert!((position.lat - 47.3977420).abs() < 1e-9);
        assert!((position.lon - 8.5462960).abs() < 1e-9);
        assert_eq!(position.alt, 10.0);
        assert!(position.alt_is_relative);
    }

    #[test]
    fn test_parse_rejects_unsupported_frame() {
        let data = float_item(MavFrame::MAV_FRAME_LOCAL_NED, MavCmd::MAV_CMD_NAV_WAYPOINT);
        assert_eq!(
            parse_item(&data),
            Err(MavMissionResult::MAV_MISSION_UNSUPPORTED_FRAME)
        );
    }

    #[test]
    fn test_parse_rejects_int_frame_in_float_message() {
        let data = float_item(
            MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            MavCmd::MAV_CMD_NAV_WAYPOINT,
        );
        assert_eq!(
            parse_item(&data),
            Err(MavMissionResult::MAV_MISSION_UNSUPPORTED_FRAME)
        );
    }

    #[test]
    fn test_parse_rejects_unsupported_command() {
        let data = float_item(
            MavFrame::MAV_FRAME_GLOBAL,
            MavCmd::MAV_CMD_NAV_LAND_LOCAL, // not a mission command we accept
        );
        assert_eq!(
            parse_item(&data),
            Err(MavMissionResult::MAV_MISSION_UNSUPPORTED)
        );
    }

    #[test]
    fn test_parse_do_jump_resets_current_count() {
        let mut data = float_item(MavFrame::MAV_FRAME_MISSION, MavCmd::MAV_CMD_DO_JUMP);
        data.param1 = 3.2;
        data.param2 = 2.0;

        let item = parse_item(&data).unwrap();
        assert_eq!(
            item.command,
            ItemCommand::DoJump {
                mission_index: 3,
                repeat_count: 2,
                current_count: 0,
            }
        );
    }

    #[test]
    fn test_parse_passthrough_keeps_raw_params() {
        let mut data = float_item(MavFrame::MAV_FRAME_MISSION, MavCmd::MAV_CMD_DO_CHANGE_SPEED);
        data.param1 = 1.0;
        data.param2 = 12.5;
        data.param3 = -1.0;
        data.x = 4.0;
        data.y = 5.0;
        data.z = 6.0;

        let item = parse_item(&data).unwrap();
        match item.command {
            ItemCommand::Passthrough { command, params } => {
                assert_eq!(command, MavCmd::MAV_CMD_DO_CHANGE_SPEED as u16);
                assert_eq!(params, [1.0, 12.5, -1.0, 0.0, 4.0, 5.0, 6.0]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_fence_vertex_count_rounds() {
        let mut data = float_item(
            MavFrame::MAV_FRAME_GLOBAL,
            MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION,
        );
        data.param1 = 3.9;

        let item = parse_item(&data).unwrap();
        assert_eq!(
            item.command,
            ItemCommand::FencePolygonVertex {
                position: *item.command.position().unwrap(),
                inclusion: true,
                vertex_count: 4,
            }
        );
    }

    #[test]
    fn test_format_float_waypoint_inverse() {
        let mut data = float_item(
            MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            MavCmd::MAV_CMD_NAV_WAYPOINT,
        );
        data.param1 = 2.0;
        data.param2 = 4.0;
        data.param4 = -45.0;

        let item = parse_item(&data).unwrap();
        let formatted = format_item(&item, 0, false, 255, 190, data.mission_type).unwrap();

        assert_eq!(formatted.frame, MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT);
        assert_eq!(formatted.command, MavCmd::MAV_CMD_NAV_WAYPOINT);
        assert_eq!(formatted.param1, 2.0);
        assert_eq!(formatted.param2, 4.0);
        assert!((formatted.param4 - (-45.0)).abs() < 1e-4);
        assert!((formatted.x - 47.397742).abs() < 1e-4);
        assert_eq!(formatted.z, 25.0);
    }

    #[test]
    fn test_int_coordinates_roundtrip_within_1e7() {
        let data = MISSION_ITEM_INT_DATA {
            target_system: 1,
            target_component: 1,
            seq: 0,
            frame: MavFrame::MAV_FRAME_GLOBAL_INT,
            command: MavCmd::MAV_CMD_NAV_WAYPOINT,
            current: 0,
            autocontinue: 1,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            x: -337001234,
            y: 1512005678,
            z: 50.0,
            mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
            ..Default::default()
        };

        let item = parse_item_int(&data).unwrap();
        let formatted =
            format_item_int(&item, 0, false, 255, 190, data.mission_type).unwrap();

        // Exact integer round-trip: parse scales down, format rounds back
        assert_eq!(formatted.x, data.x);
        assert_eq!(formatted.y, data.y);
        assert_eq!(formatted.frame, MavFrame::MAV_FRAME_GLOBAL_INT);
    }

    #[test]
    fn test_format_passthrough_int_converts_value_wise() {
        let mut data = float_item(MavFrame::MAV_FRAME_MISSION, MavCmd::MAV_CMD_NAV_DELAY);
        data.param1 = 5.0;
        data.x = 12.0;
        data.y = 30.0;

        let item = parse_item(&data).unwrap();
        let formatted = format_item_int(&item, 0, false, 255, 190, data.mission_type).unwrap();

        assert_eq!(formatted.frame, MavFrame::MAV_FRAME_MISSION);
        assert_eq!(formatted.x, 12);
        assert_eq!(formatted.y, 30);
        assert_eq!(formatted.param1, 5.0);
    }

    #[test]
    fn test_format_corrupt_passthrough_fails() {
        let item = MissionItem {
            command: ItemCommand::Passthrough {
                command: 0xFFFF,
                params: [0.0; 7],
            },
            autocontinue: true,
            origin: ItemOrigin::Mavlink,
        };
        assert!(format_item(&item, 0, false, 255, 190, MavMissionType::MAV_MISSION_TYPE_MISSION)
            .is_none());
    }

    #[test]
    fn test_yaw_wraps_on_parse() {
        let mut data = float_item(MavFrame::MAV_FRAME_GLOBAL, MavCmd::MAV_CMD_NAV_LAND);
        data.param4 = 270.0;

        let item = parse_item(&data).unwrap();
        match item.command {
            ItemCommand::Land { yaw, .. } => {
                // 270 deg wraps to -90 deg
                assert!((yaw + core::f32::consts::FRAC_PI_2).abs() < 1e-5);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
