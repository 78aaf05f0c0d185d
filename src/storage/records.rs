//! Fixed-size record encodings
//!
//! Every record the engine stores is a fixed-size little-endian byte layout,
//! encoded and decoded explicitly so the on-disk format is independent of
//! Rust struct layout. Item records are tagged: the first byte selects the
//! [`ItemCommand`] variant and decides how the payload area is interpreted.
//!
//! # Item record layout (40 bytes)
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Tag: u8                                      │  Offset: 0
//! ├──────────────────────────────────────────────┤
//! │ Flags: u8 (RecordFlags)                      │  Offset: 1
//! ├──────────────────────────────────────────────┤
//! │ Aux: u16 (vertex count / jump index / cmd)   │  Offset: 2
//! ├──────────────────────────────────────────────┤
//! │ Payload: 36 bytes, interpreted per tag       │  Offset: 4
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Positioned commands place lat (f64), lon (f64), alt (f32) at payload
//! offsets 0/8/16 followed by up to three f32 parameter slots. Passthrough
//! items use the whole payload for their seven raw f32 params.

use super::{Result, StorageError};
use crate::core::mission::item::{GlobalPosition, ItemCommand, ItemOrigin, MissionItem};
use bitflags::bitflags;

/// Size of the active-mission state record
pub const MISSION_STATE_RECORD_SIZE: usize = 8;

/// Size of a fence/rally stats record
pub const LIST_STATS_RECORD_SIZE: usize = 4;

/// Size of an item record
pub const ITEM_RECORD_SIZE: usize = 40;

bitflags! {
    /// Boolean item properties packed into the record flags byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u8 {
        /// Altitude is relative to home
        const ALT_RELATIVE = 0b0000_0001;
        /// Continue to the next item automatically
        const AUTOCONTINUE = 0b0000_0010;
        /// Exit loiter on the cross-track line to the next waypoint
        const EXIT_XTRACK = 0b0000_0100;
        /// Loiter-to-alt requires the exit heading
        const FORCE_HEADING = 0b0000_1000;
        /// Fence shape is an inclusion region
        const INCLUSION = 0b0001_0000;
        /// Item was generated onboard, not uploaded
        const ONBOARD = 0b0010_0000;
    }
}

// Item record tags. The values are the storage format; never reorder.
const TAG_WAYPOINT: u8 = 0;
const TAG_LOITER_UNLIMITED: u8 = 1;
const TAG_LOITER_TIME: u8 = 2;
const TAG_LAND: u8 = 3;
const TAG_TAKEOFF: u8 = 4;
const TAG_LOITER_TO_ALT: u8 = 5;
const TAG_VTOL_TAKEOFF: u8 = 6;
const TAG_VTOL_LAND: u8 = 7;
const TAG_FENCE_RETURN_POINT: u8 = 8;
const TAG_FENCE_POLYGON_VERTEX: u8 = 9;
const TAG_FENCE_CIRCLE: u8 = 10;
const TAG_RALLY_POINT: u8 = 11;
const TAG_DO_JUMP: u8 = 12;
const TAG_PASSTHROUGH: u8 = 13;

// Payload area offsets (relative to record start)
const OFF_AUX: usize = 2;
const OFF_LAT: usize = 4;
const OFF_LON: usize = 12;
const OFF_ALT: usize = 20;
const OFF_P1: usize = 24;
const OFF_P2: usize = 28;
const OFF_P3: usize = 32;
const OFF_JUMP_REPEAT: usize = 24;
const OFF_JUMP_CURRENT: usize = 26;
const OFF_PARAMS: usize = 4;

/// Active-mission state: which slot is live, how many items, which executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionStateRecord {
    /// Authoritative waypoint slot (0 or 1)
    pub dataman_id: u8,
    /// Item count of the active mission
    pub count: u16,
    /// Currently executing index, if any
    pub current_seq: Option<u16>,
}

impl MissionStateRecord {
    pub fn encode(&self) -> [u8; MISSION_STATE_RECORD_SIZE] {
        let mut buf = [0u8; MISSION_STATE_RECORD_SIZE];
        buf[0] = self.dataman_id;
        put_u16(&mut buf, 2, self.count);
        let seq = match self.current_seq {
            Some(seq) => seq as i32,
            None => -1,
        };
        put_i32(&mut buf, 4, seq);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < MISSION_STATE_RECORD_SIZE {
            return Err(StorageError::InvalidRecord);
        }

        let dataman_id = buf[0];
        if dataman_id > 1 {
            return Err(StorageError::InvalidRecord);
        }

        let seq = get_i32(buf, 4);
        Ok(Self {
            dataman_id,
            count: get_u16(buf, 2),
            current_seq: if seq < 0 { None } else { Some(seq as u16) },
        })
    }
}

/// Stats record at index 0 of the fence and rally regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListStatsRecord {
    /// Stored item count
    pub count: u16,
    /// Replacement counter; the navigator polls this to detect a new fence
    pub update_counter: u16,
}

impl ListStatsRecord {
    pub fn encode(&self) -> [u8; LIST_STATS_RECORD_SIZE] {
        let mut buf = [0u8; LIST_STATS_RECORD_SIZE];
        put_u16(&mut buf, 0, self.count);
        put_u16(&mut buf, 2, self.update_counter);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < LIST_STATS_RECORD_SIZE {
            return Err(StorageError::InvalidRecord);
        }

        Ok(Self {
            count: get_u16(buf, 0),
            update_counter: get_u16(buf, 2),
        })
    }
}

/// Encode an item into its storage record.
pub fn encode_item(item: &MissionItem) -> [u8; ITEM_RECORD_SIZE] {
    let mut buf = [0u8; ITEM_RECORD_SIZE];
    let mut flags = RecordFlags::empty();

    if item.autocontinue {
        flags |= RecordFlags::AUTOCONTINUE;
    }

    if item.origin == ItemOrigin::Onboard {
        flags |= RecordFlags::ONBOARD;
    }

    if let Some(position) = item.command.position() {
        if position.alt_is_relative {
            flags |= RecordFlags::ALT_RELATIVE;
        }
        put_f64(&mut buf, OFF_LAT, position.lat);
        put_f64(&mut buf, OFF_LON, position.lon);
        put_f32(&mut buf, OFF_ALT, position.alt);
    }

    match item.command {
        ItemCommand::Waypoint {
            time_inside,
            acceptance_radius,
            yaw,
            ..
        } => {
            buf[0] = TAG_WAYPOINT;
            put_f32(&mut buf, OFF_P1, time_inside);
            put_f32(&mut buf, OFF_P2, acceptance_radius);
            put_f32(&mut buf, OFF_P3, yaw);
        }
        ItemCommand::LoiterUnlimited {
            loiter_radius, yaw, ..
        } => {
            buf[0] = TAG_LOITER_UNLIMITED;
            put_f32(&mut buf, OFF_P1, loiter_radius);
            put_f32(&mut buf, OFF_P2, yaw);
        }
        ItemCommand::LoiterTime {
            time_inside,
            loiter_radius,
            exit_xtrack,
            ..
        } => {
            buf[0] = TAG_LOITER_TIME;
            put_f32(&mut buf, OFF_P1, time_inside);
            put_f32(&mut buf, OFF_P2, loiter_radius);
            if exit_xtrack {
                flags |= RecordFlags::EXIT_XTRACK;
            }
        }
        ItemCommand::Land { yaw, .. } => {
            buf[0] = TAG_LAND;
            put_f32(&mut buf, OFF_P1, yaw);
        }
        ItemCommand::Takeoff { pitch_min, yaw, .. } => {
            buf[0] = TAG_TAKEOFF;
            put_f32(&mut buf, OFF_P1, pitch_min);
            put_f32(&mut buf, OFF_P2, yaw);
        }
        ItemCommand::LoiterToAlt {
            force_heading,
            loiter_radius,
            exit_xtrack,
            ..
        } => {
            buf[0] = TAG_LOITER_TO_ALT;
            put_f32(&mut buf, OFF_P1, loiter_radius);
            if force_heading {
                flags |= RecordFlags::FORCE_HEADING;
            }
            if exit_xtrack {
                flags |= RecordFlags::EXIT_XTRACK;
            }
        }
        ItemCommand::VtolTakeoff { yaw, .. } => {
            buf[0] = TAG_VTOL_TAKEOFF;
            put_f32(&mut buf, OFF_P1, yaw);
        }
        ItemCommand::VtolLand { yaw, .. } => {
            buf[0] = TAG_VTOL_LAND;
            put_f32(&mut buf, OFF_P1, yaw);
        }
        ItemCommand::FenceReturnPoint { .. } => {
            buf[0] = TAG_FENCE_RETURN_POINT;
        }
        ItemCommand::FencePolygonVertex {
            inclusion,
            vertex_count,
            ..
        } => {
            buf[0] = TAG_FENCE_POLYGON_VERTEX;
            put_u16(&mut buf, OFF_AUX, vertex_count);
            if inclusion {
                flags |= RecordFlags::INCLUSION;
            }
        }
        ItemCommand::FenceCircle {
            inclusion, radius, ..
        } => {
            buf[0] = TAG_FENCE_CIRCLE;
            put_f32(&mut buf, OFF_P1, radius);
            if inclusion {
                flags |= RecordFlags::INCLUSION;
            }
        }
        ItemCommand::RallyPoint { .. } => {
            buf[0] = TAG_RALLY_POINT;
        }
        ItemCommand::DoJump {
            mission_index,
            repeat_count,
            current_count,
        } => {
            buf[0] = TAG_DO_JUMP;
            put_u16(&mut buf, OFF_AUX, mission_index);
            put_u16(&mut buf, OFF_JUMP_REPEAT, repeat_count);
            put_u16(&mut buf, OFF_JUMP_CURRENT, current_count);
        }
        ItemCommand::Passthrough { command, params } => {
            buf[0] = TAG_PASSTHROUGH;
            put_u16(&mut buf, OFF_AUX, command);
            for (i, param) in params.iter().enumerate() {
                put_f32(&mut buf, OFF_PARAMS + i * 4, *param);
            }
        }
    }

    buf[1] = flags.bits();
    buf
}

/// Decode an item record.
pub fn decode_item(buf: &[u8]) -> Result<MissionItem> {
    if buf.len() < ITEM_RECORD_SIZE {
        return Err(StorageError::InvalidRecord);
    }

    let flags = RecordFlags::from_bits_truncate(buf[1]);
    let position = GlobalPosition {
        lat: get_f64(buf, OFF_LAT),
        lon: get_f64(buf, OFF_LON),
        alt: get_f32(buf, OFF_ALT),
        alt_is_relative: flags.contains(RecordFlags::ALT_RELATIVE),
    };

    let command = match buf[0] {
        TAG_WAYPOINT => ItemCommand::Waypoint {
            position,
            time_inside: get_f32(buf, OFF_P1),
            acceptance_radius: get_f32(buf, OFF_P2),
            yaw: get_f32(buf, OFF_P3),
        },
        TAG_LOITER_UNLIMITED => ItemCommand::LoiterUnlimited {
            position,
            loiter_radius: get_f32(buf, OFF_P1),
            yaw: get_f32(buf, OFF_P2),
        },
        TAG_LOITER_TIME => ItemCommand::LoiterTime {
            position,
            time_inside: get_f32(buf, OFF_P1),
            loiter_radius: get_f32(buf, OFF_P2),
            exit_xtrack: flags.contains(RecordFlags::EXIT_XTRACK),
        },
        TAG_LAND => ItemCommand::Land {
            position,
            yaw: get_f32(buf, OFF_P1),
        },
        TAG_TAKEOFF => ItemCommand::Takeoff {
            position,
            pitch_min: get_f32(buf, OFF_P1),
            yaw: get_f32(buf, OFF_P2),
        },
        TAG_LOITER_TO_ALT => ItemCommand::LoiterToAlt {
            position,
            force_heading: flags.contains(RecordFlags::FORCE_HEADING),
            loiter_radius: get_f32(buf, OFF_P1),
            exit_xtrack: flags.contains(RecordFlags::EXIT_XTRACK),
        },
        TAG_VTOL_TAKEOFF => ItemCommand::VtolTakeoff {
            position,
            yaw: get_f32(buf, OFF_P1),
        },
        TAG_VTOL_LAND => ItemCommand::VtolLand {
            position,
            yaw: get_f32(buf, OFF_P1),
        },
        TAG_FENCE_RETURN_POINT => ItemCommand::FenceReturnPoint { position },
        TAG_FENCE_POLYGON_VERTEX => ItemCommand::FencePolygonVertex {
            position,
            inclusion: flags.contains(RecordFlags::INCLUSION),
            vertex_count: get_u16(buf, OFF_AUX),
        },
        TAG_FENCE_CIRCLE => ItemCommand::FenceCircle {
            position,
            inclusion: flags.contains(RecordFlags::INCLUSION),
            radius: get_f32(buf, OFF_P1),
        },
        TAG_RALLY_POINT => ItemCommand::RallyPoint { position },
        TAG_DO_JUMP => ItemCommand::DoJump {
            mission_index: get_u16(buf, OFF_AUX),
            repeat_count: get_u16(buf, OFF_JUMP_REPEAT),
            current_count: get_u16(buf, OFF_JUMP_CURRENT),
        },
        TAG_PASSTHROUGH => {
            let mut params = [0.0f32; 7];
            for (i, param) in params.iter_mut().enumerate() {
                *param = get_f32(buf, OFF_PARAMS + i * 4);
            }
            ItemCommand::Passthrough {
                command: get_u16(buf, OFF_AUX),
                params,
            }
        }
        _ => return Err(StorageError::InvalidRecord),
    };

    Ok(MissionItem {
        command,
        autocontinue: flags.contains(RecordFlags::AUTOCONTINUE),
        origin: if flags.contains(RecordFlags::ONBOARD) {
            ItemOrigin::Onboard
        } else {
            ItemOrigin::Mavlink
        },
    })
}

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn put_i32(buf: &mut [u8], off: usize, v: i32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn get_i32(buf: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn put_f32(buf: &mut [u8], off: usize, v: f32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn get_f32(buf: &[u8], off: usize) -> f32 {
    f32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn put_f64(buf: &mut [u8], off: usize, v: f64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn get_f64(buf: &[u8], off: usize) -> f64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[off..off + 8]);
    f64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> GlobalPosition {
        GlobalPosition {
            lat: 47.3977419,
            lon: 8.5455938,
            alt: 488.0,
            alt_is_relative: false,
        }
    }

    #[test]
    fn test_mission_state_record_roundtrip() {
        let record = MissionStateRecord {
            dataman_id: 1,
            count: 42,
            current_seq: Some(7),
        };
        let decoded = MissionStateRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_mission_state_record_no_current() {
        let record = MissionStateRecord {
            dataman_id: 0,
            count: 0,
            current_seq: None,
        };
        let decoded = MissionStateRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded.current_seq, None);
    }

    #[test]
    fn test_mission_state_record_rejects_bad_slot() {
        let mut buf = MissionStateRecord {
            dataman_id: 0,
            count: 1,
            current_seq: None,
        }
        .encode();
        buf[0] = 7;
        assert_eq!(
            MissionStateRecord::decode(&buf),
            Err(StorageError::InvalidRecord)
        );
    }

    #[test]
    fn test_list_stats_record_roundtrip() {
        let record = ListStatsRecord {
            count: 12,
            update_counter: 3,
        };
        let decoded = ListStatsRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_waypoint_item_roundtrip() {
        let item = MissionItem {
            command: ItemCommand::Waypoint {
                position: GlobalPosition {
                    alt_is_relative: true,
                    ..position()
                },
                time_inside: 2.5,
                acceptance_radius: 4.0,
                yaw: 1.25,
            },
            autocontinue: true,
            origin: ItemOrigin::Mavlink,
        };
        let decoded = decode_item(&encode_item(&item)).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_loiter_to_alt_flags_roundtrip() {
        let item = MissionItem {
            command: ItemCommand::LoiterToAlt {
                position: position(),
                force_heading: true,
                loiter_radius: -60.0,
                exit_xtrack: true,
            },
            autocontinue: false,
            origin: ItemOrigin::Onboard,
        };
        let decoded = decode_item(&encode_item(&item)).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_fence_polygon_roundtrip() {
        let item = MissionItem {
            command: ItemCommand::FencePolygonVertex {
                position: position(),
                inclusion: true,
                vertex_count: 5,
            },
            autocontinue: true,
            origin: ItemOrigin::Mavlink,
        };
        let decoded = decode_item(&encode_item(&item)).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_do_jump_roundtrip() {
        let item = MissionItem {
            command: ItemCommand::DoJump {
                mission_index: 3,
                repeat_count: 2,
                current_count: 1,
            },
            autocontinue: true,
            origin: ItemOrigin::Mavlink,
        };
        let decoded = decode_item(&encode_item(&item)).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_passthrough_roundtrip() {
        let item = MissionItem {
            command: ItemCommand::Passthrough {
                command: 178, // DO_CHANGE_SPEED
                params: [1.0, 12.5, -1.0, 0.0, 0.0, 0.0, 0.0],
            },
            autocontinue: true,
            origin: ItemOrigin::Mavlink,
        };
        let decoded = decode_item(&encode_item(&item)).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let mut buf = [0u8; ITEM_RECORD_SIZE];
        buf[0] = 0xEE;
        assert_eq!(decode_item(&buf), Err(StorageError::InvalidRecord));
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let buf = [0u8; ITEM_RECORD_SIZE - 1];
        assert_eq!(decode_item(&buf), Err(StorageError::InvalidRecord));
    }
}
