//! Typed payloads decoded from server responses and broadcasts

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// In-game clock state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameTime {
    /// Full in-game day in real-life minutes.
    pub day_length_minutes: f32,
    /// Start of sunrise, in game hours from midnight.
    pub sunrise: f32,
    /// Start of sunset, in game hours from midnight.
    pub sunset: f32,
    /// Current time, in game hours from midnight.
    pub time: f32,
    pub time_scale: f32,
}

impl GameTime {
    pub fn formatted_time(&self) -> String {
        format_game_time(self.time)
    }

    pub fn formatted_sunrise(&self) -> String {
        format_game_time(self.sunrise)
    }

    pub fn formatted_sunset(&self) -> String {
        format_game_time(self.sunset)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub header_image: String,
    pub url: String,
    pub map: String,
    pub map_size: u32,
    pub wipe_time: i64,
    pub players: u32,
    pub max_players: u32,
    pub queued_players: u32,
    pub seed: u32,
    pub salt: u32,
}

/// One team-chat message, also the payload of chat broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub steam_id: u64,
    pub name: String,
    pub message: String,
    pub color: String,
    /// Unix timestamp (seconds).
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub steam_id: u64,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub is_online: bool,
    pub spawn_time: i64,
    pub is_alive: bool,
    pub death_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamNote {
    pub note_type: i32,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub leader_steam_id: u64,
    pub members: Vec<TeamMember>,
    pub map_notes: Vec<TeamNote>,
    pub leader_map_notes: Vec<TeamNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub id: u32,
    pub marker_type: i32,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub steam_id: u64,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub radius: f32,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monument {
    pub token: String,
    pub x: f32,
    pub y: f32,
}

/// Raw map payload: compressed image bytes plus monument placements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    pub width: u32,
    pub height: u32,
    pub jpg_image: Vec<u8>,
    pub ocean_margin: u32,
    pub monuments: Vec<Monument>,
    #[serde(default)]
    pub background: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityItem {
    pub item_id: i32,
    pub quantity: u32,
    pub item_is_blueprint: bool,
}

/// Mutable state of a smart entity, carried by both entity-info responses
/// and entity-change broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPayload {
    pub value: bool,
    #[serde(default)]
    pub items: Vec<EntityItem>,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub has_protection: bool,
    #[serde(default)]
    pub protection_expiry: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity_type: i32,
    pub payload: EntityPayload,
}

/// Render fractional game hours as `H:MM`.
pub fn format_game_time(hours: f32) -> String {
    let clamped = hours.rem_euclid(24.0);
    let whole = clamped.floor();
    let minutes = ((clamped - whole) * 60.0).round() as u32;
    // 7.999.. rounds up to a full hour
    if minutes == 60 {
        format!("{}:00", (whole as u32 + 1) % 24)
    } else {
        format!("{}:{:02}", whole as u32, minutes)
    }
}

/// Render a unix timestamp as a human-readable UTC string.
pub fn format_timestamp(unix_secs: i64) -> String {
    match Utc.timestamp_opt(unix_secs, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("invalid timestamp {}", unix_secs),
    }
}
