//! Wire envelopes exchanged with the server
//!
//! Outbound [`Request`] frames carry the sequence number and account
//! credentials on every message. Inbound [`ServerFrame`] envelopes are a
//! tagged union: a frame is either a response, an error, or exactly one kind
//! of broadcast, never more than one at once. Envelopes are serialized with
//! serde_json and travel as binary WebSocket messages, which supply the
//! length-prefixed framing.

use serde::{Deserialize, Serialize};

use crate::error::{CompanionError, Result};
use crate::models::{
    ChatMessage, EntityInfo, EntityPayload, GameTime, MapData, MapMarker, ServerInfo, TeamInfo,
};

/// Outbound request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: u32,
    pub account_id: u64,
    pub account_token: i64,
    pub body: RequestBody,
}

impl Request {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CompanionError::EncodeError(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| CompanionError::DecodeError(e.to_string()))
    }
}

/// The operation a request performs. Exactly one variant per request, so the
/// cost classification below is total by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
    GetTime,
    GetInfo,
    GetTeamChat,
    GetTeamInfo,
    GetMapMarkers,
    GetMap,
    SendTeamMessage { message: String },
    GetEntityInfo { entity_id: u32 },
    SetEntityValue { entity_id: u32, value: bool },
    SetSubscription { entity_id: u32, value: bool },
    CheckSubscription { entity_id: u32 },
    PromoteToLeader { steam_id: u64 },
}

impl RequestBody {
    /// Fixed rate-limit cost for this request kind.
    pub fn token_cost(&self) -> u32 {
        match self {
            Self::GetMap => 5,
            Self::SendTeamMessage { .. } => 2,
            Self::GetTime
            | Self::GetInfo
            | Self::GetTeamChat
            | Self::GetTeamInfo
            | Self::GetMapMarkers
            | Self::GetEntityInfo { .. }
            | Self::SetEntityValue { .. }
            | Self::SetSubscription { .. }
            | Self::CheckSubscription { .. }
            | Self::PromoteToLeader { .. } => 1,
        }
    }

    /// Operation name used in error reporting.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::GetTime => "get_time",
            Self::GetInfo => "get_info",
            Self::GetTeamChat => "get_team_chat",
            Self::GetTeamInfo => "get_team_info",
            Self::GetMapMarkers => "get_map_markers",
            Self::GetMap => "get_map_data",
            Self::SendTeamMessage { .. } => "send_team_message",
            Self::GetEntityInfo { .. } => "get_entity_info",
            Self::SetEntityValue { .. } => "set_entity_value",
            Self::SetSubscription { .. } => "set_subscription",
            Self::CheckSubscription { .. } => "check_subscription",
            Self::PromoteToLeader { .. } => "promote_to_leader",
        }
    }
}

/// Inbound envelope from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Correlated reply to a request.
    Response {
        seq: u32,
        #[serde(default)]
        body: ResponseBody,
    },

    /// Server-reported failure for a request.
    Error { seq: u32, error: String },

    /// Unsolicited team-chat message.
    ChatBroadcast { message: ChatMessage },

    /// Unsolicited team-state change.
    TeamBroadcast { player_id: u64, team_info: TeamInfo },

    /// Unsolicited smart-entity state change.
    EntityBroadcast { entity_id: u32, payload: EntityPayload },
}

impl ServerFrame {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CompanionError::EncodeError(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| CompanionError::DecodeError(e.to_string()))
    }
}

/// Typed payload of a response frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Acknowledgement with no payload.
    #[default]
    Empty,
    Time { time: GameTime },
    Info { info: ServerInfo },
    TeamChat { messages: Vec<ChatMessage> },
    TeamInfo { team_info: TeamInfo },
    MapMarkers { markers: Vec<MapMarker> },
    Map { map: MapData },
    EntityInfo { entity_info: EntityInfo },
    Flag { value: bool },
}
