//! Broadcast event payloads handed to registered listeners

use crate::models::{ChatMessage, EntityPayload, TeamInfo};

/// A team-chat message pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    pub message: ChatMessage,
}

/// A team-state change pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamEvent {
    /// The player whose action triggered the change.
    pub player_id: u64,
    pub team_info: TeamInfo,
}

/// A smart-entity state change pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityEvent {
    pub entity_id: u32,
    pub payload: EntityPayload,
}
