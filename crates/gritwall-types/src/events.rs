use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ChallengeData, LeaderboardEntry, ShamedEntry};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// The global leaderboard changed (results were released somewhere)
    GlobalLeaderboard(Vec<LeaderboardEntry>),

    /// Fresh view of a single challenge, scoped to its room
    RoomUpdate {
        challenge_id: Uuid,
        data: ChallengeData,
    },

    /// New or updated wall-of-shame entries. A single-element payload is the
    /// "cheater" broadcast fired when a veto lands.
    ShameListUpdate(Vec<ShamedEntry>),
}

impl GatewayEvent {
    /// Returns the challenge room this event is scoped to.
    /// Events that return `None` are global and are delivered to all clients.
    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            Self::RoomUpdate { challenge_id, .. } => Some(*challenge_id),
            // Ready, GlobalLeaderboard, ShameListUpdate are global
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Join a challenge room; the server replies with a RoomUpdate
    RoomJoin { challenge_id: Uuid },

    /// Leave a challenge room
    RoomLeave { challenge_id: Uuid },

    /// Accept a challenge invitation (also joins the room)
    ChallengeAccept { challenge_id: Uuid },

    /// Reject a challenge invitation (also leaves the room)
    ChallengeReject { challenge_id: Uuid },

    /// Mark the challenge as completed
    ChallengeComplete { challenge_id: Uuid },

    /// Request the current wall of shame
    ShameListGet,

    /// Request the current global leaderboard
    LeaderboardGet,
}
