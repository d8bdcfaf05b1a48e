use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Avatar, ChallengeType, EffectType, InviteType, PowerUp};

// -- JWT Claims --

/// JWT claims shared across gritwall-api (REST middleware) and gritwall-gateway
/// (WebSocket authentication). Canonical definition lives here in gritwall-types
/// to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: Option<String>,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub token: String,
}

// -- Users --

/// Profile setup. A user may only participate in challenges once every
/// field here has been submitted.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub username: String,
    pub name: String,
    pub avatar: Avatar,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<Avatar>,
    pub points: i64,
    pub powerups: PowerupInventory,
}

#[derive(Debug, Serialize)]
pub struct PowerupInventory {
    pub grief: i64,
    pub protec: i64,
}

// -- Challenges --

#[derive(Debug, Deserialize)]
pub struct CreateChallengeRequest {
    pub title: String,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    pub invite_type: Option<InviteType>,
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateChallengeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub challenge_type: Option<ChallengeType>,
    pub participants: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct UsePowerupRequest {
    #[serde(rename = "type")]
    pub powerup: PowerUp,
    pub target_user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetEvidenceRequest {
    pub evidence_link: String,
}

// -- Challenge views --

/// Minimal user reference embedded in challenge views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMiniBase {
    pub user_id: Uuid,
    pub username: String,
    pub name: String,
    pub avatar: Avatar,
}

/// A participant as seen inside a challenge view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMini {
    pub user_id: Uuid,
    pub username: String,
    pub name: String,
    pub avatar: Avatar,
    pub completed_at: Option<DateTime<Utc>>,
    pub evidence_link: Option<String>,
    pub has_been_vetoed: bool,
    pub is_protected: bool,
    pub is_griefed: bool,
    pub griefed_by: Option<UserMiniBase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedBuckets {
    pub completed: Vec<UserMini>,
    pub not_completed: Vec<UserMini>,
    pub protected: Vec<UserMini>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantBuckets {
    pub grief_list: Vec<Uuid>,
    pub accepted: AcceptedBuckets,
    pub pending: Vec<UserMini>,
}

/// The client-facing challenge aggregate. Always recomputed from the entity
/// graph on read — never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeData {
    pub challenge_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_featured: bool,
    pub image_url: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    pub invite_type: InviteType,
    pub has_released_result: bool,
    pub owner: UserMiniBase,
    pub participant_count: usize,
    pub participants: ParticipantBuckets,
}

/// A user's challenges bucketed by where each one sits in its lifecycle.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeList {
    pub ongoing: Vec<ChallengeData>,
    pub pending_start: Vec<ChallengeData>,
    pub pending_response: Vec<ChallengeData>,
    pub voting_period: Vec<ChallengeData>,
    pub history: Vec<ChallengeData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicChallengeList {
    pub featured: Vec<ChallengeData>,
    pub others: Vec<ChallengeData>,
}

// -- Votes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitVoteRequest {
    pub victim_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteVictim {
    pub user_id: Uuid,
    pub username: String,
    pub name: String,
    pub has_protec: bool,
    pub evidence_link: Option<String>,
}

/// Accusations lodged against one participant of a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteData {
    pub victim: VoteVictim,
    pub accusers: Vec<Uuid>,
}

// -- Friends --

/// Targets one user for a friend request, accept, reject or unfriend.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FriendRequestBody {
    pub user_id: Uuid,
}

// -- Shame --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShameType {
    /// Failed to complete the challenge.
    Shame,
    /// Voted out as a cheater.
    Cheat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectCounters {
    pub tomato: i64,
    pub egg: i64,
    pub poop: i64,
}

/// One wall-of-shame entry: a participant who failed or cheated a challenge
/// whose results have been released.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShamedEntry {
    /// `{user_id}:{challenge_id}` — unique per (user, challenge) pair.
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub shame_type: ShameType,
    pub time: DateTime<Utc>,
    pub avatar: Avatar,
    pub effect: EffectCounters,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrowItemRequest {
    pub effect: EffectType,
    pub challenge_id: Uuid,
    pub target_user_id: Uuid,
    pub count: i64,
}

// -- Store --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurchaseRequest {
    pub powerup: PowerUp,
    pub count: i64,
}

// -- Leaderboard --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub username: String,
    pub name: String,
    pub avatar: Avatar,
    pub completed_challenge_count: i64,
    pub failed_challenge_count: i64,
    pub vetoed_challenge_count: i64,
    pub protec_count: i64,
}
