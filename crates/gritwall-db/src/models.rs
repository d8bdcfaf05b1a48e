//! Database row types — these map directly to SQLite rows.
//! Distinct from gritwall-types API models to keep the DB layer independent.

use gritwall_types::models::Avatar;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub avatar_animal: Option<String>,
    pub avatar_bg: Option<String>,
    pub avatar_color: Option<String>,
    pub points: i64,
    pub powerup_grief_count: i64,
    pub powerup_protec_count: i64,
    pub created_at: String,
}

impl UserRow {
    /// A user may only be enrolled in challenges once the profile fields set
    /// during onboarding are all present.
    pub fn is_profile_complete(&self) -> bool {
        self.username.is_some()
            && self.name.is_some()
            && self.avatar_animal.is_some()
            && self.avatar_bg.is_some()
            && self.avatar_color.is_some()
    }

    pub fn avatar(&self) -> Option<Avatar> {
        Some(Avatar {
            animal: self.avatar_animal.clone()?,
            background: self.avatar_bg.clone()?,
            color: self.avatar_color.clone()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChallengeRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_at: Option<String>,
    pub end_at: String,
    pub challenge_type: String,
    pub invite_type: String,
    pub owner_id: String,
    pub result_released_at: Option<String>,
    pub rewards_released_at: Option<String>,
    pub is_featured: bool,
    pub feature_rank: Option<i64>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub challenge_id: String,
    pub user_id: String,
    pub joined_at: Option<String>,
    pub completed_at: Option<String>,
    pub has_been_vetoed: bool,
    pub applied_protec: Option<String>,
    pub griefed_by_user_id: Option<String>,
    pub evidence_link: Option<String>,
    pub effect_tomato: i64,
    pub effect_egg: i64,
    pub effect_poop: i64,
}

impl ParticipantRow {
    pub fn has_joined(&self) -> bool {
        self.joined_at.is_some()
    }

    pub fn is_protected(&self) -> bool {
        self.applied_protec.is_some()
    }
}

/// A participant joined with its user and (when griefed) the griefer.
#[derive(Debug, Clone)]
pub struct ParticipantDetail {
    pub participant: ParticipantRow,
    pub user: UserRow,
    pub griefed_by: Option<UserRow>,
}

/// A challenge with its full entity graph, as consumed by the read-model
/// formatter.
#[derive(Debug, Clone)]
pub struct ChallengeDetail {
    pub challenge: ChallengeRow,
    pub owner: UserRow,
    pub participants: Vec<ParticipantDetail>,
}

/// One directed friendship edge. Pending while accepted_at is NULL.
#[derive(Debug, Clone)]
pub struct ContactRow {
    pub user_id: String,
    pub friend_id: String,
    pub accepted_at: Option<String>,
}

impl ContactRow {
    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct VoteRow {
    pub challenge_id: String,
    pub victim_id: String,
    pub accuser_id: String,
}

/// Pre-joined row backing the wall of shame.
#[derive(Debug, Clone)]
pub struct ShameRow {
    pub user_id: String,
    pub challenge_id: String,
    pub name: String,
    pub title: String,
    pub has_been_vetoed: bool,
    pub result_released_at: String,
    pub avatar_animal: String,
    pub avatar_bg: String,
    pub avatar_color: String,
    pub effect_tomato: i64,
    pub effect_egg: i64,
    pub effect_poop: i64,
}

#[derive(Debug, Clone)]
pub struct LeaderboardRow {
    pub user_id: String,
    pub username: String,
    pub name: String,
    pub avatar_animal: String,
    pub avatar_bg: String,
    pub avatar_color: String,
    pub completed_count: i64,
    pub failed_count: i64,
    pub vetoed_count: i64,
    pub protec_count: i64,
}
