//! Read-model projection: entity graph -> client-facing aggregates.
//!
//! Pure functions, recomputed on every read. Participant state moves
//! continuously while a challenge is active, so nothing here is ever cached.

use chrono::{DateTime, Duration, Utc};
use gritwall_db::models::{ChallengeDetail, ShameRow, UserRow};
use gritwall_db::ts;
use gritwall_types::api::{
    AcceptedBuckets, ChallengeData, EffectCounters, ParticipantBuckets, ShameType, ShamedEntry,
    UserMini, UserMiniBase,
};
use gritwall_types::models::{ChallengeType, InviteType};
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Where a (challenge, participant) pair currently sits in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PendingResponse,
    PendingStart,
    Ongoing,
    VotingWindow,
    History,
}

pub fn has_started(start_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match start_at {
        Some(start) => start < now,
        None => false,
    }
}

pub fn has_ended(end_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= end_at
}

pub fn in_voting_window(end_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    end_at <= now && now < end_at + window
}

/// Classifies one participant's view of a challenge. Returns `None` for the
/// unreachable combination "not joined but already started" — such rows fall
/// out of every list, matching their uselessness to the client.
pub fn classify(
    joined: bool,
    start_at: Option<DateTime<Utc>>,
    end_at: DateTime<Utc>,
    now: DateTime<Utc>,
    voting_window: Duration,
) -> Option<Phase> {
    if has_ended(end_at, now) && joined {
        if in_voting_window(end_at, now, voting_window) {
            Some(Phase::VotingWindow)
        } else {
            Some(Phase::History)
        }
    } else if joined && has_started(start_at, now) {
        Some(Phase::Ongoing)
    } else if joined {
        Some(Phase::PendingStart)
    } else if !has_started(start_at, now) && !has_ended(end_at, now) {
        Some(Phase::PendingResponse)
    } else {
        None
    }
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}': {}", s, e);
        Uuid::default()
    })
}

pub(crate) fn user_mini_base(u: &UserRow) -> Option<UserMiniBase> {
    Some(UserMiniBase {
        user_id: parse_uuid(&u.id),
        username: u.username.clone()?,
        name: u.name.clone()?,
        avatar: u.avatar()?,
    })
}

/// Challenge + participants + owner -> the client view.
pub fn format_challenge(detail: &ChallengeDetail) -> EngineResult<ChallengeData> {
    let c = &detail.challenge;

    let mut pending = Vec::new();
    let mut completed = Vec::new();
    let mut not_completed = Vec::new();
    let mut protected = Vec::new();
    let mut grief_list = Vec::new();

    for p in &detail.participants {
        let row = &p.participant;
        // Enrollment paths all validate profile completeness, so missing
        // fields mean a corrupt row; skip it rather than fail the whole view.
        let Some(base) = user_mini_base(&p.user) else {
            warn!(
                "Participant {} of {} has incomplete profile, skipping",
                row.user_id, row.challenge_id
            );
            continue;
        };

        let u = UserMini {
            user_id: base.user_id,
            username: base.username,
            name: base.name,
            avatar: base.avatar,
            completed_at: ts::parse_opt(row.completed_at.as_deref())?,
            evidence_link: row.evidence_link.clone(),
            has_been_vetoed: row.has_been_vetoed,
            is_protected: row.is_protected(),
            is_griefed: row.griefed_by_user_id.is_some(),
            griefed_by: p.griefed_by.as_ref().and_then(user_mini_base),
        };

        if row.griefed_by_user_id.is_some() {
            grief_list.push(u.user_id);
        }

        if !row.has_joined() {
            pending.push(u);
        } else if row.is_protected() {
            protected.push(u);
        } else if row.completed_at.is_some() {
            completed.push(u);
        } else {
            not_completed.push(u);
        }
    }

    let participant_count = completed.len() + not_completed.len() + protected.len();

    let owner = user_mini_base(&detail.owner)
        .ok_or(EngineError::NotFound("challenge owner profile incomplete"))?;

    let challenge_type = ChallengeType::parse(&c.challenge_type)
        .ok_or_else(|| EngineError::Storage(anyhow::anyhow!("bad challenge type")))?;
    let invite_type = InviteType::parse(&c.invite_type)
        .ok_or_else(|| EngineError::Storage(anyhow::anyhow!("bad invite type")))?;

    Ok(ChallengeData {
        challenge_id: parse_uuid(&c.id),
        title: c.title.clone(),
        description: c.description.clone(),
        is_featured: c.is_featured,
        image_url: if c.is_featured {
            c.image_url.clone()
        } else {
            None
        },
        start_at: ts::parse_opt(c.start_at.as_deref())?,
        end_at: ts::parse(&c.end_at)?,
        challenge_type,
        invite_type,
        has_released_result: c.result_released_at.is_some(),
        owner,
        participant_count,
        participants: ParticipantBuckets {
            grief_list,
            accepted: AcceptedBuckets {
                completed,
                not_completed,
                protected,
            },
            pending,
        },
    })
}

pub fn format_shame_entry(row: &ShameRow) -> EngineResult<ShamedEntry> {
    Ok(ShamedEntry {
        id: format!("{}:{}", row.user_id, row.challenge_id),
        name: row.name.clone(),
        title: row.title.clone(),
        shame_type: if row.has_been_vetoed {
            ShameType::Cheat
        } else {
            ShameType::Shame
        },
        time: ts::parse(&row.result_released_at)?,
        avatar: gritwall_types::models::Avatar {
            animal: row.avatar_animal.clone(),
            background: row.avatar_bg.clone(),
            color: row.avatar_color.clone(),
        },
        effect: EffectCounters {
            tomato: row.effect_tomato,
            egg: row.effect_egg,
            poop: row.effect_poop,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::minutes(60);

    #[test]
    fn classify_walks_the_lifecycle() {
        let now = Utc::now();
        let start = Some(now - Duration::hours(1));
        let end = now + Duration::hours(1);

        // not yet accepted, not started
        assert_eq!(
            classify(false, Some(now + Duration::hours(1)), end, now, WINDOW),
            Some(Phase::PendingResponse)
        );
        // accepted, not started
        assert_eq!(
            classify(true, Some(now + Duration::hours(1)), end, now, WINDOW),
            Some(Phase::PendingStart)
        );
        // accepted, started, not ended
        assert_eq!(classify(true, start, end, now, WINDOW), Some(Phase::Ongoing));
        // ended 30 minutes ago
        assert_eq!(
            classify(true, start, now - Duration::minutes(30), now, WINDOW),
            Some(Phase::VotingWindow)
        );
        // ended 2 hours ago
        assert_eq!(
            classify(true, start, now - Duration::hours(2), now, WINDOW),
            Some(Phase::History)
        );
    }

    #[test]
    fn classify_drops_unjoined_started_rows() {
        let now = Utc::now();
        assert_eq!(
            classify(
                false,
                Some(now - Duration::hours(1)),
                now + Duration::hours(1),
                now,
                WINDOW
            ),
            None
        );
    }

    #[test]
    fn no_start_means_not_started() {
        let now = Utc::now();
        assert!(!has_started(None, now));
        assert_eq!(
            classify(true, None, now + Duration::hours(1), now, WINDOW),
            Some(Phase::PendingStart)
        );
    }

    #[test]
    fn voting_window_boundaries() {
        let now = Utc::now();
        // exactly at end
        assert!(in_voting_window(now, now, WINDOW));
        // one second before the window closes
        assert!(in_voting_window(
            now - WINDOW + Duration::seconds(1),
            now,
            WINDOW
        ));
        // exactly at the close
        assert!(!in_voting_window(now - WINDOW, now, WINDOW));
    }
}
