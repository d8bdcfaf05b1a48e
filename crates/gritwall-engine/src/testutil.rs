//! Shared fixtures for the engine tests: an in-memory database behind a
//! fanout-less engine, plus builders for users and challenges at arbitrary
//! points in their lifecycle.

use std::sync::Arc;

use chrono::{Duration, Utc};
use gritwall_db::Database;
use gritwall_db::models::ChallengeRow;
use gritwall_db::ts;
use uuid::Uuid;

use crate::fanout::NullFanout;
use crate::scheduler::Scheduler;
use crate::{Engine, EngineConfig};

pub(crate) fn engine() -> Arc<Engine> {
    engine_with(EngineConfig::default())
}

pub(crate) fn engine_with(config: EngineConfig) -> Arc<Engine> {
    let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
    Engine::new(db, Scheduler::new(), Arc::new(NullFanout), config)
}

/// A user with a finished profile.
pub(crate) fn user(engine: &Engine, tag: &str) -> Uuid {
    let id = Uuid::new_v4();
    let key = id.to_string();
    engine
        .db()
        .create_user(&key, &format!("{tag}@example.com"), "hash")
        .expect("create user");
    engine
        .db()
        .update_profile(&key, tag, tag, "fox", "forest", "teal")
        .expect("profile");
    id
}

/// A user stuck mid-onboarding.
pub(crate) fn bare_user(engine: &Engine, tag: &str) -> Uuid {
    let id = Uuid::new_v4();
    engine
        .db()
        .create_user(&id.to_string(), &format!("{tag}@example.com"), "hash")
        .expect("create user");
    id
}

/// Inserts a challenge directly, with start/end relative to now and every
/// listed participant (owner included) already joined.
pub(crate) fn challenge(
    engine: &Engine,
    owner: Uuid,
    joined: &[Uuid],
    start_offset: Duration,
    end_offset: Duration,
) -> Uuid {
    let now = Utc::now();
    let id = Uuid::new_v4();
    let row = ChallengeRow {
        id: id.to_string(),
        title: "t".into(),
        description: None,
        start_at: Some(ts::to_store(now + start_offset)),
        end_at: ts::to_store(now + end_offset),
        challenge_type: "NOT_COMPLETED".into(),
        invite_type: "PRIVATE".into(),
        owner_id: owner.to_string(),
        result_released_at: None,
        rewards_released_at: None,
        is_featured: false,
        feature_rank: None,
        image_url: None,
    };

    let joined_at = ts::to_store(now);
    let mut participants: Vec<(String, Option<String>)> =
        vec![(owner.to_string(), Some(joined_at.clone()))];
    participants.extend(
        joined
            .iter()
            .filter(|u| **u != owner)
            .map(|u| (u.to_string(), Some(joined_at.clone()))),
    );

    engine
        .db()
        .insert_challenge(&row, &participants)
        .expect("insert challenge");
    id
}

/// Stamps applied_protec directly, bypassing the inventory spend.
pub(crate) fn shield(engine: &Engine, challenge_id: Uuid, user: Uuid) {
    engine
        .db()
        .with_conn(|conn| {
            let n = conn.execute(
                "UPDATE participants SET applied_protec = ?1
                 WHERE challenge_id = ?2 AND user_id = ?3",
                rusqlite::params![
                    ts::to_store(Utc::now()),
                    challenge_id.to_string(),
                    user.to_string()
                ],
            )?;
            assert_eq!(n, 1);
            Ok(())
        })
        .expect("apply protec");
}

pub(crate) fn give_powerup(engine: &Engine, user: Uuid, grief: bool, count: i64) {
    let ok = engine
        .db()
        .purchase_powerup(&user.to_string(), grief, count, 0)
        .expect("grant powerup");
    assert!(ok);
}

pub(crate) fn give_points(engine: &Engine, user: Uuid, points: i64) {
    engine
        .db()
        .with_conn(|conn| {
            conn.execute(
                "UPDATE users SET points = points + ?1 WHERE id = ?2",
                rusqlite::params![points, user.to_string()],
            )?;
            Ok(())
        })
        .expect("grant points");
}

pub(crate) fn points_of(engine: &Engine, user: Uuid) -> i64 {
    engine
        .db()
        .get_user_by_id(&user.to_string())
        .expect("user lookup")
        .expect("user exists")
        .points
}
