//! The wall of shame: participants of released challenges who failed or were
//! vetoed, plus the rotten produce thrown at them.

use chrono::Utc;
use gritwall_db::ts;
use gritwall_types::api::{ShamedEntry, ThrowItemRequest};
use gritwall_types::models::EffectType;
use uuid::Uuid;

use crate::Engine;
use crate::error::{EngineError, EngineResult};
use crate::format;

fn effect_column(effect: EffectType) -> &'static str {
    match effect {
        EffectType::Tomato => "effect_tomato",
        EffectType::Egg => "effect_egg",
        EffectType::Poop => "effect_poop",
    }
}

impl Engine {
    pub fn shame_list(&self) -> EngineResult<Vec<ShamedEntry>> {
        let now = ts::to_store(Utc::now());
        let rows = self.db().shame_list(&now, self.config().shame_list_cap)?;
        rows.iter().map(format::format_shame_entry).collect()
    }

    pub fn shame_list_for_challenge(
        &self,
        challenge_id: Uuid,
    ) -> EngineResult<Vec<ShamedEntry>> {
        let now = ts::to_store(Utc::now());
        let rows = self
            .db()
            .shame_list_for_challenge(&challenge_id.to_string(), &now)?;
        rows.iter().map(format::format_shame_entry).collect()
    }

    /// Throws produce at a shamed participant. The shame condition is checked
    /// in the same statement as the increment, so a result release racing the
    /// throw can never credit produce to an innocent row.
    pub fn throw_item(&self, user_id: Uuid, req: ThrowItemRequest) -> EngineResult<ShamedEntry> {
        if req.count < 1 {
            return Err(EngineError::InvalidState("count must be at least 1"));
        }
        self.db()
            .get_user_by_id(&user_id.to_string())?
            .ok_or(EngineError::NotFound("user not found"))?;

        let cid = req.challenge_id.to_string();
        let target = req.target_user_id.to_string();
        let hit = self
            .db()
            .increment_effect(&cid, &target, effect_column(req.effect), req.count)?;
        if !hit {
            return Err(EngineError::InvalidState("target is not shamed"));
        }

        let now = ts::to_store(Utc::now());
        let row = self
            .db()
            .shame_entry(&target, &cid, &now)?
            .ok_or(EngineError::NotFound("target is not shamed"))?;
        let entry = format::format_shame_entry(&row)?;

        self.fanout().broadcast(
            gritwall_types::events::GatewayEvent::ShameListUpdate(vec![entry.clone()]),
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use gritwall_types::api::{ShameType, ThrowItemRequest};
    use gritwall_types::models::EffectType;
    use uuid::Uuid;

    use crate::error::EngineError;
    use crate::testutil::{challenge, engine, shield, user};

    /// Ended, released challenge with every listed user joined and idle.
    fn released_challenge(e: &crate::Engine, members: &[Uuid]) -> Uuid {
        let cid = challenge(
            e,
            members[0],
            members,
            Duration::hours(-4),
            Duration::hours(-2),
        );
        let end = e
            .db()
            .get_challenge(&cid.to_string())
            .unwrap()
            .unwrap()
            .end_at;
        assert!(e.db().release_results(&cid.to_string(), &end).unwrap());
        cid
    }

    #[test]
    fn failures_land_on_the_wall_after_release() {
        let e = engine();
        let slacker = user(&e, "slacker");
        let cid = released_challenge(&e, &[slacker]);

        let wall = e.shame_list().unwrap();
        assert_eq!(wall.len(), 1);
        assert_eq!(wall[0].id, format!("{}:{}", slacker, cid));
        assert_eq!(wall[0].shame_type, ShameType::Shame);
    }

    #[test]
    fn unreleased_challenges_stay_off_the_wall() {
        let e = engine();
        let slacker = user(&e, "slacker");
        challenge(
            &e,
            slacker,
            &[slacker],
            Duration::hours(-2),
            Duration::minutes(-10),
        );

        assert!(e.shame_list().unwrap().is_empty());
    }

    #[test]
    fn protec_keeps_a_failure_off_the_wall() {
        let e = engine();
        let slacker = user(&e, "slacker");
        let shielded = user(&e, "shielded");
        let accuser = user(&e, "accuser");
        let cid = released_challenge(&e, &[slacker, shielded, accuser]);
        shield(&e, cid, shielded);

        // Accusations pile up, but the shield keeps the entry off the wall.
        e.db()
            .insert_vote(&cid.to_string(), &shielded.to_string(), &slacker.to_string())
            .unwrap();
        e.db()
            .insert_vote(&cid.to_string(), &shielded.to_string(), &accuser.to_string())
            .unwrap();

        let wall = e.shame_list().unwrap();
        let ids: Vec<&str> = wall.iter().map(|s| s.id.as_str()).collect();
        assert!(ids.contains(&format!("{}:{}", slacker, cid).as_str()));
        assert!(!ids.iter().any(|id| id.starts_with(&shielded.to_string())));
    }

    #[test]
    fn throwing_produce_sticks_and_spares_the_innocent() {
        let e = engine();
        let slacker = user(&e, "slacker");
        let thrower = user(&e, "thrower");
        let cid = released_challenge(&e, &[slacker]);

        let entry = e
            .throw_item(
                thrower,
                ThrowItemRequest {
                    effect: EffectType::Tomato,
                    challenge_id: cid,
                    target_user_id: slacker,
                    count: 3,
                },
            )
            .unwrap();
        assert_eq!(entry.effect.tomato, 3);
        assert_eq!(entry.effect.egg, 0);

        // The thrower is not shamed and cannot be hit.
        assert!(matches!(
            e.throw_item(
                thrower,
                ThrowItemRequest {
                    effect: EffectType::Egg,
                    challenge_id: cid,
                    target_user_id: thrower,
                    count: 1,
                },
            ),
            Err(EngineError::InvalidState(_))
        ));
    }
}
