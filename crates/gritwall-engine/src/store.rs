//! Point store and the failure leaderboard.

use chrono::Utc;
use gritwall_db::models::LeaderboardRow;
use gritwall_db::ts;
use gritwall_types::api::LeaderboardEntry;
use gritwall_types::models::{Avatar, PowerUp};
use tracing::info;
use uuid::Uuid;

use crate::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    /// Buys `count` powerups of one kind. Point balance and inventory move in
    /// a single guarded statement, so concurrent purchases cannot overspend.
    pub fn buy_powerup(&self, user_id: Uuid, powerup: PowerUp, count: i64) -> EngineResult<()> {
        if count < 1 {
            return Err(EngineError::InvalidState("count must be at least 1"));
        }

        let uid = user_id.to_string();
        let user = self
            .db()
            .get_user_by_id(&uid)?
            .ok_or(EngineError::NotFound("user not found"))?;

        let price = match powerup {
            PowerUp::Grief => self.config().grief_price,
            PowerUp::Protec => self.config().protec_price,
        };
        let total = price
            .checked_mul(count)
            .ok_or(EngineError::InvalidState("count is out of range"))?;
        if user.points < total {
            return Err(EngineError::InsufficientPoints);
        }

        let bought =
            self.db()
                .purchase_powerup(&uid, matches!(powerup, PowerUp::Grief), count, total)?;
        if !bought {
            return Err(EngineError::InsufficientPoints);
        }

        info!("User {} bought {} {:?} powerup(s)", user_id, count, powerup);
        Ok(())
    }

    /// Users ranked by how often they have failed, most failures first.
    pub fn global_leaderboard(&self) -> EngineResult<Vec<LeaderboardEntry>> {
        let now = ts::to_store(Utc::now());
        let rows = self
            .db()
            .global_leaderboard(&now, self.config().leaderboard_cap)?;
        rows.iter().map(leaderboard_entry).collect()
    }
}

pub(crate) fn leaderboard_entry(row: &LeaderboardRow) -> EngineResult<LeaderboardEntry> {
    let user_id = Uuid::parse_str(&row.user_id)
        .map_err(|e| EngineError::Storage(anyhow::anyhow!("corrupt user id: {}", e)))?;
    Ok(LeaderboardEntry {
        user_id,
        username: row.username.clone(),
        name: row.name.clone(),
        avatar: Avatar {
            animal: row.avatar_animal.clone(),
            background: row.avatar_bg.clone(),
            color: row.avatar_color.clone(),
        },
        completed_challenge_count: row.completed_count,
        failed_challenge_count: row.failed_count,
        vetoed_challenge_count: row.vetoed_count,
        protec_count: row.protec_count,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use gritwall_types::models::PowerUp;
    use uuid::Uuid;

    use crate::error::EngineError;
    use crate::testutil::{challenge, engine, give_points, points_of, user};

    #[test]
    fn purchases_respect_the_balance() {
        let e = engine();
        let buyer = user(&e, "buyer");

        assert!(matches!(
            e.buy_powerup(buyer, PowerUp::Grief, 1),
            Err(EngineError::InsufficientPoints)
        ));

        give_points(&e, buyer, 1000);
        e.buy_powerup(buyer, PowerUp::Grief, 2).unwrap();
        assert_eq!(points_of(&e, buyer), 0);
        assert_eq!(
            e.user_profile(buyer).unwrap().powerups.grief,
            2
        );

        assert!(matches!(
            e.buy_powerup(buyer, PowerUp::Protec, 1),
            Err(EngineError::InsufficientPoints)
        ));
    }

    #[test]
    fn zero_count_purchase_is_rejected() {
        let e = engine();
        let buyer = user(&e, "buyer");
        give_points(&e, buyer, 1000);
        assert!(matches!(
            e.buy_powerup(buyer, PowerUp::Grief, 0),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn leaderboard_ranks_by_failures() {
        let e = engine();
        let serial = user(&e, "serial");
        let casual = user(&e, "casual");
        let clean = user(&e, "clean");

        // Two released failures for serial, one for casual, none for clean.
        release(&e, &[serial, casual]);
        release(&e, &[serial]);
        release_completed(&e, clean);

        let board = e.global_leaderboard().unwrap();
        let ids: Vec<Uuid> = board.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![serial, casual]);
        assert_eq!(board[0].failed_challenge_count, 2);
        assert_eq!(board[1].failed_challenge_count, 1);
    }

    fn release(e: &crate::Engine, members: &[Uuid]) -> Uuid {
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

    fn release_completed(e: &crate::Engine, who: Uuid) {
        let cid = challenge(e, who, &[who], Duration::hours(-3), Duration::hours(1));
        e.complete_challenge(who, cid).unwrap();
        e.db()
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE challenges SET end_at = ?1, result_released_at = ?1 WHERE id = ?2",
                    rusqlite::params![
                        gritwall_db::ts::to_store(chrono::Utc::now() - Duration::hours(2)),
                        cid.to_string()
                    ],
                )?;
                Ok(())
            })
            .unwrap();
    }
}
