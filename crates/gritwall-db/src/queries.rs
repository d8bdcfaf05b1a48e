use crate::Database;
use crate::models::{
    ChallengeDetail, ChallengeRow, ContactRow, LeaderboardRow, ParticipantDetail, ParticipantRow,
    ShameRow, UserRow, VoteRow,
};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

const USER_COLS: &str = "id, email, password, username, name, avatar_animal, avatar_bg, \
     avatar_color, points, powerup_grief_count, powerup_protec_count, created_at";

const CHALLENGE_COLS: &str = "id, title, description, start_at, end_at, type, invite_type, \
     owner_id, result_released_at, rewards_released_at, is_featured, feature_rank, image_url";

const PARTICIPANT_COLS: &str = "challenge_id, user_id, joined_at, completed_at, has_been_vetoed, \
     applied_protec, griefed_by_user_id, evidence_link, effect_tomato, effect_egg, effect_poop";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password) VALUES (?1, ?2, ?3)",
                (id, email, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE email = ?1"))?;
            Ok(stmt.query_row([email], |row| user_at(row, 0)).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn update_profile(
        &self,
        id: &str,
        username: &str,
        name: &str,
        avatar_animal: &str,
        avatar_bg: &str,
        avatar_color: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users
                 SET username = ?2, name = ?3, avatar_animal = ?4, avatar_bg = ?5, avatar_color = ?6
                 WHERE id = ?1",
                params![id, username, name, avatar_animal, avatar_bg, avatar_color],
            )?;
            Ok(n == 1)
        })
    }

    /// Filters `ids` down to users whose profile is fully initialised.
    pub fn complete_profile_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id FROM users
                 WHERE id IN ({})
                   AND username IS NOT NULL AND name IS NOT NULL
                   AND avatar_animal IS NOT NULL AND avatar_bg IS NOT NULL
                   AND avatar_color IS NOT NULL",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let sql_params: Vec<&dyn rusqlite::types::ToSql> = ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let rows = stmt
                .query_map(sql_params.as_slice(), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Spends points on a powerup. Atomic: fails (returns false) when the
    /// balance is short, without touching either column.
    pub fn purchase_powerup(
        &self,
        user_id: &str,
        grief: bool,
        count: i64,
        total_cost: i64,
    ) -> Result<bool> {
        let column = if grief {
            "powerup_grief_count"
        } else {
            "powerup_protec_count"
        };
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                &format!(
                    "UPDATE users SET points = points - ?2, {column} = {column} + ?3
                     WHERE id = ?1 AND points >= ?2"
                ),
                params![user_id, total_cost, count],
            )?;
            Ok(n == 1)
        })
    }

    // -- Challenges --

    /// Inserts the challenge together with its initial participant set.
    pub fn insert_challenge(
        &self,
        ch: &ChallengeRow,
        participants: &[(String, Option<String>)],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO challenges ({CHALLENGE_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    ch.id,
                    ch.title,
                    ch.description,
                    ch.start_at,
                    ch.end_at,
                    ch.challenge_type,
                    ch.invite_type,
                    ch.owner_id,
                    ch.result_released_at,
                    ch.rewards_released_at,
                    ch.is_featured,
                    ch.feature_rank,
                    ch.image_url,
                ],
            )?;
            for (user_id, joined_at) in participants {
                tx.execute(
                    "INSERT OR IGNORE INTO participants (challenge_id, user_id, joined_at)
                     VALUES (?1, ?2, ?3)",
                    params![ch.id, user_id, joined_at],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_challenge(&self, id: &str) -> Result<Option<ChallengeRow>> {
        self.with_conn(|conn| query_challenge(conn, id))
    }

    /// The full entity graph for one challenge: challenge + owner +
    /// participants with their users and griefers.
    pub fn get_challenge_detail(&self, id: &str) -> Result<Option<ChallengeDetail>> {
        self.with_conn(|conn| {
            let Some(challenge) = query_challenge(conn, id)? else {
                return Ok(None);
            };
            let Some(owner) = query_user_by_id(conn, &challenge.owner_id)? else {
                return Ok(None);
            };
            let participants = query_participant_details(conn, id)?;
            Ok(Some(ChallengeDetail {
                challenge,
                owner,
                participants,
            }))
        })
    }

    /// Applies field updates and inserts newly invited participants in one
    /// transaction.
    pub fn update_challenge(
        &self,
        id: &str,
        title: &str,
        description: Option<&str>,
        start_at: Option<&str>,
        end_at: &str,
        challenge_type: &str,
        new_participants: &[String],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE challenges
                 SET title = ?2, description = ?3, start_at = ?4, end_at = ?5, type = ?6
                 WHERE id = ?1",
                params![id, title, description, start_at, end_at, challenge_type],
            )?;
            for user_id in new_participants {
                tx.execute(
                    "INSERT OR IGNORE INTO participants (challenge_id, user_id) VALUES (?1, ?2)",
                    params![id, user_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Challenge IDs the user participates in, ordered by challenge start.
    pub fn challenge_ids_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.challenge_id
                 FROM participants p
                 JOIN challenges c ON c.id = p.challenge_id
                 WHERE p.user_id = ?1
                 ORDER BY c.start_at ASC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Public challenges that have not started yet, busiest first.
    pub fn public_upcoming_challenge_ids(&self, now: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id
                 FROM challenges c
                 WHERE c.invite_type = 'PUBLIC'
                   AND c.start_at IS NOT NULL AND c.start_at >= ?1
                   AND c.end_at > ?1
                 ORDER BY (SELECT COUNT(*) FROM participants p WHERE p.challenge_id = c.id) DESC,
                          c.title DESC",
            )?;
            let rows = stmt
                .query_map([now], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn search_public_challenge_ids(&self, query: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM challenges
                 WHERE invite_type = 'PUBLIC' AND title LIKE '%' || ?1 || '%'
                 ORDER BY title ASC",
            )?;
            let rows = stmt
                .query_map([query], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Challenges whose end lies in the future — their jobs need registering
    /// at boot.
    pub fn challenges_ending_after(&self, now: &str) -> Result<Vec<ChallengeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHALLENGE_COLS} FROM challenges WHERE end_at >= ?1"
            ))?;
            let rows = stmt
                .query_map([now], |row| challenge_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Challenges whose reward window contains "now" — their reward job may
    /// have fired while the process was down.
    pub fn challenges_in_reward_window(&self, window_start: &str, now: &str) -> Result<Vec<ChallengeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHALLENGE_COLS} FROM challenges
                 WHERE end_at <= ?2 AND end_at >= ?1"
            ))?;
            let rows = stmt
                .query_map([window_start, now], |row| challenge_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Stamps result_released_at. Returns false when already stamped, making
    /// double-fired timers harmless.
    pub fn release_results(&self, id: &str, released_at: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE challenges SET result_released_at = ?2
                 WHERE id = ?1 AND result_released_at IS NULL",
                params![id, released_at],
            )?;
            Ok(n == 1)
        })
    }

    /// Credits the completion reward to every eligible participant and stamps
    /// rewards_released_at, all in one transaction. Returns None when the
    /// stamp was already set (duplicate timer delivery), otherwise the list
    /// of rewarded user IDs.
    pub fn distribute_rewards(
        &self,
        challenge_id: &str,
        reward: i64,
        period_cap: i64,
        period_start: &str,
        now: &str,
    ) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let stamped = tx.execute(
                "UPDATE challenges SET rewards_released_at = ?2
                 WHERE id = ?1 AND rewards_released_at IS NULL",
                params![challenge_id, now],
            )?;
            if stamped == 0 {
                return Ok(None);
            }

            let eligible: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT user_id FROM participants
                     WHERE challenge_id = ?1
                       AND joined_at IS NOT NULL
                       AND completed_at IS NOT NULL
                       AND has_been_vetoed = 0",
                )?;
                stmt.query_map([challenge_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut rewarded = Vec::new();
            for user_id in eligible {
                let earned: i64 = tx.query_row(
                    "SELECT COALESCE(SUM(points), 0) FROM point_awards
                     WHERE user_id = ?1 AND awarded_at >= ?2",
                    params![user_id, period_start],
                    |row| row.get(0),
                )?;
                if earned >= period_cap {
                    continue;
                }
                tx.execute(
                    "UPDATE users SET points = points + ?2 WHERE id = ?1",
                    params![user_id, reward],
                )?;
                tx.execute(
                    "INSERT INTO point_awards (user_id, points, awarded_at) VALUES (?1, ?2, ?3)",
                    params![user_id, reward, now],
                )?;
                rewarded.push(user_id);
            }

            tx.commit()?;
            Ok(Some(rewarded))
        })
    }

    // -- Participants --

    pub fn get_participant(&self, challenge_id: &str, user_id: &str) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PARTICIPANT_COLS} FROM participants
                 WHERE challenge_id = ?1 AND user_id = ?2"
            ))?;
            Ok(stmt
                .query_row(params![challenge_id, user_id], |row| participant_at(row, 0))
                .optional()?)
        })
    }

    /// Marks a pending participant as joined. Returns false when no pending
    /// row matched.
    pub fn set_participant_joined(
        &self,
        challenge_id: &str,
        user_id: &str,
        joined_at: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE participants SET joined_at = ?3
                 WHERE challenge_id = ?1 AND user_id = ?2 AND joined_at IS NULL",
                params![challenge_id, user_id, joined_at],
            )?;
            Ok(n == 1)
        })
    }

    pub fn insert_participant(
        &self,
        challenge_id: &str,
        user_id: &str,
        joined_at: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO participants (challenge_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![challenge_id, user_id, joined_at],
            )?;
            Ok(())
        })
    }

    pub fn delete_participant(&self, challenge_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM participants WHERE challenge_id = ?1 AND user_id = ?2",
                params![challenge_id, user_id],
            )?;
            Ok(n == 1)
        })
    }

    /// Completion: stamp completed_at and credit the reward atomically.
    /// Returns false when the row was no longer completable (raced away).
    pub fn complete_participant(
        &self,
        challenge_id: &str,
        user_id: &str,
        completed_at: &str,
        reward: i64,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE participants SET completed_at = ?3
                 WHERE challenge_id = ?1 AND user_id = ?2
                   AND joined_at IS NOT NULL
                   AND completed_at IS NULL AND has_been_vetoed = 0",
                params![challenge_id, user_id, completed_at],
            )?;
            if n != 1 {
                return Ok(false);
            }
            tx.execute(
                "UPDATE users SET points = points + ?2 WHERE id = ?1",
                params![user_id, reward],
            )?;
            tx.execute(
                "INSERT INTO point_awards (user_id, points, awarded_at) VALUES (?1, ?2, ?3)",
                params![user_id, reward, completed_at],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Grief: spend one unit of the actor's inventory and force the target in
    /// as a joined participant (insert or re-activate). Returns false when the
    /// actor had no grief left.
    pub fn apply_grief(
        &self,
        challenge_id: &str,
        actor_id: &str,
        target_id: &str,
        joined_at: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE users SET powerup_grief_count = powerup_grief_count - 1
                 WHERE id = ?1 AND powerup_grief_count >= 1",
                [actor_id],
            )?;
            if n != 1 {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO participants (challenge_id, user_id, joined_at, griefed_by_user_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (challenge_id, user_id) DO UPDATE
                 SET joined_at = excluded.joined_at,
                     griefed_by_user_id = excluded.griefed_by_user_id",
                params![challenge_id, target_id, joined_at, actor_id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Protec: spend one unit of inventory and shield the participant.
    /// Returns false when the inventory was empty or the shield was already
    /// applied.
    pub fn apply_protec(&self, challenge_id: &str, user_id: &str, applied_at: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE users SET powerup_protec_count = powerup_protec_count - 1
                 WHERE id = ?1 AND powerup_protec_count >= 1",
                [user_id],
            )?;
            if n != 1 {
                return Ok(false);
            }
            let n = tx.execute(
                "UPDATE participants SET applied_protec = ?3
                 WHERE challenge_id = ?1 AND user_id = ?2 AND applied_protec IS NULL",
                params![challenge_id, user_id, applied_at],
            )?;
            if n != 1 {
                return Ok(false);
            }
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn set_evidence(
        &self,
        challenge_id: &str,
        user_id: &str,
        evidence_link: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE participants SET evidence_link = ?3
                 WHERE challenge_id = ?1 AND user_id = ?2 AND joined_at IS NOT NULL",
                params![challenge_id, user_id, evidence_link],
            )?;
            Ok(n == 1)
        })
    }

    pub fn joined_participant_count(&self, challenge_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM participants
                 WHERE challenge_id = ?1 AND joined_at IS NOT NULL",
                [challenge_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Pelts a shamed participant with an item. The shame condition is part of
    /// the UPDATE guard so the counter can never move for a non-shamed row.
    pub fn increment_effect(
        &self,
        challenge_id: &str,
        user_id: &str,
        effect_column: &str,
        count: i64,
    ) -> Result<bool> {
        debug_assert!(matches!(
            effect_column,
            "effect_tomato" | "effect_egg" | "effect_poop"
        ));
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                &format!(
                    "UPDATE participants SET {effect_column} = {effect_column} + ?3
                     WHERE challenge_id = ?1 AND user_id = ?2
                       AND joined_at IS NOT NULL
                       AND applied_protec IS NULL
                       AND (completed_at IS NULL OR has_been_vetoed = 1)
                       AND EXISTS (SELECT 1 FROM challenges c
                                    WHERE c.id = challenge_id
                                      AND c.result_released_at IS NOT NULL)"
                ),
                params![challenge_id, user_id, count],
            )?;
            Ok(n == 1)
        })
    }

    // -- Contacts --

    /// Records a pending friend request. Returns false when the edge already
    /// exists in this direction (pending or accepted).
    pub fn insert_contact(&self, user_id: &str, friend_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO contacts (user_id, friend_id) VALUES (?1, ?2)",
                params![user_id, friend_id],
            )?;
            Ok(n == 1)
        })
    }

    pub fn get_contact(&self, user_id: &str, friend_id: &str) -> Result<Option<ContactRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, friend_id, accepted_at FROM contacts
                 WHERE user_id = ?1 AND friend_id = ?2",
            )?;
            Ok(stmt
                .query_row(params![user_id, friend_id], |row| {
                    Ok(ContactRow {
                        user_id: row.get(0)?,
                        friend_id: row.get(1)?,
                        accepted_at: row.get(2)?,
                    })
                })
                .optional()?)
        })
    }

    /// Accepts a pending request: stamps the requester's edge and writes the
    /// inverse edge in the same transaction, making the friendship mutual.
    /// Returns false when no pending edge matched.
    pub fn accept_contact(&self, requester_id: &str, user_id: &str, accepted_at: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE contacts SET accepted_at = ?3
                 WHERE user_id = ?1 AND friend_id = ?2 AND accepted_at IS NULL",
                params![requester_id, user_id, accepted_at],
            )?;
            if n != 1 {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO contacts (user_id, friend_id, accepted_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id, friend_id) DO UPDATE
                 SET accepted_at = excluded.accepted_at",
                params![user_id, requester_id, accepted_at],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Removes both edges between two users. Covers reject and unfriend;
    /// returns how many edges existed.
    pub fn delete_contact_pair(&self, user_id: &str, other_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM contacts
                 WHERE (user_id = ?1 AND friend_id = ?2)
                    OR (user_id = ?2 AND friend_id = ?1)",
                params![user_id, other_id],
            )?;
            Ok(n)
        })
    }

    /// Users with a pending request towards `user_id`.
    pub fn pending_request_users(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM contacts ct
                 JOIN users u ON u.id = ct.user_id
                 WHERE ct.friend_id = ?1 AND ct.accepted_at IS NULL
                 ORDER BY u.username ASC",
                prefixed_user_cols("u")
            ))?;
            let rows = stmt
                .query_map([user_id], |row| user_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Accepted friends of `user_id`.
    pub fn friends_of(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM contacts ct
                 JOIN users u ON u.id = ct.friend_id
                 WHERE ct.user_id = ?1 AND ct.accepted_at IS NOT NULL
                 ORDER BY u.username ASC",
                prefixed_user_cols("u")
            ))?;
            let rows = stmt
                .query_map([user_id], |row| user_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Votes --

    pub fn vote_exists(&self, challenge_id: &str, victim_id: &str, accuser_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM votes
                 WHERE challenge_id = ?1 AND victim_id = ?2 AND accuser_id = ?3",
                params![challenge_id, victim_id, accuser_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn vote_count(&self, challenge_id: &str, victim_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM votes WHERE challenge_id = ?1 AND victim_id = ?2",
                params![challenge_id, victim_id],
                |row| row.get(0),
            )?)
        })
    }

    pub fn insert_vote(&self, challenge_id: &str, victim_id: &str, accuser_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO votes (challenge_id, victim_id, accuser_id) VALUES (?1, ?2, ?3)",
                params![challenge_id, victim_id, accuser_id],
            )?;
            Ok(())
        })
    }

    /// The majority-crossing vote: record it and mark the victim vetoed in the
    /// same transaction. The protec guard on the UPDATE upholds the invariant
    /// that a shielded participant can never become vetoed.
    pub fn insert_vote_and_veto(
        &self,
        challenge_id: &str,
        victim_id: &str,
        accuser_id: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO votes (challenge_id, victim_id, accuser_id) VALUES (?1, ?2, ?3)",
                params![challenge_id, victim_id, accuser_id],
            )?;
            tx.execute(
                "UPDATE participants SET has_been_vetoed = 1
                 WHERE challenge_id = ?1 AND user_id = ?2 AND applied_protec IS NULL",
                params![challenge_id, victim_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn votes_for_challenge(&self, challenge_id: &str) -> Result<Vec<VoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT challenge_id, victim_id, accuser_id FROM votes WHERE challenge_id = ?1",
            )?;
            let rows = stmt
                .query_map([challenge_id], |row| {
                    Ok(VoteRow {
                        challenge_id: row.get(0)?,
                        victim_id: row.get(1)?,
                        accuser_id: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Shame --

    pub fn shame_entry(&self, user_id: &str, challenge_id: &str, now: &str) -> Result<Option<ShameRow>> {
        let rows = self.query_shame(Some(challenge_id), Some(user_id), now, 1)?;
        Ok(rows.into_iter().next())
    }

    pub fn shame_list(&self, now: &str, limit: u32) -> Result<Vec<ShameRow>> {
        self.query_shame(None, None, now, limit)
    }

    pub fn shame_list_for_challenge(&self, challenge_id: &str, now: &str) -> Result<Vec<ShameRow>> {
        self.query_shame(Some(challenge_id), None, now, u32::MAX)
    }

    fn query_shame(
        &self,
        challenge_id: Option<&str>,
        user_id: Option<&str>,
        now: &str,
        limit: u32,
    ) -> Result<Vec<ShameRow>> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT p.user_id, p.challenge_id, u.name, c.title, p.has_been_vetoed,
                        c.result_released_at, u.avatar_animal, u.avatar_bg, u.avatar_color,
                        p.effect_tomato, p.effect_egg, p.effect_poop
                 FROM participants p
                 JOIN users u ON u.id = p.user_id
                 JOIN challenges c ON c.id = p.challenge_id
                 WHERE c.end_at <= ?1
                   AND c.result_released_at IS NOT NULL
                   AND p.applied_protec IS NULL
                   AND (p.completed_at IS NULL OR p.has_been_vetoed = 1)
                   AND u.name IS NOT NULL AND u.avatar_animal IS NOT NULL
                   AND u.avatar_bg IS NOT NULL AND u.avatar_color IS NOT NULL",
            );
            let mut sql_params: Vec<&dyn rusqlite::types::ToSql> = vec![&now];
            if let Some(cid) = &challenge_id {
                sql.push_str(" AND p.challenge_id = ?2");
                sql_params.push(cid);
            }
            if let Some(uid) = &user_id {
                sql.push_str(&format!(" AND p.user_id = ?{}", sql_params.len() + 1));
                sql_params.push(uid);
            }
            sql.push_str(&format!(
                " ORDER BY c.end_at DESC, u.name ASC, p.challenge_id ASC LIMIT ?{}",
                sql_params.len() + 1
            ));
            sql_params.push(&limit);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(sql_params.as_slice(), |row| {
                    Ok(ShameRow {
                        user_id: row.get(0)?,
                        challenge_id: row.get(1)?,
                        name: row.get(2)?,
                        title: row.get(3)?,
                        has_been_vetoed: row.get(4)?,
                        result_released_at: row.get(5)?,
                        avatar_animal: row.get(6)?,
                        avatar_bg: row.get(7)?,
                        avatar_color: row.get(8)?,
                        effect_tomato: row.get(9)?,
                        effect_egg: row.get(10)?,
                        effect_poop: row.get(11)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Leaderboard --

    /// Users ranked by total failed challenges (failures + vetoes), derived
    /// from the participant rows on every call.
    pub fn global_leaderboard(&self, now: &str, limit: u32) -> Result<Vec<LeaderboardRow>> {
        self.with_conn(|conn| query_leaderboard(conn, None, now, limit))
    }

    /// The leaderboard restricted to `user_id`'s contacts.
    pub fn friend_leaderboard(&self, user_id: &str, now: &str, limit: u32) -> Result<Vec<LeaderboardRow>> {
        self.with_conn(|conn| query_leaderboard(conn, Some(user_id), now, limit))
    }
}

fn query_leaderboard(
    conn: &Connection,
    contacts_of: Option<&str>,
    now: &str,
    limit: u32,
) -> Result<Vec<LeaderboardRow>> {
    let scope = match contacts_of {
        Some(_) => "AND u.id IN (SELECT friend_id FROM contacts WHERE user_id = ?3)",
        None => "",
    };
    let sql = format!(
        "SELECT * FROM (
                    SELECT u.id, u.username, u.name, u.avatar_animal, u.avatar_bg, u.avatar_color,
                        (SELECT COUNT(*) FROM participants p
                          WHERE p.user_id = u.id AND p.completed_at IS NOT NULL
                            AND p.has_been_vetoed = 0) AS completed_count,
                        (SELECT COUNT(*) FROM participants p
                          JOIN challenges c ON c.id = p.challenge_id
                          WHERE p.user_id = u.id AND p.joined_at IS NOT NULL
                            AND p.applied_protec IS NULL AND p.completed_at IS NULL
                            AND c.end_at <= ?1 AND c.result_released_at IS NOT NULL) AS failed_count,
                        (SELECT COUNT(*) FROM participants p
                          WHERE p.user_id = u.id AND p.has_been_vetoed = 1) AS vetoed_count,
                        (SELECT COUNT(*) FROM participants p
                          WHERE p.user_id = u.id AND p.applied_protec IS NOT NULL) AS protec_count
                    FROM users u
                    WHERE u.username IS NOT NULL AND u.name IS NOT NULL
                      AND u.avatar_animal IS NOT NULL AND u.avatar_bg IS NOT NULL
                      AND u.avatar_color IS NOT NULL
                      {scope}
                 )
                 WHERE failed_count + vetoed_count > 0
                 ORDER BY failed_count + vetoed_count DESC, username ASC
                 LIMIT ?2"
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut sql_params: Vec<&dyn rusqlite::types::ToSql> = vec![&now, &limit];
    if let Some(uid) = &contacts_of {
        sql_params.push(uid);
    }
    let rows = stmt
        .query_map(sql_params.as_slice(), |row| {
            Ok(LeaderboardRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                name: row.get(2)?,
                avatar_animal: row.get(3)?,
                avatar_bg: row.get(4)?,
                avatar_color: row.get(5)?,
                completed_count: row.get(6)?,
                failed_count: row.get(7)?,
                vetoed_count: row.get(8)?,
                protec_count: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// USER_COLS with a table alias, for queries where the user table is joined.
fn prefixed_user_cols(alias: &str) -> String {
    USER_COLS
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE id = ?1"))?;
    Ok(stmt.query_row([id], |row| user_at(row, 0)).optional()?)
}

fn query_challenge(conn: &Connection, id: &str) -> Result<Option<ChallengeRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHALLENGE_COLS} FROM challenges WHERE id = ?1"
    ))?;
    Ok(stmt.query_row([id], |row| challenge_at(row, 0)).optional()?)
}

fn query_participant_details(conn: &Connection, challenge_id: &str) -> Result<Vec<ParticipantDetail>> {
    // One JOIN pulls participant, user and (optional) griefer per row.
    let mut stmt = conn.prepare(
        "SELECT p.challenge_id, p.user_id, p.joined_at, p.completed_at, p.has_been_vetoed,
                p.applied_protec, p.griefed_by_user_id, p.evidence_link,
                p.effect_tomato, p.effect_egg, p.effect_poop,
                u.id, u.email, u.password, u.username, u.name, u.avatar_animal, u.avatar_bg,
                u.avatar_color, u.points, u.powerup_grief_count, u.powerup_protec_count,
                u.created_at,
                g.id, g.email, g.password, g.username, g.name, g.avatar_animal, g.avatar_bg,
                g.avatar_color, g.points, g.powerup_grief_count, g.powerup_protec_count,
                g.created_at
         FROM participants p
         JOIN users u ON u.id = p.user_id
         LEFT JOIN users g ON g.id = p.griefed_by_user_id
         WHERE p.challenge_id = ?1",
    )?;

    let rows = stmt
        .query_map([challenge_id], |row| {
            let participant = participant_at(row, 0)?;
            let user = user_at(row, 11)?;
            let griefed_by = match row.get::<_, Option<String>>(23)? {
                Some(_) => Some(user_at(row, 23)?),
                None => None,
            };
            Ok(ParticipantDetail {
                participant,
                user,
                griefed_by,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn user_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(base)?,
        email: row.get(base + 1)?,
        password: row.get(base + 2)?,
        username: row.get(base + 3)?,
        name: row.get(base + 4)?,
        avatar_animal: row.get(base + 5)?,
        avatar_bg: row.get(base + 6)?,
        avatar_color: row.get(base + 7)?,
        points: row.get(base + 8)?,
        powerup_grief_count: row.get(base + 9)?,
        powerup_protec_count: row.get(base + 10)?,
        created_at: row.get(base + 11)?,
    })
}

fn challenge_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<ChallengeRow> {
    Ok(ChallengeRow {
        id: row.get(base)?,
        title: row.get(base + 1)?,
        description: row.get(base + 2)?,
        start_at: row.get(base + 3)?,
        end_at: row.get(base + 4)?,
        challenge_type: row.get(base + 5)?,
        invite_type: row.get(base + 6)?,
        owner_id: row.get(base + 7)?,
        result_released_at: row.get(base + 8)?,
        rewards_released_at: row.get(base + 9)?,
        is_featured: row.get(base + 10)?,
        feature_rank: row.get(base + 11)?,
        image_url: row.get(base + 12)?,
    })
}

fn participant_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        challenge_id: row.get(base)?,
        user_id: row.get(base + 1)?,
        joined_at: row.get(base + 2)?,
        completed_at: row.get(base + 3)?,
        has_been_vetoed: row.get(base + 4)?,
        applied_protec: row.get(base + 5)?,
        griefed_by_user_id: row.get(base + 6)?,
        evidence_link: row.get(base + 7)?,
        effect_tomato: row.get(base + 8)?,
        effect_egg: row.get(base + 9)?,
        effect_poop: row.get(base + 10)?,
    })
}
