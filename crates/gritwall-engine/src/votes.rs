//! Accusation voting and the veto consensus rule.
//!
//! After a challenge ends, participants who marked themselves complete may be
//! accused of cheating by the others. A participant is vetoed the moment the
//! accusations against them cross half the joined headcount; the veto strips
//! the completion and puts them on the wall of shame as a cheater.

use chrono::Utc;
use gritwall_db::ts;
use gritwall_types::api::{VoteData, VoteVictim};
use gritwall_types::events::GatewayEvent;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Engine;
use crate::error::{EngineError, EngineResult};
use crate::format;

/// Voting requires enough participants for a meaningful majority.
const MIN_VOTERS: i64 = 3;

impl Engine {
    /// Records one accusation. Returns the victim's id when this vote was the
    /// one that crossed the veto threshold, `None` otherwise.
    ///
    /// The threshold is half the joined headcount; the veto fires exactly on
    /// the crossing vote, so a second timer or a re-sent request can never
    /// veto twice.
    pub fn submit_vote(
        &self,
        accuser_id: Uuid,
        challenge_id: Uuid,
        victim_id: Uuid,
    ) -> EngineResult<Option<Uuid>> {
        if accuser_id == victim_id {
            return Err(EngineError::InvalidState("cannot vote against yourself"));
        }

        let cid = challenge_id.to_string();
        let accuser_key = accuser_id.to_string();
        let victim_key = victim_id.to_string();

        self.db()
            .get_participant(&cid, &accuser_key)?
            .filter(|p| p.has_joined())
            .ok_or(EngineError::NotFound("participant not found"))?;
        let victim = self
            .db()
            .get_participant(&cid, &victim_key)?
            .filter(|p| p.has_joined())
            .ok_or(EngineError::NotFound("participant not found"))?;
        if victim.is_protected() {
            return Err(EngineError::InvalidState(
                "protected participants cannot be voted against",
            ));
        }

        let c = self.challenge_row(challenge_id)?;
        let now = Utc::now();
        let end_at = ts::parse(&c.end_at)?;
        if !format::in_voting_window(end_at, now, self.config().voting_window) {
            return Err(EngineError::InvalidState("voting window is not open"));
        }

        if self.db().vote_exists(&cid, &victim_key, &accuser_key)? {
            return Err(EngineError::Conflict(
                "already voted against this participant",
            ));
        }

        let joined = self.db().joined_participant_count(&cid)?;
        if joined < MIN_VOTERS {
            return Err(EngineError::InvalidState(
                "not enough participants for voting",
            ));
        }

        let midpoint = joined as f64 / 2.0;
        let pre = self.db().vote_count(&cid, &victim_key)? as f64;

        if pre < midpoint && pre + 1.0 >= midpoint {
            self.db()
                .insert_vote_and_veto(&cid, &victim_key, &accuser_key)?;
            info!(
                "Participant {} of {} vetoed ({} of {} voters)",
                victim_id,
                challenge_id,
                pre + 1.0,
                joined
            );
            self.notify_vetoed(challenge_id, victim_id);
            Ok(Some(victim_id))
        } else {
            self.db().insert_vote(&cid, &victim_key, &accuser_key)?;
            Ok(None)
        }
    }

    /// The voting screen: every joined participant with the set of accusers
    /// already against them. Protected participants still appear (flagged),
    /// they just cannot be voted against. Only participants may look.
    pub fn get_votes(&self, user_id: Uuid, challenge_id: Uuid) -> EngineResult<Vec<VoteData>> {
        let cid = challenge_id.to_string();
        self.db()
            .get_participant(&cid, &user_id.to_string())?
            .filter(|p| p.has_joined())
            .ok_or(EngineError::NotFound("participant not found"))?;

        let detail = self
            .db()
            .get_challenge_detail(&cid)?
            .ok_or(EngineError::NotFound("challenge not found"))?;
        let votes = self.db().votes_for_challenge(&cid)?;

        let mut out = Vec::new();
        for p in &detail.participants {
            let row = &p.participant;
            if !row.has_joined() {
                continue;
            }
            let (Some(username), Some(name)) = (p.user.username.clone(), p.user.name.clone())
            else {
                continue;
            };
            let Ok(uid) = Uuid::parse_str(&row.user_id) else {
                continue;
            };

            let accusers = votes
                .iter()
                .filter(|v| v.victim_id == row.user_id)
                .filter_map(|v| Uuid::parse_str(&v.accuser_id).ok())
                .collect();

            out.push(VoteData {
                victim: VoteVictim {
                    user_id: uid,
                    username,
                    name,
                    has_protec: row.is_protected(),
                    evidence_link: row.evidence_link.clone(),
                },
                accusers,
            });
        }
        Ok(out)
    }

    /// A fresh veto means a fresh cheater on the wall; push the entry out
    /// along with the updated room view.
    fn notify_vetoed(&self, challenge_id: Uuid, victim_id: Uuid) {
        self.notify_room(challenge_id);
        let now = ts::to_store(Utc::now());
        match self
            .db()
            .shame_entry(&victim_id.to_string(), &challenge_id.to_string(), &now)
        {
            Ok(Some(row)) => match format::format_shame_entry(&row) {
                Ok(entry) => self
                    .fanout()
                    .broadcast(GatewayEvent::ShameListUpdate(vec![entry])),
                Err(e) => warn!("Shame entry for {} unreadable: {}", victim_id, e),
            },
            // Results not released yet; the entry ships with the release.
            Ok(None) => {}
            Err(e) => warn!("Shame lookup for {} failed: {}", victim_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use crate::error::EngineError;
    use crate::testutil::{challenge, engine, shield, user};

    /// Challenge that ended ten minutes ago: mid voting window.
    fn voting_challenge(e: &crate::Engine, members: &[Uuid]) -> Uuid {
        challenge(
            e,
            members[0],
            members,
            Duration::hours(-2),
            Duration::minutes(-10),
        )
    }

    #[test]
    fn veto_fires_exactly_on_the_crossing_vote() {
        let e = engine();
        let users: Vec<Uuid> = (0..5).map(|i| user(&e, &format!("u{i}"))).collect();
        let cid = voting_challenge(&e, &users);
        let victim = users[4];

        // Midpoint of 5 joined is 2.5; votes 1 and 2 must not veto.
        assert_eq!(e.submit_vote(users[0], cid, victim).unwrap(), None);
        assert_eq!(e.submit_vote(users[1], cid, victim).unwrap(), None);
        assert_eq!(e.submit_vote(users[2], cid, victim).unwrap(), Some(victim));

        let p = e
            .db()
            .get_participant(&cid.to_string(), &victim.to_string())
            .unwrap()
            .unwrap();
        assert!(p.has_been_vetoed);

        // A fourth vote lands past the threshold and must not re-veto.
        assert_eq!(e.submit_vote(users[3], cid, victim).unwrap(), None);
    }

    #[test]
    fn even_headcount_vetoes_at_exactly_half() {
        let e = engine();
        let users: Vec<Uuid> = (0..4).map(|i| user(&e, &format!("u{i}"))).collect();
        let cid = voting_challenge(&e, &users);
        let victim = users[3];

        // Midpoint of 4 joined is 2.0; the second vote crosses it.
        assert_eq!(e.submit_vote(users[0], cid, victim).unwrap(), None);
        assert_eq!(e.submit_vote(users[1], cid, victim).unwrap(), Some(victim));
    }

    #[test]
    fn duplicate_vote_is_a_conflict() {
        let e = engine();
        let users: Vec<Uuid> = (0..5).map(|i| user(&e, &format!("u{i}"))).collect();
        let cid = voting_challenge(&e, &users);

        e.submit_vote(users[0], cid, users[4]).unwrap();
        assert!(matches!(
            e.submit_vote(users[0], cid, users[4]),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn self_vote_is_rejected() {
        let e = engine();
        let users: Vec<Uuid> = (0..3).map(|i| user(&e, &format!("u{i}"))).collect();
        let cid = voting_challenge(&e, &users);

        assert!(matches!(
            e.submit_vote(users[0], cid, users[0]),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn protec_shields_from_votes() {
        let e = engine();
        let users: Vec<Uuid> = (0..4).map(|i| user(&e, &format!("u{i}"))).collect();
        let cid = voting_challenge(&e, &users);
        shield(&e, cid, users[3]);

        assert!(matches!(
            e.submit_vote(users[0], cid, users[3]),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn two_participants_cannot_vote() {
        let e = engine();
        let users: Vec<Uuid> = (0..2).map(|i| user(&e, &format!("u{i}"))).collect();
        let cid = voting_challenge(&e, &users);

        assert!(matches!(
            e.submit_vote(users[0], cid, users[1]),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn window_boundaries_gate_votes() {
        let e = engine();
        let users: Vec<Uuid> = (0..3).map(|i| user(&e, &format!("u{i}"))).collect();

        // Still ongoing.
        let open = challenge(&e, users[0], &users, Duration::hours(-1), Duration::hours(1));
        assert!(matches!(
            e.submit_vote(users[0], open, users[1]),
            Err(EngineError::InvalidState(_))
        ));

        // Window closed two hours after a 60-minute window opened.
        let stale = challenge(&e, users[0], &users, Duration::hours(-4), Duration::hours(-2));
        assert!(matches!(
            e.submit_vote(users[0], stale, users[1]),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn vote_list_covers_every_joined_participant() {
        let e = engine();
        let users: Vec<Uuid> = (0..4).map(|i| user(&e, &format!("u{i}"))).collect();
        let cid = voting_challenge(&e, &users);
        shield(&e, cid, users[2]);

        e.submit_vote(users[0], cid, users[3]).unwrap();
        let votes = e.get_votes(users[1], cid).unwrap();
        assert_eq!(votes.len(), 4);

        let against = votes
            .iter()
            .find(|v| v.victim.user_id == users[3])
            .unwrap();
        assert_eq!(against.accusers, vec![users[0]]);
        assert!(!against.victim.has_protec);

        // Shielded participants stay in the tally view, flagged as such.
        let shielded = votes
            .iter()
            .find(|v| v.victim.user_id == users[2])
            .unwrap();
        assert!(shielded.victim.has_protec);
        assert!(shielded.accusers.is_empty());

        // Outsiders may not look.
        let outsider = user(&e, "outsider");
        assert!(matches!(
            e.get_votes(outsider, cid),
            Err(EngineError::NotFound(_))
        ));
    }
}
