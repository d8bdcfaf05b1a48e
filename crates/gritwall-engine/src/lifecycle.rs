//! Challenge lifecycle: creation, acceptance, rejection, completion, edits,
//! powerups, and the two scheduled transitions (result release and reward
//! distribution).

use std::sync::Arc;

use chrono::Utc;
use gritwall_db::models::ChallengeRow;
use gritwall_db::ts;
use gritwall_types::api::{
    ChallengeData, ChallengeList, CreateChallengeRequest, PublicChallengeList,
    UpdateChallengeRequest,
};
use gritwall_types::events::GatewayEvent;
use gritwall_types::models::InviteType;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Engine;
use crate::error::{EngineError, EngineResult};
use crate::format::{self, Phase};
use crate::scheduler::{JobDescriptor, JobKind};

impl Engine {
    // -- Creation & edits --

    pub async fn create_challenge(
        self: &Arc<Self>,
        owner_id: Uuid,
        req: CreateChallengeRequest,
    ) -> EngineResult<ChallengeData> {
        if let Some(start) = req.start_at {
            if start >= req.end_at {
                return Err(EngineError::InvalidState(
                    "challenge start must precede its end",
                ));
            }
        }

        let owner_key = owner_id.to_string();
        let invited: Vec<String> = req
            .participants
            .iter()
            .filter(|id| **id != owner_id)
            .map(|id| id.to_string())
            .collect();
        // Users without a finished profile are silently dropped, the same way
        // they are invisible to invite search.
        let invited = self.db().complete_profile_ids(&invited)?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        let row = ChallengeRow {
            id: id.to_string(),
            title: req.title,
            description: req.description,
            start_at: req.start_at.map(ts::to_store),
            end_at: ts::to_store(req.end_at),
            challenge_type: req.challenge_type.as_str().to_string(),
            invite_type: req
                .invite_type
                .unwrap_or(InviteType::Private)
                .as_str()
                .to_string(),
            owner_id: owner_key.clone(),
            result_released_at: None,
            rewards_released_at: None,
            is_featured: false,
            feature_rank: None,
            image_url: None,
        };

        let mut participants: Vec<(String, Option<String>)> = vec![(
            owner_key,
            Some(ts::to_store(now)),
        )];
        participants.extend(invited.into_iter().map(|uid| (uid, None)));

        self.db().insert_challenge(&row, &participants)?;
        self.register_jobs(id, req.end_at).await;
        info!("Challenge {} created, ends at {}", id, req.end_at);

        self.get_challenge(id)
    }

    pub async fn update_challenge(
        self: &Arc<Self>,
        owner_id: Uuid,
        challenge_id: Uuid,
        req: UpdateChallengeRequest,
    ) -> EngineResult<ChallengeData> {
        let current = self.challenge_row(challenge_id)?;
        if current.owner_id != owner_id.to_string() {
            return Err(EngineError::NotFound("challenge not found"));
        }

        let start_at = match req.start_at {
            Some(s) => Some(s),
            None => ts::parse_opt(current.start_at.as_deref())?,
        };
        let current_end = ts::parse(&current.end_at)?;
        let end_at = req.end_at.unwrap_or(current_end);
        if let Some(start) = start_at {
            if start >= end_at {
                return Err(EngineError::InvalidState(
                    "challenge start must precede its end",
                ));
            }
        }

        let title = req.title.unwrap_or(current.title);
        let description = req.description.or(current.description);
        let challenge_type = req
            .challenge_type
            .map(|t| t.as_str().to_string())
            .unwrap_or(current.challenge_type);

        // Diff-based participant additions: never touch the owner, never add
        // half-initialised users, never duplicate existing rows.
        let mut added: Vec<String> = Vec::new();
        if let Some(requested) = req.participants {
            let existing: Vec<String> = self
                .db()
                .get_challenge_detail(&challenge_id.to_string())?
                .ok_or(EngineError::NotFound("challenge not found"))?
                .participants
                .iter()
                .map(|p| p.participant.user_id.clone())
                .collect();

            let candidates: Vec<String> = requested
                .iter()
                .filter(|id| **id != owner_id)
                .map(|id| id.to_string())
                .filter(|id| !existing.contains(id))
                .collect();
            added = self.db().complete_profile_ids(&candidates)?;
        }

        self.db().update_challenge(
            &challenge_id.to_string(),
            &title,
            description.as_deref(),
            start_at.map(ts::to_store).as_deref(),
            &ts::to_store(end_at),
            &challenge_type,
            &added,
        )?;

        if end_at != current_end {
            self.scheduler()
                .reschedule(
                    JobDescriptor::new(challenge_id, JobKind::ReleaseResults),
                    end_at,
                    self.clone(),
                )
                .await;
            self.scheduler()
                .reschedule(
                    JobDescriptor::new(challenge_id, JobKind::ReleaseRewards),
                    self.reward_fire_time(end_at),
                    self.clone(),
                )
                .await;
        }

        self.notify_room(challenge_id);
        self.get_challenge(challenge_id)
    }

    // -- Invitation responses --

    pub fn accept_challenge(&self, user_id: Uuid, challenge_id: Uuid) -> EngineResult<()> {
        let user = self
            .db()
            .get_user_by_id(&user_id.to_string())?
            .ok_or(EngineError::NotFound("user not found"))?;
        if !user.is_profile_complete() {
            return Err(EngineError::NotFound("user profile not initialised"));
        }
        self.challenge_row(challenge_id)?;

        let cid = challenge_id.to_string();
        let uid = user_id.to_string();
        let now = ts::to_store(Utc::now());
        match self.db().get_participant(&cid, &uid)? {
            Some(p) if p.has_joined() => {} // repeated accept is a no-op
            Some(_) => {
                self.db().set_participant_joined(&cid, &uid, &now)?;
            }
            // Row may be missing when the user was added through an update
            // that raced with the invite; join directly.
            None => self.db().insert_participant(&cid, &uid, Some(&now))?,
        }

        self.notify_room(challenge_id);
        Ok(())
    }

    pub fn reject_challenge(&self, user_id: Uuid, challenge_id: Uuid) -> EngineResult<()> {
        let cid = challenge_id.to_string();
        let uid = user_id.to_string();
        let p = self
            .db()
            .get_participant(&cid, &uid)?
            .ok_or(EngineError::NotFound("challenge or participant not found"))?;

        if p.completed_at.is_some() || p.has_been_vetoed {
            return Err(EngineError::Conflict(
                "participant already completed or was vetoed",
            ));
        }
        if p.griefed_by_user_id.is_some() || p.is_protected() {
            return Err(EngineError::InvalidState(
                "cannot reject a challenge with an applied powerup",
            ));
        }

        let c = self.challenge_row(challenge_id)?;
        let now = Utc::now();
        let start_at = ts::parse_opt(c.start_at.as_deref())?;
        let end_at = ts::parse(&c.end_at)?;
        if format::has_started(start_at, now) || format::has_ended(end_at, now) {
            return Err(EngineError::InvalidState("challenge already started"));
        }

        if !self.db().delete_participant(&cid, &uid)? {
            return Err(EngineError::NotFound("challenge or participant not found"));
        }
        Ok(())
    }

    // -- Completion --

    pub fn complete_challenge(&self, user_id: Uuid, challenge_id: Uuid) -> EngineResult<()> {
        let cid = challenge_id.to_string();
        let uid = user_id.to_string();
        let p = self
            .db()
            .get_participant(&cid, &uid)?
            .ok_or(EngineError::NotFound("challenge or participant not found"))?;

        if !p.has_joined() {
            return Err(EngineError::InvalidState("challenge was not accepted"));
        }
        if p.completed_at.is_some() || p.has_been_vetoed {
            return Err(EngineError::Conflict(
                "participant already completed or was vetoed",
            ));
        }

        let c = self.challenge_row(challenge_id)?;
        let now = Utc::now();
        let start_at = ts::parse_opt(c.start_at.as_deref())?;
        let end_at = ts::parse(&c.end_at)?;
        if !format::has_started(start_at, now) || format::has_ended(end_at, now) {
            return Err(EngineError::InvalidState("challenge is not ongoing"));
        }

        let done = self.db().complete_participant(
            &cid,
            &uid,
            &ts::to_store(now),
            self.config().completion_reward,
        )?;
        if !done {
            // Raced with another transition on the same row.
            return Err(EngineError::Conflict(
                "participant already completed or was vetoed",
            ));
        }

        self.notify_room(challenge_id);
        Ok(())
    }

    // -- Powerups --

    pub fn use_grief(
        &self,
        actor_id: Uuid,
        challenge_id: Uuid,
        target_user_id: Uuid,
    ) -> EngineResult<()> {
        if actor_id == target_user_id {
            return Err(EngineError::InvalidState("cannot grief yourself"));
        }

        let cid = challenge_id.to_string();
        let actor_key = actor_id.to_string();
        self.db()
            .get_participant(&cid, &actor_key)?
            .filter(|p| p.has_joined())
            .ok_or(EngineError::InvalidState(
                "actor has not joined this challenge",
            ))?;

        let actor = self
            .db()
            .get_user_by_id(&actor_key)?
            .ok_or(EngineError::NotFound("user not found"))?;
        if actor.powerup_grief_count < 1 {
            return Err(EngineError::InsufficientPowerup("grief"));
        }

        let target = self
            .db()
            .get_user_by_id(&target_user_id.to_string())?
            .ok_or(EngineError::NotFound("no such user"))?;
        if !target.is_profile_complete() {
            return Err(EngineError::NotFound("no such user"));
        }

        let c = self.challenge_row(challenge_id)?;
        let now = Utc::now();
        let start_at = ts::parse_opt(c.start_at.as_deref())?;
        let end_at = ts::parse(&c.end_at)?;
        if format::has_started(start_at, now) || format::has_ended(end_at, now) {
            return Err(EngineError::InvalidState("challenge already started"));
        }

        if let Some(existing) = self.db().get_participant(&cid, &target.id)? {
            if existing.has_joined() {
                return Err(EngineError::InvalidState("participant already joined"));
            }
        }

        if !self
            .db()
            .apply_grief(&cid, &actor_key, &target.id, &ts::to_store(now))?
        {
            return Err(EngineError::InsufficientPowerup("grief"));
        }

        self.notify_room(challenge_id);
        Ok(())
    }

    pub fn use_protec(&self, user_id: Uuid, challenge_id: Uuid) -> EngineResult<()> {
        let cid = challenge_id.to_string();
        let uid = user_id.to_string();
        let p = self
            .db()
            .get_participant(&cid, &uid)?
            .filter(|p| p.has_joined())
            .ok_or(EngineError::InvalidState(
                "actor has not joined this challenge",
            ))?;

        let user = self
            .db()
            .get_user_by_id(&uid)?
            .ok_or(EngineError::NotFound("user not found"))?;
        if user.powerup_protec_count < 1 {
            return Err(EngineError::InsufficientPowerup("protec"));
        }
        if p.is_protected() {
            return Err(EngineError::Conflict("protec already applied"));
        }

        let c = self.challenge_row(challenge_id)?;
        let now = Utc::now();
        if format::has_ended(ts::parse(&c.end_at)?, now) {
            return Err(EngineError::InvalidState("challenge already ended"));
        }

        if !self.db().apply_protec(&cid, &uid, &ts::to_store(now))? {
            return Err(EngineError::Conflict("protec already applied"));
        }

        self.notify_room(challenge_id);
        Ok(())
    }

    // -- Evidence --

    pub fn set_evidence(
        &self,
        user_id: Uuid,
        challenge_id: Uuid,
        evidence_link: &str,
    ) -> EngineResult<()> {
        let updated = self.db().set_evidence(
            &challenge_id.to_string(),
            &user_id.to_string(),
            Some(evidence_link),
        )?;
        if !updated {
            return Err(EngineError::NotFound("challenge or participant not found"));
        }
        Ok(())
    }

    pub fn clear_evidence(&self, user_id: Uuid, challenge_id: Uuid) -> EngineResult<()> {
        let updated =
            self.db()
                .set_evidence(&challenge_id.to_string(), &user_id.to_string(), None)?;
        if !updated {
            return Err(EngineError::NotFound("challenge or participant not found"));
        }
        Ok(())
    }

    // -- Scheduled transitions --

    /// Fired by the scheduler at end_at. Stamps result_released_at = end_at
    /// and fans out the new leaderboard and shame entries. Safe against
    /// duplicate timer delivery: the stamp only ever lands once.
    pub async fn release_results(self: &Arc<Self>, challenge_id: Uuid) -> EngineResult<()> {
        let c = self.challenge_row(challenge_id)?;
        let stamped = self
            .db()
            .release_results(&challenge_id.to_string(), &c.end_at)?;
        if !stamped {
            info!("Results for {} already released, skipping", challenge_id);
            return Ok(());
        }

        info!("Released results for {}", challenge_id);
        self.notify_results_released(challenge_id);
        Ok(())
    }

    /// Fired by the scheduler once the voting window (plus a small buffer)
    /// has passed. Credits every completed, unvetoed participant still under
    /// the rolling period cap, all inside one transaction with the
    /// rewards_released_at stamp.
    pub async fn release_rewards(self: &Arc<Self>, challenge_id: Uuid) -> EngineResult<()> {
        let now = Utc::now();
        let period_start = now - self.config().reward_period;

        let rewarded = self.db().distribute_rewards(
            &challenge_id.to_string(),
            self.config().completion_reward,
            self.config().reward_period_cap,
            &ts::to_store(period_start),
            &ts::to_store(now),
        )?;

        match rewarded {
            None => info!("Rewards for {} already released, skipping", challenge_id),
            Some(users) => info!("Rewarded {} participant(s) of {}", users.len(), challenge_id),
        }
        Ok(())
    }

    // -- Read models --

    pub fn get_challenge(&self, challenge_id: Uuid) -> EngineResult<ChallengeData> {
        let detail = self
            .db()
            .get_challenge_detail(&challenge_id.to_string())?
            .ok_or(EngineError::NotFound("challenge not found"))?;
        format::format_challenge(&detail)
    }

    /// Buckets the user's challenges by lifecycle phase. History comes back
    /// newest-ended first.
    pub fn user_challenges(&self, user_id: Uuid) -> EngineResult<ChallengeList> {
        let uid = user_id.to_string();
        let now = Utc::now();
        let window = self.config().voting_window;

        let mut list = ChallengeList {
            ongoing: vec![],
            pending_start: vec![],
            pending_response: vec![],
            voting_period: vec![],
            history: vec![],
        };

        for id in self.db().challenge_ids_for_user(&uid)? {
            let Some(detail) = self.db().get_challenge_detail(&id)? else {
                continue;
            };
            let joined = detail
                .participants
                .iter()
                .find(|p| p.participant.user_id == uid)
                .is_some_and(|p| p.participant.has_joined());

            let data = format::format_challenge(&detail)?;
            match format::classify(joined, data.start_at, data.end_at, now, window) {
                Some(Phase::Ongoing) => list.ongoing.push(data),
                Some(Phase::PendingStart) => list.pending_start.push(data),
                Some(Phase::PendingResponse) => list.pending_response.push(data),
                Some(Phase::VotingWindow) => list.voting_period.push(data),
                Some(Phase::History) => list.history.push(data),
                None => {}
            }
        }

        list.history.sort_by(|a, b| b.end_at.cmp(&a.end_at));
        Ok(list)
    }

    pub fn public_challenges(&self) -> EngineResult<PublicChallengeList> {
        let now = ts::to_store(Utc::now());
        let mut featured = Vec::new();
        let mut others = Vec::new();

        for id in self.db().public_upcoming_challenge_ids(&now)? {
            let Some(detail) = self.db().get_challenge_detail(&id)? else {
                continue;
            };
            let data = format::format_challenge(&detail)?;
            if data.is_featured && data.image_url.is_some() {
                featured.push(data);
            } else {
                others.push(data);
            }
        }

        Ok(PublicChallengeList { featured, others })
    }

    pub fn search_challenges(&self, query: &str) -> EngineResult<Vec<ChallengeData>> {
        if query.is_empty() {
            return Ok(vec![]);
        }
        let mut results = Vec::new();
        for id in self.db().search_public_challenge_ids(query)? {
            if let Some(detail) = self.db().get_challenge_detail(&id)? {
                results.push(format::format_challenge(&detail)?);
            }
        }
        Ok(results)
    }

    // -- Fanout --

    /// Pushes a fresh challenge view into its room. Best effort: a failed
    /// notification never fails the mutation that triggered it.
    pub(crate) fn notify_room(&self, challenge_id: Uuid) {
        match self.get_challenge(challenge_id) {
            Ok(data) => self.fanout().broadcast(GatewayEvent::RoomUpdate {
                challenge_id,
                data,
            }),
            Err(e) => warn!("Room update for {} failed: {}", challenge_id, e),
        }
    }

    pub(crate) fn notify_results_released(&self, challenge_id: Uuid) {
        match self.global_leaderboard() {
            Ok(entries) => self
                .fanout()
                .broadcast(GatewayEvent::GlobalLeaderboard(entries)),
            Err(e) => warn!("Leaderboard fanout failed: {}", e),
        }
        match self.shame_list_for_challenge(challenge_id) {
            Ok(entries) => {
                if !entries.is_empty() {
                    self.fanout().broadcast(GatewayEvent::ShameListUpdate(entries));
                }
            }
            Err(e) => warn!("Shame list fanout for {} failed: {}", challenge_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use gritwall_types::api::CreateChallengeRequest;
    use gritwall_types::models::ChallengeType;

    use crate::EngineConfig;
    use crate::error::EngineError;
    use crate::testutil::{
        bare_user, challenge, engine, engine_with, give_powerup, points_of, user,
    };

    fn create_request(
        end_in: Duration,
        participants: Vec<uuid::Uuid>,
    ) -> CreateChallengeRequest {
        CreateChallengeRequest {
            title: "no sugar week".into(),
            description: None,
            start_at: Some(Utc::now() + Duration::minutes(30)),
            end_at: Utc::now() + end_in,
            challenge_type: ChallengeType::NotCompleted,
            invite_type: None,
            participants,
        }
    }

    #[tokio::test]
    async fn create_rejects_start_after_end() {
        let e = engine();
        let owner = user(&e, "owner");

        let mut req = create_request(Duration::hours(1), vec![]);
        req.start_at = Some(req.end_at + Duration::seconds(1));
        assert!(matches!(
            e.create_challenge(owner, req).await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn create_joins_owner_and_filters_incomplete_invitees() {
        let e = engine();
        let owner = user(&e, "owner");
        let friend = user(&e, "friend");
        let ghost = bare_user(&e, "ghost");

        let data = e
            .create_challenge(owner, create_request(Duration::hours(2), vec![friend, ghost]))
            .await
            .unwrap();

        assert_eq!(data.participant_count, 1);
        assert_eq!(data.participants.pending.len(), 1);
        assert_eq!(data.participants.pending[0].user_id, friend);
        assert!(
            data.participants
                .accepted
                .not_completed
                .iter()
                .any(|u| u.user_id == owner)
        );

        // Both lifecycle jobs are on the clock.
        assert_eq!(e.scheduler().names().await.len(), 2);
    }

    #[tokio::test]
    async fn accept_then_reject_before_start() {
        let e = engine();
        let owner = user(&e, "owner");
        let friend = user(&e, "friend");
        let data = e
            .create_challenge(owner, create_request(Duration::hours(2), vec![friend]))
            .await
            .unwrap();
        let cid = data.challenge_id;

        e.accept_challenge(friend, cid).unwrap();
        let data = e.get_challenge(cid).unwrap();
        assert!(data.participants.pending.is_empty());
        assert_eq!(data.participant_count, 2);

        // Accepting again is a no-op, and a join can still be walked back
        // while the challenge has not started.
        e.accept_challenge(friend, cid).unwrap();
        e.reject_challenge(friend, cid).unwrap();
        assert_eq!(e.get_challenge(cid).unwrap().participant_count, 1);
    }

    #[test]
    fn reject_after_start_fails() {
        let e = engine();
        let owner = user(&e, "owner");
        let late = user(&e, "late");
        let cid = challenge(&e, owner, &[owner], Duration::hours(-1), Duration::hours(1));
        e.db()
            .insert_participant(&cid.to_string(), &late.to_string(), None)
            .unwrap();

        assert!(matches!(
            e.reject_challenge(late, cid),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn complete_awards_points_exactly_once() {
        let e = engine();
        let owner = user(&e, "owner");
        let cid = challenge(&e, owner, &[owner], Duration::hours(-1), Duration::hours(1));

        e.complete_challenge(owner, cid).unwrap();
        assert_eq!(points_of(&e, owner), 100);

        assert!(matches!(
            e.complete_challenge(owner, cid),
            Err(EngineError::Conflict(_))
        ));
        assert_eq!(points_of(&e, owner), 100);
    }

    #[test]
    fn complete_requires_an_ongoing_challenge() {
        let e = engine();
        let owner = user(&e, "owner");

        let early = challenge(&e, owner, &[owner], Duration::hours(1), Duration::hours(2));
        assert!(matches!(
            e.complete_challenge(owner, early),
            Err(EngineError::InvalidState(_))
        ));

        let over = challenge(&e, owner, &[owner], Duration::hours(-2), Duration::hours(-1));
        assert!(matches!(
            e.complete_challenge(owner, over),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn grief_force_joins_the_target_and_spends_inventory() {
        let e = engine();
        let owner = user(&e, "owner");
        let target = user(&e, "target");
        let cid = challenge(&e, owner, &[owner], Duration::hours(1), Duration::hours(2));
        give_powerup(&e, owner, true, 1);

        e.use_grief(owner, cid, target).unwrap();

        let p = e
            .db()
            .get_participant(&cid.to_string(), &target.to_string())
            .unwrap()
            .unwrap();
        assert!(p.has_joined());
        assert_eq!(p.griefed_by_user_id.as_deref(), Some(owner.to_string().as_str()));

        // Inventory is spent, and the victim is locked in.
        assert!(matches!(
            e.use_grief(owner, cid, user(&e, "other")),
            Err(EngineError::InsufficientPowerup(_))
        ));
        assert!(matches!(
            e.reject_challenge(target, cid),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn grief_fails_once_started_or_already_joined() {
        let e = engine();
        let owner = user(&e, "owner");
        let peer = user(&e, "peer");
        give_powerup(&e, owner, true, 2);

        let started = challenge(&e, owner, &[owner], Duration::hours(-1), Duration::hours(1));
        assert!(matches!(
            e.use_grief(owner, started, peer),
            Err(EngineError::InvalidState(_))
        ));

        let future = challenge(&e, owner, &[owner, peer], Duration::hours(1), Duration::hours(2));
        assert!(matches!(
            e.use_grief(owner, future, peer),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn protec_applies_once_per_challenge() {
        let e = engine();
        let owner = user(&e, "owner");
        let cid = challenge(&e, owner, &[owner], Duration::hours(-1), Duration::hours(1));
        give_powerup(&e, owner, false, 2);

        e.use_protec(owner, cid).unwrap();
        let p = e
            .db()
            .get_participant(&cid.to_string(), &owner.to_string())
            .unwrap()
            .unwrap();
        assert!(p.is_protected());

        assert!(matches!(
            e.use_protec(owner, cid),
            Err(EngineError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn release_results_stamps_once() {
        let e = engine();
        let owner = user(&e, "owner");
        let cid = challenge(&e, owner, &[owner], Duration::hours(-2), Duration::minutes(-10));

        e.release_results(cid).await.unwrap();
        let c = e.db().get_challenge(&cid.to_string()).unwrap().unwrap();
        // The stamp carries the scheduled end, not the wall clock at fire time.
        assert_eq!(c.result_released_at.as_deref(), Some(c.end_at.as_str()));

        // A duplicate fire is harmless.
        e.release_results(cid).await.unwrap();
        let again = e.db().get_challenge(&cid.to_string()).unwrap().unwrap();
        assert_eq!(again.result_released_at, c.result_released_at);
    }

    #[tokio::test]
    async fn rewards_credit_completers_exactly_once() {
        let e = engine();
        let owner = user(&e, "owner");
        let cid = challenge(&e, owner, &[owner], Duration::hours(-1), Duration::hours(1));
        e.complete_challenge(owner, cid).unwrap();
        assert_eq!(points_of(&e, owner), 100);

        // End the challenge, then let the reward job fire twice.
        e.db()
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE challenges SET end_at = ?1 WHERE id = ?2",
                    rusqlite::params![
                        gritwall_db::ts::to_store(Utc::now() - Duration::hours(2)),
                        cid.to_string()
                    ],
                )?;
                Ok(())
            })
            .unwrap();

        e.release_rewards(cid).await.unwrap();
        assert_eq!(points_of(&e, owner), 200);
        e.release_rewards(cid).await.unwrap();
        assert_eq!(points_of(&e, owner), 200);
    }

    #[tokio::test]
    async fn reward_cap_excludes_saturated_users() {
        let mut config = EngineConfig::default();
        config.reward_period_cap = 100;
        let e = engine_with(config);

        let owner = user(&e, "owner");
        let cid = challenge(&e, owner, &[owner], Duration::hours(-1), Duration::hours(1));
        // Completion alone fills the whole period cap.
        e.complete_challenge(owner, cid).unwrap();

        e.db()
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE challenges SET end_at = ?1 WHERE id = ?2",
                    rusqlite::params![
                        gritwall_db::ts::to_store(Utc::now() - Duration::hours(2)),
                        cid.to_string()
                    ],
                )?;
                Ok(())
            })
            .unwrap();

        e.release_rewards(cid).await.unwrap();
        assert_eq!(points_of(&e, owner), 100);
    }

    #[tokio::test]
    async fn update_reschedules_the_lifecycle_jobs() {
        let e = engine();
        let owner = user(&e, "owner");
        let data = e
            .create_challenge(owner, create_request(Duration::hours(1), vec![]))
            .await
            .unwrap();
        let cid = data.challenge_id;

        let new_end = Utc::now() + Duration::hours(3);
        let updated = e
            .update_challenge(
                owner,
                cid,
                gritwall_types::api::UpdateChallengeRequest {
                    title: None,
                    description: None,
                    start_at: None,
                    end_at: Some(new_end),
                    challenge_type: None,
                    participants: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.end_at, new_end);

        let results_job = format!("{}-release-results", cid);
        assert_eq!(e.scheduler().fire_time(&results_job).await, Some(new_end));
    }
}
