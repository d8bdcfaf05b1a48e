pub mod error;
pub mod fanout;
pub mod format;
pub mod friends;
pub mod lifecycle;
pub mod scheduler;
pub mod shame;
pub mod store;
#[cfg(test)]
mod testutil;
pub mod users;
pub mod votes;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::BoxFuture;
use gritwall_db::Database;
use gritwall_db::models::ChallengeRow;
use gritwall_db::ts;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::fanout::Fanout;
use crate::scheduler::{JobDescriptor, JobKind, JobRunner, Scheduler};

/// Engine tunables. The defaults mirror production values.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Points credited per completion (on completion and again at reward
    /// distribution).
    pub completion_reward: i64,
    pub grief_price: i64,
    pub protec_price: i64,
    /// Accusation votes may be cast for this long after a challenge ends.
    pub voting_window: Duration,
    /// Reward distribution fires this long after the voting window closes.
    pub reward_buffer: Duration,
    /// Rolling window for the reward point cap.
    pub reward_period: Duration,
    /// Maximum points a user may earn from rewards per rolling period.
    pub reward_period_cap: i64,
    pub shame_list_cap: u32,
    pub leaderboard_cap: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_reward: 100,
            grief_price: 500,
            protec_price: 750,
            voting_window: Duration::minutes(60),
            reward_buffer: Duration::seconds(5),
            reward_period: Duration::days(7),
            reward_period_cap: 1000,
            shame_list_cap: 100,
            leaderboard_cap: 100,
        }
    }
}

/// The challenge lifecycle and consensus engine. Holds no per-challenge state
/// in memory: every operation re-reads the database, which is the single
/// shared mutable resource.
pub struct Engine {
    db: Arc<Database>,
    scheduler: Scheduler,
    fanout: Arc<dyn Fanout>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        db: Arc<Database>,
        scheduler: Scheduler,
        fanout: Arc<dyn Fanout>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            scheduler,
            fanout,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn fanout(&self) -> &dyn Fanout {
        &*self.fanout
    }

    pub(crate) fn challenge_row(&self, id: Uuid) -> EngineResult<ChallengeRow> {
        self.db
            .get_challenge(&id.to_string())?
            .ok_or(EngineError::NotFound("challenge not found"))
    }

    pub(crate) fn reward_fire_time(&self, end_at: DateTime<Utc>) -> DateTime<Utc> {
        end_at + self.config.voting_window + self.config.reward_buffer
    }

    /// Registers the result-release and reward-distribution jobs for one
    /// challenge.
    pub(crate) async fn register_jobs(self: &Arc<Self>, id: Uuid, end_at: DateTime<Utc>) {
        self.scheduler
            .add(
                JobDescriptor::new(id, JobKind::ReleaseResults),
                end_at,
                self.clone(),
            )
            .await;
        self.scheduler
            .add(
                JobDescriptor::new(id, JobKind::ReleaseRewards),
                self.reward_fire_time(end_at),
                self.clone(),
            )
            .await;
    }

    /// Boot-time recovery: re-derive jobs for every challenge still in
    /// flight, and re-register (immediately firing) jobs for challenges whose
    /// reward window passed while the process was down. The release/rewards
    /// stamps make the re-fires idempotent.
    pub async fn restore_jobs(self: &Arc<Self>) -> EngineResult<()> {
        let now = Utc::now();

        let future = self.db.challenges_ending_after(&ts::to_store(now))?;
        for c in &future {
            let id = parse_challenge_id(c)?;
            self.register_jobs(id, ts::parse(&c.end_at)?).await;
        }

        let window_start = now - self.config.voting_window - self.config.reward_buffer;
        let pending = self
            .db
            .challenges_in_reward_window(&ts::to_store(window_start), &ts::to_store(now))?;
        for c in &pending {
            let id = parse_challenge_id(c)?;
            let end_at = ts::parse(&c.end_at)?;
            self.register_jobs(id, end_at).await;
        }

        info!(
            "Restored jobs for {} future and {} reward-pending challenges",
            future.len(),
            pending.len()
        );
        self.scheduler.log_stats().await;
        Ok(())
    }
}

fn parse_challenge_id(c: &ChallengeRow) -> EngineResult<Uuid> {
    Uuid::parse_str(&c.id)
        .map_err(|e| EngineError::Storage(anyhow::anyhow!("corrupt challenge id '{}': {}", c.id, e)))
}

impl JobRunner for Engine {
    /// Scheduled-job entry point. Failures are logged and swallowed — a
    /// broken job must never take down other challenges' timers.
    fn run(self: Arc<Self>, job: JobDescriptor) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let result = match job.kind {
                JobKind::ReleaseResults => self.release_results(job.challenge_id).await,
                JobKind::ReleaseRewards => self.release_rewards(job.challenge_id).await,
            };
            if let Err(e) = result {
                error!("Scheduled job {} failed: {}", job.name(), e);
            }
        })
    }
}
