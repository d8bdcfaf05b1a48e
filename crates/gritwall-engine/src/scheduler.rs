//! Named one-shot job registry.
//!
//! Jobs are identified by `{challenge_id}-{kind}` and carry only a
//! [`JobDescriptor`]; the runner resolves all challenge state against the
//! database at fire time, so an intervening challenge update can never leave a
//! job acting on stale data.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    ReleaseResults,
    ReleaseRewards,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReleaseResults => "release-results",
            Self::ReleaseRewards => "release-rewards",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDescriptor {
    pub challenge_id: Uuid,
    pub kind: JobKind,
}

impl JobDescriptor {
    pub fn new(challenge_id: Uuid, kind: JobKind) -> Self {
        Self { challenge_id, kind }
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.challenge_id, self.kind.as_str())
    }
}

/// Executes a fired job. Implemented by the lifecycle engine.
pub trait JobRunner: Send + Sync + 'static {
    fn run(self: Arc<Self>, job: JobDescriptor) -> BoxFuture<'static, ()>;
}

struct JobEntry {
    fire_at: DateTime<Utc>,
    generation: u64,
    handle: JoinHandle<()>,
}

/// In-process timer registry. Single-process by design: each process owns its
/// database, so no distributed coordination is attempted.
#[derive(Clone)]
pub struct Scheduler {
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
    next_generation: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a one-shot job. A fire time in the past runs immediately.
    /// Re-adding an existing name replaces the pending timer.
    pub async fn add(
        &self,
        descriptor: JobDescriptor,
        fire_at: DateTime<Utc>,
        runner: Arc<dyn JobRunner>,
    ) {
        let name = descriptor.name();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let jobs = self.jobs.clone();
        let task_name = name.clone();

        // The write lock is held across the spawn so the entry is registered
        // before the task's cleanup can run; the generation check keeps a
        // finished task from removing the entry that replaced it.
        let mut registry = self.jobs.write().await;
        let handle = tokio::spawn(async move {
            let delay = (fire_at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(delay).await;
            runner.run(descriptor).await;
            let mut jobs = jobs.write().await;
            if jobs
                .get(&task_name)
                .is_some_and(|e| e.generation == generation)
            {
                jobs.remove(&task_name);
            }
        });

        let entry = JobEntry {
            fire_at,
            generation,
            handle,
        };
        if let Some(old) = registry.insert(name.clone(), entry) {
            old.handle.abort();
        }
        drop(registry);
        info!("Job {} added, fires at {}", name, fire_at);
    }

    /// Moves an existing job to a new fire time. Registers it fresh when the
    /// name is unknown (a challenge edited after a restart race).
    pub async fn reschedule(
        &self,
        descriptor: JobDescriptor,
        new_fire_at: DateTime<Utc>,
        runner: Arc<dyn JobRunner>,
    ) {
        let name = descriptor.name();
        if !self.jobs.read().await.contains_key(&name) {
            warn!("Reschedule of unknown job {}, adding instead", name);
        }
        self.add(descriptor, new_fire_at, runner).await;
        info!("Job {} now fires at {}", name, new_fire_at);
    }

    /// Cancels a pending job. Unknown names are ignored.
    pub async fn cancel(&self, name: &str) {
        if let Some(entry) = self.jobs.write().await.remove(name) {
            entry.handle.abort();
            info!("Job {} cancelled", name);
        }
    }

    pub async fn names(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }

    pub async fn fire_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.jobs.read().await.get(name).map(|e| e.fire_at)
    }

    pub async fn log_stats(&self) {
        let n = self.jobs.read().await.len();
        info!("{} job(s) loaded in the registry", n);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRunner {
        fired: AtomicUsize,
    }

    impl JobRunner for CountingRunner {
        fn run(self: Arc<Self>, _job: JobDescriptor) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                self.fired.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn runner() -> Arc<CountingRunner> {
        Arc::new(CountingRunner {
            fired: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn fires_once_and_unregisters() {
        let scheduler = Scheduler::new();
        let r = runner();
        let d = JobDescriptor::new(Uuid::new_v4(), JobKind::ReleaseResults);

        scheduler
            .add(d, Utc::now() + chrono::Duration::milliseconds(20), r.clone())
            .await;
        assert_eq!(scheduler.names().await.len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(r.fired.load(Ordering::SeqCst), 1);
        assert!(scheduler.names().await.is_empty());
    }

    #[tokio::test]
    async fn past_fire_time_runs_immediately() {
        let scheduler = Scheduler::new();
        let r = runner();
        let d = JobDescriptor::new(Uuid::new_v4(), JobKind::ReleaseRewards);

        scheduler
            .add(d, Utc::now() - chrono::Duration::hours(1), r.clone())
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(r.fired.load(Ordering::SeqCst), 1);
        // The entry must be gone even when the job outran its registration.
        assert!(scheduler.names().await.is_empty());
    }

    #[tokio::test]
    async fn reschedule_replaces_the_timer() {
        let scheduler = Scheduler::new();
        let r = runner();
        let d = JobDescriptor::new(Uuid::new_v4(), JobKind::ReleaseResults);

        scheduler
            .add(d, Utc::now() + chrono::Duration::milliseconds(30), r.clone())
            .await;
        scheduler
            .reschedule(d, Utc::now() + chrono::Duration::hours(1), r.clone())
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        // Old timer must not fire after the reschedule.
        assert_eq!(r.fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.names().await.len(), 1);
    }

    #[tokio::test]
    async fn cancel_aborts_the_job() {
        let scheduler = Scheduler::new();
        let r = runner();
        let d = JobDescriptor::new(Uuid::new_v4(), JobKind::ReleaseResults);

        scheduler
            .add(d, Utc::now() + chrono::Duration::milliseconds(30), r.clone())
            .await;
        scheduler.cancel(&d.name()).await;

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(r.fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.names().await.is_empty());
    }
}
