//! # Session Tasks
//!
//! Periodic work bound to one session. Every registered task is spawned
//! when the connection enters `Connected` and awaited when it leaves.
//!
//! ```text
//!   active ──true──► tick ─ sleep ─ tick ─ sleep ─ ...
//!   active ──false─► current tick finishes, loop exits
//! ```

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use verdant_core::{CoordinateMapper, StateStore};

use crate::connection::outbox::Outbox;
use crate::error::ConnectionError;
use crate::protocol::{Outbound, PingTracker};

/// Error type returned by a task tick.
pub type TaskError = Box<dyn Error + Send + Sync>;

/// Periodic work run while connected.
pub trait SessionTask: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Time between ticks.
    fn interval(&self) -> Duration;

    /// Whether the first tick fires on connect or after one interval.
    fn run_immediately(&self) -> bool {
        true
    }

    /// One unit of work. Errors are logged; the task keeps running.
    fn tick<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>>;
}

/// Everything a task may touch.
#[derive(Clone)]
pub struct TaskContext {
    /// Read side of the world.
    pub store: Arc<StateStore>,
    /// Command queue.
    pub outbox: Outbox,
    /// Local to server coordinates.
    pub mapper: Arc<dyn CoordinateMapper>,
    active: watch::Receiver<bool>,
}

impl TaskContext {
    /// Creates a context. `active` flips to `false` when the session ends.
    #[must_use]
    pub fn new(
        store: Arc<StateStore>,
        outbox: Outbox,
        mapper: Arc<dyn CoordinateMapper>,
        active: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            outbox,
            mapper,
            active,
        }
    }

    /// True until the session ends.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Resolves once the session has ended.
    pub async fn until_inactive(&self) {
        let mut active = self.active.clone();
        loop {
            if !*active.borrow_and_update() {
                return;
            }
            if active.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Drives `task` until the session ends.
pub(crate) async fn run_periodic(task: Arc<dyn SessionTask>, ctx: TaskContext) {
    let period = task.interval().max(Duration::from_millis(1));
    let start = if task.run_immediately() {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = ctx.until_inactive() => break,
            _ = ticker.tick() => {}
        }
        if let Err(error) = task.tick(&ctx).await {
            match error.downcast_ref::<ConnectionError>() {
                Some(ConnectionError::NotConnected) => {
                    tracing::debug!("{} tick skipped: not connected", task.name());
                }
                _ => tracing::warn!("{} tick failed: {}", task.name(), error),
            }
        }
    }
    tracing::debug!("{} stopped", task.name());
}

/// Sends `Ping` with a monotonic id.
pub(crate) struct KeepaliveTask {
    pings: Arc<PingTracker>,
    interval: Duration,
}

impl KeepaliveTask {
    pub(crate) fn new(pings: Arc<PingTracker>, interval: Duration) -> Self {
        Self { pings, interval }
    }
}

impl SessionTask for KeepaliveTask {
    fn name(&self) -> &str {
        "keepalive"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run_immediately(&self) -> bool {
        false
    }

    fn tick<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        async move {
            ctx.outbox.send(Outbound::Ping { id: self.pings.issue() })?;
            Ok(())
        }
        .boxed()
    }
}

/// Re-announces our avatar at the own garden's spawn point.
pub(crate) struct PositionTask {
    interval: Duration,
}

impl PositionTask {
    pub(crate) fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl SessionTask for PositionTask {
    fn name(&self) -> &str {
        "position"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run_immediately(&self) -> bool {
        false
    }

    fn tick<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        async move {
            let Some(spawn) = ctx.store.own_slot().and_then(|slot| ctx.mapper.spawn_point(slot)) else {
                return Ok(());
            };
            ctx.outbox.send(Outbound::PlayerPosition {
                x: spawn.x,
                y: spawn.y,
            })?;
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdant_core::SpawnTableMapper;

    fn context() -> (TaskContext, tokio::sync::mpsc::UnboundedReceiver<Outbound>, watch::Sender<bool>) {
        let (outbox, sent) = Outbox::loopback();
        let (active_tx, active_rx) = watch::channel(true);
        let store = Arc::new(StateStore::new(Some("p_me".into())));
        let ctx = TaskContext::new(store, outbox, Arc::new(SpawnTableMapper::default()), active_rx);
        (ctx, sent, active_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_waits_one_interval_and_stops_with_session() {
        let (ctx, mut sent, active) = context();
        let task: Arc<dyn SessionTask> = Arc::new(KeepaliveTask::new(Arc::new(PingTracker::new()), Duration::from_secs(2)));
        let handle = tokio::spawn(run_periodic(task, ctx));

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(sent.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sent.try_recv().unwrap(), Outbound::Ping { id: 1 });
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sent.try_recv().unwrap(), Outbound::Ping { id: 2 });

        active.send(false).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_uses_own_spawn_point() {
        let (ctx, mut sent, _active) = context();
        ctx.store.apply_full(json!({"child": {"data": {"userSlots": [null, null, {"playerId": "p_me"}]}}}));
        PositionTask::new(Duration::from_secs(1)).tick(&ctx).await.unwrap();
        assert_eq!(sent.try_recv().unwrap(), Outbound::PlayerPosition { x: 66, y: 14 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_inactive_resolves_after_flip() {
        let (ctx, _sent, active) = context();
        assert!(ctx.is_active());
        active.send(false).unwrap();
        ctx.until_inactive().await;
        assert!(!ctx.is_active());
    }
}
