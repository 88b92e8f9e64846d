//! # Connection Manager
//!
//! Owns the lifecycle of the bot's single room connection.
//!
//! ```text
//!                 ┌───────────────┐
//!   run() ──────► │Authenticating │──auth error──────────┐
//!                 └──────┬────────┘                      │
//!                        ▼                               ▼
//!                 ┌───────────────┐  every room    ┌────────────┐
//!                 │  RoomSearch   │──rejected────► │Reconnecting│──backoff──┐
//!                 └──────┬────────┘                └────────────┘           │
//!                        ▼ joined                        ▲                  │
//!                 ┌───────────────┐  link lost           │                  │
//!                 │   Connected   │──────────────────────┘                  │
//!                 └──────┬────────┘                                         │
//!                        ▼ shutdown / retries exhausted                     │
//!                 ┌───────────────┐                                         │
//!                 │    Closed     │ ◄──────── max_retries failures ─────────┘
//!                 └───────────────┘
//! ```
//!
//! Only one link is ever live. Failures count consecutively; a successful
//! join resets the count.

mod backoff;
mod handshake;
mod outbox;
mod session;
mod task;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use verdant_core::{BotConfig, CoordinateMapper, SpawnTableMapper, StateStore};

pub use backoff::Backoff;
pub use handshake::JoinRules;
pub use outbox::Outbox;
pub use task::{SessionTask, TaskContext, TaskError};

use crate::error::{ConnectionError, ConnectionResult};
use crate::journal::MessageJournal;
use crate::protocol::{PingTracker, ProtocolProcessor};
use crate::stats::LinkStats;
use crate::transport::{Connector, Credential};
use handshake::Joined;
use outbox::Wire;
use session::{flag_raised, Session, SessionEnd};
use task::{KeepaliveTask, PositionTask};

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started.
    Disconnected,
    /// Checking the session cookie.
    Authenticating,
    /// Trying candidate rooms.
    RoomSearch,
    /// In a room; tasks running.
    Connected,
    /// Waiting out the backoff.
    Reconnecting,
    /// Finished; `run` has returned or is about to.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Authenticating => "authenticating",
            Self::RoomSearch => "room-search",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tunables of the connection manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Candidate rooms in order.
    pub rooms: Vec<String>,
    /// Join time limits.
    pub join: JoinRules,
    /// Reconnect policy.
    pub backoff: Backoff,
    /// Time between `Ping` messages.
    pub keepalive_interval: Duration,
    /// Time between position broadcasts.
    pub position_interval: Duration,
}

impl ConnectionSettings {
    /// Settings from the bot config. `room_override` is tried first.
    #[must_use]
    pub fn from_config(config: &BotConfig, room_override: Option<&str>) -> Self {
        Self {
            rooms: config.room.candidates(room_override),
            join: JoinRules {
                join_timeout: config.room.join_timeout(),
                grace: config.room.grace(),
            },
            backoff: Backoff::from_config(&config.reconnection),
            keepalive_interval: config.keepalive.ping_interval(),
            position_interval: config.keepalive.position_interval(),
        }
    }
}

/// Drives authentication, room search, the session and reconnection.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    settings: ConnectionSettings,
    store: Arc<StateStore>,
    mapper: Arc<dyn CoordinateMapper>,
    journal: Option<MessageJournal>,
    stats: Arc<LinkStats>,
    pings: Arc<PingTracker>,
    tasks: Mutex<Vec<Arc<dyn SessionTask>>>,
    outbox: Outbox,
    credential: Mutex<Credential>,
    last_room: Mutex<Option<String>>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
}

impl ConnectionManager {
    /// Creates a manager with the keepalive and position tasks registered.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
        store: Arc<StateStore>,
        credential: Credential,
    ) -> Self {
        let pings = Arc::new(PingTracker::new());
        let tasks: Vec<Arc<dyn SessionTask>> = vec![
            Arc::new(KeepaliveTask::new(Arc::clone(&pings), settings.keepalive_interval)),
            Arc::new(PositionTask::new(settings.position_interval)),
        ];
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            connector,
            settings,
            store,
            mapper: Arc::new(SpawnTableMapper::default()),
            journal: None,
            stats: Arc::new(LinkStats::default()),
            pings,
            tasks: Mutex::new(tasks),
            outbox: Outbox::new(),
            credential: Mutex::new(credential),
            last_room: Mutex::new(None),
            state,
            shutdown,
        }
    }

    /// Mirrors every frame into `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: MessageJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Replaces the coordinate mapper.
    #[must_use]
    pub fn with_mapper(mut self, mapper: Arc<dyn CoordinateMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Adds a task run during every session.
    pub fn register(&self, task: Arc<dyn SessionTask>) {
        tracing::debug!("registered task {}", task.name());
        self.tasks.lock().push(task);
    }

    /// Command queue of the current session.
    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Shared link counters.
    #[must_use]
    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    /// The store this manager writes into.
    #[must_use]
    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Feed of lifecycle changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Credential in use, refreshed by every authentication.
    #[must_use]
    pub fn credential(&self) -> Credential {
        self.credential.lock().clone()
    }

    /// Room most recently joined.
    #[must_use]
    pub fn last_room(&self) -> Option<String> {
        self.last_room.lock().clone()
    }

    /// Asks `run` to end. The current session's tasks finish their tick.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        self.shutdown.send_replace(true);
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!("connection {} -> {}", previous, next);
        }
    }

    fn candidates(&self) -> Vec<String> {
        let mut rooms = self.settings.rooms.clone();
        if let Some(last) = self.last_room() {
            rooms.retain(|room| *room != last);
            rooms.insert(0, last);
        }
        rooms
    }

    /// Runs until shutdown or until `max_retries` consecutive failures.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::RetriesExhausted`] when the retry budget
    /// runs out.
    pub async fn run(&self) -> ConnectionResult<()> {
        let mut shutdown = self.shutdown.subscribe();
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let attempt = tokio::select! {
                joined = self.connect_once() => Some(joined),
                () = flag_raised(&mut shutdown) => None,
            };
            let Some(attempt) = attempt else { break };

            let delay = match attempt {
                Ok(joined) => {
                    failures = 0;
                    match self.serve(joined, shutdown.clone()).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::LinkLost => self.settings.backoff.delay(0),
                    }
                }
                Err(error) => {
                    failures += 1;
                    tracing::warn!(
                        "connection attempt {}/{} failed: {}",
                        failures,
                        self.settings.backoff.max_retries(),
                        error
                    );
                    if failures >= self.settings.backoff.max_retries() {
                        self.set_state(ConnectionState::Closed);
                        return Err(ConnectionError::RetriesExhausted {
                            attempts: failures,
                            last: error.to_string(),
                        });
                    }
                    self.settings.backoff.delay(failures - 1)
                }
            };

            self.set_state(ConnectionState::Reconnecting);
            self.store.reset();
            tracing::info!("reconnecting in {:?}", delay);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = flag_raised(&mut shutdown) => break,
            }
        }

        self.outbox.detach();
        self.set_state(ConnectionState::Closed);
        Ok(())
    }

    /// One authentication and room search pass.
    async fn connect_once(&self) -> ConnectionResult<Joined> {
        let player_id = self
            .store
            .player_id()
            .ok_or_else(|| ConnectionError::Auth("no player id".into()))?;
        let rooms = self.candidates();
        let first = rooms.first().ok_or(ConnectionError::NoRoomAvailable { tried: 0 })?;

        self.set_state(ConnectionState::Authenticating);
        let credential = self.credential();
        let refreshed = self.connector.authenticate(first, &credential).await?;
        *self.credential.lock() = refreshed.clone();

        self.set_state(ConnectionState::RoomSearch);
        for room in &rooms {
            match self.try_room(room, &player_id, &refreshed).await {
                Ok(joined) => return Ok(joined),
                Err(error @ ConnectionError::Auth(_)) => return Err(error),
                Err(error) => tracing::info!("room {} unavailable: {}", room, error),
            }
        }
        Err(ConnectionError::NoRoomAvailable { tried: rooms.len() })
    }

    async fn try_room(&self, room: &str, player_id: &str, credential: &Credential) -> ConnectionResult<Joined> {
        tracing::debug!("trying room {}", room);
        let link = tokio::time::timeout(
            self.settings.join.join_timeout,
            self.connector.open(room, player_id, credential),
        )
        .await
        .map_err(|_| ConnectionError::JoinTimeout { room: room.to_owned() })??;
        let wire = self.wire(&link);
        handshake::join(link, &wire, room, player_id, self.settings.join).await
    }

    fn wire(&self, link: &crate::transport::Link) -> Wire {
        Wire::new(link.tx.clone(), self.journal.clone(), Arc::clone(&self.stats))
    }

    async fn serve(&self, joined: Joined, shutdown: watch::Receiver<bool>) -> SessionEnd {
        let room = joined.room.clone();
        self.stats.record_session();
        *self.last_room.lock() = Some(room.clone());
        self.store.set_identity(None, Some(room));
        self.set_state(ConnectionState::Connected);

        let session = Session {
            processor: ProtocolProcessor::new(
                Arc::clone(&self.store),
                Arc::clone(&self.pings),
                Arc::clone(&self.stats),
            ),
            wire: self.wire(&joined.link),
            outbox: &self.outbox,
            store: Arc::clone(&self.store),
            mapper: Arc::clone(&self.mapper),
            tasks: self.tasks.lock().clone(),
        };
        let end = session.run(joined, shutdown).await;
        self.pings.clear();
        end
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("rooms", &self.settings.rooms)
            .field("last_room", &self.last_room())
            .field("tasks", &self.tasks.lock().len())
            .finish_non_exhaustive()
    }
}
