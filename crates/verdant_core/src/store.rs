//! # State Store
//!
//! Single owner of the synchronized document.
//!
//! ```text
//!   ProtocolProcessor ──apply_full / apply_patch──► [Mutex] ──► Arc<Value>
//!                                                       │
//!   policies / renderers ◄──snapshot() (clone Arc)──────┘
//! ```
//!
//! Writers take the lock for the whole batch; readers take it only long
//! enough to clone the `Arc`, then project outside it. A reader therefore
//! sees either all of a batch or none of it.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::PatchError;
use crate::tree::{self, PatchOp};
use crate::world::{self, WorldState};

/// An operation that failed to apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedOp {
    /// Position of the op in its batch.
    pub index: usize,
    /// Why it was skipped.
    pub error: PatchError,
}

/// Outcome of one patch batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Ops applied.
    pub applied: usize,
    /// Ops skipped, in batch order.
    pub skipped: Vec<SkippedOp>,
}

impl PatchReport {
    /// True when every op applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    player_id: Option<String>,
    room_id: Option<String>,
    document: Option<Arc<Value>>,
    revision: u64,
}

/// Thread-safe holder of the world document.
#[derive(Debug)]
pub struct StateStore {
    inner: Mutex<StoreInner>,
    revisions: watch::Sender<u64>,
}

impl StateStore {
    /// Creates an empty store for `player_id`.
    #[must_use]
    pub fn new(player_id: Option<String>) -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            inner: Mutex::new(StoreInner {
                player_id,
                ..StoreInner::default()
            }),
            revisions,
        }
    }

    fn bump(&self, inner: &mut StoreInner) {
        inner.revision += 1;
        self.revisions.send_replace(inner.revision);
    }

    /// Replaces the whole document.
    pub fn apply_full(&self, tree: Value) {
        let mut inner = self.inner.lock();
        inner.document = Some(Arc::new(tree));
        self.bump(&mut inner);
        debug!("full state applied at revision {}", inner.revision);
    }

    /// Applies a batch of operations as one atomic step.
    ///
    /// Failing ops are skipped with a warning; the rest still apply. A batch
    /// arriving before any full state is skipped whole.
    pub fn apply_patch(&self, ops: &[PatchOp]) -> PatchReport {
        let mut report = PatchReport::default();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let Some(document) = inner.document.as_mut() else {
            warn!("dropping {} patch ops received before full state", ops.len());
            report.skipped = (0..ops.len())
                .map(|index| SkippedOp {
                    index,
                    error: PatchError::NoBaseState,
                })
                .collect();
            return report;
        };

        // Clones the tree only if a snapshot still holds the old one.
        let doc = Arc::make_mut(document);
        for (index, op) in ops.iter().enumerate() {
            match tree::apply(doc, op) {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    warn!("skipping patch op {} ({}): {}", index, op, error);
                    report.skipped.push(SkippedOp { index, error });
                }
            }
        }

        if report.applied > 0 {
            self.bump(inner);
        }
        report
    }

    /// Records identity from a welcome; never touches the document.
    ///
    /// Absent fields keep their current value.
    pub fn set_identity(&self, player_id: Option<String>, room_id: Option<String>) {
        let mut inner = self.inner.lock();
        if player_id.is_some() {
            inner.player_id = player_id;
        }
        if room_id.is_some() {
            inner.room_id = room_id;
        }
        self.bump(&mut inner);
    }

    /// Discards the document and room; keeps the player id.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.document = None;
        inner.room_id = None;
        self.bump(&mut inner);
    }

    /// Snapshot stamped with the current wall clock.
    #[must_use]
    pub fn snapshot(&self) -> WorldState {
        self.snapshot_at(now_ms())
    }

    /// Snapshot with growth stages evaluated at `now_ms`.
    #[must_use]
    pub fn snapshot_at(&self, now_ms: u64) -> WorldState {
        let (document, player_id, room_id, revision) = {
            let inner = self.inner.lock();
            (
                inner.document.clone(),
                inner.player_id.clone(),
                inner.room_id.clone(),
                inner.revision,
            )
        };
        WorldState::project(document, player_id, room_id, revision, now_ms)
    }

    /// Garden slot held by `player_id`.
    #[must_use]
    pub fn get_player_slot(&self, player_id: &str) -> Option<usize> {
        let document = self.inner.lock().document.clone()?;
        world::slot_of(&document, player_id)
    }

    /// Garden slot held by our own player.
    #[must_use]
    pub fn own_slot(&self) -> Option<usize> {
        let (document, player_id) = {
            let inner = self.inner.lock();
            (inner.document.clone()?, inner.player_id.clone()?)
        };
        world::slot_of(&document, &player_id)
    }

    /// Waits until our own slot is known, at most `timeout`.
    pub async fn wait_for_own_slot(&self, timeout: Duration) -> Option<usize> {
        let mut revisions = self.revisions.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(slot) = self.own_slot() {
                return Some(slot);
            }
            match tokio::time::timeout_at(deadline, revisions.changed()).await {
                Ok(Ok(())) => {}
                _ => return None,
            }
        }
    }

    /// Our player id.
    #[must_use]
    pub fn player_id(&self) -> Option<String> {
        self.inner.lock().player_id.clone()
    }

    /// Current room id.
    #[must_use]
    pub fn room_id(&self) -> Option<String> {
        self.inner.lock().room_id.clone()
    }

    /// True once a full state has been applied since the last reset.
    #[must_use]
    pub fn has_document(&self) -> bool {
        self.inner.lock().document.is_some()
    }

    /// Current revision; bumps on every applied change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Feed of revisions for pull-based consumers.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(None)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::parse_pointer;
    use serde_json::json;

    fn op_add(pointer: &str, value: Value) -> PatchOp {
        PatchOp::add(parse_pointer(pointer).unwrap(), value)
    }

    fn store_with_slot() -> StateStore {
        let store = StateStore::new(Some("p_me".into()));
        store.apply_full(json!({"child": {"data": {"userSlots": [null, {"playerId": "p_me"}]}}}));
        store
    }

    #[test]
    fn test_patch_before_full_state_is_skipped() {
        let store = StateStore::new(None);
        let report = store.apply_patch(&[op_add("/a", json!(1)), op_add("/b", json!(2))]);
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped.iter().all(|s| s.error == PatchError::NoBaseState));
        assert!(!store.has_document());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_failing_op_does_not_block_batch() {
        let store = StateStore::new(None);
        store.apply_full(json!({"a": 1}));
        let ops = vec![
            PatchOp::replace(parse_pointer("/missing").unwrap(), json!(0)),
            op_add("/b", json!(2)),
        ];
        let report = store.apply_patch(&ops);
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped[0].index, 0);
        let world = store.snapshot();
        assert_eq!(world.document(), Some(&json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_snapshot_is_independent_of_later_patches() {
        let store = StateStore::new(None);
        store.apply_full(json!({"a": 1}));
        let before = store.snapshot();
        store.apply_patch(&[PatchOp::replace(parse_pointer("/a").unwrap(), json!(2))]);
        assert_eq!(before.document(), Some(&json!({"a": 1})));
        assert_eq!(store.snapshot().document(), Some(&json!({"a": 2})));
        assert!(store.snapshot().revision > before.revision);
    }

    #[test]
    fn test_identity_merge_keeps_document() {
        let store = store_with_slot();
        store.set_identity(None, Some("MG4".into()));
        assert_eq!(store.player_id().as_deref(), Some("p_me"));
        assert_eq!(store.room_id().as_deref(), Some("MG4"));
        assert_eq!(store.get_player_slot("p_me"), Some(1));
        assert_eq!(store.get_player_slot("p_x"), None);
    }

    #[test]
    fn test_reset_keeps_player_id() {
        let store = store_with_slot();
        store.set_identity(None, Some("MG4".into()));
        store.reset();
        assert!(!store.has_document());
        assert_eq!(store.room_id(), None);
        assert_eq!(store.player_id().as_deref(), Some("p_me"));
        assert_eq!(store.own_slot(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_own_slot_times_out() {
        let store = StateStore::new(Some("p_me".into()));
        let slot = store.wait_for_own_slot(Duration::from_secs(5)).await;
        assert_eq!(slot, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_own_slot_wakes_on_full_state() {
        let store = Arc::new(StateStore::new(Some("p_me".into())));
        let writer = Arc::clone(&store);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            writer.apply_full(json!({"child": {"data": {"userSlots": [{"playerId": "p_me"}]}}}));
        });
        let slot = store.wait_for_own_slot(Duration::from_secs(5)).await;
        handle.await.unwrap();
        assert_eq!(slot, Some(0));
    }
}
