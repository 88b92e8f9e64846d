//! Periodic one-line status from the snapshot feed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use verdant_core::{StateStore, WorldState};

/// One status line for `world`.
#[must_use]
pub fn summary(world: &WorldState) -> String {
    if !world.has_document() {
        return "waiting for world state".into();
    }
    let ready = world.garden.iter().filter(|crop| crop.ready()).count();
    let slot = world
        .own_slot()
        .map_or_else(|| "-".to_owned(), |slot| slot.to_string());
    format!(
        "room {} slot {} coins {} crops {}/{} ready pets {}",
        world.room.room_id.as_deref().unwrap_or("-"),
        slot,
        world.coins,
        ready,
        world.garden.len(),
        world.pets.len()
    )
}

/// Logs a summary every `every` until the task is aborted.
pub async fn report(store: Arc<StateStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    let mut last_revision = u64::MAX;
    loop {
        ticker.tick().await;
        let world = store.snapshot();
        if world.revision == last_revision {
            continue;
        }
        last_revision = world.revision;
        tracing::info!("{}", summary(&world));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_of_empty_and_loaded_world() {
        let store = StateStore::new(Some("p_me".into()));
        assert_eq!(summary(&store.snapshot()), "waiting for world state");

        store.set_identity(None, Some("MG2".into()));
        store.apply_full(json!({
            "child": {"data": {"userSlots": [
                null,
                {"playerId": "p_me", "data": {"coinsCount": 75}}
            ]}}
        }));
        assert_eq!(
            summary(&store.snapshot_at(10)),
            "room MG2 slot 1 coins 75 crops 0/0 ready pets 0"
        );
    }
}
