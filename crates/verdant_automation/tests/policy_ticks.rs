//! Policy ticks against a live store and a loopback outbox.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use verdant_automation::{AutomationError, HarvestTask, PetCareTask, ShopTask};
use verdant_core::{
    HarvestConfig, PetFoodConfig, SelectionMode, ShopConfig, ShopKind, SpawnTableMapper, StateStore, StockTarget,
};
use verdant_networking::{Outbound, Outbox, SessionTask, TaskContext};

struct Harness {
    ctx: TaskContext,
    sent: mpsc::UnboundedReceiver<Outbound>,
    _active: watch::Sender<bool>,
}

impl Harness {
    fn new() -> Self {
        let (outbox, sent) = Outbox::loopback();
        let (active, active_rx) = watch::channel(true);
        let store = Arc::new(StateStore::new(Some("p_me".into())));
        let ctx = TaskContext::new(store, outbox, Arc::new(SpawnTableMapper::default()), active_rx);
        Self {
            ctx,
            sent,
            _active: active,
        }
    }

    fn drain(&mut self) -> Vec<Outbound> {
        let mut sent = Vec::new();
        while let Ok(message) = self.sent.try_recv() {
            sent.push(message);
        }
        sent
    }
}

fn plant(mutations: usize) -> Value {
    let marks = vec!["Wet"; mutations];
    json!({
        "objectType": "plant",
        "slots": [{"species": "Carrot", "startTime": 0, "endTime": 0, "mutations": marks}]
    })
}

fn world() -> Value {
    json!({
        "data": {"roomId": "MG1", "players": [{"id": "p_me", "name": "me"}]},
        "child": {
            "scope": "Quinoa",
            "data": {
                "shops": {
                    "seed": {"inventory": [{"species": "Carrot", "initialStock": 5, "price": 100}]},
                    "egg": {"inventory": []}
                },
                "userSlots": [{
                    "playerId": "p_me",
                    "data": {
                        "coinsCount": 450,
                        "inventory": {"items": [
                            {"itemType": "Produce", "species": "Aloe", "id": "aloe-1", "quantity": 1}
                        ]},
                        "petSlots": [{"id": "pet-1", "petSpecies": "Worm", "hunger": 0}],
                        "garden": {"tileObjects": {
                            "3": plant(1),
                            "8": plant(4),
                            "12": plant(5)
                        }}
                    }
                }]
            }
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_harvest_tick_replants_then_sells_best_first() {
    let mut harness = Harness::new();
    harness.ctx.store.apply_full(world());
    let task = HarvestTask::new(HarvestConfig {
        enabled: true,
        species: vec!["Carrot".into()],
        species_to_replant: vec!["Carrot".into()],
        min_mutations: 3,
        mode: SelectionMode::Highest,
        ..HarvestConfig::default()
    });

    task.tick(&harness.ctx).await.unwrap();

    assert_eq!(
        harness.drain(),
        vec![
            Outbound::Harvest { slot: 12, slots_index: 0 },
            Outbound::PlantSeed {
                slot: 12,
                species: "Carrot".into()
            },
            Outbound::Harvest { slot: 8, slots_index: 0 },
            Outbound::PlantSeed {
                slot: 8,
                species: "Carrot".into()
            },
            Outbound::Sell { slots: vec![12, 8] },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_tick_without_world_fails_and_sends_nothing() {
    let mut harness = Harness::new();
    let task = HarvestTask::new(HarvestConfig {
        species: vec!["Carrot".into()],
        ..HarvestConfig::default()
    });

    let error = task.tick(&harness.ctx).await.unwrap_err();
    assert_eq!(
        error.downcast_ref::<AutomationError>(),
        Some(&AutomationError::NoDocument)
    );
    assert!(harness.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shop_tick_keeps_reserve() {
    let mut harness = Harness::new();
    harness.ctx.store.apply_full(world());
    let mut config = ShopConfig {
        enabled: true,
        min_coins_to_keep: 250,
        ..ShopConfig::default()
    };
    config.items_to_buy.seeds.enabled = true;
    config.items_to_buy.seeds.items.insert(
        "Carrot".into(),
        StockTarget {
            min_stock: 5,
            price: None,
        },
    );

    ShopTask::new(config).tick(&harness.ctx).await.unwrap();

    assert_eq!(
        harness.drain(),
        vec![Outbound::BuyItem {
            item_id: "Carrot".into(),
            qty: 2,
            shop: ShopKind::Seed
        }]
    );
}

fn pet_config() -> PetFoodConfig {
    let mut config = PetFoodConfig {
        enabled: true,
        slot_wait_timeout_secs: 10,
        ..PetFoodConfig::default()
    };
    config.mapping.insert("Worm".into(), vec!["Aloe".into()]);
    config
}

#[tokio::test(start_paused = true)]
async fn test_pet_tick_waits_for_slot_then_feeds() {
    let mut harness = Harness::new();
    let store = Arc::clone(&harness.ctx.store);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        store.apply_full(world());
    });

    PetCareTask::with_seed(pet_config(), 1).tick(&harness.ctx).await.unwrap();

    assert_eq!(
        harness.drain(),
        vec![Outbound::FeedPet {
            pet_id: "pet-1".into(),
            food_item_id: "aloe-1".into()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_pet_tick_gives_up_after_slot_timeout() {
    let mut harness = Harness::new();
    let started = tokio::time::Instant::now();

    let error = PetCareTask::with_seed(pet_config(), 1)
        .tick(&harness.ctx)
        .await
        .unwrap_err();

    assert_eq!(
        error.downcast_ref::<AutomationError>(),
        Some(&AutomationError::SlotTimeout {
            waited: Duration::from_secs(10)
        })
    );
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(harness.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pet_movement_sends_one_batch() {
    let mut harness = Harness::new();
    harness.ctx.store.apply_full(world());
    let config = PetFoodConfig {
        movement_enabled: true,
        ..PetFoodConfig::default()
    };

    PetCareTask::with_seed(config, 42).tick(&harness.ctx).await.unwrap();

    let sent = harness.drain();
    assert_eq!(sent.len(), 1);
    let Outbound::PetPositions { pet_positions } = &sent[0] else {
        panic!("expected PetPositions, got {sent:?}");
    };
    assert_eq!(pet_positions.keys().collect::<Vec<_>>(), vec!["pet-1"]);
}

fn aloe_config() -> HarvestConfig {
    HarvestConfig {
        enabled: true,
        species: vec!["Aloe".into()],
        species_to_replant: vec!["Aloe".into()],
        min_mutations: 0,
        mode: SelectionMode::Highest,
        ..HarvestConfig::default()
    }
}

/// Own garden holding `tiles` as (tile id, plant object).
fn garden_world(tiles: &[(&str, Value)]) -> Value {
    let objects: serde_json::Map<String, Value> = tiles
        .iter()
        .map(|(tile, plant)| ((*tile).to_owned(), plant.clone()))
        .collect();
    json!({
        "data": {"players": [{"id": "p_me"}]},
        "child": {"data": {"userSlots": [{
            "playerId": "p_me",
            "data": {"garden": {"tileObjects": objects}}
        }]}}
    })
}

fn aloe_tile(crops: usize) -> Value {
    let slots: Vec<Value> = (0..crops)
        .map(|_| json!({"species": "Aloe", "startTime": 0, "endTime": 0}))
        .collect();
    json!({"objectType": "plant", "slots": slots})
}

#[tokio::test(start_paused = true)]
async fn test_multi_crop_tile_is_cleared_before_one_replant() {
    let mut harness = Harness::new();
    harness.ctx.store.apply_full(garden_world(&[("4", aloe_tile(2))]));

    HarvestTask::new(aloe_config()).tick(&harness.ctx).await.unwrap();

    assert_eq!(
        harness.drain(),
        vec![
            Outbound::Harvest { slot: 4, slots_index: 0 },
            Outbound::Harvest { slot: 4, slots_index: 1 },
            Outbound::PlantSeed {
                slot: 4,
                species: "Aloe".into()
            },
            Outbound::Sell { slots: vec![4] },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_tiles_harvested_before_a_dropped_session_are_sold_next_tick() {
    let harness = Harness::new();
    harness
        .ctx
        .store
        .apply_full(garden_world(&[("4", aloe_tile(1)), ("7", aloe_tile(1))]));
    let task = HarvestTask::new(aloe_config());

    // The session drops while the first replant is pending.
    let Harness { ctx, mut sent, _active } = harness;
    let (result, first) = tokio::join!(task.tick(&ctx), async move {
        let first = sent.recv().await;
        drop(sent);
        first
    });
    assert_eq!(first, Some(Outbound::Harvest { slot: 4, slots_index: 0 }));
    let error = result.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<verdant_networking::ConnectionError>(),
        Some(verdant_networking::ConnectionError::NotConnected)
    ));
    assert_eq!(task.unsold(), vec![4]);

    // Next session: tile 4 is empty now, tile 7 is still ready.
    let mut next = Harness::new();
    next.ctx.store.apply_full(garden_world(&[("7", aloe_tile(1))]));
    task.tick(&next.ctx).await.unwrap();

    assert_eq!(
        next.drain(),
        vec![
            Outbound::Harvest { slot: 7, slots_index: 0 },
            Outbound::PlantSeed {
                slot: 7,
                species: "Aloe".into()
            },
            Outbound::Sell { slots: vec![4, 7] },
        ]
    );
    assert!(task.unsold().is_empty());
}
