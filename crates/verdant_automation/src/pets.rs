//! # Pet Care Policy
//!
//! Two jobs per tick, each behind its own switch:
//!
//! - **feed**: every pet whose fullness has dropped to the threshold gets the
//!   first listed food still in the inventory. Stacks are counted down as the tick plans, so two
//!   pets never get the same last crop.
//! - **move**: every pet gets a uniformly random spot inside the garden bounds,
//!   sent as one `PetPositions` command.
//!
//! Both need the own garden slot; the tick waits a bounded time for it.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use verdant_core::{CoordinateMapper, GardenBounds, Inventory, ItemCategory, Pet, PetFoodConfig, Position};
use verdant_networking::{Outbound, SessionTask, TaskContext, TaskError};

use crate::error::AutomationError;

/// One planned feeding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Feeding {
    /// Pet fed.
    pub pet_id: String,
    /// Inventory item used.
    pub food_item_id: String,
    /// Food species.
    pub food: String,
}

impl Feeding {
    /// The wire command.
    #[must_use]
    pub fn command(&self) -> Outbound {
        Outbound::FeedPet {
            pet_id: self.pet_id.clone(),
            food_item_id: self.food_item_id.clone(),
        }
    }
}

/// Feedings of one tick plus the hungry pets left without food.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedingPlan {
    /// Feedings in pet order.
    pub feeds: Vec<Feeding>,
    /// Hungry pets skipped this tick.
    pub skipped: Vec<AutomationError>,
}

/// Plans feedings for `pets` from `inventory`.
#[must_use]
pub fn plan_feeding(pets: &[Pet], inventory: &Inventory, config: &PetFoodConfig) -> FeedingPlan {
    let mut remaining: Vec<u32> = inventory.items.iter().map(|item| item.quantity).collect();
    let mut plan = FeedingPlan::default();

    for pet in pets.iter().filter(|pet| pet.hunger <= config.hunger_threshold) {
        let Some(foods) = config.mapping.get(&pet.species) else {
            tracing::trace!("pets: no food mapping for {}", pet.species);
            continue;
        };
        let found = foods.iter().find_map(|food| {
            inventory.items.iter().enumerate().find(|(index, item)| {
                item.category == ItemCategory::Produce && item.name == *food && remaining[*index] > 0
            })
        });
        match found {
            Some((index, item)) => {
                remaining[index] -= 1;
                plan.feeds.push(Feeding {
                    pet_id: pet.id.clone(),
                    food_item_id: item.reference().to_owned(),
                    food: item.name.clone(),
                });
            }
            None => plan.skipped.push(AutomationError::NoFood {
                pet_id: pet.id.clone(),
                species: pet.species.clone(),
            }),
        }
    }
    plan
}

/// Random in-bounds target for every pet, mapped into server space.
///
/// `None` when there is nothing to move.
#[must_use]
pub fn plan_movement<R: Rng>(
    pets: &[Pet],
    bounds: &GardenBounds,
    slot: usize,
    mapper: &dyn CoordinateMapper,
    rng: &mut R,
) -> Option<Outbound> {
    let mut pet_positions = BTreeMap::new();
    for pet in pets {
        let local = Position::new(
            rng.gen_range(bounds.min_x..=bounds.max_x),
            rng.gen_range(bounds.min_y..=bounds.max_y),
        );
        if let Some(server) = mapper.local_to_server(slot, local) {
            pet_positions.insert(pet.id.clone(), server);
        }
    }
    (!pet_positions.is_empty()).then_some(Outbound::PetPositions { pet_positions })
}

/// Periodic feeding and wandering.
#[derive(Debug)]
pub struct PetCareTask {
    config: PetFoodConfig,
    rng: Mutex<StdRng>,
}

impl PetCareTask {
    /// Creates the task with an entropy-seeded generator.
    #[must_use]
    pub fn new(config: PetFoodConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Creates the task with a fixed seed.
    #[must_use]
    pub fn with_seed(config: PetFoodConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PetFoodConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let mut world = ctx.store.snapshot();
        if world.own_slot().is_none() {
            let waited = self.config.slot_wait_timeout();
            if ctx.store.wait_for_own_slot(waited).await.is_none() {
                return Err(AutomationError::SlotTimeout { waited }.into());
            }
            world = ctx.store.snapshot();
        }
        let slot = world.own_slot().ok_or(AutomationError::SlotTimeout {
            waited: Duration::ZERO,
        })?;

        if self.config.enabled {
            let plan = plan_feeding(&world.pets, &world.inventory, &self.config);
            for feeding in &plan.feeds {
                ctx.outbox.send(feeding.command())?;
                tracing::info!("fed pet {} with {}", feeding.pet_id, feeding.food);
            }
            for skipped in &plan.skipped {
                tracing::debug!("pets: {}", skipped);
            }
        }

        if self.config.movement_enabled {
            let command = {
                let mut rng = self.rng.lock();
                plan_movement(&world.pets, &self.config.bounds, slot, ctx.mapper.as_ref(), &mut *rng)
            };
            if let Some(command) = command {
                ctx.outbox.send(command)?;
            }
        }
        Ok(())
    }
}

impl SessionTask for PetCareTask {
    fn name(&self) -> &str {
        "pets"
    }

    fn interval(&self) -> Duration {
        self.config.interval()
    }

    fn run_immediately(&self) -> bool {
        false
    }

    fn tick<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        self.run(ctx).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdant_core::{InventoryItem, SpawnTableMapper};

    fn pet(id: &str, species: &str, hunger: f64) -> Pet {
        Pet {
            id: id.into(),
            species: species.into(),
            hunger,
            position: None,
            owner_slot: 0,
        }
    }

    fn produce(id: &str, name: &str, quantity: u32) -> InventoryItem {
        InventoryItem {
            id: Some(id.into()),
            category: ItemCategory::Produce,
            name: name.into(),
            quantity,
        }
    }

    fn config() -> PetFoodConfig {
        let mut config = PetFoodConfig {
            enabled: true,
            ..PetFoodConfig::default()
        };
        config
            .mapping
            .insert("Bee".into(), vec!["OrangeTulip".into(), "Aloe".into()]);
        config.mapping.insert("Worm".into(), vec!["Aloe".into()]);
        config
    }

    #[test]
    fn test_last_crop_is_not_fed_twice() {
        let pets = vec![pet("w1", "Worm", 0.0), pet("w2", "Worm", 0.0)];
        let inventory = Inventory {
            items: vec![produce("a1", "Aloe", 1)],
        };
        let plan = plan_feeding(&pets, &inventory, &config());
        assert_eq!(plan.feeds.len(), 1);
        assert_eq!(plan.feeds[0].pet_id, "w1");
        assert_eq!(plan.feeds[0].food_item_id, "a1");
        assert_eq!(
            plan.skipped,
            vec![AutomationError::NoFood {
                pet_id: "w2".into(),
                species: "Worm".into()
            }]
        );
    }

    #[test]
    fn test_listed_foods_are_tried_in_order() {
        let pets = vec![pet("b1", "Bee", 0.0)];
        let inventory = Inventory {
            items: vec![produce("a1", "Aloe", 3), produce("t1", "OrangeTulip", 0)],
        };
        let plan = plan_feeding(&pets, &inventory, &config());
        assert_eq!(plan.feeds[0].food, "Aloe");
        assert_eq!(
            plan.feeds[0].command(),
            Outbound::FeedPet {
                pet_id: "b1".into(),
                food_item_id: "a1".into()
            }
        );
    }

    #[test]
    fn test_starving_pet_is_fed_and_full_pet_is_not() {
        let pets = vec![pet("full", "Worm", 5_000.0), pet("starving", "Worm", 0.0)];
        let inventory = Inventory {
            items: vec![produce("a1", "Aloe", 4)],
        };
        let plan = plan_feeding(&pets, &inventory, &config());
        let fed: Vec<&str> = plan.feeds.iter().map(|f| f.pet_id.as_str()).collect();
        assert_eq!(fed, vec!["starving"]);
        assert!(plan.skipped.is_empty());

        let mut lenient = config();
        lenient.hunger_threshold = 5_000.0;
        assert_eq!(plan_feeding(&pets, &inventory, &lenient).feeds.len(), 2);
    }

    #[test]
    fn test_seeds_are_not_food() {
        let pets = vec![pet("w1", "Worm", 0.0), pet("c1", "Chicken", 0.0)];
        let seed = InventoryItem {
            id: None,
            category: ItemCategory::Seed,
            name: "Aloe".into(),
            quantity: 10,
        };
        let plan = plan_feeding(&pets, &Inventory { items: vec![seed] }, &config());
        assert!(plan.feeds.is_empty());
        assert_eq!(
            plan.skipped,
            vec![AutomationError::NoFood {
                pet_id: "w1".into(),
                species: "Worm".into()
            }]
        );
    }

    #[test]
    fn test_movement_stays_in_bounds() {
        let pets = vec![pet("p1", "Bee", 0.0), pet("p2", "Worm", 0.0)];
        let bounds = GardenBounds {
            min_x: 2,
            max_x: 4,
            min_y: 1,
            max_y: 1,
        };
        let mapper = SpawnTableMapper::default();
        let spawn = mapper.spawn_point(0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let Some(Outbound::PetPositions { pet_positions }) = plan_movement(&pets, &bounds, 0, &mapper, &mut rng)
            else {
                panic!("expected pet positions");
            };
            assert_eq!(pet_positions.len(), 2);
            for position in pet_positions.values() {
                let local = Position::new(position.x - spawn.x + 11, position.y - spawn.y + 11);
                assert!(bounds.contains(local), "{local:?} out of bounds");
            }
        }
        assert_eq!(plan_movement(&[], &bounds, 0, &mapper, &mut rng), None);
    }
}
