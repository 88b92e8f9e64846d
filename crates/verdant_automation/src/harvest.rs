//! # Harvest Policy
//!
//! ```text
//!   garden ──► ready + species + mutations >= min ──► order by mode ──► cap
//!          ──► Harvest per pick (+ PlantSeed once the tile is clear)
//!          ──► one Sell per tile, best crops first
//! ```
//!
//! Harvested tiles stay queued until a `Sell` for them goes out, so a tick
//! cut short by a dropped session is sold by the next one.
//!
//! Modes:
//! - `first`: the first match in slot order, one crop per species
//! - `lowest`: every match, fewest mutations first
//! - `highest`: every match, most mutations first

use std::cmp::Reverse;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use verdant_core::{GardenSlot, HarvestConfig, SelectionMode};
use verdant_networking::{Outbound, SessionTask, TaskContext, TaskError};

use crate::error::AutomationError;

/// Pause between a harvest and the replant of the same tile.
pub const REPLANT_DELAY: Duration = Duration::from_millis(300);

/// One crop chosen for harvest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarvestPick {
    /// Tile id.
    pub slot: u32,
    /// Crop index within the tile.
    pub crop_index: u32,
    /// Species harvested.
    pub species: String,
    /// Mutations on the crop.
    pub mutation_count: u32,
    /// Whether to plant the same species again.
    pub replant: bool,
}

/// Ready crops of `species` with at least `min_mutations`, ordered by `mode`.
#[must_use]
pub fn select<'a>(
    garden: &'a [GardenSlot],
    species: &str,
    min_mutations: u32,
    mode: SelectionMode,
) -> Vec<&'a GardenSlot> {
    let mut matches: Vec<&GardenSlot> = garden
        .iter()
        .filter(|crop| {
            crop.ready() && crop.species.as_deref() == Some(species) && crop.mutation_count >= min_mutations
        })
        .collect();
    match mode {
        SelectionMode::First => {
            matches.sort_by_key(|crop| (crop.slot, crop.crop_index));
            matches.truncate(1);
        }
        SelectionMode::Lowest => matches.sort_by_key(|crop| (crop.mutation_count, crop.slot, crop.crop_index)),
        SelectionMode::Highest => {
            matches.sort_by_key(|crop| (Reverse(crop.mutation_count), crop.slot, crop.crop_index));
        }
    }
    matches
}

/// Everything one tick will harvest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HarvestPlan {
    /// Picks in harvest order.
    pub picks: Vec<HarvestPick>,
}

impl HarvestPlan {
    /// Plans a tick over `garden`.
    #[must_use]
    pub fn plan(garden: &[GardenSlot], config: &HarvestConfig) -> Self {
        let cap = config.max_per_tick.unwrap_or(usize::MAX);
        let mut picks: Vec<HarvestPick> = Vec::new();
        'species: for species in &config.species {
            let replant = config.species_to_replant.contains(species);
            for crop in select(garden, species, config.min_mutations, config.mode) {
                if picks.len() >= cap {
                    break 'species;
                }
                if picks
                    .iter()
                    .any(|p| p.slot == crop.slot && p.crop_index == crop.crop_index)
                {
                    continue;
                }
                picks.push(HarvestPick {
                    slot: crop.slot,
                    crop_index: crop.crop_index,
                    species: species.clone(),
                    mutation_count: crop.mutation_count,
                    replant,
                });
            }
        }
        Self { picks }
    }

    /// True when nothing qualifies.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    /// True when the pick at `index` is the last one on its tile and the
    /// tile should be planted again after it.
    #[must_use]
    pub fn replants_after(&self, index: usize) -> bool {
        let Some(pick) = self.picks.get(index) else {
            return false;
        };
        pick.replant && !self.picks[index + 1..].iter().any(|later| later.slot == pick.slot)
    }

    /// Harvested tiles by mutation count descending, then tile ascending.
    #[must_use]
    pub fn sell_order(&self) -> Vec<u32> {
        sell_order(&self.picks)
    }

    /// The batched sell, if anything was harvested.
    #[must_use]
    pub fn sell(&self) -> Option<Outbound> {
        sell_command(&self.picks)
    }
}

/// Tiles of `picks`, each once, ranked by its best crop: mutation count
/// descending, then tile ascending.
#[must_use]
pub fn sell_order(picks: &[HarvestPick]) -> Vec<u32> {
    let mut ordered: Vec<&HarvestPick> = picks.iter().collect();
    ordered.sort_by_key(|p| (Reverse(p.mutation_count), p.slot, p.crop_index));
    let mut slots: Vec<u32> = Vec::with_capacity(ordered.len());
    for pick in ordered {
        if !slots.contains(&pick.slot) {
            slots.push(pick.slot);
        }
    }
    slots
}

fn sell_command(picks: &[HarvestPick]) -> Option<Outbound> {
    (!picks.is_empty()).then(|| Outbound::Sell {
        slots: sell_order(picks),
    })
}

/// Periodic harvest, replant and sell.
#[derive(Debug)]
pub struct HarvestTask {
    config: HarvestConfig,
    replant_delay: Duration,
    unsold: Mutex<Vec<HarvestPick>>,
}

impl HarvestTask {
    /// Creates the task.
    #[must_use]
    pub fn new(config: HarvestConfig) -> Self {
        Self {
            config,
            replant_delay: REPLANT_DELAY,
            unsold: Mutex::new(Vec::new()),
        }
    }

    /// Overrides the pause before a replant.
    #[must_use]
    pub fn with_replant_delay(mut self, delay: Duration) -> Self {
        self.replant_delay = delay;
        self
    }

    /// Harvested tiles still waiting for a `Sell`.
    #[must_use]
    pub fn unsold(&self) -> Vec<u32> {
        sell_order(&self.unsold.lock())
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let world = ctx.store.snapshot();
        if !world.has_document() {
            return Err(AutomationError::NoDocument.into());
        }
        let plan = HarvestPlan::plan(&world.garden, &self.config);
        if plan.is_empty() && self.unsold.lock().is_empty() {
            tracing::debug!("harvest: nothing ready");
            return Ok(());
        }

        for (index, pick) in plan.picks.iter().enumerate() {
            ctx.outbox.send(Outbound::Harvest {
                slot: pick.slot,
                slots_index: pick.crop_index,
            })?;
            self.unsold.lock().push(pick.clone());
            tracing::debug!(
                "harvest: {} at tile {} ({} mutations)",
                pick.species,
                pick.slot,
                pick.mutation_count
            );
            if plan.replants_after(index) {
                tokio::time::sleep(self.replant_delay).await;
                ctx.outbox.send(Outbound::PlantSeed {
                    slot: pick.slot,
                    species: pick.species.clone(),
                })?;
            }
        }
        let pending = self.unsold.lock().clone();
        if let Some(sell) = sell_command(&pending) {
            ctx.outbox.send(sell)?;
            self.unsold.lock().clear();
        }
        tracing::info!(
            "harvested {} crops, sold {} tiles",
            plan.picks.len(),
            sell_order(&pending).len()
        );
        Ok(())
    }
}

impl SessionTask for HarvestTask {
    fn name(&self) -> &str {
        "harvest"
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
