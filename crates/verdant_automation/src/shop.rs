//! # Shop Policy
//!
//! Restocks configured seeds and eggs to their minimum levels.
//!
//! ```text
//!   shortfall = min_stock - owned          (skip when owned >= min_stock)
//!   quantity  = min(shortfall, shop stock)  (skip when out of stock)
//!   quantity  = min(quantity, (balance - reserve) / unit price)
//!   balance  -= quantity * unit price       (running, across the tick)
//! ```
//!
//! Items are checked in config order, seeds before eggs. One unaffordable
//! item never blocks the next.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use verdant_core::{Inventory, ShopBucket, ShopConfig, ShopKind, ShopListings, StockTarget};
use verdant_networking::{Outbound, SessionTask, TaskContext, TaskError};

use crate::error::AutomationError;

/// One planned purchase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Purchase {
    /// Shop bought from.
    pub shop: ShopKind,
    /// Species or egg id.
    pub item_id: String,
    /// Units bought.
    pub quantity: u32,
    /// Total cost.
    pub cost: u64,
}

impl Purchase {
    /// The wire command.
    #[must_use]
    pub fn command(&self) -> Outbound {
        Outbound::BuyItem {
            item_id: self.item_id.clone(),
            qty: self.quantity,
            shop: self.shop,
        }
    }
}

/// Purchases of one tick, the items skipped and the balance left.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShopPlan {
    /// Purchases in order.
    pub purchases: Vec<Purchase>,
    /// Under-stocked items not bought this tick.
    pub skipped: Vec<AutomationError>,
    /// Balance after every purchase.
    pub projected_balance: u64,
}

/// Plans purchases against a balance of `coins`.
#[must_use]
pub fn plan_purchases(coins: u64, inventory: &Inventory, shops: &ShopListings, config: &ShopConfig) -> ShopPlan {
    let mut plan = ShopPlan {
        projected_balance: coins,
        ..ShopPlan::default()
    };
    let buckets = [
        (ShopKind::Seed, &config.items_to_buy.seeds),
        (ShopKind::Egg, &config.items_to_buy.eggs),
    ];
    for (kind, bucket) in buckets {
        plan_bucket(&mut plan, kind, bucket, inventory, shops, config.min_coins_to_keep);
    }
    plan
}

fn plan_bucket(
    plan: &mut ShopPlan,
    kind: ShopKind,
    bucket: &ShopBucket,
    inventory: &Inventory,
    shops: &ShopListings,
    reserve: u64,
) {
    if !bucket.enabled {
        return;
    }
    for (item_id, target) in &bucket.items {
        match plan_item(kind, item_id, target, inventory, shops, plan.projected_balance, reserve) {
            Ok(Some(purchase)) => {
                plan.projected_balance -= purchase.cost;
                plan.purchases.push(purchase);
            }
            Ok(None) => {}
            Err(skipped) => plan.skipped.push(skipped),
        }
    }
}

fn plan_item(
    kind: ShopKind,
    item_id: &str,
    target: &StockTarget,
    inventory: &Inventory,
    shops: &ShopListings,
    balance: u64,
    reserve: u64,
) -> Result<Option<Purchase>, AutomationError> {
    let owned = inventory.quantity(kind.category(), item_id);
    let Some(shortfall) = target.min_stock.checked_sub(owned).filter(|n| *n > 0) else {
        return Ok(None);
    };
    let out_of_stock = || AutomationError::OutOfStock {
        shop: kind,
        item: item_id.to_owned(),
    };
    let listing = shops.find(kind, item_id).ok_or_else(out_of_stock)?;
    if listing.stock == 0 {
        return Err(out_of_stock());
    }
    let unit = listing
        .price
        .or(target.price)
        .ok_or_else(|| AutomationError::UnknownPrice { item: item_id.to_owned() })?;

    let wanted = shortfall.min(listing.stock);
    let spendable = balance.saturating_sub(reserve);
    let affordable = if unit == 0 {
        wanted
    } else {
        u32::try_from(spendable / unit).unwrap_or(u32::MAX).min(wanted)
    };
    if affordable == 0 {
        return Err(AutomationError::InsufficientFunds {
            item: item_id.to_owned(),
            cost: unit,
            balance,
            reserve,
        });
    }
    Ok(Some(Purchase {
        shop: kind,
        item_id: item_id.to_owned(),
        quantity: affordable,
        cost: unit * u64::from(affordable),
    }))
}

/// Periodic restocking.
#[derive(Debug)]
pub struct ShopTask {
    config: ShopConfig,
}

impl ShopTask {
    /// Creates the task.
    #[must_use]
    pub fn new(config: ShopConfig) -> Self {
        Self { config }
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let world = ctx.store.snapshot();
        if !world.has_document() {
            return Err(AutomationError::NoDocument.into());
        }
        let plan = plan_purchases(world.coins, &world.inventory, &world.shops, &self.config);
        for skipped in &plan.skipped {
            tracing::debug!("shop: {}", skipped);
        }
        for purchase in &plan.purchases {
            ctx.outbox.send(purchase.command())?;
            tracing::info!(
                "bought {} x{} for {} coins",
                purchase.item_id,
                purchase.quantity,
                purchase.cost
            );
        }
        if !plan.purchases.is_empty() {
            tracing::info!("shop: {} coins left", plan.projected_balance);
        }
        Ok(())
    }
}

impl SessionTask for ShopTask {
    fn name(&self) -> &str {
        "shop"
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
    use verdant_core::{InventoryItem, ItemCategory, ShopListing};

    fn listing(item_id: &str, stock: u32, price: Option<u64>) -> ShopListing {
        ShopListing {
            item_id: item_id.into(),
            stock,
            price,
        }
    }

    fn config(reserve: u64, seeds: &[(&str, u32)]) -> ShopConfig {
        let mut config = ShopConfig {
            enabled: true,
            min_coins_to_keep: reserve,
            ..ShopConfig::default()
        };
        config.items_to_buy.seeds.enabled = true;
        for (id, min_stock) in seeds {
            config.items_to_buy.seeds.items.insert(
                (*id).into(),
                StockTarget {
                    min_stock: *min_stock,
                    price: None,
                },
            );
        }
        config
    }

    fn seeds(items: Vec<ShopListing>) -> ShopListings {
        ShopListings {
            seeds: items,
            eggs: Vec::new(),
        }
    }

    #[test]
    fn test_buys_shortfall_clamped_to_stock() {
        let inventory = Inventory {
            items: vec![InventoryItem {
                id: None,
                category: ItemCategory::Seed,
                name: "Carrot".into(),
                quantity: 2,
            }],
        };
        let shops = seeds(vec![listing("Carrot", 3, Some(10))]);
        let plan = plan_purchases(1_000, &inventory, &shops, &config(0, &[("Carrot", 10)]));
        assert_eq!(
            plan.purchases,
            vec![Purchase {
                shop: ShopKind::Seed,
                item_id: "Carrot".into(),
                quantity: 3,
                cost: 30
            }]
        );
        assert_eq!(plan.projected_balance, 970);
    }

    #[test]
    fn test_reserve_is_never_crossed() {
        let shops = seeds(vec![listing("Apple", 10, Some(100)), listing("Bamboo", 10, Some(40))]);
        let plan = plan_purchases(
            500,
            &Inventory::default(),
            &shops,
            &config(300, &[("Apple", 5), ("Bamboo", 5)]),
        );
        // Apple: 200 spendable buys 2; Bamboo: nothing left above the reserve.
        assert_eq!(plan.purchases.len(), 1);
        assert_eq!(plan.purchases[0].quantity, 2);
        assert_eq!(plan.projected_balance, 300);
        assert!(matches!(
            plan.skipped.as_slice(),
            [AutomationError::InsufficientFunds { item, .. }] if item == "Bamboo"
        ));
    }

    #[test]
    fn test_each_item_is_judged_on_its_own() {
        let shops = seeds(vec![listing("Apple", 1, Some(1_000)), listing("Bamboo", 4, Some(5))]);
        let plan = plan_purchases(
            100,
            &Inventory::default(),
            &shops,
            &config(50, &[("Apple", 1), ("Bamboo", 4)]),
        );
        assert_eq!(plan.purchases.len(), 1);
        assert_eq!(plan.purchases[0].item_id, "Bamboo");
        assert_eq!(plan.purchases[0].quantity, 4);
        assert_eq!(plan.skipped.len(), 1);
    }

    #[test]
    fn test_missing_price_or_stock_skips() {
        let shops = seeds(vec![listing("Apple", 5, None), listing("Bamboo", 0, Some(1))]);
        let plan = plan_purchases(
            1_000,
            &Inventory::default(),
            &shops,
            &config(0, &[("Apple", 1), ("Bamboo", 1), ("Corn", 1)]),
        );
        assert!(plan.purchases.is_empty());
        assert_eq!(
            plan.skipped,
            vec![
                AutomationError::UnknownPrice { item: "Apple".into() },
                AutomationError::OutOfStock {
                    shop: ShopKind::Seed,
                    item: "Bamboo".into()
                },
                AutomationError::OutOfStock {
                    shop: ShopKind::Seed,
                    item: "Corn".into()
                },
            ]
        );
    }

    #[test]
    fn test_config_price_fills_in_and_disabled_bucket_is_ignored() {
        let mut config = config(0, &[("Apple", 2)]);
        config.items_to_buy.seeds.items.get_mut("Apple").unwrap().price = Some(7);
        let shops = seeds(vec![listing("Apple", 5, None)]);
        let plan = plan_purchases(100, &Inventory::default(), &shops, &config);
        assert_eq!(plan.purchases[0].cost, 14);

        config.items_to_buy.seeds.enabled = false;
        assert!(plan_purchases(100, &Inventory::default(), &shops, &config)
            .purchases
            .is_empty());
    }
}
