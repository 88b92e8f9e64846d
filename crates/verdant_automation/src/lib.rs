//! # VERDANT Automation
//!
//! Three independent policies, each a [`SessionTask`] on its own interval:
//!
//! ```text
//!   StateStore::snapshot() ──► plan (pure) ──► Outbox::send ──► room
//!        harvest │ pets │ shop
//! ```
//!
//! Planning is a pure function of one snapshot and the policy config, so
//! every decision is testable without a connection. A failed tick is logged
//! by the session runner and the policy waits for its next interval.
//!
//! [`SessionTask`]: verdant_networking::SessionTask

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod engine;
pub mod error;
pub mod harvest;
pub mod pets;
pub mod shop;

pub use engine::AutomationEngine;
pub use error::{AutomationError, AutomationResult};
pub use harvest::{select, sell_order, HarvestPick, HarvestPlan, HarvestTask, REPLANT_DELAY};
pub use pets::{plan_feeding, plan_movement, Feeding, FeedingPlan, PetCareTask};
pub use shop::{plan_purchases, Purchase, ShopPlan, ShopTask};
