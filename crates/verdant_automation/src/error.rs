//! # Automation Error Types
//!
//! Every error here is recovered inside the policy that raised it: logged,
//! then retried on the next tick.

use std::time::Duration;

use thiserror::Error;
use verdant_core::ShopKind;

/// Errors raised by a policy tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    /// No full state has arrived yet.
    #[error("world state not received yet")]
    NoDocument,

    /// Our player holds no garden slot.
    #[error("own garden slot unknown after {waited:?}")]
    SlotTimeout {
        /// How long the tick waited.
        waited: Duration,
    },

    /// A hungry pet has none of its listed foods in the inventory.
    #[error("no food for {species} pet {pet_id}")]
    NoFood {
        /// Pet identifier.
        pet_id: String,
        /// Pet species.
        species: String,
    },

    /// A purchase would eat into the coin reserve.
    #[error("buying {item} costs {cost}, balance {balance} must stay at or above {reserve}")]
    InsufficientFunds {
        /// Item id.
        item: String,
        /// Cost of a single unit.
        cost: u64,
        /// Projected balance before the purchase.
        balance: u64,
        /// Configured reserve.
        reserve: u64,
    },

    /// Neither the shop nor the config gives a price.
    #[error("no price known for {item}")]
    UnknownPrice {
        /// Item id.
        item: String,
    },

    /// The shop does not list the item or has none left.
    #[error("{shop:?} shop has no {item} in stock")]
    OutOfStock {
        /// Shop.
        shop: ShopKind,
        /// Item id.
        item: String,
    },
}

/// Result type for automation operations.
pub type AutomationResult<T> = Result<T, AutomationError>;
