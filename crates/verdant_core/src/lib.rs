//! # VERDANT Core
//!
//! The synchronized world model of the VERDANT garden bot.
//!
//! ## Data Flow
//!
//! ```text
//!   server frames ──► ProtocolProcessor ──► StateStore ──► snapshot() ──► WorldState
//!                       (networking)        (this crate)                  (automation)
//! ```
//!
//! ## Design Principles
//!
//! 1. **Server authoritative** - the document is only ever what the server sent
//! 2. **One writer** - only the protocol processor mutates the store
//! 3. **Consistent reads** - a snapshot never mixes two halves of a batch
//! 4. **External configuration** - all behaviour knobs live in one TOML file

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod coords;
pub mod error;
pub mod store;
pub mod tree;
pub mod world;

pub use config::{
    generate_player_id, BotConfig, GardenBounds, HarvestConfig, ItemsToBuy, KeepaliveConfig,
    PetFoodConfig, ReconnectionConfig, RoomConfig, SelectionMode, ServerConfig, ShopBucket,
    ShopConfig, StockTarget,
};
pub use coords::{CoordinateMapper, Position, SpawnTableMapper};
pub use error::{ConfigError, ConfigResult, PatchError};
pub use store::{PatchReport, SkippedOp, StateStore};
pub use tree::{PatchKind, PatchOp, PathSegment};
pub use world::{
    GardenSlot, GrowthStage, Inventory, InventoryItem, ItemCategory, Pet, Player, RoomInfo,
    ShopKind, ShopListing, ShopListings, WorldState,
};
