//! # Bot Configuration
//!
//! Loaded once at startup from TOML. Every field has a default so a config
//! file only needs the session cookie and whatever it wants to change.
//!
//! ```toml
//! cookies = "mc_jwt=..."
//!
//! [harvest]
//! enabled = true
//! species = ["Carrot"]
//! mode = "highest"
//!
//! [shop.items_to_buy.seeds]
//! enabled = true
//! items = { Carrot = { min_stock = 10 } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::coords::{Position, DEFAULT_SPAWN_POINTS};
use crate::error::{ConfigError, ConfigResult};

/// Upper bound on configured reconnect attempts.
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Upper bound on the backoff cap, seconds.
pub const MAX_DELAY_LIMIT_SECS: u64 = 300;

const PLAYER_ID_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const PLAYER_ID_LEN: usize = 16;

/// Generates a fresh player id (`p_` + 16 base58 characters).
pub fn generate_player_id<R: Rng>(rng: &mut R) -> String {
    let suffix: String = (0..PLAYER_ID_LEN)
        .map(|_| char::from(PLAYER_ID_ALPHABET[rng.gen_range(0..PLAYER_ID_ALPHABET.len())]))
        .collect();
    format!("p_{suffix}")
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Persistent player id; generated on first start when absent.
    pub player_id: Option<String>,
    /// Session cookie string sent with auth and the socket upgrade.
    pub cookies: String,
    /// Room selection.
    pub room: RoomConfig,
    /// Server endpoint.
    pub server: ServerConfig,
    /// Harvest policy.
    pub harvest: HarvestConfig,
    /// Pet care policy.
    pub pet_food: PetFoodConfig,
    /// Shop policy.
    pub shop: ShopConfig,
    /// Reconnect backoff.
    pub reconnection: ReconnectionConfig,
    /// Keepalive and position broadcast.
    pub keepalive: KeepaliveConfig,
    /// Spawn point of each garden slot, server coordinates.
    pub spawn_points: Vec<Position>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            player_id: None,
            cookies: String::new(),
            room: RoomConfig::default(),
            server: ServerConfig::default(),
            harvest: HarvestConfig::default(),
            pet_food: PetFoodConfig::default(),
            shop: ShopConfig::default(),
            reconnection: ReconnectionConfig::default(),
            keepalive: KeepaliveConfig::default(),
            spawn_points: DEFAULT_SPAWN_POINTS.to_vec(),
        }
    }
}

impl BotConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or wrong field types.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file is unreadable, malformed or
    /// fails [`BotConfig::validate`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field the bot cannot run without.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Invalid`] found.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cookies.trim().is_empty() {
            return Err(ConfigError::invalid("cookies", "session cookie is required"));
        }
        if let Some(id) = &self.player_id {
            if id.trim().is_empty() {
                return Err(ConfigError::invalid("player_id", "must not be empty when set"));
            }
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid("server.host", "must not be empty"));
        }
        self.room.validate()?;
        self.reconnection.validate()?;
        self.keepalive.validate()?;
        self.harvest.validate()?;
        self.pet_food.validate()?;
        if self.shop.check_interval_seconds == 0 {
            return Err(ConfigError::invalid("shop.check_interval_seconds", "must be positive"));
        }
        if self.spawn_points.is_empty() {
            return Err(ConfigError::invalid("spawn_points", "at least one spawn point is required"));
        }
        Ok(())
    }
}

/// Room selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Room tried first (the last room joined, or a fixed one).
    pub preferred: Option<String>,
    /// Whether to fall back to the public rooms.
    pub search_main_rooms: bool,
    /// Public rooms, tried in order.
    pub main_rooms: Vec<String>,
    /// Bound on one join attempt, seconds.
    pub join_timeout_secs: u64,
    /// Window after welcome for the room state to arrive, seconds.
    pub grace_secs: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            preferred: None,
            search_main_rooms: true,
            main_rooms: (1..=15).map(|i| format!("MG{i}")).collect(),
            join_timeout_secs: 5,
            grace_secs: 3,
        }
    }
}

impl RoomConfig {
    /// Rooms to try in order. `override_room` beats the preferred room.
    #[must_use]
    pub fn candidates(&self, override_room: Option<&str>) -> Vec<String> {
        let first = override_room.map(str::to_owned).or_else(|| self.preferred.clone());
        let mut rooms: Vec<String> = first.into_iter().collect();
        if self.search_main_rooms {
            for room in &self.main_rooms {
                if !rooms.contains(room) {
                    rooms.push(room.clone());
                }
            }
        }
        rooms
    }

    /// Join timeout as a duration.
    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    /// Grace window as a duration.
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.preferred.is_none() && !(self.search_main_rooms && !self.main_rooms.is_empty()) {
            return Err(ConfigError::invalid(
                "room",
                "no preferred room and main room search is disabled",
            ));
        }
        if self.join_timeout_secs == 0 {
            return Err(ConfigError::invalid("room.join_timeout_secs", "must be positive"));
        }
        Ok(())
    }
}

/// Server endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name.
    pub host: String,
    /// Client version segment of every URL.
    pub game_version: String,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "magicgarden.gg".into(),
            game_version: "cb622cd".into(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .into(),
        }
    }
}

/// Which matching crops a harvest tick takes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// The first match by slot order.
    First,
    /// All matches, fewest mutations first.
    Lowest,
    /// All matches, most mutations first.
    #[default]
    Highest,
}

/// Harvest policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Policy switch.
    pub enabled: bool,
    /// Species to harvest.
    pub species: Vec<String>,
    /// Species replanted right after harvest.
    pub species_to_replant: Vec<String>,
    /// Minimum mutations for a crop to qualify.
    pub min_mutations: u32,
    /// Selection mode.
    pub mode: SelectionMode,
    /// Cap on harvests per tick.
    pub max_per_tick: Option<usize>,
    /// Tick interval, seconds.
    pub check_interval_seconds: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            species: Vec::new(),
            species_to_replant: Vec::new(),
            min_mutations: 3,
            mode: SelectionMode::default(),
            max_per_tick: None,
            check_interval_seconds: 30,
        }
    }
}

impl HarvestConfig {
    /// Tick interval as a duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.check_interval_seconds == 0 {
            return Err(ConfigError::invalid("harvest.check_interval_seconds", "must be positive"));
        }
        if self.max_per_tick == Some(0) {
            return Err(ConfigError::invalid("harvest.max_per_tick", "must be positive when set"));
        }
        Ok(())
    }
}

/// Garden-local area pets may wander in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GardenBounds {
    /// Smallest column.
    pub min_x: i32,
    /// Largest column.
    pub max_x: i32,
    /// Smallest row.
    pub min_y: i32,
    /// Largest row.
    pub max_y: i32,
}

impl Default for GardenBounds {
    fn default() -> Self {
        Self {
            min_x: 0,
            max_x: 22,
            min_y: 0,
            max_y: 11,
        }
    }
}

impl GardenBounds {
    /// True when `position` lies inside the bounds, edges included.
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        (self.min_x..=self.max_x).contains(&position.x) && (self.min_y..=self.max_y).contains(&position.y)
    }
}

/// Pet care policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PetFoodConfig {
    /// Feeding switch.
    pub enabled: bool,
    /// Wandering switch.
    pub movement_enabled: bool,
    /// Pet species to foods, first available wins.
    pub mapping: BTreeMap<String, Vec<String>>,
    /// Feed once the fullness gauge is at or below this value.
    pub hunger_threshold: f64,
    /// Local area pets are moved within.
    pub bounds: GardenBounds,
    /// Bound on waiting for the own slot, seconds.
    pub slot_wait_timeout_secs: u64,
    /// Tick interval, seconds.
    pub check_interval_seconds: u64,
}

impl Default for PetFoodConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            movement_enabled: false,
            mapping: BTreeMap::new(),
            hunger_threshold: 0.0,
            bounds: GardenBounds::default(),
            slot_wait_timeout_secs: 10,
            check_interval_seconds: 5,
        }
    }
}

impl PetFoodConfig {
    /// Tick interval as a duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// Slot wait bound as a duration.
    #[must_use]
    pub fn slot_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.slot_wait_timeout_secs)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.check_interval_seconds == 0 {
            return Err(ConfigError::invalid("pet_food.check_interval_seconds", "must be positive"));
        }
        if self.bounds.min_x > self.bounds.max_x || self.bounds.min_y > self.bounds.max_y {
            return Err(ConfigError::invalid("pet_food.bounds", "min exceeds max"));
        }
        if !self.hunger_threshold.is_finite() {
            return Err(ConfigError::invalid("pet_food.hunger_threshold", "must be finite"));
        }
        if let Some((species, _)) = self.mapping.iter().find(|(_, foods)| foods.is_empty()) {
            return Err(ConfigError::invalid(
                format!("pet_food.mapping.{species}"),
                "food list is empty",
            ));
        }
        Ok(())
    }
}

/// Desired stock of one shop item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockTarget {
    /// Keep at least this many in inventory.
    pub min_stock: u32,
    /// Unit price used when the shop does not publish one.
    pub price: Option<u64>,
}

/// Items of one shop to keep stocked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopBucket {
    /// Bucket switch.
    pub enabled: bool,
    /// Item id to stock target.
    pub items: BTreeMap<String, StockTarget>,
}

/// Seed and egg buckets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemsToBuy {
    /// Seed shop.
    pub seeds: ShopBucket,
    /// Egg shop.
    pub eggs: ShopBucket,
}

/// Shop policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    /// Policy switch.
    pub enabled: bool,
    /// Balance never spent below.
    pub min_coins_to_keep: u64,
    /// Tick interval, seconds.
    pub check_interval_seconds: u64,
    /// Stock targets.
    pub items_to_buy: ItemsToBuy,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_coins_to_keep: 0,
            check_interval_seconds: 10,
            items_to_buy: ItemsToBuy::default(),
        }
    }
}

impl ShopConfig {
    /// Tick interval as a duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

/// Reconnect backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    /// Consecutive failures before giving up.
    pub max_retries: u32,
    /// First delay, seconds.
    pub base_delay: u64,
    /// Delay cap, seconds.
    pub max_delay: u64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: 5,
            max_delay: 60,
        }
    }
}

impl ReconnectionConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 || self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::invalid(
                "reconnection.max_retries",
                format!("must be within 1..={MAX_RETRIES_LIMIT}"),
            ));
        }
        if self.base_delay == 0 {
            return Err(ConfigError::invalid("reconnection.base_delay", "must be positive"));
        }
        if self.max_delay < self.base_delay || self.max_delay > MAX_DELAY_LIMIT_SECS {
            return Err(ConfigError::invalid(
                "reconnection.max_delay",
                format!("must be within base_delay..={MAX_DELAY_LIMIT_SECS}"),
            ));
        }
        Ok(())
    }
}

/// Keepalive and position broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Ping interval, milliseconds.
    pub ping_interval_ms: u64,
    /// Position broadcast interval, seconds.
    pub position_interval_secs: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 2000,
            position_interval_secs: 30,
        }
    }
}

impl KeepaliveConfig {
    /// Ping interval as a duration.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Position broadcast interval as a duration.
    #[must_use]
    pub fn position_interval(&self) -> Duration {
        Duration::from_secs(self.position_interval_secs)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.ping_interval_ms == 0 {
            return Err(ConfigError::invalid("keepalive.ping_interval_ms", "must be positive"));
        }
        if self.position_interval_secs == 0 {
            return Err(ConfigError::invalid("keepalive.position_interval_secs", "must be positive"));
        }
        Ok(())
    }
}
