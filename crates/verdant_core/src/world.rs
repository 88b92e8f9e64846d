//! # World State
//!
//! Typed, read-only view of the synchronized document, built at snapshot
//! time. Automation reads only this; it never touches the raw tree.
//!
//! ```text
//!   document (serde_json::Value)
//!     ├── data.players[]             → players
//!     └── child (scope "Quinoa")
//!           ├── data.userSlots[i]    → own garden / inventory / pets / coins
//!           └── data.shops           → shop listings
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coords::Position;

/// Scope name of the garden game inside a room.
pub const GAME_SCOPE: &str = "Quinoa";

/// Number of user slots (gardens) per room.
pub const GARDEN_CAPACITY: usize = 6;

static NULL: Value = Value::Null;

/// Growth stage of a crop, ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GrowthStage {
    /// Just planted.
    Seed,
    /// First third done.
    Sprout,
    /// Two thirds done.
    Mature,
    /// Harvestable.
    Ready,
}

impl GrowthStage {
    /// Stage of a crop planted at `start_ms` that finishes at `end_ms`.
    ///
    /// A crop without an end time is treated as ready.
    #[must_use]
    pub fn at(start_ms: Option<u64>, end_ms: Option<u64>, now_ms: u64) -> Self {
        let Some(end) = end_ms else {
            return Self::Ready;
        };
        if now_ms >= end {
            return Self::Ready;
        }
        match start_ms {
            Some(start) if start < end => {
                let thirds = now_ms.saturating_sub(start).saturating_mul(3) / (end - start);
                match thirds {
                    0 => Self::Seed,
                    1 => Self::Sprout,
                    _ => Self::Mature,
                }
            }
            _ => Self::Seed,
        }
    }
}

/// Room-level facts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoomInfo {
    /// Room identifier, if known.
    pub room_id: Option<String>,
    /// Player hosting the room.
    pub host_player_id: Option<String>,
    /// Active game scope (`Quinoa` once the garden game runs).
    pub scope: Option<String>,
    /// User slots holding a player.
    pub occupied_slots: usize,
}

/// A player in the room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    /// Player identifier.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Last known position.
    pub position: Option<Position>,
    /// Garden slot owned by the player.
    pub slot: Option<usize>,
}

/// One crop position in the own garden.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GardenSlot {
    /// Tile id of the plant.
    pub slot: u32,
    /// Crop index within the tile.
    pub crop_index: u32,
    /// Species growing there, if any.
    pub species: Option<String>,
    /// Growth stage at snapshot time.
    pub stage: GrowthStage,
    /// Number of mutations on the crop.
    pub mutation_count: u32,
}

impl GardenSlot {
    /// True when a crop is present and fully grown.
    #[must_use]
    #[inline]
    pub fn ready(&self) -> bool {
        self.species.is_some() && self.stage == GrowthStage::Ready
    }
}

/// Inventory item categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemCategory {
    /// Plantable seed.
    Seed,
    /// Harvested crop.
    Produce,
    /// Tool.
    Tool,
    /// Pet in storage.
    Pet,
    /// Unhatched egg.
    Egg,
}

impl ItemCategory {
    fn from_wire(item_type: &str) -> Option<Self> {
        match item_type {
            "Seed" => Some(Self::Seed),
            "Produce" | "Crop" => Some(Self::Produce),
            "Tool" => Some(Self::Tool),
            "Pet" => Some(Self::Pet),
            "Egg" => Some(Self::Egg),
            _ => None,
        }
    }

    /// Field holding the item's name for this category.
    const fn name_field(self) -> &'static str {
        match self {
            Self::Seed | Self::Produce => "species",
            Self::Tool => "toolId",
            Self::Pet => "petSpecies",
            Self::Egg => "eggId",
        }
    }
}

/// One inventory stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryItem {
    /// Item identifier, when the server assigns one.
    pub id: Option<String>,
    /// Category.
    pub category: ItemCategory,
    /// Species or item name.
    pub name: String,
    /// Stack size, never negative.
    pub quantity: u32,
}

impl InventoryItem {
    /// Identifier used when referring to the item in commands.
    #[must_use]
    pub fn reference(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// Own inventory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Items in server order.
    pub items: Vec<InventoryItem>,
}

impl Inventory {
    /// Total quantity of items with this category and name.
    #[must_use]
    pub fn quantity(&self, category: ItemCategory, name: &str) -> u32 {
        self.items
            .iter()
            .filter(|item| item.category == category && item.name == name)
            .map(|item| item.quantity)
            .sum()
    }

    /// First item of this category and name with a positive quantity.
    #[must_use]
    pub fn find_available(&self, category: ItemCategory, name: &str) -> Option<&InventoryItem> {
        self.items
            .iter()
            .find(|item| item.category == category && item.name == name && item.quantity > 0)
    }
}

/// A pet placed in the own garden.
#[derive(Clone, Debug, PartialEq)]
pub struct Pet {
    /// Pet identifier.
    pub id: String,
    /// Species.
    pub species: String,
    /// Fullness gauge as reported by the server; 0 means starving.
    pub hunger: f64,
    /// Server position, if known.
    pub position: Option<Position>,
    /// Garden slot the pet lives in.
    pub owner_slot: usize,
}

/// Which shop a listing belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShopKind {
    /// Seed shop.
    Seed,
    /// Egg shop.
    Egg,
}

impl ShopKind {
    /// Wire name of the shop.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Egg => "egg",
        }
    }

    /// Inventory category bought from this shop.
    #[must_use]
    pub const fn category(self) -> ItemCategory {
        match self {
            Self::Seed => ItemCategory::Seed,
            Self::Egg => ItemCategory::Egg,
        }
    }

    const fn id_field(self) -> &'static str {
        match self {
            Self::Seed => "species",
            Self::Egg => "eggId",
        }
    }
}

/// One item offered by a shop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShopListing {
    /// Species or egg id.
    pub item_id: String,
    /// Remaining stock.
    pub stock: u32,
    /// Unit price when the server publishes one.
    pub price: Option<u64>,
}

/// Listings of both shops.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShopListings {
    /// Seed shop.
    pub seeds: Vec<ShopListing>,
    /// Egg shop.
    pub eggs: Vec<ShopListing>,
}

impl ShopListings {
    /// Listing for `item_id` in the given shop.
    #[must_use]
    pub fn find(&self, kind: ShopKind, item_id: &str) -> Option<&ShopListing> {
        let listings = match kind {
            ShopKind::Seed => &self.seeds,
            ShopKind::Egg => &self.eggs,
        };
        listings.iter().find(|listing| listing.item_id == item_id)
    }
}

/// Read-only view of the world at one revision.
#[derive(Clone, Debug, Default)]
pub struct WorldState {
    /// Store revision the snapshot was taken at.
    pub revision: u64,
    /// Snapshot instant (ms since epoch) used for growth stages.
    pub taken_at_ms: u64,
    /// Our own player id.
    pub self_id: Option<String>,
    /// Room facts.
    pub room: RoomInfo,
    /// Players by id.
    pub players: HashMap<String, Player>,
    /// Own garden, ordered by slot then crop index.
    pub garden: Vec<GardenSlot>,
    /// Own inventory.
    pub inventory: Inventory,
    /// Own pets.
    pub pets: Vec<Pet>,
    /// Own coin balance.
    pub coins: u64,
    /// Shop listings.
    pub shops: ShopListings,
    document: Option<Arc<Value>>,
}

impl WorldState {
    /// Projects a raw document into a typed view.
    #[must_use]
    pub fn project(
        document: Option<Arc<Value>>,
        self_id: Option<String>,
        room_id: Option<String>,
        revision: u64,
        now_ms: u64,
    ) -> Self {
        let mut state = Self {
            revision,
            taken_at_ms: now_ms,
            room: RoomInfo {
                room_id,
                ..RoomInfo::default()
            },
            ..Self::default()
        };
        if let Some(tree) = document.as_deref() {
            state.fill(tree, self_id.as_deref(), now_ms);
        }
        state.self_id = self_id;
        state.document = document;
        state
    }

    fn fill(&mut self, tree: &Value, self_id: Option<&str>, now_ms: u64) {
        if self.room.room_id.is_none() {
            self.room.room_id = str_at(tree, "/data/roomId");
        }
        self.room.host_player_id = str_at(tree, "/data/hostPlayerId");
        self.room.scope = str_at(tree, "/child/scope");

        let slots = user_slots(tree);
        self.room.occupied_slots = slots.iter().filter(|s| slot_player(s).is_some()).count();

        for player in array_at(tree, "/data/players").iter().filter(|p| p.is_object()) {
            let Some(id) = player.get("id").and_then(Value::as_str) else {
                continue;
            };
            let slot = slots.iter().position(|s| slot_player(s) == Some(id));
            let position = slot
                .and_then(|i| slots[i].get("position"))
                .and_then(position_of)
                .or_else(|| player.get("position").and_then(position_of));
            self.players.insert(
                id.to_owned(),
                Player {
                    id: id.to_owned(),
                    name: player.get("name").and_then(Value::as_str).map(str::to_owned),
                    position,
                    slot,
                },
            );
        }

        self.shops = ShopListings {
            seeds: listings(tree, ShopKind::Seed),
            eggs: listings(tree, ShopKind::Egg),
        };

        let Some((own_index, own)) = self_id.and_then(|id| {
            slots
                .iter()
                .enumerate()
                .find(|(_, s)| slot_player(s) == Some(id))
        }) else {
            return;
        };
        let data = own.get("data").unwrap_or(&NULL);
        self.coins = uint(data.get("coinsCount"));
        self.garden = garden(data, now_ms);
        self.inventory = inventory(data);
        self.pets = pets(own, data, own_index);
    }

    /// Garden slot owned by `self_id`.
    #[must_use]
    pub fn own_slot(&self) -> Option<usize> {
        let id = self.self_id.as_deref()?;
        self.players
            .get(id)
            .and_then(|player| player.slot)
            .or_else(|| self.document.as_deref().and_then(|tree| slot_of(tree, id)))
    }

    /// True once a full state has been received.
    #[must_use]
    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    /// Raw document the view was projected from.
    #[must_use]
    pub fn document(&self) -> Option<&Value> {
        self.document.as_deref()
    }
}

/// Index of the user slot held by `player_id`.
#[must_use]
pub fn slot_of(tree: &Value, player_id: &str) -> Option<usize> {
    user_slots(tree)
        .iter()
        .position(|slot| slot_player(slot) == Some(player_id))
}

/// True when every garden is taken by someone other than `player_id`.
#[must_use]
pub fn garden_full_for(tree: &Value, player_id: &str) -> bool {
    let slots = user_slots(tree);
    let occupied = slots.iter().filter(|s| slot_player(s).is_some()).count();
    occupied >= GARDEN_CAPACITY && slot_of(tree, player_id).is_none()
}

/// True when `player_id` is listed among the room's players or slots.
#[must_use]
pub fn player_present(tree: &Value, player_id: &str) -> bool {
    let listed = array_at(tree, "/data/players")
        .iter()
        .any(|p| p.get("id").and_then(Value::as_str) == Some(player_id));
    listed || slot_of(tree, player_id).is_some()
}

fn user_slots(tree: &Value) -> &[Value] {
    array_at(tree, "/child/data/userSlots")
}

fn slot_player(slot: &Value) -> Option<&str> {
    slot.get("playerId").and_then(Value::as_str)
}

fn array_at<'a>(tree: &'a Value, pointer: &str) -> &'a [Value] {
    tree.pointer(pointer)
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

fn str_at(tree: &Value, pointer: &str) -> Option<String> {
    tree.pointer(pointer).and_then(Value::as_str).map(str::to_owned)
}

/// Non-negative integer, accepting floats and clamping negatives to zero.
fn uint(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| if f > 0.0 { f as u64 } else { 0 }))
            .unwrap_or(0),
        _ => 0,
    }
}

fn opt_uint(value: Option<&Value>) -> Option<u64> {
    value.filter(|v| v.is_number()).map(|v| uint(Some(v)))
}

fn position_of(value: &Value) -> Option<Position> {
    let x = value.get("x").and_then(Value::as_f64)?;
    let y = value.get("y").and_then(Value::as_f64)?;
    Some(Position::new(x.round() as i32, y.round() as i32))
}

fn garden(data: &Value, now_ms: u64) -> Vec<GardenSlot> {
    let Some(tiles) = data.pointer("/garden/tileObjects").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut garden = Vec::new();
    for (tile, object) in tiles {
        let Ok(slot) = tile.parse::<u32>() else {
            continue;
        };
        if object.get("objectType").and_then(Value::as_str) != Some("plant") {
            continue;
        }
        let crops = object.get("slots").and_then(Value::as_array).map_or(&[][..], Vec::as_slice);
        for (crop_index, crop) in crops.iter().enumerate() {
            let species = crop.get("species").and_then(Value::as_str).map(str::to_owned);
            let stage = if crop.is_object() {
                GrowthStage::at(opt_uint(crop.get("startTime")), opt_uint(crop.get("endTime")), now_ms)
            } else {
                GrowthStage::Seed
            };
            let mutation_count = crop
                .get("mutations")
                .and_then(Value::as_array)
                .map_or(0, |m| m.len() as u32);
            garden.push(GardenSlot {
                slot,
                crop_index: crop_index as u32,
                species,
                stage,
                mutation_count,
            });
        }
    }
    garden.sort_by_key(|g| (g.slot, g.crop_index));
    garden
}

fn inventory(data: &Value) -> Inventory {
    let items = array_at(data, "/inventory/items")
        .iter()
        .filter_map(|raw| {
            let category = ItemCategory::from_wire(raw.get("itemType")?.as_str()?)?;
            let name = raw.get(category.name_field())?.as_str()?.to_owned();
            let quantity = match raw.get("quantity") {
                Some(q) => uint(Some(q)).min(u64::from(u32::MAX)) as u32,
                None => 1,
            };
            Some(InventoryItem {
                id: raw.get("id").and_then(Value::as_str).map(str::to_owned),
                category,
                name,
                quantity,
            })
        })
        .collect();
    Inventory { items }
}

fn pets(own: &Value, data: &Value, owner_slot: usize) -> Vec<Pet> {
    let infos = own.get("petSlotInfos");
    array_at(data, "/petSlots")
        .iter()
        .filter_map(|raw| {
            let id = raw.get("id")?.as_str()?.to_owned();
            let position = infos
                .and_then(|i| i.get(&id))
                .and_then(|info| info.get("position"))
                .and_then(position_of);
            Some(Pet {
                species: raw
                    .get("petSpecies")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                hunger: raw.get("hunger").and_then(Value::as_f64).unwrap_or(0.0),
                position,
                owner_slot,
                id,
            })
        })
        .collect()
}

fn listings(tree: &Value, kind: ShopKind) -> Vec<ShopListing> {
    let pointer = format!("/child/data/shops/{}/inventory", kind.as_str());
    array_at(tree, &pointer)
        .iter()
        .filter_map(|raw| {
            Some(ShopListing {
                item_id: raw.get(kind.id_field())?.as_str()?.to_owned(),
                stock: uint(raw.get("initialStock")).min(u64::from(u32::MAX)) as u32,
                price: opt_uint(raw.get("price")),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "data": {
                "roomId": "MG3",
                "hostPlayerId": "p_host",
                "players": [
                    {"id": "p_me", "name": "me"},
                    {"id": "p_other", "name": "other", "position": {"x": 3, "y": 4}},
                    null
                ]
            },
            "child": {
                "scope": "Quinoa",
                "data": {
                    "userSlots": [
                        {"playerId": "p_other"},
                        {
                            "playerId": "p_me",
                            "position": {"x": 40, "y": 14},
                            "petSlotInfos": {"pet1": {"position": {"x": 41, "y": 15}}},
                            "data": {
                                "coinsCount": 1500,
                                "inventory": {"items": [
                                    {"itemType": "Seed", "species": "Carrot", "quantity": 4},
                                    {"itemType": "Produce", "species": "Carrot", "id": "c1"},
                                    {"itemType": "Tool", "toolId": "Shovel", "quantity": -2},
                                    {"itemType": "Mystery"}
                                ]},
                                "petSlots": [{"id": "pet1", "petSpecies": "Bunny", "hunger": 12.5}],
                                "garden": {"tileObjects": {
                                    "7": {"objectType": "plant", "slots": [
                                        {"species": "Carrot", "startTime": 0, "endTime": 100, "mutations": ["Gold"]}
                                    ]},
                                    "2": {"objectType": "plant", "slots": [
                                        {"species": "Tomato", "startTime": 0, "endTime": 3000, "mutations": []},
                                        {"species": "Tomato", "startTime": 0, "endTime": 3000}
                                    ]},
                                    "9": {"objectType": "decor"}
                                }}
                            }
                        },
                        null
                    ],
                    "shops": {
                        "seed": {"inventory": [{"species": "Carrot", "initialStock": 5, "price": 10}]},
                        "egg": {"inventory": [{"eggId": "CommonEgg", "initialStock": 0}]}
                    }
                }
            }
        })
    }

    fn project(now_ms: u64) -> WorldState {
        WorldState::project(Some(Arc::new(sample())), Some("p_me".into()), None, 7, now_ms)
    }

    #[test]
    fn test_growth_stage_thirds() {
        assert_eq!(GrowthStage::at(Some(0), Some(300), 0), GrowthStage::Seed);
        assert_eq!(GrowthStage::at(Some(0), Some(300), 150), GrowthStage::Sprout);
        assert_eq!(GrowthStage::at(Some(0), Some(300), 250), GrowthStage::Mature);
        assert_eq!(GrowthStage::at(Some(0), Some(300), 300), GrowthStage::Ready);
        assert_eq!(GrowthStage::at(None, None, 0), GrowthStage::Ready);
        assert!(GrowthStage::Seed < GrowthStage::Ready);
    }

    #[test]
    fn test_projects_room_and_players() {
        let world = project(1000);
        assert_eq!(world.revision, 7);
        assert_eq!(world.room.room_id.as_deref(), Some("MG3"));
        assert_eq!(world.room.host_player_id.as_deref(), Some("p_host"));
        assert_eq!(world.room.scope.as_deref(), Some(GAME_SCOPE));
        assert_eq!(world.room.occupied_slots, 2);
        assert_eq!(world.players.len(), 2);
        assert_eq!(world.players["p_me"].slot, Some(1));
        assert_eq!(world.players["p_me"].position, Some(Position::new(40, 14)));
        assert_eq!(world.players["p_other"].position, Some(Position::new(3, 4)));
        assert_eq!(world.own_slot(), Some(1));
    }

    #[test]
    fn test_projects_own_garden_sorted() {
        let world = project(1000);
        let tiles: Vec<_> = world.garden.iter().map(|g| (g.slot, g.crop_index)).collect();
        assert_eq!(tiles, vec![(2, 0), (2, 1), (7, 0)]);
        assert!(world.garden[2].ready());
        assert_eq!(world.garden[2].mutation_count, 1);
        assert_eq!(world.garden[0].stage, GrowthStage::Sprout);
        assert!(!world.garden[0].ready());
    }

    #[test]
    fn test_projects_inventory_pets_coins_shops() {
        let world = project(1000);
        assert_eq!(world.coins, 1500);
        assert_eq!(world.inventory.items.len(), 3);
        assert_eq!(world.inventory.quantity(ItemCategory::Seed, "Carrot"), 4);
        assert_eq!(world.inventory.quantity(ItemCategory::Produce, "Carrot"), 1);
        assert_eq!(world.inventory.quantity(ItemCategory::Tool, "Shovel"), 0);
        assert_eq!(world.pets.len(), 1);
        assert_eq!(world.pets[0].position, Some(Position::new(41, 15)));
        assert!((world.pets[0].hunger - 12.5).abs() < f64::EPSILON);
        assert_eq!(world.shops.find(ShopKind::Seed, "Carrot").map(|l| l.price), Some(Some(10)));
        assert_eq!(world.shops.find(ShopKind::Egg, "CommonEgg").map(|l| l.stock), Some(0));
    }

    #[test]
    fn test_garden_full_only_without_own_slot() {
        let mut tree = json!({"child": {"data": {"userSlots": [
            {"playerId": "a"}, {"playerId": "b"}, {"playerId": "c"},
            {"playerId": "d"}, {"playerId": "e"}, {"playerId": "f"}
        ]}}});
        assert!(garden_full_for(&tree, "p_me"));
        assert!(!garden_full_for(&tree, "c"));
        tree["child"]["data"]["userSlots"][5] = Value::Null;
        assert!(!garden_full_for(&tree, "p_me"));
    }

    #[test]
    fn test_empty_projection_without_document() {
        let world = WorldState::project(None, Some("p_me".into()), Some("MG1".into()), 0, 0);
        assert!(!world.has_document());
        assert!(world.garden.is_empty());
        assert_eq!(world.own_slot(), None);
        assert_eq!(world.room.room_id.as_deref(), Some("MG1"));
    }
}
