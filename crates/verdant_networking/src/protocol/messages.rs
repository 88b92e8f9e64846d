//! # Wire Messages
//!
//! Every frame is one JSON object with a `type` tag. Outbound frames also
//! carry a `scopePath` naming the handler on the server:
//!
//! ```text
//! {"scopePath":["Room"],"type":"VoteForGame","gameName":"Quinoa"}
//! {"scopePath":["Room","Quinoa"],"type":"Ping","id":17}
//! ```
//!
//! A handful of transports also speak bare-text `ping` / `pong` keepalives;
//! those never reach [`decode`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use verdant_core::tree::PatchOp;
use verdant_core::world::{ShopKind, GAME_SCOPE};
use verdant_core::Position;

use crate::error::ProtocolError;

/// Room-level scope.
pub const ROOM_SCOPE: &str = "Room";

/// Bare-text keepalive sent by the server.
pub const TEXT_PING: &str = "ping";

/// Bare-text keepalive reply.
pub const TEXT_PONG: &str = "pong";

/// True when `raw` is a bare-text keepalive ping.
#[must_use]
pub fn is_text_ping(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case(TEXT_PING)
}

/// Decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Join acknowledgement.
    Welcome {
        /// Player id the server assigned us, if stated.
        player_id: Option<String>,
        /// Room joined, if stated.
        room_id: Option<String>,
        /// Room document sent along with the welcome.
        full_state: Option<Value>,
    },
    /// Complete room document.
    FullState(Value),
    /// Incremental changes.
    PartialState {
        /// Well-formed ops, in batch order.
        ops: Vec<PatchOp>,
        /// Ops dropped as malformed.
        dropped: usize,
    },
    /// Keepalive request expecting an echo.
    Ping {
        /// Id to echo.
        id: Value,
    },
    /// Reply to one of our pings.
    Pong {
        /// Id we sent.
        id: Value,
    },
    /// Any other type; ignored.
    Other {
        /// The `type` tag.
        kind: String,
    },
}

impl Inbound {
    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Welcome { .. } => "Welcome",
            Self::FullState(_) => "FullState",
            Self::PartialState { .. } => "PartialState",
            Self::Ping { .. } => "Ping",
            Self::Pong { .. } => "Pong",
            Self::Other { kind } => kind,
        }
    }
}

/// Decodes one text frame.
///
/// # Errors
///
/// Returns a [`ProtocolError`] for non-JSON, non-object or untyped frames.
pub fn decode(raw: &str) -> Result<Inbound, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(ProtocolError::InvalidJson)?;
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::NotAnObject);
    };
    let kind = match object.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(ProtocolError::MissingType),
    };

    Ok(match kind.as_str() {
        "Welcome" => Inbound::Welcome {
            player_id: take_string(&mut object, "playerId"),
            room_id: take_string(&mut object, "roomId"),
            full_state: object.remove("fullState").filter(|tree| !tree.is_null()),
        },
        "FullState" => {
            let tree = object.remove("fullState").or_else(|| object.remove("state"));
            Inbound::FullState(tree.unwrap_or_else(|| {
                object.remove("scopePath");
                Value::Object(object)
            }))
        }
        "PartialState" => partial_state(&mut object),
        "Ping" => Inbound::Ping {
            id: object.remove("id").unwrap_or(Value::Null),
        },
        "Pong" => Inbound::Pong {
            id: object.remove("id").unwrap_or(Value::Null),
        },
        _ => Inbound::Other { kind },
    })
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn partial_state(object: &mut Map<String, Value>) -> Inbound {
    let raw_ops = match object.remove("patches").or_else(|| object.remove("patch")) {
        Some(Value::Array(ops)) => ops,
        Some(_) => {
            tracing::warn!("PartialState patches field is not an array");
            Vec::new()
        }
        None => Vec::new(),
    };
    let mut dropped = 0;
    let ops = raw_ops
        .iter()
        .filter_map(|raw| match PatchOp::from_wire(raw) {
            Ok(op) => Some(op),
            Err(error) => {
                tracing::warn!("dropping malformed patch op: {}", error);
                dropped += 1;
                None
            }
        })
        .collect();
    Inbound::PartialState { ops, dropped }
}

/// Outbound command.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Outbound {
    /// Vote for the game to run in the room.
    VoteForGame {
        /// Game name.
        game_name: String,
    },
    /// Select the game to run in the room.
    SetSelectedGame {
        /// Game name.
        game_name: String,
    },
    /// Keepalive with a monotonic id.
    Ping {
        /// Ping id.
        id: u64,
    },
    /// Echo of a server ping.
    Pong {
        /// Echoed id.
        id: Value,
    },
    /// Our avatar position, server coordinates.
    PlayerPosition {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Plant a seed on a garden tile.
    PlantSeed {
        /// Tile id.
        slot: u32,
        /// Seed species.
        species: String,
    },
    /// Harvest one crop.
    Harvest {
        /// Tile id.
        slot: u32,
        /// Crop index within the tile.
        slots_index: u32,
    },
    /// Sell harvested crops.
    Sell {
        /// Tiles harvested this tick, in sell order.
        slots: Vec<u32>,
    },
    /// Feed a pet.
    FeedPet {
        /// Pet id.
        pet_id: String,
        /// Inventory item used as food.
        food_item_id: String,
    },
    /// Buy from a shop.
    BuyItem {
        /// Species or egg id.
        item_id: String,
        /// Quantity.
        qty: u32,
        /// Shop to buy from.
        shop: ShopKind,
    },
    /// Move pets, server coordinates.
    PetPositions {
        /// Pet id to target position.
        pet_positions: BTreeMap<String, Position>,
    },
}

impl Outbound {
    /// Vote for the garden game.
    #[must_use]
    pub fn vote_for_game() -> Self {
        Self::VoteForGame {
            game_name: GAME_SCOPE.to_owned(),
        }
    }

    /// Select the garden game.
    #[must_use]
    pub fn select_game() -> Self {
        Self::SetSelectedGame {
            game_name: GAME_SCOPE.to_owned(),
        }
    }

    /// Wire `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::VoteForGame { .. } => "VoteForGame",
            Self::SetSelectedGame { .. } => "SetSelectedGame",
            Self::Ping { .. } => "Ping",
            Self::Pong { .. } => "Pong",
            Self::PlayerPosition { .. } => "PlayerPosition",
            Self::PlantSeed { .. } => "PlantSeed",
            Self::Harvest { .. } => "Harvest",
            Self::Sell { .. } => "Sell",
            Self::FeedPet { .. } => "FeedPet",
            Self::BuyItem { .. } => "BuyItem",
            Self::PetPositions { .. } => "PetPositions",
        }
    }

    /// Handler path on the server.
    #[must_use]
    pub const fn scope_path(&self) -> &'static [&'static str] {
        match self {
            Self::VoteForGame { .. } | Self::SetSelectedGame { .. } => &[ROOM_SCOPE],
            _ => &[ROOM_SCOPE, GAME_SCOPE],
        }
    }

    /// Serializes the command into one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut value = serde_json::to_value(self).map_err(ProtocolError::Encode)?;
        if let Value::Object(object) = &mut value {
            object.insert(
                "scopePath".to_owned(),
                Value::from(self.scope_path().to_vec()),
            );
        }
        serde_json::to_string(&value).map_err(ProtocolError::Encode)
    }
}
