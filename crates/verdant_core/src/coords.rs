//! # Coordinates
//!
//! Every garden has the same local layout. The server places each of the six
//! gardens at its own offset in one shared map:
//!
//! ```text
//!  slot 0 (14,14)   slot 1 (40,14)   slot 2 (66,14)
//!  slot 3 (14,25)   slot 4 (40,25)   slot 5 (66,25)
//!
//!  server = spawn[slot] + (local - anchor)      anchor = (11,11)
//! ```

use serde::{Deserialize, Serialize};

/// An (x, y) tile position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Local position that lines up with a garden's spawn point.
pub const LOCAL_ANCHOR: Position = Position::new(11, 11);

/// Spawn point of each garden slot in server coordinates.
pub const DEFAULT_SPAWN_POINTS: [Position; 6] = [
    Position::new(14, 14),
    Position::new(40, 14),
    Position::new(66, 14),
    Position::new(14, 25),
    Position::new(40, 25),
    Position::new(66, 25),
];

/// Converts between garden-local and server coordinates.
pub trait CoordinateMapper: Send + Sync {
    /// Server position of a slot's spawn point.
    fn spawn_point(&self, slot: usize) -> Option<Position>;

    /// Maps a garden-local position of `slot` into server space.
    fn local_to_server(&self, slot: usize, local: Position) -> Option<Position>;
}

/// [`CoordinateMapper`] backed by a spawn-point table.
#[derive(Clone, Debug)]
pub struct SpawnTableMapper {
    spawn_points: Vec<Position>,
    anchor: Position,
}

impl SpawnTableMapper {
    /// Creates a mapper from a spawn table.
    #[must_use]
    pub fn new(spawn_points: Vec<Position>) -> Self {
        Self {
            spawn_points,
            anchor: LOCAL_ANCHOR,
        }
    }
}

impl Default for SpawnTableMapper {
    fn default() -> Self {
        Self::new(DEFAULT_SPAWN_POINTS.to_vec())
    }
}

impl CoordinateMapper for SpawnTableMapper {
    fn spawn_point(&self, slot: usize) -> Option<Position> {
        self.spawn_points.get(slot).copied()
    }

    fn local_to_server(&self, slot: usize, local: Position) -> Option<Position> {
        let spawn = self.spawn_point(slot)?;
        Some(Position::new(
            spawn.x + (local.x - self.anchor.x),
            spawn.y + (local.y - self.anchor.y),
        ))
    }
}
