//! Level geometry and size-driven level selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geometry::Size;

/// Size and tiling of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelGeometry {
    pub level: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    /// Width of level 0 divided by the width of this level
    pub downsample: f64,
}

impl LevelGeometry {
    pub fn image_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn tile_size(&self) -> Size {
        Size::new(self.tile_width, self.tile_height)
    }

    pub fn tile_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }
}

/// How [`select_level`] treats a target size that falls between two levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelPolicy {
    /// Largest level that fits inside the target
    #[default]
    AtMost,
    /// Smallest level that still covers the target
    AtLeast,
}

impl LevelPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            LevelPolicy::AtMost => "at_most",
            LevelPolicy::AtLeast => "at_least",
        }
    }
}

impl fmt::Display for LevelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LevelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "at_most" | "at-most" => Ok(LevelPolicy::AtMost),
            "at_least" | "at-least" => Ok(LevelPolicy::AtLeast),
            other => Err(format!(
                "unknown level policy '{}', expected at_most or at_least",
                other
            )),
        }
    }
}

/// Pick a level for a target size from level sizes ordered largest first.
///
/// Walks down from level 0 while the current level exceeds the target in
/// either dimension, stopping at the last level. `AtLeast` then steps back
/// one level when the level found falls short of the target in either
/// dimension. Returns `None` only when there are no levels.
pub fn select_level(sizes: &[Size], target: Size, policy: LevelPolicy) -> Option<usize> {
    let last = sizes.len().checked_sub(1)?;

    let mut level = 0;
    while level < last && sizes[level].exceeds(target) {
        level += 1;
    }

    if policy == LevelPolicy::AtLeast && level > 0 && sizes[level].undershoots(target) {
        level -= 1;
    }
    Some(level)
}
