//! Integer and floating-point geometry shared by the pyramid and stream paths.
//!
//! Tile rectangles are integer pixel rectangles in the coordinate space of the
//! full image (or the full channel, for streamed frames). Viewports are
//! floating-point rectangles in the same space, since display walls map
//! screens onto content with fractional scale factors.

use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered, widened to avoid overflow on gigapixel levels.
    #[inline]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True when either dimension exceeds the other size.
    #[inline]
    pub const fn exceeds(&self, other: Size) -> bool {
        self.width > other.width || self.height > other.height
    }

    /// True when either dimension falls short of the other size.
    #[inline]
    pub const fn undershoots(&self, other: Size) -> bool {
        self.width < other.width || self.height < other.height
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Column and row of a tile in a level grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub col: u32,
    pub row: u32,
}

impl TileCoord {
    pub const fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

/// Integer pixel rectangle with a top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub const fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    #[inline]
    pub const fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    #[inline]
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlap with a viewport.
    ///
    /// Edges are half-open: a viewport that only touches a tile's border does
    /// not select the tile, and empty rectangles never intersect anything.
    pub fn intersects(&self, viewport: &RectF) -> bool {
        if self.is_empty() || viewport.is_empty() {
            return false;
        }
        let left = self.x as f64;
        let top = self.y as f64;
        let right = self.right() as f64;
        let bottom = self.bottom() as f64;

        left < viewport.right()
            && viewport.x < right
            && top < viewport.bottom()
            && viewport.y < bottom
    }

    /// Common area of two rectangles, `None` when they do not overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        if (x0 as u64) >= x1 || (y0 as u64) >= y1 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0 as u64) as u32, (y1 - y0 as u64) as u32))
    }
}

impl From<Rect> for RectF {
    fn from(rect: Rect) -> Self {
        RectF::new(
            rect.x as f64,
            rect.y as f64,
            rect.width as f64,
            rect.height as f64,
        )
    }
}

/// Floating-point viewport rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Zero, negative, or NaN extents count as empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}
