//! Coordinates and geometric primitives shared across the crate.
//!
//! `Coordinate` follows the bit-exact pack described in spec.md §6: 13 bits
//! X, 13 bits Y, 5 bits Z, 1 bit user flag, fitting in a single `u32`. The
//! packed form is what gets stored in congestion/path-center back-references
//! where a dense index is cheaper than a struct; the unpacked form is what
//! the rest of the crate works with day to day.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MAX_WIDTH_CELLS: u32 = 8192; // 2^13
pub const MAX_HEIGHT_CELLS: u32 = 8192; // 2^13
pub const MAX_Z_LAYERS: u32 = 32; // 2^5, via-layers are not addressable as Z

/// A single cell location in the 3-D routing grid, plus the one-bit user
/// flag the original format carries alongside it (used by callers to tag a
/// coordinate, e.g. as belonging to a particular terminal-swap state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: u16,
    pub y: u16,
    pub z: u8,
    pub flag: bool,
}

impl Coordinate {
    pub fn new(x: u16, y: u16, z: u8) -> Self {
        Self {
            x,
            y,
            z,
            flag: false,
        }
    }

    pub fn with_flag(x: u16, y: u16, z: u8, flag: bool) -> Self {
        Self { x, y, z, flag }
    }

    pub fn validate(&self) -> Result<()> {
        if (self.x as u32) >= MAX_WIDTH_CELLS
            || (self.y as u32) >= MAX_HEIGHT_CELLS
            || (self.z as u32) >= MAX_Z_LAYERS
        {
            return Err(Error::CoordinateOutOfBounds(*self));
        }
        Ok(())
    }

    /// Pack into the bit-exact 32-bit layout: [flag:1][Z:5][Y:13][X:13].
    pub fn pack(&self) -> u32 {
        (self.x as u32)
            | ((self.y as u32) << 13)
            | ((self.z as u32) << 26)
            | ((self.flag as u32) << 31)
    }

    pub fn unpack(bits: u32) -> Self {
        Self {
            x: (bits & 0x1FFF) as u16,
            y: ((bits >> 13) & 0x1FFF) as u16,
            z: ((bits >> 26) & 0x1F) as u8,
            flag: (bits >> 31) & 1 != 0,
        }
    }

    /// Manhattan-ish per-axis deltas to another coordinate, used by the
    /// contiguous-path fill and move-legality checks.
    pub fn delta(&self, other: &Coordinate) -> (i32, i32, i32) {
        (
            other.x as i32 - self.x as i32,
            other.y as i32 - self.y as i32,
            other.z as i32 - self.z as i32,
        )
    }
}

/// One of the three shape types a path occupies: the lateral trace, and the
/// two via directions (via going "up" a layer vs. "down" a layer from a
/// given cell). Kept as a 3-valued enum rather than the original's packed
/// 2-bit field; `index()` recovers the bit-exact ordinal for anything that
/// needs to address per-shape-type arrays the way the original layout does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeType {
    Trace = 0,
    ViaUp = 1,
    ViaDown = 2,
}

pub const NUM_SHAPE_TYPES: usize = 3;

impl ShapeType {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn all() -> [ShapeType; NUM_SHAPE_TYPES] {
        [ShapeType::Trace, ShapeType::ViaUp, ShapeType::ViaDown]
    }
}

/// Geometric primitives used for keep-outs, design-rule zones, pin-swap
/// zones, and cost zones. Each accepts up to 6 floats, matching the
/// `maxBlockParameters`/`maxDRzoneParameters`/`maxCostParameters` alphabet
/// from the original format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Axis-aligned rectangle: (x_min, y_min, x_max, y_max) in microns.
    Rect(f64, f64, f64, f64),
    /// Triangle: three (x, y) vertex pairs in microns.
    Tri(f64, f64, f64, f64, f64, f64),
    /// Circle: center (x, y) and radius, in microns.
    Cir(f64, f64, f64),
}

impl Shape {
    /// Point-in-shape test in the same units the shape was declared in
    /// (microns). Delegates to `geo`'s `Contains` machinery for the
    /// polygon cases so the containment semantics match what any other
    /// consumer of the `geo` ecosystem would expect.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        use geo::algorithm::contains::Contains;
        use geo_types::{Coordinate as GeoCoord, LineString, Point, Polygon};

        let point = Point::new(x, y);
        match *self {
            Shape::Rect(x_min, y_min, x_max, y_max) => {
                x >= x_min.min(x_max)
                    && x <= x_min.max(x_max)
                    && y >= y_min.min(y_max)
                    && y <= y_min.max(y_max)
            }
            Shape::Tri(x1, y1, x2, y2, x3, y3) => {
                let poly = Polygon::new(
                    LineString(vec![
                        GeoCoord { x: x1, y: y1 },
                        GeoCoord { x: x2, y: y2 },
                        GeoCoord { x: x3, y: y3 },
                        GeoCoord { x: x1, y: y1 },
                    ]),
                    vec![],
                );
                poly.contains(&point) || poly.exterior().contains(&point)
            }
            Shape::Cir(cx, cy, r) => {
                let dx = x - cx;
                let dy = y - cy;
                dx * dx + dy * dy <= r * r
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_pack_round_trip() {
        let c = Coordinate::with_flag(1234, 5678, 17, true);
        let packed = c.pack();
        assert_eq!(Coordinate::unpack(packed), c);
    }

    #[test]
    fn coordinate_pack_is_bit_exact() {
        let c = Coordinate::new(1, 0, 0);
        assert_eq!(c.pack(), 1);
        let c = Coordinate::new(0, 1, 0);
        assert_eq!(c.pack(), 1 << 13);
        let c = Coordinate::new(0, 0, 1);
        assert_eq!(c.pack(), 1 << 26);
        let c = Coordinate::with_flag(0, 0, 0, true);
        assert_eq!(c.pack(), 1 << 31);
    }

    #[test]
    fn rect_contains() {
        let r = Shape::Rect(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains_point(5.0, 5.0));
        assert!(!r.contains_point(11.0, 5.0));
    }

    #[test]
    fn circle_contains() {
        let c = Shape::Cir(0.0, 0.0, 2.0);
        assert!(c.contains_point(1.0, 1.0));
        assert!(!c.contains_point(2.0, 2.0));
    }
}
