//! Coordinate type definitions

use std::fmt;

use thiserror::Error;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Lowest zoom level of the tile pyramid.
pub const MIN_ZOOM: u8 = 0;

/// Highest zoom level a tile grid can address with `u32` indices.
pub const MAX_ZOOM: u8 = 31;

/// Tile coordinate in the Web Mercator / Slippy Map grid.
///
/// Identifies one tile by zoom level and grid position. Two coordinates are
/// equal iff all three fields match, which makes the type usable as a
/// de-duplication and cache key.
///
/// # Example
///
/// ```
/// use eetile::coord::TileCoordinate;
///
/// let coord = TileCoordinate::new(5, 10, 12);
/// assert_eq!(coord.tiles_per_side(), 32);
/// assert!(coord.validate(24).is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoordinate {
    /// Zoom level, 0 is the whole world in one tile
    pub zoom: u8,
    /// X coordinate (west to east), 0 at the antimeridian
    pub x: u32,
    /// Y coordinate (north to south), 0 at the north edge
    pub y: u32,
}

impl TileCoordinate {
    /// Creates a new tile coordinate.
    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one side of the grid at this zoom level.
    #[inline]
    pub fn tiles_per_side(&self) -> u64 {
        1u64 << self.zoom.min(MAX_ZOOM)
    }

    /// Checks that this coordinate addresses a real tile.
    ///
    /// `max_zoom` is the deepest level the tile server publishes; anything
    /// beyond it, or any x/y outside `0..2^zoom`, is rejected.
    pub fn validate(&self, max_zoom: u8) -> Result<(), CoordError> {
        let max_zoom = max_zoom.min(MAX_ZOOM);
        if self.zoom > max_zoom {
            return Err(CoordError::InvalidZoom {
                zoom: self.zoom,
                max_zoom,
            });
        }

        let side = self.tiles_per_side();
        if u64::from(self.x) >= side || u64::from(self.y) >= side {
            return Err(CoordError::OutOfRange {
                coord: *self,
                tiles_per_side: side,
            });
        }

        Ok(())
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Errors that can occur during coordinate validation and conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Latitude is outside valid range (-85.05112878 to 85.05112878)
    #[error("Invalid latitude: {0} (must be between {min} and {max})", min = MIN_LAT, max = MAX_LAT)]
    InvalidLatitude(f64),

    /// Longitude is outside valid range (-180.0 to 180.0)
    #[error("Invalid longitude: {0} (must be between {min} and {max})", min = MIN_LON, max = MAX_LON)]
    InvalidLongitude(f64),

    /// Zoom level is deeper than the grid supports
    #[error("Invalid zoom: {zoom} (maximum is {max_zoom})")]
    InvalidZoom { zoom: u8, max_zoom: u8 },

    /// x or y lies outside the grid for the coordinate's zoom
    #[error("Tile {coord} is outside the {tiles_per_side}x{tiles_per_side} grid")]
    OutOfRange {
        coord: TileCoordinate,
        tiles_per_side: u64,
    },
}
