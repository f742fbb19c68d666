//! Coordinate conversion module
//!
//! Provides the [`TileCoordinate`] value type plus conversions between
//! geographic coordinates (latitude/longitude) and Web Mercator tile
//! coordinates used by tile servers.

mod types;

pub use types::{CoordError, TileCoordinate, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM};

use std::f64::consts::PI;

/// Converts geographic coordinates to fractional tile coordinates.
///
/// The integer part of each component is the tile index, the fractional part
/// is the position inside that tile. Used to measure how far a tile lies from
/// the view center.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 31)
#[inline]
pub fn to_fractional_tile(lat: f64, lon: f64, zoom: u8) -> Result<(f64, f64), CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom {
            zoom,
            max_zoom: MAX_ZOOM,
        });
    }

    let n = 2.0_f64.powi(zoom as i32);
    let x = (lon + 180.0) / 360.0 * n;

    let lat_rad = lat * PI / 180.0;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n;

    Ok((x, y))
}

/// Converts geographic coordinates to the tile containing them.
///
/// Longitude 180.0 (and the southern latitude limit) would land one past the
/// last tile, so indices are clamped to the grid.
#[inline]
pub fn to_tile_coords(lat: f64, lon: f64, zoom: u8) -> Result<TileCoordinate, CoordError> {
    let (x, y) = to_fractional_tile(lat, lon, zoom)?;
    let last = (1u64 << zoom) - 1;

    Ok(TileCoordinate {
        zoom,
        x: (x as u64).min(last) as u32,
        y: (y as u64).min(last) as u32,
    })
}

/// Converts tile coordinates back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoordinate) -> (f64, f64) {
    let n = 2.0_f64.powi(tile.zoom as i32);

    let lon = tile.x as f64 / n * 360.0 - 180.0;

    let y = tile.y as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}
