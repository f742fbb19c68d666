//! Priority heuristic for overlay tiles.
//!
//! Tiles at the view's zoom level are visible and get priorities in
//! `VISIBLE - MAX_RING_PENALTY ..= VISIBLE`, decreasing with distance from the
//! view center. Tiles at other zoom levels are prefetch work and always rank
//! below any visible tile.

use crate::coord::{to_fractional_tile, CoordError, TileCoordinate, MAX_ZOOM};
use crate::scheduler::Priority;

/// Largest priority reduction applied for distance from the view center.
pub const MAX_RING_PENALTY: i32 = 50;

/// Extra reduction per zoom level beyond the adjacent one.
pub const ZOOM_STEP_PENALTY: i32 = 100;

/// Where the host widget is currently looking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
}

impl ViewState {
    /// Creates a view, validating the center and zoom.
    pub fn new(lat: f64, lon: f64, zoom: u8) -> Result<Self, CoordError> {
        to_fractional_tile(lat, lon, zoom)?;
        Ok(Self { lat, lon, zoom })
    }

    /// Distance in whole tiles between `coord` and the view center, measured
    /// on `coord`'s zoom level.
    ///
    /// Uses the Chebyshev metric so every tile in the ring around the center
    /// tile is at distance 1. The x axis wraps at the antimeridian.
    pub fn ring_distance(&self, coord: TileCoordinate) -> Option<u64> {
        if coord.zoom > MAX_ZOOM {
            return None;
        }
        let (cx, cy) = to_fractional_tile(self.lat, self.lon, coord.zoom).ok()?;
        let side = coord.tiles_per_side();
        let center_x = (cx as u64).min(side - 1);
        let center_y = (cy as u64).min(side - 1);

        let dx = u64::from(coord.x).abs_diff(center_x);
        let dx = dx.min(side.saturating_sub(dx));
        let dy = u64::from(coord.y).abs_diff(center_y);

        Some(dx.max(dy))
    }
}

/// Scheduling priority for `coord` given the current view.
///
/// Without a view every tile is treated as visible.
pub fn tile_priority(coord: TileCoordinate, view: Option<&ViewState>) -> Priority {
    let Some(view) = view else {
        return Priority::VISIBLE;
    };

    let penalty = view
        .ring_distance(coord)
        .map(|d| d.min(MAX_RING_PENALTY as u64) as i32)
        .unwrap_or(MAX_RING_PENALTY);

    let zoom_gap = i32::from(coord.zoom.abs_diff(view.zoom));
    let base = if zoom_gap == 0 {
        Priority::VISIBLE.value()
    } else {
        Priority::PREFETCH.value() - (zoom_gap - 1) * ZOOM_STEP_PENALTY
    };

    Priority::new(base - penalty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::to_tile_coords;

    fn view() -> ViewState {
        ViewState::new(40.7128, -74.0060, 10).unwrap()
    }

    fn center(zoom: u8) -> TileCoordinate {
        to_tile_coords(40.7128, -74.0060, zoom).unwrap()
    }

    #[test]
    fn test_no_view_is_visible() {
        assert_eq!(
            tile_priority(TileCoordinate::new(3, 1, 1), None),
            Priority::VISIBLE
        );
    }

    #[test]
    fn test_center_tile_has_top_priority() {
        assert_eq!(tile_priority(center(10), Some(&view())), Priority::VISIBLE);
    }

    #[test]
    fn test_priority_decreases_with_distance() {
        let c = center(10);
        let near = TileCoordinate::new(10, c.x + 1, c.y);
        let far = TileCoordinate::new(10, c.x + 3, c.y - 2);

        let p_center = tile_priority(c, Some(&view()));
        let p_near = tile_priority(near, Some(&view()));
        let p_far = tile_priority(far, Some(&view()));

        assert!(p_center > p_near);
        assert!(p_near > p_far);
        assert_eq!(p_far, Priority::new(Priority::VISIBLE.value() - 3));
    }

    #[test]
    fn test_visible_always_beats_adjacent_zoom() {
        let far_visible = TileCoordinate::new(10, 0, 0);
        let centered_prefetch = center(11);

        assert!(
            tile_priority(far_visible, Some(&view()))
                > tile_priority(centered_prefetch, Some(&view()))
        );
        assert_eq!(
            tile_priority(centered_prefetch, Some(&view())),
            Priority::PREFETCH
        );
    }

    #[test]
    fn test_adjacent_zoom_beats_distant_zoom() {
        let adjacent = tile_priority(center(9), Some(&view()));
        let distant = tile_priority(center(7), Some(&view()));
        assert!(adjacent > distant);
    }

    #[test]
    fn test_ring_distance_wraps_antimeridian() {
        let view = ViewState::new(0.0, 179.9, 4).unwrap();
        let west_edge = TileCoordinate::new(4, 0, 8);
        assert_eq!(view.ring_distance(west_edge), Some(1));
    }

    #[test]
    fn test_invalid_view_rejected() {
        assert!(ViewState::new(95.0, 0.0, 3).is_err());
    }
}
