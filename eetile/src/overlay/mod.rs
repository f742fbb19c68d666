//! Map widget overlay.
//!
//! [`TileOverlay`] adapts a [`TileSource`](crate::source::TileSource) to the
//! synchronous "give me an element for this tile" API of a host map widget.
//! Elements start as transparent placeholders and are filled in once their
//! tile arrives.

mod element;
mod layer;
mod placeholder;
mod priority;

pub use element::{ElementId, TileContent, TileElement, Unavailable};
pub use layer::{NoRepaint, OverlayError, RepaintHook, TileOverlay};
pub use placeholder::{decode_tile, generate_transparent_tile, transparent_placeholder, TILE_SIZE};
pub use priority::{tile_priority, ViewState, MAX_RING_PENALTY, ZOOM_STEP_PENALTY};
