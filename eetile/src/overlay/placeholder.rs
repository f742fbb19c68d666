//! Transparent placeholder imagery.
//!
//! A tile that is still loading, or that failed, renders as a fully
//! transparent square so the base map shows through. The placeholder is
//! generated once on first access and shared for the lifetime of the process.

use std::sync::{Arc, OnceLock};

use image::{ImageError, Rgba, RgbaImage};

/// Edge length of a standard web map tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Static placeholder cache
static TRANSPARENT_TILE: OnceLock<Arc<RgbaImage>> = OnceLock::new();

/// Generate a fully transparent square tile of the given edge length.
pub fn generate_transparent_tile(size: u32) -> RgbaImage {
    RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]))
}

/// Get the shared transparent placeholder ([`TILE_SIZE`] × [`TILE_SIZE`]).
///
/// # Example
///
/// ```
/// use eetile::overlay::{transparent_placeholder, TILE_SIZE};
///
/// let placeholder = transparent_placeholder();
/// assert_eq!(placeholder.dimensions(), (TILE_SIZE, TILE_SIZE));
/// assert!(placeholder.pixels().all(|p| p.0[3] == 0));
/// ```
pub fn transparent_placeholder() -> Arc<RgbaImage> {
    Arc::clone(TRANSPARENT_TILE.get_or_init(|| Arc::new(generate_transparent_tile(TILE_SIZE))))
}

/// Decode an encoded tile body (PNG, JPEG, ...) into RGBA pixels.
pub fn decode_tile(data: &[u8]) -> Result<RgbaImage, ImageError> {
    Ok(image::load_from_memory(data)?.to_rgba8())
}
