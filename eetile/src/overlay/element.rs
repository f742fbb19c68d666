//! Tile elements handed to the host map widget.

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::Mutex;

use crate::coord::TileCoordinate;
use crate::source::TileError;

use super::placeholder::transparent_placeholder;

/// Identifier of one element returned by `get_tile`.
///
/// Two `get_tile` calls for the same coordinate produce distinct elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

/// Why a tile is shown as unavailable.
#[derive(Debug, Clone, PartialEq)]
pub enum Unavailable {
    /// The source reported an error
    Failed(TileError),
    /// The server answered but the body was not a decodable image
    Undecodable(String),
    /// The overlay was disposed before the tile was requested
    Disposed,
}

impl Unavailable {
    /// Returns true if refreshing credentials may make the tile loadable.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Failed(error) if error.is_auth())
    }
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(error) => write!(f, "{}", error),
            Self::Undecodable(reason) => write!(f, "Undecodable tile: {}", reason),
            Self::Disposed => f.write_str("Overlay disposed"),
        }
    }
}

/// Visible content of a tile element.
#[derive(Debug, Clone, PartialEq)]
pub enum TileContent {
    /// Request outstanding; renders as the transparent placeholder
    Loading,
    /// Decoded imagery
    Ready(Arc<RgbaImage>),
    /// Permanently blank
    Unavailable(Unavailable),
}

struct ElementInner {
    id: ElementId,
    coord: TileCoordinate,
    content: Mutex<TileContent>,
}

/// Placeholder returned synchronously to the host widget.
///
/// Cheap to clone; clones share content. The overlay fills it in once the
/// tile arrives or fails. An element moves out of `Loading` at most once.
#[derive(Clone)]
pub struct TileElement {
    inner: Arc<ElementInner>,
}

impl TileElement {
    pub(crate) fn new(id: ElementId, coord: TileCoordinate) -> Self {
        Self {
            inner: Arc::new(ElementInner {
                id,
                coord,
                content: Mutex::new(TileContent::Loading),
            }),
        }
    }

    pub fn id(&self) -> ElementId {
        self.inner.id
    }

    pub fn coord(&self) -> TileCoordinate {
        self.inner.coord
    }

    /// Snapshot of the current content.
    pub fn content(&self) -> TileContent {
        self.inner.content.lock().clone()
    }

    pub fn is_loading(&self) -> bool {
        matches!(*self.inner.content.lock(), TileContent::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.content.lock(), TileContent::Ready(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(*self.inner.content.lock(), TileContent::Unavailable(_))
    }

    /// Decoded imagery, if the tile has loaded.
    pub fn image(&self) -> Option<Arc<RgbaImage>> {
        match &*self.inner.content.lock() {
            TileContent::Ready(image) => Some(Arc::clone(image)),
            _ => None,
        }
    }

    /// Pixels to draw right now: the image when ready, otherwise the
    /// transparent placeholder.
    pub fn pixels(&self) -> Arc<RgbaImage> {
        self.image().unwrap_or_else(transparent_placeholder)
    }

    /// Replaces `Loading` with `content`.
    ///
    /// Returns false, leaving the element untouched, if it already settled.
    pub(crate) fn settle(&self, content: TileContent) -> bool {
        let mut current = self.inner.content.lock();
        if matches!(*current, TileContent::Loading) {
            *current = content;
            true
        } else {
            false
        }
    }
}

impl PartialEq for TileElement {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TileElement {}

impl fmt::Debug for TileElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.content.lock() {
            TileContent::Loading => "loading".to_string(),
            TileContent::Ready(image) => format!("ready({}x{})", image.width(), image.height()),
            TileContent::Unavailable(reason) => format!("unavailable({})", reason),
        };
        f.debug_struct("TileElement")
            .field("id", &self.inner.id)
            .field("coord", &self.inner.coord)
            .field("state", &state)
            .finish()
    }
}
