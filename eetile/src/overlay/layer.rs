//! Adapter between a [`TileSource`] and a host map widget.
//!
//! The widget calls [`TileOverlay::get_tile`] from its render loop and needs
//! an element back immediately. The overlay returns a `Loading` element,
//! starts a load, and fills the element in when the load completes.
//!
//! # Stale completions
//!
//! Each live element carries a cancellation token and the overlay generation
//! it was created in. A completion only mutates its element if, at that
//! moment, the element is still registered, its token has not fired and the
//! generation is unchanged. The check and the mutation happen while holding
//! the element's map entry, so a concurrent `release_tile` either runs first
//! (no mutation) or waits until the mutation is done.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::coord::TileCoordinate;
use crate::scheduler::Priority;
use crate::source::{TileError, TileResult, TileSource};

use super::element::{ElementId, TileContent, TileElement, Unavailable};
use super::placeholder::decode_tile;
use super::priority::{tile_priority, ViewState};

/// Errors raised while constructing an overlay.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("No tokio runtime available to drive tile loads")]
    NoRuntime,

    #[error("Tile source '{0}' is already disposed")]
    SourceDisposed(String),
}

/// Repaint notifications sent to the host widget.
///
/// Called from a runtime worker thread after an element has been mutated.
/// Implementations typically schedule a redraw on the UI thread.
pub trait RepaintHook: Send + Sync {
    /// `element` now shows new content.
    fn tile_changed(&self, element: &TileElement);

    /// `element` failed to load. Called after `tile_changed`.
    ///
    /// Lets the host react to auth errors by refreshing credentials.
    fn tile_failed(&self, _element: &TileElement, _error: &TileError) {}
}

/// Repaint hook that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRepaint;

impl RepaintHook for NoRepaint {
    fn tile_changed(&self, _element: &TileElement) {}
}

struct LiveTile {
    element: TileElement,
    generation: u64,
    cancel: CancellationToken,
}

/// Feeds a [`TileSource`] into a host widget's synchronous tile API.
pub struct TileOverlay {
    source: Arc<dyn TileSource>,
    repaint: Arc<dyn RepaintHook>,
    runtime: Handle,
    tiles: Arc<DashMap<ElementId, LiveTile>>,
    next_element: AtomicU64,
    generation: Arc<AtomicU64>,
    disposed: CancellationToken,
    view: RwLock<Option<ViewState>>,
}

impl TileOverlay {
    /// Creates an overlay that drives loads on the current tokio runtime.
    pub fn new(
        source: Arc<dyn TileSource>,
        repaint: Arc<dyn RepaintHook>,
    ) -> Result<Self, OverlayError> {
        let runtime = Handle::try_current().map_err(|_| OverlayError::NoRuntime)?;
        Self::with_runtime(source, repaint, runtime)
    }

    /// Creates an overlay that drives loads on `runtime`.
    ///
    /// `get_tile` may then be called from any thread, including one that is
    /// not part of the runtime.
    pub fn with_runtime(
        source: Arc<dyn TileSource>,
        repaint: Arc<dyn RepaintHook>,
        runtime: Handle,
    ) -> Result<Self, OverlayError> {
        if source.is_disposed() {
            return Err(OverlayError::SourceDisposed(source.unique_id().to_string()));
        }

        debug!(source = source.unique_id(), "Tile overlay created");

        Ok(Self {
            source,
            repaint,
            runtime,
            tiles: Arc::new(DashMap::new()),
            next_element: AtomicU64::new(0),
            generation: Arc::new(AtomicU64::new(0)),
            disposed: CancellationToken::new(),
            view: RwLock::new(None),
        })
    }

    /// Returns an element for `coord` immediately and starts loading it.
    ///
    /// Never fails: errors surface later as an `Unavailable` element.
    pub fn get_tile(&self, coord: TileCoordinate) -> TileElement {
        let id = ElementId(self.next_element.fetch_add(1, Ordering::Relaxed));
        let element = TileElement::new(id, coord);

        if self.disposed.is_cancelled() {
            element.settle(TileContent::Unavailable(Unavailable::Disposed));
            return element;
        }

        let priority = self.priority_for(coord);
        let handle = self.source.load_tile(coord, priority);

        let generation = self.generation.load(Ordering::SeqCst);
        let cancel = self.disposed.child_token();
        self.tiles.insert(
            id,
            LiveTile {
                element: element.clone(),
                generation,
                cancel: cancel.clone(),
            },
        );

        trace!(tile = %coord, element = id.0, priority = %priority, "Tile requested");

        let tiles = Arc::clone(&self.tiles);
        let current_generation = Arc::clone(&self.generation);
        let repaint = Arc::clone(&self.repaint);
        let target = element.clone();

        self.runtime.spawn(async move {
            // Dropping the handle on cancellation detaches it from the request
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                outcome = handle => outcome,
            };
            let Some(result) = outcome else {
                return;
            };

            let (content, error) = into_content(result);

            let applied = match tiles.get(&id) {
                Some(live)
                    if live.generation == current_generation.load(Ordering::SeqCst)
                        && !live.cancel.is_cancelled() =>
                {
                    target.settle(content)
                }
                _ => false,
            };

            if !applied {
                trace!(tile = %target.coord(), "Dropping completion for released tile");
                return;
            }

            repaint.tile_changed(&target);
            if let Some(error) = error {
                if error.is_auth() {
                    warn!(tile = %target.coord(), error = %error, "Tile unavailable: authorization failed");
                } else {
                    debug!(tile = %target.coord(), error = %error, "Tile unavailable");
                }
                repaint.tile_failed(&target, &error);
            }
        });

        element
    }

    /// Forgets `element` and detaches it from its request.
    ///
    /// If it was the request's last listener the fetch is cancelled. The
    /// element is never mutated afterwards. Returns false if the element was
    /// not live (already released, or already disposed).
    pub fn release_tile(&self, element: &TileElement) -> bool {
        match self.tiles.remove(&element.id()) {
            Some((_, live)) => {
                live.cancel.cancel();
                trace!(tile = %element.coord(), element = element.id().0, "Tile released");
                true
            }
            None => false,
        }
    }

    /// Releases every live element without disposing the source.
    ///
    /// Used when the host discards all of its tiles at once, for example on a
    /// layer reset.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let released = self.cancel_all();
        debug!(released, "Tile overlay reset");
    }

    /// Tears down the overlay and its source.
    ///
    /// No element issued by this overlay is mutated after this returns.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.is_cancelled() {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.disposed.cancel();
        let released = self.cancel_all();
        self.source.dispose();
        info!(source = self.source.unique_id(), released, "Tile overlay disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.is_cancelled()
    }

    /// Updates the view used to prioritize subsequent requests.
    pub fn set_view(&self, view: ViewState) {
        *self.view.write() = Some(view);
    }

    /// Current view, if one has been set.
    pub fn view(&self) -> Option<ViewState> {
        *self.view.read()
    }

    /// Priority a request for `coord` would get right now.
    pub fn priority_for(&self, coord: TileCoordinate) -> Priority {
        tile_priority(coord, self.view.read().as_ref())
    }

    /// Number of elements currently live.
    pub fn live_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Current overlay generation. Advances on `reset` and `dispose`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Identifier of the underlying source.
    pub fn unique_id(&self) -> &str {
        self.source.unique_id()
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    fn cancel_all(&self) -> usize {
        let mut released = 0;
        self.tiles.retain(|_, live| {
            live.cancel.cancel();
            released += 1;
            false
        });
        released
    }
}

/// Converts a load result into element content, decoding image bytes.
fn into_content(result: TileResult) -> (TileContent, Option<TileError>) {
    match result {
        Ok(image) => match decode_tile(image.data()) {
            Ok(pixels) => (TileContent::Ready(Arc::new(pixels)), None),
            Err(e) => {
                warn!(tile = %image.coord(), error = %e, "Failed to decode tile");
                (
                    TileContent::Unavailable(Unavailable::Undecodable(e.to_string())),
                    None,
                )
            }
        },
        Err(error) => (
            TileContent::Unavailable(Unavailable::Failed(error.clone())),
            Some(error),
        ),
    }
}

impl Drop for TileOverlay {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for TileOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileOverlay")
            .field("source", &self.source.unique_id())
            .field("live_tiles", &self.tiles.len())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("disposed", &self.disposed.is_cancelled())
            .finish()
    }
}
