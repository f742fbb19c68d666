//! Tile source types and traits

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::coord::{CoordError, TileCoordinate};
use crate::scheduler::Priority;

/// Outcome of a tile load.
pub type TileResult = Result<TileImage, TileError>;

/// Encoded raster image returned by a tile server.
///
/// The body is kept as [`Bytes`] so that one response can be handed to every
/// listener of a shared request without copying. The format is opaque at this
/// layer; decoding happens in the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    coord: TileCoordinate,
    data: Bytes,
    content_type: Option<String>,
}

impl TileImage {
    /// Creates an image for the given tile.
    pub fn new(coord: TileCoordinate, data: impl Into<Bytes>) -> Self {
        Self {
            coord,
            data: data.into(),
            content_type: None,
        }
    }

    /// Records the `Content-Type` reported by the server.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The tile this image belongs to.
    pub fn coord(&self) -> TileCoordinate {
        self.coord
    }

    /// Raw encoded image bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// `Content-Type` reported by the server, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Size of the encoded body in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the server sent an empty body.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Errors reported through a [`TileHandle`].
///
/// Transient failures (`Network`, `Service`) only appear here after the
/// retry budget is exhausted. `Auth` is reported on the first rejection so the
/// host can refresh credentials and call `load_tile` again.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TileError {
    /// Transport failure (connect, timeout, truncated body)
    #[error("Network error after {attempts} attempt(s): {message}")]
    Network { message: String, attempts: u32 },

    /// Server-side failure (5xx or 429)
    #[error("Service error: HTTP {status} after {attempts} attempt(s)")]
    Service { status: u16, attempts: u32 },

    /// Token rejected, expired, or unavailable
    #[error("Authorization failed: {reason}")]
    Auth { status: Option<u16>, reason: String },

    /// Non-transient client error other than auth
    #[error("Request rejected: HTTP {status}")]
    Rejected { status: u16 },

    /// Coordinate outside the valid range for its zoom
    #[error("Invalid tile coordinate: {0}")]
    InvalidCoordinate(#[from] CoordError),
}

impl TileError {
    /// Returns true for errors the host should answer by refreshing credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Returns true for error classes that are retried before being reported.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Service { .. })
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } | Self::Rejected { status } => Some(*status),
            Self::Auth { status, .. } => *status,
            Self::Network { .. } | Self::InvalidCoordinate(_) => None,
        }
    }

    /// Records how many attempts were spent before giving up.
    pub(crate) fn with_attempts(self, attempts: u32) -> Self {
        match self {
            Self::Network { message, .. } => Self::Network { message, attempts },
            Self::Service { status, .. } => Self::Service { status, attempts },
            other => other,
        }
    }
}

/// Capability interface for anything that can produce tile imagery.
///
/// Implementors include [`RemoteTileSource`](super::RemoteTileSource) and
/// in-memory doubles used by tests. All methods are non-blocking: callers sit
/// on the host widget's render path.
pub trait TileSource: Send + Sync {
    /// Begins or joins a fetch for `coord`.
    ///
    /// Returns immediately. The outcome, including any error, is delivered
    /// through the returned handle; this method never fails synchronously.
    /// Dropping the handle before it resolves detaches this caller.
    fn load_tile(&self, coord: TileCoordinate, priority: Priority) -> TileHandle;

    /// Stable identifier separating this source from others sharing a cache
    /// namespace. Never contains credentials.
    fn unique_id(&self) -> &str;

    /// Cancels all outstanding requests and releases connections.
    ///
    /// After this returns no handle issued by this source yields an outcome.
    /// Calling it more than once has no further effect.
    fn dispose(&self);

    /// Returns true once [`dispose`](Self::dispose) has been called.
    fn is_disposed(&self) -> bool;
}

/// Completion side of a [`TileHandle`].
#[derive(Debug)]
pub struct TileCompleter {
    tx: oneshot::Sender<TileResult>,
}

impl TileCompleter {
    /// Delivers the outcome. Returns false if the handle is already gone.
    pub fn complete(self, result: TileResult) -> bool {
        self.tx.send(result).is_ok()
    }

    /// Returns true if the listening handle has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Pending outcome of [`TileSource::load_tile`].
///
/// Resolves to `Some(result)` when the request completes, or `None` when the
/// request was cancelled or the source disposed. A handle whose source has
/// been disposed never yields `Some`, even if the result was already sent.
pub struct TileHandle {
    rx: oneshot::Receiver<TileResult>,
    disposed: Pin<Box<WaitForCancellationFutureOwned>>,
    disposal: CancellationToken,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl TileHandle {
    /// Creates a connected completer/handle pair bound to `disposal`.
    pub fn channel(disposal: CancellationToken) -> (TileCompleter, TileHandle) {
        let (tx, rx) = oneshot::channel();
        let handle = TileHandle {
            rx,
            disposed: Box::pin(disposal.clone().cancelled_owned()),
            disposal,
            release: None,
        };
        (TileCompleter { tx }, handle)
    }

    /// Creates a handle that is already resolved with `result`.
    pub fn resolved(result: TileResult) -> Self {
        let (completer, handle) = Self::channel(CancellationToken::new());
        completer.complete(result);
        handle
    }

    /// Creates a handle that resolves to `None` without an outcome.
    pub fn closed() -> Self {
        let (_completer, handle) = Self::channel(CancellationToken::new());
        handle
    }

    /// Registers a hook run if the handle is dropped before it resolves.
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Detaches this listener from its request.
    pub fn release(self) {
        drop(self);
    }

    fn settle(&mut self) {
        self.release = None;
    }
}

impl Future for TileHandle {
    type Output = Option<TileResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.disposed.as_mut().poll(cx).is_ready() {
            this.settle();
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => {
                this.settle();
                if this.disposal.is_cancelled() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(result))
                }
            }
            Poll::Ready(Err(_)) => {
                this.settle();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TileHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for TileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileHandle")
            .field("disposed", &self.disposal.is_cancelled())
            .field("attached", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> TileCoordinate {
        TileCoordinate::new(5, 10, 12)
    }

    #[tokio::test]
    async fn test_resolved_handle_yields_result() {
        let image = TileImage::new(coord(), vec![1, 2, 3]);
        let outcome = TileHandle::resolved(Ok(image.clone())).await;
        assert_eq!(outcome, Some(Ok(image)));
    }

    #[tokio::test]
    async fn test_closed_handle_yields_none() {
        assert_eq!(TileHandle::closed().await, None);
    }

    #[tokio::test]
    async fn test_disposal_suppresses_sent_result() {
        let disposal = CancellationToken::new();
        let (completer, handle) = TileHandle::channel(disposal.clone());

        assert!(completer.complete(Ok(TileImage::new(coord(), vec![9]))));
        disposal.cancel();

        assert_eq!(handle.await, None);
    }

    #[tokio::test]
    async fn test_disposal_wakes_pending_handle() {
        let disposal = CancellationToken::new();
        let (_completer, handle) = TileHandle::channel(disposal.clone());

        let waiter = tokio::spawn(handle);
        tokio::task::yield_now().await;
        disposal.cancel();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, None);
    }

    #[test]
    fn test_release_hook_runs_when_dropped_unresolved() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let (_completer, handle) = TileHandle::channel(CancellationToken::new());
        let handle = handle.on_release(move || flag.store(true, Ordering::SeqCst));

        handle.release();
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_release_hook_skipped_after_resolution() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let (completer, handle) = TileHandle::channel(CancellationToken::new());
        let mut handle = handle.on_release(move || flag.store(true, Ordering::SeqCst));

        completer.complete(Err(TileError::Rejected { status: 404 }));
        let outcome = (&mut handle).await;
        drop(handle);

        assert_eq!(outcome, Some(Err(TileError::Rejected { status: 404 })));
        assert!(!released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_error_classification() {
        let auth = TileError::Auth {
            status: Some(401),
            reason: "token rejected".to_string(),
        };
        assert!(auth.is_auth());
        assert!(!auth.is_transient());
        assert_eq!(auth.status(), Some(401));

        let service = TileError::Service {
            status: 503,
            attempts: 3,
        };
        assert!(service.is_transient());
        assert_eq!(service.status(), Some(503));

        let invalid: TileError = TileCoordinate::new(1, 5, 0).validate(24).unwrap_err().into();
        assert!(!invalid.is_transient());
        assert_eq!(invalid.status(), None);
    }

    #[test]
    fn test_tile_image_accessors() {
        let image = TileImage::new(coord(), vec![0x89, 0x50]).with_content_type("image/png");
        assert_eq!(image.coord(), coord());
        assert_eq!(image.len(), 2);
        assert!(!image.is_empty());
        assert_eq!(image.content_type(), Some("image/png"));
    }
}
