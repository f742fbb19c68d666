//! eetile - Tile loading and map overlay layer for server-rendered imagery
//!
//! This library turns `(zoom, x, y)` tile coordinates into authenticated HTTP
//! fetches against a remote tile endpoint and feeds the decoded imagery back
//! into a host map widget.
//!
//! - [`source`] - the [`TileSource`](source::TileSource) contract and its
//!   remote implementation
//! - [`scheduler`] - de-duplication, concurrency cap, priority order and retry
//! - [`overlay`] - synchronous element API for map widgets
//! - [`coord`] - tile coordinates and Web Mercator conversion
//! - [`config`] - `~/.eetile/config.ini` handling
//! - [`logging`] - tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use eetile::coord::TileCoordinate;
//! use eetile::overlay::{NoRepaint, TileOverlay};
//! use eetile::source::{AsyncReqwestClient, AuthToken, RemoteTileSource, SourceConfig, StaticToken};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SourceConfig::new("projects/demo/maps/abc123");
//! let client = AsyncReqwestClient::new()?;
//! let source = RemoteTileSource::new(config, client, Arc::new(StaticToken::new(AuthToken::new("token"))))?;
//!
//! let overlay = TileOverlay::new(Arc::new(source), Arc::new(NoRepaint))?;
//! let element = overlay.get_tile(TileCoordinate::new(3, 4, 2));
//! assert!(element.is_loading());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coord;
pub mod logging;
pub mod overlay;
pub mod scheduler;
pub mod source;
