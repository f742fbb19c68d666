//! Tile sources.
//!
//! A [`TileSource`] turns a tile coordinate and a priority into a
//! [`TileHandle`] that later yields image bytes or an error. The
//! [`RemoteTileSource`] implementation fetches tiles from an HTTP tile server
//! with bearer authentication.

mod auth;
mod http;
mod remote;
mod types;
mod url;

pub use auth::{AuthToken, SharedToken, StaticToken, TokenProvider};
pub use http::{
    AsyncHttpClient, AsyncReqwestClient, HttpError, HttpErrorKind, HttpResponse,
    DEFAULT_TIMEOUT_SECS,
};
pub use remote::{
    HttpTileFetcher, RemoteTileSource, SourceConfig, SourceError, DEFAULT_BASE_URL,
    DEFAULT_MAX_ZOOM,
};
pub use types::{TileCompleter, TileError, TileHandle, TileImage, TileResult, TileSource};
pub use url::{TileUrlTemplate, DEFAULT_URL_TEMPLATE};

#[cfg(test)]
pub use http::tests::MockHttpClient;
