//! Tile source backed by a remote tile server.
//!
//! [`RemoteTileSource`] turns `load_tile` calls into authenticated HTTP GETs.
//! Every call goes through a [`SchedulerDaemon`] spawned on the current tokio
//! runtime, which de-duplicates requests per coordinate, bounds concurrency
//! and retries transient failures.
//!
//! # Response classification
//!
//! | Response                    | Outcome                      | Retried |
//! |-----------------------------|------------------------------|---------|
//! | 2xx                         | image bytes                  | -       |
//! | 401, 403                    | [`TileError::Auth`]          | no      |
//! | 429, 5xx                    | [`TileError::Service`]       | yes     |
//! | other status                | [`TileError::Rejected`]      | no      |
//! | timeout, connect, body read | [`TileError::Network`]       | yes     |
//! | no token / expired token    | [`TileError::Auth`]          | no      |

use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::coord::TileCoordinate;
use crate::scheduler::{
    Priority, RequestState, SchedulerConfig, SchedulerDaemon, SchedulerHandle, SchedulerStats,
    TileFetcher,
};

use super::auth::TokenProvider;
use super::http::{AsyncHttpClient, HttpError, HttpResponse};
use super::types::{TileError, TileHandle, TileImage, TileResult, TileSource};
use super::url::{TileUrlTemplate, DEFAULT_URL_TEMPLATE};

/// Default remote endpoint.
pub const DEFAULT_BASE_URL: &str = "https://earthengine.googleapis.com/v1";

/// Deepest zoom level requested by default.
pub const DEFAULT_MAX_ZOOM: u8 = 24;

/// Errors raised while constructing a tile source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid URL template: {0}")]
    InvalidTemplate(String),

    #[error("Map id is required")]
    MissingMapId,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to run the request scheduler")]
    NoRuntime,

    #[error("HTTP client error: {0}")]
    Http(#[from] HttpError),
}

/// Configuration for a [`RemoteTileSource`].
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Endpoint prefix, e.g. `https://earthengine.googleapis.com/v1`
    pub base_url: String,
    /// Map or asset id identifying the imagery
    pub map_id: String,
    /// URL layout, [`DEFAULT_URL_TEMPLATE`] when `None`
    pub url_template: Option<String>,
    /// Deepest zoom level the server publishes
    pub max_zoom: u8,
    /// Concurrency and retry settings
    pub scheduler: SchedulerConfig,
}

impl SourceConfig {
    /// Creates a config for `map_id` with default settings.
    pub fn new(map_id: impl Into<String>) -> Self {
        Self {
            map_id: map_id.into(),
            ..Self::default()
        }
    }

    /// Builds the URL template described by this config.
    pub fn template(&self) -> Result<TileUrlTemplate, SourceError> {
        let layout = self.url_template.as_deref().unwrap_or(DEFAULT_URL_TEMPLATE);
        TileUrlTemplate::with_template(layout, &self.base_url, &self.map_id)
    }

    /// Checks settings that would make the source unusable.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.scheduler.max_concurrent == 0 {
            return Err(SourceError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.scheduler.retry.max_attempts() == 0 {
            return Err(SourceError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.scheduler.retry.delays_strictly_increase() {
            return Err(SourceError::InvalidConfig(
                "retry delays must strictly increase and stay below max_delay".to_string(),
            ));
        }
        self.template().map(|_| ())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            map_id: String::new(),
            url_template: None,
            max_zoom: DEFAULT_MAX_ZOOM,
            scheduler: SchedulerConfig::default(),
        }
    }
}

// =============================================================================
// Single-attempt fetcher
// =============================================================================

/// Performs one authenticated GET for one tile.
pub struct HttpTileFetcher<C: AsyncHttpClient> {
    client: C,
    template: TileUrlTemplate,
    tokens: Arc<dyn TokenProvider>,
}

impl<C: AsyncHttpClient> HttpTileFetcher<C> {
    pub fn new(client: C, template: TileUrlTemplate, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            template,
            tokens,
        }
    }
}

impl<C: AsyncHttpClient> TileFetcher for HttpTileFetcher<C> {
    async fn fetch(&self, coord: TileCoordinate) -> TileResult {
        let token = match self.tokens.current_token() {
            Some(token) if token.is_expired() => {
                return Err(TileError::Auth {
                    status: None,
                    reason: "token expired".to_string(),
                })
            }
            Some(token) => token,
            None => {
                return Err(TileError::Auth {
                    status: None,
                    reason: "no token available".to_string(),
                })
            }
        };

        let url = self.template.render(coord);
        trace!(tile = %coord, url = %url, "Requesting tile");

        match self.client.get_with_bearer(&url, token.secret()).await {
            Ok(response) => classify(coord, response),
            Err(e) => Err(TileError::Network {
                message: e.to_string(),
                attempts: 1,
            }),
        }
    }
}

/// Maps an HTTP response onto the tile error taxonomy.
fn classify(coord: TileCoordinate, response: HttpResponse) -> TileResult {
    match response.status {
        200..=299 => {
            let image = TileImage::new(coord, response.body);
            Ok(match response.content_type {
                Some(content_type) => image.with_content_type(content_type),
                None => image,
            })
        }
        status @ (401 | 403) => Err(TileError::Auth {
            status: Some(status),
            reason: format!("server rejected token (HTTP {})", status),
        }),
        status @ (429 | 500..=599) => Err(TileError::Service {
            status,
            attempts: 1,
        }),
        status => Err(TileError::Rejected { status }),
    }
}

// =============================================================================
// Remote Tile Source
// =============================================================================

/// Tile source that fetches imagery from a remote tile server.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use eetile::coord::TileCoordinate;
/// use eetile::scheduler::Priority;
/// use eetile::source::{
///     AsyncReqwestClient, AuthToken, RemoteTileSource, SourceConfig, StaticToken, TileSource,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SourceConfig::new("projects/my-project/maps/abc123");
/// let tokens = Arc::new(StaticToken::new(AuthToken::expiring_in("ya29.token", 3600)));
/// let source = RemoteTileSource::new(config, AsyncReqwestClient::new()?, tokens)?;
///
/// let tile = source
///     .load_tile(TileCoordinate::new(5, 10, 12), Priority::VISIBLE)
///     .await;
/// # Ok(())
/// # }
/// ```
pub struct RemoteTileSource {
    unique_id: String,
    max_zoom: u8,
    scheduler: SchedulerHandle,
    disposal: CancellationToken,
}

impl RemoteTileSource {
    /// Creates a source and starts its scheduler on the current runtime.
    ///
    /// Fails with [`SourceError::NoRuntime`] outside a tokio runtime; use
    /// [`with_runtime`](Self::with_runtime) from synchronous code.
    pub fn new<C: AsyncHttpClient>(
        config: SourceConfig,
        client: C,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, SourceError> {
        let runtime = Handle::try_current().map_err(|_| SourceError::NoRuntime)?;
        Self::with_runtime(config, client, tokens, &runtime)
    }

    /// Creates a source whose scheduler runs on `runtime`.
    pub fn with_runtime<C: AsyncHttpClient>(
        config: SourceConfig,
        client: C,
        tokens: Arc<dyn TokenProvider>,
        runtime: &Handle,
    ) -> Result<Self, SourceError> {
        config.validate()?;
        let template = config.template()?;
        let unique_id = template.identity();

        let fetcher = Arc::new(HttpTileFetcher::new(client, template, tokens));
        let (daemon, scheduler) = SchedulerDaemon::new(config.scheduler.clone(), fetcher);
        let disposal = CancellationToken::new();
        runtime.spawn(daemon.run(disposal.clone()));

        info!(
            source = %unique_id,
            max_zoom = config.max_zoom,
            max_concurrent = config.scheduler.max_concurrent,
            "Remote tile source started"
        );

        Ok(Self {
            unique_id,
            max_zoom: config.max_zoom,
            scheduler,
            disposal,
        })
    }

    /// Returns a snapshot of scheduling statistics.
    ///
    /// Returns `None` after disposal.
    pub async fn stats(&self) -> Option<SchedulerStats> {
        self.scheduler.stats().await
    }

    /// Returns the state of the request currently tracked for `coord`.
    pub async fn request_state(&self, coord: TileCoordinate) -> Option<RequestState> {
        self.scheduler.request_state(coord).await
    }
}

impl TileSource for RemoteTileSource {
    fn load_tile(&self, coord: TileCoordinate, priority: Priority) -> TileHandle {
        if let Err(e) = coord.validate(self.max_zoom) {
            debug!(tile = %coord, error = %e, "Rejecting invalid coordinate");
            let (completer, handle) = TileHandle::channel(self.disposal.clone());
            completer.complete(Err(e.into()));
            return handle;
        }

        self.scheduler.load(coord, priority, &self.disposal)
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn dispose(&self) {
        if !self.disposal.is_cancelled() {
            info!(source = %self.unique_id, "Disposing remote tile source");
            self.disposal.cancel();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposal.is_cancelled()
    }
}

impl Drop for RemoteTileSource {
    fn drop(&mut self) {
        self.disposal.cancel();
    }
}

impl std::fmt::Debug for RemoteTileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTileSource")
            .field("unique_id", &self.unique_id)
            .field("max_zoom", &self.max_zoom)
            .field("disposed", &self.disposal.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RetryPolicy;
    use crate::source::auth::{AuthToken, SharedToken, StaticToken};
    use crate::source::http::tests::MockHttpClient;
    use crate::source::http::HttpErrorKind;
    use bytes::Bytes;
    use std::time::Duration;

    const PNG_STUB: &[u8] = &[0x89, b'P', b'N', b'G'];

    fn config(max_concurrent: usize) -> SourceConfig {
        let mut config = SourceConfig::new("maps/test");
        config.base_url = "https://tiles.test/v1".to_string();
        config.scheduler = SchedulerConfig {
            max_concurrent,
            retry: RetryPolicy::exponential(3),
        };
        config
    }

    fn tokens() -> Arc<dyn TokenProvider> {
        Arc::new(StaticToken::new(AuthToken::new("secret-token")))
    }

    fn source(client: &Arc<MockHttpClient>, max_concurrent: usize) -> RemoteTileSource {
        RemoteTileSource::new(config(max_concurrent), Arc::clone(client), tokens()).unwrap()
    }

    fn coord() -> TileCoordinate {
        TileCoordinate::new(5, 10, 12)
    }

    #[tokio::test]
    async fn test_success_returns_image() {
        let client = Arc::new(MockHttpClient::new(Ok(HttpResponse::new(
            200,
            Bytes::from_static(PNG_STUB),
        )
        .with_content_type("image/png"))));
        let source = source(&client, 4);

        let image = source
            .load_tile(coord(), Priority::VISIBLE)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(image.data().as_ref(), PNG_STUB);
        assert_eq!(image.content_type(), Some("image/png"));
        assert_eq!(
            client.calls(),
            vec![(
                "https://tiles.test/v1/maps/test/tiles/5/10/12".to_string(),
                "secret-token".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_unique_id_excludes_token() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB));
        let source = source(&client, 4);

        assert_eq!(
            source.unique_id(),
            "eetile:https://tiles.test/v1/maps/test/tiles/{z}/{x}/{y}"
        );
        assert!(!source.unique_id().contains("secret-token"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_is_not_retried() {
        let client = Arc::new(MockHttpClient::status(401));
        let source = source(&client, 4);

        let error = source
            .load_tile(coord(), Priority::VISIBLE)
            .await
            .unwrap()
            .unwrap_err();

        assert!(error.is_auth());
        assert_eq!(error.status(), Some(401));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_is_auth_error() {
        let client = Arc::new(MockHttpClient::status(403));
        let source = source(&client, 4);

        let error = source.load_tile(coord(), Priority::VISIBLE).await.unwrap();
        assert!(matches!(
            error,
            Err(TileError::Auth {
                status: Some(403),
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_retried_to_bound() {
        let client = Arc::new(MockHttpClient::status(503));
        let source = source(&client, 4);

        let outcome = source.load_tile(coord(), Priority::VISIBLE).await.unwrap();

        assert_eq!(
            outcome,
            Err(TileError::Service {
                status: 503,
                attempts: 3
            })
        );
        assert_eq!(client.call_count(), 3);
        assert_eq!(source.stats().await.unwrap().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB).with_script(vec![
            Err(HttpError::new(HttpErrorKind::Timeout, "timed out")),
            Ok(HttpResponse::new(429, Bytes::new())),
        ]));
        let source = source(&client, 4);

        let outcome = source.load_tile(coord(), Priority::VISIBLE).await.unwrap();

        assert!(outcome.is_ok());
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_rejected_without_retry() {
        let client = Arc::new(MockHttpClient::status(404));
        let source = source(&client, 4);

        let outcome = source.load_tile(coord(), Priority::VISIBLE).await.unwrap();

        assert_eq!(outcome, Err(TileError::Rejected { status: 404 }));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_coordinate_fails_without_network() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB));
        let source = source(&client, 4);

        let outcome = source
            .load_tile(TileCoordinate::new(2, 4, 0), Priority::VISIBLE)
            .await
            .unwrap();

        assert!(matches!(outcome, Err(TileError::InvalidCoordinate(_))));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_zoom_beyond_max_is_invalid() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB));
        let source = source(&client, 4);

        let outcome = source
            .load_tile(TileCoordinate::new(25, 0, 0), Priority::VISIBLE)
            .await
            .unwrap();

        assert!(matches!(outcome, Err(TileError::InvalidCoordinate(_))));
    }

    #[tokio::test]
    async fn test_missing_token_fails_fast() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB));
        let source =
            RemoteTileSource::new(config(4), Arc::clone(&client), Arc::new(SharedToken::new()))
                .unwrap();

        let outcome = source.load_tile(coord(), Priority::VISIBLE).await.unwrap();

        assert!(matches!(outcome, Err(TileError::Auth { status: None, .. })));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_fails_fast() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB));
        let expired = Arc::new(StaticToken::new(AuthToken::expiring_in("old", 0)));
        let source = RemoteTileSource::new(config(4), Arc::clone(&client), expired).unwrap();

        let outcome = source.load_tile(coord(), Priority::VISIBLE).await.unwrap();

        assert!(outcome.unwrap_err().is_auth());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_refreshed_token_used_on_reissue() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB).with_script(vec![Ok(
            HttpResponse::new(401, Bytes::new()),
        )]));
        let shared = Arc::new(SharedToken::with_token(AuthToken::new("stale")));
        let source =
            RemoteTileSource::new(config(4), Arc::clone(&client), shared.clone()).unwrap();

        let first = source.load_tile(coord(), Priority::VISIBLE).await.unwrap();
        assert!(first.unwrap_err().is_auth());

        shared.set(AuthToken::new("fresh"));
        let second = source.load_tile(coord(), Priority::VISIBLE).await.unwrap();
        assert!(second.is_ok());

        let tokens: Vec<_> = client.calls().into_iter().map(|(_, t)| t).collect();
        assert_eq!(tokens, vec!["stale".to_string(), "fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_dispose_suppresses_late_response() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB).gated());
        let source = source(&client, 4);

        let handle = source.load_tile(coord(), Priority::VISIBLE);
        source.stats().await.unwrap();

        source.dispose();
        client.release(1);

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap();
        assert_eq!(outcome, None);
        assert!(source.is_disposed());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB));
        let source = source(&client, 4);

        source.dispose();
        source.dispose();
        assert!(source.is_disposed());

        let outcome = source.load_tile(coord(), Priority::VISIBLE).await;
        assert_eq!(outcome, None);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let client = Arc::new(MockHttpClient::ok(PNG_STUB));
        let result = RemoteTileSource::new(config(4), client, tokens());
        assert!(matches!(result, Err(SourceError::NoRuntime)));
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            config(0).validate(),
            Err(SourceError::InvalidConfig(_))
        ));
        assert!(matches!(
            SourceConfig::default().validate(),
            Err(SourceError::MissingMapId)
        ));
        assert!(config(4).validate().is_ok());
    }

    #[test]
    fn test_config_rejects_capped_retry_chain() {
        let mut capped = config(4);
        capped.scheduler.retry = RetryPolicy::exponential(10);
        assert!(matches!(
            capped.validate(),
            Err(SourceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_classify_statuses() {
        let classify_status = |status| classify(coord(), HttpResponse::new(status, Bytes::new()));

        assert!(classify_status(200).is_ok());
        assert!(classify_status(401).unwrap_err().is_auth());
        assert!(classify_status(500).unwrap_err().is_transient());
        assert!(classify_status(429).unwrap_err().is_transient());
        assert_eq!(
            classify_status(400),
            Err(TileError::Rejected { status: 400 })
        );
    }
}
