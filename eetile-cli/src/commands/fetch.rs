//! `fetch` command: load one tile through an overlay and save it as PNG.
//!
//! The command plays the part of a map widget with no screen: it asks the
//! overlay for an element, waits for the repaint notification and writes the
//! element's pixels to disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::mpsc;
use tracing::info;

use eetile::config::ConfigFile;
use eetile::coord::{to_tile_coords, TileCoordinate};
use eetile::logging::init_logging;
use eetile::overlay::{ElementId, RepaintHook, TileContent, TileElement, TileOverlay};
use eetile::source::{AsyncReqwestClient, AuthToken, RemoteTileSource, StaticToken};

use crate::error::CliError;

/// Arguments for `eetile fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Zoom level
    #[arg(long)]
    pub zoom: u8,

    /// Tile column (use with --y)
    #[arg(long, requires = "y", conflicts_with_all = ["lat", "lon"])]
    pub x: Option<u32>,

    /// Tile row (use with --x)
    #[arg(long, requires = "x")]
    pub y: Option<u32>,

    /// Latitude in decimal degrees (use with --lon)
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude in decimal degrees (use with --lat)
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Output PNG path
    #[arg(long, short)]
    pub output: PathBuf,

    /// Map or asset id (overrides config.ini)
    #[arg(long)]
    pub map_id: Option<String>,

    /// Endpoint prefix (overrides config.ini)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Bearer token for the tile server
    #[arg(long, env = "EETILE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Seconds to wait for the tile, retries included
    #[arg(long, default_value = "60")]
    pub timeout: u64,

    /// Config file to use instead of ~/.eetile/config.ini
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl FetchArgs {
    /// Tile addressed by either `--x/--y` or `--lat/--lon`.
    pub fn coordinate(&self) -> Result<TileCoordinate, CliError> {
        match (self.x, self.y, self.lat, self.lon) {
            (Some(x), Some(y), _, _) => Ok(TileCoordinate::new(self.zoom, x, y)),
            (_, _, Some(lat), Some(lon)) => Ok(to_tile_coords(lat, lon, self.zoom)?),
            _ => Err(CliError::Config(
                "Specify the tile with --x/--y or --lat/--lon".to_string(),
            )),
        }
    }
}

/// Host stand-in that forwards repaint notifications to the command.
struct HeadlessHost {
    changed: mpsc::UnboundedSender<ElementId>,
}

impl RepaintHook for HeadlessHost {
    fn tile_changed(&self, element: &TileElement) {
        let _ = self.changed.send(element.id());
    }
}

/// Run the fetch command.
pub fn run(args: FetchArgs) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };

    let _logging = init_logging(&config.logging.directory, &config.logging.file, "info")
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let coord = args.coordinate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Config(format!("Failed to start async runtime: {}", e)))?;

    runtime.block_on(fetch_tile(args, config, coord))
}

async fn fetch_tile(
    args: FetchArgs,
    config: ConfigFile,
    coord: TileCoordinate,
) -> Result<(), CliError> {
    let token = args.token.ok_or_else(|| {
        CliError::Config("No access token. Pass --token or set EETILE_TOKEN".to_string())
    })?;

    let mut source_config = config.source_config();
    if let Some(map_id) = args.map_id {
        source_config.map_id = map_id;
    }
    if let Some(base_url) = args.base_url {
        source_config.base_url = base_url;
    }

    let client =
        AsyncReqwestClient::with_timeout(config.http.timeout_secs).map_err(CliError::HttpClient)?;
    let tokens = Arc::new(StaticToken::new(AuthToken::new(token)));
    let source = Arc::new(RemoteTileSource::new(source_config, client, tokens)?);

    let (changed, mut repainted) = mpsc::unbounded_channel();
    let overlay = TileOverlay::new(source.clone(), Arc::new(HeadlessHost { changed }))
        .map_err(CliError::Overlay)?;

    info!(tile = %coord, source = overlay.unique_id(), "Fetching tile");
    let element = overlay.get_tile(coord);

    let waited = tokio::time::timeout(Duration::from_secs(args.timeout), repainted.recv()).await;

    if let Some(stats) = source.stats().await {
        info!(
            fetches = stats.fetches,
            retries = stats.retries,
            failed = stats.failed,
            "Scheduler statistics"
        );
    }
    overlay.dispose();

    if waited.is_err() {
        return Err(CliError::Timeout(args.timeout));
    }

    let pixels = match element.content() {
        TileContent::Ready(pixels) => pixels,
        TileContent::Unavailable(reason) => return Err(CliError::TileUnavailable(reason)),
        TileContent::Loading => return Err(CliError::Timeout(args.timeout)),
    };

    pixels
        .save_with_format(&args.output, image::ImageFormat::Png)
        .map_err(|e| CliError::FileWrite {
            path: args.output.display().to_string(),
            error: e.to_string(),
        })?;

    println!(
        "Saved tile {} ({}x{}) to {}",
        coord,
        pixels.width(),
        pixels.height(),
        args.output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        fetch: FetchArgs,
    }

    fn parse(args: &[&str]) -> Result<FetchArgs, clap::Error> {
        let mut argv = vec!["eetile"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).map(|cli| cli.fetch)
    }

    #[test]
    fn test_tile_coordinate_arguments() {
        let args = parse(&["--zoom", "5", "--x", "10", "--y", "12", "-o", "t.png"]).unwrap();
        assert_eq!(args.coordinate().unwrap(), TileCoordinate::new(5, 10, 12));
    }

    #[test]
    fn test_geographic_arguments() {
        let args = parse(&[
            "--zoom", "10", "--lat", "51.5074", "--lon", "-0.1278", "-o", "t.png",
        ])
        .unwrap();
        assert_eq!(args.coordinate().unwrap(), TileCoordinate::new(10, 511, 340));
    }

    #[test]
    fn test_x_without_y_is_rejected() {
        assert!(parse(&["--zoom", "5", "--x", "10", "-o", "t.png"]).is_err());
    }

    #[test]
    fn test_mixed_addressing_is_rejected() {
        assert!(parse(&[
            "--zoom", "5", "--x", "1", "--y", "1", "--lat", "0", "--lon", "0", "-o", "t.png",
        ])
        .is_err());
    }

    #[test]
    fn test_missing_location() {
        let args = parse(&["--zoom", "5", "-o", "t.png"]).unwrap();
        assert!(matches!(args.coordinate(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_invalid_latitude() {
        let args = parse(&["--zoom", "5", "--lat", "89", "--lon", "0", "-o", "t.png"]).unwrap();
        assert!(matches!(args.coordinate(), Err(CliError::Coordinate(_))));
    }
}
