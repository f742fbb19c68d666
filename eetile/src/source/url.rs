//! Tile URL templating.
//!
//! The default layout is `{base}/{map_id}/tiles/{z}/{x}/{y}`. Custom templates
//! may use the same placeholders in any order; `{zoom}` is accepted as an
//! alias for `{z}`. Credentials are never part of the URL: the token travels
//! in the `Authorization` header only.

use crate::coord::TileCoordinate;

use super::remote::SourceError;

/// Default URL layout for map tiles.
pub const DEFAULT_URL_TEMPLATE: &str = "{base}/{map_id}/tiles/{z}/{x}/{y}";

/// Maps a tile coordinate to the URL it is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileUrlTemplate {
    template: String,
    base: String,
    map_id: String,
}

impl TileUrlTemplate {
    /// Creates a template using [`DEFAULT_URL_TEMPLATE`].
    pub fn new(base: &str, map_id: &str) -> Result<Self, SourceError> {
        Self::with_template(DEFAULT_URL_TEMPLATE, base, map_id)
    }

    /// Creates a template from a custom layout.
    ///
    /// The layout must contain `{x}`, `{y}` and either `{z}` or `{zoom}`.
    pub fn with_template(template: &str, base: &str, map_id: &str) -> Result<Self, SourceError> {
        let base = base.trim_end_matches('/');
        let map_id = map_id.trim_matches('/');

        if base.is_empty() {
            return Err(SourceError::InvalidTemplate(
                "base URL is empty".to_string(),
            ));
        }
        if map_id.is_empty() && template.contains("{map_id}") {
            return Err(SourceError::MissingMapId);
        }

        let has_zoom = template.contains("{z}") || template.contains("{zoom}");
        for (present, placeholder) in [
            (has_zoom, "{z}"),
            (template.contains("{x}"), "{x}"),
            (template.contains("{y}"), "{y}"),
        ] {
            if !present {
                return Err(SourceError::InvalidTemplate(format!(
                    "template '{}' is missing {}",
                    template, placeholder
                )));
            }
        }

        Ok(Self {
            template: template.to_string(),
            base: base.to_string(),
            map_id: map_id.to_string(),
        })
    }

    /// Builds the URL for `coord`.
    pub fn render(&self, coord: TileCoordinate) -> String {
        self.template
            .replace("{base}", &self.base)
            .replace("{map_id}", &self.map_id)
            .replace("{zoom}", &coord.zoom.to_string())
            .replace("{z}", &coord.zoom.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }

    /// Identifier for the imagery this template serves.
    ///
    /// The template with base and map id filled in and the tile placeholders
    /// left as they are. Tokens never appear in it, so two sources pointing
    /// at the same imagery share it whatever credentials they use.
    pub fn identity(&self) -> String {
        format!(
            "eetile:{}",
            self.template
                .replace("{base}", &self.base)
                .replace("{map_id}", &self.map_id)
        )
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }
}
