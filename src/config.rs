//! Configuration for tile providers and for the map screen.

use serde::{Deserialize, Serialize};

use crate::TileId;
use crate::projection::Coordinate;

/// Configuration for a map provider.
pub trait MapConfig {
    /// Returns the URL for a given tile.
    fn tile_url(&self, tile: &TileId) -> String;

    /// Returns the attribution text to be displayed on the map. If returns `None`, no attribution is shown.
    fn attribution(&self) -> Option<&String>;

    /// Returns the attribution URL to be linked from the attribution text.
    fn attribution_url(&self) -> Option<&String>;

    /// The default geographical center of the map.
    fn default_center(&self) -> Coordinate;

    /// The default zoom level of the map.
    fn default_zoom(&self) -> u8;
}

/// Configuration for the OpenStreetMap tile server.
///
/// # Example
///
/// ```
/// use egui_map_screen::config::OpenStreetMapConfig;
/// let config = OpenStreetMapConfig::default();
/// ```
#[cfg(feature = "openstreetmap")]
pub struct OpenStreetMapConfig {
    base_url: String,
    attribution: String,
    attribution_url: String,
    default_center: Coordinate,
    default_zoom: u8,
}

#[cfg(feature = "openstreetmap")]
impl Default for OpenStreetMapConfig {
    fn default() -> Self {
        Self {
            base_url: "https://tile.openstreetmap.org".to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            attribution_url: "https://www.openstreetmap.org".to_string(),
            default_center: FALLBACK_CENTER,
            default_zoom: 13,
        }
    }
}

#[cfg(feature = "openstreetmap")]
impl MapConfig for OpenStreetMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!("{}/{}/{}/{}.png", self.base_url, tile.z, tile.x, tile.y)
    }

    fn attribution(&self) -> Option<&String> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&String> {
        Some(&self.attribution_url)
    }

    fn default_center(&self) -> Coordinate {
        self.default_center
    }

    fn default_zoom(&self) -> u8 {
        self.default_zoom
    }
}

/// Traffic flow overlay tiles from TomTom. Tiles are transparent and meant to be drawn
/// on top of a base map with a `TileLayer`.
///
/// # Example
///
/// ```
/// use egui_map_screen::config::TomTomTrafficConfig;
/// let config = TomTomTrafficConfig::new("my-api-key".to_string());
/// ```
#[cfg(feature = "tomtom-traffic")]
pub struct TomTomTrafficConfig {
    base_url: String,
    style: String,
    attribution: String,
    attribution_url: String,
    api_key: String,
}

#[cfg(feature = "tomtom-traffic")]
impl Default for TomTomTrafficConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tomtom.com/traffic/map/4/tile/flow".to_string(),
            style: "relative0".to_string(),
            attribution: "© TomTom".to_string(),
            attribution_url: "https://www.tomtom.com".to_string(),
            api_key: "your-key-here".to_string(),
        }
    }
}

#[cfg(feature = "tomtom-traffic")]
impl TomTomTrafficConfig {
    /// Creates a new `TomTomTrafficConfig` with the given API key.
    pub fn new(api_key: String) -> Self {
        let mut config = Self::default();
        config.api_key = api_key;
        config
    }
}

#[cfg(feature = "tomtom-traffic")]
impl MapConfig for TomTomTrafficConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!(
            "{}/{}/{}/{}/{}.png?key={}",
            self.base_url, self.style, tile.z, tile.x, tile.y, self.api_key
        )
    }

    fn attribution(&self) -> Option<&String> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&String> {
        Some(&self.attribution_url)
    }

    fn default_center(&self) -> Coordinate {
        FALLBACK_CENTER
    }

    fn default_zoom(&self) -> u8 {
        13
    }
}

/// A dynamic map configuration that allows defining a custom tile URL function at runtime.
///
/// # Example
///
/// ```
/// use egui_map_screen::config::DynMapConfig;
/// let config = DynMapConfig::new(|tile| format!("https://my-tile-server/{}/{}/{}.png", tile.z, tile.x, tile.y));
/// ```
pub struct DynMapConfig {
    tile_url: Box<dyn Fn(&TileId) -> String>,
}

impl DynMapConfig {
    /// Creates a new `DynMapConfig` with a custom tile URL function.
    pub fn new(tile_url: impl Fn(&TileId) -> String + 'static) -> Self {
        Self {
            tile_url: Box::new(tile_url),
        }
    }
}

impl MapConfig for DynMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        (self.tile_url)(tile)
    }

    fn attribution(&self) -> Option<&String> {
        None
    }

    fn attribution_url(&self) -> Option<&String> {
        None
    }

    fn default_center(&self) -> Coordinate {
        FALLBACK_CENTER
    }

    fn default_zoom(&self) -> u8 {
        2
    }
}

/// Where the map is centered until the device location is known.
pub const FALLBACK_CENTER: Coordinate = Coordinate::new(37.78825, -122.4324);

/// Settings of the map screen.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use egui_map_screen::config::ScreenConfig;
/// let config: ScreenConfig = serde_json::from_str(r#"{"search_radius": 1000}"#).unwrap();
/// assert_eq!(config.search_radius, 1000);
/// assert_eq!(config.search_category, "restaurant");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Center used while no location has been obtained.
    pub fallback_center: Coordinate,

    /// Visible latitude span of the screen's region.
    pub latitude_delta: f64,

    /// Visible longitude span of the screen's region.
    pub longitude_delta: f64,

    /// Search radius of the places lookup, in meters.
    pub search_radius: u32,

    /// Place category searched for when restaurants are shown.
    pub search_category: String,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            fallback_center: FALLBACK_CENTER,
            latitude_delta: 0.0922,
            longitude_delta: 0.0421,
            search_radius: 500,
            search_category: "restaurant".to_string(),
        }
    }
}
