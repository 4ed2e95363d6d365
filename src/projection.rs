//! Geographical coordinates, map regions and map projection.

use egui::Rect;
use serde::{Deserialize, Serialize};

use crate::{MAX_ZOOM, MIN_ZOOM, TILE_SIZE, lat_to_y, lon_to_x, x_to_lon, y_to_lat};

/// A point on Earth in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a new `Coordinate`.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A map viewport: a center and the latitude/longitude span visible around it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapRegion {
    /// The center of the viewport.
    pub center: Coordinate,

    /// Visible latitude span in degrees.
    pub latitude_delta: f64,

    /// Visible longitude span in degrees.
    pub longitude_delta: f64,
}

impl MapRegion {
    /// The slippy map zoom level whose tile width best covers `longitude_delta`.
    pub fn zoom_level(&self) -> u8 {
        if self.longitude_delta.is_nan() || self.longitude_delta <= 0.0 {
            return MAX_ZOOM;
        }
        let zoom = (360.0 / self.longitude_delta).log2().floor();
        zoom.clamp(MIN_ZOOM as f64, MAX_ZOOM as f64) as u8
    }
}

/// A helper for converting between geographical and screen coordinates.
pub struct MapProjection {
    zoom: u8,
    center: Coordinate,
    widget_rect: Rect,
}

impl MapProjection {
    /// Creates a new `MapProjection`.
    pub(crate) fn new(zoom: u8, center: Coordinate, widget_rect: Rect) -> Self {
        Self {
            zoom,
            center,
            widget_rect,
        }
    }

    /// The zoom level the projection was made for.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// The screen rectangle of the map widget.
    pub fn widget_rect(&self) -> Rect {
        self.widget_rect
    }

    /// The geographical center of the map widget.
    pub fn center(&self) -> Coordinate {
        self.center
    }

    /// Projects a geographical coordinate to a screen coordinate.
    pub fn project(&self, geo_pos: Coordinate) -> egui::Pos2 {
        let center_x = lon_to_x(self.center.longitude, self.zoom);
        let center_y = lat_to_y(self.center.latitude, self.zoom);

        let tile_x = lon_to_x(geo_pos.longitude, self.zoom);
        let tile_y = lat_to_y(geo_pos.latitude, self.zoom);

        let dx = (tile_x - center_x) * TILE_SIZE as f64;
        let dy = (tile_y - center_y) * TILE_SIZE as f64;

        let widget_center = self.widget_rect.center();
        widget_center + egui::vec2(dx as f32, dy as f32)
    }

    /// Un-projects a screen coordinate to a geographical coordinate.
    pub fn unproject(&self, screen_pos: egui::Pos2) -> Coordinate {
        let rel_pos = screen_pos - self.widget_rect.min;
        let widget_center_x = self.widget_rect.width() as f64 / 2.0;
        let widget_center_y = self.widget_rect.height() as f64 / 2.0;

        let center_x = lon_to_x(self.center.longitude, self.zoom);
        let center_y = lat_to_y(self.center.latitude, self.zoom);

        let target_x = center_x + (rel_pos.x as f64 - widget_center_x) / TILE_SIZE as f64;
        let target_y = center_y + (rel_pos.y as f64 - widget_center_y) / TILE_SIZE as f64;

        Coordinate::new(y_to_lat(target_y, self.zoom), x_to_lon(target_x, self.zoom))
    }
}
