#![warn(missing_docs)]

//! A map screen for `egui`.
//!
//! This crate provides a `Map` widget that displays a slippy map from a tile server, and a
//! `MapScreen` built on top of it. The screen centers the map on the device location, can
//! overlay live traffic, and can plot nearby restaurants found through a places lookup service.
//!
//! # Example
//!
//! ```no_run
//! use eframe::egui;
//! use egui_map_screen::{
//!     Map, MapScreen,
//!     config::{OpenStreetMapConfig, ScreenConfig},
//!     location::FixedLocationProvider,
//!     places::{GooglePlacesClient, GooglePlacesConfig},
//!     projection::Coordinate,
//! };
//!
//! struct MyApp {
//!     screen: MapScreen,
//! }
//!
//! impl Default for MyApp {
//!     fn default() -> Self {
//!         let map = Map::new(OpenStreetMapConfig::default());
//!         let location = FixedLocationProvider::granted(Coordinate::new(40.0, -74.0));
//!         let places = GooglePlacesClient::new(GooglePlacesConfig::new("my-api-key".to_string()));
//!         Self {
//!             screen: MapScreen::new(map, ScreenConfig::default(), location, places),
//!         }
//!     }
//! }
//!
//! impl eframe::App for MyApp {
//!     fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
//!         self.screen.show(ctx);
//!     }
//! }
//! ```

/// Configuration traits and types for the map widget and the map screen.
pub mod config;

/// Layers drawn on top of the map tiles.
pub mod layers;

/// Location provider abstraction.
pub mod location;

/// Places lookup service abstraction and its HTTP client.
pub mod places;

/// Coordinates, regions and geo/screen projection.
pub mod projection;

/// The map screen component.
pub mod screen;

/// View state of the map screen and its transitions.
pub mod state;

pub use screen::MapScreen;

use eframe::egui;
use egui::{Color32, Painter, Rect, Response, Sense, Ui, Vec2, Widget, pos2};
use eyre::{Context, Result};
use log::{debug, error};
use once_cell::sync::Lazy;
use poll_promise::Promise;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::MapConfig;
use crate::layers::Layer;
use crate::projection::{Coordinate, MapProjection, MapRegion};

// The size of a map tile in pixels.
pub(crate) const TILE_SIZE: u32 = 256;
/// The minimum zoom level.
pub const MIN_ZOOM: u8 = 0;
/// The maximum zoom level.
pub const MAX_ZOOM: u8 = 19;

// Reuse the reqwest client for all downloads by making it a static variable.
pub(crate) static CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .expect("Failed to build reqwest client")
});

/// Errors that can occur while using the map widget.
#[derive(Error, Debug)]
pub enum MapError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),
}

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

impl TileId {
    fn to_url(&self, config: &dyn MapConfig) -> String {
        config.tile_url(self)
    }
}

/// The state of a tile in the cache.
pub(crate) enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// Downloads and decodes a single tile on a background thread.
fn download_tile(url: String) -> Promise<Result<egui::ColorImage, Arc<eyre::Report>>> {
    Promise::spawn_thread("download_tile", move || -> Result<_, Arc<eyre::Report>> {
        let result: Result<_, eyre::Report> = (|| {
            debug!("Downloading tile from {}", &url);
            let response = CLIENT.get(&url).send().map_err(MapError::from)?;

            if !response.status().is_success() {
                return Err(MapError::TileDownloadError(response.status().to_string()));
            }

            let bytes = response.bytes().map_err(MapError::from)?.to_vec();
            let image = image::load_from_memory(&bytes)
                .map_err(MapError::from)?
                .to_rgba8();

            let size = [image.width() as _, image.height() as _];
            let pixels = image.into_raw();
            Ok(egui::ColorImage::from_rgba_unmultiplied(size, &pixels))
        })()
        .with_context(|| format!("Failed to download tile from {}", &url));

        result.map_err(Arc::new)
    })
}

/// Starts the download of a tile if it is not cached yet, and turns a finished download into a
/// texture.
pub(crate) fn load_tile(
    tiles: &mut HashMap<TileId, Tile>,
    config: &dyn MapConfig,
    ctx: &egui::Context,
    tile_id: TileId,
) {
    let tile_state = tiles
        .entry(tile_id)
        .or_insert_with(|| Tile::Loading(download_tile(tile_id.to_url(config))));

    if let Tile::Loading(promise) = tile_state {
        if let Some(result) = promise.ready() {
            match result {
                Ok(color_image) => {
                    let texture = ctx.load_texture(
                        format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                        color_image.clone(),
                        Default::default(),
                    );
                    *tile_state = Tile::Loaded(texture);
                }
                Err(e) => {
                    error!("{:?}", e);
                    *tile_state = Tile::Failed(e.clone());
                }
            }
        }
    }
}

/// Draws a single tile, or a placeholder while it is loading or when it failed.
pub(crate) fn draw_tile(
    tiles: &HashMap<TileId, Tile>,
    painter: &Painter,
    tile_id: &TileId,
    tile_pos: egui::Pos2,
    tint: Color32,
) {
    let tile_rect = Rect::from_min_size(tile_pos, Vec2::new(TILE_SIZE as f32, TILE_SIZE as f32));

    match tiles.get(tile_id) {
        Some(Tile::Loaded(texture)) => {
            painter.image(
                texture.id(),
                tile_rect,
                Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                tint,
            );
        }
        Some(Tile::Loading(_)) | None => {
            draw_placeholder(painter, tile_rect, "?", Color32::ORANGE);
            // The tile is still loading, so we need to tell egui to repaint.
            painter.ctx().request_repaint();
        }
        Some(Tile::Failed(_)) => {
            draw_placeholder(painter, tile_rect, "!", Color32::RED);
        }
    }
}

fn draw_placeholder(painter: &Painter, tile_rect: Rect, mark: &str, color: Color32) {
    // Overlay tiles are transparent, so keep the placeholder translucent.
    painter.rect_filled(tile_rect, 0.0, Color32::from_gray(220).gamma_multiply(0.5));
    painter.rect_stroke(
        tile_rect,
        0.0,
        egui::Stroke::new(1.0, Color32::GRAY),
        egui::StrokeKind::Inside,
    );
    painter.text(
        tile_rect.center(),
        egui::Align2::CENTER_CENTER,
        mark,
        egui::FontId::proportional(40.0),
        color,
    );
}

/// Returns the tiles covering the projection's widget, with their screen positions.
pub(crate) fn visible_tiles(
    projection: &MapProjection,
) -> impl Iterator<Item = (TileId, egui::Pos2)> + use<> {
    let zoom = projection.zoom();
    let rect = projection.widget_rect();
    let center = projection.center();

    let center_x = lon_to_x(center.longitude, zoom);
    let center_y = lat_to_y(center.latitude, zoom);

    let widget_center_x = rect.width() / 2.0;
    let widget_center_y = rect.height() / 2.0;

    let x_min = (center_x - widget_center_x as f64 / TILE_SIZE as f64).floor() as i64;
    let y_min = (center_y - widget_center_y as f64 / TILE_SIZE as f64).floor() as i64;
    let x_max = (center_x + widget_center_x as f64 / TILE_SIZE as f64).ceil() as i64;
    let y_max = (center_y + widget_center_y as f64 / TILE_SIZE as f64).ceil() as i64;

    let world_size_in_tiles = 1_i64 << zoom;
    let rect_min = rect.min;
    (x_min..=x_max)
        .flat_map(move |x| (y_min..=y_max).map(move |y| (x, y)))
        .filter(move |&(x, y)| {
            (0..world_size_in_tiles).contains(&x) && (0..world_size_in_tiles).contains(&y)
        })
        .map(move |(x, y)| {
            let tile_id = TileId {
                z: zoom,
                x: x as u32,
                y: y as u32,
            };
            let screen_x = widget_center_x + (x as f64 - center_x) as f32 * TILE_SIZE as f32;
            let screen_y = widget_center_y + (y as f64 - center_y) as f32 * TILE_SIZE as f32;
            (tile_id, rect_min + Vec2::new(screen_x, screen_y))
        })
}

/// The map widget.
pub struct Map {
    /// The geographical center of the map.
    pub center: Coordinate,

    /// The zoom level of the map.
    pub zoom: u8,

    tiles: HashMap<TileId, Tile>,

    /// The geographical position under the mouse pointer, if any.
    pub mouse_pos: Option<Coordinate>,

    /// Configuration for the map, such as the tile server URL.
    config: Box<dyn MapConfig>,

    /// Layers drawn on top of the tiles, in insertion order.
    layers: Vec<(String, Box<dyn Layer>)>,
}

impl Map {
    /// Creates a new `Map` widget.
    ///
    /// # Arguments
    ///
    /// * `config` - A type that implements `MapConfig`, which provides configuration for the map.
    pub fn new<C: MapConfig + 'static>(config: C) -> Self {
        let center = config.default_center();
        let zoom = config.default_zoom();
        Self {
            tiles: HashMap::new(),
            mouse_pos: None,
            config: Box::new(config),
            layers: Vec::new(),
            center,
            zoom,
        }
    }

    /// Centers the map on `region` and picks the zoom level matching its span.
    pub fn set_region(&mut self, region: &MapRegion) {
        self.center = region.center;
        self.zoom = region.zoom_level();
    }

    /// Adds a layer under `key`. A layer already registered under the same key is replaced in
    /// place, keeping its drawing order.
    pub fn add_layer(&mut self, key: impl Into<String>, layer: impl Layer) {
        let key = key.into();
        let layer: Box<dyn Layer> = Box::new(layer);
        match self.layers.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = layer,
            None => self.layers.push((key, layer)),
        }
    }

    /// Removes the layer registered under `key`, returning whether it existed.
    pub fn remove_layer(&mut self, key: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|(k, _)| k != key);
        before != self.layers.len()
    }

    /// Whether a layer is registered under `key`.
    pub fn has_layer(&self, key: &str) -> bool {
        self.layers.iter().any(|(k, _)| k == key)
    }

    /// Gets a reference to the layer under `key` if it is of type `T`.
    pub fn layer<T: Layer>(&self, key: &str) -> Option<&T> {
        self.layers
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, layer)| layer.as_any().downcast_ref::<T>())
    }

    /// Gets a mutable reference to the layer under `key` if it is of type `T`.
    pub fn layer_mut<T: Layer>(&mut self, key: &str) -> Option<&mut T> {
        self.layers
            .iter_mut()
            .find(|(k, _)| k == key)
            .and_then(|(_, layer)| layer.as_any_mut().downcast_mut::<T>())
    }

    /// Lets the layers handle input, topmost first. Returns `true` if one of them consumed it.
    fn handle_layer_input(&mut self, rect: &Rect, response: &Response) -> bool {
        let projection = MapProjection::new(self.zoom, self.center, *rect);
        let mut handled = false;
        for (_, layer) in self.layers.iter_mut().rev() {
            // Every layer sees the input so that hover state stays current.
            handled |= layer.handle_input(response, &projection);
        }
        handled
    }

    /// Handles user input for panning and zooming.
    fn handle_input(&mut self, ui: &Ui, rect: &Rect, response: &Response) {
        // Handle panning
        if response.dragged() {
            let delta = response.drag_delta();
            let center_in_tiles_x = lon_to_x(self.center.longitude, self.zoom);
            let center_in_tiles_y = lat_to_y(self.center.latitude, self.zoom);

            let mut new_center_x = center_in_tiles_x - (delta.x as f64 / TILE_SIZE as f64);
            let mut new_center_y = center_in_tiles_y - (delta.y as f64 / TILE_SIZE as f64);

            // Clamp the new center to the map boundaries.
            let world_size_in_tiles = 2.0_f64.powi(self.zoom as i32);
            let view_size_in_tiles_x = rect.width() as f64 / TILE_SIZE as f64;
            let view_size_in_tiles_y = rect.height() as f64 / TILE_SIZE as f64;

            let min_center_x = view_size_in_tiles_x / 2.0;
            let max_center_x = world_size_in_tiles - view_size_in_tiles_x / 2.0;
            let min_center_y = view_size_in_tiles_y / 2.0;
            let max_center_y = world_size_in_tiles - view_size_in_tiles_y / 2.0;

            // If the map is smaller than the viewport, center it. Otherwise, clamp the center.
            new_center_x = if min_center_x > max_center_x {
                world_size_in_tiles / 2.0
            } else {
                new_center_x.clamp(min_center_x, max_center_x)
            };
            new_center_y = if min_center_y > max_center_y {
                world_size_in_tiles / 2.0
            } else {
                new_center_y.clamp(min_center_y, max_center_y)
            };

            self.center = Coordinate::new(
                y_to_lat(new_center_y, self.zoom),
                x_to_lon(new_center_x, self.zoom),
            );
        }

        // Handle double-click to zoom and center
        if response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let new_zoom = (self.zoom + 1).clamp(MIN_ZOOM, MAX_ZOOM);

                if new_zoom != self.zoom {
                    // Center the map on the clicked location, then zoom in.
                    let projection = MapProjection::new(self.zoom, self.center, *rect);
                    self.center = projection.unproject(pointer_pos);
                    self.zoom = new_zoom;
                }
            }
        }

        // Handle zooming and mouse position
        let Some(mouse_pos) = response.hover_pos().filter(|_| response.hovered()) else {
            self.mouse_pos = None;
            return;
        };

        let mouse_rel = mouse_pos - rect.min;
        let widget_center_x = rect.width() as f64 / 2.0;
        let widget_center_y = rect.height() as f64 / 2.0;

        let target = MapProjection::new(self.zoom, self.center, *rect).unproject(mouse_pos);
        self.mouse_pos = Some(target);

        let scroll = ui.input(|i| i.raw_scroll_delta.y);
        if scroll == 0.0 {
            return;
        }

        let old_zoom = self.zoom;
        let mut new_zoom = (self.zoom as i32 + scroll.signum() as i32)
            .clamp(MIN_ZOOM as i32, MAX_ZOOM as i32) as u8;

        // If we are zooming out, check if the new zoom level is valid.
        if scroll < 0.0 {
            let world_pixel_size = 2.0_f64.powi(new_zoom as i32) * TILE_SIZE as f64;
            // If the world size would become smaller than the widget size, reject the zoom.
            if world_pixel_size < rect.width() as f64 || world_pixel_size < rect.height() as f64 {
                new_zoom = old_zoom;
            }
        }

        if new_zoom != old_zoom {
            self.zoom = new_zoom;

            // Adjust the map center so the geo-coordinate under the mouse remains the same
            let new_target_x = lon_to_x(target.longitude, new_zoom);
            let new_target_y = lat_to_y(target.latitude, new_zoom);

            let new_center_x =
                new_target_x - (mouse_rel.x as f64 - widget_center_x) / TILE_SIZE as f64;
            let new_center_y =
                new_target_y - (mouse_rel.y as f64 - widget_center_y) / TILE_SIZE as f64;

            self.center = Coordinate::new(
                y_to_lat(new_center_y, new_zoom),
                x_to_lon(new_center_x, new_zoom),
            );
        }
    }

    /// Draws the map tiles, the layers and the attribution.
    fn draw(&mut self, ui: &mut Ui, rect: &Rect) {
        let painter = ui.painter_at(*rect);
        painter.rect_filled(*rect, 0.0, Color32::from_rgb(220, 220, 220)); // Background

        let projection = MapProjection::new(self.zoom, self.center, *rect);
        for (tile_id, tile_pos) in visible_tiles(&projection) {
            load_tile(&mut self.tiles, self.config.as_ref(), ui.ctx(), tile_id);
            draw_tile(&self.tiles, &painter, &tile_id, tile_pos, Color32::WHITE);
        }

        for (_, layer) in &self.layers {
            layer.draw(&painter, &projection);
        }

        self.draw_attribution(ui, rect);
    }

    /// The download error of the failed tile under `screen_pos`, if any.
    fn tile_error_at(
        &self,
        projection: &MapProjection,
        screen_pos: egui::Pos2,
    ) -> Option<&eyre::Report> {
        visible_tiles(projection).find_map(|(tile_id, tile_pos)| {
            let tile_rect = Rect::from_min_size(tile_pos, Vec2::splat(TILE_SIZE as f32));
            match self.tiles.get(&tile_id) {
                Some(Tile::Failed(e)) if tile_rect.contains(screen_pos) => Some(e.as_ref()),
                _ => None,
            }
        })
    }

    /// Draws the attribution text.
    fn draw_attribution(&self, ui: &mut Ui, rect: &Rect) {
        if let Some(attribution) = self.config.attribution() {
            let bg_color = if ui.visuals().dark_mode {
                Color32::from_black_alpha(150)
            } else {
                Color32::from_white_alpha(150)
            };

            let frame = egui::Frame::NONE
                .inner_margin(egui::Margin::same(5)) // A bit of padding
                .fill(bg_color)
                .corner_radius(3.0);

            egui::Area::new(ui.id().with("attribution"))
                .fixed_pos(rect.left_bottom())
                .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(5.0, -5.0))
                .show(ui.ctx(), |ui| {
                    frame.show(ui, |ui| {
                        ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                        ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend); // Don't wrap attribution text.

                        if let Some(url) = self.config.attribution_url() {
                            ui.hyperlink_to(attribution, url);
                        } else {
                            ui.label(attribution);
                        }
                    });
                });
        }
    }
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
pub(crate) fn lon_to_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
pub(crate) fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0
        * (2.0_f64.powi(zoom as i32))
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
pub(crate) fn x_to_lon(x: f64, zoom: u8) -> f64 {
    x / (2.0_f64.powi(zoom as i32)) * 360.0 - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
pub(crate) fn y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / (2.0_f64.powi(zoom as i32));
    n.sinh().atan().to_degrees()
}

impl Widget for &mut Map {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));
        if !self.handle_layer_input(&rect, &response) {
            self.handle_input(ui, &rect, &response);
        }
        self.draw(ui, &rect);

        let projection = MapProjection::new(self.zoom, self.center, rect);
        let tile_error = response
            .hover_pos()
            .and_then(|pos| self.tile_error_at(&projection, pos))
            .map(|e| format!("{e}"));
        match tile_error {
            Some(text) => response.on_hover_text(text),
            None => response,
        }
    }
}
