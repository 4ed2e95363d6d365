//! A layer for tile overlays, such as live traffic, on the map.

use egui::{Color32, Painter, Response};
use std::{any::Any, collections::HashMap};

use crate::{
    Tile, TileId, config::MapConfig, draw_tile, layers::Layer, load_tile,
    projection::MapProjection, visible_tiles,
};

/// A layer that manages and renders overlay tiles on the map view.
///
/// While disabled the layer neither downloads nor draws anything; tiles already in the cache
/// are kept for when it is enabled again.
pub struct TileLayer {
    tiles: HashMap<TileId, Tile>,
    /// Color tint applied to the tile images when rendering
    pub tint: Color32,
    /// Whether the overlay is shown.
    pub enabled: bool,
    config: Box<dyn MapConfig>,
}

impl TileLayer {
    /// Creates a new, enabled tile layer with the given map configuration.
    pub fn new(config: impl MapConfig + 'static) -> Self {
        Self {
            tiles: Default::default(),
            tint: Color32::WHITE,
            enabled: true,
            config: Box::new(config),
        }
    }

    /// Sets whether the overlay is shown.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Layer for TileLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        if self.enabled {
            for (tile_id, _) in visible_tiles(projection) {
                load_tile(&mut self.tiles, self.config.as_ref(), &response.ctx, tile_id);
            }
        }
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        if !self.enabled {
            return;
        }
        // Tiles that became visible after input was handled show as placeholders for a frame.
        for (tile_id, tile_pos) in visible_tiles(projection) {
            draw_tile(&self.tiles, painter, &tile_id, tile_pos, self.tint);
        }
    }
}
