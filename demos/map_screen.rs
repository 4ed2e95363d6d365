#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release
#![allow(rustdoc::missing_crate_level_docs)] // it's an example

use eframe::egui;
use egui_map_screen::{
    Map, MapScreen,
    config::{OpenStreetMapConfig, ScreenConfig, TomTomTrafficConfig},
    layers::tile::TileLayer,
    location::IpLocationProvider,
    places::{GooglePlacesClient, GooglePlacesConfig},
    screen::TRAFFIC_LAYER,
};

fn main() -> eframe::Result {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([480.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Map screen",
        options,
        Box::new(|_cc| Ok(Box::new(MyApp::new(screen_config())))),
    )
}

/// Reads the screen settings from the JSON file given as the first argument, if any.
fn screen_config() -> ScreenConfig {
    let Some(path) = std::env::args().nth(1) else {
        return ScreenConfig::default();
    };
    match std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|json| serde_json::from_str(&json).map_err(|e| e.to_string()))
    {
        Ok(config) => config,
        Err(e) => {
            log::error!("Ignoring screen config {path}: {e}");
            ScreenConfig::default()
        }
    }
}

struct MyApp {
    screen: MapScreen,
}

impl MyApp {
    fn new(config: ScreenConfig) -> Self {
        let mut map = Map::new(OpenStreetMapConfig::default());
        if let Ok(key) = std::env::var("TOMTOM_API_KEY") {
            map.add_layer(TRAFFIC_LAYER, TileLayer::new(TomTomTrafficConfig::new(key)));
        }

        let api_key = std::env::var("GOOGLE_PLACES_API_KEY").unwrap_or_else(|_| {
            log::warn!("GOOGLE_PLACES_API_KEY is not set, restaurant lookups will fail");
            String::new()
        });
        let places = GooglePlacesClient::new(GooglePlacesConfig::new(api_key));

        Self {
            screen: MapScreen::new(map, config, IpLocationProvider::default(), places),
        }
    }
}

impl eframe::App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.screen.show(ctx);
    }
}
