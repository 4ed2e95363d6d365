//! The map screen: a map centered on the device, a traffic toggle and a restaurants toggle.

use eframe::egui;
use log::debug;
use poll_promise::Promise;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::Map;
use crate::config::ScreenConfig;
use crate::layers::marker::MarkerLayer;
use crate::layers::tile::TileLayer;
use crate::location::{LocationError, LocationProvider, PermissionStatus};
use crate::places::{NearbyQuery, PlaceOfInterest, PlacesError, PlacesService};
use crate::projection::{Coordinate, MapRegion};
use crate::state::{Alert, Effect, Event, MapScene, ViewState};

/// Key of the layer holding the screen's markers.
pub const MARKER_LAYER: &str = "markers";

/// Key of the traffic overlay layer. Register a `TileLayer` under this key to get live traffic.
pub const TRAFFIC_LAYER: &str = "traffic";

type LookupPromise = Promise<Result<Vec<PlaceOfInterest>, PlacesError>>;

/// The map screen.
///
/// Owns the `ViewState` and is the only place it changes. Location and places requests run on
/// background threads; their outcomes are picked up by `poll` on the UI thread and fed through
/// `ViewState::reduce`.
pub struct MapScreen {
    state: ViewState,
    config: ScreenConfig,
    map: Map,

    location: Arc<dyn LocationProvider>,
    places: Arc<dyn PlacesService>,

    permission: Option<Promise<PermissionStatus>>,
    position: Option<Promise<Result<Coordinate, LocationError>>>,
    // Lookups are not deduplicated; each completes independently.
    lookups: Vec<LookupPromise>,

    alerts: VecDeque<Alert>,
    applied_region: Option<MapRegion>,
}

impl MapScreen {
    /// Creates the screen and starts acquiring the device location.
    ///
    /// A `MarkerLayer` is added to `map` under `MARKER_LAYER` unless one is already there. The
    /// traffic overlay is optional, see `TRAFFIC_LAYER`.
    pub fn new(
        mut map: Map,
        config: ScreenConfig,
        location: impl LocationProvider + 'static,
        places: impl PlacesService + 'static,
    ) -> Self {
        if map.layer::<MarkerLayer>(MARKER_LAYER).is_none() {
            map.add_layer(MARKER_LAYER, MarkerLayer::default());
        }
        match map.layer_mut::<TileLayer>(TRAFFIC_LAYER) {
            Some(traffic) => traffic.enabled = false,
            None => debug!("No traffic layer registered, the traffic toggle draws nothing"),
        }

        let mut screen = Self {
            state: ViewState::default(),
            config,
            map,
            location: Arc::new(location),
            places: Arc::new(places),
            permission: None,
            position: None,
            lookups: Vec::new(),
            alerts: VecDeque::new(),
            applied_region: None,
        };
        for effect in ViewState::on_mount() {
            screen.run(effect);
        }
        screen
    }

    /// The current view state.
    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// The alert currently shown, if any.
    pub fn current_alert(&self) -> Option<&Alert> {
        self.alerts.front()
    }

    /// Dismisses the alert currently shown.
    pub fn dismiss_alert(&mut self) {
        self.alerts.pop_front();
    }

    /// The map widget.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Whether a location or places request is still running.
    pub fn is_busy(&self) -> bool {
        self.permission.is_some() || self.position.is_some() || !self.lookups.is_empty()
    }

    /// Applies `event` and runs the effects it produces.
    pub fn dispatch(&mut self, event: Event) {
        let (next, effects) = self.state.reduce(event, &self.config);
        self.state = next;
        for effect in effects {
            self.run(effect);
        }
    }

    fn run(&mut self, effect: Effect) {
        match effect {
            Effect::RequestPermission => {
                let location = Arc::clone(&self.location);
                self.permission = Some(Promise::spawn_thread("location_permission", move || {
                    location.request_foreground_permission()
                }));
            }
            Effect::RequestPosition => {
                let location = Arc::clone(&self.location);
                self.position = Some(Promise::spawn_thread("location_position", move || {
                    location.current_position()
                }));
            }
            Effect::LookupPlaces(query) => self.lookup(query),
            Effect::Alert(alert) => self.alerts.push_back(alert),
        }
    }

    fn lookup(&mut self, query: NearbyQuery) {
        let places = Arc::clone(&self.places);
        self.lookups.push(Promise::spawn_thread("places_lookup", move || {
            places.nearby(&query)
        }));
    }

    /// Picks up the outcome of finished background requests.
    pub fn poll(&mut self) {
        if let Some(promise) = self.permission.take() {
            match promise.try_take() {
                Ok(status) => self.dispatch(Event::PermissionResolved(status)),
                Err(promise) => self.permission = Some(promise),
            }
        }

        if let Some(promise) = self.position.take() {
            match promise.try_take() {
                Ok(result) => self.dispatch(Event::PositionResolved(result)),
                Err(promise) => self.position = Some(promise),
            }
        }

        let mut finished = Vec::new();
        for promise in std::mem::take(&mut self.lookups) {
            match promise.try_take() {
                Ok(result) => finished.push(result),
                Err(promise) => self.lookups.push(promise),
            }
        }
        for result in finished {
            self.dispatch(Event::LookupResolved(result));
        }
    }

    /// Hands the scene over to the map and its layers.
    fn apply_scene(&mut self, scene: MapScene) {
        // The map stays where the user panned it until the region itself changes.
        if self.applied_region != Some(scene.region) {
            self.map.set_region(&scene.region);
            self.applied_region = Some(scene.region);
        }

        if let Some(traffic) = self.map.layer_mut::<TileLayer>(TRAFFIC_LAYER) {
            traffic.enabled = scene.shows_traffic;
        }

        if let Some(markers) = self.map.layer_mut::<MarkerLayer>(MARKER_LAYER) {
            if markers.markers() != scene.markers.as_slice() {
                markers.set_markers(scene.markers);
            }
        }
    }

    /// Shows the screen in the central panel of `ctx`.
    pub fn show(&mut self, ctx: &egui::Context) {
        self.poll();
        self.apply_scene(self.state.scene(&self.config));

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                ui.add_enabled_ui(self.alerts.is_empty(), |ui| {
                    ui.add(&mut self.map);
                });
            });

        self.show_controls(ctx);
        self.show_alert(ctx);

        if self.is_busy() {
            // Nothing else wakes egui up when a background request finishes.
            ctx.request_repaint();
        }
    }

    fn show_controls(&mut self, ctx: &egui::Context) {
        let mut events = Vec::new();

        egui::Area::new(egui::Id::new("map_screen_controls"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-10.0, -30.0))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.add_enabled_ui(self.alerts.is_empty(), |ui| {
                        let traffic = if self.state.show_traffic {
                            "Hide traffic"
                        } else {
                            "Show traffic"
                        };
                        // The state only changes through `dispatch`, so toggle a copy.
                        let mut shown = self.state.show_traffic;
                        if ui.toggle_value(&mut shown, traffic).clicked() {
                            events.push(Event::TrafficToggled);
                        }

                        let restaurants = if self.state.show_restaurants {
                            "Hide restaurants"
                        } else {
                            "Show restaurants"
                        };
                        let mut shown = self.state.show_restaurants;
                        if ui.toggle_value(&mut shown, restaurants).clicked() {
                            events.push(Event::RestaurantsToggled);
                        }
                    });
                });
            });

        self.handle_control_events(ctx, events);
    }

    /// Dispatches the events raised by the controls. The map was already drawn this frame, so
    /// another one is needed to show the new state.
    fn handle_control_events(&mut self, ctx: &egui::Context, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        for event in events {
            self.dispatch(event);
        }
        ctx.request_repaint();
    }

    fn show_alert(&mut self, ctx: &egui::Context) {
        let Some(alert) = self.alerts.front() else {
            return;
        };

        let mut dismissed = false;
        egui::Window::new(alert.title())
            .id(egui::Id::new("map_screen_alert"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(alert.message());
                ui.separator();
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });

        if dismissed {
            self.dismiss_alert();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DynMapConfig, FALLBACK_CENTER};
    use crate::location::FixedLocationProvider;
    use crate::state::MY_LOCATION_MARKER_ID;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Answers lookups from a queue of canned results and counts the calls.
    #[derive(Clone, Default)]
    struct MockPlaces {
        calls: Arc<AtomicUsize>,
        queries: Arc<Mutex<Vec<NearbyQuery>>>,
        responses: Arc<Mutex<VecDeque<Result<Vec<PlaceOfInterest>, PlacesError>>>>,
    }

    impl MockPlaces {
        fn respond(&self, result: Result<Vec<PlaceOfInterest>, PlacesError>) {
            self.responses.lock().unwrap().push_back(result);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PlacesService for MockPlaces {
        fn nearby(&self, query: &NearbyQuery) -> Result<Vec<PlaceOfInterest>, PlacesError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn cafe() -> PlaceOfInterest {
        PlaceOfInterest {
            id: "p1".to_string(),
            name: "Cafe A".to_string(),
            address: "1 Main St".to_string(),
            location: Coordinate::new(1.0, 2.0),
        }
    }

    fn map() -> Map {
        let mut map = Map::new(DynMapConfig::new(|_| String::new()));
        map.add_layer(TRAFFIC_LAYER, TileLayer::new(DynMapConfig::new(|_| String::new())));
        map
    }

    fn screen(location: FixedLocationProvider, places: &MockPlaces) -> MapScreen {
        MapScreen::new(map(), ScreenConfig::default(), location, places.clone())
    }

    /// Polls until no background request is left.
    fn settle(screen: &mut MapScreen) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while screen.is_busy() {
            assert!(Instant::now() < deadline, "background requests did not finish");
            std::thread::sleep(Duration::from_millis(5));
            screen.poll();
        }
    }

    fn refresh(screen: &mut MapScreen) {
        settle(screen);
        let scene = screen.state.scene(&screen.config);
        screen.apply_scene(scene);
    }

    fn marker_ids(screen: &MapScreen) -> Vec<String> {
        screen
            .map
            .layer::<MarkerLayer>(MARKER_LAYER)
            .unwrap()
            .markers()
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    #[test]
    fn new_adds_marker_layer_and_disables_traffic() {
        let places = MockPlaces::default();
        let screen = screen(FixedLocationProvider::denied(), &places);
        assert!(screen.map.has_layer(MARKER_LAYER));
        assert!(
            !screen
                .map
                .layer::<TileLayer>(TRAFFIC_LAYER)
                .unwrap()
                .enabled
        );
    }

    #[test]
    fn denied_permission_stays_at_fallback() {
        let places = MockPlaces::default();
        let mut screen = screen(FixedLocationProvider::denied(), &places);
        refresh(&mut screen);

        assert!(screen.state().location.is_none());
        assert!(screen.current_alert().is_none());
        assert_eq!(screen.map().center, FALLBACK_CENTER);
        assert!(marker_ids(&screen).is_empty());
    }

    #[test]
    fn granted_permission_centers_on_location() {
        let places = MockPlaces::default();
        let mut screen = screen(
            FixedLocationProvider::granted(Coordinate::new(40.0, -74.0)),
            &places,
        );
        refresh(&mut screen);

        assert_eq!(screen.state().location, Some(Coordinate::new(40.0, -74.0)));
        assert_eq!(screen.map().center, Coordinate::new(40.0, -74.0));
        assert_eq!(marker_ids(&screen), vec![MY_LOCATION_MARKER_ID.to_string()]);
    }

    #[test]
    fn position_failure_shows_alert() {
        let places = MockPlaces::default();
        let mut screen = screen(FixedLocationProvider::failing("no fix"), &places);
        refresh(&mut screen);

        assert!(screen.state().location.is_none());
        assert!(matches!(
            screen.current_alert(),
            Some(Alert::LocationUnavailable(_))
        ));
        screen.dismiss_alert();
        assert!(screen.current_alert().is_none());
    }

    #[test]
    fn traffic_toggle_drives_overlay() {
        let places = MockPlaces::default();
        let mut screen = screen(FixedLocationProvider::denied(), &places);
        settle(&mut screen);

        screen.dispatch(Event::TrafficToggled);
        refresh(&mut screen);
        assert!(screen.map.layer::<TileLayer>(TRAFFIC_LAYER).unwrap().enabled);

        screen.dispatch(Event::TrafficToggled);
        refresh(&mut screen);
        assert!(!screen.map.layer::<TileLayer>(TRAFFIC_LAYER).unwrap().enabled);
        assert_eq!(places.calls(), 0);
    }

    #[test]
    fn restaurants_without_location_never_call_service() {
        let places = MockPlaces::default();
        let mut screen = screen(FixedLocationProvider::denied(), &places);
        settle(&mut screen);

        screen.dispatch(Event::RestaurantsToggled);
        refresh(&mut screen);

        assert_eq!(places.calls(), 0);
        assert_eq!(screen.current_alert(), Some(&Alert::MissingLocation));
        assert!(screen.state().show_restaurants);
    }

    #[test]
    fn restaurants_lookup_shows_markers() {
        let places = MockPlaces::default();
        places.respond(Ok(vec![cafe()]));
        let mut screen = screen(
            FixedLocationProvider::granted(Coordinate::new(40.0, -74.0)),
            &places,
        );
        settle(&mut screen);

        screen.dispatch(Event::RestaurantsToggled);
        refresh(&mut screen);

        assert_eq!(places.calls(), 1);
        assert_eq!(
            places.queries.lock().unwrap()[0],
            NearbyQuery::restaurants(Coordinate::new(40.0, -74.0))
        );
        assert_eq!(screen.state().places, vec![cafe()]);
        assert_eq!(
            marker_ids(&screen),
            vec![MY_LOCATION_MARKER_ID.to_string(), "p1".to_string()]
        );

        // Hiding keeps the data but drops the markers.
        screen.dispatch(Event::RestaurantsToggled);
        refresh(&mut screen);
        assert_eq!(screen.state().places, vec![cafe()]);
        assert_eq!(marker_ids(&screen), vec![MY_LOCATION_MARKER_ID.to_string()]);
    }

    #[test]
    fn reshowing_restaurants_calls_service_again() {
        let places = MockPlaces::default();
        places.respond(Ok(vec![cafe()]));
        places.respond(Ok(vec![cafe()]));
        let mut screen = screen(
            FixedLocationProvider::granted(Coordinate::new(40.0, -74.0)),
            &places,
        );
        settle(&mut screen);

        screen.dispatch(Event::RestaurantsToggled);
        settle(&mut screen);
        assert_eq!(places.calls(), 1);

        screen.dispatch(Event::RestaurantsToggled);
        screen.dispatch(Event::RestaurantsToggled);
        settle(&mut screen);
        assert_eq!(places.calls(), 2);
        assert_eq!(screen.state().places, vec![cafe()]);
    }

    #[test]
    fn empty_lookup_keeps_previous_places() {
        let places = MockPlaces::default();
        places.respond(Ok(vec![cafe()]));
        places.respond(Ok(Vec::new()));
        let mut screen = screen(
            FixedLocationProvider::granted(Coordinate::new(40.0, -74.0)),
            &places,
        );
        settle(&mut screen);

        screen.dispatch(Event::RestaurantsToggled);
        settle(&mut screen);
        screen.dispatch(Event::RestaurantsToggled);
        screen.dispatch(Event::RestaurantsToggled);
        settle(&mut screen);

        assert_eq!(screen.state().places, vec![cafe()]);
        assert_eq!(screen.current_alert(), Some(&Alert::NoResults));
    }

    #[test]
    fn failed_lookup_shows_generic_alert() {
        let places = MockPlaces::default();
        places.respond(Err(PlacesError::Http("503 Service Unavailable".to_string())));
        let mut screen = screen(
            FixedLocationProvider::granted(Coordinate::new(40.0, -74.0)),
            &places,
        );
        settle(&mut screen);

        screen.dispatch(Event::RestaurantsToggled);
        settle(&mut screen);

        assert!(screen.state().places.is_empty());
        assert_eq!(screen.current_alert(), Some(&Alert::LookupFailed));
    }

    #[test]
    fn panned_map_is_not_recentered_without_region_change() {
        let places = MockPlaces::default();
        let mut screen = screen(
            FixedLocationProvider::granted(Coordinate::new(40.0, -74.0)),
            &places,
        );
        refresh(&mut screen);

        screen.map.center = Coordinate::new(41.0, -73.0);
        screen.dispatch(Event::TrafficToggled);
        refresh(&mut screen);
        assert_eq!(screen.map().center, Coordinate::new(41.0, -73.0));
    }

    #[test]
    fn control_events_request_repaint() {
        let places = MockPlaces::default();
        let mut screen = screen(FixedLocationProvider::denied(), &places);
        settle(&mut screen);

        let ctx = egui::Context::default();
        for _ in 0..5 {
            if !ctx.has_requested_repaint() {
                break;
            }
            let _ = ctx.run(egui::RawInput::default(), |_| {});
        }
        assert!(!ctx.has_requested_repaint());

        screen.handle_control_events(&ctx, Vec::new());
        assert!(!ctx.has_requested_repaint());

        screen.handle_control_events(&ctx, vec![Event::TrafficToggled]);
        assert!(ctx.has_requested_repaint());
        assert!(screen.state().show_traffic);
    }
}

