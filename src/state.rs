//! View state of the map screen.
//!
//! `ViewState::reduce` is a pure transition function: it takes the current state and an event,
//! and returns the next state together with the side effects the screen must run. The screen
//! runs the effects and feeds their outcomes back as new events.

use egui::Color32;
use log::{error, info, warn};

use crate::config::ScreenConfig;
use crate::layers::marker::Marker;
use crate::location::{LocationError, PermissionStatus};
use crate::places::{NearbyQuery, PlaceOfInterest, PlacesError};
use crate::projection::{Coordinate, MapRegion};

/// Id of the marker showing the device location.
pub const MY_LOCATION_MARKER_ID: &str = "my-location";

/// Pin color of the device location marker.
pub const MY_LOCATION_COLOR: Color32 = Color32::from_rgb(30, 110, 230);

/// Pin color of restaurant markers.
pub const RESTAURANT_COLOR: Color32 = Color32::from_rgb(240, 130, 20);

/// Everything the screen shows, owned by the screen and replaced on every transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewState {
    /// The last known device location.
    pub location: Option<Coordinate>,

    /// Whether the traffic overlay is shown.
    pub show_traffic: bool,

    /// Whether restaurant markers are shown.
    pub show_restaurants: bool,

    /// Result of the last successful lookup.
    pub places: Vec<PlaceOfInterest>,
}

/// Something that happened to the screen.
#[derive(Debug)]
pub enum Event {
    /// The foreground location permission request was answered.
    PermissionResolved(PermissionStatus),

    /// The position reading finished.
    PositionResolved(Result<Coordinate, LocationError>),

    /// The traffic control was pressed.
    TrafficToggled,

    /// The restaurants control was pressed.
    RestaurantsToggled,

    /// A places lookup finished.
    LookupResolved(Result<Vec<PlaceOfInterest>, PlacesError>),
}

/// Work the screen has to start as the result of a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Ask for the foreground location permission.
    RequestPermission,

    /// Read the current position once.
    RequestPosition,

    /// Run a places lookup.
    LookupPlaces(NearbyQuery),

    /// Tell the user something went wrong.
    Alert(Alert),
}

/// A user-visible notification. All of them block the screen until dismissed.
#[derive(Clone, Debug, PartialEq)]
pub enum Alert {
    /// The position could not be read.
    LocationUnavailable(String),

    /// Restaurants were requested before the location was known.
    MissingLocation,

    /// The lookup found nothing.
    NoResults,

    /// The lookup failed.
    LookupFailed,
}

impl Alert {
    /// The window title of the alert.
    pub fn title(&self) -> &'static str {
        match self {
            Alert::LocationUnavailable(_) => "Location unavailable",
            Alert::MissingLocation => "Location unknown",
            Alert::NoResults => "No results",
            Alert::LookupFailed => "Error",
        }
    }

    /// The text of the alert.
    pub fn message(&self) -> String {
        match self {
            Alert::LocationUnavailable(reason) => {
                format!("Could not get your current location: {reason}")
            }
            Alert::MissingLocation => {
                "Your location is not known yet, so nearby restaurants cannot be searched."
                    .to_string()
            }
            Alert::NoResults => "No restaurants were found nearby.".to_string(),
            Alert::LookupFailed => "Something went wrong while searching for restaurants.".to_string(),
        }
    }
}

/// What the map renderer is asked to draw.
#[derive(Clone, Debug, PartialEq)]
pub struct MapScene {
    /// The viewport.
    pub region: MapRegion,

    /// Whether the traffic overlay is drawn.
    pub shows_traffic: bool,

    /// The markers, in drawing order.
    pub markers: Vec<Marker>,
}

impl ViewState {
    /// The effects to run when the screen is first shown.
    pub fn on_mount() -> Vec<Effect> {
        vec![Effect::RequestPermission]
    }

    /// Computes the state following `event`, and the effects to run.
    pub fn reduce(&self, event: Event, config: &ScreenConfig) -> (ViewState, Vec<Effect>) {
        let mut next = self.clone();
        let mut effects = Vec::new();

        match event {
            Event::PermissionResolved(PermissionStatus::Granted) => {
                effects.push(Effect::RequestPosition);
            }
            Event::PermissionResolved(PermissionStatus::Denied) => {
                warn!("Location permission denied");
            }
            Event::PositionResolved(Ok(coordinate)) => {
                info!(
                    "Location acquired at {},{}",
                    coordinate.latitude, coordinate.longitude
                );
                next.location = Some(coordinate);
            }
            Event::PositionResolved(Err(e)) => {
                error!("{e}");
                effects.push(Effect::Alert(Alert::LocationUnavailable(e.to_string())));
            }
            Event::TrafficToggled => {
                next.show_traffic = !self.show_traffic;
            }
            Event::RestaurantsToggled => {
                if !self.show_restaurants {
                    // Looked up on every show, as the device may have moved since the last one.
                    effects.push(match self.location {
                        Some(location) => Effect::LookupPlaces(NearbyQuery {
                            location,
                            radius: config.search_radius,
                            category: config.search_category.clone(),
                        }),
                        None => Effect::Alert(Alert::MissingLocation),
                    });
                }
                next.show_restaurants = !self.show_restaurants;
            }
            Event::LookupResolved(Ok(places)) if places.is_empty() => {
                info!("Places lookup returned no results");
                effects.push(Effect::Alert(Alert::NoResults));
            }
            Event::LookupResolved(Ok(places)) => {
                info!("Places lookup returned {} results", places.len());
                next.places = places;
            }
            Event::LookupResolved(Err(e)) => {
                error!("{:?}", eyre::Report::new(e));
                effects.push(Effect::Alert(Alert::LookupFailed));
            }
        }

        (next, effects)
    }

    /// The region the map is centered on.
    pub fn region(&self, config: &ScreenConfig) -> MapRegion {
        MapRegion {
            center: self.location.unwrap_or(config.fallback_center),
            latitude_delta: config.latitude_delta,
            longitude_delta: config.longitude_delta,
        }
    }

    /// Describes what the map should draw for this state.
    pub fn scene(&self, config: &ScreenConfig) -> MapScene {
        let mut markers = Vec::new();

        if let Some(location) = self.location {
            markers.push(
                Marker::new(MY_LOCATION_MARKER_ID, location, "My location")
                    .with_color(MY_LOCATION_COLOR),
            );
        }

        if self.show_restaurants {
            markers.extend(self.places.iter().map(|place| {
                Marker::new(place.id.clone(), place.location, place.name.clone())
                    .with_description(place.address.clone())
                    .with_color(RESTAURANT_COLOR)
            }));
        }

        MapScene {
            region: self.region(config),
            shows_traffic: self.show_traffic,
            markers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScreenConfig {
        ScreenConfig::default()
    }

    fn cafe() -> PlaceOfInterest {
        PlaceOfInterest {
            id: "p1".to_string(),
            name: "Cafe A".to_string(),
            address: "1 Main St".to_string(),
            location: Coordinate::new(1.0, 2.0),
        }
    }

    fn located() -> ViewState {
        ViewState {
            location: Some(Coordinate::new(40.0, -74.0)),
            ..Default::default()
        }
    }

    fn lookup_count(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::LookupPlaces(_)))
            .count()
    }

    #[test]
    fn default_state() {
        let state = ViewState::default();
        assert!(state.location.is_none());
        assert!(!state.show_traffic);
        assert!(!state.show_restaurants);
        assert!(state.places.is_empty());
        assert_eq!(ViewState::on_mount(), vec![Effect::RequestPermission]);
    }

    #[test]
    fn permission_denied_keeps_fallback() {
        let (state, effects) = ViewState::default().reduce(
            Event::PermissionResolved(PermissionStatus::Denied),
            &config(),
        );
        assert!(effects.is_empty());
        assert!(state.location.is_none());

        let scene = state.scene(&config());
        assert_eq!(scene.region.center, Coordinate::new(37.78825, -122.4324));
        assert!(scene.markers.is_empty());
    }

    #[test]
    fn permission_granted_requests_position() {
        let (state, effects) = ViewState::default().reduce(
            Event::PermissionResolved(PermissionStatus::Granted),
            &config(),
        );
        assert_eq!(effects, vec![Effect::RequestPosition]);
        assert_eq!(state, ViewState::default());
    }

    #[test]
    fn position_fix_centers_and_marks() {
        let (state, effects) = ViewState::default().reduce(
            Event::PositionResolved(Ok(Coordinate::new(40.0, -74.0))),
            &config(),
        );
        assert!(effects.is_empty());

        let scene = state.scene(&config());
        assert_eq!(scene.region.center, Coordinate::new(40.0, -74.0));
        assert_eq!(scene.region.latitude_delta, 0.0922);
        assert_eq!(scene.region.longitude_delta, 0.0421);
        assert_eq!(scene.markers.len(), 1);
        assert_eq!(scene.markers[0].id, MY_LOCATION_MARKER_ID);
        assert_eq!(scene.markers[0].coordinate, Coordinate::new(40.0, -74.0));
        assert_eq!(scene.markers[0].title, "My location");
    }

    #[test]
    fn position_failure_alerts() {
        let (state, effects) = ViewState::default().reduce(
            Event::PositionResolved(Err(LocationError::Unavailable("timeout".to_string()))),
            &config(),
        );
        assert!(state.location.is_none());
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            &effects[0],
            Effect::Alert(Alert::LocationUnavailable(reason)) if reason.contains("timeout")
        ));
    }

    #[test]
    fn traffic_toggle_twice_is_identity() {
        let mut start = located();
        start.show_restaurants = true;
        start.places = vec![cafe()];
        let markers_before = start.scene(&config()).markers;

        let (once, effects) = start.reduce(Event::TrafficToggled, &config());
        assert!(effects.is_empty());
        assert!(once.show_traffic);
        assert!(once.scene(&config()).shows_traffic);
        assert_eq!(once.scene(&config()).markers, markers_before);

        let (twice, effects) = once.reduce(Event::TrafficToggled, &config());
        assert!(effects.is_empty());
        assert_eq!(twice, start);
        assert_eq!(twice.scene(&config()).markers, markers_before);
    }

    #[test]
    fn restaurants_without_location_alerts_and_skips_lookup() {
        let (state, effects) = ViewState::default().reduce(Event::RestaurantsToggled, &config());
        assert_eq!(effects, vec![Effect::Alert(Alert::MissingLocation)]);
        assert_eq!(lookup_count(&effects), 0);
        // The flag flips regardless of the lookup.
        assert!(state.show_restaurants);
    }

    #[test]
    fn restaurants_shown_looks_up_around_location() {
        let (state, effects) = located().reduce(Event::RestaurantsToggled, &config());
        assert!(state.show_restaurants);
        assert_eq!(
            effects,
            vec![Effect::LookupPlaces(NearbyQuery {
                location: Coordinate::new(40.0, -74.0),
                radius: 500,
                category: "restaurant".to_string(),
            })]
        );
    }

    #[test]
    fn restaurants_hidden_keeps_places() {
        let mut start = located();
        start.show_restaurants = true;
        start.places = vec![cafe()];

        let (state, effects) = start.reduce(Event::RestaurantsToggled, &config());
        assert!(effects.is_empty());
        assert!(!state.show_restaurants);
        assert_eq!(state.places, vec![cafe()]);
        // Only the location marker is left.
        assert_eq!(state.scene(&config()).markers.len(), 1);
    }

    #[test]
    fn reshowing_restaurants_looks_up_again() {
        let mut start = located();
        start.show_restaurants = true;
        start.places = vec![cafe()];

        let (hidden, effects) = start.reduce(Event::RestaurantsToggled, &config());
        assert_eq!(lookup_count(&effects), 0);
        let (shown, effects) = hidden.reduce(Event::RestaurantsToggled, &config());
        assert_eq!(lookup_count(&effects), 1);
        assert_eq!(shown.places, vec![cafe()]);
    }

    #[test]
    fn lookup_result_replaces_places() {
        let mut start = located();
        start.show_restaurants = true;
        start.places = vec![PlaceOfInterest {
            id: "old".to_string(),
            ..cafe()
        }];

        let (state, effects) = start.reduce(Event::LookupResolved(Ok(vec![cafe()])), &config());
        assert!(effects.is_empty());
        assert_eq!(state.places, vec![cafe()]);

        let scene = state.scene(&config());
        assert_eq!(scene.markers.len(), 2);
        let restaurant = &scene.markers[1];
        assert_eq!(restaurant.id, "p1");
        assert_eq!(restaurant.title, "Cafe A");
        assert_eq!(restaurant.description.as_deref(), Some("1 Main St"));
        assert_eq!(restaurant.coordinate, Coordinate::new(1.0, 2.0));
        assert_eq!(restaurant.color, Some(RESTAURANT_COLOR));
    }

    #[test]
    fn empty_lookup_alerts_and_keeps_places() {
        let mut start = located();
        start.show_restaurants = true;
        start.places = vec![cafe()];

        let (state, effects) = start.reduce(Event::LookupResolved(Ok(Vec::new())), &config());
        assert_eq!(effects, vec![Effect::Alert(Alert::NoResults)]);
        assert_eq!(state, start);
    }

    #[test]
    fn failed_lookup_alerts_and_keeps_places() {
        let mut start = located();
        start.places = vec![cafe()];

        let (state, effects) = start.reduce(
            Event::LookupResolved(Err(PlacesError::Http("500 Internal Server Error".to_string()))),
            &config(),
        );
        assert_eq!(effects, vec![Effect::Alert(Alert::LookupFailed)]);
        assert_eq!(state, start);
    }

    #[test]
    fn hidden_restaurants_are_not_drawn() {
        let mut state = located();
        state.places = vec![cafe()];
        let scene = state.scene(&config());
        assert!(scene.markers.iter().all(|m| m.id == MY_LOCATION_MARKER_ID));
    }

    #[test]
    fn alert_texts() {
        assert_eq!(Alert::NoResults.title(), "No results");
        assert!(
            Alert::LocationUnavailable("timeout".to_string())
                .message()
                .ends_with("timeout")
        );
        assert!(!Alert::LookupFailed.message().is_empty());
    }
}
