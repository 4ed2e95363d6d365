//! Nearby places lookup.
//!
//! The lookup is a single request/response exchange: no retries, no caching. Responses are
//! mapped entry by entry, so one malformed place does not discard the others.

use log::{debug, warn};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::CLIENT;
use crate::projection::Coordinate;

/// A point of interest returned by a lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaceOfInterest {
    /// The service's place identifier, unique within one response.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Short address, as given by the service.
    pub address: String,

    /// Where the place is.
    pub location: Coordinate,
}

/// What to look up.
#[derive(Clone, Debug, PartialEq)]
pub struct NearbyQuery {
    /// Center of the search.
    pub location: Coordinate,

    /// Search radius in meters.
    pub radius: u32,

    /// Place category, e.g. `restaurant`.
    pub category: String,
}

impl NearbyQuery {
    /// Restaurants within 500 meters of `location`.
    pub fn restaurants(location: Coordinate) -> Self {
        Self {
            location,
            radius: 500,
            category: "restaurant".to_string(),
        }
    }
}

/// Errors that can occur while looking up places.
#[derive(Error, Debug)]
pub enum PlacesError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    Connection(#[from] reqwest::Error),

    /// The service answered with a non-success HTTP status.
    #[error("Places lookup failed. HTTP Status: `{0}`")]
    Http(String),

    /// The response body was not the expected JSON document.
    #[error("Unable to parse places lookup response")]
    Parse(#[from] serde_json::Error),

    /// The service answered, but reported an error status in the body.
    #[error("Places service returned `{status}`: {}", .message.as_deref().unwrap_or("no details"))]
    Service {
        /// The status reported by the service.
        status: String,
        /// Optional explanation from the service.
        message: Option<String>,
    },

    /// The configured base URL cannot be used to build a request.
    #[error("Invalid places service URL `{0}`")]
    InvalidUrl(String),
}

/// A service that finds places near a coordinate.
pub trait PlacesService: Send + Sync {
    /// Looks up places matching `query`, in the order the service ranks them.
    fn nearby(&self, query: &NearbyQuery) -> Result<Vec<PlaceOfInterest>, PlacesError>;
}

/// The body of a nearby search response.
#[derive(Debug, Default, Deserialize)]
pub struct NearbySearchResponse {
    /// Raw result entries, decoded one at a time by `into_places`.
    #[serde(default)]
    pub results: Vec<serde_json::Value>,

    /// Request status, e.g. `OK` or `ZERO_RESULTS`.
    #[serde(default)]
    pub status: Option<String>,

    /// Explanation accompanying an error status.
    #[serde(default)]
    pub error_message: Option<String>,
}

/// One result entry as the service sends it. Every field is optional so that a malformed entry
/// can be reported and skipped rather than failing the whole response.
#[derive(Debug, Deserialize)]
struct RawPlace {
    place_id: Option<String>,
    name: Option<String>,
    vicinity: Option<String>,
    geometry: Option<RawGeometry>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    location: Option<RawLatLng>,
}

#[derive(Debug, Deserialize)]
struct RawLatLng {
    lat: f64,
    lng: f64,
}

impl RawPlace {
    fn into_place(self) -> Option<PlaceOfInterest> {
        let location = self.geometry?.location?;
        Some(PlaceOfInterest {
            id: self.place_id?,
            name: self.name?,
            address: self.vicinity.unwrap_or_default(),
            location: Coordinate::new(location.lat, location.lng),
        })
    }
}

impl NearbySearchResponse {
    /// Parses a response body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PlacesError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Fails on error statuses reported in the body. `OK`, `ZERO_RESULTS` and a missing status
    /// are successes.
    pub fn check_status(&self) -> Result<(), PlacesError> {
        match self.status.as_deref() {
            None | Some("OK") | Some("ZERO_RESULTS") => Ok(()),
            Some(status) => Err(PlacesError::Service {
                status: status.to_string(),
                message: self.error_message.clone(),
            }),
        }
    }

    /// Maps the result entries into places, in order. Entries without an id, a name or a
    /// location are logged and skipped.
    pub fn into_places(self) -> Vec<PlaceOfInterest> {
        self.results
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| {
                let place = serde_json::from_value::<RawPlace>(value)
                    .ok()
                    .and_then(RawPlace::into_place);
                if place.is_none() {
                    warn!("Skipping malformed place at index {index}");
                }
                place
            })
            .collect()
    }
}

/// Connection settings for the Google Places API.
#[derive(Clone, Debug, PartialEq)]
pub struct GooglePlacesConfig {
    /// Base URL of the Places API, without a trailing slash.
    pub base_url: String,

    /// The API key sent with every request.
    pub api_key: String,
}

impl Default for GooglePlacesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com/maps/api/place".to_string(),
            api_key: "your-key-here".to_string(),
        }
    }
}

impl GooglePlacesConfig {
    /// Creates a new `GooglePlacesConfig` with the given API key.
    pub fn new(api_key: String) -> Self {
        let mut config = Self::default();
        config.api_key = api_key;
        config
    }
}

/// `PlacesService` backed by the Google Places nearby search.
///
/// # Example
///
/// ```no_run
/// use egui_map_screen::places::{GooglePlacesClient, GooglePlacesConfig, NearbyQuery, PlacesService};
/// use egui_map_screen::projection::Coordinate;
///
/// let client = GooglePlacesClient::new(GooglePlacesConfig::new("my-api-key".to_string()));
/// let places = client.nearby(&NearbyQuery::restaurants(Coordinate::new(40.0, -74.0)));
/// ```
pub struct GooglePlacesClient {
    config: GooglePlacesConfig,
}

impl GooglePlacesClient {
    /// Creates a new client.
    pub fn new(config: GooglePlacesConfig) -> Self {
        Self { config }
    }

    /// Builds the nearby search URL for `query`.
    pub fn request_url(&self, query: &NearbyQuery) -> Result<Url, PlacesError> {
        let endpoint = format!("{}/nearbysearch/json", self.config.base_url);
        let location = format!("{},{}", query.location.latitude, query.location.longitude);
        let radius = query.radius.to_string();
        Url::parse_with_params(
            &endpoint,
            [
                ("location", location.as_str()),
                ("radius", radius.as_str()),
                ("type", query.category.as_str()),
                ("key", self.config.api_key.as_str()),
            ],
        )
        .map_err(|_| PlacesError::InvalidUrl(endpoint))
    }
}

impl PlacesService for GooglePlacesClient {
    fn nearby(&self, query: &NearbyQuery) -> Result<Vec<PlaceOfInterest>, PlacesError> {
        let url = self.request_url(query)?;
        debug!(
            "Looking up {} within {} m of {},{}",
            query.category, query.radius, query.location.latitude, query.location.longitude
        );

        let response = CLIENT.get(url).send()?;
        if !response.status().is_success() {
            return Err(PlacesError::Http(response.status().to_string()));
        }

        let body = NearbySearchResponse::from_slice(&response.bytes()?)?;
        body.check_status()?;
        Ok(body.into_places())
    }
}
