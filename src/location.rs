//! Where the device is.
//!
//! A `LocationProvider` answers two questions: may the application read the location, and where
//! is the device right now. Both calls block; the map screen runs them on background threads.

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::CLIENT;
use crate::projection::Coordinate;

/// The user's answer to a foreground location permission request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionStatus {
    /// The location may be read.
    Granted,

    /// The location may not be read.
    Denied,
}

/// Errors that can occur while reading the current position.
#[derive(Error, Debug)]
pub enum LocationError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    Connection(#[from] reqwest::Error),

    /// The location service answered, but without a usable position.
    #[error("Location service could not determine a position: {0}")]
    Unavailable(String),
}

/// Source of the device location.
pub trait LocationProvider: Send + Sync {
    /// Asks for permission to read the location while the application is in the foreground.
    fn request_foreground_permission(&self) -> PermissionStatus;

    /// Reads the current position once.
    fn current_position(&self) -> Result<Coordinate, LocationError>;
}

/// A provider that always answers the same way. Useful for tests, demos, and for machines
/// whose location is configured rather than measured.
///
/// # Example
///
/// ```
/// use egui_map_screen::location::{FixedLocationProvider, LocationProvider, PermissionStatus};
/// use egui_map_screen::projection::Coordinate;
///
/// let provider = FixedLocationProvider::granted(Coordinate::new(40.0, -74.0));
/// assert_eq!(provider.request_foreground_permission(), PermissionStatus::Granted);
/// assert_eq!(provider.current_position().unwrap(), Coordinate::new(40.0, -74.0));
/// ```
#[derive(Clone, Debug)]
pub struct FixedLocationProvider {
    permission: PermissionStatus,
    position: Result<Coordinate, String>,
}

impl FixedLocationProvider {
    /// Grants permission and reports `position`.
    pub fn granted(position: Coordinate) -> Self {
        Self {
            permission: PermissionStatus::Granted,
            position: Ok(position),
        }
    }

    /// Denies permission.
    pub fn denied() -> Self {
        Self {
            permission: PermissionStatus::Denied,
            position: Err("permission denied".to_string()),
        }
    }

    /// Grants permission, but every position reading fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            permission: PermissionStatus::Granted,
            position: Err(reason.into()),
        }
    }
}

impl LocationProvider for FixedLocationProvider {
    fn request_foreground_permission(&self) -> PermissionStatus {
        self.permission
    }

    fn current_position(&self) -> Result<Coordinate, LocationError> {
        self.position.clone().map_err(LocationError::Unavailable)
    }
}

/// Approximates the device location from its public IP address.
///
/// Desktops rarely have a positioning device, so the permission request is answered by the
/// `consent` flag given at construction.
pub struct IpLocationProvider {
    url: String,
    consent: bool,
}

impl Default for IpLocationProvider {
    fn default() -> Self {
        Self {
            url: "https://ipapi.co/json/".to_string(),
            consent: true,
        }
    }
}

impl IpLocationProvider {
    /// Creates a provider querying `url`, which must answer with a JSON object carrying
    /// `latitude` and `longitude`.
    pub fn new(url: impl Into<String>, consent: bool) -> Self {
        Self {
            url: url.into(),
            consent,
        }
    }
}

/// The subset of an IP geolocation answer we read.
#[derive(Debug, Deserialize)]
struct IpLocationResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

impl IpLocationResponse {
    fn into_coordinate(self) -> Result<Coordinate, LocationError> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Coordinate::new(latitude, longitude)),
            _ => Err(LocationError::Unavailable(
                self.reason
                    .unwrap_or_else(|| "no coordinates in response".to_string()),
            )),
        }
    }
}

impl LocationProvider for IpLocationProvider {
    fn request_foreground_permission(&self) -> PermissionStatus {
        if self.consent {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    fn current_position(&self) -> Result<Coordinate, LocationError> {
        debug!("Requesting IP location from {}", self.url);
        let response = CLIENT.get(&self.url).send()?;
        if !response.status().is_success() {
            return Err(LocationError::Unavailable(format!(
                "HTTP Status: `{}`",
                response.status()
            )));
        }
        let bytes = response.bytes()?;
        let body: IpLocationResponse = serde_json::from_slice(&bytes)
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;
        body.into_coordinate()
    }
}
