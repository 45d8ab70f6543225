use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::NavError,
    models::{Coordinate, Route, RouteQuery},
};

/// Resolves free-text addresses to a single best-match coordinate.
///
/// Implementations return `NavError::AddressNotFound` when the provider has
/// no candidate for the text.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Coordinate, NavError>;
}

/// Computes a driveable route through `start`, the ordered waypoints, then
/// `destination`.
///
/// Implementations return `NavError::NoRouteFound` when the provider finds
/// no route.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    async fn route(&self, query: &RouteQuery) -> Result<Route, NavError>;
}

pub type DynGeocoder = Arc<dyn Geocoder>;
pub type DynDirections = Arc<dyn DirectionsProvider>;

/// A place the user wants to start from or drive to.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Address(String),
    Coordinate(Coordinate),
}

impl Location {
    /// Parses `"lon,lat"` as a coordinate and treats anything else as an
    /// address.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if let Some((lon, lat)) = trimmed.split_once(',') {
            if let (Ok(lon), Ok(lat)) = (lon.trim().parse::<f64>(), lat.trim().parse::<f64>()) {
                return Self::Coordinate(Coordinate::from_lon_lat(lon, lat));
            }
        }
        Self::Address(trimmed.to_string())
    }

    pub async fn resolve(&self, geocoder: &dyn Geocoder) -> Result<Coordinate, NavError> {
        let coord = match self {
            Self::Coordinate(coord) => *coord,
            Self::Address(address) if address.trim().is_empty() => {
                return Err(NavError::invalid_input("address must not be empty"));
            }
            Self::Address(address) => geocoder.geocode(address).await?,
        };
        if !coord.is_finite() {
            return Err(NavError::invalid_input(format!(
                "location resolved to a non-finite coordinate: {coord:?}"
            )));
        }
        Ok(coord)
    }
}
