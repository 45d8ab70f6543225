pub mod config;
pub mod deviation;
pub mod error;
pub mod geocode_cache;
pub mod mapbox;
pub mod models;
pub mod position;
pub mod providers;
pub mod routing;
pub mod session;
pub mod stations;
pub mod waypoints;

#[cfg(test)]
mod test_support;

use std::{num::NonZeroUsize, sync::Arc};

use crate::config::NavigationConfig;
use crate::deviation::DeviationMonitor;
use crate::error::NavError;
use crate::geocode_cache::CachedGeocoder;
use crate::mapbox::MapboxClient;
use crate::providers::{DynDirections, DynGeocoder};
use crate::session::{NavigationSession, SessionSettings};
use crate::stations::StationCatalog;

pub use crate::deviation::evaluate;
pub use crate::waypoints::select_waypoints;

/// Wire a session to Mapbox using `config`, with a cached geocoder and the
/// configured (or built-in) station catalog.
pub fn create_session(config: &NavigationConfig) -> Result<NavigationSession, NavError> {
    let catalog = match &config.stations_path {
        Some(path) => {
            let catalog = StationCatalog::from_file(path)?;
            tracing::info!("loaded {} stations from {}", catalog.len(), path.display());
            catalog
        }
        None => StationCatalog::nairobi(),
    };

    let capacity = NonZeroUsize::new(config.geocode_cache_capacity)
        .ok_or_else(|| NavError::invalid_input("geocode cache capacity must be positive"))?;
    let client = MapboxClient::new(config.mapbox.clone())?;
    let geocoder: DynGeocoder = Arc::new(CachedGeocoder::new(
        client.clone(),
        capacity,
        config.geocode_ttl,
    ));
    let directions: DynDirections = Arc::new(client);

    let settings = SessionSettings {
        waypoint_count: config.waypoint_count,
        monitor: DeviationMonitor::new(config.deviation_threshold_km)?,
    };
    tracing::debug!(
        "session settings: {} waypoint(s), {} km deviation threshold, {} station(s)",
        settings.waypoint_count,
        settings.monitor.threshold_km(),
        catalog.len()
    );

    Ok(NavigationSession::new(catalog, geocoder, directions, settings))
}
