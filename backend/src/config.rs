use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::deviation::DEFAULT_THRESHOLD_KM;

pub const DEFAULT_API_BASE: &str = "https://api.mapbox.com";
pub const DEFAULT_PROFILE: &str = "driving";
pub const DEFAULT_WAYPOINT_COUNT: usize = 3;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_GEOCODE_TTL_SECS: u64 = 4 * 60 * 60;
pub const DEFAULT_GEOCODE_CACHE_CAPACITY: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct MapboxConfig {
    pub access_token: String,
    pub api_base: String,
    pub profile: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct NavigationConfig {
    pub mapbox: MapboxConfig,
    pub waypoint_count: usize,
    pub deviation_threshold_km: f64,
    pub stations_path: Option<PathBuf>,
    pub geocode_ttl: Duration,
    pub geocode_cache_capacity: usize,
}

impl NavigationConfig {
    /// Read configuration from the process environment.
    ///
    /// `MAPBOX_ACCESS_TOKEN` is required; everything else falls back to a
    /// default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let access_token = lookup("MAPBOX_ACCESS_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing("MAPBOX_ACCESS_TOKEN"))?;

        let deviation_threshold_km: f64 =
            parse_or(&lookup, "CHARGEWAY_DEVIATION_KM", DEFAULT_THRESHOLD_KM)?;
        if !deviation_threshold_km.is_finite() || deviation_threshold_km < 0.0 {
            return Err(ConfigError::Invalid {
                name: "CHARGEWAY_DEVIATION_KM",
                value: deviation_threshold_km.to_string(),
            });
        }

        let geocode_cache_capacity = parse_or(
            &lookup,
            "CHARGEWAY_GEOCODE_CACHE_SIZE",
            DEFAULT_GEOCODE_CACHE_CAPACITY,
        )?;
        if geocode_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "CHARGEWAY_GEOCODE_CACHE_SIZE",
                value: "0".into(),
            });
        }

        Ok(Self {
            mapbox: MapboxConfig {
                access_token,
                api_base: lookup("MAPBOX_API_BASE")
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                profile: lookup("MAPBOX_PROFILE").unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
                timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "CHARGEWAY_HTTP_TIMEOUT_SECS",
                    DEFAULT_HTTP_TIMEOUT_SECS,
                )?),
            },
            waypoint_count: parse_or(&lookup, "CHARGEWAY_WAYPOINTS", DEFAULT_WAYPOINT_COUNT)?,
            deviation_threshold_km,
            stations_path: lookup("CHARGEWAY_STATIONS").map(PathBuf::from),
            geocode_ttl: Duration::from_secs(parse_or(
                &lookup,
                "CHARGEWAY_GEOCODE_TTL_SECS",
                DEFAULT_GEOCODE_TTL_SECS,
            )?),
            geocode_cache_capacity,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}
