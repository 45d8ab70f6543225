use serde::{Deserialize, Serialize};

/// Geographic position in degrees. GeoJSON payloads carry it as `[lon, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn from_lon_lat(lon: f64, lat: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([lon, lat]: [f64; 2]) -> Self {
        Self { lat, lon }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(coord: Coordinate) -> Self {
        [coord.lon, coord.lat]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub name: String,
    pub coordinate: Coordinate,
}

impl PointOfInterest {
    pub fn new(name: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            name: name.into(),
            coordinate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    #[serde(default)]
    pub distance_m: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub steps: Vec<RouteStep>,
}

/// A driveable polyline returned by a directions provider.
///
/// Only `geometry` takes part in deviation checks; legs and steps are carried
/// through for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub geometry: Vec<Coordinate>,
    #[serde(default)]
    pub legs: Vec<RouteLeg>,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub duration_s: f64,
}

impl Route {
    pub fn from_geometry(geometry: Vec<Coordinate>) -> Self {
        Self {
            geometry,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
    }

    /// Turn-by-turn text in driving order across all legs.
    pub fn instructions(&self) -> impl Iterator<Item = &str> {
        self.legs
            .iter()
            .flat_map(|leg| leg.steps.iter())
            .map(|step| step.instruction.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteQuery {
    pub start: Coordinate,
    #[serde(default)]
    pub waypoints: Vec<Coordinate>,
    pub destination: Coordinate,
}

impl RouteQuery {
    /// Start, waypoints and destination in request order.
    pub fn stops(&self) -> impl Iterator<Item = Coordinate> + '_ {
        std::iter::once(self.start)
            .chain(self.waypoints.iter().copied())
            .chain(std::iter::once(self.destination))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationReport {
    pub should_recompute: bool,
    /// `None` when there was no route vertex to measure against.
    pub min_distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_vertex: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteMetadata {
    pub point_count: usize,
    pub bounds: RouteBounds,
    pub start: Coordinate,
    pub end: Coordinate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}
