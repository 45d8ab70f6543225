use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::{
    config::MapboxConfig,
    error::NavError,
    models::{Coordinate, Route, RouteLeg, RouteQuery, RouteStep},
    providers::{DirectionsProvider, Geocoder},
};

/// Mapbox Geocoding v5 and Directions v5 client.
#[derive(Debug, Clone)]
pub struct MapboxClient {
    http: reqwest::Client,
    config: MapboxConfig,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    center: [f64; 2],
    #[serde(default)]
    place_name: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    geometry: LineString,
    #[serde(default)]
    legs: Vec<Leg>,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct LineString {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct Leg {
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    maneuver: Maneuver,
    #[serde(default)]
    distance: f64,
}

#[derive(Debug, Deserialize)]
struct Maneuver {
    #[serde(default)]
    instruction: String,
}

impl From<DirectionsRoute> for Route {
    fn from(route: DirectionsRoute) -> Self {
        Route {
            geometry: route
                .geometry
                .coordinates
                .into_iter()
                .map(Coordinate::from)
                .collect(),
            legs: route
                .legs
                .into_iter()
                .map(|leg| RouteLeg {
                    steps: leg
                        .steps
                        .into_iter()
                        .map(|step| RouteStep {
                            instruction: step.maneuver.instruction,
                            distance_m: step.distance,
                        })
                        .collect(),
                })
                .collect(),
            distance_km: route.distance / 1000.0,
            duration_s: route.duration,
        }
    }
}

impl MapboxClient {
    pub fn new(config: MapboxConfig) -> Result<Self, NavError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, NavError> {
        let mut url = Url::parse(&self.config.api_base).map_err(|err| {
            NavError::invalid_input(format!(
                "invalid Mapbox API base {:?}: {err}",
                self.config.api_base
            ))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                NavError::invalid_input(format!(
                    "Mapbox API base {:?} cannot carry a path",
                    self.config.api_base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl Geocoder for MapboxClient {
    #[tracing::instrument(skip(self))]
    async fn geocode(&self, address: &str) -> Result<Coordinate, NavError> {
        let resource = format!("{address}.json");
        let url = self.endpoint(&["geocoding", "v5", "mapbox.places", resource.as_str()])?;

        let res = self
            .http
            .get(url)
            .query(&[("access_token", self.config.access_token.as_str()), ("limit", "1")])
            .send()
            .await?;

        let status = res.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(NavError::Upstream {
                status: status.as_u16(),
            });
        } else if status.is_client_error() {
            return Err(NavError::invalid_input(format!(
                "geocoding rejected address {address:?} ({status})"
            )));
        } else if status != StatusCode::OK {
            return Err(NavError::Upstream {
                status: status.as_u16(),
            });
        }

        let data: GeocodingResponse = res.json().await?;
        let feature = data
            .features
            .into_iter()
            .next()
            .ok_or_else(|| NavError::AddressNotFound(address.to_string()))?;

        tracing::debug!("geocoded {address:?} to {:?} ({})", feature.center, feature.place_name);
        Ok(Coordinate::from(feature.center))
    }
}

#[async_trait]
impl DirectionsProvider for MapboxClient {
    #[tracing::instrument(skip(self))]
    async fn route(&self, query: &RouteQuery) -> Result<Route, NavError> {
        let stops = query
            .stops()
            .map(|c| format!("{},{}", c.lon, c.lat))
            .collect::<Vec<_>>()
            .join(";");
        let url = self.endpoint(&[
            "directions",
            "v5",
            "mapbox",
            self.config.profile.as_str(),
            stops.as_str(),
        ])?;

        let res = self
            .http
            .get(url)
            .query(&[
                ("steps", "true"),
                ("geometries", "geojson"),
                ("overview", "full"),
                ("access_token", self.config.access_token.as_str()),
            ])
            .send()
            .await?;

        let status = res.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            || status.is_server_error()
        {
            return Err(NavError::Upstream {
                status: status.as_u16(),
            });
        }

        let data: DirectionsResponse = res.json().await?;
        match data.code.as_str() {
            "Ok" => {}
            "NoRoute" | "NoSegment" => return Err(NavError::NoRouteFound),
            _ if status.is_client_error() => {
                return Err(NavError::invalid_input(
                    data.message.unwrap_or_else(|| data.code.clone()),
                ));
            }
            _ => {
                return Err(NavError::Upstream {
                    status: status.as_u16(),
                });
            }
        }

        let route: Route = data
            .routes
            .into_iter()
            .next()
            .ok_or(NavError::NoRouteFound)?
            .into();
        if route.is_empty() {
            return Err(NavError::NoRouteFound);
        }

        tracing::debug!(
            "directions returned {} vertices, {:.2} km through {} waypoint(s)",
            route.geometry.len(),
            route.distance_km,
            query.waypoints.len()
        );
        Ok(route)
    }
}
