use crate::{
    error::NavError,
    models::{Coordinate, DeviationReport, Route},
    routing::haversine_km,
};

pub const DEFAULT_THRESHOLD_KM: f64 = 0.1;

/// Distance from `position` to the nearest vertex of `route`, and whether it
/// exceeds `threshold_km`.
///
/// A route without vertices always asks for a recompute. So does a
/// non-finite position or threshold, reported without a distance.
pub fn evaluate(route: &Route, position: Coordinate, threshold_km: f64) -> DeviationReport {
    if !position.is_finite() || !threshold_km.is_finite() {
        tracing::warn!(
            "cannot measure deviation of {:?} against threshold {} km",
            position,
            threshold_km
        );
        return DeviationReport {
            should_recompute: true,
            min_distance_km: None,
            nearest_vertex: None,
        };
    }

    let nearest = route
        .geometry
        .iter()
        .enumerate()
        .map(|(idx, vertex)| (idx, haversine_km(position, *vertex)))
        .min_by(|a, b| a.1.total_cmp(&b.1));

    match nearest {
        Some((idx, distance_km)) => DeviationReport {
            should_recompute: distance_km > threshold_km,
            min_distance_km: Some(distance_km),
            nearest_vertex: Some(idx),
        },
        None => DeviationReport {
            should_recompute: true,
            min_distance_km: None,
            nearest_vertex: None,
        },
    }
}

/// Holds the deviation policy for a live watch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationMonitor {
    threshold_km: f64,
}

impl Default for DeviationMonitor {
    fn default() -> Self {
        Self {
            threshold_km: DEFAULT_THRESHOLD_KM,
        }
    }
}

impl DeviationMonitor {
    pub fn new(threshold_km: f64) -> Result<Self, NavError> {
        if !threshold_km.is_finite() || threshold_km < 0.0 {
            return Err(NavError::invalid_input(format!(
                "deviation threshold must be a finite, non-negative distance in km, got {threshold_km}"
            )));
        }
        Ok(Self { threshold_km })
    }

    pub fn threshold_km(&self) -> f64 {
        self.threshold_km
    }

    pub fn evaluate(&self, route: &Route, position: Coordinate) -> DeviationReport {
        let report = evaluate(route, position, self.threshold_km);
        if report.should_recompute {
            tracing::debug!(
                "position {:?} is off route (nearest vertex {:?} at {:?} km, threshold {} km)",
                position,
                report.nearest_vertex,
                report.min_distance_km,
                self.threshold_km
            );
        }
        report
    }
}
