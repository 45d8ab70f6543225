use crate::models::{Coordinate, RouteBounds, RouteMetadata};

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance in kilometres on a spherical Earth.
///
/// Non-finite input yields NaN.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let hav = |angle_deg: f64| (angle_deg.to_radians() / 2.0).sin().powi(2);

    let central = hav(b.lat - a.lat)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * hav(b.lon - a.lon);
    // clamp keeps NaN, unlike min
    2.0 * EARTH_RADIUS_KM * central.sqrt().clamp(0.0, 1.0).asin()
}

/// Nearest point to `point` on the finite segment `start -> end`, treating
/// degrees as planar x/y (lon/lat).
///
/// A zero-length segment collapses to `start`.
pub fn closest_point_on_segment(point: Coordinate, start: Coordinate, end: Coordinate) -> Coordinate {
    let dx = end.lon - start.lon;
    let dy = end.lat - start.lat;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return start;
    }

    let dot = (point.lon - start.lon) * dx + (point.lat - start.lat) * dy;
    let t = (dot / len_sq).clamp(0.0, 1.0);
    start.interpolate(end, t)
}

/// Planar Euclidean distance, in degrees, from `point` to the segment
/// `start -> end`.
pub fn segment_distance_deg(point: Coordinate, start: Coordinate, end: Coordinate) -> f64 {
    planar_distance_deg(point, closest_point_on_segment(point, start, end))
}

pub fn planar_distance_deg(a: Coordinate, b: Coordinate) -> f64 {
    let dx = a.lon - b.lon;
    let dy = a.lat - b.lat;
    (dx * dx + dy * dy).sqrt()
}

/// Point count, bounding box and endpoints of a path, for fitting a view.
pub fn build_metadata(path: &[Coordinate]) -> Option<RouteMetadata> {
    let (first, last) = (*path.first()?, *path.last()?);

    let bounds = path.iter().fold(
        RouteBounds {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lon: first.lon,
            max_lon: first.lon,
        },
        |acc, coord| RouteBounds {
            min_lat: acc.min_lat.min(coord.lat),
            max_lat: acc.max_lat.max(coord.lat),
            min_lon: acc.min_lon.min(coord.lon),
            max_lon: acc.max_lon.max(coord.lon),
        },
    );

    Some(RouteMetadata {
        point_count: path.len(),
        bounds,
        start: first,
        end: last,
    })
}
