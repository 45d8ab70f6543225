use proptest::prelude::*;

use crate::models::Coordinate;

/// Any coordinate on the globe.
pub fn valid_coord() -> impl Strategy<Value = Coordinate> {
    (-90.0..=90.0, -180.0..=180.0).prop_map(|(lat, lon)| Coordinate { lat, lon })
}
