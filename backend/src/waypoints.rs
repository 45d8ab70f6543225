use crate::{
    error::NavError,
    models::{Coordinate, PointOfInterest},
    routing::segment_distance_deg,
};

/// A catalog entry together with its distance to the start/end corridor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedCandidate<'a> {
    pub poi: &'a PointOfInterest,
    /// Planar distance in degrees to the segment `start -> end`.
    pub distance: f64,
}

/// Rank every candidate by its distance to the straight segment between
/// `start` and `end`, nearest first.
///
/// The sort is stable, so candidates at equal distance keep their catalog
/// order. Candidates with non-finite coordinates are left out.
pub fn rank_candidates<'a>(
    candidates: &'a [PointOfInterest],
    start: Coordinate,
    end: Coordinate,
) -> Result<Vec<RankedCandidate<'a>>, NavError> {
    ensure_finite("start", start)?;
    ensure_finite("end", end)?;

    let mut ranked: Vec<RankedCandidate<'a>> = candidates
        .iter()
        .filter(|poi| {
            let usable = poi.coordinate.is_finite();
            if !usable {
                tracing::warn!("skipping candidate {:?} with non-finite coordinate", poi.name);
            }
            usable
        })
        .map(|poi| RankedCandidate {
            poi,
            distance: segment_distance_deg(poi.coordinate, start, end),
        })
        .collect();

    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(ranked)
}

/// Pick up to `k` candidates closest to the `start -> end` corridor, in the
/// order they should be threaded into a directions request.
pub fn select_waypoints(
    candidates: &[PointOfInterest],
    start: Coordinate,
    end: Coordinate,
    k: usize,
) -> Result<Vec<Coordinate>, NavError> {
    if k == 0 {
        ensure_finite("start", start)?;
        ensure_finite("end", end)?;
        return Ok(Vec::new());
    }

    let ranked = rank_candidates(candidates, start, end)?;
    let selected: Vec<Coordinate> = ranked
        .iter()
        .take(k)
        .map(|candidate| candidate.poi.coordinate)
        .collect();

    tracing::debug!(
        "selected {} of {} candidates as waypoints: {:?}",
        selected.len(),
        candidates.len(),
        ranked
            .iter()
            .take(k)
            .map(|candidate| candidate.poi.name.as_str())
            .collect::<Vec<_>>()
    );

    Ok(selected)
}

fn ensure_finite(label: &str, coord: Coordinate) -> Result<(), NavError> {
    if coord.is_finite() {
        Ok(())
    } else {
        Err(NavError::invalid_input(format!(
            "{label} coordinate is not finite: {coord:?}"
        )))
    }
}
