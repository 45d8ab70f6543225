use serde::Serialize;
use tokio::task::{JoinError, JoinSet};

use crate::{
    deviation::DeviationMonitor,
    error::NavError,
    models::{Coordinate, DeviationReport, Route, RouteQuery},
    position::{PositionSample, PositionSubscription},
    providers::{DirectionsProvider, DynDirections, DynGeocoder, Geocoder, Location},
    routing::haversine_km,
    stations::StationCatalog,
    waypoints::select_waypoints,
};

/// Monotonic tag of a route request. Only the newest requested generation
/// may replace the active route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RouteGeneration(pub u64);

impl RouteGeneration {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub waypoint_count: usize,
    pub monitor: DeviationMonitor,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            waypoint_count: crate::config::DEFAULT_WAYPOINT_COUNT,
            monitor: DeviationMonitor::default(),
        }
    }
}

/// The route currently shown to the driver.
#[derive(Debug, Clone)]
pub struct ActiveRoute {
    pub generation: RouteGeneration,
    pub origin: Coordinate,
    pub destination: Coordinate,
    /// Stations spliced into the directions request, in request order.
    pub waypoints: Vec<Coordinate>,
    pub route: Route,
}

#[derive(Debug)]
pub struct RouteOutcome {
    pub generation: RouteGeneration,
    pub result: Result<PlannedRoute, NavError>,
}

#[derive(Debug, Clone)]
pub struct PlannedRoute {
    pub query: RouteQuery,
    pub route: Route,
}

/// A self-contained route computation that can be spawned onto a runtime.
pub struct RouteJob {
    generation: RouteGeneration,
    start: Location,
    destination: Location,
    catalog: StationCatalog,
    waypoint_count: usize,
    geocoder: DynGeocoder,
    directions: DynDirections,
}

impl RouteJob {
    pub fn generation(&self) -> RouteGeneration {
        self.generation
    }

    pub async fn run(self) -> RouteOutcome {
        let result = plan_route(
            &self.start,
            &self.destination,
            &self.catalog,
            self.waypoint_count,
            self.geocoder.as_ref(),
            self.directions.as_ref(),
        )
        .await;
        RouteOutcome {
            generation: self.generation,
            result,
        }
    }
}

/// Geocode both ends, splice in the nearest stations and ask for directions.
pub async fn plan_route(
    start: &Location,
    destination: &Location,
    catalog: &StationCatalog,
    waypoint_count: usize,
    geocoder: &dyn Geocoder,
    directions: &dyn DirectionsProvider,
) -> Result<PlannedRoute, NavError> {
    let start = start.resolve(geocoder).await?;
    let destination = destination.resolve(geocoder).await?;
    let waypoints = select_waypoints(catalog.stations(), start, destination, waypoint_count)?;

    let query = RouteQuery {
        start,
        waypoints,
        destination,
    };
    let route = directions.route(&query).await?;
    Ok(PlannedRoute { query, route })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub positions: usize,
    pub rejected_positions: usize,
    pub breaches: usize,
    pub recomputes_requested: usize,
    pub routes_installed: usize,
    pub stale_discarded: usize,
    pub recompute_failures: usize,
}

/// Owns the live navigation state: the active route, the last fix, and the
/// destination to steer back to.
pub struct NavigationSession {
    catalog: StationCatalog,
    geocoder: DynGeocoder,
    directions: DynDirections,
    settings: SessionSettings,
    destination: Option<Location>,
    active: Option<ActiveRoute>,
    last_position: Option<PositionSample>,
    latest_generation: RouteGeneration,
}

impl NavigationSession {
    pub fn new(
        catalog: StationCatalog,
        geocoder: DynGeocoder,
        directions: DynDirections,
        settings: SessionSettings,
    ) -> Self {
        Self {
            catalog,
            geocoder,
            directions,
            settings,
            destination: None,
            active: None,
            last_position: None,
            latest_generation: RouteGeneration::default(),
        }
    }

    pub fn active_route(&self) -> Option<&ActiveRoute> {
        self.active.as_ref()
    }

    pub fn last_position(&self) -> Option<&PositionSample> {
        self.last_position.as_ref()
    }

    pub fn destination(&self) -> Option<&Location> {
        self.destination.as_ref()
    }

    pub fn latest_generation(&self) -> RouteGeneration {
        self.latest_generation
    }

    /// Compute and install a fresh route from `start` to `destination`.
    ///
    /// On failure the previous route and destination stay in place.
    pub async fn plan(
        &mut self,
        start: Location,
        destination: Location,
    ) -> Result<&ActiveRoute, NavError> {
        let job = self.route_job(start, destination.clone());
        let outcome = job.run().await;
        if self.apply(outcome)? {
            self.destination = Some(destination);
        }
        self.active.as_ref().ok_or(NavError::NoRouteFound)
    }

    /// Record a new fix and check it against the active route.
    ///
    /// Without an active route the report always asks for a recompute.
    pub fn observe(&mut self, sample: PositionSample) -> Result<DeviationReport, NavError> {
        if !sample.coordinate.is_finite() {
            return Err(NavError::invalid_input(format!(
                "position is not finite: {:?}",
                sample.coordinate
            )));
        }

        let report = match &self.active {
            Some(active) => self.settings.monitor.evaluate(&active.route, sample.coordinate),
            None => DeviationReport {
                should_recompute: true,
                min_distance_km: None,
                nearest_vertex: None,
            },
        };
        self.last_position = Some(sample);
        Ok(report)
    }

    /// Build a job that re-routes from the last known position to the
    /// current destination.
    pub fn request_recompute(&mut self) -> Result<RouteJob, NavError> {
        let position = self
            .last_position
            .as_ref()
            .map(|sample| sample.coordinate)
            .ok_or_else(|| NavError::LocationUnavailable("no position fix received yet".into()))?;
        let destination = self
            .destination
            .clone()
            .ok_or_else(|| NavError::invalid_input("no destination set"))?;
        Ok(self.route_job(Location::Coordinate(position), destination))
    }

    fn route_job(&mut self, start: Location, destination: Location) -> RouteJob {
        self.latest_generation = self.latest_generation.next();
        RouteJob {
            generation: self.latest_generation,
            start,
            destination,
            catalog: self.catalog.clone(),
            waypoint_count: self.settings.waypoint_count,
            geocoder: self.geocoder.clone(),
            directions: self.directions.clone(),
        }
    }

    /// Install a finished job's route if it is the newest one requested.
    ///
    /// Returns `Ok(false)` when the outcome belongs to a superseded
    /// generation; such outcomes are dropped whether they succeeded or not.
    pub fn apply(&mut self, outcome: RouteOutcome) -> Result<bool, NavError> {
        if outcome.generation != self.latest_generation {
            tracing::debug!(
                "discarding route generation {} (latest is {})",
                outcome.generation.0,
                self.latest_generation.0
            );
            return Ok(false);
        }

        let planned = outcome.result?;
        tracing::info!(
            "installed route generation {}: {} vertices, {:.2} km via {} station(s)",
            outcome.generation.0,
            planned.route.geometry.len(),
            planned.route.distance_km,
            planned.query.waypoints.len()
        );
        self.active = Some(ActiveRoute {
            generation: outcome.generation,
            origin: planned.query.start,
            destination: planned.query.destination,
            waypoints: planned.query.waypoints,
            route: planned.route,
        });
        Ok(true)
    }

    /// Drive the session from a live position feed until the feed ends.
    ///
    /// Fixes are handled one at a time, and a finished recompute is installed
    /// before the next fix is evaluated. A breach starts a recompute unless
    /// one is already in flight from a nearby origin; if the driver has moved
    /// past the threshold since that origin, a newer request supersedes it.
    /// Recompute failures keep the previous route active.
    pub async fn run(
        &mut self,
        mut subscription: PositionSubscription,
    ) -> Result<SessionSummary, NavError> {
        if self.destination.is_none() {
            return Err(NavError::invalid_input("no destination set"));
        }

        let mut summary = SessionSummary::default();
        let mut in_flight: JoinSet<RouteOutcome> = JoinSet::new();
        let mut pending_origin: Option<Coordinate> = None;

        loop {
            tokio::select! {
                biased;

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if self.absorb(joined, &mut summary) || in_flight.is_empty() {
                        pending_origin = None;
                    }
                }
                event = subscription.next() => {
                    let Some(event) = event else { break };
                    let sample = event?;
                    let position = sample.coordinate;

                    let report = match self.observe(sample) {
                        Ok(report) => report,
                        Err(err) => {
                            tracing::warn!("ignoring position fix: {err}");
                            summary.rejected_positions += 1;
                            continue;
                        }
                    };
                    summary.positions += 1;
                    if !report.should_recompute {
                        continue;
                    }

                    summary.breaches += 1;
                    let superseded = pending_origin.map_or(true, |origin| {
                        haversine_km(origin, position) > self.settings.monitor.threshold_km()
                    });
                    if superseded {
                        let job = self.request_recompute()?;
                        tracing::info!(
                            "off route at {:?}, requesting route generation {}",
                            position,
                            job.generation().0
                        );
                        pending_origin = Some(position);
                        summary.recomputes_requested += 1;
                        in_flight.spawn(job.run());
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            self.absorb(joined, &mut summary);
        }

        tracing::info!("navigation feed ended: {:?}", summary);
        Ok(summary)
    }

    /// Returns true when the outcome was for the latest generation.
    fn absorb(
        &mut self,
        joined: Result<RouteOutcome, JoinError>,
        summary: &mut SessionSummary,
    ) -> bool {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("route job did not complete: {err}");
                summary.recompute_failures += 1;
                return false;
            }
        };

        let generation = outcome.generation;
        match self.apply(outcome) {
            Ok(true) => summary.routes_installed += 1,
            Ok(false) => summary.stale_discarded += 1,
            Err(err) => {
                tracing::warn!(
                    "recompute for generation {} failed, keeping previous route: {err}",
                    generation.0
                );
                summary.recompute_failures += 1;
            }
        }
        generation == self.latest_generation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::models::PointOfInterest;

    struct TableGeocoder;

    #[async_trait]
    impl Geocoder for TableGeocoder {
        async fn geocode(&self, address: &str) -> Result<Coordinate, NavError> {
            match address {
                "Westlands" => Ok(Coordinate::from_lon_lat(36.785, -1.2983)),
                "South B" => Ok(Coordinate::from_lon_lat(36.8665, -1.3031)),
                _ => Err(NavError::AddressNotFound(address.to_string())),
            }
        }
    }

    /// Returns a straight line through every stop and records each query.
    #[derive(Default)]
    struct StraightLineDirections {
        queries: Mutex<Vec<RouteQuery>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DirectionsProvider for StraightLineDirections {
        async fn route(&self, query: &RouteQuery) -> Result<Route, NavError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            Ok(Route::from_geometry(query.stops().collect()))
        }
    }

    /// Straight-line directions that hold each call until the test hands out a
    /// permit.
    struct GatedDirections {
        gate: Semaphore,
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    impl GatedDirections {
        fn new(open_calls: usize) -> Self {
            Self {
                gate: Semaphore::new(open_calls),
                started: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DirectionsProvider for GatedDirections {
        async fn route(&self, query: &RouteQuery) -> Result<Route, NavError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate
                .acquire()
                .await
                .map_err(|_| NavError::NoRouteFound)?
                .forget();
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(Route::from_geometry(query.stops().collect()))
        }
    }

    async fn wait_until(counter: &AtomicUsize, target: usize) {
        while counter.load(Ordering::SeqCst) < target {
            tokio::task::yield_now().await;
        }
    }

    fn session_with(directions: DynDirections) -> NavigationSession {
        let catalog = StationCatalog::new(vec![
            PointOfInterest::new("Far", Coordinate::from_lon_lat(37.5, -0.5)),
            PointOfInterest::new("Midway", Coordinate::from_lon_lat(36.83, -1.30)),
        ])
        .unwrap();
        NavigationSession::new(
            catalog,
            Arc::new(TableGeocoder),
            directions,
            SessionSettings {
                waypoint_count: 1,
                monitor: DeviationMonitor::new(0.5).unwrap(),
            },
        )
    }

    fn session() -> NavigationSession {
        session_with(Arc::new(StraightLineDirections::default()))
    }

    #[tokio::test]
    async fn plan_installs_first_generation() {
        let directions = Arc::new(StraightLineDirections::default());
        let mut session = session_with(directions.clone());

        let active = session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();
        assert_eq!(active.generation, RouteGeneration(1));
        assert_eq!(active.waypoints, vec![Coordinate::from_lon_lat(36.83, -1.30)]);
        assert_eq!(active.route.geometry.len(), 3);

        let queries = directions.queries.lock().unwrap();
        assert_eq!(queries[0].start, Coordinate::from_lon_lat(36.785, -1.2983));
        assert_eq!(queries[0].destination, Coordinate::from_lon_lat(36.8665, -1.3031));
    }

    #[tokio::test]
    async fn plan_surfaces_address_not_found() {
        let mut session = session();
        let err = session
            .plan(Location::parse("Westlands"), Location::parse("Atlantis"))
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::AddressNotFound(_)));
        assert!(session.active_route().is_none());
    }

    #[tokio::test]
    async fn failed_plan_keeps_previous_destination() {
        let directions = Arc::new(StraightLineDirections::default());
        let mut session = session_with(directions.clone());
        session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();

        let err = session
            .plan(Location::parse("Westlands"), Location::parse("Atlantis"))
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::AddressNotFound(_)));
        assert_eq!(session.destination(), Some(&Location::parse("South B")));
        assert_eq!(session.active_route().unwrap().generation, RouteGeneration(1));

        let detour = Coordinate::from_lon_lat(36.90, -1.35);
        session.observe(PositionSample::at(detour)).unwrap();
        let job = session.request_recompute().unwrap();
        assert!(session.apply(job.run().await).unwrap());

        let south_b = Coordinate::from_lon_lat(36.8665, -1.3031);
        assert_eq!(session.active_route().unwrap().destination, south_b);
        assert_eq!(directions.queries.lock().unwrap().last().unwrap().destination, south_b);
    }

    #[tokio::test]
    async fn observe_without_route_asks_for_recompute() {
        let mut session = session();
        let report = session
            .observe(PositionSample::at(Coordinate::from_lon_lat(36.8, -1.3)))
            .unwrap();
        assert!(report.should_recompute);
        assert_eq!(report.min_distance_km, None);
        assert!(session.last_position().is_some());
    }

    #[tokio::test]
    async fn observe_rejects_non_finite_fix() {
        let mut session = session();
        let err = session
            .observe(PositionSample::at(Coordinate::from_lon_lat(f64::NAN, -1.3)))
            .unwrap_err();
        assert!(matches!(err, NavError::InvalidInput(_)));
        assert!(session.last_position().is_none());
    }

    #[tokio::test]
    async fn recompute_starts_from_last_position() {
        let directions = Arc::new(StraightLineDirections::default());
        let mut session = session_with(directions.clone());
        session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();

        let detour = Coordinate::from_lon_lat(36.90, -1.35);
        let report = session.observe(PositionSample::at(detour)).unwrap();
        assert!(report.should_recompute);

        let job = session.request_recompute().unwrap();
        assert_eq!(job.generation(), RouteGeneration(2));
        assert!(session.apply(job.run().await).unwrap());

        let active = session.active_route().unwrap();
        assert_eq!(active.generation, RouteGeneration(2));
        assert_eq!(active.origin, detour);
        assert_eq!(directions.queries.lock().unwrap()[1].start, detour);
    }

    #[tokio::test]
    async fn stale_generation_is_discarded() {
        let mut session = session();
        session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();
        session
            .observe(PositionSample::at(Coordinate::from_lon_lat(36.90, -1.35)))
            .unwrap();

        let older = session.request_recompute().unwrap();
        session
            .observe(PositionSample::at(Coordinate::from_lon_lat(36.95, -1.40)))
            .unwrap();
        let newer = session.request_recompute().unwrap();

        assert!(session.apply(newer.run().await).unwrap());
        assert!(!session.apply(older.run().await).unwrap());
        let active = session.active_route().unwrap();
        assert_eq!(active.generation, RouteGeneration(3));
        assert_eq!(active.origin, Coordinate::from_lon_lat(36.95, -1.40));
    }

    #[tokio::test]
    async fn stale_failures_are_ignored_too() {
        let mut session = session();
        session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();
        let stale = RouteOutcome {
            generation: RouteGeneration(0),
            result: Err(NavError::NoRouteFound),
        };
        assert!(!session.apply(stale).unwrap());
        assert_eq!(session.active_route().unwrap().generation, RouteGeneration(1));
    }

    #[tokio::test]
    async fn recompute_needs_a_fix() {
        let mut session = session();
        session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();
        assert!(matches!(
            session.request_recompute(),
            Err(NavError::LocationUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn run_requires_destination() {
        let mut session = session();
        let (_sender, subscription) = PositionSubscription::channel(1);
        assert!(matches!(
            session.run(subscription).await,
            Err(NavError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn run_recomputes_once_per_excursion() {
        let directions = Arc::new(StraightLineDirections::default());
        let mut session = session_with(directions.clone());
        session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();

        let (sender, subscription) = PositionSubscription::channel(8);
        let fixes = [
            Coordinate::from_lon_lat(36.785, -1.2983),
            Coordinate::from_lon_lat(36.83, -1.30),
            Coordinate::from_lon_lat(36.90, -1.35),
        ];
        for fix in fixes {
            sender.send(Ok(PositionSample::at(fix))).await.unwrap();
        }
        drop(sender);

        let summary = session.run(subscription).await.unwrap();
        assert_eq!(summary.positions, 3);
        assert_eq!(summary.breaches, 1);
        assert_eq!(summary.recomputes_requested, 1);
        assert_eq!(summary.routes_installed, 1);
        assert_eq!(directions.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            session.active_route().unwrap().origin,
            Coordinate::from_lon_lat(36.90, -1.35)
        );
    }

    #[tokio::test]
    async fn run_supersedes_recompute_when_driver_keeps_moving() {
        let directions = Arc::new(GatedDirections::new(1));
        let mut session = session_with(directions.clone());
        session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();

        let first_detour = Coordinate::from_lon_lat(36.90, -1.35);
        let second_detour = Coordinate::from_lon_lat(36.95, -1.40);
        let (sender, subscription) = PositionSubscription::channel(4);
        let feeder = directions.clone();
        let driver = tokio::spawn(async move {
            for fix in [first_detour, second_detour] {
                sender.send(Ok(PositionSample::at(fix))).await.unwrap();
            }
            drop(sender);
            // plan plus both recomputes are parked at the gate
            wait_until(&feeder.started, 3).await;
            feeder.gate.add_permits(2);
        });

        let summary = session.run(subscription).await.unwrap();
        driver.await.unwrap();

        assert_eq!(summary.breaches, 2);
        assert_eq!(summary.recomputes_requested, 2);
        assert_eq!(summary.routes_installed, 1);
        assert_eq!(summary.stale_discarded, 1);
        let active = session.active_route().unwrap();
        assert_eq!(active.generation, RouteGeneration(3));
        assert_eq!(active.origin, second_detour);
    }

    #[tokio::test]
    async fn finished_recompute_is_installed_before_next_fix() {
        let directions = Arc::new(GatedDirections::new(1));
        let mut session = session_with(directions.clone());
        session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();

        let detour = Coordinate::from_lon_lat(36.90, -1.35);
        let (sender, subscription) = PositionSubscription::channel(4);
        let feeder = directions.clone();
        let driver = tokio::spawn(async move {
            sender.send(Ok(PositionSample::at(detour))).await.unwrap();
            wait_until(&feeder.started, 2).await;
            feeder.gate.add_permits(1);
            wait_until(&feeder.finished, 2).await;
            // The finished job and this fix are both ready when the loop wakes.
            sender.send(Ok(PositionSample::at(detour))).await.unwrap();
        });

        let summary = session.run(subscription).await.unwrap();
        driver.await.unwrap();

        assert_eq!(summary.positions, 2);
        assert_eq!(summary.breaches, 1);
        assert_eq!(summary.routes_installed, 1);
        assert_eq!(session.active_route().unwrap().generation, RouteGeneration(2));
    }

    #[tokio::test]
    async fn run_stops_on_location_failure() {
        let mut session = session();
        session
            .plan(Location::parse("Westlands"), Location::parse("South B"))
            .await
            .unwrap();
        let (sender, subscription) = PositionSubscription::channel(2);
        sender
            .send(Err(NavError::LocationUnavailable("permission denied".into())))
            .await
            .unwrap();
        assert!(matches!(
            session.run(subscription).await,
            Err(NavError::LocationUnavailable(_))
        ));
    }
}
