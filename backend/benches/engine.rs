use chargeway::deviation::evaluate;
use chargeway::models::{Coordinate, PointOfInterest, Route};
use chargeway::waypoints::select_waypoints;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Stations scattered on a grid around central Nairobi.
fn station_grid(side: usize) -> Vec<PointOfInterest> {
    let mut stations = Vec::with_capacity(side * side);
    for row in 0..side {
        for col in 0..side {
            let lon = 36.6 + 0.4 * col as f64 / side as f64;
            let lat = -1.5 + 0.4 * row as f64 / side as f64;
            stations.push(PointOfInterest::new(
                format!("station-{row}-{col}"),
                Coordinate::from_lon_lat(lon, lat),
            ));
        }
    }
    stations
}

/// A zig-zag drive with `vertices` points.
fn long_route(vertices: usize) -> Route {
    let geometry = (0..vertices)
        .map(|i| {
            let t = i as f64 / vertices as f64;
            let wobble = if i % 2 == 0 { 0.001 } else { -0.001 };
            Coordinate::from_lon_lat(36.7 + 0.3 * t, -1.4 + 0.2 * t + wobble)
        })
        .collect();
    Route::from_geometry(geometry)
}

fn benchmark_waypoint_selection(c: &mut Criterion) {
    let start = Coordinate::from_lon_lat(36.785, -1.2983);
    let end = Coordinate::from_lon_lat(36.8665, -1.3031);

    let mut group = c.benchmark_group("select_waypoints");
    for side in [10, 100, 300] {
        let stations = station_grid(side);
        group.bench_with_input(
            BenchmarkId::from_parameter(stations.len()),
            &stations,
            |b, stations| {
                b.iter(|| select_waypoints(black_box(stations), start, end, 3));
            },
        );
    }
    group.finish();
}

fn benchmark_deviation(c: &mut Criterion) {
    let position = Coordinate::from_lon_lat(36.90, -1.35);

    let mut group = c.benchmark_group("evaluate_deviation");
    for vertices in [100, 1_000, 10_000] {
        let route = long_route(vertices);
        group.bench_with_input(BenchmarkId::from_parameter(vertices), &route, |b, route| {
            b.iter(|| evaluate(black_box(route), position, 0.1));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_waypoint_selection, benchmark_deviation);
criterion_main!(benches);
