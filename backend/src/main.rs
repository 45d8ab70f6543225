use std::{path::PathBuf, time::Duration};

use chargeway::{
    config::NavigationConfig,
    create_session,
    position::{GpxReplaySource, PositionSource},
    providers::Location,
    routing::build_metadata,
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Plan a drive through nearby EV charging stations and follow a live position trace"
)]
struct Args {
    /// Start address, or a "lon,lat" pair
    #[arg(long)]
    start: String,

    /// Destination address, or a "lon,lat" pair
    #[arg(long)]
    destination: String,

    /// GPX file replayed as the live position feed
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Delay between replayed fixes in milliseconds
    #[arg(long, default_value_t = 1000)]
    replay_interval_ms: u64,

    /// Station catalog JSON, overrides CHARGEWAY_STATIONS
    #[arg(long)]
    stations: Option<PathBuf>,

    /// Number of stations to route through, overrides CHARGEWAY_WAYPOINTS
    #[arg(long)]
    waypoints: Option<usize>,

    /// Off-route distance in km that triggers a recompute, overrides CHARGEWAY_DEVIATION_KM
    #[arg(long)]
    threshold_km: Option<f64>,
}

impl Args {
    fn apply_overrides(&self, config: &mut NavigationConfig) {
        if let Some(path) = &self.stations {
            config.stations_path = Some(path.clone());
        }
        if let Some(count) = self.waypoints {
            config.waypoint_count = count;
        }
        if let Some(threshold) = self.threshold_km {
            config.deviation_threshold_km = threshold;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chargeway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = NavigationConfig::from_env()?;
    args.apply_overrides(&mut config);

    let mut session = create_session(&config)?;
    let active = session
        .plan(Location::parse(&args.start), Location::parse(&args.destination))
        .await?;

    tracing::info!(
        "route generation {}: {:.2} km, {:.0} min, {} charging stop(s)",
        active.generation.0,
        active.route.distance_km,
        active.route.duration_s / 60.0,
        active.waypoints.len()
    );
    if let Some(metadata) = build_metadata(&active.route.geometry) {
        tracing::info!(
            "route bounds: lat {:.4}..{:.4}, lon {:.4}..{:.4} ({} points)",
            metadata.bounds.min_lat,
            metadata.bounds.max_lat,
            metadata.bounds.min_lon,
            metadata.bounds.max_lon,
            metadata.point_count
        );
    }
    for (idx, instruction) in active.route.instructions().enumerate() {
        println!("{:>3}. {instruction}", idx + 1);
    }

    let Some(trace) = &args.trace else {
        return Ok(());
    };

    let source = GpxReplaySource::from_path(trace, Duration::from_millis(args.replay_interval_ms))?;
    tracing::info!("replaying {} fixes from {}", source.len(), trace.display());
    let summary = session.run(source.subscribe()?).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
