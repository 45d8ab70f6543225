use std::{fs::File, io::BufReader, io::Read, path::Path, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{error::NavError, models::Coordinate};

/// One fix from a live-location feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    #[serde(default)]
    pub altitude_m: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn at(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            altitude_m: None,
            heading_deg: None,
            speed_mps: None,
            timestamp: Utc::now(),
        }
    }
}

pub type PositionEvent = Result<PositionSample, NavError>;

/// Push-style feed of position fixes.
///
/// The feed stops when the subscription is unsubscribed or dropped.
pub struct PositionSubscription {
    receiver: mpsc::Receiver<PositionEvent>,
    producer: Option<JoinHandle<()>>,
}

impl PositionSubscription {
    /// A feed driven by the host through the returned sender.
    pub fn channel(capacity: usize) -> (mpsc::Sender<PositionEvent>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            sender,
            Self {
                receiver,
                producer: None,
            },
        )
    }

    fn with_producer(receiver: mpsc::Receiver<PositionEvent>, producer: JoinHandle<()>) -> Self {
        Self {
            receiver,
            producer: Some(producer),
        }
    }

    /// Next fix, or `None` once the source has finished.
    pub async fn next(&mut self) -> Option<PositionEvent> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.receiver.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

impl Drop for PositionSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

pub trait PositionSource {
    fn subscribe(&self) -> Result<PositionSubscription, NavError>;
}

/// Replays a recorded drive from a GPX file at a fixed pace.
#[derive(Debug, Clone)]
pub struct GpxReplaySource {
    points: Vec<Coordinate>,
    altitudes: Vec<Option<f64>>,
    interval: Duration,
}

impl GpxReplaySource {
    pub fn from_path(path: impl AsRef<Path>, interval: Duration) -> Result<Self, NavError> {
        let file = File::open(path.as_ref()).map_err(|err| {
            NavError::LocationUnavailable(format!(
                "cannot open trace {}: {err}",
                path.as_ref().display()
            ))
        })?;
        Self::from_reader(BufReader::new(file), interval)
    }

    /// Reads every track point, falling back to route points when the file
    /// has no tracks.
    pub fn from_reader(reader: impl Read, interval: Duration) -> Result<Self, NavError> {
        let gpx = gpx::read(reader)?;

        let mut waypoints: Vec<&gpx::Waypoint> = gpx
            .tracks
            .iter()
            .flat_map(|track| track.segments.iter())
            .flat_map(|segment| segment.points.iter())
            .collect();
        if waypoints.is_empty() {
            waypoints = gpx.routes.iter().flat_map(|route| route.points.iter()).collect();
        }

        let points: Vec<Coordinate> = waypoints
            .iter()
            .map(|waypoint| {
                let point: geo_types::Point<f64> = waypoint.point();
                Coordinate::from_lon_lat(point.x(), point.y())
            })
            .collect();
        let altitudes = waypoints.iter().map(|waypoint| waypoint.elevation).collect();

        tracing::debug!("loaded {} trace points for replay", points.len());
        Ok(Self {
            points,
            altitudes,
            interval,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn samples(&self) -> Vec<PositionSample> {
        self.points
            .iter()
            .zip(&self.altitudes)
            .map(|(&coordinate, &altitude_m)| PositionSample {
                altitude_m,
                ..PositionSample::at(coordinate)
            })
            .collect()
    }
}

impl PositionSource for GpxReplaySource {
    /// Must be called from within a tokio runtime.
    fn subscribe(&self) -> Result<PositionSubscription, NavError> {
        if self.is_empty() {
            return Err(NavError::LocationUnavailable(
                "trace contains no positions".into(),
            ));
        }

        let samples = self.samples();
        let interval = self.interval;
        let (sender, receiver) = mpsc::channel(16);
        let producer = tokio::spawn(async move {
            for mut sample in samples {
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                sample.timestamp = Utc::now();
                if sender.send(Ok(sample)).await.is_err() {
                    break;
                }
            }
        });

        Ok(PositionSubscription::with_producer(receiver, producer))
    }
}
