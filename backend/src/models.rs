pub use shared::{
    Coordinate, DeviationReport, PointOfInterest, Route, RouteBounds, RouteLeg, RouteMetadata,
    RouteQuery, RouteStep,
};
