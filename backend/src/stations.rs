use std::{fs::File, io, io::Read, path::Path, sync::Arc};

use crate::models::{Coordinate, PointOfInterest};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read station catalog: {0}")]
    Io(#[from] io::Error),
    #[error("invalid station catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("station #{index} has an empty name")]
    EmptyName { index: usize },
    #[error("station {name:?} has a non-finite coordinate")]
    InvalidCoordinate { name: String },
}

/// Read-only list of charging stations known at startup.
///
/// Cloning is cheap; clones share the same backing list.
#[derive(Debug, Clone)]
pub struct StationCatalog {
    stations: Arc<[PointOfInterest]>,
}

const NAIROBI_STATIONS: [(&str, f64, f64); 10] = [
    ("CBD Station", 36.8219, -1.2921),
    ("Westlands Station", 36.785, -1.2983),
    ("Kasarani Station", 36.8844, -1.2191),
    ("South B Station", 36.8665, -1.3031),
    ("Parklands Station", 36.7772, -1.2571),
    ("Buruburu Station", 36.8883, -1.2893),
    ("Lavington Station", 36.7622, -1.3028),
    ("Ngara Station", 36.8158, -1.264),
    ("South C Station", 36.8509, -1.3169),
    ("Ngong Road Station", 36.8219, -1.2751),
];

impl Default for StationCatalog {
    fn default() -> Self {
        Self::nairobi()
    }
}

impl StationCatalog {
    /// Built-in catalog of public chargers around central Nairobi.
    pub fn nairobi() -> Self {
        let stations = NAIROBI_STATIONS
            .iter()
            .map(|&(name, lon, lat)| PointOfInterest::new(name, Coordinate::from_lon_lat(lon, lat)))
            .collect();
        Self { stations }
    }

    pub fn new(stations: Vec<PointOfInterest>) -> Result<Self, CatalogError> {
        for (index, station) in stations.iter().enumerate() {
            if station.name.trim().is_empty() {
                return Err(CatalogError::EmptyName { index });
            }
            if !station.coordinate.is_finite() {
                return Err(CatalogError::InvalidCoordinate {
                    name: station.name.clone(),
                });
            }
        }
        Ok(Self {
            stations: stations.into(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, CatalogError> {
        let stations: Vec<PointOfInterest> = serde_json::from_reader(reader)?;
        Self::new(stations)
    }

    pub fn stations(&self) -> &[PointOfInterest] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn nairobi_catalog_has_ten_stations() {
        let catalog = StationCatalog::nairobi();
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog.stations()[0].name, "CBD Station");
        assert_eq!(
            catalog.stations()[0].coordinate,
            Coordinate::from_lon_lat(36.8219, -1.2921)
        );
    }

    #[test]
    fn loads_catalog_from_json() {
        let json = r#"[
            {"name": "Depot", "coordinate": {"lat": -1.3, "lon": 36.8}},
            {"name": "Mall", "coordinate": {"lat": -1.25, "lon": 36.78}}
        ]"#;
        let catalog = StationCatalog::from_reader(json.as_bytes()).expect("catalog");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.stations()[1].name, "Mall");
    }

    #[test]
    fn loads_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "Depot", "coordinate": {{"lat": -1.3, "lon": 36.8}}}}]"#
        )
        .unwrap();
        let catalog = StationCatalog::from_file(file.path()).expect("catalog");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn empty_catalog_is_allowed() {
        let catalog = StationCatalog::from_reader("[]".as_bytes()).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn rejects_blank_names() {
        let json = r#"[{"name": "  ", "coordinate": {"lat": 0.0, "lon": 0.0}}]"#;
        assert!(matches!(
            StationCatalog::from_reader(json.as_bytes()),
            Err(CatalogError::EmptyName { index: 0 })
        ));
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let stations = vec![PointOfInterest::new(
            "Nowhere",
            Coordinate::from_lon_lat(f64::NAN, 0.0),
        )];
        assert!(matches!(
            StationCatalog::new(stations),
            Err(CatalogError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            StationCatalog::from_reader("{not json".as_bytes()),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            StationCatalog::from_file("/definitely/not/here.json"),
            Err(CatalogError::Io(_))
        ));
    }
}
