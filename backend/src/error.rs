use thiserror::Error;

use crate::config::ConfigError;
use crate::stations::CatalogError;

#[derive(Debug, Error)]
pub enum NavError {
    #[error("address not found: {0}")]
    AddressNotFound(String),
    #[error("no route found")]
    NoRouteFound,
    #[error("location unavailable: {0}")]
    LocationUnavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("upstream service responded with status {status}")]
    Upstream { status: u16 },
    #[error("request to upstream service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("failed to read position trace: {0}")]
    Trace(#[from] gpx::errors::GpxError),
}

impl NavError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
