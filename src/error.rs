use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;

/// Crate-level convenience error for the startup plane.
///
/// Runtime request refusals never reach this type: they are answered
/// on the wire as `BAD_REQUEST` and stay inside the store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
