#![forbid(unsafe_code)]
//! Fetch backends for published datasets: a local filesystem root for build
//! pipelines and tests, and an HTTP client for the static host.

mod backends;
mod error;

pub use backends::{HttpBackend, LocalFsBackend, PartStoreBackend};
pub use error::{StoreError, StoreErrorCode};

pub const CRATE_NAME: &str = "partwise-store";
