#![forbid(unsafe_code)]
//! Runtime side of the split/reassembly protocol: the loader that resolves a
//! dataset path into ordered rows (falling back to the parts manifest when
//! the whole file is not served), and the single-flight cache that wraps it.

mod cache;
mod fake;
mod loader;

pub use cache::DatasetCache;
pub use fake::FakeStore;
pub use loader::{DatasetError, DatasetLoader, RowTransform};

pub const CRATE_NAME: &str = "partwise-loader";
