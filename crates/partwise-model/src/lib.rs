#![forbid(unsafe_code)]
//! Shared vocabulary for the split/reassembly protocol: dataset requests,
//! cache keys, the parts manifest, and the part-file naming convention that
//! ties the offline splitter to the runtime loader.

mod dataset;
mod manifest;

pub use dataset::{CacheKey, DatasetRequest, ValidationError, CACHE_KEY_SEPARATOR};
pub use manifest::{
    manifest_path_for, parse_part_file_name, parse_parts_manifest, part_file_name, part_path_for,
    PartFileName, PartsManifest, MANIFEST_SUFFIX,
};

pub const CRATE_NAME: &str = "partwise-model";
