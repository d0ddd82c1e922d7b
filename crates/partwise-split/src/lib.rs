#![forbid(unsafe_code)]
//! Offline partitioner: splits CSV datasets that exceed the static host's
//! size cap into ordered, standalone part files plus a manifest, and repairs
//! trees left behind by earlier runs.

mod scan;
mod split;

pub use scan::{scan_and_split, ScanOptions, ScanReport, DEFAULT_MAX_MB};
pub use split::{
    manifest_path_on_disk, split_csv_file, write_parts_manifest, SplitError,
};

pub const CRATE_NAME: &str = "partwise-split";
