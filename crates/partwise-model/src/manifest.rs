use crate::dataset::ValidationError;
use serde::{Deserialize, Serialize};

/// Suffix appended to the extension-stripped dataset path to find its
/// manifest: `data/trips.csv` -> `data/trips.parts.json`.
pub const MANIFEST_SUFFIX: &str = ".parts.json";

/// Descriptor for a dataset that was split into ordered part files.
///
/// Only `parts` is contractual; the producer also records the original file
/// name in `base` for operators, and consumers ignore fields they do not
/// know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct PartsManifest {
    #[serde(default)]
    pub base: String,
    pub parts: Vec<String>,
}

impl PartsManifest {
    #[must_use]
    pub fn new(base: String, parts: Vec<String>) -> Self {
        Self { base, parts }
    }
}

/// Explicit parse step for manifest bytes. A manifest that fails to parse,
/// lacks a `parts` array, or declares zero parts is invalid; callers decide
/// what to do with the reason.
pub fn parse_parts_manifest(bytes: &[u8]) -> Result<PartsManifest, ValidationError> {
    let manifest: PartsManifest = serde_json::from_slice(bytes)
        .map_err(|e| ValidationError(format!("manifest parse failed: {e}")))?;
    if manifest.parts.is_empty() {
        return Err(ValidationError(
            "manifest must declare at least one part".to_string(),
        ));
    }
    if manifest.parts.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError(
            "manifest part names must not be empty".to_string(),
        ));
    }
    Ok(manifest)
}

/// Manifest path for a dataset path: the final extension is replaced with
/// [`MANIFEST_SUFFIX`]. A path without an extension gets the suffix appended.
#[must_use]
pub fn manifest_path_for(dataset_path: &str) -> String {
    let (dir, name) = split_dir_and_name(dataset_path);
    let stem = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    };
    if dir.is_empty() {
        format!("{stem}{MANIFEST_SUFFIX}")
    } else {
        format!("{dir}/{stem}{MANIFEST_SUFFIX}")
    }
}

/// Part paths are declared relative to the dataset's directory.
#[must_use]
pub fn part_path_for(dataset_path: &str, part_name: &str) -> String {
    let (dir, _) = split_dir_and_name(dataset_path);
    if dir.is_empty() {
        part_name.to_string()
    } else {
        format!("{dir}/{part_name}")
    }
}

fn split_dir_and_name(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(sep) => (&path[..sep], &path[sep + 1..]),
        None => ("", path),
    }
}

/// A file name matching the `{stem}_part{index}{ext}` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct PartFileName {
    pub stem: String,
    pub index: u32,
    pub ext: String,
}

impl PartFileName {
    /// Name of the unsplit file this part belongs to.
    #[must_use]
    pub fn base_name(&self) -> String {
        format!("{}{}", self.stem, self.ext)
    }

    /// A part whose stem is itself a part name came out of splitting an
    /// already-split file and needs normalization before serving.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        parse_part_file_name(&self.base_name()).is_some()
    }
}

/// Deterministic part naming, 1-based: `trips.csv` -> `trips_part1.csv`.
#[must_use]
pub fn part_file_name(base_name: &str, index: u32) -> String {
    match base_name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_part{}{}", &base_name[..dot], index, &base_name[dot..]),
        _ => format!("{base_name}_part{index}"),
    }
}

/// Recognize `{stem}_part{index}{ext}` file names. The `_part` marker is
/// matched case-insensitively to accept hand-renamed files.
#[must_use]
pub fn parse_part_file_name(name: &str) -> Option<PartFileName> {
    let dot = name.rfind('.')?;
    if dot == 0 {
        return None;
    }
    let (base, ext) = name.split_at(dot);
    let lower = base.to_ascii_lowercase();
    let marker = lower.rfind("_part")?;
    let digits = &base[marker + "_part".len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u32 = digits.parse().ok()?;
    Some(PartFileName {
        stem: base[..marker].to_string(),
        index,
        ext: ext.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_path_replaces_extension() {
        assert_eq!(
            manifest_path_for("data/trips.csv"),
            "data/trips.parts.json"
        );
        assert_eq!(manifest_path_for("trips.csv"), "trips.parts.json");
        assert_eq!(manifest_path_for("data/trips"), "data/trips.parts.json");
    }

    #[test]
    fn part_paths_resolve_relative_to_dataset_dir() {
        assert_eq!(
            part_path_for("data/trips.csv", "trips_part1.csv"),
            "data/trips_part1.csv"
        );
        assert_eq!(part_path_for("trips.csv", "trips_part1.csv"), "trips_part1.csv");
    }

    #[test]
    fn valid_manifest_parses() {
        let manifest = parse_parts_manifest(
            br#"{"base":"trips.csv","parts":["trips_part1.csv","trips_part2.csv"],"note":"x"}"#,
        )
        .expect("manifest");
        assert_eq!(manifest.base, "trips.csv");
        assert_eq!(manifest.parts.len(), 2);
    }

    #[test]
    fn empty_or_missing_parts_is_invalid() {
        assert!(parse_parts_manifest(br#"{"parts":[]}"#).is_err());
        assert!(parse_parts_manifest(br#"{"base":"trips.csv"}"#).is_err());
        assert!(parse_parts_manifest(br#"{"parts":"trips_part1.csv"}"#).is_err());
        assert!(parse_parts_manifest(b"not json").is_err());
    }

    #[test]
    fn part_names_round_trip() {
        assert_eq!(part_file_name("trips.csv", 3), "trips_part3.csv");
        let parsed = parse_part_file_name("trips_part3.csv").expect("part name");
        assert_eq!(parsed.stem, "trips");
        assert_eq!(parsed.index, 3);
        assert_eq!(parsed.base_name(), "trips.csv");
        assert!(!parsed.is_nested());
    }

    #[test]
    fn nested_part_names_are_detected() {
        let parsed = parse_part_file_name("trips_part2_part4.csv").expect("part name");
        assert_eq!(parsed.stem, "trips_part2");
        assert_eq!(parsed.index, 4);
        assert!(parsed.is_nested());
    }

    #[test]
    fn non_part_names_are_rejected() {
        assert!(parse_part_file_name("trips.csv").is_none());
        assert!(parse_part_file_name("trips_part.csv").is_none());
        assert!(parse_part_file_name("trips_partx1.csv").is_none());
        assert!(parse_part_file_name("trips_part1").is_none());
    }
}
