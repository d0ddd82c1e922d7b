use crate::split::{
    file_name_of, manifest_path_on_disk, split_csv_file, write_parts_manifest, SplitError,
};
use partwise_model::{parse_part_file_name, MANIFEST_SUFFIX};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_MAX_MB: u64 = 100;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub max_bytes: u64,
    pub remove_original: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_MB * 1024 * 1024,
            remove_original: false,
        }
    }
}

/// What a scan did, for logging and machine output.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ScanReport {
    pub split_files: Vec<PathBuf>,
    pub manifests_written: Vec<PathBuf>,
    pub nested_parts_normalized: usize,
    pub stale_manifests_removed: usize,
}

/// Walk `root`, repair any leftovers from earlier runs, then split every CSV
/// over the size limit and write its manifest.
///
/// Repairs first: nested parts (a part that was itself split) are merged
/// back into their base part, and manifests whose base is itself a part file
/// are stale and dropped. Part files already on disk get a fresh manifest
/// for their base so a partially-published tree becomes loadable again.
pub fn scan_and_split(root: &Path, options: &ScanOptions) -> Result<ScanReport, SplitError> {
    if !root.is_dir() {
        return Err(SplitError(format!(
            "missing directory: {}",
            root.display()
        )));
    }
    let mut report = ScanReport::default();

    let files = collect_files(root)?;
    report.nested_parts_normalized = normalize_nested_parts(&files)?;
    report.stale_manifests_removed = cleanup_part_manifests(&files)?;

    // Re-list: normalization may have created and deleted files.
    let files = collect_files(root)?;

    let existing = discover_existing_parts(&files)?;
    for (base_path, parts) in &existing {
        report
            .manifests_written
            .push(write_parts_manifest(base_path, parts)?);
    }

    let mut candidates = files;
    candidates.sort();
    for path in candidates {
        if existing.contains_key(&path) {
            continue;
        }
        if !should_split(&path, options.max_bytes)? {
            continue;
        }
        info!(file = %path.display(), "splitting oversized dataset");
        let parts = split_csv_file(&path, options.max_bytes)?;
        report
            .manifests_written
            .push(write_parts_manifest(&path, &parts)?);
        report.split_files.push(path.clone());
        if options.remove_original {
            fs::remove_file(&path)
                .map_err(|e| SplitError(format!("cannot remove {}: {e}", path.display())))?;
        }
    }

    info!(
        split = report.split_files.len(),
        manifests = report.manifests_written.len(),
        normalized = report.nested_parts_normalized,
        stale_removed = report.stale_manifests_removed,
        "split scan complete"
    );
    Ok(report)
}

fn should_split(path: &Path, max_bytes: u64) -> Result<bool, SplitError> {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Ok(false);
    };
    if !ext.eq_ignore_ascii_case("csv") {
        return Ok(false);
    }
    let name = file_name_of(path)?;
    if parse_part_file_name(&name).is_some() {
        return Ok(false);
    }
    let size = fs::metadata(path)
        .map_err(|e| SplitError(format!("cannot stat {}: {e}", path.display())))?
        .len();
    Ok(size > max_bytes)
}

/// Group part files under the base path they belong to, skipping nested
/// parts (normalized separately) and bases that are themselves parts.
fn discover_existing_parts(
    files: &[PathBuf],
) -> Result<BTreeMap<PathBuf, Vec<PathBuf>>, SplitError> {
    let mut groups: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for path in files {
        let name = file_name_of(path)?;
        let Some(part) = parse_part_file_name(&name) else {
            continue;
        };
        if part.is_nested() {
            continue;
        }
        let base_path = path.with_file_name(part.base_name());
        groups.entry(base_path).or_default().push(path.clone());
    }
    Ok(groups)
}

/// Merge `*_partM_partN.csv` leftovers back into `*_partM.csv`. If the base
/// part still exists the nested files are redundant and just removed; either
/// way the base part's own stale manifest goes away.
fn normalize_nested_parts(files: &[PathBuf]) -> Result<usize, SplitError> {
    let mut groups: BTreeMap<PathBuf, Vec<(u32, PathBuf)>> = BTreeMap::new();
    for path in files {
        let name = file_name_of(path)?;
        let Some(part) = parse_part_file_name(&name) else {
            continue;
        };
        if !part.is_nested() {
            continue;
        }
        let base_part_path = path.with_file_name(part.base_name());
        groups
            .entry(base_part_path)
            .or_default()
            .push((part.index, path.clone()));
    }

    let mut normalized = 0usize;
    for (base_part_path, mut nested) in groups {
        if base_part_path.exists() {
            warn!(
                base = %base_part_path.display(),
                nested = nested.len(),
                "base part present; dropping redundant nested parts"
            );
            for (_, path) in &nested {
                remove_file_logged(path)?;
            }
            remove_manifest_if_present(&base_part_path)?;
            continue;
        }

        nested.sort_by_key(|(index, _)| *index);
        merge_parts_into(&base_part_path, nested.iter().map(|(_, p)| p.as_path()))?;
        for (_, path) in &nested {
            remove_file_logged(path)?;
        }
        remove_manifest_if_present(&base_part_path)?;
        normalized += 1;
        info!(base = %base_part_path.display(), "nested parts normalized");
    }
    Ok(normalized)
}

/// Drop `.parts.json` files whose base name is itself a part file; those
/// belong to a nested split that no longer exists.
fn cleanup_part_manifests(files: &[PathBuf]) -> Result<usize, SplitError> {
    let mut removed = 0usize;
    for path in files {
        let name = file_name_of(path)?;
        let Some(base) = name.strip_suffix(MANIFEST_SUFFIX) else {
            continue;
        };
        if parse_part_file_name(&format!("{base}.csv")).is_some() {
            remove_file_logged(path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn merge_parts_into<'a>(
    target: &Path,
    parts: impl Iterator<Item = &'a Path>,
) -> Result<(), SplitError> {
    let out = File::create(target)
        .map_err(|e| SplitError(format!("cannot create {}: {e}", target.display())))?;
    let mut writer = BufWriter::new(out);
    for (index, part) in parts.enumerate() {
        let file = File::open(part)
            .map_err(|e| SplitError(format!("cannot open {}: {e}", part.display())))?;
        let mut reader = BufReader::new(file);
        let mut header = String::new();
        reader
            .read_line(&mut header)
            .map_err(|e| SplitError(format!("cannot read {}: {e}", part.display())))?;
        if index == 0 {
            writer
                .write_all(header.as_bytes())
                .map_err(|e| SplitError(format!("cannot write {}: {e}", target.display())))?;
        }
        std::io::copy(&mut reader, &mut writer)
            .map_err(|e| SplitError(format!("cannot write {}: {e}", target.display())))?;
    }
    writer
        .flush()
        .map_err(|e| SplitError(format!("cannot flush {}: {e}", target.display())))
}

fn remove_manifest_if_present(base_path: &Path) -> Result<(), SplitError> {
    let manifest = manifest_path_on_disk(base_path);
    if manifest.exists() {
        remove_file_logged(&manifest)?;
    }
    Ok(())
}

fn remove_file_logged(path: &Path) -> Result<(), SplitError> {
    fs::remove_file(path)
        .map_err(|e| SplitError(format!("cannot remove {}: {e}", path.display())))
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>, SplitError> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir)
            .map_err(|e| SplitError(format!("cannot list {}: {e}", dir.display())))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| SplitError(format!("cannot list {}: {e}", dir.display())))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    Ok(out)
}
