use partwise_model::{parse_part_file_name, part_file_name, PartsManifest};
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitError(pub String);

impl Display for SplitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SplitError {}

/// Split a CSV file into parts of at most `max_bytes` each, on line
/// boundaries, with the header repeated at the top of every part so each
/// part stays independently parseable. Parts are named `{stem}_partN{ext}`
/// starting at 1, next to the original.
///
/// A part is only rolled once it holds at least one data row, so a row
/// larger than `max_bytes` yields an oversized part rather than an
/// unbounded number of header-only files.
///
/// An empty or unreadable dataset is a hard error: emitting a manifest with
/// no rows behind it would poison every consumer of this path.
pub fn split_csv_file(path: &Path, max_bytes: u64) -> Result<Vec<PathBuf>, SplitError> {
    let file = File::open(path)
        .map_err(|e| SplitError(format!("cannot open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    let mut header = String::new();
    let header_bytes = reader
        .read_line(&mut header)
        .map_err(|e| SplitError(format!("cannot read {}: {e}", path.display())))?;
    if header_bytes == 0 || header.trim().is_empty() {
        return Err(SplitError(format!(
            "refusing to split empty dataset {}",
            path.display()
        )));
    }

    let base_name = file_name_of(path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut part_paths: Vec<PathBuf> = Vec::new();
    let mut part_index: u32 = 1;
    let (first_path, mut writer) = open_part(dir, &base_name, part_index, &header)?;
    part_paths.push(first_path);
    let mut current_bytes = header_bytes as u64;
    let mut rows_in_part: u64 = 0;

    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| SplitError(format!("cannot read {}: {e}", path.display())))?;
        if read == 0 {
            break;
        }
        let line_bytes = read as u64;
        if rows_in_part > 0 && current_bytes + line_bytes > max_bytes {
            finish_part(&mut writer, &part_paths)?;
            part_index += 1;
            let (part_path, next_writer) = open_part(dir, &base_name, part_index, &header)?;
            part_paths.push(part_path);
            writer = next_writer;
            current_bytes = header_bytes as u64;
            rows_in_part = 0;
        }
        writer
            .write_all(line.as_bytes())
            .map_err(|e| SplitError(format!("cannot write part of {}: {e}", path.display())))?;
        current_bytes += line_bytes;
        rows_in_part += 1;
    }
    finish_part(&mut writer, &part_paths)?;

    info!(
        source = %path.display(),
        parts = part_paths.len(),
        "dataset split complete"
    );
    Ok(part_paths)
}

/// Write the manifest for a base file, next to it, listing parts in numeric
/// `_partN` order. Written to a temp file first and renamed into place.
pub fn write_parts_manifest(
    base_path: &Path,
    part_paths: &[PathBuf],
) -> Result<PathBuf, SplitError> {
    let base_name = file_name_of(base_path)?;
    let mut names: Vec<String> = Vec::with_capacity(part_paths.len());
    for part in part_paths {
        names.push(file_name_of(part)?);
    }
    names.sort_by_key(|name| parse_part_file_name(name).map_or(0, |p| p.index));

    let manifest = PartsManifest::new(base_name, names);
    let bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| SplitError(format!("cannot encode manifest: {e}")))?;

    let manifest_path = manifest_path_on_disk(base_path);
    let tmp_path = manifest_path.with_file_name(format!("{}.tmp", file_name_of(&manifest_path)?));
    fs::write(&tmp_path, &bytes)
        .map_err(|e| SplitError(format!("cannot write {}: {e}", tmp_path.display())))?;
    fs::rename(&tmp_path, &manifest_path)
        .map_err(|e| SplitError(format!("cannot write {}: {e}", manifest_path.display())))?;
    Ok(manifest_path)
}

/// Filesystem twin of the loader's manifest path derivation: final extension
/// replaced with `.parts.json`.
#[must_use]
pub fn manifest_path_on_disk(base_path: &Path) -> PathBuf {
    base_path.with_extension("parts.json")
}

fn open_part(
    dir: &Path,
    base_name: &str,
    index: u32,
    header: &str,
) -> Result<(PathBuf, BufWriter<File>), SplitError> {
    let part_path = dir.join(part_file_name(base_name, index));
    let file = File::create(&part_path)
        .map_err(|e| SplitError(format!("cannot create {}: {e}", part_path.display())))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(header.as_bytes())
        .map_err(|e| SplitError(format!("cannot write {}: {e}", part_path.display())))?;
    Ok((part_path, writer))
}

fn finish_part(writer: &mut BufWriter<File>, part_paths: &[PathBuf]) -> Result<(), SplitError> {
    writer.flush().map_err(|e| {
        let last = part_paths
            .last()
            .map_or_else(|| "?".to_string(), |p| p.display().to_string());
        SplitError(format!("cannot flush {last}: {e}"))
    })
}

pub(crate) fn file_name_of(path: &Path) -> Result<String, SplitError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| SplitError(format!("path has no usable file name: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use partwise_model::parse_parts_manifest;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).expect("read file")
    }

    #[test]
    fn splits_on_line_boundaries_with_repeated_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("trips.csv");
        fs::write(&source, "id,count\n1,10\n2,20\n3,30\n4,40\n").expect("write");

        // Header is 9 bytes and each row 5, so 20 bytes fits two rows.
        let parts = split_csv_file(&source, 20).expect("split");
        assert_eq!(parts.len(), 2);
        assert_eq!(read(&parts[0]), "id,count\n1,10\n2,20\n");
        assert_eq!(read(&parts[1]), "id,count\n3,30\n4,40\n");
    }

    #[test]
    fn concatenating_parts_reproduces_the_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("trips.csv");
        let mut body = String::from("id,count\n");
        for i in 0..100 {
            body.push_str(&format!("{i},{}\n", i * 2));
        }
        fs::write(&source, &body).expect("write");

        let parts = split_csv_file(&source, 128).expect("split");
        assert!(parts.len() > 1);

        let mut reassembled = String::new();
        for (i, part) in parts.iter().enumerate() {
            let text = read(part);
            let (header, rows) = text.split_once('\n').expect("header line");
            assert_eq!(header, "id,count");
            if i == 0 {
                reassembled.push_str(&text);
            } else {
                reassembled.push_str(rows);
            }
        }
        assert_eq!(reassembled, body);
    }

    #[test]
    fn empty_dataset_is_a_hard_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("empty.csv");
        fs::write(&source, "").expect("write");
        let err = split_csv_file(&source, 1024).expect_err("error");
        assert!(err.0.contains("empty dataset"));
    }

    #[test]
    fn oversized_single_row_does_not_spin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("wide.csv");
        let long_row = "x".repeat(256);
        fs::write(&source, format!("col\n{long_row}\nshort\n")).expect("write");

        let parts = split_csv_file(&source, 32).expect("split");
        assert_eq!(parts.len(), 2);
        assert_eq!(read(&parts[0]), format!("col\n{long_row}\n"));
        assert_eq!(read(&parts[1]), "col\nshort\n");
    }

    #[test]
    fn manifest_lists_parts_in_numeric_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("trips.csv");
        // Deliberately shuffled, including a double-digit index that lexical
        // ordering would misplace.
        let parts = vec![
            dir.path().join("trips_part10.csv"),
            dir.path().join("trips_part2.csv"),
            dir.path().join("trips_part1.csv"),
        ];
        let manifest_path = write_parts_manifest(&base, &parts).expect("manifest");
        assert_eq!(manifest_path, dir.path().join("trips.parts.json"));

        let manifest =
            parse_parts_manifest(&fs::read(&manifest_path).expect("read")).expect("parse");
        assert_eq!(manifest.base, "trips.csv");
        assert_eq!(
            manifest.parts,
            vec!["trips_part1.csv", "trips_part2.csv", "trips_part10.csv"]
        );
    }
}
