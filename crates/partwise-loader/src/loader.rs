use futures::future::try_join_all;
use partwise_model::{
    manifest_path_for, parse_parts_manifest, part_path_for, DatasetRequest, ValidationError,
};
use partwise_store::PartStoreBackend;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::debug;

/// The single error the loader surfaces to callers.
///
/// The fallback path has its own failure modes (manifest missing, manifest
/// invalid, a part failing to fetch) but none of them is actionable for a
/// caller: there is no fallback beyond the split variant, so "the dataset
/// could not be loaded" is the only signal. Those causes are collapsed into
/// the original direct-load error on purpose and logged at debug level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetError(pub String);

impl Display for DatasetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DatasetError {}

/// Caller-supplied decoder from a raw CSV record to a typed row. Receives the
/// header record alongside each row so decoders can look fields up by name.
pub type RowTransform<T> =
    dyn Fn(&csv::StringRecord, &csv::StringRecord) -> Result<T, ValidationError> + Send + Sync;

// Internal-only taxonomy for the fallback path; never crosses the crate
// boundary (see DatasetError).
enum FallbackError {
    ManifestUnavailable(String),
    ManifestInvalid(String),
    PartLoadFailed(String),
}

impl Display for FallbackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManifestUnavailable(m) => write!(f, "manifest unavailable: {m}"),
            Self::ManifestInvalid(m) => write!(f, "manifest invalid: {m}"),
            Self::PartLoadFailed(m) => write!(f, "part load failed: {m}"),
        }
    }
}

/// Resolves a dataset request into fully materialized, ordered rows,
/// transparently reassembling datasets that were split for the size cap.
pub struct DatasetLoader {
    store: Arc<dyn PartStoreBackend>,
}

impl DatasetLoader {
    #[must_use]
    pub fn new(store: Arc<dyn PartStoreBackend>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn backend_tag(&self) -> &'static str {
        self.store.backend_tag()
    }

    /// Fetch and decode the dataset at `request.path`. If the direct fetch or
    /// parse fails, fall back to the manifest; the manifest is never
    /// consulted when the direct attempt succeeds. Every fallback failure
    /// re-surfaces the direct error.
    pub async fn load<T>(
        &self,
        request: &DatasetRequest,
        transform: &RowTransform<T>,
    ) -> Result<Vec<T>, DatasetError> {
        let direct_err = match self.fetch_rows(&request.path, transform).await {
            Ok(rows) => return Ok(rows),
            Err(e) => e,
        };
        debug!(path = %request.path, error = %direct_err, "direct load failed; trying parts manifest");
        match self.load_from_parts(request, transform).await {
            Ok(rows) => Ok(rows),
            Err(fallback) => {
                debug!(
                    path = %request.path,
                    cause = %fallback,
                    "parts fallback failed; surfacing the direct load error"
                );
                Err(direct_err)
            }
        }
    }

    async fn load_from_parts<T>(
        &self,
        request: &DatasetRequest,
        transform: &RowTransform<T>,
    ) -> Result<Vec<T>, FallbackError> {
        let manifest_path = manifest_path_for(&request.path);
        let raw = self
            .store
            .fetch_text(&manifest_path)
            .await
            .map_err(|e| FallbackError::ManifestUnavailable(e.to_string()))?;
        let manifest = parse_parts_manifest(raw.as_bytes())
            .map_err(|e| FallbackError::ManifestInvalid(e.to_string()))?;
        debug!(
            path = %request.path,
            parts = manifest.parts.len(),
            "reassembling split dataset"
        );

        // All part fetches are created before any is awaited and joined
        // all-or-nothing; the output order is the manifest's declared order,
        // not completion order.
        let fetches = manifest.parts.iter().map(|part| {
            let part_path = part_path_for(&request.path, part);
            async move {
                self.fetch_rows(&part_path, transform)
                    .await
                    .map_err(|e| FallbackError::PartLoadFailed(format!("{part_path}: {e}")))
            }
        });
        let chunks = try_join_all(fetches).await?;
        Ok(chunks.into_iter().flatten().collect())
    }

    async fn fetch_rows<T>(
        &self,
        path: &str,
        transform: &RowTransform<T>,
    ) -> Result<Vec<T>, DatasetError> {
        let text = self
            .store
            .fetch_text(path)
            .await
            .map_err(|e| DatasetError(format!("failed to load dataset {path}: {e}")))?;
        parse_rows(path, &text, transform)
    }
}

fn parse_rows<T>(
    path: &str,
    text: &str,
    transform: &RowTransform<T>,
) -> Result<Vec<T>, DatasetError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| DatasetError(format!("failed to read header of {path}: {e}")))?
        .clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| DatasetError(format!("malformed row in {path}: {e}")))?;
        let row = transform(&headers, &record)
            .map_err(|e| DatasetError(format!("row transform failed in {path}: {e}")))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_rows(
        _headers: &csv::StringRecord,
        row: &csv::StringRecord,
    ) -> Result<Vec<String>, ValidationError> {
        Ok(row.iter().map(str::to_string).collect())
    }

    #[test]
    fn parse_rows_preserves_order_and_fields() {
        let rows = parse_rows("trips.csv", "a,b\n1,2\n3,4\n", &raw_rows).expect("rows");
        assert_eq!(rows, vec![vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn transform_errors_become_dataset_errors() {
        let result = parse_rows("trips.csv", "a,b\n1,2\n", &|_h: &csv::StringRecord,
                                                            _r: &csv::StringRecord|
         -> Result<(), ValidationError> {
            Err(ValidationError("bad row".to_string()))
        });
        let err = result.expect_err("error");
        assert!(err.0.contains("bad row"));
    }
}
