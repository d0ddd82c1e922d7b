use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Separator between the dataset path and the caller-chosen suffix inside a
/// [`CacheKey`]. Fixed so that key derivation stays deterministic across the
/// process lifetime.
pub const CACHE_KEY_SEPARATOR: &str = "::";

/// A logical dataset as a caller addresses it: a path on the static host plus
/// an optional suffix that keeps cache entries apart when the same physical
/// file is loaded with different row transforms.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DatasetRequest {
    pub path: String,
    pub cache_key_suffix: Option<String>,
}

impl DatasetRequest {
    pub fn new(path: impl Into<String>) -> Result<Self, ValidationError> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(ValidationError("dataset path must not be empty".to_string()));
        }
        Ok(Self {
            path,
            cache_key_suffix: None,
        })
    }

    #[must_use]
    pub fn with_cache_key_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.cache_key_suffix = Some(suffix.into());
        self
    }

    /// Two requests with an equal key must be treated as requesting the same
    /// underlying resource.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        match &self.cache_key_suffix {
            Some(suffix) => CacheKey(format!(
                "{}{}{}",
                self.path, CACHE_KEY_SEPARATOR, suffix
            )),
            None => CacheKey(self.path.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub struct CacheKey(pub String);

impl CacheKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
