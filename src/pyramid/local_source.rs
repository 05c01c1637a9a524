//! Pyramids stored as files in one local directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::IoError;
use crate::io::FileRangeReader;

use super::registry::{ContentList, ContentSource};

/// File extensions served as pyramids, compared case-insensitively.
const PYRAMID_EXTENSIONS: &[&str] = &["tif", "tiff", "btf"];

fn is_pyramid_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            PYRAMID_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Content ids are bare file names inside the root directory.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && !id.contains("..") && is_pyramid_file(id)
}

/// [`ContentSource`] over a flat directory of TIFF files.
#[derive(Debug, Clone)]
pub struct LocalContentSource {
    root: PathBuf,
}

impl LocalContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ContentSource for LocalContentSource {
    type Reader = FileRangeReader;

    async fn create_reader(&self, id: &str) -> Result<Self::Reader, IoError> {
        if !is_valid_id(id) {
            return Err(IoError::NotFound(id.to_string()));
        }
        FileRangeReader::open(self.root.join(id))
            .await
            .map_err(|err| match err {
                IoError::NotFound(_) => IoError::NotFound(id.to_string()),
                other => other,
            })
    }

    async fn list(&self, limit: usize, cursor: Option<&str>) -> Result<ContentList, IoError> {
        let read_error = |e: std::io::Error| IoError::Open {
            path: self.root.display().to_string(),
            message: e.to_string(),
        };

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(read_error)?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_pyramid_file(&name) {
                continue;
            }
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                ids.push(name);
            }
        }
        ids.sort();

        if let Some(cursor) = cursor {
            ids.retain(|id| id.as_str() > cursor);
        }
        let has_more = ids.len() > limit;
        ids.truncate(limit);
        let next_cursor = if has_more { ids.last().cloned() } else { None };

        Ok(ContentList { ids, next_cursor })
    }
}
