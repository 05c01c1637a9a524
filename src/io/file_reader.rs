use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of [`RangeReader`].
///
/// The file size is read once on open. Reads seek and fill under a mutex, so
/// a single reader can be shared between concurrent tile requests.
#[derive(Debug)]
pub struct FileRangeReader {
    file: Mutex<File>,
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open `path` for positioned reads.
    ///
    /// A missing file maps to [`IoError::NotFound`]; any other failure to
    /// [`IoError::Open`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let identifier = path.display().to_string();

        let file = File::open(&path).await.map_err(|e| open_error(&identifier, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| open_error(&identifier, e))?;

        if !metadata.is_file() {
            return Err(IoError::Open {
                path: identifier,
                message: "not a regular file".to_string(),
            });
        }

        Ok(Self {
            file: Mutex::new(file),
            path,
            size: metadata.len(),
            identifier,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_error(identifier: &str, err: std::io::Error) -> IoError {
    if err.kind() == ErrorKind::NotFound {
        IoError::NotFound(identifier.to_string())
    } else {
        IoError::Open {
            path: identifier.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.check_range(offset, len)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = vec![0u8; len];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| IoError::Read(format!("{}: {}", self.identifier, e)))?;
        file.read_exact(&mut buf)
            .await
            .map_err(|e| IoError::Read(format!("{}: {}", self.identifier, e)))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
