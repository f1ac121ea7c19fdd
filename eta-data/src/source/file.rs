//! Local file source.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};

use super::{SourceError, SpeedTableSource};

/// Reads the speed table from a file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSpeedTableSource {
    path: Utf8PathBuf,
}

impl FileSpeedTableSource {
    /// Read from `path`, relative to the working directory unless absolute.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The configured path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<u8>, SourceError> {
        let (base, relative) = split_for_open(&self.path);
        let dir = fs_utf8::Dir::open_ambient_dir(base, ambient_authority())
            .map_err(|source| self.error(source))?;
        dir.read(relative).map_err(|source| self.error(source))
    }

    fn error(&self, source: std::io::Error) -> SourceError {
        SourceError::File {
            path: self.path.clone(),
            source,
        }
    }
}

// cap-std opens paths relative to a directory handle; absolute paths are
// opened relative to the filesystem root.
fn split_for_open(path: &Utf8Path) -> (&Utf8Path, &Utf8Path) {
    if path.is_absolute() {
        (Utf8Path::new("/"), path.strip_prefix("/").unwrap_or(path))
    } else {
        (Utf8Path::new("."), path)
    }
}

#[async_trait(?Send)]
impl SpeedTableSource for FileSpeedTableSource {
    fn describe(&self) -> String {
        format!("file://{}", self.path)
    }

    async fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        self.read()
    }
}
