//! Config module for streamdl

use std::ffi::OsString;
use std::path::PathBuf;

/// Where the file comes from.
pub const SOURCE_URL: &str = "https://upload.wikimedia.org/wikipedia/commons/e/e7/Everest_North_Face_toward_Base_Camp_Tibet_Luca_Galuzzi_2006.jpg";

/// Where the file ends up, relative to the working directory.
pub const DESTINATION: &str = "mountain.jpg";

/// Suffix of the sibling file the body is streamed into before the rename.
pub const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub url: String,
    pub destination: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self::new(SOURCE_URL, DESTINATION)
    }
}

impl DownloadConfig {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }

    /// `<destination>.tmp`, next to the destination so the final rename
    /// never crosses a filesystem boundary.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.destination.as_os_str());
        name.push(TEMP_SUFFIX);
        PathBuf::from(name)
    }
}
