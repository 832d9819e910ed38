use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Reader for source line text, shown next to each frame
///
/// Includes a cache of file contents keyed by path, so rendering the same
/// stack repeatedly reads each file once. Files that cannot be read are
/// cached as missing too.
#[derive(Debug, Default)]
pub struct SourceLines {
    cache: Mutex<HashMap<PathBuf, Option<Arc<[String]>>>>,
}

impl SourceLines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of 1-based line `lineno` in `file`, trimmed
    ///
    /// Returns `None` for line 0, lines past the end, and unreadable files.
    pub fn line(&self, file: &str, lineno: u32) -> Option<String> {
        let index = usize::try_from(lineno).ok()?.checked_sub(1)?;
        let lines = self.lines_of(Path::new(file))?;
        lines.get(index).map(|text| text.trim().to_string())
    }

    fn lines_of(&self, path: &Path) -> Option<Arc<[String]>> {
        // Check cache first
        if let Some(cached) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(path) {
            return cached.clone();
        }

        // Cache miss - read outside the lock
        let loaded: Option<Arc<[String]>> = match fs::read_to_string(path) {
            Ok(text) => Some(text.lines().map(str::to_string).collect()),
            Err(e) => {
                log::debug!("No source for {}: {e}", path.display());
                None
            }
        };

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), loaded.clone());

        loaded
    }
}
