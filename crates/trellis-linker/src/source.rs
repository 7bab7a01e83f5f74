//! Loading statement dumps for source files

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::LoadError;
use crate::statements::SourceFile;

/// Suffix of a statement dump stored next to its source file.
pub const DUMP_SUFFIX: &str = ".json";

/// Where parsed source files come from. Shared across threads.
pub trait SourceLoader: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn load(&self, path: &Path) -> Result<Arc<SourceFile>, LoadError>;

    /// Identity used to deduplicate files reached through different paths.
    fn canonicalize(&self, path: &Path) -> PathBuf {
        normalize(path)
    }
}

/// Reads statement dumps from disk and keeps decoded files in memory.
///
/// The dump for `board.ato` is either `board.ato` itself (already JSON) or a
/// sibling `board.ato.json`.
#[derive(Default)]
pub struct FsLoader {
    cache: DashMap<PathBuf, Arc<SourceFile>>,
}

impl FsLoader {
    pub fn new() -> Self {
        FsLoader {
            cache: DashMap::new(),
        }
    }

    fn locate(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        let mut dump = path.as_os_str().to_owned();
        dump.push(DUMP_SUFFIX);
        let dump = PathBuf::from(dump);
        dump.is_file().then_some(dump)
    }

    /// Number of decoded files held in memory.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl SourceLoader for FsLoader {
    fn exists(&self, path: &Path) -> bool {
        self.locate(path).is_some()
    }

    fn load(&self, path: &Path) -> Result<Arc<SourceFile>, LoadError> {
        let key = self.canonicalize(path);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }
        let located = self
            .locate(path)
            .ok_or_else(|| LoadError::Missing(path.to_path_buf()))?;
        let text = std::fs::read_to_string(&located).map_err(|source| LoadError::Io {
            path: located.clone(),
            source,
        })?;
        let file = SourceFile::from_json(&text).map_err(|source| LoadError::Decode {
            path: located.clone(),
            source,
        })?;
        debug!(path = %located.display(), statements = file.statements.len(), "loaded source");
        let file = Arc::new(file);
        self.cache.insert(key, Arc::clone(&file));
        Ok(file)
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| normalize(path))
    }
}

/// Sources registered up front, keyed by normalized path.
#[derive(Default, Clone)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, Arc<SourceFile>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, file: SourceFile) {
        self.files.insert(normalize(path.as_ref()), Arc::new(file));
    }

    pub fn with(mut self, path: impl AsRef<Path>, file: SourceFile) -> Self {
        self.insert(path, file);
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn load(&self, path: &Path) -> Result<Arc<SourceFile>, LoadError> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| LoadError::Missing(path.to_path_buf()))
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
