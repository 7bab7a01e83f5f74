//! Turning import paths into files

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ProjectConfig;
use crate::source::SourceLoader;

/// Ordered list of directories an import path is tried against.
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    extra: Vec<PathBuf>,
    src: PathBuf,
    modules: PathBuf,
    root: PathBuf,
    package: Option<String>,
}

impl SearchPathResolver {
    pub fn new(config: &ProjectConfig) -> Self {
        SearchPathResolver {
            extra: Vec::new(),
            src: config.src_dir(),
            modules: config.modules_dir(),
            root: config.root().to_path_buf(),
            package: config.package().map(str::to_string),
        }
    }

    /// Append a search directory. Duplicates are ignored.
    pub fn add_search_path(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !self.extra.contains(&dir) {
            self.extra.push(dir);
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.extra
    }

    /// Every location `raw` may refer to, most preferred first:
    /// the importing file's directory, extra search paths, project `src`,
    /// the modules directory, the project root, then `owner/pkg/...` rewritten
    /// onto `src` when it names this project's package.
    pub fn candidates(&self, importer_dir: Option<&Path>, raw: &str) -> Vec<PathBuf> {
        let relative = Path::new(raw);
        if relative.is_absolute() {
            return vec![relative.to_path_buf()];
        }

        let mut dirs: Vec<&Path> = Vec::new();
        dirs.extend(importer_dir);
        dirs.extend(self.extra.iter().map(PathBuf::as_path));
        dirs.push(&self.src);
        dirs.push(&self.modules);
        dirs.push(&self.root);

        let mut out: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            let candidate = dir.join(relative);
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        if let Some(rest) = self.package_relative(raw) {
            let candidate = self.src.join(rest);
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    /// The part of `raw` after this project's own `owner/pkg/` prefix.
    pub fn package_relative<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let package = self.package.as_deref()?;
        raw.strip_prefix(package)?.strip_prefix('/')
    }

    /// First candidate the loader knows about.
    pub fn resolve(
        &self,
        loader: &dyn SourceLoader,
        importer_dir: Option<&Path>,
        raw: &str,
    ) -> Option<PathBuf> {
        let found = self
            .candidates(importer_dir, raw)
            .into_iter()
            .find(|c| loader.exists(c));
        debug!(import = raw, found = ?found, "resolved import path");
        found
    }
}

impl Default for SearchPathResolver {
    fn default() -> Self {
        Self::new(&ProjectConfig::default())
    }
}
