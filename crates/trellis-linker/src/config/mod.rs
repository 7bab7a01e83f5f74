//! Project configuration (`trellis.toml`)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "trellis.toml";

/// `[project]` and `[paths]` tables. Other tables are ignored here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    /// `owner/name`, used to rewrite package-qualified imports.
    #[serde(default)]
    pub package: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsSection {
    /// Project root. Relative entries below are joined onto it.
    #[serde(default)]
    pub root: PathBuf,
    #[serde(default = "default_src")]
    pub src: PathBuf,
    #[serde(default = "default_modules")]
    pub modules: PathBuf,
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_modules() -> PathBuf {
    PathBuf::from(".ato/modules")
}

impl Default for PathsSection {
    fn default() -> Self {
        PathsSection {
            root: PathBuf::new(),
            src: default_src(),
            modules: default_modules(),
        }
    }
}

fn is_package_identifier(candidate: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*/[A-Za-z0-9][A-Za-z0-9_.-]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(candidate))
}

impl ProjectConfig {
    /// Parse and validate a config document.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: ProjectConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`. A relative `[paths] root` is taken relative to the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.paths.root = base.join(&config.paths.root);
        Ok(config)
    }

    /// Load `trellis.toml` from `root` if present, defaults otherwise.
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::with_root(root))
        }
    }

    pub fn with_root(root: &Path) -> Self {
        let mut config = Self::default();
        config.paths.root = root.to_path_buf();
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.project.package {
            Some(package) if !is_package_identifier(package) => {
                Err(ConfigError::InvalidPackage(package.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn src_dir(&self) -> PathBuf {
        self.paths.root.join(&self.paths.src)
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.paths.root.join(&self.paths.modules)
    }

    pub fn package(&self) -> Option<&str> {
        self.project.package.as_deref()
    }
}
