//! Path management for Inkpost configuration files.
//!
//! ```text
//! ~/.config/inkpost/         # Config directory (platform config dir)
//! └── config.toml            # Application configuration
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "inkpost";
const CONFIG_FILE: &str = "config.toml";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Config directory could not be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find config directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for inkpost_core::InkpostError {
    fn from(err: PathError) -> Self {
        inkpost_core::InkpostError::config(err.to_string())
    }
}

pub struct InkpostPaths {
    base_override: Option<PathBuf>,
}

impl InkpostPaths {
    /// Creates a resolver. `base` replaces the platform config directory,
    /// which tests use to point at a temporary directory.
    pub fn new(base: Option<PathBuf>) -> Self {
        Self {
            base_override: base,
        }
    }

    /// Returns the Inkpost configuration directory.
    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base_override {
            Some(base) => Ok(base.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(PathError::ConfigDirNotFound),
        }
    }

    /// Returns the path to the main configuration file.
    pub fn config_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_base() {
        let paths = InkpostPaths::new(Some(PathBuf::from("/tmp/inkpost-test")));
        assert_eq!(
            paths.config_file().unwrap(),
            PathBuf::from("/tmp/inkpost-test/config.toml")
        );
    }
}
