//! Run configuration

use std::path::{Path, PathBuf};

/// Longest side, in pixels, a texture may keep without being downsized.
pub const MAX_TEXTURE_DIMENSION: u32 = 1024;

/// Everything a preprocessing run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepConfig {
    /// Root of the asset tree to process.
    pub root: PathBuf,
    /// Delete original PNGs once their JPEGs and material references exist.
    pub purge: bool,
    /// Oversize threshold; textures larger than this on either side are downsized.
    pub max_dimension: u32,
}

impl PrepConfig {
    pub fn new(root: impl Into<PathBuf>, purge: bool) -> Self {
        Self {
            root: root.into(),
            purge,
            max_dimension: MAX_TEXTURE_DIMENSION,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self::new(".", false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrepConfig::default();
        assert_eq!(config.root, PathBuf::from("."));
        assert!(!config.purge);
        assert_eq!(config.max_dimension, 1024);
    }

    #[test]
    fn test_new_keeps_policy_threshold() {
        let config = PrepConfig::new("assets", true);
        assert_eq!(config.root(), Path::new("assets"));
        assert!(config.purge);
        assert_eq!(config.max_dimension, MAX_TEXTURE_DIMENSION);
    }
}
