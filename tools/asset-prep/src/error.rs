//! Error types for texture preprocessing

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing a single asset or walking the tree.
#[derive(Debug, Error)]
pub enum PrepError {
    /// A PNG would be converted onto a JPEG that is already on disk.
    #[error("{} already exists, refusing to overwrite it with {}", .existing.display(), .source_path.display())]
    Collision {
        source_path: PathBuf,
        existing: PathBuf,
    },

    #[error("Unsupported texture format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Failed to process image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),
}

impl PrepError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a recoverable skip rather than a failure.
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::Collision { .. })
    }
}

pub type Result<T> = std::result::Result<T, PrepError>;
