//! asset-prep library
//!
//! Texture preprocessing for OBJ asset trees: downsizes oversized textures,
//! converts PNG textures to JPEG, repoints `.mtl` texture references at the
//! converted files and optionally purges the original PNGs.

pub mod config;
pub mod error;
pub mod material;
pub mod pipeline;
pub mod texture;

pub use config::{PrepConfig, MAX_TEXTURE_DIMENSION};
pub use error::{PrepError, Result};
pub use material::{rewrite_materials, RewriteManifest};
pub use pipeline::{run, FileOutcome, PipelineReport, SkipReason};
pub use texture::{is_power_of_two, normalize, NormalizeAction, Normalized};
