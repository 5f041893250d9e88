//! Material (.mtl) texture reference rewriting
//!
//! Texture map directives that point at `.png` files are repointed at the
//! `.jpg` files the normalizer produces. Every other line is written back
//! byte-for-byte.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::DirEntry;

use crate::error::{PrepError, Result};
use crate::pipeline::{is_file_entry, walk_tree, FileOutcome};

/// File extension of material files.
pub const MATERIAL_EXTENSION: &str = "mtl";

/// Directives whose argument is a texture path (diffuse, specular exponent, bump).
pub const TEXTURE_DIRECTIVES: [&str; 3] = ["map_Kd", "map_Ns", "map_Bump"];

const PNG_SUFFIX: &str = ".png";
const JPG_SUFFIX: &str = ".jpg";

/// Per-file outcomes of a material rewrite pass.
#[derive(Debug, Default)]
pub struct RewriteManifest {
    pub outcomes: Vec<(PathBuf, FileOutcome<usize>)>,
}

impl RewriteManifest {
    /// Material files that had at least one reference rewritten.
    pub fn rewritten(&self) -> impl Iterator<Item = &Path> {
        self.outcomes.iter().filter_map(|(path, outcome)| match outcome {
            FileOutcome::Processed(changed) if *changed > 0 => Some(path.as_path()),
            _ => None,
        })
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .count()
    }
}

/// Rewrite a single line if it is a texture directive ending in `.png`.
///
/// Returns `None` when the line must stay as it is.
pub fn rewrite_line(line: &str) -> Option<String> {
    let is_directive = TEXTURE_DIRECTIVES
        .iter()
        .any(|directive| line.starts_with(directive));

    if is_directive && line.trim().ends_with(PNG_SUFFIX) {
        Some(line.replacen(PNG_SUFFIX, JPG_SUFFIX, 1))
    } else {
        None
    }
}

/// Rewrite the texture references of one material file in place.
///
/// Returns the number of lines changed. The file is left untouched when no
/// line needs rewriting.
pub fn rewrite_material(path: &Path) -> Result<usize> {
    let content = fs::read_to_string(path).map_err(|e| PrepError::io(path, e))?;

    let mut changed = 0;
    let mut output = String::with_capacity(content.len());
    // split_inclusive keeps each terminator attached, so untouched lines round-trip exactly
    for line in content.split_inclusive('\n') {
        match rewrite_line(line) {
            Some(rewritten) => {
                output.push_str(&rewritten);
                changed += 1;
            }
            None => output.push_str(line),
        }
    }

    if changed > 0 {
        fs::write(path, output).map_err(|e| PrepError::io(path, e))?;
        tracing::info!("Updated {} texture reference(s) in {}", changed, path.display());
    }

    Ok(changed)
}

/// Find every material file anywhere under `root`.
///
/// Unreadable parts of the tree are logged and skipped.
pub fn find_materials(root: &Path) -> Vec<PathBuf> {
    let (entries, _) = walk_tree(root);
    material_paths(entries)
}

fn material_paths(entries: Vec<DirEntry>) -> Vec<PathBuf> {
    entries
        .into_iter()
        .filter(|entry| is_file_entry(entry) && is_material(entry.path()))
        .map(DirEntry::into_path)
        .collect()
}

pub fn is_material(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(MATERIAL_EXTENSION)
}

/// Rewrite each material file, recording a per-file outcome.
pub fn rewrite_material_files(paths: &[PathBuf]) -> RewriteManifest {
    let outcomes = paths
        .iter()
        .map(|path| {
            let outcome = match rewrite_material(path) {
                Ok(changed) => FileOutcome::Processed(changed),
                Err(err) => {
                    tracing::error!("{}", err);
                    FileOutcome::Failed(err)
                }
            };
            (path.clone(), outcome)
        })
        .collect();

    RewriteManifest { outcomes }
}

/// Rewrite every material file under `root`.
///
/// Paths the walk could not read are recorded as failures, since they may
/// hold materials that were left unchanged.
pub fn rewrite_materials(root: &Path) -> RewriteManifest {
    let (entries, unreadable) = walk_tree(root);
    let materials = material_paths(entries);

    let mut manifest = rewrite_material_files(&materials);
    manifest.outcomes.extend(
        unreadable
            .into_iter()
            .map(|(path, err)| (path, FileOutcome::Failed(err))),
    );
    manifest
}
