//! Three-phase preprocessing pipeline
//!
//! The tree is scanned once up front. Phases then run strictly in order:
//! normalize every texture, rewrite every material, and (optionally) purge
//! the original PNGs. Each phase returns a manifest that the next one consumes,
//! so the purge only deletes PNGs the normalizer has already dealt with.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::PrepConfig;
use crate::error::PrepError;
use crate::material::{self, RewriteManifest};
use crate::texture::{self, Normalized, TextureKind};

/// Why a file was deliberately left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The JPEG this PNG would be converted to already exists.
    JpegExists(PathBuf),
}

/// Outcome of one file in one phase.
#[derive(Debug)]
pub enum FileOutcome<T> {
    Processed(T),
    Skipped(SkipReason),
    Failed(PrepError),
}

impl<T> FileOutcome<T> {
    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A folder and the textures directly inside it, as seen at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFolder {
    pub path: PathBuf,
    pub textures: Vec<PathBuf>,
}

impl AssetFolder {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            textures: Vec::new(),
        }
    }
}

/// Snapshot of the asset tree taken before anything is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetScan {
    /// Every nested subfolder in walk order, followed by the root itself.
    pub folders: Vec<AssetFolder>,
    /// Every material file anywhere under the root.
    pub materials: Vec<PathBuf>,
    /// Entries the walk could not read; their contents were not scanned.
    pub unreadable: Vec<PathBuf>,
}

impl AssetScan {
    pub fn texture_count(&self) -> usize {
        self.folders.iter().map(|f| f.textures.len()).sum()
    }
}

/// Walk `root` without following directory links.
///
/// Unreadable entries are logged and returned alongside the readable ones
/// instead of ending the walk.
pub(crate) fn walk_tree(root: &Path) -> (Vec<DirEntry>, Vec<(PathBuf, PrepError)>) {
    let mut entries = Vec::new();
    let mut unreadable = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        match entry {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                let err = PrepError::from(err);
                tracing::warn!("{}. Skipping...", err);
                unreadable.push((path, err));
            }
        }
    }

    (entries, unreadable)
}

/// Whether a walked entry is a regular file, following file links.
pub(crate) fn is_file_entry(entry: &DirEntry) -> bool {
    !entry.file_type().is_dir() && entry.path().is_file()
}

/// Walk `root` once and record its folders, textures and materials.
pub fn scan_tree(root: &Path) -> AssetScan {
    let mut folders = Vec::new();
    let mut folder_index: HashMap<PathBuf, usize> = HashMap::new();
    let mut root_folder = AssetFolder::new(root);
    let mut materials = Vec::new();

    let (entries, unreadable) = walk_tree(root);

    for entry in entries {
        if entry.depth() == 0 {
            continue;
        }

        let path = entry.path();

        if entry.file_type().is_dir() {
            folder_index.insert(path.to_path_buf(), folders.len());
            folders.push(AssetFolder::new(path));
        } else if is_file_entry(&entry) {
            if TextureKind::from_path(path).is_some() {
                let index = path
                    .parent()
                    .and_then(|parent| folder_index.get(parent))
                    .copied();
                let folder = match index {
                    Some(i) => &mut folders[i],
                    None => &mut root_folder,
                };
                folder.textures.push(path.to_path_buf());
            } else if material::is_material(path) {
                materials.push(path.to_path_buf());
            }
        }
    }

    // Root textures are only handled after all subfolders
    folders.push(root_folder);

    AssetScan {
        folders,
        materials,
        unreadable: unreadable.into_iter().map(|(path, _)| path).collect(),
    }
}

/// Per-texture outcomes of the normalize phase.
#[derive(Debug, Default)]
pub struct NormalizeManifest {
    pub outcomes: Vec<(PathBuf, FileOutcome<Normalized>)>,
}

impl NormalizeManifest {
    pub fn processed(&self) -> usize {
        self.count(FileOutcome::is_processed)
    }

    pub fn skipped(&self) -> usize {
        self.count(FileOutcome::is_skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(FileOutcome::is_failed)
    }

    fn count(&self, pred: impl Fn(&FileOutcome<Normalized>) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    /// PNGs that now have a JPEG counterpart on disk.
    pub fn purge_candidates(&self) -> impl Iterator<Item = &Path> {
        self.outcomes.iter().filter_map(|(path, outcome)| {
            let is_png = TextureKind::from_path(path) == Some(TextureKind::Png);
            let has_jpeg = matches!(
                outcome,
                FileOutcome::Processed(_) | FileOutcome::Skipped(SkipReason::JpegExists(_))
            );
            (is_png && has_jpeg).then_some(path.as_path())
        })
    }
}

/// Normalize the textures of a single folder.
pub fn normalize_folder(
    folder: &AssetFolder,
    max_dimension: u32,
) -> Vec<(PathBuf, FileOutcome<Normalized>)> {
    tracing::debug!("Normalizing textures in {}", folder.path.display());

    folder
        .textures
        .iter()
        .map(|path| {
            let outcome = match texture::normalize(path, max_dimension) {
                Ok(normalized) => FileOutcome::Processed(normalized),
                Err(PrepError::Collision { existing, .. }) => {
                    tracing::warn!("{} already exists. Skipping...", existing.display());
                    FileOutcome::Skipped(SkipReason::JpegExists(existing))
                }
                Err(err) => {
                    tracing::error!("{}", err);
                    FileOutcome::Failed(err)
                }
            };
            (path.clone(), outcome)
        })
        .collect()
}

/// Phase 1: normalize every scanned texture.
pub fn normalize_phase(scan: &AssetScan, max_dimension: u32) -> NormalizeManifest {
    let outcomes = scan
        .folders
        .iter()
        .flat_map(|folder| normalize_folder(folder, max_dimension))
        .collect();
    NormalizeManifest { outcomes }
}

/// Phase 2: rewrite every scanned material file.
pub fn rewrite_phase(scan: &AssetScan) -> RewriteManifest {
    material::rewrite_material_files(&scan.materials)
}

/// Per-file outcomes of the purge phase.
#[derive(Debug, Default)]
pub struct PurgeManifest {
    /// Set when the purge was not attempted because a material rewrite or the scan failed.
    pub withheld: bool,
    pub outcomes: Vec<(PathBuf, FileOutcome<()>)>,
}

impl PurgeManifest {
    pub fn deleted(&self) -> impl Iterator<Item = &Path> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_processed())
            .map(|(path, _)| path.as_path())
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failed()).count()
    }
}

/// Phase 3: delete the PNGs the normalizer has replaced.
///
/// Nothing is deleted if any material file could not be rewritten, or if part
/// of the tree could not be scanned, since a material there may still
/// reference one of the PNGs.
pub fn purge_phase(
    scan: &AssetScan,
    normalized: &NormalizeManifest,
    rewritten: &RewriteManifest,
) -> PurgeManifest {
    let withheld = PurgeManifest {
        withheld: true,
        outcomes: Vec::new(),
    };

    if !scan.unreadable.is_empty() {
        tracing::warn!(
            "Not purging PNG files: {} path(s) could not be scanned",
            scan.unreadable.len()
        );
        return withheld;
    }

    let stale_materials = rewritten.failed();
    if stale_materials > 0 {
        tracing::warn!(
            "Not purging PNG files: {} material file(s) could not be updated",
            stale_materials
        );
        return withheld;
    }

    let outcomes = normalized
        .purge_candidates()
        .map(|png| {
            let outcome = match fs::remove_file(png) {
                Ok(()) => {
                    tracing::info!("Deleted {}", png.display());
                    FileOutcome::Processed(())
                }
                Err(e) => {
                    let err = PrepError::io(png, e);
                    tracing::error!("{}", err);
                    FileOutcome::Failed(err)
                }
            };
            (png.to_path_buf(), outcome)
        })
        .collect();

    PurgeManifest {
        withheld: false,
        outcomes,
    }
}

/// Everything a run did, phase by phase.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Paths the scan could not read.
    pub unreadable: Vec<PathBuf>,
    pub normalized: NormalizeManifest,
    pub rewritten: RewriteManifest,
    /// `None` when purging was not requested.
    pub purged: Option<PurgeManifest>,
}

impl PipelineReport {
    pub fn materials_rewritten(&self) -> usize {
        self.rewritten.rewritten().count()
    }

    pub fn purged(&self) -> usize {
        self.purged.as_ref().map_or(0, |p| p.deleted().count())
    }

    /// Failed files across all phases, including unreadable paths.
    pub fn failed(&self) -> usize {
        self.unreadable.len()
            + self.normalized.failed()
            + self.rewritten.failed()
            + self.purged.as_ref().map_or(0, PurgeManifest::failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Run the full pipeline described by `config`.
pub fn run(config: &PrepConfig) -> PipelineReport {
    let scan = scan_tree(config.root());
    tracing::info!(
        "Found {} texture(s) in {} folder(s) and {} material file(s) under {}",
        scan.texture_count(),
        scan.folders.len(),
        scan.materials.len(),
        config.root().display()
    );

    let normalized = normalize_phase(&scan, config.max_dimension);
    let rewritten = rewrite_phase(&scan);
    let purged = config
        .purge
        .then(|| purge_phase(&scan, &normalized, &rewritten));

    PipelineReport {
        unreadable: scan.unreadable,
        normalized,
        rewritten,
        purged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::NormalizeAction;
    use image::GenericImageView;
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_scan_tree_orders_root_last() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/nested")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        write_png(&root.join("top.png"), 2, 2);
        write_png(&root.join("a/one.png"), 2, 2);
        write_png(&root.join("a/nested/two.png"), 2, 2);
        fs::write(root.join("b/mat.mtl"), "map_Kd x.png\n").unwrap();
        fs::write(root.join("b/readme.txt"), "hello").unwrap();

        let scan = scan_tree(root);
        let paths: Vec<_> = scan.folders.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                root.join("a"),
                root.join("a/nested"),
                root.join("b"),
                root.to_path_buf()
            ]
        );
        assert_eq!(scan.folders[0].textures, vec![root.join("a/one.png")]);
        assert_eq!(scan.folders[1].textures, vec![root.join("a/nested/two.png")]);
        assert!(scan.folders[2].textures.is_empty());
        assert_eq!(scan.folders[3].textures, vec![root.join("top.png")]);
        assert_eq!(scan.materials, vec![root.join("b/mat.mtl")]);
        assert_eq!(scan.texture_count(), 3);
    }

    #[test]
    fn test_converted_jpegs_are_not_renormalized() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("wood.png"), 4, 4);

        let scan = scan_tree(dir.path());
        let manifest = normalize_phase(&scan, 1024);

        assert_eq!(manifest.outcomes.len(), 1);
        assert_eq!(manifest.processed(), 1);
        assert!(dir.path().join("wood.jpg").exists());
    }

    #[test]
    fn test_collision_is_skipped_and_run_continues() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_png(&root.join("a.png"), 4, 4);
        image::RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 0]))
            .save(root.join("a.jpg"))
            .unwrap();
        write_png(&root.join("b.png"), 4, 4);

        let scan = scan_tree(root);
        let manifest = normalize_phase(&scan, 1024);

        assert_eq!(manifest.skipped(), 1);
        // a.jpg is already optimal, b.png converted
        assert_eq!(manifest.processed(), 2);
        assert_eq!(image::open(root.join("a.jpg")).unwrap().dimensions(), (2, 2));

        let candidates: Vec<_> = manifest.purge_candidates().collect();
        assert_eq!(candidates, vec![root.join("a.png"), root.join("b.png")]);
    }

    #[test]
    fn test_failed_png_is_never_purged() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("broken.png"), b"garbage").unwrap();
        write_png(&root.join("good.png"), 4, 4);

        let report = run(&PrepConfig::new(root, true));

        assert_eq!(report.normalized.failed(), 1);
        assert!(report.has_failures());
        assert!(root.join("broken.png").exists());
        assert!(!root.join("good.png").exists());
        assert!(root.join("good.jpg").exists());
        assert_eq!(report.purged(), 1);
    }

    #[test]
    fn test_purge_withheld_when_material_rewrite_fails() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_png(&root.join("wood.png"), 4, 4);

        let scan = scan_tree(root);
        let normalized = normalize_phase(&scan, 1024);
        let rewritten = material::rewrite_material_files(&[root.join("gone.mtl")]);

        let purged = purge_phase(&scan, &normalized, &rewritten);
        assert!(purged.withheld);
        assert_eq!(purged.deleted().count(), 0);
        assert!(root.join("wood.png").exists());
    }

    #[test]
    fn test_run_without_purge_keeps_pngs() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        write_png(&root.join("sub/wide.png"), 128, 32);
        fs::write(root.join("sub/mat.mtl"), "map_Kd wide.png\n").unwrap();

        let mut config = PrepConfig::new(root, false);
        config.max_dimension = 64;
        let report = run(&config);

        assert!(report.purged.is_none());
        assert!(!report.has_failures());
        assert_eq!(report.materials_rewritten(), 1);
        assert!(root.join("sub/wide.png").exists());

        let (_, outcome) = &report.normalized.outcomes[0];
        match outcome {
            FileOutcome::Processed(n) => assert_eq!(n.action, NormalizeAction::Resized),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            image::open(root.join("sub/wide.jpg")).unwrap().dimensions(),
            (64, 16)
        );
        assert_eq!(
            fs::read_to_string(root.join("sub/mat.mtl")).unwrap(),
            "map_Kd wide.jpg\n"
        );
    }

    #[test]
    fn test_missing_root_is_reported_as_unreadable() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("missing");

        let scan = scan_tree(&root);
        assert_eq!(scan.unreadable, vec![root.clone()]);
        assert_eq!(scan.texture_count(), 0);

        let report = run(&PrepConfig::new(&root, true));
        assert!(report.has_failures());
        assert_eq!(report.failed(), 1);
        assert!(report.purged.unwrap().withheld);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_folder_does_not_stop_run() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let root = dir.path();
        let locked = root.join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::create_dir_all(root.join("ok")).unwrap();
        write_png(&locked.join("hidden.png"), 4, 4);
        write_png(&root.join("ok/a.png"), 4, 4);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Permission bits do not stop a privileged user from listing the folder
        let enforced = fs::read_dir(&locked).is_err();

        let report = run(&PrepConfig::new(root, true));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(root.join("ok/a.jpg").exists());
        if enforced {
            assert_eq!(report.unreadable, vec![locked.clone()]);
            assert!(report.has_failures());
            assert!(report.purged.as_ref().unwrap().withheld);
            assert!(root.join("ok/a.png").exists());
            assert!(locked.join("hidden.png").exists());
        } else {
            assert!(report.unreadable.is_empty());
            assert!(!root.join("ok/a.png").exists());
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_scanned() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let shared = dir.path().join("shared");
        let root = dir.path().join("assets");
        fs::create_dir_all(&shared).unwrap();
        fs::create_dir_all(&root).unwrap();
        write_png(&shared.join("wood.png"), 4, 4);
        fs::write(shared.join("wood.mtl"), "map_Kd wood.png\n").unwrap();
        symlink(shared.join("wood.png"), root.join("wood.png")).unwrap();
        symlink(shared.join("wood.mtl"), root.join("wood.mtl")).unwrap();
        // Linked folders are not descended
        symlink(&shared, root.join("linked")).unwrap();

        let scan = scan_tree(&root);
        assert_eq!(scan.folders.len(), 1);
        assert_eq!(scan.folders[0].textures, vec![root.join("wood.png")]);
        assert_eq!(scan.materials, vec![root.join("wood.mtl")]);
        assert_eq!(material::find_materials(&root), vec![root.join("wood.mtl")]);

        let normalized = normalize_phase(&scan, 1024);
        assert_eq!(normalized.processed(), 1);
        assert!(root.join("wood.jpg").exists());
    }
}
