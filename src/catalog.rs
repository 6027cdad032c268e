use std::collections::HashSet;
use std::fs;
use std::ops::Index;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("images directory {0} does not exist")]
    Missing(PathBuf),
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One image file in the catalog. Identity is the absolute path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageRef {
    path: PathBuf,
}

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Immutable, ordered list of images for one session. Indices `0..len` are
/// the only addressing scheme the viewer uses.
#[derive(Debug)]
pub struct Catalog {
    root: PathBuf,
    images: Vec<ImageRef>,
}

impl Catalog {
    /// Recursively collect recognised images under `root`, sorted by full path.
    pub fn scan(root: &Path, follow_links: bool) -> Result<Self, ScanError> {
        if !root.exists() {
            return Err(ScanError::Missing(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }
        let root = fs::canonicalize(root).map_err(|source| ScanError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;

        log::info!("Scanning {}...", root.display());
        let start_time = Instant::now();

        // The root itself must be listable; unreadable subdirectories are skipped.
        let entries = fs::read_dir(&root).map_err(|source| ScanError::Unreadable {
            path: root.clone(),
            source,
        })?;
        let mut paths = Vec::new();
        let mut visited = HashSet::from([root.clone()]);
        collect_entries(entries, follow_links, &mut visited, &mut paths);
        paths.sort();

        let images: Vec<ImageRef> = paths.into_iter().map(ImageRef::new).collect();
        log::info!(
            "Scan complete in {:.2}s. Found {} images.",
            start_time.elapsed().as_secs_f64(),
            images.len()
        );

        Ok(Self { root, images })
    }

    /// Build a catalog from an already-known list, keeping the given order.
    #[cfg(test)]
    pub fn from_refs(root: impl Into<PathBuf>, images: Vec<ImageRef>) -> Self {
        Self {
            root: root.into(),
            images,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ImageRef> {
        self.images.get(idx)
    }
}

impl Index<usize> for Catalog {
    type Output = ImageRef;

    fn index(&self, idx: usize) -> &ImageRef {
        &self.images[idx]
    }
}

/// `visited` holds canonical directory paths so a linked loop is entered once.
fn collect_entries(
    entries: fs::ReadDir,
    follow_links: bool,
    visited: &mut HashSet<PathBuf>,
    dest: &mut Vec<PathBuf>,
) {
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(ft) = entry.file_type() else {
            continue;
        };

        if ft.is_symlink() && !follow_links {
            continue;
        }

        let p = entry.path();
        if p.is_file() {
            if is_image_file(&p) {
                dest.push(p);
            }
        } else if p.is_dir() {
            let canonical = match fs::canonicalize(&p) {
                Ok(canonical) => canonical,
                Err(e) => {
                    log::warn!("Skipping {}: {}", p.display(), e);
                    continue;
                }
            };
            if !visited.insert(canonical) {
                log::debug!("Skipping already scanned {}", p.display());
                continue;
            }
            match fs::read_dir(&p) {
                Ok(sub) => collect_entries(sub, follow_links, visited, dest),
                Err(e) => log::warn!("Skipping {}: {}", p.display(), e),
            }
        }
    }
}
