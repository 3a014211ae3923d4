// Canonical placement: videos under the videos root, images under the images root

use std::path::{Path, PathBuf};

use super::errors::DownloadError;
use super::models::{MediaClass, ResolvedFile};
use super::utils::unique_path;

#[derive(Debug, Clone)]
pub struct CanonicalRoots {
    pub videos: PathBuf,
    pub images: PathBuf,
}

impl CanonicalRoots {
    pub fn new(videos: impl Into<PathBuf>, images: impl Into<PathBuf>) -> Self {
        Self {
            videos: videos.into(),
            images: images.into(),
        }
    }

    pub fn root_for(&self, class: MediaClass) -> &Path {
        match class {
            MediaClass::Video => &self.videos,
            MediaClass::Image => &self.images,
        }
    }
}

fn is_under(path: &Path, root: &Path) -> bool {
    let canon = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    let parent = path.parent().map(canon).unwrap_or_default();
    parent.starts_with(canon(root))
}

/// Move `file` under the root for its class. Never fails: a failed move leaves the
/// file where it was, and it is still finalized and reported at that path.
pub fn place(file: &mut ResolvedFile, roots: &CanonicalRoots, allow_overwrite: bool) {
    let root = roots.root_for(file.class);

    if !is_under(&file.path, root) {
        match move_into(&file.path, root, allow_overwrite) {
            Ok(target) => {
                tracing::info!(from = %file.path.display(), to = %target.display(), "moved into canonical root");
                file.relocate(target);
            }
            Err(e) => {
                tracing::warn!(
                    path = %file.path.display(),
                    root = %root.display(),
                    error = %e,
                    "placement failed, keeping original location"
                );
            }
        }
    }

    file.finalized = true;
}

fn move_into(path: &Path, root: &Path, allow_overwrite: bool) -> Result<PathBuf, DownloadError> {
    std::fs::create_dir_all(root)?;
    let name = path
        .file_name()
        .ok_or_else(|| DownloadError::Io(format!("no file name in {}", path.display())))?;
    let target = root.join(name);
    let target = if allow_overwrite { target } else { unique_path(&target) };

    if std::fs::rename(path, &target).is_err() {
        copy_across(path, &target)?;
        std::fs::remove_file(path)?;
    }
    Ok(target)
}

/// Cross-device move: copy next to `target`, then swap it in. A failure only
/// removes the staging copy, so an existing `target` survives.
fn copy_across(path: &Path, target: &Path) -> Result<(), DownloadError> {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    let staging = target.with_file_name(name);

    let copied = std::fs::copy(path, &staging).and_then(|_| std::fs::rename(&staging, target));
    if let Err(e) = copied {
        let _ = std::fs::remove_file(&staging);
        return Err(e.into());
    }
    Ok(())
}
