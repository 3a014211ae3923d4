// Process-level settings: canonical roots, summary files, overwrite policy, cookies
//
// Layering: built-in defaults, then environment (VD_*), then CLI overrides through `with_*`.

use std::path::{Path, PathBuf};

use crate::downloader::placement::CanonicalRoots;

/// Cookie files looked up in the working directory, in order
const COOKIE_CANDIDATES: &[&str] = &["cookies.txt", "yt_cookies.txt"];
/// Environment variables naming a cookie file, in order
const COOKIE_ENV: &[&str] = &["YDLP_COOKIEFILE", "YT_COOKIES"];

#[derive(Debug, Clone)]
pub struct Settings {
    pub videos_dir: PathBuf,
    pub images_dir: PathBuf,
    pub summary_jsonl: PathBuf,
    pub summary_txt: PathBuf,
    /// Where verbose backend traces are written
    pub diagnostics_dir: PathBuf,
    pub force_overwrite: bool,
    pub cookie_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let videos_dir = dirs::video_dir()
            .map(|d| d.join("video downloads"))
            .unwrap_or_else(|| PathBuf::from("downloads").join("videos"));
        let images_dir = dirs::picture_dir()
            .map(|d| d.join("picture downloads"))
            .unwrap_or_else(|| PathBuf::from("downloads").join("images"));
        Self {
            videos_dir,
            images_dir,
            summary_jsonl: PathBuf::from("vd_downloads.jsonl"),
            summary_txt: PathBuf::from("vd_downloads.txt"),
            diagnostics_dir: PathBuf::from("."),
            force_overwrite: false,
            cookie_file: None,
        }
    }
}

impl Settings {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Self {
        Self::from_vars(Path::new("."), |key| std::env::var(key).ok())
    }

    /// Defaults overlaid with `vars`; cookie candidates are looked up under `cwd`
    pub fn from_vars(cwd: &Path, vars: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(flag) = vars("VD_FORCE_OVERWRITE") {
            settings.force_overwrite = is_truthy(&flag);
        }
        if let Some(dir) = non_empty(vars("VD_VIDEOS_DIR")) {
            settings.videos_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty(vars("VD_IMAGES_DIR")) {
            settings.images_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty(vars("VD_SUMMARY_DIR")) {
            let dir = PathBuf::from(dir);
            settings.summary_jsonl = dir.join("vd_downloads.jsonl");
            settings.summary_txt = dir.join("vd_downloads.txt");
        }

        settings.cookie_file = COOKIE_CANDIDATES
            .iter()
            .map(|name| cwd.join(name))
            .chain(
                COOKIE_ENV
                    .iter()
                    .filter_map(|key| non_empty(vars(key)))
                    .map(PathBuf::from),
            )
            .find(|p| p.is_file());

        settings
    }

    pub fn with_videos_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.videos_dir = dir.into();
        self
    }

    pub fn with_images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.images_dir = dir.into();
        self
    }

    pub fn with_summary_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.summary_jsonl = dir.as_ref().join("vd_downloads.jsonl");
        self.summary_txt = dir.as_ref().join("vd_downloads.txt");
        self
    }

    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = dir.into();
        self
    }

    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_file = Some(path.into());
        self
    }

    pub fn roots(&self) -> CanonicalRoots {
        CanonicalRoots::new(&self.videos_dir, &self.images_dir)
    }

    /// Create both canonical roots
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.videos_dir)?;
        std::fs::create_dir_all(&self.images_dir)?;
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "True" | "YES" | "yes")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
