// Command line surface: arguments, URL input loading, interactive format prompt

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::Settings;
use crate::downloader::format_selector::{FormatMenu, FormatSelector, MenuPick, DEFAULT_SELECTOR};
use crate::downloader::models::{dedup_urls, MediaDescriptor};
use crate::downloader::traits::FormatChooser;

#[derive(Parser, Debug)]
#[command(name = "media-grabber")]
#[command(author, version, about = "Download videos and images from arbitrary URLs", long_about = None)]
pub struct Cli {
    /// URLs, a file with one URL per line, a directory containing links.txt, or `links`
    pub inputs: Vec<String>,

    /// Overwrite existing files instead of picking a unique name
    #[arg(long)]
    pub force_overwrite: bool,

    /// Videos root
    #[arg(long)]
    pub videos_dir: Option<PathBuf>,

    /// Images root
    #[arg(long)]
    pub images_dir: Option<PathBuf>,

    /// Directory for vd_downloads.jsonl / vd_downloads.txt
    #[arg(long)]
    pub summary_dir: Option<PathBuf>,

    /// Netscape cookie file passed to the backend
    #[arg(short, long)]
    pub cookies: Option<PathBuf>,

    /// Never ask for a format
    #[arg(long)]
    pub batch: bool,

    /// Run yt-dlp as a Python module instead of the native binary
    #[arg(long)]
    pub python: bool,

    /// Print external tool status and exit
    #[arg(long)]
    pub tools: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Environment settings with command line overrides on top
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if self.force_overwrite {
            settings = settings.with_force_overwrite(true);
        }
        if let Some(dir) = &self.videos_dir {
            settings = settings.with_videos_dir(dir);
        }
        if let Some(dir) = &self.images_dir {
            settings = settings.with_images_dir(dir);
        }
        if let Some(dir) = &self.summary_dir {
            settings = settings.with_summary_dir(dir);
        }
        if let Some(path) = &self.cookies {
            settings = settings.with_cookie_file(path);
        }
        settings
    }
}

/// URLs from one raw input, and whether it came from a file (batch mode)
pub fn load_urls(input: &str) -> (Vec<String>, bool) {
    load_urls_with_home(input, dirs::home_dir().as_deref())
}

pub fn load_urls_with_home(input: &str, home: Option<&Path>) -> (Vec<String>, bool) {
    let trimmed = input.trim();
    let expanded = match (trimmed.eq_ignore_ascii_case("links"), home) {
        (true, Some(home)) => home.join("links.txt").to_string_lossy().to_string(),
        _ => trimmed.to_string(),
    };
    let s = expanded.trim().trim_matches('"').trim_matches('\'');
    if s.is_empty() {
        return (Vec::new(), false);
    }

    let path = Path::new(s);
    if path.is_file() {
        return (read_url_file(path).unwrap_or_else(|| vec![s.to_string()]), true);
    }
    if path.is_dir() {
        let candidate = path.join("links.txt");
        if candidate.is_file() {
            return (read_url_file(&candidate).unwrap_or_else(|| vec![s.to_string()]), true);
        }
        return (vec![s.to_string()], false);
    }
    if looks_like_local_path(s) {
        return (vec![s.to_string()], false);
    }

    let urls = s
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    (urls, false)
}

/// Every CLI input expanded; any file input makes the whole run a batch
pub fn collect_urls(inputs: &[String]) -> (Vec<String>, bool) {
    let mut urls = Vec::new();
    let mut batch = false;
    for input in inputs {
        let (found, from_file) = load_urls(input);
        urls.extend(found);
        batch |= from_file;
    }
    (dedup_urls(urls), batch)
}

fn read_url_file(path: &Path) -> Option<Vec<String>> {
    let text = std::fs::read_to_string(path).ok()?;
    Some(
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect(),
    )
}

fn looks_like_local_path(s: &str) -> bool {
    if s.contains("://") {
        return false;
    }
    let bytes = s.as_bytes();
    let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    s.contains('\\') || s.starts_with('/') || s.starts_with("./") || drive
}

/// Walk the operator through the format menu; `ask` shows a prompt and returns the answer
pub fn prompt_format(menu: &FormatMenu, mut ask: impl FnMut(&str) -> String) -> String {
    match menu.pick(&ask(&format!("{}\nEnter choice (number / Enter): ", menu.render()))) {
        MenuPick::Default => DEFAULT_SELECTOR.to_string(),
        MenuPick::Direct(id) => id,
        MenuPick::NeedsAudio { video_id } => {
            if menu.audio_tracks.is_empty() {
                return FormatSelector::with_best_audio(&video_id);
            }
            let prompt = format!(
                "\nMultiple audio tracks available. You may choose one to merge with the selected video.\n\
                 Press Enter to use best audio automatically.\n{}\nEnter audio number to merge (Enter = best audio): ",
                menu.render_audio_tracks()
            );
            menu.merge_audio(&video_id, &ask(&prompt))
        }
        MenuPick::NeedsConfirmation {
            audio_id,
            label,
            size,
        } => {
            let answer = ask(&format!(
                "\nYou selected audio-only: {} ({}). Download audio only? (y/N): ",
                label, size
            ));
            if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                audio_id
            } else {
                println!("Canceled audio-only choice; defaulting to {}", DEFAULT_SELECTOR);
                DEFAULT_SELECTOR.to_string()
            }
        }
    }
}

/// Reads answers from stdin
pub struct StdinFormatChooser;

impl FormatChooser for StdinFormatChooser {
    fn choose(&self, descriptor: &MediaDescriptor) -> Option<String> {
        let menu = FormatSelector::build_menu(descriptor);
        if menu.is_empty() {
            return None;
        }
        Some(prompt_format(&menu, |prompt| {
            print!("{}", prompt);
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            line
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::FormatVariant;
    use std::collections::VecDeque;

    #[test]
    fn test_split_free_form_input() {
        let (urls, batch) = load_urls_with_home(
            "https://a.example/1, https://b.example/2\nhttps://c.example/3",
            None,
        );
        assert_eq!(urls.len(), 3);
        assert!(!batch);
    }

    #[test]
    fn test_url_file_is_batch() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("list.txt");
        std::fs::write(&file, "https://a.example/1\n\n# note\n  https://b.example/2  \n").unwrap();

        let (urls, batch) = load_urls_with_home(file.to_str().unwrap(), None);
        assert_eq!(urls, vec!["https://a.example/1", "https://b.example/2"]);
        assert!(batch);
    }

    #[test]
    fn test_directory_and_links_alias() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join("links.txt"), "https://x.example/v.mp4\n").unwrap();

        let (from_dir, batch) = load_urls_with_home(home.path().to_str().unwrap(), None);
        assert_eq!(from_dir, vec!["https://x.example/v.mp4"]);
        assert!(batch);

        let (from_alias, _) = load_urls_with_home("links", Some(home.path()));
        assert_eq!(from_alias, from_dir);
    }

    #[test]
    fn test_missing_path_is_kept_verbatim() {
        let (urls, batch) = load_urls_with_home("/no/such/list.txt", None);
        assert_eq!(urls, vec!["/no/such/list.txt"]);
        assert!(!batch);
    }

    fn menu() -> FormatMenu {
        let f = |id: &str, v: bool, a: bool| FormatVariant {
            format_id: id.to_string(),
            has_video: v,
            has_audio: a,
            label: id.to_string(),
            approx_size: Some(1_000_000),
            fps: None,
        };
        FormatSelector::build_menu(&MediaDescriptor {
            formats: vec![f("18", true, true), f("137", true, false), f("140", false, true)],
            ..Default::default()
        })
    }

    fn answers(list: &[&str]) -> impl FnMut(&str) -> String {
        let mut queue: VecDeque<String> = list.iter().map(|s| s.to_string()).collect();
        move |_prompt| queue.pop_front().unwrap_or_default()
    }

    #[test]
    fn test_prompt_paths() {
        let menu = menu();
        assert_eq!(prompt_format(&menu, answers(&[""])), DEFAULT_SELECTOR);
        assert_eq!(prompt_format(&menu, answers(&["1"])), "18");
        assert_eq!(prompt_format(&menu, answers(&["2", "1"])), "137+140");
        assert_eq!(prompt_format(&menu, answers(&["2", ""])), "137+bestaudio/best");
        assert_eq!(prompt_format(&menu, answers(&["3", "y"])), "140");
        assert_eq!(prompt_format(&menu, answers(&["3", "n"])), DEFAULT_SELECTOR);
    }
}
