// External tool discovery (yt-dlp, ffprobe, curl)

use serde::{Deserialize, Serialize};
use std::process::Command;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffprobe,
    Curl,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffprobe => "ffprobe",
            ToolType::Curl => "curl",
        }
    }

    /// Environment variable that overrides discovery
    fn env_override(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "YTDLP_BIN",
            ToolType::Ffprobe => "FFPROBE_BIN",
            ToolType::Curl => "CURL_BIN",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::Ffprobe => "-version",
            _ => "--version",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path.as_deref().and_then(|p| self.get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffprobe),
            self.get_tool_info(ToolType::Curl),
        ]
    }

    /// Path to the binary, or `None` when it is not installed
    pub fn locate(&self, tool_type: ToolType) -> Option<String> {
        if let Ok(custom) = std::env::var(tool_type.env_override()) {
            if !custom.trim().is_empty() {
                return Some(custom);
            }
        }

        let binary_name = tool_type.as_str();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if std::path::Path::new(&path).exists() {
                return Some(path);
            }
        }

        // 2. Try PATH
        let finder = if cfg!(windows) { "where" } else { "which" };
        if let Ok(output) = Command::new(finder).arg(binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }

        None
    }

    /// Path to the binary, falling back to the bare name so spawn errors surface as ToolNotFound
    pub fn locate_or_name(&self, tool_type: ToolType) -> String {
        self.locate(tool_type)
            .unwrap_or_else(|| tool_type.as_str().to_string())
    }

    fn get_version(&self, path: &str, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                let out = String::from_utf8_lossy(&output.stdout);
                out.lines().next().map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(ToolType::YtDlp.as_str(), "yt-dlp");
        assert_eq!(ToolType::Ffprobe.version_arg(), "-version");
    }

    #[test]
    fn test_locate_or_name_never_empty() {
        let name = ToolManager::new().locate_or_name(ToolType::Curl);
        assert!(!name.is_empty());
    }
}
