// SPDX-License-Identifier: MPL-2.0

use crate::config::{APP_ID, DEFAULT_PAGE_SIZE, UNREAD_PROBE_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent stream engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Posts per infinite-scroll page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Ids requested by each "new posts" probe
    #[serde(default = "default_unread_probe_limit")]
    pub unread_probe_limit: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_unread_probe_limit() -> usize {
    UNREAD_PROBE_LIMIT
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            unread_probe_limit: UNREAD_PROBE_LIMIT,
        }
    }
}

impl StreamSettings {
    /// Get the settings file path (~/.config/io.github.sethcottle.Hangar/stream-settings.json)
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_ID);
            p.push("stream-settings.json");
            p
        })
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::settings_path().ok_or("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {e}"))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {e}"))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {e}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("hangar-stream-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let settings = StreamSettings::load_from(&temp_path("does-not-exist.json"));
        assert_eq!(settings, StreamSettings::default());
        assert_eq!(settings.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("saved.json");
        let settings = StreamSettings {
            page_size: 30,
            unread_probe_limit: 10,
        };
        settings.save_to(&path).unwrap();

        assert_eq!(StreamSettings::load_from(&path), settings);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: StreamSettings = serde_json::from_str(r#"{"page_size": 15}"#).unwrap();
        assert_eq!(settings.page_size, 15);
        assert_eq!(settings.unread_probe_limit, UNREAD_PROBE_LIMIT);
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let path = temp_path("corrupt.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(StreamSettings::load_from(&path), StreamSettings::default());
        let _ = std::fs::remove_file(&path);
    }
}
