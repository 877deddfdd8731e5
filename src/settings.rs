use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::generator::clamp_length;
use crate::store::{atomic_write, restrict_dir, restrict_file};

pub const ORGANIZATION: &str = "IJHack";
pub const APPLICATION: &str = "passview";
const SPLITTER_STEP: u16 = 20;
const SPLITTER_MIN: u16 = 40;

/// User preferences, loaded once at startup and passed around explicitly.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub select_is_open: bool,
    pub close_is_hide: bool,
    pub splitter_sizes: [u16; 2],
    #[serde(with = "geometry", skip_serializing_if = "Option::is_none")]
    pub window_geometry: Option<Vec<u8>>,
    pub always_on_top: bool,
    pub use_tray_icon: bool,
    pub start_minimized: bool,
    pub password_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            select_is_open: true,
            close_is_hide: false,
            splitter_sizes: [200, 400],
            window_geometry: None,
            always_on_top: false,
            use_tray_icon: true,
            start_minimized: false,
            password_length: 16,
        }
    }
}

pub fn settings_path() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(base.join(ORGANIZATION).join(format!("{APPLICATION}.json")))
}

impl Settings {
    pub fn load() -> Self {
        match settings_path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                warn!("using default settings: {e}");
                Self::default()
            }
        }
    }

    /// Missing file means defaults; a corrupt one is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Self::default();
        }
        let parsed = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<Settings>(&raw).map_err(anyhow::Error::from));
        match parsed {
            Ok(mut settings) => {
                settings.password_length = clamp_length(settings.password_length);
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), "ignoring unreadable settings: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                restrict_dir(parent)?;
            }
        }
        let data = serde_json::to_string_pretty(self)?;
        atomic_write(path, data.as_bytes())?;
        restrict_file(path)?;
        debug!(path = %path.display(), "saved settings");
        Ok(())
    }

    /// Move the pane divider; positive `steps` widen the tree pane.
    pub fn shift_splitter(&mut self, steps: i32) {
        let total = self.splitter_sizes[0].saturating_add(self.splitter_sizes[1]);
        let delta = (steps.unsigned_abs() as u16).saturating_mul(SPLITTER_STEP);
        let left = if steps >= 0 {
            self.splitter_sizes[0].saturating_add(delta)
        } else {
            self.splitter_sizes[0].saturating_sub(delta)
        };
        let left = left.clamp(SPLITTER_MIN, total.saturating_sub(SPLITTER_MIN).max(SPLITTER_MIN));
        self.splitter_sizes = [left, total.saturating_sub(left)];
    }

    /// Tree pane share as a `(numerator, denominator)` ratio.
    pub fn splitter_ratio(&self) -> (u32, u32) {
        let [left, right] = self.splitter_sizes;
        let total = u32::from(left) + u32::from(right);
        if total == 0 {
            (1, 3)
        } else {
            (u32::from(left), total)
        }
    }

    pub fn record_terminal_size(&mut self, cols: u16, rows: u16) {
        let mut blob = Vec::with_capacity(4);
        blob.extend_from_slice(&cols.to_be_bytes());
        blob.extend_from_slice(&rows.to_be_bytes());
        self.window_geometry = Some(blob);
    }

    pub fn terminal_size(&self) -> Option<(u16, u16)> {
        match self.window_geometry.as_deref() {
            Some([c0, c1, r0, r1]) => Some((
                u16::from_be_bytes([*c0, *c1]),
                u16::from_be_bytes([*r0, *r1]),
            )),
            _ => None,
        }
    }
}

/// Opaque geometry blob, stored as base64 text.
mod geometry {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join("none.json"));
        assert_eq!(settings, Settings::default());
        assert!(settings.select_is_open);
        assert_eq!(settings.splitter_sizes, [200, 400]);
    }

    #[test]
    fn save_then_load_preserves_every_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("IJHack").join("passview.json");
        let mut settings = Settings {
            select_is_open: false,
            close_is_hide: true,
            splitter_sizes: [120, 300],
            window_geometry: None,
            always_on_top: true,
            use_tray_icon: false,
            start_minimized: true,
            password_length: 32,
        };
        settings.record_terminal_size(180, 50);
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded, settings);
        assert_eq!(loaded.terminal_size(), Some((180, 50)));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.json");
        fs::write(&path, r#"{ "close_is_hide": true, "password_length": 3 }"#).unwrap();
        let loaded = Settings::load_from(&path);
        assert!(loaded.close_is_hide);
        assert!(loaded.use_tray_icon);
        assert_eq!(loaded.password_length, 8);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn splitter_shifts_within_bounds() {
        let mut settings = Settings::default();
        settings.shift_splitter(1);
        assert_eq!(settings.splitter_sizes, [220, 380]);
        settings.shift_splitter(-100);
        assert_eq!(settings.splitter_sizes, [SPLITTER_MIN, 600 - SPLITTER_MIN]);
        settings.shift_splitter(100);
        assert_eq!(settings.splitter_sizes, [600 - SPLITTER_MIN, SPLITTER_MIN]);
        assert_eq!(settings.splitter_ratio(), (560, 600));
    }
}
