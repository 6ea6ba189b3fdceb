// ============================================================================
// CONFIG — slot configuration, text presets and the last-used settings token
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::compositor::SlotRole;
use crate::pixel::ChannelSelector;

/// Source file and sampled channel for one slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub path: PathBuf,
    pub channel: ChannelSelector,
}

/// Everything that triggers a reload when it changes: four paths, four selectors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositorConfig {
    pub red: SlotConfig,
    pub green: SlotConfig,
    pub blue: SlotConfig,
    pub alpha: SlotConfig,
}

impl CompositorConfig {
    pub fn slot(&self, role: SlotRole) -> &SlotConfig {
        match role {
            SlotRole::Red => &self.red,
            SlotRole::Green => &self.green,
            SlotRole::Blue => &self.blue,
            SlotRole::Alpha => &self.alpha,
        }
    }

    pub fn slot_mut(&mut self, role: SlotRole) -> &mut SlotConfig {
        match role {
            SlotRole::Red => &mut self.red,
            SlotRole::Green => &mut self.green,
            SlotRole::Blue => &mut self.blue,
            SlotRole::Alpha => &mut self.alpha,
        }
    }

    /// Build from the positional host token: `paths` and `channels` are both
    /// ordered red, green, blue, alpha, so channel1 selects for the red slot
    /// and channel4 for the alpha slot. The legacy plugin's render applied
    /// channel1 to the blue source and channel3 to the red source; this
    /// follows the on-screen pairing instead. Channel values use the legacy
    /// numbering (Blue = 0, Green = 1, Red = 2, Alpha = 3); anything else
    /// falls back to Red.
    pub fn from_legacy(paths: [&str; 4], channels: [u8; 4]) -> Self {
        let mut cfg = Self::default();
        for (i, role) in SlotRole::ALL.iter().enumerate() {
            let slot = cfg.slot_mut(*role);
            slot.path = PathBuf::from(paths[i]);
            slot.channel = ChannelSelector::from_index(channels[i]).unwrap_or_default();
        }
        cfg
    }

    // ---- text presets (key=value) -------------------------------------------

    /// Serialize as `key=value` lines (`red_file=…`, `red_channel=…`, …).
    pub fn to_preset_string(&self) -> String {
        let mut out = String::new();
        for role in SlotRole::ALL {
            let slot = self.slot(role);
            out.push_str(&format!("{}_file={}\n", role, slot.path.display()));
            out.push_str(&format!("{}_channel={}\n", role, slot.channel));
        }
        out
    }

    /// Parse `key=value` lines. Unknown keys and blank/comment lines are
    /// skipped; an unparseable channel keeps the default.
    pub fn from_preset_str(content: &str) -> Self {
        let mut cfg = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let Some((role, field)) = key.trim().split_once('_') else { continue };
            let role = match role {
                "red" => SlotRole::Red,
                "green" => SlotRole::Green,
                "blue" => SlotRole::Blue,
                "alpha" => SlotRole::Alpha,
                _ => continue,
            };
            let val = val.trim();
            let slot = cfg.slot_mut(role);
            match field {
                "file" => slot.path = PathBuf::from(val),
                "channel" => {
                    if let Ok(ch) = val.parse() {
                        slot.channel = ch;
                    }
                }
                _ => {}
            }
        }
        cfg
    }

    pub fn load_preset(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("could not read preset '{}': {}", path.display(), e))?;
        Ok(Self::from_preset_str(&content))
    }

    pub fn save_preset(&self, path: &Path) -> Result<(), String> {
        std::fs::write(path, self.to_preset_string())
            .map_err(|e| format!("could not write preset '{}': {}", path.display(), e))
    }

    // ---- last-used token (bincode) -------------------------------------------

    /// Default location of the last-used settings file.
    ///
    /// Linux:   `$XDG_CONFIG_HOME/RGBCompositor/last_used.bin` (or `~/.config/…`)
    /// Windows: `%APPDATA%\RGBCompositor\last_used.bin`
    /// macOS:   `~/Library/Application Support/RGBCompositor/last_used.bin`
    pub fn last_used_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").ok()?;
            return Some(PathBuf::from(appdata).join("RGBCompositor").join("last_used.bin"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("RGBCompositor")
                    .join("last_used.bin"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("RGBCompositor").join("last_used.bin"))
        }
    }

    /// Load a bincode token; a missing or corrupt file yields the default config.
    pub fn load_last_used_from(path: &Path) -> Self {
        let Ok(file) = File::open(path) else { return Self::default() };
        match bincode::deserialize_from(BufReader::new(file)) {
            Ok(cfg) => cfg,
            Err(e) => {
                log_warn!("ignoring unreadable settings token {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save_last_used_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("could not create '{}': {}", parent.display(), e))?;
        }
        let file = File::create(path)
            .map_err(|e| format!("could not write '{}': {}", path.display(), e))?;
        bincode::serialize_into(BufWriter::new(file), self)
            .map_err(|e| format!("could not serialize settings: {}", e))
    }
}
