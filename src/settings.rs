//! Engine settings with persistence
//!
//! Settings are saved to `~/.config/lumen/settings.toml`

use std::fs;
use std::path::{Path, PathBuf};

use lumen_render::EngineConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// All engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub video: VideoSettings,
    pub renderer: RendererSettings,
    pub scene: SceneSettings,
}

impl EngineSettings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lumen"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.toml"))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            warn!("Could not determine config directory");
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No settings file found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse settings: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read settings file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = Self::settings_path() else {
            anyhow::bail!("Could not determine config directory");
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Renderer configuration derived from these settings
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            render_pass_count: self.renderer.render_pass_count.max(1),
            clear_color: self.renderer.clear_color,
            shader_dir: self.renderer.shader_dir.clone(),
            ..Default::default()
        }
    }
}

/// Window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub title: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            vsync: true,
            title: "Lumen".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Render passes per frame (first clears, the rest load)
    pub render_pass_count: u32,
    pub clear_color: [f32; 4],
    /// Directory with compiled `.spv` shaders
    pub shader_dir: PathBuf,
}

impl Default for RendererSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            render_pass_count: engine.render_pass_count,
            clear_color: engine.clear_color,
            shader_dir: engine.shader_dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Scene loaded at startup
    pub path: PathBuf,
    /// Write the scene back to `path` on exit
    pub autosave: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("scene.json"),
            autosave: false,
        }
    }
}
