// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to defaults, so a partial file is fine.
// A missing, malformed or invalid file yields the full default config.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::backend::SwapchainSettings;

pub const CONFIG_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub ui: UiConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "swapframe".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Requested swapchain images, at least 2
    pub min_image_count: u32,
    /// MAILBOX/IMMEDIATE instead of FIFO
    pub unlimited_frame_rate: bool,
    pub clear_color: [f32; 4],
    /// Bound on acquire and fence waits; unset waits forever
    pub fence_timeout_ms: Option<u64>,
    /// Texture descriptor sets the GUI renderer may allocate (font atlas included)
    pub texture_bindings: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            min_image_count: 2,
            unlimited_frame_rate: false,
            clear_color: [0.45, 0.55, 0.60, 1.00],
            fence_timeout_ms: None,
            texture_bindings: 8,
        }
    }
}

impl GraphicsConfig {
    pub fn swapchain_settings(&self) -> SwapchainSettings {
        SwapchainSettings {
            min_image_count: self.min_image_count,
            unlimited_frame_rate: self.unlimited_frame_rate,
        }
    }

    pub fn fence_timeout(&self) -> Option<Duration> {
        self.fence_timeout_ms.map(Duration::from_millis)
    }
}

/// Dear ImGui settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub docking: bool,
    /// Let GUI windows leave the main window as their own OS windows
    pub viewports: bool,
    pub show_demo_window: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            docking: true,
            viewports: true,
            show_demo_window: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
    /// Watch config.toml and apply edits while running
    pub hot_reload: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_to_file: false,
            log_file: "swapframe.log".to_string(),
            show_fps: true,
            hot_reload: false,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults on any problem
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_PATH).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.graphics.swapchain_settings().validate()?;
        if self.window.width == 0 || self.window.height == 0 {
            bail!(
                "window size must be non-zero (got {}x{})",
                self.window.width,
                self.window.height
            );
        }
        if self.graphics.texture_bindings == 0 {
            bail!("texture_bindings must be at least 1 for the font atlas");
        }
        Ok(())
    }
}
