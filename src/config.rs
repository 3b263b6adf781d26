// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use winit::keyboard::KeyCode;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub model: ModelConfig,
    pub effect: EffectConfig,
    pub camera: CameraConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
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
            title: "Model Displayer".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// Requested multisample count; falls back to 1 when the GPU can't do it
    pub msaa_samples: u32,
    /// "wireframe" or "solid"
    pub fill_mode: String,
    /// "back", "front" or "none"
    pub cull_mode: String,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [1.0, 1.0, 1.0, 1.0],
            max_frames_in_flight: 2,
            msaa_samples: 4,
            fill_mode: "wireframe".to_string(),
            cull_mode: "back".to_string(),
        }
    }
}

/// Model file and how it is placed in the world
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Color given to vertices that carry none in the file
    pub color: [f32; 4],
    /// Uniform world scale
    pub scale: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lovely_poseA_geo.obj"),
            color: [0.0, 0.0, 0.0, 1.0],
            scale: 20.0,
        }
    }
}

/// Shader effect: a named technique made of one or more passes
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub technique: String,
    pub passes: Vec<PassConfig>,
}

/// Precompiled SPIR-V binaries for one pass
#[derive(Debug, Clone, Deserialize)]
pub struct PassConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            technique: "Tech".to_string(),
            passes: vec![PassConfig {
                vertex: PathBuf::from("shaders/model.vert.spv"),
                fragment: PathBuf::from("shaders/model.frag.spv"),
            }],
        }
    }
}

/// Initial camera placement, projection and interactive steps
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub radius: f32,
    /// Degrees
    pub azimuth: f32,
    /// Degrees, clamped to [-80, 80]
    pub elevation: f32,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Automatic orbit speed in degrees per second (0 disables)
    pub orbit_speed: f32,
    pub angle_step: f32,
    pub radius_step: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            radius: 15.0,
            azimuth: -270.0,
            elevation: 30.0,
            fov_degrees: 45.0,
            near: 1.0,
            far: 1000.0,
            orbit_speed: 15.0,
            angle_step: 5.0,
            radius_step: 1.0,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "model_displayer.log".to_string(),
            show_fps: true,
        }
    }
}

/// Control key bindings, by winit key code name ("KeyG", "Digit1", "F11", ...)
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub quit_key: KeyCode,
    pub fullscreen_key: KeyCode,
    pub auto_orbit_key: KeyCode,
    pub reset_camera_key: KeyCode,
    pub orbit_left_key: KeyCode,
    pub orbit_right_key: KeyCode,
    pub orbit_up_key: KeyCode,
    pub orbit_down_key: KeyCode,
    pub zoom_in_key: KeyCode,
    pub zoom_out_key: KeyCode,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            quit_key: KeyCode::Escape,
            fullscreen_key: KeyCode::F11,
            auto_orbit_key: KeyCode::Space,
            reset_camera_key: KeyCode::Home,
            orbit_left_key: KeyCode::ArrowLeft,
            orbit_right_key: KeyCode::ArrowRight,
            orbit_up_key: KeyCode::ArrowUp,
            orbit_down_key: KeyCode::ArrowDown,
            zoom_in_key: KeyCode::PageUp,
            zoom_out_key: KeyCode::PageDown,
        }
    }
}

/// What a key press does to the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleFullscreen,
    ToggleAutoOrbit,
    ResetCamera,
    OrbitLeft,
    OrbitRight,
    OrbitUp,
    OrbitDown,
    ZoomIn,
    ZoomOut,
}

/// Resolved key bindings
#[derive(Debug, Clone)]
pub struct KeyBindings {
    bindings: Vec<(KeyCode, Action)>,
}

impl KeyBindings {
    /// First action bound to `key`
    pub fn action_for(&self, key: KeyCode) -> Option<Action> {
        self.bindings
            .iter()
            .find(|(bound, _)| *bound == key)
            .map(|&(_, action)| action)
    }
}

impl ControlsConfig {
    pub fn key_bindings(&self) -> KeyBindings {
        let bindings = vec![
            (self.quit_key, Action::Quit),
            (self.fullscreen_key, Action::ToggleFullscreen),
            (self.auto_orbit_key, Action::ToggleAutoOrbit),
            (self.reset_camera_key, Action::ResetCamera),
            (self.orbit_left_key, Action::OrbitLeft),
            (self.orbit_right_key, Action::OrbitRight),
            (self.orbit_up_key, Action::OrbitUp),
            (self.orbit_down_key, Action::OrbitDown),
            (self.zoom_in_key, Action::ZoomIn),
            (self.zoom_out_key, Action::ZoomOut),
        ];

        for (i, (key, action)) in bindings.iter().enumerate() {
            if let Some((_, first)) = bindings[..i].iter().find(|(bound, _)| bound == key) {
                log::warn!("{:?} is bound to both {:?} and {:?}; {:?} wins", key, first, action, first);
            }
        }

        KeyBindings { bindings }
    }
}

/// How `Config::load` came by its values
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded,
    Missing,
    Invalid(anyhow::Error),
}

impl LoadOutcome {
    /// Report the outcome; call once logging is up
    pub fn log(&self, path: &Path) {
        match self {
            LoadOutcome::Loaded => log::info!("Loaded configuration from {:?}", path),
            LoadOutcome::Missing => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            LoadOutcome::Invalid(e) => {
                log::warn!("Failed to load {:?}: {:#}. Using defaults.", path, e)
            }
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if it is
    /// missing or invalid. Nothing is logged here: the log file location
    /// itself comes from the config, so the caller reports the outcome.
    pub fn load<P: AsRef<Path>>(path: P) -> (Self, LoadOutcome) {
        match Self::load_from_path(path) {
            Ok(Some(config)) => (config, LoadOutcome::Loaded),
            Ok(None) => (Config::default(), LoadOutcome::Missing),
            Err(e) => (Config::default(), LoadOutcome::Invalid(e)),
        }
    }

    /// Load configuration from a specific path; `None` when there is no file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(Some(config))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.effect.technique, "Tech");
        assert_eq!(config.effect.passes.len(), 1);
        assert_eq!(config.camera.radius, 15.0);
        assert_eq!(config.camera.azimuth, -270.0);
        assert_eq!(config.camera.elevation, 30.0);
        assert_eq!(config.model.scale, 20.0);
        assert_eq!(config.graphics.clear_color, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [window]
            width = 1024

            [camera]
            orbit_speed = 0.0

            [[effect.passes]]
            vertex = "a.vert.spv"
            fragment = "a.frag.spv"

            [[effect.passes]]
            vertex = "b.vert.spv"
            fragment = "b.frag.spv"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.camera.orbit_speed, 0.0);
        assert_eq!(config.camera.radius, 15.0);
        assert_eq!(config.effect.technique, "Tech");
        assert_eq!(config.effect.passes.len(), 2);
        assert_eq!(config.effect.passes[1].fragment, PathBuf::from("b.frag.spv"));
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config = Config::from_toml_str(include_str!("../config.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.window.title, defaults.window.title);
        assert_eq!(config.graphics.fill_mode, defaults.graphics.fill_mode);
        assert_eq!(config.model.path, defaults.model.path);
        assert_eq!(config.model.color, defaults.model.color);
        assert_eq!(config.effect.passes[0].vertex, defaults.effect.passes[0].vertex);
        assert_eq!(config.camera.azimuth, defaults.camera.azimuth);
        assert_eq!(config.debug.log_file, defaults.debug.log_file);
        assert_eq!(config.controls.zoom_in_key, defaults.controls.zoom_in_key);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::from_toml_str("[window\nwidth = ").is_err());
    }

    #[test]
    fn present_mode_names() {
        let mut config = Config::default();
        config.graphics.present_mode = "Mailbox".to_string();
        assert_eq!(config.get_present_mode(), ash::vk::PresentModeKHR::MAILBOX);
        config.graphics.present_mode = "vsync-please".to_string();
        assert_eq!(config.get_present_mode(), ash::vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn default_bindings_resolve() {
        let bindings = ControlsConfig::default().key_bindings();
        assert_eq!(bindings.action_for(KeyCode::Escape), Some(Action::Quit));
        assert_eq!(bindings.action_for(KeyCode::F11), Some(Action::ToggleFullscreen));
        assert_eq!(bindings.action_for(KeyCode::Home), Some(Action::ResetCamera));
        assert_eq!(bindings.action_for(KeyCode::ArrowUp), Some(Action::OrbitUp));
        assert_eq!(bindings.action_for(KeyCode::PageDown), Some(Action::ZoomOut));
        assert_eq!(bindings.action_for(KeyCode::KeyQ), None);
    }

    #[test]
    fn any_winit_key_name_can_be_bound() {
        let config = Config::from_toml_str(
            r#"
            [controls]
            quit_key = "KeyG"
            auto_orbit_key = "Digit1"
            zoom_out_key = "Backspace"
            "#,
        )
        .unwrap();

        let bindings = config.controls.key_bindings();
        assert_eq!(bindings.action_for(KeyCode::KeyG), Some(Action::Quit));
        assert_eq!(bindings.action_for(KeyCode::Digit1), Some(Action::ToggleAutoOrbit));
        assert_eq!(bindings.action_for(KeyCode::Backspace), Some(Action::ZoomOut));
        assert_eq!(bindings.action_for(KeyCode::Escape), None);
        // Untouched keys keep their defaults
        assert_eq!(bindings.action_for(KeyCode::F11), Some(Action::ToggleFullscreen));
    }

    #[test]
    fn unknown_key_name_is_an_error() {
        assert!(Config::from_toml_str("[controls]\nquit_key = \"Hyper\"\n").is_err());
    }

    #[test]
    fn first_binding_wins_on_duplicates() {
        let controls = ControlsConfig {
            zoom_in_key: KeyCode::Escape,
            ..ControlsConfig::default()
        };
        assert_eq!(controls.key_bindings().action_for(KeyCode::Escape), Some(Action::Quit));
    }

    fn temp_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "model_displayer_{}_{}.toml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn invalid_file_falls_back_to_defaults_and_says_why() {
        let path = temp_config("invalid", "[window\nwidth = ");
        let (config, outcome) = Config::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 800);
        match outcome {
            LoadOutcome::Invalid(e) => assert!(format!("{:#}", e).contains("parse"), "{e:#}"),
            other => panic!("expected an invalid outcome, got {other:?}"),
        }
    }

    #[test]
    fn missing_and_valid_files() {
        let (config, outcome) = Config::load("/nonexistent/model_displayer.toml");
        assert!(matches!(outcome, LoadOutcome::Missing));
        assert_eq!(config.camera.radius, 15.0);

        let path = temp_config("valid", "[window]\nwidth = 1280\n");
        let (config, outcome) = Config::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded));
        assert_eq!(config.window.width, 1280);
    }
}
