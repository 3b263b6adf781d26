// =============================================================================
// MODEL DISPLAYER - One OBJ model, one orbiting camera, Vulkan
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, keyboard, fullscreen, FPS title)        │
// │    └── Graphics (ordered init + per-frame render loop)          │
// │          ├── OrbitCamera + Transforms (world/view/projection)   │
// │          ├── Effect/Technique (one pipeline per pass)           │
// │          └── backend/ (device, swapchain, buffers, targets)     │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Advance automatic orbit by the elapsed time
// 2. Wait for the frame slot, acquire swapchain image
// 3. Clear, bind model, upload transform, draw once per pass
// 4. Submit and present
//
// =============================================================================

mod backend;
mod camera;
mod config;
mod error;
mod graphics;
mod model;
mod transform;

use anyhow::Result;
use backend::swapchain::is_out_of_date;
use config::{Action, Config, KeyBindings};
use error::{InitError, InitStep};
use graphics::Graphics;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // First argument overrides the config location
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, outcome) = Config::load(&config_path);

    init_logging(&config);
    log::info!("Starting model displayer");
    outcome.log(std::path::Path::new(&config_path));
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Model: {:?}", config.model.path);

    let event_loop = EventLoop::new().or_fail(InitError::CreateWindow)?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Startup and render failures end the process with a non-zero status
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging; Info unless RUST_LOG says otherwise
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info).parse_default_env();

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Model Displayer Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    bindings: KeyBindings,

    // Graphics before window: the surface must go before the window it targets
    graphics: Option<Graphics>,
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    /// Error that stopped the viewer, returned from main
    fatal: Option<anyhow::Error>,

    // ─────────────────────────────────────────────────────────────────────────
    // CAMERA CONTROL
    // ─────────────────────────────────────────────────────────────────────────
    auto_orbit: bool,
    last_frame_time: Instant,

    // ─────────────────────────────────────────────────────────────────────────
    // FPS TRACKING
    // ─────────────────────────────────────────────────────────────────────────
    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let bindings = config.controls.key_bindings();
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            bindings,
            graphics: None,
            window: None,
            is_fullscreen,
            fatal: None,
            auto_orbit: false,
            last_frame_time: now,
            frame_count: 0,
            last_fps_update: now,
        }
    }

    /// Create the window and every graphics resource
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), InitError> {
        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .or_fail(InitError::CreateWindow)?,
        );

        let graphics = Graphics::new(&window, &self.config)?;

        self.graphics = Some(graphics);
        self.window = Some(window);
        Ok(())
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    fn handle_action(&mut self, event_loop: &ActiveEventLoop, action: Action) {
        let step = self.config.camera.angle_step;
        let zoom = self.config.camera.radius_step;

        match action {
            Action::Quit => {
                log::info!("Quit key pressed, exiting...");
                event_loop.exit();
            }
            Action::ToggleFullscreen => self.toggle_fullscreen(),
            Action::ResetCamera => {
                let camera = &self.config.camera;
                let (radius, azimuth, elevation) = (camera.radius, camera.azimuth, camera.elevation);
                self.auto_orbit = false;
                self.move_camera(|g| g.set_camera_position(radius, azimuth, elevation));
            }
            Action::ToggleAutoOrbit => {
                self.auto_orbit = !self.auto_orbit;
                log::info!("Automatic orbit {}", if self.auto_orbit { "on" } else { "off" });
            }
            Action::OrbitLeft => self.move_camera(|g| g.orbit_camera(-step, 0.0)),
            Action::OrbitRight => self.move_camera(|g| g.orbit_camera(step, 0.0)),
            Action::OrbitUp => self.move_camera(|g| g.orbit_camera(0.0, step)),
            Action::OrbitDown => self.move_camera(|g| g.orbit_camera(0.0, -step)),
            Action::ZoomIn => self.move_camera(|g| g.zoom_camera(-zoom)),
            Action::ZoomOut => self.move_camera(|g| g.zoom_camera(zoom)),
        }
    }

    fn move_camera(&mut self, f: impl FnOnce(&mut Graphics)) {
        if let Some(graphics) = self.graphics.as_mut() {
            f(graphics);
            let (radius, azimuth, elevation) = graphics.camera_position();
            log::debug!(
                "Camera: radius {:.2}, azimuth {:.1}°, elevation {:.1}°",
                radius,
                azimuth,
                elevation
            );
        }
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            if let Some(graphics) = self.graphics.as_mut() {
                graphics.request_resize();
            }
        }
    }

    // =========================================================================
    // FRAME
    // =========================================================================

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        let Some(graphics) = self.graphics.as_mut() else {
            return;
        };

        if self.auto_orbit {
            graphics.orbit_camera(self.config.camera.orbit_speed * dt, 0.0);
        }

        match graphics.render() {
            Ok(true) => self.update_fps(dt),
            Ok(false) => {}
            Err(e) if is_out_of_date(&e) => {
                log::warn!("Swapchain out of date, rebuilding: {:#}", e);
                graphics.request_resize();
            }
            Err(e) => {
                // A failed frame leaves the GPU queue in an unknown state
                log::error!("Render error: {:?}", e);
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    fn update_fps(&mut self, frame_time: f32) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.fatal.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            // The full cause chain is printed when main returns it
            log::error!("Initialization failed at the {} step: {}", e.stage(), e);
            self.fatal = Some(e.into());
            event_loop.exit();
            return;
        }

        self.last_frame_time = Instant::now();
        self.last_fps_update = self.last_frame_time;
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(graphics) = self.graphics.as_mut() {
                    graphics.resize(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::PhysicalKey;

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        if let Some(action) = self.bindings.action_for(key) {
                            self.handle_action(event_loop, action);
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Release GPU resources while the window still exists
        self.graphics = None;
        log::info!("Cleanup complete");
    }
}
