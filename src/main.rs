// =============================================================================
// SWAPFRAME - Vulkan swapchain frame lifecycle demo
// =============================================================================
//
// Drives a Vulkan window through acquire / record / submit / present, and
// rebuilds the swapchain whenever the surface stops matching it.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (outer loop, input, FPS title)                │
// │    ├── Gui (Dear ImGui context, winit platform, ash renderer)   │
// │    └── PresentationContext (frame cycle, stale tracking)        │
// │          └── VulkanWindow (surface, render pass, swapchain set) │
// │                └── VulkanDevice (GPU, queue, upload pool)       │
// │                      └── VulkanInstance (entry, messenger)      │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Apply hot-reloaded config
// 2. Plan: skip when minimized, rebuild when stale or resized
// 3. Build the GUI frame
// 4. Render (acquire, wait fence, record draw data, submit)
// 5. Update and render secondary viewports
// 6. Present
//
// =============================================================================

mod backend;
mod config;
mod config_watch;
mod gui;

use anyhow::{Context, Result};
use backend::frame::Presenter;
use backend::{
    FrameError, FrameStatus, LoopAction, PresentationContext, VulkanDevice, VulkanInstance,
    VulkanWindow, WindowSurface,
};
use config::Config;
use config_watch::ConfigWatcher;
use gui::Gui;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config);
    log::info!("Starting swapframe");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!(
        "Swapchain: min {} images, {}",
        config.graphics.min_image_count,
        if config.graphics.unlimited_frame_rate { "unlimited frame rate" } else { "vsync" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging, optionally piping records to a file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env, Target};

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== swapframe log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Failed to open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: Field order matters for Drop! The GUI renderer goes before the
/// device it allocated from, and the presenter (swapchain, surface, then
/// device) before the window its surface was created from.
struct App {
    config: Config,
    watcher: Option<ConfigWatcher>,

    gui: Option<Gui>,
    presenter: Option<PresentationContext>,
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let watcher = if config.debug.hot_reload {
            ConfigWatcher::new(config::CONFIG_PATH)
                .inspect_err(|e| log::warn!("Hot reload disabled: {:#}", e))
                .ok()
        } else {
            None
        };

        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            watcher,
            gui: None,
            presenter: None,
            window: None,
            is_fullscreen,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Instance, surface, device, an empty window target and the GUI. The
    /// swapchain itself is built by the first frame's rebuild.
    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let display = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let raw_window = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        let instance = VulkanInstance::new(
            display,
            &self.config.window.title,
            self.config.debug.validation_layers,
        )?;
        let surface = WindowSurface::new(&instance, display, raw_window)?;
        let device = VulkanDevice::new(instance, &surface)?;

        let target = VulkanWindow::new(device, surface, self.config.graphics.swapchain_settings())?;
        let presenter = Presenter::new(target, self.config.graphics.fence_timeout());

        self.gui = Some(Gui::new(
            window,
            &presenter,
            &self.config.ui,
            self.config.graphics.clear_color,
            self.config.graphics.texture_bindings,
        )?);
        self.presenter = Some(presenter);

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    /// One outer-loop iteration. Returns whether a frame was rendered.
    fn render_frame(&mut self, event_loop: &ActiveEventLoop) -> Result<bool, FrameError> {
        self.apply_pending_config();

        let (Some(window), Some(presenter), Some(gui)) =
            (self.window.as_ref(), self.presenter.as_mut(), self.gui.as_mut())
        else {
            return Ok(false);
        };

        let size = window.inner_size();
        match presenter.plan(size.width, size.height) {
            LoopAction::Skip => return Ok(false),
            LoopAction::Rebuild { width, height } => presenter.create_or_resize(width, height)?,
            LoopAction::Render => {}
        }

        let status = gui.frame(event_loop, window, |payload, clear_color| {
            presenter.render_frame(payload, clear_color)
        })?;
        if status == FrameStatus::NeedsRebuild {
            log::debug!("Swapchain stale after acquire, rebuilding next frame");
        }
        if presenter.present_frame()? == FrameStatus::NeedsRebuild {
            log::debug!("Swapchain stale after present, rebuilding next frame");
        }

        Ok(true)
    }

    fn apply_pending_config(&mut self) {
        let Some(new_config) = self.watcher.as_ref().and_then(ConfigWatcher::take_pending) else {
            return;
        };

        if let Some(presenter) = self.presenter.as_mut() {
            match presenter
                .target_mut()
                .set_settings(new_config.graphics.swapchain_settings())
            {
                Ok(true) => {
                    log::info!("Swapchain settings changed, rebuilding");
                    presenter.mark_stale();
                }
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Rejected swapchain settings: {:#}", e);
                    return;
                }
            }
        }

        if new_config.graphics.clear_color != self.config.graphics.clear_color {
            if let Some(gui) = self.gui.as_mut() {
                gui.state.clear_color = new_config.graphics.clear_color;
            }
        }

        if new_config.graphics.fence_timeout_ms != self.config.graphics.fence_timeout_ms
            || new_config.graphics.texture_bindings != self.config.graphics.texture_bindings
            || new_config.ui != self.config.ui
        {
            log::warn!("fence_timeout_ms, texture_bindings and [ui] take effect on restart");
        }

        self.config = new_config;
    }

    /// Controlled shutdown after a fatal frame error
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(ref presenter) = self.presenter {
            let _ = presenter.target().device().wait_idle();
        }
        event_loop.exit();
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
            // The size check in the next frame picks up the new extent
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
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
                    frame_time * 1000.0
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
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if let Some(gui) = self.gui.as_mut() {
            gui.handle_event(&window, window_id, &event);
        }
        // Secondary viewport windows are the GUI's business
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
            }

            WindowEvent::RedrawRequested => match self.render_frame(event_loop) {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => {
                    log::error!("Fatal frame error: {}", e);
                    self.shutdown(event_loop);
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if !event.state.is_pressed() {
                    return;
                }
                if self.gui.as_ref().is_some_and(Gui::wants_keyboard) {
                    return;
                }
                if let PhysicalKey::Code(key) = event.physical_key {
                    match key {
                        KeyCode::Escape => {
                            log::info!("ESC pressed, exiting...");
                            self.shutdown(event_loop);
                        }
                        KeyCode::F11 => self.toggle_fullscreen(),
                        _ => {}
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
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(ref presenter) = self.presenter {
            let _ = presenter.target().device().wait_idle();
        }
        // GUI (viewports, renderer), swapchain resources, surface, device
        // (last Arc), then the window
        self.gui = None;
        self.presenter = None;
        self.window = None;

        log::info!("Cleanup complete");
    }
}
