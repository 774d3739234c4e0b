// GUI - Dear ImGui on top of the frame cycle
//
// The winit platform backend feeds input, DPI and timing into the context;
// the ash renderer turns the finished draw data into commands inside the
// frame's render pass (through DrawPayload). With viewports enabled, GUI
// windows dragged out of the main window become OS windows with their own
// surface and swapchain, rendered after the main frame is submitted.

use anyhow::{anyhow, Result};
use ash::vk;
use dear_imgui_ash::{AshRenderer, Options as AshOptions};
use dear_imgui_rs::render::DrawData;
use dear_imgui_rs::{Condition, ConfigFlags, Context, Ui};
use dear_imgui_winit::{HiDpiMode, WinitPlatform};
use glam::Vec4;
use std::time::Instant;
use winit::event::{Event, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

use crate::backend::{DrawPayload, PresentationContext};
use crate::config::UiConfig;

/// ImGui asserts on a zero delta (two frames within one timer tick)
const MIN_DELTA_TIME: f32 = 1.0e-5;

/// State edited by the demo windows
#[derive(Debug, Clone, PartialEq)]
pub struct DemoState {
    pub show_demo_window: bool,
    pub show_another_window: bool,
    /// 0.0 ..= 1.0
    pub slider: f32,
    pub counter: u32,
    /// Straight (not premultiplied) RGBA
    pub clear_color: [f32; 4],
}

impl DemoState {
    pub fn new(clear_color: [f32; 4], show_demo_window: bool) -> Self {
        Self {
            show_demo_window,
            show_another_window: false,
            slider: 0.0,
            counter: 0,
            clear_color,
        }
    }

    pub fn press_button(&mut self) {
        self.counter = self.counter.wrapping_add(1);
    }

    /// Colour edits touch RGB only; alpha stays as configured
    pub fn set_clear_rgb(&mut self, [r, g, b]: [f32; 3]) {
        self.clear_color = [r, g, b, self.clear_color[3]];
    }

    fn clear_rgb(&self) -> [f32; 3] {
        let [r, g, b, _] = self.clear_color;
        [r, g, b]
    }
}

/// One frame of ImGui draw data, recorded by the ash renderer
struct UiPayload<'a> {
    renderer: &'a mut AshRenderer,
    draw_data: &'a DrawData,
}

impl DrawPayload for UiPayload<'_> {
    fn record(&mut self, command_buffer: vk::CommandBuffer, _render_area: vk::Extent2D) -> Result<()> {
        self.renderer
            .cmd_draw(command_buffer, self.draw_data)
            .map_err(|e| anyhow!("Failed to record GUI draw data: {}", e))
    }
}

/// IMPORTANT: Field order matters for Drop! Platform windows are closed in
/// `drop`, while the renderer they call back into is still alive.
pub struct Gui {
    context: Context,
    platform: WinitPlatform,
    // Boxed: the multi-viewport callbacks keep its address
    renderer: Box<AshRenderer>,
    pub state: DemoState,
    docking: bool,
    viewports: bool,
    last_frame: Instant,
}

impl Gui {
    /// Context, platform backend and renderer for the presenter's window
    ///
    /// # Arguments
    /// * `window` - Main window; its scale factor sets the font DPI scale
    /// * `presenter` - Supplies device, queue and the render pass to draw in
    /// * `config` - Docking, viewports, demo window
    /// * `clear_color` - Initial (straight alpha) clear colour
    /// * `texture_bindings` - Texture descriptor sets the renderer may allocate
    pub fn new(
        window: &Window,
        presenter: &PresentationContext,
        config: &UiConfig,
        clear_color: [f32; 4],
        texture_bindings: u32,
    ) -> Result<Self> {
        log::info!("Creating GUI context...");

        let mut context = Context::create();

        // Step 1: Config flags
        {
            let io = context.io_mut();
            let mut flags = io.config_flags();
            flags.insert(ConfigFlags::NAV_ENABLE_KEYBOARD);
            flags.insert(ConfigFlags::NAV_ENABLE_GAMEPAD);
            if config.docking {
                flags.insert(ConfigFlags::DOCKING_ENABLE);
            }
            if config.viewports {
                flags.insert(ConfigFlags::VIEWPORTS_ENABLE);
            }
            io.set_config_flags(flags);
        }

        // Step 2: DPI-scaled style
        let scale = window.scale_factor() as f32;
        context.style_mut().set_font_scale_dpi(scale);

        if config.viewports {
            context.enable_multi_viewport();
        }

        // Step 3: Platform backend
        let mut platform = WinitPlatform::new(&mut context);
        platform.attach_window(window, HiDpiMode::Default, &mut context);
        if config.viewports {
            dear_imgui_winit::multi_viewport::init_multi_viewport_support(&mut context, window);
        }

        // Step 4: Renderer, drawing in the window's render pass
        let target = presenter.target();
        let device = target.device();
        let options = AshOptions {
            in_flight_frames: target.max_frames_in_flight()?,
            max_textures: texture_bindings,
            framebuffer_srgb: is_srgb_format(target.surface_format().format),
            ..Default::default()
        };
        let mut renderer = Box::new(
            AshRenderer::with_default_allocator(
                device.instance(),
                device.physical_device,
                device.device.clone(),
                device.queue,
                device.upload_pool,
                target.render_pass(),
                &mut context,
                Some(options),
            )
            .map_err(|e| anyhow!("Failed to create GUI renderer: {}", e))?,
        );

        // Step 5: Secondary viewports get their own surfaces and swapchains
        if config.viewports {
            dear_imgui_ash::multi_viewport::enable(
                &mut renderer,
                &mut context,
                device.entry().clone(),
                device.instance().clone(),
                device.physical_device,
                device.queue,
                device.queue_family,
                device.queue_family,
            );
        }

        log::info!(
            "GUI ready: {} frames in flight, {} texture bindings, docking {}, viewports {}",
            options.in_flight_frames,
            texture_bindings,
            config.docking,
            config.viewports
        );

        Ok(Self {
            context,
            platform,
            renderer,
            state: DemoState::new(clear_color, config.show_demo_window),
            docking: config.docking,
            viewports: config.viewports,
            last_frame: Instant::now(),
        })
    }

    /// Feed a window event to the platform backend. Events for secondary
    /// viewport windows are routed to the viewport that owns them.
    pub fn handle_event(&mut self, window: &Window, window_id: WindowId, event: &WindowEvent) {
        let event: Event<()> = Event::WindowEvent {
            window_id,
            event: event.clone(),
        };
        if window_id == window.id() {
            self.platform.handle_event(&mut self.context, window, &event);
        } else if self.viewports {
            dear_imgui_winit::multi_viewport::route_event_to_viewports(&mut self.context, &event);
        }
    }

    /// True while a GUI widget (text field, navigation) has keyboard focus
    pub fn wants_keyboard(&self) -> bool {
        self.context.io().want_capture_keyboard()
    }

    /// Run one GUI frame: build the windows, hand the draw data and the
    /// premultiplied clear colour to `render` (the main window's RenderFrame),
    /// then update and render the secondary viewports. Presenting the main
    /// window is left to the caller.
    pub fn frame<R>(
        &mut self,
        event_loop: &ActiveEventLoop,
        window: &Window,
        render: impl FnOnce(&mut dyn DrawPayload, [f32; 4]) -> R,
    ) -> R {
        let now = Instant::now();
        let delta = now.duration_since(self.last_frame).as_secs_f32();
        self.context.io_mut().set_delta_time(delta.max(MIN_DELTA_TIME));
        self.last_frame = now;

        self.platform.prepare_frame(window, &mut self.context);
        let ui = self.context.frame();
        if self.docking {
            ui.dockspace_over_main_viewport();
        }
        build_demo_windows(ui, &mut self.state);
        self.platform.prepare_render_with_ui(ui, window);

        let clear_color = premultiplied_clear(self.state.clear_color);
        let draw_data = self.context.render();
        let rendered = render(
            &mut UiPayload {
                renderer: &mut self.renderer,
                draw_data,
            },
            clear_color,
        );

        if self.viewports {
            self.renderer.set_viewport_clear_color(clear_color);
            dear_imgui_winit::multi_viewport::set_event_loop(event_loop);
            self.context.update_platform_windows();
            self.context.render_platform_windows_default();
        }

        rendered
    }
}

impl Drop for Gui {
    fn drop(&mut self) {
        log::info!("Destroying GUI...");
        if self.viewports {
            // Platform windows go before the context and renderer
            dear_imgui_ash::multi_viewport::shutdown_multi_viewport_support(&mut self.context);
            dear_imgui_winit::multi_viewport::shutdown_multi_viewport_support(&mut self.context);
        }
    }
}

/// The demo window, "Hello, world!" and the optional second window
fn build_demo_windows(ui: &Ui, state: &mut DemoState) {
    if state.show_demo_window {
        ui.show_demo_window(&mut state.show_demo_window);
    }

    ui.window("Hello, world!")
        .size([380.0, 220.0], Condition::FirstUseEver)
        .build(|| {
            ui.text("This is some useful text.");
            ui.checkbox("Demo Window", &mut state.show_demo_window);
            ui.checkbox("Another Window", &mut state.show_another_window);

            ui.slider_f32("float", &mut state.slider, 0.0, 1.0);

            let mut rgb = state.clear_rgb();
            if ui.color_edit3("clear color", &mut rgb) {
                state.set_clear_rgb(rgb);
            }

            if ui.button("Button") {
                state.press_button();
            }
            ui.same_line();
            ui.text(format!("counter = {}", state.counter));

            ui.text(frame_stats(ui.io().framerate()));
        });

    if state.show_another_window {
        let mut open = true;
        let mut close_clicked = false;
        ui.window("Another Window").opened(&mut open).build(|| {
            ui.text("Hello from another window!");
            close_clicked = ui.button("Close Me");
        });
        state.show_another_window = open && !close_clicked;
    }
}

/// "Application average X ms/frame (Y FPS)"
fn frame_stats(framerate: f32) -> String {
    if framerate > 0.0 {
        format!(
            "Application average {:.3} ms/frame ({:.1} FPS)",
            1000.0 / framerate,
            framerate
        )
    } else {
        "Application average -- ms/frame (-- FPS)".to_string()
    }
}

/// RGB scaled by alpha, as the render pass clear expects
pub fn premultiplied_clear(color: [f32; 4]) -> [f32; 4] {
    let color = Vec4::from_array(color);
    (color.truncate() * color.w).extend(color.w).to_array()
}

fn is_srgb_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::B8G8R8A8_SRGB | vk::Format::R8G8B8A8_SRGB | vk::Format::A8B8G8R8_SRGB_PACK32
    )
}
