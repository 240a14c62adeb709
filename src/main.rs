//! vfighter: spins a single mesh in a window.
//!
//! The main thread owns the window and pumps events. A dedicated render
//! thread owns every Vulkan object and advances the simulation on a fixed
//! timestep until it receives [`Event::Quit`].

use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use vfighter::app::{event_channel, Event, EventReceiver, EventSender, FixedTimestep, Spinner};
use vfighter::prelude::*;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

const WINDOW_WIDTH: u32 = 1600;
const WINDOW_HEIGHT: u32 = 900;
const RENDER_THREAD_POLL: Duration = Duration::from_millis(100);

fn config_from_env() -> RendererConfig {
    let config = RendererConfig::from_env();
    if cfg!(feature = "validation") {
        let flags = config.flags | RendererFlags::VALIDATION;
        config.with_flags(flags)
    } else {
        config
    }
}

fn load_geometry(mesh_path: Option<PathBuf>) -> Result<StaticGeometry> {
    match mesh_path {
        #[cfg(feature = "gltf_loading")]
        Some(path) => vfighter::renderer::mesh::load_mesh(path),
        #[cfg(not(feature = "gltf_loading"))]
        Some(path) => Err(RenderError::Mesh(format!(
            "{} given but glTF loading is disabled",
            path.display()
        ))),
        None => Ok(StaticGeometry::demo_quad()),
    }
}

/// Body of the render thread.
fn render_loop(config: RendererConfig, window: NativeWindow, mesh_path: Option<PathBuf>, events: EventReceiver) -> Result<()> {
    let geometry = load_geometry(mesh_path)?;
    let mut renderer = Renderer::with_geometry(config, window, geometry)?;

    let mut timestep = FixedTimestep::default();
    let mut spinner = Spinner::default();
    let mut last = Instant::now();

    while !events.quit_requested() {
        let now = Instant::now();
        spinner.step(timestep.advance(now - last));
        last = now;

        renderer.render(&spinner.scene())?;
    }

    log::info!(
        "Render loop finished after {} frames ({} swapchain recreations)",
        renderer.frames_presented(),
        renderer.swapchain_recreations()
    );
    renderer.save_caches()
}

struct App {
    config: RendererConfig,
    mesh_path: Option<PathBuf>,
    window: Option<Window>,
    events: Option<EventSender>,
    render_thread: Option<JoinHandle<Result<()>>>,
    failed: bool,
}

impl App {
    fn new(config: RendererConfig, mesh_path: Option<PathBuf>) -> Self {
        Self {
            config,
            mesh_path,
            window: None,
            events: None,
            render_thread: None,
            failed: false,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title("vfighter")
            .with_inner_size(PhysicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT))
            .with_resizable(true);
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| RenderError::Unsupported(format!("Failed to create window: {e}")))?;
        let native = NativeWindow::from_window(&window)?;

        let (sender, receiver) = event_channel();
        let config = self.config.clone();
        let mesh_path = self.mesh_path.take();
        let handle = std::thread::Builder::new()
            .name("render".into())
            .spawn(move || render_loop(config, native, mesh_path, receiver))
            .map_err(|source| RenderError::Io {
                path: PathBuf::from("<render thread>"),
                source,
            })?;

        self.window = Some(window);
        self.events = Some(sender);
        self.render_thread = Some(handle);
        Ok(())
    }

    /// Signals the render thread, waits for it and only then lets the window go.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(events) = self.events.take() {
            events.send(Event::Quit);
        }
        if let Some(handle) = self.render_thread.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("Renderer failed: {e}");
                    self.failed = true;
                }
                Err(_) => {
                    log::error!("Render thread panicked");
                    self.failed = true;
                }
            }
        }
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            log::error!("Startup failed: {e}");
            self.failed = true;
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let WindowEvent::CloseRequested = event {
            self.shutdown(event_loop);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::wait_duration(RENDER_THREAD_POLL));
        // The render thread only stops on its own when it hit an error.
        if self.render_thread.as_ref().is_some_and(|handle| handle.is_finished()) {
            self.shutdown(event_loop);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mesh_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config_from_env();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {e}");
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::wait_duration(RENDER_THREAD_POLL));

    let mut app = App::new(config, mesh_path);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {e}");
        std::process::exit(1);
    }
    if app.failed {
        std::process::exit(1);
    }
}
